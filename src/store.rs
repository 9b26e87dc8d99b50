use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};

use crate::error::PatternError;
use crate::fingerprint::{self, Fingerprint, MatchScore};
use crate::goal_stats::{HistoricalMatch, TeamType};
use crate::sequence::SequenceEntry;

const CACHE_DIR: &str = "match_patterns";
const DB_FILE: &str = "patterns.sqlite";

// Flag columns of `fingerprints`, one per named market.
static MARKET_COLUMNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    fingerprint::encode(MatchScore::from_counts(0, 0, 0, 0))
        .markets()
        .into_iter()
        .map(|(name, _)| name)
        .collect()
});

const BASE_COLUMNS: [&str; 20] = [
    "simulation_id",
    "team_type",
    "game_position",
    "home_ht",
    "away_ht",
    "home_ft",
    "away_ft",
    "total_goals_ft",
    "total_goals_ht",
    "second_half_goals",
    "goal_difference_ft",
    "goal_difference_ht",
    "result_ft",
    "result_ht",
    "exact_score_ft",
    "exact_score_ht",
    "ht_fingerprint",
    "ft_fingerprint",
    "combined_fingerprint",
    "created_at",
];

#[derive(Debug, Clone)]
pub struct StoredFingerprint {
    pub id: i64,
    pub simulation_id: i64,
    pub team_type: TeamType,
    pub game_position: u32,
    pub fingerprint: Fingerprint,
    pub created_at: String,
}

impl StoredFingerprint {
    pub fn as_historical(&self) -> HistoricalMatch {
        HistoricalMatch {
            simulation_id: self.simulation_id,
            team_type: self.team_type,
            game_position: self.game_position,
            score: self.fingerprint.score,
        }
    }

    pub fn as_sequence_entry(&self) -> SequenceEntry {
        SequenceEntry {
            result: self.team_type.perspective_result(&self.fingerprint.score),
            game_position: self.game_position,
            combined_fingerprint: self.fingerprint.combined_fingerprint.clone(),
        }
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    let flag_columns: String = MARKET_COLUMNS
        .iter()
        .map(|name| format!("            {name} INTEGER NOT NULL,\n"))
        .collect();

    conn.execute_batch(&format!(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS fingerprints (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            simulation_id INTEGER NOT NULL,
            team_type TEXT NOT NULL CHECK (team_type IN ('home', 'away', 'h2h')),
            game_position INTEGER NOT NULL,
            home_ht INTEGER NOT NULL,
            away_ht INTEGER NOT NULL,
            home_ft INTEGER NOT NULL,
            away_ft INTEGER NOT NULL,
            total_goals_ft INTEGER NOT NULL,
            total_goals_ht INTEGER NOT NULL,
            second_half_goals INTEGER NOT NULL,
            goal_difference_ft INTEGER NOT NULL,
            goal_difference_ht INTEGER NOT NULL,
            result_ft TEXT NOT NULL,
            result_ht TEXT NOT NULL,
            exact_score_ft TEXT NOT NULL,
            exact_score_ht TEXT NOT NULL,
            ht_fingerprint TEXT NOT NULL,
            ft_fingerprint TEXT NOT NULL,
            combined_fingerprint TEXT NOT NULL,
{flag_columns}            created_at TEXT NOT NULL,
            UNIQUE (simulation_id, team_type, game_position)
        );
        CREATE INDEX IF NOT EXISTS idx_fingerprints_combined ON fingerprints(combined_fingerprint);
        CREATE INDEX IF NOT EXISTS idx_fingerprints_simulation ON fingerprints(simulation_id, team_type);

        CREATE TABLE IF NOT EXISTS adaptive_thresholds (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern_type TEXT NOT NULL UNIQUE,
            current_penalty REAL NOT NULL,
            original_penalty REAL NOT NULL,
            min_penalty REAL NOT NULL,
            max_penalty REAL NOT NULL,
            learning_rate REAL NOT NULL,
            confidence_threshold REAL NOT NULL,
            total_predictions INTEGER NOT NULL DEFAULT 0,
            successful_predictions INTEGER NOT NULL DEFAULT 0,
            total_error REAL NOT NULL DEFAULT 0,
            avg_error REAL NOT NULL DEFAULT 0,
            recent_avg_error REAL NOT NULL DEFAULT 0,
            last_adjustment REAL NOT NULL DEFAULT 0,
            adjustment_count INTEGER NOT NULL DEFAULT 0,
            last_adjusted_at TEXT NULL,
            created_at TEXT NOT NULL,
            CHECK (min_penalty <= current_penalty AND current_penalty <= max_penalty)
        );

        CREATE TABLE IF NOT EXISTS learning_outcomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern_fingerprint TEXT NOT NULL,
            market_type TEXT NOT NULL,
            predicted_outcome INTEGER NOT NULL,
            actual_outcome INTEGER NULL,
            confidence_level REAL NOT NULL,
            simulation_id INTEGER NULL,
            prediction_date TEXT NOT NULL,
            result_date TEXT NULL,
            threshold_applied INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_learning_fingerprint ON learning_outcomes(pattern_fingerprint);
        CREATE INDEX IF NOT EXISTS idx_learning_market ON learning_outcomes(market_type);
        CREATE INDEX IF NOT EXISTS idx_learning_simulation ON learning_outcomes(simulation_id);

        CREATE TABLE IF NOT EXISTS pattern_enhancements (
            fingerprint_id INTEGER PRIMARY KEY REFERENCES fingerprints(id),
            progression_ratio REAL NOT NULL,
            phi_deviation REAL NOT NULL,
            phi_harmony REAL NOT NULL,
            is_golden INTEGER NOT NULL,
            fibonacci_index INTEGER NOT NULL,
            fibonacci_strength REAL NOT NULL,
            is_fibonacci_total INTEGER NOT NULL,
            shannon_entropy REAL NOT NULL,
            quantum_coherence REAL NOT NULL,
            strategic_balance REAL NOT NULL,
            nash_class TEXT NOT NULL,
            hyperbolic_distance REAL NOT NULL,
            is_mirror INTEGER NOT NULL,
            enhanced_at TEXT NOT NULL
        );
        "#
    ))
    .context("create sqlite schema")?;
    Ok(())
}

/// Encodes and upserts every record in one transaction. Returns the number of rows written.
pub fn insert_matches(conn: &mut Connection, records: &[HistoricalMatch]) -> Result<usize> {
    let tx = conn.transaction().context("begin fingerprint transaction")?;
    for record in records {
        upsert_fingerprint(&tx, record)?;
    }
    tx.commit().context("commit fingerprint transaction")?;
    Ok(records.len())
}

fn upsert_fingerprint(tx: &rusqlite::Transaction<'_>, record: &HistoricalMatch) -> Result<()> {
    let fp = fingerprint::encode(record.score);
    let columns: Vec<&str> = BASE_COLUMNS
        .iter()
        .copied()
        .chain(MARKET_COLUMNS.iter().copied())
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !matches!(**c, "simulation_id" | "team_type" | "game_position"))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    let sql = format!(
        "INSERT INTO fingerprints ({}) VALUES ({})
         ON CONFLICT(simulation_id, team_type, game_position) DO UPDATE SET {}",
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", "),
    );

    let mut values: Vec<Value> = vec![
        Value::Integer(record.simulation_id),
        Value::Text(record.team_type.as_str().to_string()),
        Value::Integer(record.game_position as i64),
        Value::Integer(fp.score.home_ht() as i64),
        Value::Integer(fp.score.away_ht() as i64),
        Value::Integer(fp.score.home_ft() as i64),
        Value::Integer(fp.score.away_ft() as i64),
        Value::Integer(fp.total_goals_ft),
        Value::Integer(fp.total_goals_ht),
        Value::Integer(fp.second_half_goals),
        Value::Integer(fp.goal_difference_ft),
        Value::Integer(fp.goal_difference_ht),
        Value::Text(fp.result_ft.to_string()),
        Value::Text(fp.result_ht.to_string()),
        Value::Text(fp.exact_score_ft.clone()),
        Value::Text(fp.exact_score_ht.clone()),
        Value::Text(fp.ht_fingerprint.clone()),
        Value::Text(fp.ft_fingerprint.clone()),
        Value::Text(fp.combined_fingerprint.clone()),
        Value::Text(Utc::now().to_rfc3339()),
    ];
    values.extend(
        fp.markets()
            .into_iter()
            .map(|(_, flag)| Value::Integer(bool_to_i64(flag))),
    );

    // A changed score invalidates the profile; the backfill picks the row up again.
    let cleared = tx
        .execute(
            r#"
            DELETE FROM pattern_enhancements
            WHERE fingerprint_id IN (
                SELECT id FROM fingerprints
                WHERE simulation_id = ?1 AND team_type = ?2 AND game_position = ?3
                  AND combined_fingerprint <> ?4
            )
            "#,
            params![
                record.simulation_id,
                record.team_type.as_str(),
                record.game_position,
                fp.combined_fingerprint
            ],
        )
        .context("clear stale enhancement")?;
    if cleared > 0 {
        tracing::debug!(
            simulation_id = record.simulation_id,
            team_type = record.team_type.as_str(),
            game_position = record.game_position,
            "score changed, enhancement cleared"
        );
    }

    tx.execute(&sql, params_from_iter(values.iter()))
        .with_context(|| format!("upsert fingerprint for simulation {}", record.simulation_id))?;
    Ok(())
}

const SELECT_FINGERPRINT: &str = r#"
    SELECT id, simulation_id, team_type, game_position,
           home_ht, away_ht, home_ft, away_ft,
           combined_fingerprint, created_at
    FROM fingerprints
"#;

pub fn load_fingerprints(conn: &Connection, simulation_id: i64) -> Result<Vec<StoredFingerprint>> {
    query_fingerprints(
        conn,
        &format!("{SELECT_FINGERPRINT} WHERE simulation_id = ?1 ORDER BY team_type, game_position"),
        params![simulation_id],
    )
}

pub fn load_team_sequence(
    conn: &Connection,
    simulation_id: i64,
    team_type: TeamType,
) -> Result<Vec<SequenceEntry>> {
    let rows = query_fingerprints(
        conn,
        &format!(
            "{SELECT_FINGERPRINT} WHERE simulation_id = ?1 AND team_type = ?2 ORDER BY game_position"
        ),
        params![simulation_id, team_type.as_str()],
    )?;
    Ok(rows.iter().map(StoredFingerprint::as_sequence_entry).collect())
}

/// How many stored matches share this exact combined fingerprint.
pub fn count_combined(conn: &Connection, combined: &str) -> Result<usize> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM fingerprints WHERE combined_fingerprint = ?1",
            params![combined],
            |row| row.get(0),
        )
        .context("count combined fingerprint")?;
    Ok(count as usize)
}

pub(crate) fn query_fingerprints(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<StoredFingerprint>> {
    let mut stmt = conn.prepare(sql).context("prepare fingerprint query")?;
    let rows = stmt
        .query_map(params, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                [
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                ],
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
            ))
        })
        .context("query fingerprints")?;

    let mut out = Vec::new();
    for row in rows {
        let (id, simulation_id, team_type, game_position, goals, combined, created_at) =
            row.context("decode fingerprint row")?;
        let [home_ht, away_ht, home_ft, away_ft] = goals;
        let score = MatchScore::new(home_ht, away_ht, home_ft, away_ft)?;
        let fingerprint = fingerprint::encode(score);
        if fingerprint.combined_fingerprint != combined {
            // Rows written by an older encoder; surface them instead of guessing.
            return Err(PatternError::FingerprintDecode {
                raw: combined,
                reason: "stored fingerprint disagrees with stored scores",
            }
            .into());
        }
        out.push(StoredFingerprint {
            id,
            simulation_id,
            team_type: team_type.parse()?,
            game_position,
            fingerprint,
            created_at,
        });
    }
    Ok(out)
}

pub(crate) fn bool_to_i64(v: bool) -> i64 {
    if v { 1 } else { 0 }
}

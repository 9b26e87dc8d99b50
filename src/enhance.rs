use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::engines::PHI;
use crate::fingerprint::MatchScore;
use crate::store::bool_to_i64;

const FIBONACCI: [i64; 12] = [0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NashClass {
    Defensive,
    Attacking,
    Balanced,
    Asymmetric,
}

impl NashClass {
    pub fn of(score: &MatchScore) -> Self {
        let (home, away) = (score.home_ft(), score.away_ft());
        if home == 0 && away == 0 {
            NashClass::Defensive
        } else if home > 2 && away > 2 {
            NashClass::Attacking
        } else if home == away {
            NashClass::Balanced
        } else {
            NashClass::Asymmetric
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NashClass::Defensive => "defensive",
            NashClass::Attacking => "attacking",
            NashClass::Balanced => "balanced",
            NashClass::Asymmetric => "asymmetric",
        }
    }
}

/// Per-match mathematical profile stored in `pattern_enhancements`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternProfile {
    pub progression_ratio: f64,
    pub phi_deviation: f64,
    pub phi_harmony: f64,
    pub is_golden: bool,
    pub fibonacci_index: usize,
    pub fibonacci_strength: f64,
    pub is_fibonacci_total: bool,
    pub shannon_entropy: f64,
    pub quantum_coherence: f64,
    pub strategic_balance: f64,
    pub nash_class: NashClass,
    pub hyperbolic_distance: f64,
    /// Half-time score mirrored at full time.
    pub is_mirror: bool,
}

pub fn profile(score: &MatchScore) -> PatternProfile {
    let ht = score.total_ht();
    let ft = score.total_ft();

    let progression_ratio = if ht > 0 {
        ft as f64 / ht as f64
    } else {
        ft as f64
    };
    let phi_deviation = (progression_ratio - PHI).abs();

    let fibonacci_index = closest_fibonacci_index(ft);
    let fib_gap = (ft - FIBONACCI[fibonacci_index]).abs() as f64;

    let cells = [
        score.home_ht() as f64,
        score.away_ht() as f64,
        score.home_ft() as f64,
        score.away_ft() as f64,
    ];

    let strategic_balance = if ft == 0 {
        0.5
    } else {
        1.0 - score.goal_diff_ft().abs() as f64 / ft as f64
    };

    PatternProfile {
        progression_ratio,
        phi_deviation,
        phi_harmony: 1.0 / (phi_deviation + 0.1),
        is_golden: phi_deviation < 0.08,
        fibonacci_index,
        fibonacci_strength: 1.0 / (fib_gap + 0.1),
        is_fibonacci_total: FIBONACCI.contains(&ft),
        shannon_entropy: cell_entropy(&cells),
        quantum_coherence: (-((ht - ft).abs() as f64) / 3.0).exp(),
        strategic_balance,
        nash_class: NashClass::of(score),
        hyperbolic_distance: cells.iter().map(|c| c * c).sum::<f64>().sqrt(),
        is_mirror: score.home_ht() == score.away_ft() && score.away_ht() == score.home_ft(),
    }
}

fn closest_fibonacci_index(value: i64) -> usize {
    let mut best = 0;
    for (i, fib) in FIBONACCI.iter().enumerate().skip(1) {
        if (value - fib).abs() < (value - FIBONACCI[best]).abs() {
            best = i;
        }
    }
    best
}

// Plain Shannon entropy over the non-zero cells; 0 for a goalless match.
fn cell_entropy(cells: &[f64]) -> f64 {
    let total: f64 = cells.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    -cells
        .iter()
        .filter(|c| **c > 0.0)
        .map(|c| {
            let p = c / total;
            p * p.log2()
        })
        .sum::<f64>()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Discoveries {
    pub golden: usize,
    pub fibonacci: usize,
    pub high_entropy: usize,
    pub coherent: usize,
    pub mirrors: usize,
}

impl Discoveries {
    fn count(&mut self, p: &PatternProfile) {
        self.golden += usize::from(p.is_golden);
        self.fibonacci += usize::from(p.is_fibonacci_total);
        self.high_entropy += usize::from(p.shannon_entropy > 1.5);
        self.coherent += usize::from(p.quantum_coherence > 0.8);
        self.mirrors += usize::from(p.is_mirror);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillSummary {
    pub pending_at_start: usize,
    pub enhanced: usize,
    pub batches_committed: usize,
    pub interrupted: bool,
    pub discoveries: Discoveries,
}

#[derive(Debug, Clone, Copy)]
pub struct BackfillOptions {
    pub batch_size: usize,
    /// Stop after this many rows; `None` processes everything pending.
    pub limit: Option<usize>,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            limit: None,
        }
    }
}

pub fn count_pending(conn: &Connection) -> Result<usize> {
    let n: i64 = conn
        .query_row(
            r#"
            SELECT COUNT(*) FROM fingerprints f
            LEFT JOIN pattern_enhancements e ON e.fingerprint_id = f.id
            WHERE e.fingerprint_id IS NULL
            "#,
            [],
            |row| row.get(0),
        )
        .context("count unenhanced fingerprints")?;
    Ok(n as usize)
}

/// Profiles every stored fingerprint that has no enhancement row yet, oldest
/// first, one transaction per batch. `stop` is checked between batches; a
/// rerun picks up where the last committed batch ended.
pub fn backfill(
    conn: &mut Connection,
    options: BackfillOptions,
    stop: &AtomicBool,
) -> Result<BackfillSummary> {
    let batch_size = options.batch_size.max(1);
    let mut summary = BackfillSummary {
        pending_at_start: count_pending(conn)?,
        ..BackfillSummary::default()
    };
    tracing::info!(
        pending = summary.pending_at_start,
        batch_size,
        "starting pattern enhancement"
    );

    loop {
        if stop.load(Ordering::Relaxed) {
            summary.interrupted = true;
            tracing::warn!(enhanced = summary.enhanced, "pattern enhancement interrupted");
            break;
        }
        let want = match options.limit {
            Some(limit) if summary.enhanced >= limit => break,
            Some(limit) => batch_size.min(limit - summary.enhanced),
            None => batch_size,
        };

        let batch = next_batch(conn, want)?;
        if batch.is_empty() {
            break;
        }

        let profiles: Vec<(i64, PatternProfile)> = batch
            .par_iter()
            .map(|(id, score)| (*id, profile(score)))
            .collect();

        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction().context("begin enhancement transaction")?;
        for (id, p) in &profiles {
            insert_profile(&tx, *id, p, &now)?;
        }
        tx.commit().context("commit enhancement transaction")?;

        for (_, p) in &profiles {
            summary.discoveries.count(p);
        }
        summary.enhanced += profiles.len();
        summary.batches_committed += 1;
        tracing::info!(
            batch = summary.batches_committed,
            enhanced = summary.enhanced,
            total = summary.pending_at_start,
            "enhancement batch committed"
        );
    }

    Ok(summary)
}

fn next_batch(conn: &Connection, size: usize) -> Result<Vec<(i64, MatchScore)>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT f.id, f.home_ht, f.away_ht, f.home_ft, f.away_ft
            FROM fingerprints f
            LEFT JOIN pattern_enhancements e ON e.fingerprint_id = f.id
            WHERE e.fingerprint_id IS NULL
            ORDER BY f.created_at ASC, f.id ASC
            LIMIT ?1
            "#,
        )
        .context("prepare enhancement batch query")?;
    let rows = stmt
        .query_map(params![size as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })
        .context("query enhancement batch")?;

    let mut out = Vec::new();
    for row in rows {
        let (id, hh, ah, hf, af) = row.context("decode enhancement row")?;
        out.push((id, MatchScore::new(hh, ah, hf, af)?));
    }
    Ok(out)
}

fn insert_profile(
    tx: &rusqlite::Transaction<'_>,
    fingerprint_id: i64,
    p: &PatternProfile,
    enhanced_at: &str,
) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO pattern_enhancements (
            fingerprint_id, progression_ratio, phi_deviation, phi_harmony, is_golden,
            fibonacci_index, fibonacci_strength, is_fibonacci_total, shannon_entropy,
            quantum_coherence, strategic_balance, nash_class, hyperbolic_distance,
            is_mirror, enhanced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            fingerprint_id,
            p.progression_ratio,
            p.phi_deviation,
            p.phi_harmony,
            bool_to_i64(p.is_golden),
            p.fibonacci_index as i64,
            p.fibonacci_strength,
            bool_to_i64(p.is_fibonacci_total),
            p.shannon_entropy,
            p.quantum_coherence,
            p.strategic_balance,
            p.nash_class.as_str(),
            p.hyperbolic_distance,
            bool_to_i64(p.is_mirror),
            enhanced_at,
        ],
    )
    .with_context(|| format!("insert enhancement for fingerprint {fingerprint_id}"))?;
    Ok(())
}

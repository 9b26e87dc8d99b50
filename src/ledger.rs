use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::error::{PatternError, PatternResult};
use crate::fingerprint::{self, MatchScore};
use crate::store::bool_to_i64;

#[derive(Debug, Clone, PartialEq)]
pub struct NewOutcome {
    pub pattern_fingerprint: String,
    pub market_type: String,
    pub predicted_outcome: bool,
    pub confidence_level: f64,
    pub simulation_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningOutcome {
    pub id: i64,
    pub pattern_fingerprint: String,
    pub market_type: String,
    pub predicted_outcome: bool,
    pub actual_outcome: Option<bool>,
    pub confidence_level: f64,
    pub simulation_id: Option<i64>,
    pub prediction_date: String,
    pub result_date: Option<String>,
}

impl LearningOutcome {
    pub fn is_correct(&self) -> Option<bool> {
        self.actual_outcome.map(|a| a == self.predicted_outcome)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStatus {
    Settled,
    /// Row already carried the same actual outcome; nothing written.
    AlreadySettled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketAccuracy {
    pub market_type: String,
    pub settled: i64,
    pub correct: i64,
    pub accuracy: f64,
}

pub fn record(conn: &Connection, outcome: &NewOutcome) -> PatternResult<i64> {
    validate(outcome)?;
    insert(conn, outcome)?;
    Ok(conn.last_insert_rowid())
}

/// Records every market of one prediction atomically.
pub fn record_batch(conn: &Connection, outcomes: &[NewOutcome]) -> PatternResult<Vec<i64>> {
    for outcome in outcomes {
        validate(outcome)?;
    }
    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        insert(&tx, outcome)?;
        ids.push(tx.last_insert_rowid());
    }
    tx.commit()?;
    Ok(ids)
}

fn validate(outcome: &NewOutcome) -> PatternResult<()> {
    if outcome.pattern_fingerprint.trim().is_empty() || outcome.market_type.trim().is_empty() {
        return Err(PatternError::InvalidInput(
            "learning outcome needs a fingerprint and a market".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&outcome.confidence_level) {
        return Err(PatternError::InvalidInput(format!(
            "confidence {} outside 0..=1",
            outcome.confidence_level
        )));
    }
    Ok(())
}

fn insert(conn: &Connection, outcome: &NewOutcome) -> PatternResult<()> {
    conn.execute(
        r#"
        INSERT INTO learning_outcomes (
            pattern_fingerprint, market_type, predicted_outcome, confidence_level,
            simulation_id, prediction_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            outcome.pattern_fingerprint,
            outcome.market_type,
            bool_to_i64(outcome.predicted_outcome),
            outcome.confidence_level,
            outcome.simulation_id,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: i64) -> PatternResult<LearningOutcome> {
    conn.query_row(
        &format!("{SELECT_OUTCOME} WHERE id = ?1"),
        params![id],
        decode_outcome,
    )
    .optional()?
    .ok_or(PatternError::UnknownOutcome(id))
}

/// Writes the actual outcome once. Settling again with the same value is
/// reported as [`SettleStatus::AlreadySettled`]; a different value is a
/// [`PatternError::DoubleSettlement`] and the first value stays.
pub fn settle(conn: &Connection, id: i64, actual: bool) -> PatternResult<SettleStatus> {
    let changed = conn.execute(
        "UPDATE learning_outcomes SET actual_outcome = ?1, result_date = ?2
         WHERE id = ?3 AND actual_outcome IS NULL",
        params![bool_to_i64(actual), Utc::now().to_rfc3339(), id],
    )?;
    if changed == 1 {
        return Ok(SettleStatus::Settled);
    }

    let row = get(conn, id)?;
    match row.actual_outcome {
        Some(existing) if existing == actual => {
            tracing::debug!(id, "learning outcome already settled with the same value");
            Ok(SettleStatus::AlreadySettled)
        }
        Some(existing) => {
            tracing::warn!(id, existing, attempted = actual, "conflicting settlement ignored");
            Err(PatternError::DoubleSettlement { id, existing })
        }
        None => Err(PatternError::UnknownOutcome(id)),
    }
}

/// Settles every pending row of `simulation_id` from the final score. Rows
/// whose market cannot be read off a fingerprint stay pending.
pub fn settle_simulation(
    conn: &Connection,
    simulation_id: i64,
    score: MatchScore,
) -> PatternResult<Vec<LearningOutcome>> {
    let tx = conn.unchecked_transaction()?;
    let settled = settle_rows(&tx, simulation_id, score)?;
    tx.commit()?;
    Ok(settled)
}

/// [`settle_simulation`] without its own transaction, for callers that
/// settle and learn in one.
pub(crate) fn settle_rows(
    conn: &Connection,
    simulation_id: i64,
    score: MatchScore,
) -> PatternResult<Vec<LearningOutcome>> {
    let fp = fingerprint::encode(score);
    let pending = pending_for_simulation(conn, simulation_id)?;
    let now = Utc::now().to_rfc3339();

    let mut settled = Vec::new();
    for mut row in pending {
        let Some(actual) = resolve_market(&fp, &row.market_type) else {
            tracing::warn!(
                id = row.id,
                market = row.market_type.as_str(),
                "market not derivable from a score, left pending"
            );
            continue;
        };
        let changed = conn.execute(
            "UPDATE learning_outcomes SET actual_outcome = ?1, result_date = ?2
             WHERE id = ?3 AND actual_outcome IS NULL",
            params![bool_to_i64(actual), now, row.id],
        )?;
        if changed == 1 {
            row.actual_outcome = Some(actual);
            row.result_date = Some(now.clone());
            settled.push(row);
        }
    }

    tracing::info!(simulation_id, settled = settled.len(), "settled learning outcomes");
    Ok(settled)
}

/// Settled rows of a known threshold pattern that have not been fed back yet,
/// oldest first.
pub(crate) fn unapplied_threshold_rows(conn: &Connection) -> PatternResult<Vec<LearningOutcome>> {
    query_outcomes(
        conn,
        &format!(
            "{SELECT_OUTCOME} WHERE actual_outcome IS NOT NULL AND threshold_applied = 0
               AND pattern_fingerprint IN (SELECT pattern_type FROM adaptive_thresholds)
             ORDER BY id"
        ),
        [],
    )
}

pub(crate) fn mark_threshold_applied(conn: &Connection, id: i64) -> PatternResult<()> {
    conn.execute(
        "UPDATE learning_outcomes SET threshold_applied = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Mean of `predicted − actual` over the `window` most recently settled rows
/// of `pattern`. `None` when nothing is settled.
pub(crate) fn recent_signed_error(
    conn: &Connection,
    pattern: &str,
    window: usize,
) -> PatternResult<Option<f64>> {
    let rows = query_outcomes(
        conn,
        &format!(
            "{SELECT_OUTCOME} WHERE actual_outcome IS NOT NULL AND pattern_fingerprint = ?1
             ORDER BY result_date DESC, id DESC LIMIT ?2"
        ),
        params![pattern, window as i64],
    )?;
    let errors: Vec<f64> = rows
        .iter()
        .filter_map(|r| {
            r.actual_outcome
                .map(|a| bool_to_i64(r.predicted_outcome) as f64 - bool_to_i64(a) as f64)
        })
        .collect();
    if errors.is_empty() {
        return Ok(None);
    }
    Ok(Some(errors.iter().sum::<f64>() / errors.len() as f64))
}

fn resolve_market(fp: &fingerprint::Fingerprint, market_type: &str) -> Option<bool> {
    match market_type {
        crate::thresholds::GOAL_TOTAL_MARKET => Some(fp.over_2_5),
        other => fp.market(other),
    }
}

pub fn pending(conn: &Connection) -> PatternResult<Vec<LearningOutcome>> {
    query_outcomes(
        conn,
        &format!("{SELECT_OUTCOME} WHERE actual_outcome IS NULL ORDER BY id"),
        [],
    )
}

pub fn pending_for_simulation(
    conn: &Connection,
    simulation_id: i64,
) -> PatternResult<Vec<LearningOutcome>> {
    query_outcomes(
        conn,
        &format!(
            "{SELECT_OUTCOME} WHERE actual_outcome IS NULL AND simulation_id = ?1 ORDER BY id"
        ),
        params![simulation_id],
    )
}

pub fn accuracy_by_market(conn: &Connection) -> PatternResult<Vec<MarketAccuracy>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT market_type,
               COUNT(*),
               SUM(CASE WHEN predicted_outcome = actual_outcome THEN 1 ELSE 0 END)
        FROM learning_outcomes
        WHERE actual_outcome IS NOT NULL
        GROUP BY market_type
        ORDER BY market_type
        "#,
    )?;
    let rows = stmt.query_map([], |row| {
        let settled: i64 = row.get(1)?;
        let correct: i64 = row.get(2)?;
        Ok(MarketAccuracy {
            market_type: row.get(0)?,
            settled,
            correct,
            accuracy: if settled > 0 {
                correct as f64 / settled as f64
            } else {
                0.0
            },
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Hit rate over the `window` most recently settled rows of `market_type`.
pub fn rolling_accuracy(
    conn: &Connection,
    market_type: &str,
    window: usize,
) -> PatternResult<Option<f64>> {
    if window == 0 {
        return Err(PatternError::InvalidInput("rolling window must be positive".to_string()));
    }
    let rows = query_outcomes(
        conn,
        &format!(
            "{SELECT_OUTCOME} WHERE actual_outcome IS NOT NULL AND market_type = ?1
             ORDER BY result_date DESC, id DESC LIMIT ?2"
        ),
        params![market_type, window as i64],
    )?;
    if rows.is_empty() {
        return Ok(None);
    }
    let correct = rows.iter().filter(|r| r.is_correct() == Some(true)).count();
    Ok(Some(correct as f64 / rows.len() as f64))
}

const SELECT_OUTCOME: &str = r#"
    SELECT id, pattern_fingerprint, market_type, predicted_outcome, actual_outcome,
           confidence_level, simulation_id, prediction_date, result_date
    FROM learning_outcomes
"#;

fn query_outcomes(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> PatternResult<Vec<LearningOutcome>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, decode_outcome)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn decode_outcome(row: &Row<'_>) -> rusqlite::Result<LearningOutcome> {
    Ok(LearningOutcome {
        id: row.get(0)?,
        pattern_fingerprint: row.get(1)?,
        market_type: row.get(2)?,
        predicted_outcome: row.get::<_, i64>(3)? != 0,
        actual_outcome: row.get::<_, Option<i64>>(4)?.map(|v| v != 0),
        confidence_level: row.get(5)?,
        simulation_id: row.get(6)?,
        prediction_date: row.get(7)?,
        result_date: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;

    fn outcome(market: &str, predicted: bool) -> NewOutcome {
        NewOutcome {
            pattern_fingerprint: "W(1-0,ng,u1.5)→W(2-1,gg,o2.5,m1,2h2)".to_string(),
            market_type: market.to_string(),
            predicted_outcome: predicted,
            confidence_level: 0.6,
            simulation_id: Some(11),
        }
    }

    #[test]
    fn record_rejects_bad_confidence() {
        let conn = store::open_in_memory().unwrap();
        let mut bad = outcome("over_3_5", true);
        bad.confidence_level = 1.5;
        assert!(matches!(record(&conn, &bad), Err(PatternError::InvalidInput(_))));
    }

    #[test]
    fn unknown_market_stays_pending() {
        let conn = store::open_in_memory().unwrap();
        record(&conn, &outcome("corners_over_9_5", true)).unwrap();
        let settled =
            settle_simulation(&conn, 11, MatchScore::from_counts(1, 0, 2, 1)).unwrap();
        assert!(settled.is_empty());
        assert_eq!(pending(&conn).unwrap().len(), 1);
    }

    #[test]
    fn settling_missing_row_is_unknown() {
        let conn = store::open_in_memory().unwrap();
        assert!(matches!(settle(&conn, 99, true), Err(PatternError::UnknownOutcome(99))));
    }
}

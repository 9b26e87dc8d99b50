use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::error::{PatternError, PatternResult};
use crate::fingerprint::MatchScore;
use crate::ledger::{self, LearningOutcome, NewOutcome};

/// Settled predictions a pattern needs before it counts as learning.
pub const LEARNING_MIN_PREDICTIONS: i64 = 10;

/// Settled predictions a pattern needs before its penalty may move.
pub const ADJUST_MIN_PREDICTIONS: i64 = 15;

/// Settled ledger rows averaged into `recent_avg_error`.
pub const RECENT_ERROR_WINDOW: usize = 20;

/// Recent mean signed error the penalty ignores.
pub const BIAS_TOLERANCE: f64 = 0.2;

/// Market recorded for threshold-driven goal predictions.
pub const GOAL_TOTAL_MARKET: &str = "goal_total";

#[derive(Debug, Clone, Copy)]
pub struct ThresholdSeed {
    pub pattern_type: &'static str,
    pub penalty: f64,
    pub learning_rate: f64,
    pub confidence_threshold: f64,
    pub min_penalty: f64,
    pub max_penalty: f64,
}

const fn seed(
    pattern_type: &'static str,
    penalty: f64,
    learning_rate: f64,
    confidence_threshold: f64,
    min_penalty: f64,
    max_penalty: f64,
) -> ThresholdSeed {
    ThresholdSeed {
        pattern_type,
        penalty,
        learning_rate,
        confidence_threshold,
        min_penalty,
        max_penalty,
    }
}

pub const DEFAULT_SEEDS: [ThresholdSeed; 8] = [
    seed("home_over_dominance", -0.25, 0.02, 0.70, -0.50, 0.0),
    seed("away_over_dominance", -0.25, 0.02, 0.70, -0.50, 0.0),
    seed("home_unbeaten_streak", -0.18, 0.015, 0.75, -0.35, 0.0),
    seed("away_unbeaten_streak", -0.18, 0.015, 0.75, -0.35, 0.0),
    seed("h2h_over_pattern", -0.30, 0.025, 0.75, -0.60, 0.0),
    seed("h2h_under_pattern", 0.20, 0.02, 0.75, -0.10, 0.50),
    seed("home_win_dominance", -0.13, 0.02, 0.70, -0.50, 0.0),
    seed("away_win_dominance", -0.13, 0.02, 0.70, -0.50, 0.0),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptiveThreshold {
    pub pattern_type: String,
    pub current_penalty: f64,
    pub original_penalty: f64,
    pub min_penalty: f64,
    pub max_penalty: f64,
    pub learning_rate: f64,
    pub confidence_threshold: f64,
    pub total_predictions: i64,
    pub successful_predictions: i64,
    pub total_error: f64,
    pub avg_error: f64,
    /// Mean signed error (`predicted − actual`) of the recent settled rows.
    pub recent_avg_error: f64,
    pub last_adjustment: f64,
    pub adjustment_count: i64,
    pub last_adjusted_at: Option<String>,
}

impl AdaptiveThreshold {
    pub fn success_rate(&self) -> f64 {
        self.successful_predictions as f64 / self.total_predictions.max(1) as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdUpdate {
    pub pattern_type: String,
    pub old_penalty: f64,
    pub new_penalty: f64,
    /// Applied change after clamping.
    pub adjustment: f64,
    pub clamped: bool,
    pub error: f64,
    pub success: bool,
    pub recent_avg_error: f64,
    pub total_predictions: i64,
    pub success_rate: f64,
}

/// Result of settling a simulation and learning from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub settled: Vec<LearningOutcome>,
    pub updates: Vec<ThresholdUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningStats {
    pub total_patterns: usize,
    pub learning_patterns: usize,
    pub avg_drift: f64,
    pub best_performer: Option<String>,
    pub worst_performer: Option<String>,
    pub total_adjustments: i64,
}

/// Owner of the `adaptive_thresholds` rows. Mutation goes through `&mut self`,
/// so one store value is the single writer for its connection.
pub struct ThresholdStore<'c> {
    conn: &'c Connection,
}

impl<'c> ThresholdStore<'c> {
    /// Wraps `conn` and inserts the default pattern types that are missing.
    pub fn new(conn: &'c Connection) -> PatternResult<Self> {
        Self::with_seeds(conn, &DEFAULT_SEEDS)
    }

    pub fn with_seeds(conn: &'c Connection, seeds: &[ThresholdSeed]) -> PatternResult<Self> {
        let now = Utc::now().to_rfc3339();
        for s in seeds {
            if !(s.min_penalty..=s.max_penalty).contains(&s.penalty) {
                return Err(PatternError::InvalidInput(format!(
                    "seed {} penalty {} outside {}..={}",
                    s.pattern_type, s.penalty, s.min_penalty, s.max_penalty
                )));
            }
            conn.execute(
                r#"
                INSERT OR IGNORE INTO adaptive_thresholds (
                    pattern_type, current_penalty, original_penalty, min_penalty, max_penalty,
                    learning_rate, confidence_threshold, created_at
                ) VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    s.pattern_type,
                    s.penalty,
                    s.min_penalty,
                    s.max_penalty,
                    s.learning_rate,
                    s.confidence_threshold,
                    now
                ],
            )?;
        }
        Ok(Self { conn })
    }

    pub fn get(&self, pattern_type: &str) -> PatternResult<AdaptiveThreshold> {
        load(self.conn, pattern_type)
    }

    pub fn all(&self) -> PatternResult<Vec<AdaptiveThreshold>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_THRESHOLD} ORDER BY pattern_type"))?;
        let rows = stmt.query_map([], decode_threshold)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn is_known(&self, pattern_type: &str) -> PatternResult<bool> {
        match self.get(pattern_type) {
            Ok(_) => Ok(true),
            Err(PatternError::UnknownPattern(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Penalty to apply for a detection made with `confidence`; zero below
    /// the pattern's confidence threshold.
    pub fn learned_penalty(&self, pattern_type: &str, confidence: f64) -> PatternResult<f64> {
        let threshold = self.get(pattern_type)?;
        if confidence < threshold.confidence_threshold {
            return Ok(0.0);
        }
        Ok(threshold.current_penalty * confidence)
    }

    /// Feeds one settled prediction back into the pattern. Counters always
    /// move; the penalty only moves once the pattern has
    /// [`ADJUST_MIN_PREDICTIONS`] outcomes and its recent mean signed error
    /// leaves [`BIAS_TOLERANCE`]. Over-predicting then steps toward
    /// `min_penalty`, under-predicting toward `max_penalty`, by
    /// `learning_rate`. Out-of-range results are clamped and logged.
    pub fn apply_outcome(
        &mut self,
        pattern_type: &str,
        predicted: bool,
        actual: bool,
    ) -> PatternResult<ThresholdUpdate> {
        let tx = self.conn.unchecked_transaction()?;
        let update = apply(&tx, pattern_type, predicted, actual)?;
        tx.commit()?;
        Ok(update)
    }

    /// Settles every pending ledger row of `simulation_id` from `score` and
    /// feeds the settled threshold rows back, in one transaction. Rows
    /// settled earlier that never reached their pattern are fed back too.
    pub fn learn_from_simulation(
        &mut self,
        simulation_id: i64,
        score: MatchScore,
    ) -> PatternResult<Feedback> {
        let tx = self.conn.unchecked_transaction()?;
        let settled = ledger::settle_rows(&tx, simulation_id, score)?;
        let updates = apply_unapplied(&tx)?;
        tx.commit()?;

        tracing::info!(
            simulation_id,
            settled = settled.len(),
            updates = updates.len(),
            "learned from simulation"
        );
        Ok(Feedback { settled, updates })
    }

    /// Feeds back every settled threshold row not applied yet.
    pub fn apply_settled(&mut self) -> PatternResult<Vec<ThresholdUpdate>> {
        let tx = self.conn.unchecked_transaction()?;
        let updates = apply_unapplied(&tx)?;
        tx.commit()?;
        Ok(updates)
    }

    /// Logs a goal-total prediction for `pattern_type` in the ledger so the
    /// feedback job can learn from it. Detections below the confidence
    /// threshold are not recorded.
    pub fn record_prediction(
        &self,
        pattern_type: &str,
        predicted_goals: f64,
        confidence: f64,
        simulation_id: i64,
    ) -> PatternResult<Option<i64>> {
        let threshold = self.get(pattern_type)?;
        if confidence < threshold.confidence_threshold {
            return Ok(None);
        }
        let id = ledger::record(
            self.conn,
            &NewOutcome {
                pattern_fingerprint: pattern_type.to_string(),
                market_type: GOAL_TOTAL_MARKET.to_string(),
                predicted_outcome: predicted_goals > 2.5,
                confidence_level: confidence,
                simulation_id: Some(simulation_id),
            },
        )?;
        Ok(Some(id))
    }

    /// Puts the pattern back to its original penalty and clears its counters.
    pub fn reset(&mut self, pattern_type: &str) -> PatternResult<AdaptiveThreshold> {
        let changed = self.conn.execute(
            r#"
            UPDATE adaptive_thresholds
            SET current_penalty = original_penalty,
                total_predictions = 0,
                successful_predictions = 0,
                total_error = 0,
                avg_error = 0,
                recent_avg_error = 0,
                last_adjustment = 0,
                adjustment_count = 0,
                last_adjusted_at = NULL
            WHERE pattern_type = ?1
            "#,
            params![pattern_type],
        )?;
        if changed == 0 {
            return Err(PatternError::UnknownPattern(pattern_type.to_string()));
        }
        self.get(pattern_type)
    }

    pub fn learning_stats(&self) -> PatternResult<LearningStats> {
        let all = self.all()?;
        let learning: Vec<&AdaptiveThreshold> = all
            .iter()
            .filter(|t| t.total_predictions >= LEARNING_MIN_PREDICTIONS)
            .collect();

        let drifts: Vec<f64> = learning
            .iter()
            .filter(|t| t.original_penalty != 0.0)
            .map(|t| (t.current_penalty - t.original_penalty).abs() / t.original_penalty.abs())
            .collect();
        let avg_drift = if drifts.is_empty() {
            0.0
        } else {
            drifts.iter().sum::<f64>() / drifts.len() as f64
        };

        // Ties keep the earliest pattern in name order.
        let mut best: Option<&AdaptiveThreshold> = None;
        let mut worst: Option<&AdaptiveThreshold> = None;
        for t in &learning {
            if best.is_none_or(|b| t.success_rate() > b.success_rate()) {
                best = Some(t);
            }
            if worst.is_none_or(|w| t.success_rate() < w.success_rate()) {
                worst = Some(t);
            }
        }

        Ok(LearningStats {
            total_patterns: all.len(),
            learning_patterns: learning.len(),
            avg_drift,
            best_performer: best.map(|t| t.pattern_type.clone()),
            worst_performer: worst.map(|t| t.pattern_type.clone()),
            total_adjustments: all.iter().map(|t| t.adjustment_count).sum(),
        })
    }
}

const SELECT_THRESHOLD: &str = r#"
    SELECT pattern_type, current_penalty, original_penalty, min_penalty, max_penalty,
           learning_rate, confidence_threshold, total_predictions, successful_predictions,
           total_error, avg_error, recent_avg_error, last_adjustment, adjustment_count,
           last_adjusted_at
    FROM adaptive_thresholds
"#;

fn load(conn: &Connection, pattern_type: &str) -> PatternResult<AdaptiveThreshold> {
    conn.query_row(
        &format!("{SELECT_THRESHOLD} WHERE pattern_type = ?1"),
        params![pattern_type],
        decode_threshold,
    )
    .optional()?
    .ok_or_else(|| PatternError::UnknownPattern(pattern_type.to_string()))
}

fn apply_unapplied(conn: &Connection) -> PatternResult<Vec<ThresholdUpdate>> {
    let rows = ledger::unapplied_threshold_rows(conn)?;
    let mut updates = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(actual) = row.actual_outcome else {
            continue;
        };
        updates.push(apply(conn, &row.pattern_fingerprint, row.predicted_outcome, actual)?);
        ledger::mark_threshold_applied(conn, row.id)?;
    }
    Ok(updates)
}

fn apply(
    conn: &Connection,
    pattern_type: &str,
    predicted: bool,
    actual: bool,
) -> PatternResult<ThresholdUpdate> {
    let current = load(conn, pattern_type)?;

    let signed_error = bool_to_f64(predicted) - bool_to_f64(actual);
    let error = signed_error.abs();
    let success = error < 0.5;

    let total_predictions = current.total_predictions + 1;
    let successful_predictions = current.successful_predictions + i64::from(success);
    let total_error = current.total_error + error;
    let avg_error = total_error / total_predictions as f64;

    // Without settled ledger rows the outcome at hand is the recent window.
    let recent_avg_error = if total_predictions >= LEARNING_MIN_PREDICTIONS {
        ledger::recent_signed_error(conn, pattern_type, RECENT_ERROR_WINDOW)?
            .unwrap_or(signed_error)
    } else {
        current.recent_avg_error
    };

    let step = if total_predictions >= ADJUST_MIN_PREDICTIONS
        && recent_avg_error.abs() > BIAS_TOLERANCE
    {
        -current.learning_rate * recent_avg_error.signum()
    } else {
        0.0
    };
    let raw = current.current_penalty + step;
    let new_penalty = raw.clamp(current.min_penalty, current.max_penalty);
    let clamped = new_penalty != raw;
    if clamped {
        tracing::warn!(
            pattern_type,
            raw,
            new_penalty,
            min = current.min_penalty,
            max = current.max_penalty,
            "threshold update clamped"
        );
    }
    let adjustment = new_penalty - current.current_penalty;
    let adjustment_count = current.adjustment_count + i64::from(adjustment != 0.0);

    conn.execute(
        r#"
        UPDATE adaptive_thresholds
        SET current_penalty = ?1,
            total_predictions = ?2,
            successful_predictions = ?3,
            total_error = ?4,
            avg_error = ?5,
            recent_avg_error = ?6,
            last_adjustment = ?7,
            adjustment_count = ?8,
            last_adjusted_at = ?9
        WHERE pattern_type = ?10
        "#,
        params![
            new_penalty,
            total_predictions,
            successful_predictions,
            total_error,
            avg_error,
            recent_avg_error,
            adjustment,
            adjustment_count,
            Utc::now().to_rfc3339(),
            pattern_type
        ],
    )?;

    tracing::debug!(
        pattern_type,
        old = current.current_penalty,
        new = new_penalty,
        recent_avg_error,
        "threshold updated"
    );

    Ok(ThresholdUpdate {
        pattern_type: pattern_type.to_string(),
        old_penalty: current.current_penalty,
        new_penalty,
        adjustment,
        clamped,
        error,
        success,
        recent_avg_error,
        total_predictions,
        success_rate: successful_predictions as f64 / total_predictions as f64,
    })
}

fn decode_threshold(row: &Row<'_>) -> rusqlite::Result<AdaptiveThreshold> {
    Ok(AdaptiveThreshold {
        pattern_type: row.get(0)?,
        current_penalty: row.get(1)?,
        original_penalty: row.get(2)?,
        min_penalty: row.get(3)?,
        max_penalty: row.get(4)?,
        learning_rate: row.get(5)?,
        confidence_threshold: row.get(6)?,
        total_predictions: row.get(7)?,
        successful_predictions: row.get(8)?,
        total_error: row.get(9)?,
        avg_error: row.get(10)?,
        recent_avg_error: row.get(11)?,
        last_adjustment: row.get(12)?,
        adjustment_count: row.get(13)?,
        last_adjusted_at: row.get(14)?,
    })
}

fn bool_to_f64(v: bool) -> f64 {
    if v { 1.0 } else { 0.0 }
}

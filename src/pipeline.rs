use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::context::{self, ContextPattern};
use crate::fingerprint;
use crate::goal_stats::{GoalStats, HistoricalMatch, MatchHistory, TeamType};
use crate::ledger::{self, NewOutcome};
use crate::markets::{self, GoalMarket, MarketOdds, Projection};
use crate::sequence::{self, PatternAnalysis, SequenceEntry};
use crate::store;
use crate::thresholds::ThresholdStore;
use crate::trends::{self, GoalTrend};

/// Bound on the summed learned penalties applied to expected goals.
pub const MAX_GOAL_ADJUSTMENT: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamForm {
    pub team_type: TeamType,
    pub games: usize,
    pub sequence_fingerprint: String,
    pub analysis: PatternAnalysis,
}

/// A detected goal trend with the penalty its threshold currently applies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSignal {
    #[serde(flatten)]
    pub trend: GoalTrend,
    pub learned_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurringFingerprint {
    pub team_type: TeamType,
    pub combined_fingerprint: String,
    /// Stored matches carrying the same combined fingerprint.
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionReport {
    pub simulation_id: i64,
    pub matches: usize,
    pub stats_window: usize,
    pub avg_total_goals: f64,
    pub avg_ht_goals: f64,
    /// Summed learned penalties of the detected trends, bounded.
    pub goal_adjustment: f64,
    /// Window average after the learned penalties; the projection reads this.
    pub expected_total_goals: f64,
    pub projection: Projection,
    pub home_form: TeamForm,
    pub away_form: TeamForm,
    pub context: ContextPattern,
    pub context_issues: Vec<&'static str>,
    pub trends: Vec<TrendSignal>,
    pub recurring: Vec<RecurringFingerprint>,
    /// Ledger rows written for this prediction.
    pub recorded_outcomes: Vec<i64>,
}

/// Prediction from in-memory records only: no thresholds, no ledger, so
/// expected goals are the plain window average.
pub fn predict_from_records(
    records: &[HistoricalMatch],
    simulation_id: i64,
    config: &PipelineConfig,
    odds: &MarketOdds,
) -> PredictionReport {
    let history = MatchHistory::partition(simulation_id, records);
    let home = sequence_entries(&history.home, TeamType::Home);
    let away = sequence_entries(&history.away, TeamType::Away);
    let trends = trends::detect_goal_trends(&history)
        .into_iter()
        .map(|trend| TrendSignal {
            trend,
            learned_penalty: 0.0,
        })
        .collect();
    assemble(simulation_id, &history, &home, &away, trends, config, odds)
}

/// Prediction for a stored simulation. Each detected goal trend applies its
/// learned penalty to the expected goals. With `record` set, both goal
/// markets and every confident goal trend are written to the learning ledger.
pub fn predict_stored(
    conn: &Connection,
    simulation_id: i64,
    config: &PipelineConfig,
    odds: &MarketOdds,
    record: bool,
) -> Result<PredictionReport> {
    let stored = store::load_fingerprints(conn, simulation_id)?;
    let records: Vec<HistoricalMatch> = stored.iter().map(|s| s.as_historical()).collect();
    let history = MatchHistory::partition(simulation_id, &records);
    let home = store::load_team_sequence(conn, simulation_id, TeamType::Home)?;
    let away = store::load_team_sequence(conn, simulation_id, TeamType::Away)?;

    let thresholds = ThresholdStore::new(conn).context("seed adaptive thresholds")?;
    let mut signals = Vec::new();
    for trend in trends::detect_goal_trends(&history) {
        let learned_penalty = thresholds
            .learned_penalty(trend.pattern_type, trend.confidence)
            .with_context(|| format!("learned penalty for {}", trend.pattern_type))?;
        signals.push(TrendSignal {
            trend,
            learned_penalty,
        });
    }

    let mut report = assemble(simulation_id, &history, &home, &away, signals, config, odds);

    for (team_type, games) in [(TeamType::Home, &home), (TeamType::Away, &away)] {
        let Some(latest) = games.iter().min_by_key(|g| g.game_position) else {
            continue;
        };
        let occurrences = store::count_combined(conn, &latest.combined_fingerprint)?;
        report.recurring.push(RecurringFingerprint {
            team_type,
            combined_fingerprint: latest.combined_fingerprint.clone(),
            occurrences,
        });
    }

    if record {
        report.recorded_outcomes = record_report(conn, &report, &thresholds)?;
    }

    tracing::info!(
        simulation_id,
        matches = report.matches,
        goal_adjustment = report.goal_adjustment,
        over_3_5 = report.projection.over_3_5.probability,
        recorded = report.recorded_outcomes.len(),
        "prediction complete"
    );
    Ok(report)
}

fn assemble(
    simulation_id: i64,
    history: &MatchHistory,
    home: &[SequenceEntry],
    away: &[SequenceEntry],
    trends: Vec<TrendSignal>,
    config: &PipelineConfig,
    odds: &MarketOdds,
) -> PredictionReport {
    let stats = GoalStats::from_history(history, config.recent_window);
    let goal_adjustment = goal_adjustment(&trends);
    let avg_total_goals = stats.avg_total_goals;
    let avg_ht_goals = stats.avg_ht_goals;
    let expected = stats.with_goal_adjustment(goal_adjustment);
    let projection = markets::project(&expected, &config.projector, odds);
    let context = context::encode_context(history);
    let context_issues = context::context_issues(&context);

    PredictionReport {
        simulation_id,
        matches: history.len(),
        stats_window: expected.matches.len(),
        avg_total_goals,
        avg_ht_goals,
        goal_adjustment,
        expected_total_goals: expected.avg_total_goals,
        projection,
        home_form: team_form(TeamType::Home, home),
        away_form: team_form(TeamType::Away, away),
        context,
        context_issues,
        trends,
        recurring: Vec::new(),
        recorded_outcomes: Vec::new(),
    }
}

fn goal_adjustment(trends: &[TrendSignal]) -> f64 {
    trends
        .iter()
        .map(|t| t.learned_penalty)
        .sum::<f64>()
        .clamp(-MAX_GOAL_ADJUSTMENT, MAX_GOAL_ADJUSTMENT)
}

fn team_form(team_type: TeamType, games: &[SequenceEntry]) -> TeamForm {
    TeamForm {
        team_type,
        games: games.len(),
        sequence_fingerprint: sequence::sequence_fingerprint(games),
        analysis: sequence::analyze_windows(games),
    }
}

fn sequence_entries(matches: &[HistoricalMatch], team_type: TeamType) -> Vec<SequenceEntry> {
    matches
        .iter()
        .map(|m| SequenceEntry {
            result: team_type.perspective_result(&m.score),
            game_position: m.game_position,
            combined_fingerprint: fingerprint::encode(m.score).combined_fingerprint,
        })
        .collect()
}

fn record_report(
    conn: &Connection,
    report: &PredictionReport,
    thresholds: &ThresholdStore<'_>,
) -> Result<Vec<i64>> {
    let outcomes: Vec<NewOutcome> = [GoalMarket::Over35, GoalMarket::Over45]
        .into_iter()
        .map(|market| {
            let projected = report.projection.market(market);
            NewOutcome {
                pattern_fingerprint: report.context.pattern_id.clone(),
                market_type: market.as_str().to_string(),
                predicted_outcome: projected.probability > 0.5,
                confidence_level: projected.confidence,
                simulation_id: Some(report.simulation_id),
            }
        })
        .collect();
    let mut ids = ledger::record_batch(conn, &outcomes).context("record market predictions")?;

    for signal in &report.trends {
        let recorded = thresholds
            .record_prediction(
                signal.trend.pattern_type,
                report.avg_total_goals,
                signal.trend.confidence,
                report.simulation_id,
            )
            .with_context(|| format!("record {} prediction", signal.trend.pattern_type))?;
        ids.extend(recorded);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(team_type: TeamType, pos: u32, hh: i64, ah: i64, hf: i64, af: i64) -> HistoricalMatch {
        HistoricalMatch::new(7, team_type, pos, hh, ah, hf, af).unwrap()
    }

    #[test]
    fn empty_records_fall_back_to_base_rate() {
        let report = predict_from_records(&[], 7, &PipelineConfig::default(), &MarketOdds::default());
        assert!(report.projection.no_historical_data);
        assert_eq!(report.projection.over_3_5.probability, 0.27);
        assert_eq!(report.home_form.sequence_fingerprint, "NO_GAMES");
        assert_eq!(report.context.h2h, "NO_H2H_DATA");
    }

    #[test]
    fn away_form_reads_from_the_away_side() {
        let records = vec![m(TeamType::Away, 1, 0, 1, 0, 2), m(TeamType::Home, 1, 1, 0, 2, 1)];
        let report =
            predict_from_records(&records, 7, &PipelineConfig::default(), &MarketOdds::default());
        assert_eq!(report.away_form.analysis.recent_3.pattern_detected, "W");
        assert_eq!(report.home_form.analysis.recent_3.pattern_detected, "W");
        assert_eq!(report.matches, 2);
    }

    #[test]
    fn other_simulations_are_ignored() {
        let mut records = vec![m(TeamType::Home, 1, 1, 0, 2, 1)];
        records.push(HistoricalMatch::new(8, TeamType::Home, 1, 3, 3, 5, 5).unwrap());
        let report =
            predict_from_records(&records, 7, &PipelineConfig::default(), &MarketOdds::default());
        assert_eq!(report.matches, 1);
        assert_eq!(report.avg_total_goals, 3.0);
    }
}

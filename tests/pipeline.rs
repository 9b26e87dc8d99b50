use match_patterns::config::PipelineConfig;
use match_patterns::fingerprint::MatchScore;
use match_patterns::goal_stats::{HistoricalMatch, TeamType};
use match_patterns::ledger;
use match_patterns::markets::MarketOdds;
use match_patterns::pipeline;
use match_patterns::store;
use match_patterns::thresholds::ThresholdStore;

const SIM: i64 = 31;

fn history() -> Vec<HistoricalMatch> {
    let home = [(1, 0, 2, 1), (2, 1, 3, 1), (0, 1, 2, 2), (1, 1, 3, 2), (1, 0, 3, 1)];
    let h2h = [(0, 0, 1, 0), (1, 1, 1, 1)];
    let mut out = Vec::new();
    for (i, (hh, ah, hf, af)) in home.into_iter().enumerate() {
        out.push(HistoricalMatch::new(SIM, TeamType::Home, i as u32 + 1, hh, ah, hf, af).unwrap());
    }
    for (i, (hh, ah, hf, af)) in h2h.into_iter().enumerate() {
        out.push(HistoricalMatch::new(SIM, TeamType::H2h, i as u32 + 1, hh, ah, hf, af).unwrap());
    }
    out
}

#[test]
fn stored_prediction_applies_learned_penalties() {
    let mut conn = store::open_in_memory().unwrap();
    let records = history();
    store::insert_matches(&mut conn, &records).unwrap();

    let cfg = PipelineConfig::default();
    let odds = MarketOdds {
        over_3_5: Some(2.6),
        over_4_5: None,
    };
    let stored = pipeline::predict_stored(&conn, SIM, &cfg, &odds, false).unwrap();
    let in_memory = pipeline::predict_from_records(&records, SIM, &cfg, &odds);

    assert_eq!(stored.context, in_memory.context);
    assert_eq!(stored.home_form, in_memory.home_form);
    assert_eq!(stored.avg_total_goals, in_memory.avg_total_goals);
    assert_eq!(stored.matches, 7);
    assert!(stored.recorded_outcomes.is_empty());
    assert!(ledger::pending(&conn).unwrap().is_empty());

    assert_eq!(stored.trends.len(), 1);
    assert_eq!(stored.trends[0].trend.pattern_type, "home_over_dominance");
    assert!((stored.trends[0].learned_penalty - (-0.25 * 0.98)).abs() < 1e-12);

    assert_eq!(in_memory.goal_adjustment, 0.0);
    assert_eq!(in_memory.expected_total_goals, in_memory.avg_total_goals);
    assert!((stored.goal_adjustment - stored.trends[0].learned_penalty).abs() < 1e-12);
    assert!(stored.expected_total_goals < stored.avg_total_goals);
    // 23 / 7 goals rounds onto 3, the penalised 2.48 onto 2.
    assert_ne!(
        stored.projection.over_3_5.probability,
        in_memory.projection.over_3_5.probability
    );

    assert_eq!(stored.recurring.len(), 1);
    assert_eq!(stored.recurring[0].team_type, TeamType::Home);
    assert_eq!(stored.recurring[0].occurrences, 1);
}

#[test]
fn trained_threshold_changes_the_projection() {
    let mut conn = store::open_in_memory().unwrap();
    let records: Vec<HistoricalMatch> = (1..=5)
        .map(|pos| HistoricalMatch::new(SIM, TeamType::Home, pos, 1, 1, 2, 2).unwrap())
        .collect();
    store::insert_matches(&mut conn, &records).unwrap();
    let cfg = PipelineConfig::default();
    let odds = MarketOdds::default();

    let before = pipeline::predict_stored(&conn, SIM, &cfg, &odds, false).unwrap();
    assert!((before.expected_total_goals - 4.0 * 0.755).abs() < 1e-9);

    // Under-predicting pushes the over dominance penalty up to its 0 ceiling.
    let mut thresholds = ThresholdStore::new(&conn).unwrap();
    for _ in 0..40 {
        thresholds.apply_outcome("home_over_dominance", false, true).unwrap();
    }
    assert_eq!(thresholds.get("home_over_dominance").unwrap().current_penalty, 0.0);

    let after = pipeline::predict_stored(&conn, SIM, &cfg, &odds, false).unwrap();
    assert_eq!(after.goal_adjustment, 0.0);
    assert_eq!(after.expected_total_goals, 4.0);
    assert_ne!(
        before.projection.over_3_5.probability,
        after.projection.over_3_5.probability
    );

    let untrained = pipeline::predict_from_records(&records, SIM, &cfg, &odds);
    assert_eq!(after.projection, untrained.projection);
}

#[test]
fn recorded_prediction_feeds_the_thresholds_once() {
    let mut conn = store::open_in_memory().unwrap();
    store::insert_matches(&mut conn, &history()).unwrap();

    let report = pipeline::predict_stored(
        &conn,
        SIM,
        &PipelineConfig::default(),
        &MarketOdds::default(),
        true,
    )
    .unwrap();
    // over_3_5, over_4_5 and the home over dominance trend.
    assert_eq!(report.recorded_outcomes.len(), 3);

    let mut thresholds = ThresholdStore::new(&conn).unwrap();
    let feedback = thresholds
        .learn_from_simulation(SIM, MatchScore::from_counts(1, 0, 1, 1))
        .unwrap();
    assert_eq!(feedback.settled.len(), 3);
    assert_eq!(feedback.updates.len(), 1);

    // The trend row predicted over 2.5 from the window average; 1-1 settles it false.
    assert!(report.avg_total_goals > 2.5);
    let update = &feedback.updates[0];
    assert_eq!(update.pattern_type, "home_over_dominance");
    assert!(!update.success);
    assert_eq!(update.total_predictions, 1);
    // First outcome only counts.
    assert_eq!(update.new_penalty, update.old_penalty);

    let again = thresholds
        .learn_from_simulation(SIM, MatchScore::from_counts(1, 0, 1, 1))
        .unwrap();
    assert!(again.settled.is_empty());
    assert!(again.updates.is_empty());
    assert_eq!(thresholds.get("home_over_dominance").unwrap().total_predictions, 1);
}

#[test]
fn failed_feedback_leaves_rows_pending() {
    let mut conn = store::open_in_memory().unwrap();
    store::insert_matches(&mut conn, &history()).unwrap();
    pipeline::predict_stored(
        &conn,
        SIM,
        &PipelineConfig::default(),
        &MarketOdds::default(),
        true,
    )
    .unwrap();

    let mut thresholds = ThresholdStore::new(&conn).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER block_threshold_updates BEFORE UPDATE ON adaptive_thresholds
         BEGIN SELECT RAISE(ABORT, 'thresholds locked'); END;",
    )
    .unwrap();

    let score = MatchScore::from_counts(1, 0, 1, 1);
    assert!(thresholds.learn_from_simulation(SIM, score).is_err());
    assert_eq!(ledger::pending(&conn).unwrap().len(), 3);
    assert_eq!(thresholds.get("home_over_dominance").unwrap().total_predictions, 0);

    conn.execute_batch("DROP TRIGGER block_threshold_updates").unwrap();
    let feedback = thresholds.learn_from_simulation(SIM, score).unwrap();
    assert_eq!(feedback.settled.len(), 3);
    assert_eq!(feedback.updates.len(), 1);
    assert!(ledger::pending(&conn).unwrap().is_empty());
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use match_patterns::engines::{self, EngineDetail, EngineKind};
use match_patterns::ensemble;
use match_patterns::fingerprint::MatchScore;
use match_patterns::goal_stats::GoalStats;
use match_patterns::markets::{self, MarketOdds, ProjectorParams};

fn random_stats(rng: &mut StdRng) -> GoalStats {
    let n = rng.gen_range(0..12);
    let matches = (0..n)
        .map(|_| {
            MatchScore::from_counts(
                rng.gen_range(0..5),
                rng.gen_range(0..5),
                rng.gen_range(0..9),
                rng.gen_range(0..9),
            )
        })
        .collect();
    GoalStats::from_matches(matches)
}

#[test]
fn contributions_stay_in_unit_interval() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..1_000 {
        let stats = random_stats(&mut rng);
        let scores = engines::run_all(&stats);
        assert_eq!(scores.len(), 8);
        for s in &scores {
            assert!(s.contribution.is_finite(), "{:?} {stats:?}", s.engine);
            assert!((0.0..=1.0).contains(&s.contribution), "{:?} {stats:?}", s.engine);
            assert!(s.weight > 0.0);
            assert!(!s.reasoning.is_empty());
        }

        let projection = markets::project(&stats, &ProjectorParams::default(), &MarketOdds::default());
        let p35 = projection.over_3_5.probability;
        let p45 = projection.over_4_5.probability;
        assert!((0.05..=0.95).contains(&p35));
        assert!((0.03..=0.90).contains(&p45));
        assert!(projection.over_3_5.confidence >= 0.3);
        assert!((0.0..=1.0).contains(&projection.summary.quality));
    }
}

#[test]
fn degenerate_ratios_are_guarded() {
    let stats = GoalStats {
        matches: vec![MatchScore::from_counts(3, 0, 0, 0)],
        avg_total_goals: 0.0,
        avg_ht_goals: 3.0,
    };
    for s in engines::run_all(&stats) {
        assert!((0.0..=1.0).contains(&s.contribution), "{:?}", s.engine);
    }
}

#[test]
fn goalless_history_is_neutral_and_uses_the_base_rate() {
    let stats = GoalStats::from_matches(vec![MatchScore::from_counts(0, 0, 0, 0); 3]);
    let scores = engines::run_all(&stats);
    for s in &scores {
        assert_eq!(s.contribution, 0.5);
        assert_eq!(s.detail, EngineDetail::NoHistoricalData);
    }

    let projection = markets::project(&stats, &ProjectorParams::default(), &MarketOdds::default());
    assert!(projection.no_historical_data);
    assert_eq!(projection.over_3_5.probability, 0.27);
    assert_eq!(projection.over_3_5.confidence, 0.3);

    let empty = markets::project(
        &GoalStats::from_matches(Vec::new()),
        &ProjectorParams::default(),
        &MarketOdds::default(),
    );
    assert_eq!(empty.over_3_5.probability, 0.27);
}

#[test]
fn goalless_first_half_does_not_raise_golden_ratio() {
    let stats = GoalStats::from_matches(vec![MatchScore::from_counts(0, 0, 2, 2)]);
    assert_eq!(stats.avg_total_goals, 4.0);
    assert_eq!(stats.avg_ht_goals, 0.0);
    let golden = engines::run_engine(EngineKind::GoldenRatio, &stats);
    assert_eq!(golden.contribution, 0.4);
    match golden.detail {
        EngineDetail::GoldenRatio { ratio, .. } => assert_eq!(ratio, 4.0),
        other => panic!("unexpected detail {other:?}"),
    }
}

#[test]
fn low_quality_is_damped_toward_the_base_rate() {
    let stats = GoalStats::from_matches(vec![MatchScore::from_counts(1, 1, 2, 2)]);
    let scores = engines::run_all(&stats);
    let summary = ensemble::gate(&scores, 0.27);
    let expected = summary.multiplier * summary.weighted_average + (1.0 - summary.multiplier) * 0.27;
    assert!((summary.gated - expected).abs() < 1e-12);
    assert_eq!(ensemble::quality_multiplier(0.41), 1.0);
    assert_eq!(ensemble::quality_multiplier(0.3), 0.5);
    assert_eq!(ensemble::quality_multiplier(0.2), 0.2);
}

#[test]
fn over_four_and_a_half_follows_the_primary_market() {
    let stats = GoalStats::from_matches(vec![
        MatchScore::from_counts(1, 0, 3, 2),
        MatchScore::from_counts(2, 1, 4, 1),
        MatchScore::from_counts(0, 1, 2, 2),
    ]);
    let odds = MarketOdds {
        over_3_5: Some(2.5),
        over_4_5: Some(0.0),
    };
    let projection = markets::project(&stats, &ProjectorParams::default(), &odds);
    let p35 = projection.over_3_5.probability;
    assert!((projection.over_4_5.probability - (0.6 * p35).clamp(0.03, 0.90)).abs() < 1e-12);
    let edge = projection.over_3_5.edge.unwrap();
    assert!((edge - (p35 * 2.5 - 1.0) * 100.0).abs() < 1e-9);
    assert_eq!(projection.over_4_5.edge, None);
}

#[test]
fn edge_needs_priceable_odds() {
    assert!((markets::edge(0.4, 3.0).unwrap() - 20.0).abs() < 1e-9);
    assert_eq!(markets::edge(0.5, 2.0), Some(0.0));
    assert_eq!(markets::edge(0.5, 0.0), None);
    assert_eq!(markets::edge(0.5, f64::NAN), None);
    assert_eq!(markets::edge(0.5, -1.5), None);
}

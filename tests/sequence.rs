use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use match_patterns::PatternError;
use match_patterns::fingerprint::Outcome;
use match_patterns::sequence::{
    self, MatchType, MomentumState, SequenceEntry, analyze_sequence, analyze_windows, classify,
};

fn entries(letters: &str) -> Vec<SequenceEntry> {
    letters
        .chars()
        .enumerate()
        .map(|(i, c)| SequenceEntry {
            result: Outcome::from_letter(c).unwrap(),
            game_position: i as u32 + 1,
            combined_fingerprint: format!("fp{}", i + 1),
        })
        .collect()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn perfect_run_is_peak() {
    let insight = analyze_sequence(&entries("WWWWW"));
    assert_eq!(insight.momentum_state, MomentumState::Peak);
    assert_eq!(insight.psychological_modifier, -0.12);
    assert_eq!(insight.confidence, 0.85);
    assert_eq!(insight.match_type, MatchType::ExactMatch);
}

#[test]
fn recovery_from_two_losses_is_building() {
    let insight = classify("LLWWW").unwrap();
    assert_eq!(insight.momentum_state, MomentumState::Building);
    assert_eq!(insight.psychological_modifier, 0.15);
    assert_eq!(insight.confidence, 0.75);
}

#[test]
fn only_the_five_most_recent_games_count() {
    let mut games = entries("WWWWWLL");
    games.reverse();
    let insight = analyze_sequence(&games);
    assert_eq!(insight.pattern_detected, "WWWWW");
}

#[test]
fn fuzzy_rules_apply_in_order() {
    let streak = classify("WWWWWW").unwrap();
    assert_eq!(streak.match_type, MatchType::SimilarPattern);
    assert_eq!(streak.momentum_state, MomentumState::Peak);
    assert!(close(streak.confidence, 0.65 * 0.8));

    let recovery = classify("LLDWW").unwrap();
    assert_eq!(recovery.momentum_state, MomentumState::Building);
    assert!(close(recovery.psychological_modifier, 0.11));
    assert!(close(recovery.confidence, 0.70 * 0.8));

    let alternating = classify("WLWLD").unwrap();
    assert_eq!(alternating.momentum_state, MomentumState::Fragile);
    assert_eq!(alternating.psychological_modifier, -0.08);

    let broken = classify("WWDLD").unwrap();
    assert_eq!(broken.momentum_state, MomentumState::Declining);
    assert_eq!(broken.psychological_modifier, -0.09);

    let losing = classify("DLLLW").unwrap();
    assert_eq!(losing.momentum_state, MomentumState::Declining);
    assert!(close(losing.psychological_modifier, 0.11));

    let draws = classify("DDDLW").unwrap();
    assert_eq!(draws.momentum_state, MomentumState::Neutral);
    assert_eq!(draws.psychological_modifier, 0.03);
}

#[test]
fn rate_based_tier_before_the_neutral_default() {
    let strong = classify("WWDWW").unwrap();
    assert_eq!(strong.match_type, MatchType::GenericAnalysis);
    assert_eq!(strong.momentum_state, MomentumState::Peak);
    assert_eq!(strong.psychological_modifier, -0.08);

    let poor = classify("LLDLW").unwrap();
    assert_eq!(poor.momentum_state, MomentumState::Declining);
    assert_eq!(poor.psychological_modifier, 0.10);

    let mixed = classify("WDLWD").unwrap();
    assert_eq!(mixed.momentum_state, MomentumState::Fragile);

    let balanced = classify("WLDWL").unwrap();
    assert_eq!(balanced.momentum_state, MomentumState::Neutral);
    assert_eq!(balanced.psychological_modifier, 0.0);
    assert_eq!(balanced.confidence, 0.3);
}

#[test]
fn empty_and_invalid_sequences() {
    assert!(matches!(classify(""), Err(PatternError::EmptySequence)));
    assert!(matches!(classify("WXW"), Err(PatternError::InvalidInput(_))));
    let neutral = analyze_sequence(&[]);
    assert_eq!(neutral.momentum_state, MomentumState::Neutral);
    assert_eq!(neutral.confidence, 0.3);
}

#[test]
fn windows_depend_on_history_length() {
    let short = analyze_windows(&entries("WWWW"));
    assert!(short.recent_6.is_none());
    assert!(short.full_8.is_none());

    let long = analyze_windows(&entries("WWWWWLLD"));
    assert_eq!(long.recent_6.as_ref().map(|i| i.pattern_detected.as_str()), Some("WWWWW"));
    assert_eq!(long.full_8.as_ref(), Some(&long.recent_5));
}

#[test]
fn records_stop_at_five_letters() {
    let games = entries("WWWWWLLD");
    for len in [5, 6, 8, 20] {
        let record = sequence::SequenceRecord::from_games(&games, len);
        assert_eq!(record.letters, "WWWWW");
        assert_eq!(record.positions, vec![1, 2, 3, 4, 5]);
    }
    assert_eq!(sequence::SequenceRecord::from_games(&games, 3).letters, "WWW");
}

#[test]
fn win_streak_wording_counts_the_first_run() {
    let insight = classify("WWLWWWW").unwrap();
    assert_eq!(insight.momentum_state, MomentumState::Peak);
    assert!(insight.explanation.starts_with("Extended 2-game winning streak"));
}

#[test]
fn weighted_recommendation_favours_recent_three() {
    let analysis = analyze_windows(&entries("WWWWW"));
    let rec = &analysis.weighted_recommendation;
    assert_eq!(rec.psychological_modifier, -0.092);
    assert_eq!(rec.confidence, 0.605);
    assert_eq!(rec.momentum_state, MomentumState::Peak);
}

#[test]
fn sequence_fingerprint_joins_recent_combined_strings() {
    assert_eq!(sequence::sequence_fingerprint(&[]), "NO_GAMES");
    assert_eq!(sequence::sequence_fingerprint(&entries("WWDLLW")), "fp1|fp2|fp3|fp4|fp5");
}

#[test]
fn random_sequences_stay_in_range() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..2_000 {
        let len = rng.gen_range(1..=8);
        let letters: String = (0..len)
            .map(|_| ['W', 'D', 'L'][rng.gen_range(0..3)])
            .collect();
        let insight = classify(&letters).unwrap();
        assert!(sequence::validate_insight(&insight).is_empty(), "{letters}");
        let analysis = analyze_windows(&entries(&letters));
        for window in [&analysis.recent_3, &analysis.recent_5, &analysis.weighted_recommendation] {
            assert!(sequence::validate_insight(window).is_empty(), "{letters}");
        }
    }
}

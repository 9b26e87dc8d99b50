use match_patterns::PatternError;
use match_patterns::fingerprint::{self, CombinedFingerprint, MatchScore, Outcome};

fn score(hh: i64, ah: i64, hf: i64, af: i64) -> MatchScore {
    MatchScore::new(hh, ah, hf, af).unwrap()
}

#[test]
fn two_one_after_one_nil_at_half_time() {
    let fp = fingerprint::encode(score(1, 0, 2, 1));
    assert_eq!(fp.total_goals_ft, 3);
    assert_eq!(fp.second_half_goals, 2);
    assert_eq!(fp.result_ft, Outcome::Win);
    assert!(fp.over_2_5);
    assert!(!fp.over_3_5);
    assert!(fp.gg_ft);
    assert!(!fp.gg_ht);
    assert!(fp.home_ah_minus_0_5);
    assert!(!fp.home_ah_minus_1_5);
    assert!(fp.ht_ft_1_1);
    assert_eq!(fp.exact_score_ft, "2-1");
    assert_eq!(fp.ht_fingerprint, "W(1-0,ng,u1.5)");
    assert_eq!(fp.ft_fingerprint, "W(2-1,gg,o2.5,m1)");
    assert!(fp.combined_fingerprint.starts_with("W(1-0,ng,u1.5)→W(2-1,gg,o2.5,m1,2h2)"));
}

#[test]
fn flags_agree_with_totals_over_a_small_grid() {
    for hh in 0..=4 {
        for ah in 0..=4 {
            for hf in 0..=4 {
                for af in 0..=4 {
                    let s = score(hh, ah, hf, af);
                    let fp = fingerprint::encode(s);
                    let total = hf + af;
                    assert!(fp.check_consistency().is_empty(), "{s:?}");
                    assert_eq!(fp.over_2_5, total > 2, "{s:?}");
                    assert_eq!(fp.over_3_5, total > 3, "{s:?}");
                    assert_eq!(fp.under_2_5, !fp.over_2_5, "{s:?}");
                    assert_eq!(fp.gg_ft, hf > 0 && af > 0, "{s:?}");
                    assert_eq!(fp.second_half_goals, total - (hh + ah), "{s:?}");
                    assert_eq!(fp.double_1x, fp.match_1 || fp.match_x, "{s:?}");
                    assert!(!(fp.home_win_nil && fp.away_win_nil), "{s:?}");
                    if fp.home_win_nil {
                        assert!(fp.match_1 && af == 0, "{s:?}");
                    }
                    let decoded: CombinedFingerprint = fp.combined_fingerprint.parse().unwrap();
                    assert_eq!(decoded.score, s);
                }
            }
        }
    }
}

#[test]
fn encoding_is_deterministic() {
    let s = score(2, 2, 3, 4);
    assert_eq!(fingerprint::encode(s), fingerprint::encode(s));
}

#[test]
fn second_half_may_be_negative() {
    let fp = fingerprint::encode(score(2, 1, 1, 1));
    assert_eq!(fp.second_half_goals, -1);
    assert!(fp.combined_fingerprint.ends_with(",2h-1)"));
    assert!(!fp.sh_over_0_5);
}

#[test]
fn negative_goals_are_rejected() {
    assert!(matches!(MatchScore::new(0, -1, 1, 1), Err(PatternError::InvalidInput(_))));
    assert!(matches!(MatchScore::new(0, 0, -3, 1), Err(PatternError::InvalidInput(_))));
}

#[test]
fn market_lookup_by_name() {
    let fp = fingerprint::encode(score(0, 0, 4, 2));
    assert_eq!(fp.market("over_5_5"), Some(true));
    assert_eq!(fp.market("over_9_5"), Some(false));
    assert_eq!(fp.market("under_6_5"), Some(true));
    assert_eq!(fp.market("home_by_2"), Some(true));
    assert_eq!(fp.market("corners_over_9_5"), None);
    let names: Vec<&str> = fp.markets().iter().map(|(name, _)| *name).collect();
    assert!(names.len() > 50);
    assert!(names.contains(&"ht_ft_x_1"));
}

#[test]
fn malformed_combined_strings_fail_typed() {
    for raw in [
        "",
        "W(1-0,ng,u1.5)",
        "W(1-0,ng,u1.5)→",
        "X(1-0,ng,u1.5)→W(2-1,gg,o2.5,m1,2h2)",
        "W(1-0,ng,u1.5)→W(2-1,gg,o2.5,m1,2h3)",
        "L(1-0,ng,u1.5)→W(2-1,gg,o2.5,m1,2h2)",
        "W(a-0,ng,u1.5)→W(2-1,gg,o2.5,m1,2h2)",
    ] {
        let err = raw.parse::<CombinedFingerprint>().unwrap_err();
        assert!(matches!(err, PatternError::FingerprintDecode { .. }), "{raw:?}");
    }
}

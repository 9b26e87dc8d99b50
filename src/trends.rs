use serde::Serialize;

use crate::goal_stats::{HistoricalMatch, MatchHistory};

const MIN_SAMPLE: usize = 5;
const STREAK_THRESHOLD: usize = 3;

/// A goal-total pattern found in one group of matches, named after the
/// adaptive threshold it feeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalTrend {
    pub pattern_type: &'static str,
    pub confidence: f64,
    /// Matches that showed the pattern (overs, or the streak length).
    pub detected: usize,
    pub sample: usize,
}

/// Over dominance for each team and over/under streaks in the head to head.
/// Groups with fewer than five matches are skipped.
pub fn detect_goal_trends(history: &MatchHistory) -> Vec<GoalTrend> {
    let mut out = Vec::new();
    out.extend(over_dominance("home_over_dominance", &history.home));
    out.extend(over_dominance("away_over_dominance", &history.away));
    out.extend(h2h_streak(&history.h2h));
    out
}

fn is_over(m: &HistoricalMatch) -> bool {
    m.score.total_ft() > 2
}

fn over_dominance(pattern_type: &'static str, matches: &[HistoricalMatch]) -> Option<GoalTrend> {
    let sample = matches.len();
    if sample < MIN_SAMPLE {
        return None;
    }
    let overs = matches.iter().filter(|m| is_over(m)).count();
    if overs < sample.div_ceil(2) {
        return None;
    }
    let dominance = overs as f64 / sample as f64;
    Some(GoalTrend {
        pattern_type,
        confidence: (0.70 + dominance * 0.3).min(0.98),
        detected: overs,
        sample,
    })
}

fn h2h_streak(matches: &[HistoricalMatch]) -> Option<GoalTrend> {
    let sample = matches.len();
    if sample < MIN_SAMPLE {
        return None;
    }
    let (mut over_run, mut under_run) = (0usize, 0usize);
    let (mut max_over, mut max_under) = (0usize, 0usize);
    for m in matches {
        if is_over(m) {
            over_run += 1;
            under_run = 0;
            max_over = max_over.max(over_run);
        } else {
            under_run += 1;
            over_run = 0;
            max_under = max_under.max(under_run);
        }
    }

    let (pattern_type, streak) = if max_over >= STREAK_THRESHOLD {
        ("h2h_over_pattern", max_over)
    } else if max_under >= STREAK_THRESHOLD {
        ("h2h_under_pattern", max_under)
    } else {
        return None;
    };
    Some(GoalTrend {
        pattern_type,
        confidence: streak_confidence(streak, sample),
        detected: streak,
        sample,
    })
}

fn streak_confidence(streak: usize, sample: usize) -> f64 {
    let beyond = (streak + 1).saturating_sub(STREAK_THRESHOLD) as f64;
    let streak_bonus = (beyond * 0.15).min(0.30);
    let sample_bonus = (sample as f64 / 10.0).min(0.20);
    let rarity_bonus = (streak as f64 * 0.05).min(0.25);
    (0.75 + streak_bonus + sample_bonus + rarity_bonus).min(0.98)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal_stats::TeamType;

    fn games(team_type: TeamType, totals: &[i64]) -> Vec<HistoricalMatch> {
        totals
            .iter()
            .enumerate()
            .map(|(i, t)| HistoricalMatch::new(1, team_type, i as u32 + 1, 0, 0, *t, 0).unwrap())
            .collect()
    }

    #[test]
    fn small_groups_are_ignored() {
        let mut records = games(TeamType::Home, &[4, 4, 4, 4]);
        records.extend(games(TeamType::H2h, &[5, 5, 5]));
        let history = MatchHistory::partition(1, &records);
        assert!(detect_goal_trends(&history).is_empty());
    }

    #[test]
    fn majority_of_overs_is_dominance() {
        let records = games(TeamType::Away, &[3, 0, 4, 1, 5]);
        let trends = detect_goal_trends(&MatchHistory::partition(1, &records));
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].pattern_type, "away_over_dominance");
        assert_eq!(trends[0].detected, 3);
        assert!((trends[0].confidence - 0.88).abs() < 1e-12);
    }

    #[test]
    fn h2h_under_streak() {
        let records = games(TeamType::H2h, &[1, 2, 0, 4, 3]);
        let trends = detect_goal_trends(&MatchHistory::partition(1, &records));
        assert_eq!(trends[0].pattern_type, "h2h_under_pattern");
        assert_eq!(trends[0].detected, 3);
        assert_eq!(trends[0].confidence, 0.98);
    }
}

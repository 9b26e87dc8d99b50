use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::fingerprint::MatchScore;
use crate::goal_stats::{HistoricalMatch, MatchHistory, TeamType};

/// Matches per context string.
pub const CONTEXT_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DominantTeam {
    Home,
    Away,
    Balanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStrength {
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextMetadata {
    pub h2h_matches: usize,
    pub home_matches: usize,
    pub away_matches: usize,
    pub avg_goals_per_game: f64,
    pub dominant_team: DominantTeam,
    pub strength: PatternStrength,
}

/// The three form strings of a fixture and the id derived from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPattern {
    pub h2h: String,
    pub home: String,
    pub away: String,
    /// Hex SHA-256 of `h2h_home_away`.
    pub pattern_id: String,
    pub confidence: f64,
    pub metadata: ContextMetadata,
}

pub fn encode_context(history: &MatchHistory) -> ContextPattern {
    let h2h = encode_group(TeamType::H2h, &history.h2h);
    let home = encode_group(TeamType::Home, &history.home);
    let away = encode_group(TeamType::Away, &history.away);
    let pattern_id = pattern_id(&h2h, &home, &away);
    let metadata = metadata(history);
    let confidence = confidence(history, metadata.strength);
    ContextPattern {
        h2h,
        home,
        away,
        pattern_id,
        confidence,
        metadata,
    }
}

pub fn pattern_id(h2h: &str, home: &str, away: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{h2h}_{home}_{away}").as_bytes());
    hex::encode(hasher.finalize())
}

fn encode_group(team_type: TeamType, matches: &[HistoricalMatch]) -> String {
    let prefix = match team_type {
        TeamType::H2h => "H2H",
        TeamType::Home => "HOME",
        TeamType::Away => "AWAY",
    };
    if matches.is_empty() {
        return format!("NO_{prefix}_DATA");
    }
    let encoded: Vec<String> = matches
        .iter()
        .take(CONTEXT_DEPTH)
        .map(|m| encode_match(team_type, &m.score))
        .collect();
    format!("{prefix}:{}", encoded.join("-"))
}

// Result letter, O/U 2.5, G/N for both teams scoring.
fn encode_match(team_type: TeamType, score: &MatchScore) -> String {
    let result = match team_type {
        TeamType::H2h => match score.goal_diff_ft() {
            d if d > 0 => 'H',
            d if d < 0 => 'A',
            _ => 'D',
        },
        TeamType::Home | TeamType::Away => team_type.perspective_result(score).letter(),
    };
    let goals = if score.total_ft() > 2 { 'O' } else { 'U' };
    let btts = if score.home_ft() > 0 && score.away_ft() > 0 {
        'G'
    } else {
        'N'
    };
    format!("{result}{goals}{btts}")
}

fn metadata(history: &MatchHistory) -> ContextMetadata {
    let total_matches = history.len();
    let total_goals: i64 = history
        .h2h
        .iter()
        .chain(&history.home)
        .chain(&history.away)
        .map(|m| m.score.total_ft())
        .sum();
    let avg_goals_per_game = if total_matches > 0 {
        total_goals as f64 / total_matches as f64
    } else {
        0.0
    };

    let home_wins = history.h2h.iter().filter(|m| m.score.goal_diff_ft() > 0).count();
    let away_wins = history.h2h.iter().filter(|m| m.score.goal_diff_ft() < 0).count();
    let dominant_team = if home_wins > away_wins + 1 {
        DominantTeam::Home
    } else if away_wins > home_wins + 1 {
        DominantTeam::Away
    } else {
        DominantTeam::Balanced
    };

    let strength = if total_matches >= 15 {
        PatternStrength::Strong
    } else if total_matches >= 10 {
        PatternStrength::Moderate
    } else {
        PatternStrength::Weak
    };

    ContextMetadata {
        h2h_matches: history.h2h.len(),
        home_matches: history.home.len(),
        away_matches: history.away.len(),
        avg_goals_per_game,
        dominant_team,
        strength,
    }
}

fn confidence(history: &MatchHistory, strength: PatternStrength) -> f64 {
    let h2h: f64 = match history.h2h.len() {
        n if n >= 5 => 0.3,
        n if n >= 3 => 0.2,
        n if n >= 1 => 0.1,
        _ => 0.0,
    };
    let form = |n: usize| match n {
        n if n >= 8 => 0.25,
        n if n >= 5 => 0.15,
        n if n >= 3 => 0.1,
        _ => 0.0,
    };
    let depth = match strength {
        PatternStrength::Strong => 0.15,
        PatternStrength::Moderate => 0.10,
        PatternStrength::Weak => 0.0,
    };
    (h2h + form(history.home.len()) + form(history.away.len()) + depth + 0.05).min(1.0)
}

/// Weighted positional agreement of two contexts: h2h 0.4, home 0.3, away 0.3.
pub fn similarity(a: &ContextPattern, b: &ContextPattern) -> f64 {
    segment_similarity(&a.h2h, &b.h2h) * 0.4
        + segment_similarity(&a.home, &b.home) * 0.3
        + segment_similarity(&a.away, &b.away) * 0.3
}

fn segment_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let segments = |s: &str| -> Vec<String> {
        s.split_once(':')
            .map(|(_, body)| body.split('-').map(str::to_string).collect())
            .unwrap_or_default()
    };
    let (left, right) = (segments(a), segments(b));
    let shared = left.len().min(right.len());
    if shared == 0 {
        return 0.0;
    }
    let same = left.iter().zip(&right).filter(|(x, y)| x == y).count();
    same as f64 / shared as f64
}

/// Data gaps that make a context unreliable; empty when usable.
pub fn context_issues(pattern: &ContextPattern) -> Vec<&'static str> {
    let mut issues = Vec::new();
    if pattern.metadata.h2h_matches == 0 {
        issues.push("no h2h matches");
    }
    if pattern.metadata.home_matches < 3 {
        issues.push("fewer than 3 home matches");
    }
    if pattern.metadata.away_matches < 3 {
        issues.push("fewer than 3 away matches");
    }
    if pattern.confidence < 0.3 {
        issues.push("context confidence below 0.3");
    }
    issues
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PatternError, PatternResult};
use crate::fingerprint::{MatchScore, Outcome};

// Used only when there is nothing to average.
const DEFAULT_AVG_TOTAL: f64 = 2.5;
const DEFAULT_AVG_HT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamType {
    Home,
    Away,
    H2h,
}

impl TeamType {
    pub fn as_str(self) -> &'static str {
        match self {
            TeamType::Home => "home",
            TeamType::Away => "away",
            TeamType::H2h => "h2h",
        }
    }

    /// Result letter of `score` for the side this history belongs to. Away
    /// form is read from the away team's point of view.
    pub fn perspective_result(self, score: &MatchScore) -> Outcome {
        let home_view = Outcome::from_goal_diff(score.goal_diff_ft());
        match self {
            TeamType::Away => home_view.flipped(),
            TeamType::Home | TeamType::H2h => home_view,
        }
    }
}

impl fmt::Display for TeamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamType {
    type Err = PatternError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "home" => Ok(TeamType::Home),
            "away" => Ok(TeamType::Away),
            "h2h" => Ok(TeamType::H2h),
            other => Err(PatternError::InvalidInput(format!("unknown team_type {other:?}"))),
        }
    }
}

/// One input record: a past match attached to the simulation it informs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalMatch {
    pub simulation_id: i64,
    pub team_type: TeamType,
    /// 1 is the most recent game.
    pub game_position: u32,
    pub score: MatchScore,
}

impl HistoricalMatch {
    pub fn new(
        simulation_id: i64,
        team_type: TeamType,
        game_position: u32,
        home_ht: i64,
        away_ht: i64,
        home_ft: i64,
        away_ft: i64,
    ) -> PatternResult<Self> {
        Ok(Self {
            simulation_id,
            team_type,
            game_position,
            score: MatchScore::new(home_ht, away_ht, home_ft, away_ft)?,
        })
    }
}

/// Matches of one simulation split by `team_type`, each sorted most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchHistory {
    pub home: Vec<HistoricalMatch>,
    pub away: Vec<HistoricalMatch>,
    pub h2h: Vec<HistoricalMatch>,
}

impl MatchHistory {
    pub fn partition(simulation_id: i64, records: &[HistoricalMatch]) -> Self {
        let mut out = MatchHistory::default();
        for record in records.iter().filter(|r| r.simulation_id == simulation_id) {
            match record.team_type {
                TeamType::Home => out.home.push(record.clone()),
                TeamType::Away => out.away.push(record.clone()),
                TeamType::H2h => out.h2h.push(record.clone()),
            }
        }
        for group in [&mut out.home, &mut out.away, &mut out.h2h] {
            group.sort_by_key(|m| m.game_position);
        }
        out
    }

    pub fn group(&self, team_type: TeamType) -> &[HistoricalMatch] {
        match team_type {
            TeamType::Home => &self.home,
            TeamType::Away => &self.away,
            TeamType::H2h => &self.h2h,
        }
    }

    pub fn len(&self) -> usize {
        self.home.len() + self.away.len() + self.h2h.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Home, away and h2h concatenated, keeping the last `window` matches.
    pub fn recent_window(&self, window: usize) -> Vec<MatchScore> {
        let all: Vec<MatchScore> = self
            .home
            .iter()
            .chain(&self.away)
            .chain(&self.h2h)
            .map(|m| m.score)
            .collect();
        let skip = all.len().saturating_sub(window);
        all[skip..].to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalStats {
    pub matches: Vec<MatchScore>,
    pub avg_total_goals: f64,
    pub avg_ht_goals: f64,
}

impl GoalStats {
    pub fn from_matches(matches: Vec<MatchScore>) -> Self {
        if matches.is_empty() {
            return Self {
                matches,
                avg_total_goals: DEFAULT_AVG_TOTAL,
                avg_ht_goals: DEFAULT_AVG_HT,
            };
        }
        let n = matches.len() as f64;
        let total: i64 = matches.iter().map(MatchScore::total_ft).sum();
        let ht: i64 = matches.iter().map(MatchScore::total_ht).sum();
        Self {
            avg_total_goals: total as f64 / n,
            avg_ht_goals: ht as f64 / n,
            matches,
        }
    }

    pub fn from_history(history: &MatchHistory, window: usize) -> Self {
        Self::from_matches(history.recent_window(window))
    }

    /// Scales the expected goals by `1 + adjustment`. The matches stay as
    /// recorded.
    pub fn with_goal_adjustment(mut self, adjustment: f64) -> Self {
        let factor = (1.0 + adjustment).max(0.0);
        self.avg_total_goals *= factor;
        self.avg_ht_goals *= factor;
        self
    }

    /// No matches, or matches without a single goal in either half.
    pub fn has_no_data(&self) -> bool {
        self.matches
            .iter()
            .all(|m| m.total_ft() == 0 && m.total_ht() == 0)
    }
}

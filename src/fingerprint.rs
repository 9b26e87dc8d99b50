use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PatternError, PatternResult};

/// Half-time and full-time score of one match. Full-time is not required to be
/// greater than or equal to half-time component-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchScore {
    home_ht: u32,
    away_ht: u32,
    home_ft: u32,
    away_ft: u32,
}

impl MatchScore {
    pub fn new(home_ht: i64, away_ht: i64, home_ft: i64, away_ft: i64) -> PatternResult<Self> {
        Ok(Self {
            home_ht: goal_count("home_ht", home_ht)?,
            away_ht: goal_count("away_ht", away_ht)?,
            home_ft: goal_count("home_ft", home_ft)?,
            away_ft: goal_count("away_ft", away_ft)?,
        })
    }

    pub const fn from_counts(home_ht: u32, away_ht: u32, home_ft: u32, away_ft: u32) -> Self {
        Self {
            home_ht,
            away_ht,
            home_ft,
            away_ft,
        }
    }

    pub fn home_ht(&self) -> u32 {
        self.home_ht
    }

    pub fn away_ht(&self) -> u32 {
        self.away_ht
    }

    pub fn home_ft(&self) -> u32 {
        self.home_ft
    }

    pub fn away_ft(&self) -> u32 {
        self.away_ft
    }

    pub fn total_ft(&self) -> i64 {
        self.home_ft as i64 + self.away_ft as i64
    }

    pub fn total_ht(&self) -> i64 {
        self.home_ht as i64 + self.away_ht as i64
    }

    /// Negative when the recorded full-time total is below the half-time one.
    pub fn second_half_goals(&self) -> i64 {
        self.total_ft() - self.total_ht()
    }

    pub fn goal_diff_ft(&self) -> i64 {
        self.home_ft as i64 - self.away_ft as i64
    }

    pub fn goal_diff_ht(&self) -> i64 {
        self.home_ht as i64 - self.away_ht as i64
    }

    pub fn home_second_half(&self) -> i64 {
        self.home_ft as i64 - self.home_ht as i64
    }

    pub fn away_second_half(&self) -> i64 {
        self.away_ft as i64 - self.away_ht as i64
    }
}

fn goal_count(field: &str, value: i64) -> PatternResult<u32> {
    if value < 0 {
        return Err(PatternError::InvalidInput(format!(
            "{field} must be non-negative, got {value}"
        )));
    }
    u32::try_from(value)
        .map_err(|_| PatternError::InvalidInput(format!("{field} out of range: {value}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Outcome {
    pub fn from_goal_diff(diff: i64) -> Self {
        if diff > 0 {
            Outcome::Win
        } else if diff < 0 {
            Outcome::Loss
        } else {
            Outcome::Draw
        }
    }

    pub fn letter(self) -> char {
        match self {
            Outcome::Win => 'W',
            Outcome::Draw => 'D',
            Outcome::Loss => 'L',
        }
    }

    pub fn from_letter(ch: char) -> Option<Self> {
        match ch {
            'W' => Some(Outcome::Win),
            'D' => Some(Outcome::Draw),
            'L' => Some(Outcome::Loss),
            _ => None,
        }
    }

    /// The same result seen from the other side of the pitch.
    pub fn flipped(self) -> Self {
        match self {
            Outcome::Win => Outcome::Loss,
            Outcome::Draw => Outcome::Draw,
            Outcome::Loss => Outcome::Win,
        }
    }

    // 1/X/2 notation used by the HT/FT combination markets.
    fn market_symbol(self) -> char {
        match self {
            Outcome::Win => '1',
            Outcome::Draw => 'X',
            Outcome::Loss => '2',
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Every market outcome derivable from one [`MatchScore`], stored as plain
/// fields computed once at encode time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub score: MatchScore,
    pub total_goals_ft: i64,
    pub total_goals_ht: i64,
    pub second_half_goals: i64,
    pub goal_difference_ft: i64,
    pub goal_difference_ht: i64,
    pub result_ft: Outcome,
    pub result_ht: Outcome,

    pub match_1: bool,
    pub match_x: bool,
    pub match_2: bool,
    pub double_1x: bool,
    pub double_12: bool,
    pub double_x2: bool,

    pub over_0_5: bool,
    pub over_1_5: bool,
    pub over_2_5: bool,
    pub over_3_5: bool,
    pub over_4_5: bool,
    pub over_5_5: bool,
    pub over_6_5: bool,
    pub over_7_5: bool,
    pub under_2_5: bool,
    pub under_3_5: bool,
    pub under_4_5: bool,

    pub gg_ft: bool,
    pub ng_ft: bool,
    pub gg_ht: bool,
    pub ng_ht: bool,
    pub gg_2h: bool,
    pub ng_2h: bool,

    pub home_win_nil: bool,
    pub away_win_nil: bool,

    pub home_by_1: bool,
    pub home_by_2: bool,
    pub home_by_3: bool,
    pub home_by_4: bool,
    pub home_by_5: bool,
    pub home_by_6_plus: bool,
    pub away_by_1: bool,
    pub away_by_2: bool,
    pub away_by_3: bool,
    pub away_by_4: bool,
    pub away_by_5: bool,
    pub away_by_6_plus: bool,

    pub home_ah_minus_0_5: bool,
    pub home_ah_minus_1_0: bool,
    pub home_ah_minus_1_5: bool,
    pub home_ah_minus_2_0: bool,
    pub home_ah_minus_2_5: bool,
    pub home_ah_minus_3_0: bool,
    pub away_ah_plus_0_5: bool,
    pub away_ah_plus_1_0: bool,
    pub away_ah_plus_1_5: bool,
    pub away_ah_plus_2_0: bool,
    pub away_ah_plus_2_5: bool,
    pub away_ah_plus_3_0: bool,

    pub ht_over_0_5: bool,
    pub ht_over_1_5: bool,
    pub ht_over_2_5: bool,
    pub ht_under_1_5: bool,
    pub ht_under_2_5: bool,
    pub ht_1: bool,
    pub ht_x: bool,
    pub ht_2: bool,

    pub sh_over_0_5: bool,
    pub sh_over_1_5: bool,
    pub sh_over_2_5: bool,
    pub sh_home_win: bool,
    pub sh_away_win: bool,
    pub sh_draw: bool,

    pub ht_ft_1_1: bool,
    pub ht_ft_1_x: bool,
    pub ht_ft_1_2: bool,
    pub ht_ft_x_1: bool,
    pub ht_ft_x_x: bool,
    pub ht_ft_x_2: bool,
    pub ht_ft_2_1: bool,
    pub ht_ft_2_x: bool,
    pub ht_ft_2_2: bool,

    pub exact_score_ft: String,
    pub exact_score_ht: String,

    pub ht_fingerprint: String,
    pub ft_fingerprint: String,
    pub combined_fingerprint: String,
}

pub fn encode(score: MatchScore) -> Fingerprint {
    let total_ft = score.total_ft();
    let total_ht = score.total_ht();
    let second_half = score.second_half_goals();
    let gd_ft = score.goal_diff_ft();
    let gd_ht = score.goal_diff_ht();
    let (home_ft, away_ft) = (score.home_ft, score.away_ft);
    let (home_ht, away_ht) = (score.home_ht, score.away_ht);
    let home_sh = score.home_second_half();
    let away_sh = score.away_second_half();

    let result_ft = Outcome::from_goal_diff(gd_ft);
    let result_ht = Outcome::from_goal_diff(gd_ht);

    let gg_ft = both_scored(home_ft as i64, away_ft as i64);
    let gg_ht = both_scored(home_ht as i64, away_ht as i64);
    let gg_2h = both_scored(home_sh, away_sh);

    let ht_ft = |ht: char, ft: char| {
        result_ht.market_symbol() == ht && result_ft.market_symbol() == ft
    };

    Fingerprint {
        score,
        total_goals_ft: total_ft,
        total_goals_ht: total_ht,
        second_half_goals: second_half,
        goal_difference_ft: gd_ft,
        goal_difference_ht: gd_ht,
        result_ft,
        result_ht,

        match_1: gd_ft > 0,
        match_x: gd_ft == 0,
        match_2: gd_ft < 0,
        double_1x: gd_ft >= 0,
        double_12: gd_ft != 0,
        double_x2: gd_ft <= 0,

        over_0_5: over(total_ft, 0.5),
        over_1_5: over(total_ft, 1.5),
        over_2_5: over(total_ft, 2.5),
        over_3_5: over(total_ft, 3.5),
        over_4_5: over(total_ft, 4.5),
        over_5_5: over(total_ft, 5.5),
        over_6_5: over(total_ft, 6.5),
        over_7_5: over(total_ft, 7.5),
        under_2_5: under(total_ft, 2.5),
        under_3_5: under(total_ft, 3.5),
        under_4_5: under(total_ft, 4.5),

        gg_ft,
        ng_ft: !gg_ft,
        gg_ht,
        ng_ht: !gg_ht,
        gg_2h,
        ng_2h: !gg_2h,

        home_win_nil: gd_ft > 0 && away_ft == 0,
        away_win_nil: gd_ft < 0 && home_ft == 0,

        home_by_1: gd_ft == 1,
        home_by_2: gd_ft == 2,
        home_by_3: gd_ft == 3,
        home_by_4: gd_ft == 4,
        home_by_5: gd_ft == 5,
        home_by_6_plus: gd_ft >= 6,
        away_by_1: gd_ft == -1,
        away_by_2: gd_ft == -2,
        away_by_3: gd_ft == -3,
        away_by_4: gd_ft == -4,
        away_by_5: gd_ft == -5,
        away_by_6_plus: gd_ft <= -6,

        home_ah_minus_0_5: handicap_covers(gd_ft, 0.5),
        home_ah_minus_1_0: handicap_covers(gd_ft, 1.0),
        home_ah_minus_1_5: handicap_covers(gd_ft, 1.5),
        home_ah_minus_2_0: handicap_covers(gd_ft, 2.0),
        home_ah_minus_2_5: handicap_covers(gd_ft, 2.5),
        home_ah_minus_3_0: handicap_covers(gd_ft, 3.0),
        away_ah_plus_0_5: handicap_covers(-gd_ft, -0.5),
        away_ah_plus_1_0: handicap_covers(-gd_ft, -1.0),
        away_ah_plus_1_5: handicap_covers(-gd_ft, -1.5),
        away_ah_plus_2_0: handicap_covers(-gd_ft, -2.0),
        away_ah_plus_2_5: handicap_covers(-gd_ft, -2.5),
        away_ah_plus_3_0: handicap_covers(-gd_ft, -3.0),

        ht_over_0_5: over(total_ht, 0.5),
        ht_over_1_5: over(total_ht, 1.5),
        ht_over_2_5: over(total_ht, 2.5),
        ht_under_1_5: under(total_ht, 1.5),
        ht_under_2_5: under(total_ht, 2.5),
        ht_1: gd_ht > 0,
        ht_x: gd_ht == 0,
        ht_2: gd_ht < 0,

        sh_over_0_5: over(second_half, 0.5),
        sh_over_1_5: over(second_half, 1.5),
        sh_over_2_5: over(second_half, 2.5),
        sh_home_win: home_sh > away_sh,
        sh_away_win: away_sh > home_sh,
        sh_draw: home_sh == away_sh,

        ht_ft_1_1: ht_ft('1', '1'),
        ht_ft_1_x: ht_ft('1', 'X'),
        ht_ft_1_2: ht_ft('1', '2'),
        ht_ft_x_1: ht_ft('X', '1'),
        ht_ft_x_x: ht_ft('X', 'X'),
        ht_ft_x_2: ht_ft('X', '2'),
        ht_ft_2_1: ht_ft('2', '1'),
        ht_ft_2_x: ht_ft('2', 'X'),
        ht_ft_2_2: ht_ft('2', '2'),

        exact_score_ft: format!("{home_ft}-{away_ft}"),
        exact_score_ht: format!("{home_ht}-{away_ht}"),

        ht_fingerprint: ht_block(home_ht, away_ht),
        ft_fingerprint: ft_block(home_ft, away_ft),
        combined_fingerprint: combined_block(&score),
    }
}

impl Fingerprint {
    /// Every named boolean market, in a stable order.
    pub fn markets(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("match_1", self.match_1),
            ("match_x", self.match_x),
            ("match_2", self.match_2),
            ("double_1x", self.double_1x),
            ("double_12", self.double_12),
            ("double_x2", self.double_x2),
            ("over_0_5", self.over_0_5),
            ("over_1_5", self.over_1_5),
            ("over_2_5", self.over_2_5),
            ("over_3_5", self.over_3_5),
            ("over_4_5", self.over_4_5),
            ("over_5_5", self.over_5_5),
            ("over_6_5", self.over_6_5),
            ("over_7_5", self.over_7_5),
            ("under_2_5", self.under_2_5),
            ("under_3_5", self.under_3_5),
            ("under_4_5", self.under_4_5),
            ("gg_ft", self.gg_ft),
            ("ng_ft", self.ng_ft),
            ("gg_ht", self.gg_ht),
            ("ng_ht", self.ng_ht),
            ("gg_2h", self.gg_2h),
            ("ng_2h", self.ng_2h),
            ("home_win_nil", self.home_win_nil),
            ("away_win_nil", self.away_win_nil),
            ("home_by_1", self.home_by_1),
            ("home_by_2", self.home_by_2),
            ("home_by_3", self.home_by_3),
            ("home_by_4", self.home_by_4),
            ("home_by_5", self.home_by_5),
            ("home_by_6_plus", self.home_by_6_plus),
            ("away_by_1", self.away_by_1),
            ("away_by_2", self.away_by_2),
            ("away_by_3", self.away_by_3),
            ("away_by_4", self.away_by_4),
            ("away_by_5", self.away_by_5),
            ("away_by_6_plus", self.away_by_6_plus),
            ("home_ah_minus_0_5", self.home_ah_minus_0_5),
            ("home_ah_minus_1_0", self.home_ah_minus_1_0),
            ("home_ah_minus_1_5", self.home_ah_minus_1_5),
            ("home_ah_minus_2_0", self.home_ah_minus_2_0),
            ("home_ah_minus_2_5", self.home_ah_minus_2_5),
            ("home_ah_minus_3_0", self.home_ah_minus_3_0),
            ("away_ah_plus_0_5", self.away_ah_plus_0_5),
            ("away_ah_plus_1_0", self.away_ah_plus_1_0),
            ("away_ah_plus_1_5", self.away_ah_plus_1_5),
            ("away_ah_plus_2_0", self.away_ah_plus_2_0),
            ("away_ah_plus_2_5", self.away_ah_plus_2_5),
            ("away_ah_plus_3_0", self.away_ah_plus_3_0),
            ("ht_over_0_5", self.ht_over_0_5),
            ("ht_over_1_5", self.ht_over_1_5),
            ("ht_over_2_5", self.ht_over_2_5),
            ("ht_under_1_5", self.ht_under_1_5),
            ("ht_under_2_5", self.ht_under_2_5),
            ("ht_1", self.ht_1),
            ("ht_x", self.ht_x),
            ("ht_2", self.ht_2),
            ("sh_over_0_5", self.sh_over_0_5),
            ("sh_over_1_5", self.sh_over_1_5),
            ("sh_over_2_5", self.sh_over_2_5),
            ("sh_home_win", self.sh_home_win),
            ("sh_away_win", self.sh_away_win),
            ("sh_draw", self.sh_draw),
            ("ht_ft_1_1", self.ht_ft_1_1),
            ("ht_ft_1_x", self.ht_ft_1_x),
            ("ht_ft_1_2", self.ht_ft_1_2),
            ("ht_ft_x_1", self.ht_ft_x_1),
            ("ht_ft_x_x", self.ht_ft_x_x),
            ("ht_ft_x_2", self.ht_ft_x_2),
            ("ht_ft_2_1", self.ht_ft_2_1),
            ("ht_ft_2_x", self.ht_ft_2_x),
            ("ht_ft_2_2", self.ht_ft_2_2),
        ]
    }

    /// Looks up a market by name. Besides the fixed set, any full-time
    /// `over_N_5` / `under_N_5` line is answered from the total.
    pub fn market(&self, name: &str) -> Option<bool> {
        if let Some((_, value)) = self.markets().into_iter().find(|(key, _)| *key == name) {
            return Some(value);
        }
        if let Some(line) = name.strip_prefix("over_").and_then(parse_line) {
            return Some(self.over_line(line));
        }
        if let Some(line) = name.strip_prefix("under_").and_then(parse_line) {
            return Some(self.under_line(line));
        }
        None
    }

    pub fn over_line(&self, line: f64) -> bool {
        over(self.total_goals_ft, line)
    }

    pub fn under_line(&self, line: f64) -> bool {
        under(self.total_goals_ft, line)
    }

    /// Names of mutually exclusive market pairs that disagree. Empty for
    /// anything produced by [`encode`].
    pub fn check_consistency(&self) -> Vec<&'static str> {
        let mut errors = Vec::new();
        if self.total_goals_ft != self.score.total_ft() {
            errors.push("total_goals_ft");
        }
        if self.result_ft != Outcome::from_goal_diff(self.score.goal_diff_ft()) {
            errors.push("result_ft");
        }
        if self.over_2_5 == self.under_2_5 {
            errors.push("over_2_5/under_2_5");
        }
        if self.over_3_5 == self.under_3_5 {
            errors.push("over_3_5/under_3_5");
        }
        if self.gg_ft == self.ng_ft {
            errors.push("gg_ft/ng_ft");
        }
        if self.gg_ht == self.ng_ht {
            errors.push("gg_ht/ng_ht");
        }
        let results = [self.match_1, self.match_x, self.match_2];
        if results.iter().filter(|v| **v).count() != 1 {
            errors.push("match_1/match_x/match_2");
        }
        let combos = [
            self.ht_ft_1_1,
            self.ht_ft_1_x,
            self.ht_ft_1_2,
            self.ht_ft_x_1,
            self.ht_ft_x_x,
            self.ht_ft_x_2,
            self.ht_ft_2_1,
            self.ht_ft_2_x,
            self.ht_ft_2_2,
        ];
        if combos.iter().filter(|v| **v).count() != 1 {
            errors.push("ht_ft");
        }
        errors
    }
}

/// `W(1-0,ng,u1.5)`
pub fn ht_block(home: u32, away: u32) -> String {
    let total = home as i64 + away as i64;
    format!(
        "{}({home}-{away},{},{}1.5)",
        Outcome::from_goal_diff(home as i64 - away as i64),
        gg_tag(home, away),
        over_tag(total, 1.5),
    )
}

/// `W(2-1,gg,o2.5,m1)`
pub fn ft_block(home: u32, away: u32) -> String {
    format!("{})", ft_block_open(home, away))
}

fn ft_block_open(home: u32, away: u32) -> String {
    let total = home as i64 + away as i64;
    let diff = home as i64 - away as i64;
    format!(
        "{}({home}-{away},{},{}2.5,m{}",
        Outcome::from_goal_diff(diff),
        gg_tag(home, away),
        over_tag(total, 2.5),
        diff.abs(),
    )
}

/// `W(1-0,ng,u1.5)→W(2-1,gg,o2.5,m1,2h2)`
pub fn combined_block(score: &MatchScore) -> String {
    format!(
        "{}→{},2h{})",
        ht_block(score.home_ht, score.away_ht),
        ft_block_open(score.home_ft, score.away_ft),
        score.second_half_goals(),
    )
}

/// Recovers the score from a combined fingerprint string. The string must be
/// exactly what [`encode`] produces for the recovered score; anything else is
/// a decode failure.
pub fn decode_combined(raw: &str) -> PatternResult<MatchScore> {
    let fail = |reason: &'static str| PatternError::FingerprintDecode {
        raw: raw.to_string(),
        reason,
    };

    let (ht, ft) = raw.split_once('→').ok_or_else(|| fail("missing → separator"))?;
    let (home_ht, away_ht) = block_score(ht).ok_or_else(|| fail("bad half-time block"))?;
    let (home_ft, away_ft) = block_score(ft).ok_or_else(|| fail("bad full-time block"))?;

    let score = MatchScore::from_counts(home_ht, away_ht, home_ft, away_ft);
    if combined_block(&score) != raw {
        return Err(fail("flags disagree with scores"));
    }
    Ok(score)
}

/// A parsed combined fingerprint string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedFingerprint {
    pub raw: String,
    pub score: MatchScore,
}

impl FromStr for CombinedFingerprint {
    type Err = PatternError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let score = decode_combined(raw)?;
        Ok(Self {
            raw: raw.to_string(),
            score,
        })
    }
}

// `R(h-a,...)` -> (h, a)
fn block_score(block: &str) -> Option<(u32, u32)> {
    let mut chars = block.chars();
    Outcome::from_letter(chars.next()?)?;
    let body = chars.as_str().strip_prefix('(')?.strip_suffix(')')?;
    let pair = body.split(',').next()?;
    let (home, away) = pair.split_once('-')?;
    if home.is_empty() || away.is_empty() {
        return None;
    }
    if !home.chars().all(|c| c.is_ascii_digit()) || !away.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((home.parse().ok()?, away.parse().ok()?))
}

fn both_scored(home: i64, away: i64) -> bool {
    home > 0 && away > 0
}

fn gg_tag(home: u32, away: u32) -> &'static str {
    if both_scored(home as i64, away as i64) {
        "gg"
    } else {
        "ng"
    }
}

fn over_tag(total: i64, line: f64) -> &'static str {
    if over(total, line) { "o" } else { "u" }
}

fn over(total: i64, line: f64) -> bool {
    total as f64 > line
}

fn under(total: i64, line: f64) -> bool {
    (total as f64) < line
}

// Side with goal difference `diff` giving away `line` goals still wins.
fn handicap_covers(diff: i64, line: f64) -> bool {
    diff as f64 - line > 0.0
}

// "3_5" -> 3.5
fn parse_line(raw: &str) -> Option<f64> {
    let (whole, frac) = raw.split_once('_')?;
    if frac != "5" && frac != "0" {
        return None;
    }
    let whole = whole.parse::<u32>().ok()?;
    Some(whole as f64 + if frac == "5" { 0.5 } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::{MatchScore, Outcome, block_score, encode, parse_line};

    #[test]
    fn block_score_reads_pairs() {
        assert_eq!(block_score("W(1-0,ng,u1.5)"), Some((1, 0)));
        assert_eq!(block_score("D(10-10,gg,o2.5,m0,2h3)"), Some((10, 10)));
        assert_eq!(block_score("X(1-0,ng,u1.5)"), None);
        assert_eq!(block_score("W(1-,ng,u1.5)"), None);
        assert_eq!(block_score("W(1-0,ng,u1.5"), None);
    }

    #[test]
    fn parse_line_accepts_half_and_whole_lines() {
        assert_eq!(parse_line("3_5"), Some(3.5));
        assert_eq!(parse_line("10_0"), Some(10.0));
        assert_eq!(parse_line("3_25"), None);
        assert_eq!(parse_line("x_5"), None);
    }

    #[test]
    fn second_half_goals_may_be_negative() {
        let fp = encode(MatchScore::from_counts(2, 1, 1, 0));
        assert_eq!(fp.second_half_goals, -2);
        assert!(!fp.sh_over_0_5);
        assert!(fp.combined_fingerprint.ends_with(",2h-2)"));
    }

    #[test]
    fn handicap_lines_follow_goal_difference() {
        let fp = encode(MatchScore::from_counts(0, 0, 2, 1));
        assert!(fp.home_ah_minus_0_5);
        assert!(!fp.home_ah_minus_1_0);
        assert!(!fp.home_ah_minus_1_5);
        assert!(fp.away_ah_plus_1_5);
        assert!(!fp.away_ah_plus_1_0);
        assert!(!fp.away_ah_plus_0_5);
        assert_eq!(fp.result_ht, Outcome::Draw);
        assert!(fp.ht_ft_x_1);
    }
}

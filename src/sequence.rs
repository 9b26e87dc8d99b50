use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::{PatternError, PatternResult};
use crate::fingerprint::Outcome;

/// Letters read by [`analyze_sequence`].
pub const SEQUENCE_LEN: usize = 5;

const SIMILAR_CONFIDENCE_FACTOR: f64 = 0.8;
const RECENT_WEIGHT: f64 = 0.70;
const CONTEXT_WEIGHT: f64 = 0.30;

pub const MODIFIER_RANGE: (f64, f64) = (-0.20, 0.20);
pub const CONFIDENCE_RANGE: (f64, f64) = (0.1, 0.95);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MomentumState {
    Peak,
    Building,
    Fragile,
    Declining,
    Neutral,
}

impl MomentumState {
    pub fn as_str(self) -> &'static str {
        match self {
            MomentumState::Peak => "peak",
            MomentumState::Building => "building",
            MomentumState::Fragile => "fragile",
            MomentumState::Declining => "declining",
            MomentumState::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    ExactMatch,
    SimilarPattern,
    GenericAnalysis,
}

/// One past game of a team, as read back from the fingerprint store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceEntry {
    pub result: Outcome,
    /// 1 is the most recent game.
    pub game_position: u32,
    pub combined_fingerprint: String,
}

/// Result letters of one team, most recent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub letters: String,
    pub positions: Vec<u32>,
}

impl SequenceRecord {
    /// Takes the `len` most recent games by `game_position`, never more
    /// than [`SEQUENCE_LEN`].
    pub fn from_games(games: &[SequenceEntry], len: usize) -> Self {
        let sorted = sorted_by_position(games);
        let picked = &sorted[..sorted.len().min(len).min(SEQUENCE_LEN)];
        Self {
            letters: picked.iter().map(|g| g.result.letter()).collect(),
            positions: picked.iter().map(|g| g.game_position).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceInsight {
    pub momentum_state: MomentumState,
    pub psychological_modifier: f64,
    pub confidence: f64,
    pub explanation: String,
    pub pattern_detected: String,
    pub sequence_fingerprint: String,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternAnalysis {
    pub recent_3: SequenceInsight,
    pub recent_5: SequenceInsight,
    pub recent_6: Option<SequenceInsight>,
    pub full_8: Option<SequenceInsight>,
    pub weighted_recommendation: SequenceInsight,
}

#[derive(Debug, Clone, Copy)]
pub struct LibraryEntry {
    pub momentum_state: MomentumState,
    pub psychological_modifier: f64,
    pub confidence: f64,
    pub explanation: &'static str,
}

const fn entry(
    momentum_state: MomentumState,
    psychological_modifier: f64,
    confidence: f64,
    explanation: &'static str,
) -> LibraryEntry {
    LibraryEntry {
        momentum_state,
        psychological_modifier,
        confidence,
        explanation,
    }
}

static LIBRARY: Lazy<HashMap<&'static str, LibraryEntry>> = Lazy::new(|| {
    use MomentumState::*;
    HashMap::from([
        (
            "WWWWW",
            entry(Peak, -0.12, 0.85, "Perfect run builds expectation pressure and extra opponent motivation"),
        ),
        (
            "WWWW",
            entry(Peak, -0.10, 0.80, "Four straight wins raise expectations and the pressure to keep the run going"),
        ),
        (
            "WWWWD",
            entry(Fragile, -0.15, 0.80, "Draw breaks a perfect run and plants doubt about form"),
        ),
        (
            "WWWWL",
            entry(Fragile, -0.18, 0.85, "Loss after a perfect run shakes confidence"),
        ),
        (
            "WLWLW",
            entry(Fragile, -0.10, 0.70, "Alternating results point to tactical or mental fragility"),
        ),
        (
            "DWDWD",
            entry(Fragile, -0.05, 0.60, "Draw habit forming, decisiveness fading in key moments"),
        ),
        (
            "WDWDW",
            entry(Fragile, -0.08, 0.65, "Win-draw alternation, no sustained momentum"),
        ),
        (
            "LLWWW",
            entry(Building, 0.15, 0.75, "Strong recovery from a poor start, confidence rebuilt"),
        ),
        (
            "LLLWW",
            entry(Building, 0.10, 0.65, "Early recovery phase, confidence not yet established"),
        ),
        (
            "DDWWW",
            entry(Building, 0.12, 0.70, "Draw habit broken by a run of wins"),
        ),
        (
            "LDWWW",
            entry(Building, 0.13, 0.70, "Mixed start turning into strong form"),
        ),
        (
            "DDDDW",
            entry(Building, 0.12, 0.70, "Long draw run ended by a win"),
        ),
        (
            "WWWDD",
            entry(Declining, -0.08, 0.65, "Momentum slipping after a strong period"),
        ),
        (
            "WDDDD",
            entry(Declining, -0.12, 0.70, "Draw habit after a winning start"),
        ),
        (
            "WWLLL",
            entry(Declining, -0.14, 0.75, "Sharp decline from good form"),
        ),
        (
            "WDDDL",
            entry(Declining, -0.10, 0.65, "Gradual decline ending in a loss"),
        ),
        (
            "LLLLL",
            entry(Declining, 0.18, 0.80, "Extended losing run, rock-bottom motivation for a turnaround"),
        ),
        (
            "DDDDD",
            entry(Neutral, 0.05, 0.50, "Solid but blunt, slight goal boost expected"),
        ),
        (
            "LDWLD",
            entry(Fragile, -0.06, 0.60, "Chaotic results, tactical confusion"),
        ),
    ])
});

pub fn library_entry(letters: &str) -> Option<&'static LibraryEntry> {
    LIBRARY.get(letters)
}

pub fn known_patterns() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = LIBRARY.keys().copied().collect();
    keys.sort_unstable();
    keys
}

struct RuleInsight {
    momentum_state: MomentumState,
    psychological_modifier: f64,
    confidence: f64,
    explanation: String,
}

struct FallbackRule {
    name: &'static str,
    matches: fn(&str) -> bool,
    insight: fn(&str) -> RuleInsight,
}

// Checked in order; the first rule that matches wins.
static FALLBACK_RULES: [FallbackRule; 6] = [
    FallbackRule {
        name: "win_streak",
        matches: |s| s.contains("WWWW"),
        insight: |s| RuleInsight {
            momentum_state: MomentumState::Peak,
            psychological_modifier: -0.10,
            confidence: 0.65,
            explanation: format!(
                "Extended {}-game winning streak, regression risk",
                first_run(s, 'W')
            ),
        },
    },
    FallbackRule {
        name: "recovery",
        matches: |s| s.len() >= 5 && leading_run(s, 'L') >= 2 && trailing_run(s, 'W') >= 2,
        insight: |s| {
            let wins = trailing_run(s, 'W');
            RuleInsight {
                momentum_state: MomentumState::Building,
                psychological_modifier: (0.05 + wins as f64 * 0.03).min(0.15),
                confidence: 0.60 + wins as f64 * 0.05,
                explanation: format!(
                    "Recovery from a {}-game poor start with {wins} wins",
                    leading_run(s, 'L')
                ),
            }
        },
    },
    FallbackRule {
        name: "alternating",
        matches: |s| ["WLWL", "LWLW", "WDWD", "DWDW"].iter().any(|p| s.contains(p)),
        insight: |_| RuleInsight {
            momentum_state: MomentumState::Fragile,
            psychological_modifier: -0.08,
            confidence: 0.65,
            explanation: "Alternating results, inconsistent under pressure".to_string(),
        },
    },
    FallbackRule {
        name: "momentum_break",
        matches: |s| s.len() >= 4 && leading_run(s, 'W') >= 2 && (s.ends_with('L') || s.ends_with('D')),
        insight: |_| RuleInsight {
            momentum_state: MomentumState::Declining,
            psychological_modifier: -0.09,
            confidence: 0.60,
            explanation: "Poor recent results after good form".to_string(),
        },
    },
    FallbackRule {
        name: "losing_streak",
        matches: |s| s.contains("LLL"),
        insight: |s| {
            let losses = first_run(s, 'L');
            RuleInsight {
                momentum_state: MomentumState::Declining,
                psychological_modifier: (0.05 + losses as f64 * 0.02).min(0.15),
                confidence: (0.50 + losses as f64 * 0.05).min(0.75),
                explanation: format!("{losses}-game losing streak, turnaround motivation"),
            }
        },
    },
    FallbackRule {
        name: "draw_run",
        matches: |s| s.contains("DDD"),
        insight: |_| RuleInsight {
            momentum_state: MomentumState::Neutral,
            psychological_modifier: 0.03,
            confidence: 0.45,
            explanation: "Run of draws, modest goal increase expected".to_string(),
        },
    },
];

/// Classifies the five most recent games. No games gives the neutral insight.
pub fn analyze_sequence(games: &[SequenceEntry]) -> SequenceInsight {
    let record = SequenceRecord::from_games(games, SEQUENCE_LEN);
    if record.is_empty() {
        return neutral_insight("No games provided".to_string());
    }
    classify_unchecked(&record.letters)
}

/// Classifies a literal W/D/L string.
pub fn classify(letters: &str) -> PatternResult<SequenceInsight> {
    if letters.is_empty() {
        return Err(PatternError::EmptySequence);
    }
    if let Some(bad) = letters.chars().find(|c| Outcome::from_letter(*c).is_none()) {
        return Err(PatternError::InvalidInput(format!(
            "unexpected result letter {bad:?} in {letters:?}"
        )));
    }
    Ok(classify_unchecked(letters))
}

fn classify_unchecked(letters: &str) -> SequenceInsight {
    if let Some(hit) = library_entry(letters) {
        return SequenceInsight {
            momentum_state: hit.momentum_state,
            psychological_modifier: hit.psychological_modifier,
            confidence: hit.confidence,
            explanation: hit.explanation.to_string(),
            pattern_detected: letters.to_string(),
            sequence_fingerprint: letters.to_string(),
            match_type: MatchType::ExactMatch,
        };
    }

    if let Some(rule) = FALLBACK_RULES.iter().find(|rule| (rule.matches)(letters)) {
        let found = (rule.insight)(letters);
        tracing::debug!(sequence = letters, rule = rule.name, "fuzzy sequence match");
        return SequenceInsight {
            momentum_state: found.momentum_state,
            psychological_modifier: found.psychological_modifier,
            confidence: found.confidence * SIMILAR_CONFIDENCE_FACTOR,
            explanation: found.explanation,
            pattern_detected: letters.to_string(),
            sequence_fingerprint: letters.to_string(),
            match_type: MatchType::SimilarPattern,
        };
    }

    generic_analysis(letters)
}

fn generic_analysis(letters: &str) -> SequenceInsight {
    let wins = letters.chars().filter(|c| *c == 'W').count();
    let draws = letters.chars().filter(|c| *c == 'D').count();
    let losses = letters.chars().filter(|c| *c == 'L').count();
    let total = wins + draws + losses;
    if total == 0 {
        return neutral_insight("No sequence data".to_string());
    }

    let win_rate = wins as f64 / total as f64;
    let loss_rate = losses as f64 / total as f64;

    let generic = |momentum_state, psychological_modifier, confidence, explanation| SequenceInsight {
        momentum_state,
        psychological_modifier,
        confidence,
        explanation,
        pattern_detected: letters.to_string(),
        sequence_fingerprint: letters.to_string(),
        match_type: MatchType::GenericAnalysis,
    };

    if win_rate >= 0.8 {
        return generic(
            MomentumState::Peak,
            -0.08,
            0.50,
            format!("High win rate ({:.0}%) brings expectation pressure", win_rate * 100.0),
        );
    }
    if loss_rate >= 0.6 {
        return generic(
            MomentumState::Declining,
            0.10,
            0.45,
            format!("Poor form ({:.0}% losses) often precedes improvement", loss_rate * 100.0),
        );
    }
    if draws >= 2 && wins >= 1 && losses >= 1 {
        return generic(
            MomentumState::Fragile,
            -0.04,
            0.40,
            "Mixed results, tactical uncertainty".to_string(),
        );
    }

    neutral_insight(format!("{wins}W-{draws}D-{losses}L, balanced recent form"))
}

pub fn neutral_insight(explanation: String) -> SequenceInsight {
    SequenceInsight {
        momentum_state: MomentumState::Neutral,
        psychological_modifier: 0.0,
        confidence: 0.3,
        explanation,
        pattern_detected: "NONE".to_string(),
        sequence_fingerprint: "NEUTRAL".to_string(),
        match_type: MatchType::GenericAnalysis,
    }
}

/// Recent 3 and 5 always; 6 and 8 only when that many games exist. Records
/// stop at five letters, so the longer windows read the same five games.
pub fn analyze_windows(games: &[SequenceEntry]) -> PatternAnalysis {
    if games.is_empty() {
        let neutral = neutral_insight("No games available".to_string());
        return PatternAnalysis {
            recent_3: neutral.clone(),
            recent_5: neutral.clone(),
            recent_6: None,
            full_8: None,
            weighted_recommendation: neutral,
        };
    }

    let window = |len: usize| classify_unchecked(&SequenceRecord::from_games(games, len).letters);
    let recent_3 = window(3);
    let recent_5 = window(5);
    let recent_6 = (games.len() >= 6).then(|| window(6));
    let full_8 = (games.len() >= 8).then(|| window(8));
    let weighted_recommendation = weighted_recommendation(&recent_3, &recent_5);

    PatternAnalysis {
        recent_3,
        recent_5,
        recent_6,
        full_8,
        weighted_recommendation,
    }
}

pub fn weighted_recommendation(recent: &SequenceInsight, context: &SequenceInsight) -> SequenceInsight {
    let modifier = recent.psychological_modifier * RECENT_WEIGHT
        + context.psychological_modifier * CONTEXT_WEIGHT;
    let confidence = recent.confidence * RECENT_WEIGHT + context.confidence * CONTEXT_WEIGHT;
    let momentum_state = if recent.confidence >= context.confidence {
        recent.momentum_state
    } else {
        context.momentum_state
    };

    SequenceInsight {
        momentum_state,
        psychological_modifier: round3(modifier),
        confidence: round3(confidence),
        explanation: format!(
            "Weighted: {} (recent) + {} (context)",
            recent.explanation, context.explanation
        ),
        pattern_detected: format!(
            "{} (3) + {} (5)",
            recent.pattern_detected, context.pattern_detected
        ),
        sequence_fingerprint: recent.sequence_fingerprint.clone(),
        match_type: MatchType::GenericAnalysis,
    }
}

/// Combined fingerprints of the five most recent games joined with `|`.
pub fn sequence_fingerprint(games: &[SequenceEntry]) -> String {
    if games.is_empty() {
        return "NO_GAMES".to_string();
    }
    sorted_by_position(games)
        .iter()
        .take(SEQUENCE_LEN)
        .map(|g| g.combined_fingerprint.as_str())
        .collect::<Vec<_>>()
        .join("|")
}

/// Range violations of an insight; empty when valid.
pub fn validate_insight(insight: &SequenceInsight) -> Vec<String> {
    let mut errors = Vec::new();
    let (min_mod, max_mod) = MODIFIER_RANGE;
    if !(min_mod..=max_mod).contains(&insight.psychological_modifier) {
        errors.push(format!(
            "psychological modifier {} outside {min_mod}..={max_mod}",
            insight.psychological_modifier
        ));
    }
    let (min_conf, max_conf) = CONFIDENCE_RANGE;
    if !(min_conf..=max_conf).contains(&insight.confidence) {
        errors.push(format!(
            "confidence {} outside {min_conf}..={max_conf}",
            insight.confidence
        ));
    }
    errors
}

fn sorted_by_position(games: &[SequenceEntry]) -> Vec<&SequenceEntry> {
    let mut sorted: Vec<&SequenceEntry> = games.iter().collect();
    sorted.sort_by_key(|g| g.game_position);
    sorted
}

fn leading_run(s: &str, ch: char) -> usize {
    s.chars().take_while(|c| *c == ch).count()
}

fn trailing_run(s: &str, ch: char) -> usize {
    s.chars().rev().take_while(|c| *c == ch).count()
}

fn first_run(s: &str, ch: char) -> usize {
    s.chars().skip_while(|c| *c != ch).take_while(|c| *c == ch).count()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

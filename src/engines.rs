use serde::Serialize;

use crate::goal_stats::GoalStats;

const FIBONACCI: [u32; 8] = [0, 1, 1, 2, 3, 5, 8, 13];
pub const PHI: f64 = 1.618_033_988_749_894_8;
const NEUTRAL: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Fibonacci,
    GoldenRatio,
    Entropy,
    QuantumCoherence,
    Nash,
    Cyclical,
    Pressure,
    Pythagorean,
}

impl EngineKind {
    pub const ALL: [EngineKind; 8] = [
        EngineKind::Fibonacci,
        EngineKind::GoldenRatio,
        EngineKind::Entropy,
        EngineKind::QuantumCoherence,
        EngineKind::Nash,
        EngineKind::Cyclical,
        EngineKind::Pressure,
        EngineKind::Pythagorean,
    ];

    pub fn weight(self) -> f64 {
        match self {
            EngineKind::Fibonacci => 1.2,
            EngineKind::GoldenRatio => 2.0,
            EngineKind::Entropy => 0.8,
            EngineKind::QuantumCoherence => 1.1,
            EngineKind::Nash => 1.3,
            EngineKind::Cyclical => 0.9,
            EngineKind::Pressure => 1.4,
            EngineKind::Pythagorean => 1.2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Fibonacci => "fibonacci",
            EngineKind::GoldenRatio => "golden_ratio",
            EngineKind::Entropy => "entropy",
            EngineKind::QuantumCoherence => "quantum_coherence",
            EngineKind::Nash => "nash",
            EngineKind::Cyclical => "cyclical",
            EngineKind::Pressure => "pressure",
            EngineKind::Pythagorean => "pythagorean",
        }
    }
}

/// Intermediate values behind a contribution, one variant per engine.
/// `None` fields mean the engine had no matches to look at.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum EngineDetail {
    Fibonacci {
        avg_total: f64,
        closest: u32,
        is_fibonacci: bool,
    },
    GoldenRatio {
        ratio: f64,
        deviation: f64,
    },
    Entropy {
        bits: Option<f64>,
    },
    QuantumCoherence {
        progression: f64,
        coherence: f64,
    },
    Nash {
        avg_balance: Option<f64>,
    },
    Cyclical {
        cyclical_ratio: Option<f64>,
    },
    Pressure {
        second_half: f64,
        pressure_ratio: f64,
    },
    Pythagorean {
        avg_gap: Option<f64>,
    },
    NoHistoricalData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineScore {
    pub engine: EngineKind,
    pub contribution: f64,
    pub weight: f64,
    pub reasoning: String,
    pub detail: EngineDetail,
}

/// All eight engines in [`EngineKind::ALL`] order. Goalless or empty history
/// gives a neutral 0.5 from every engine.
pub fn run_all(stats: &GoalStats) -> Vec<EngineScore> {
    EngineKind::ALL
        .iter()
        .map(|kind| run_engine(*kind, stats))
        .collect()
}

pub fn run_engine(kind: EngineKind, stats: &GoalStats) -> EngineScore {
    if stats.has_no_data() {
        return EngineScore {
            engine: kind,
            contribution: NEUTRAL,
            weight: kind.weight(),
            reasoning: "no historical goals, neutral".to_string(),
            detail: EngineDetail::NoHistoricalData,
        };
    }

    let (contribution, detail) = match kind {
        EngineKind::Fibonacci => fibonacci(stats.avg_total_goals),
        EngineKind::GoldenRatio => golden_ratio(stats.avg_ht_goals, stats.avg_total_goals),
        EngineKind::Entropy => entropy(stats),
        EngineKind::QuantumCoherence => quantum(stats.avg_ht_goals, stats.avg_total_goals),
        EngineKind::Nash => nash(stats),
        EngineKind::Cyclical => cyclical(stats),
        EngineKind::Pressure => pressure(stats.avg_ht_goals, stats.avg_total_goals),
        EngineKind::Pythagorean => pythagorean(stats),
    };
    EngineScore {
        engine: kind,
        contribution: sanitize(contribution),
        weight: kind.weight(),
        reasoning: reasoning(&detail, contribution),
        detail,
    }
}

fn fibonacci(avg_total: f64) -> (f64, EngineDetail) {
    let closest = FIBONACCI
        .iter()
        .copied()
        .fold(FIBONACCI[0], |best, value| {
            if (value as f64 - avg_total).abs() < (best as f64 - avg_total).abs() {
                value
            } else {
                best
            }
        });
    let rounded = avg_total.round();
    let is_fibonacci = FIBONACCI.iter().any(|v| *v as f64 == rounded);
    let contribution = if is_fibonacci {
        if avg_total >= 3.0 { 0.8 } else { 0.6 }
    } else {
        let distance = (avg_total - closest as f64).abs() / avg_total.max(1.0);
        0.4 + (1.0 - distance).max(0.0) * 0.3
    };
    (
        contribution,
        EngineDetail::Fibonacci {
            avg_total,
            closest,
            is_fibonacci,
        },
    )
}

fn golden_ratio(avg_ht: f64, avg_total: f64) -> (f64, EngineDetail) {
    let ratio = progression(avg_ht, avg_total);
    let deviation = (ratio - PHI).abs();
    let contribution = if deviation < 0.08 {
        0.9
    } else {
        0.4 + (1.0 - deviation).max(0.0) * 0.3
    };
    (contribution, EngineDetail::GoldenRatio { ratio, deviation })
}

fn entropy(stats: &GoalStats) -> (f64, EngineDetail) {
    if stats.matches.is_empty() {
        return (NEUTRAL, EngineDetail::Entropy { bits: None });
    }
    let totals: Vec<f64> = stats.matches.iter().map(|m| m.total_ft() as f64).collect();
    let bits = smoothed_entropy(&totals);
    let contribution = if bits > 1.5 { 0.3 } else { 0.6 };
    (contribution, EngineDetail::Entropy { bits: Some(bits) })
}

/// Shannon entropy in bits with +0.1 smoothing per value.
pub fn smoothed_entropy(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let total = values.iter().sum::<f64>() + 1.0;
    -values
        .iter()
        .map(|v| (v + 0.1) / (total + 0.4))
        .filter(|p| *p > 0.0)
        .map(|p| p * p.log2())
        .sum::<f64>()
}

fn quantum(avg_ht: f64, avg_total: f64) -> (f64, EngineDetail) {
    let progression = progression(avg_ht, avg_total);
    let coherence = if (1.5..=3.0).contains(&progression) {
        (1.0 - (progression - 2.0).abs() / 2.0).max(0.0)
    } else {
        0.2
    };
    let contribution = if coherence > 0.8 {
        0.75
    } else {
        0.4 + coherence * 0.2
    };
    (
        contribution,
        EngineDetail::QuantumCoherence {
            progression,
            coherence,
        },
    )
}

fn nash(stats: &GoalStats) -> (f64, EngineDetail) {
    if stats.matches.is_empty() {
        return (NEUTRAL, EngineDetail::Nash { avg_balance: None });
    }
    let sum: f64 = stats
        .matches
        .iter()
        .map(|m| {
            let total = m.total_ft();
            if total > 0 {
                1.0 - m.goal_diff_ft().abs() as f64 / total as f64
            } else {
                0.0
            }
        })
        .sum();
    let avg_balance = sum / stats.matches.len() as f64;
    let contribution = if avg_balance < 0.3 {
        0.8
    } else {
        0.4 + avg_balance * 0.3
    };
    (
        contribution,
        EngineDetail::Nash {
            avg_balance: Some(avg_balance),
        },
    )
}

fn cyclical(stats: &GoalStats) -> (f64, EngineDetail) {
    if stats.matches.len() < 2 {
        return (
            NEUTRAL,
            EngineDetail::Cyclical {
                cyclical_ratio: None,
            },
        );
    }
    let close_pairs = stats
        .matches
        .windows(2)
        .filter(|pair| (pair[0].total_ft() - pair[1].total_ft()).abs() <= 1)
        .count();
    let cyclical_ratio = close_pairs as f64 / (stats.matches.len() - 1) as f64;
    let contribution = if cyclical_ratio > 0.6 { 0.7 } else { 0.5 };
    (
        contribution,
        EngineDetail::Cyclical {
            cyclical_ratio: Some(cyclical_ratio),
        },
    )
}

fn pressure(avg_ht: f64, avg_total: f64) -> (f64, EngineDetail) {
    let second_half = avg_total - avg_ht;
    let pressure_ratio = if avg_ht > 0.0 {
        second_half / avg_ht
    } else {
        second_half
    };
    let contribution = if second_half >= 3.0 || pressure_ratio >= 2.0 {
        0.9
    } else {
        0.5
    };
    (
        contribution,
        EngineDetail::Pressure {
            second_half,
            pressure_ratio,
        },
    )
}

fn pythagorean(stats: &GoalStats) -> (f64, EngineDetail) {
    if stats.matches.is_empty() {
        return (NEUTRAL, EngineDetail::Pythagorean { avg_gap: None });
    }
    let gaps: f64 = stats
        .matches
        .iter()
        .map(|m| {
            let (h, a) = (m.home_ft() as f64, m.away_ft() as f64);
            (h + a) - (h * h + a * a).sqrt()
        })
        .sum();
    let avg_gap = gaps / stats.matches.len() as f64;
    let contribution = if avg_gap.abs() > 1.5 {
        if avg_gap < 0.0 { 0.8 } else { 0.3 }
    } else {
        0.5
    };
    (
        contribution,
        EngineDetail::Pythagorean {
            avg_gap: Some(avg_gap),
        },
    )
}

// ft / ht, or ft itself when no first-half goals were scored.
fn progression(avg_ht: f64, avg_total: f64) -> f64 {
    if avg_ht > 0.0 {
        avg_total / avg_ht
    } else {
        avg_total
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        NEUTRAL
    }
}

fn reasoning(detail: &EngineDetail, contribution: f64) -> String {
    match detail {
        EngineDetail::Fibonacci {
            avg_total,
            closest,
            is_fibonacci,
        } => {
            if *is_fibonacci {
                format!("avg {avg_total:.2} goals rounds onto the Fibonacci sequence")
            } else {
                format!("avg {avg_total:.2} goals, nearest Fibonacci {closest}")
            }
        }
        EngineDetail::GoldenRatio { ratio, deviation } => {
            format!("ft/ht ratio {ratio:.3}, {deviation:.3} from phi")
        }
        EngineDetail::Entropy { bits } => match bits {
            Some(bits) if contribution < 0.5 => format!("{bits:.2} bits, chaotic scoring"),
            Some(bits) => format!("{bits:.2} bits, predictable scoring"),
            None => "no matches, neutral".to_string(),
        },
        EngineDetail::QuantumCoherence {
            progression,
            coherence,
        } => format!("ht->ft progression {progression:.2}, coherence {coherence:.2}"),
        EngineDetail::Nash { avg_balance } => match avg_balance {
            Some(balance) => format!("average balance {balance:.2}"),
            None => "no matches, neutral".to_string(),
        },
        EngineDetail::Cyclical { cyclical_ratio } => match cyclical_ratio {
            Some(ratio) => format!("{:.0}% of consecutive totals within one goal", ratio * 100.0),
            None => "fewer than two matches, neutral".to_string(),
        },
        EngineDetail::Pressure {
            second_half,
            pressure_ratio,
        } => {
            if contribution > 0.5 {
                format!("explosive second half {second_half:.2} (ratio {pressure_ratio:.2})")
            } else {
                format!("second half {second_half:.2} (ratio {pressure_ratio:.2})")
            }
        }
        EngineDetail::Pythagorean { avg_gap } => match avg_gap {
            Some(gap) => format!("average gap to expected {gap:.2}"),
            None => "no matches, neutral".to_string(),
        },
        EngineDetail::NoHistoricalData => "no historical goals, neutral".to_string(),
    }
}

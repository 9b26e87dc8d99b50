use serde::{Deserialize, Serialize};

use crate::engines::{self, EngineScore};
use crate::ensemble::{self, EnsembleSummary};
use crate::goal_stats::GoalStats;

const OVER35_BOUNDS: (f64, f64) = (0.05, 0.95);
const OVER45_BOUNDS: (f64, f64) = (0.03, 0.90);
const OVER45_SHARE: f64 = 0.6;
const MIN_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectorParams {
    /// Empirical Over 3.5 rate the gate damps toward.
    pub base_rate_over35: f64,
    pub accuracy_over35: f64,
    pub accuracy_over45: f64,
}

impl Default for ProjectorParams {
    fn default() -> Self {
        Self {
            base_rate_over35: 0.27,
            accuracy_over35: 0.679,
            accuracy_over45: 0.839,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoalMarket {
    #[serde(rename = "over_3_5")]
    Over35,
    #[serde(rename = "over_4_5")]
    Over45,
}

impl GoalMarket {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalMarket::Over35 => "over_3_5",
            GoalMarket::Over45 => "over_4_5",
        }
    }
}

/// Decimal bookmaker odds, when known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketOdds {
    pub over_3_5: Option<f64>,
    pub over_4_5: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketProjection {
    pub market: GoalMarket,
    pub probability: f64,
    pub confidence: f64,
    pub quality_score: f64,
    pub engine_breakdown: Vec<EngineScore>,
    pub edge: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub over_3_5: MarketProjection,
    pub over_4_5: MarketProjection,
    pub summary: EnsembleSummary,
    pub no_historical_data: bool,
}

impl Projection {
    pub fn market(&self, market: GoalMarket) -> &MarketProjection {
        match market {
            GoalMarket::Over35 => &self.over_3_5,
            GoalMarket::Over45 => &self.over_4_5,
        }
    }
}

/// Runs the engines over `stats` and turns the gated score into Over 3.5 and
/// Over 4.5 probabilities. Without any historical goals the probability is
/// the base rate and confidence sits at its floor.
pub fn project(stats: &GoalStats, params: &ProjectorParams, odds: &MarketOdds) -> Projection {
    let scores = engines::run_all(stats);
    let summary = ensemble::gate(&scores, params.base_rate_over35);
    let no_historical_data = stats.has_no_data();

    let (p35, conf35) = if no_historical_data {
        (clamp_to(params.base_rate_over35, OVER35_BOUNDS), MIN_CONFIDENCE)
    } else {
        (
            clamp_to(summary.gated, OVER35_BOUNDS),
            confidence(summary.engine_stdev, summary.quality, params.accuracy_over35),
        )
    };
    let p45 = clamp_to(p35 * OVER45_SHARE, OVER45_BOUNDS);
    let conf45 = (conf35 * params.accuracy_over45).max(MIN_CONFIDENCE);

    Projection {
        over_3_5: MarketProjection {
            market: GoalMarket::Over35,
            probability: p35,
            confidence: conf35,
            quality_score: summary.quality,
            engine_breakdown: scores.clone(),
            edge: odds.over_3_5.and_then(|o| edge(p35, o)),
        },
        over_4_5: MarketProjection {
            market: GoalMarket::Over45,
            probability: p45,
            confidence: conf45,
            quality_score: summary.quality,
            engine_breakdown: scores,
            edge: odds.over_4_5.and_then(|o| edge(p45, o)),
        },
        summary,
        no_historical_data,
    }
}

pub fn confidence(engine_stdev: f64, quality: f64, historical_accuracy: f64) -> f64 {
    ((1.0 - engine_stdev) * quality * historical_accuracy).max(MIN_CONFIDENCE)
}

/// Percentage edge of `probability` over the odds' implied probability.
/// `None` for odds that cannot be priced.
pub fn edge(probability: f64, decimal_odds: f64) -> Option<f64> {
    if !decimal_odds.is_finite() || decimal_odds <= 0.0 {
        return None;
    }
    let implied = 1.0 / decimal_odds;
    Some((probability / implied - 1.0) * 100.0)
}

fn clamp_to(value: f64, (lo, hi): (f64, f64)) -> f64 {
    if value.is_nan() {
        return lo;
    }
    value.clamp(lo, hi)
}

use serde::Serialize;

use crate::engines::EngineScore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnsembleSummary {
    pub weighted_average: f64,
    pub engine_stdev: f64,
    pub quality: f64,
    pub multiplier: f64,
    /// Weighted average damped toward the base rate by `multiplier`.
    pub gated: f64,
}

pub fn weighted_average(scores: &[EngineScore]) -> f64 {
    let total_weight: f64 = scores.iter().map(|s| s.weight).sum();
    if total_weight <= 0.0 {
        return 0.5;
    }
    scores.iter().map(|s| s.contribution * s.weight).sum::<f64>() / total_weight
}

/// Population standard deviation of the raw contributions.
pub fn engine_stdev(scores: &[EngineScore]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().map(|s| s.contribution).sum::<f64>() / n;
    let variance = scores
        .iter()
        .map(|s| (s.contribution - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt()
}

pub fn quality_score(weighted_average: f64, engine_stdev: f64) -> f64 {
    (weighted_average * (1.0 - engine_stdev)).clamp(0.0, 1.0)
}

pub fn quality_multiplier(quality: f64) -> f64 {
    if quality > 0.4 {
        1.0
    } else if quality > 0.2 {
        0.5
    } else {
        0.2
    }
}

pub fn gate(scores: &[EngineScore], base_rate: f64) -> EnsembleSummary {
    let weighted_average = weighted_average(scores);
    let engine_stdev = engine_stdev(scores);
    let quality = quality_score(weighted_average, engine_stdev);
    let multiplier = quality_multiplier(quality);
    EnsembleSummary {
        weighted_average,
        engine_stdev,
        quality,
        multiplier,
        gated: multiplier * weighted_average + (1.0 - multiplier) * base_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{EngineDetail, EngineKind};

    fn score(kind: EngineKind, contribution: f64) -> EngineScore {
        EngineScore {
            engine: kind,
            contribution,
            weight: kind.weight(),
            reasoning: String::new(),
            detail: EngineDetail::NoHistoricalData,
        }
    }

    #[test]
    fn multiplier_steps() {
        assert_eq!(quality_multiplier(0.41), 1.0);
        assert_eq!(quality_multiplier(0.4), 0.5);
        assert_eq!(quality_multiplier(0.21), 0.5);
        assert_eq!(quality_multiplier(0.2), 0.2);
    }

    #[test]
    fn weights_pull_the_average() {
        let scores = vec![
            score(EngineKind::GoldenRatio, 0.9),
            score(EngineKind::Entropy, 0.3),
        ];
        // (0.9 * 2.0 + 0.3 * 0.8) / 2.8
        assert!((weighted_average(&scores) - 2.04 / 2.8).abs() < 1e-12);
        assert!((engine_stdev(&scores) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn low_quality_falls_toward_base_rate() {
        let scores: Vec<_> = EngineKind::ALL
            .iter()
            .enumerate()
            .map(|(i, kind)| score(*kind, if i % 2 == 0 { 0.0 } else { 0.4 }))
            .collect();
        let summary = gate(&scores, 0.27);
        assert!(summary.quality <= 0.2);
        assert_eq!(summary.multiplier, 0.2);
        let expected = 0.2 * summary.weighted_average + 0.8 * 0.27;
        assert!((summary.gated - expected).abs() < 1e-12);
    }
}

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use match_patterns::config::{self, PipelineConfig};
use match_patterns::goal_stats::{HistoricalMatch, TeamType};
use match_patterns::markets::MarketOdds;
use match_patterns::{logging, pipeline, store};

#[derive(Debug, serde::Deserialize)]
struct PredictCase {
    simulation_id: i64,
    #[serde(default)]
    odds: MarketOdds,
    matches: Vec<CaseMatch>,
}

#[derive(Debug, serde::Deserialize)]
struct CaseMatch {
    team_type: TeamType,
    game_position: u32,
    home_ht: i64,
    away_ht: i64,
    home_ft: i64,
    away_ft: i64,
}

fn main() -> Result<()> {
    logging::init();
    let cfg = PipelineConfig::from_env();
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    let path = config::positional_args(&args, &["--db"])
        .into_iter()
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("demos/predict_case.json"));
    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let case: PredictCase =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;

    let mut records = Vec::with_capacity(case.matches.len());
    for m in &case.matches {
        let record = HistoricalMatch::new(
            case.simulation_id,
            m.team_type,
            m.game_position,
            m.home_ht,
            m.away_ht,
            m.home_ft,
            m.away_ft,
        )
        .with_context(|| format!("{} match at position {}", m.team_type, m.game_position))?;
        records.push(record);
    }

    // --db persists the case and records the prediction for later settlement.
    let report = match config::flag_value(&args, "--db") {
        Some(db) => {
            let db_path = PathBuf::from(db);
            let mut conn = store::open_db(&db_path)?;
            let stored = store::insert_matches(&mut conn, &records)?;
            println!("DB: {} ({stored} matches stored)", db_path.display());
            pipeline::predict_stored(&conn, case.simulation_id, &cfg, &case.odds, true)?
        }
        None => pipeline::predict_from_records(&records, case.simulation_id, &cfg, &case.odds),
    };

    let over35 = &report.projection.over_3_5;
    let over45 = &report.projection.over_4_5;
    println!("Simulation: {}", report.simulation_id);
    println!(
        "Matches: {} (window {}), avg goals {:.2}, avg HT goals {:.2}",
        report.matches, report.stats_window, report.avg_total_goals, report.avg_ht_goals
    );
    if report.goal_adjustment != 0.0 {
        println!(
            "Learned adjustment {:+.3}, expected goals {:.2}",
            report.goal_adjustment, report.expected_total_goals
        );
    }
    println!(
        "Over 3.5: {:.1}% (confidence {:.2}, quality {:.2})",
        over35.probability * 100.0,
        over35.confidence,
        over35.quality_score
    );
    println!(
        "Over 4.5: {:.1}% (confidence {:.2})",
        over45.probability * 100.0,
        over45.confidence
    );
    for (label, edge) in [("Over 3.5", over35.edge), ("Over 4.5", over45.edge)] {
        if let Some(edge) = edge {
            println!("{label} edge: {edge:+.1}%");
        }
    }
    println!(
        "Home form: {} ({:?})",
        report.home_form.analysis.weighted_recommendation.pattern_detected,
        report.home_form.analysis.weighted_recommendation.momentum_state
    );
    println!(
        "Away form: {} ({:?})",
        report.away_form.analysis.weighted_recommendation.pattern_detected,
        report.away_form.analysis.weighted_recommendation.momentum_state
    );
    println!("Context: {}", report.context.pattern_id);
    for issue in &report.context_issues {
        println!("  - {issue}");
    }
    if !report.recorded_outcomes.is_empty() {
        println!("Recorded outcomes: {:?}", report.recorded_outcomes);
    }

    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use match_patterns::config::{self, PipelineConfig};
use match_patterns::fingerprint::MatchScore;
use match_patterns::thresholds::ThresholdStore;
use match_patterns::{ledger, logging, store};

// `settle <simulation_id> <ht h-a> <ft h-a> [--db path]`
fn main() -> Result<()> {
    logging::init();
    let cfg = PipelineConfig::from_env();
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    let positional = config::positional_args(&args, &["--db"]);
    let [sim, ht, ft] = positional.as_slice() else {
        return Err(anyhow!(
            "usage: settle <simulation_id> <ht home-away> <ft home-away> [--db path]"
        ));
    };
    let simulation_id: i64 = sim
        .parse()
        .with_context(|| format!("invalid simulation id {sim:?}"))?;
    let (home_ht, away_ht) = parse_score_pair(ht)?;
    let (home_ft, away_ft) = parse_score_pair(ft)?;
    let score = MatchScore::new(home_ht, away_ht, home_ft, away_ft)?;

    let db_path = config::flag_value(&args, "--db")
        .map(PathBuf::from)
        .or(cfg.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let conn = store::open_db(&db_path)?;

    let mut thresholds = ThresholdStore::new(&conn)?;
    let feedback = thresholds.learn_from_simulation(simulation_id, score)?;
    println!(
        "Settled {} learning outcomes for simulation {simulation_id}",
        feedback.settled.len()
    );
    for update in &feedback.updates {
        println!(
            "{}: {:.3} -> {:.3}{} (recent error {:+.2}, success rate {:.0}% over {})",
            update.pattern_type,
            update.old_penalty,
            update.new_penalty,
            if update.clamped { " [clamped]" } else { "" },
            update.recent_avg_error,
            update.success_rate * 100.0,
            update.total_predictions
        );
    }

    for acc in ledger::accuracy_by_market(&conn)? {
        println!(
            "market {}: {}/{} correct ({:.1}%)",
            acc.market_type,
            acc.correct,
            acc.settled,
            acc.accuracy * 100.0
        );
    }
    let stats = thresholds.learning_stats()?;
    println!(
        "Thresholds: {} learning of {}, {} adjustments",
        stats.learning_patterns, stats.total_patterns, stats.total_adjustments
    );

    Ok(())
}

fn parse_score_pair(raw: &str) -> Result<(i64, i64)> {
    let (home, away) = raw
        .split_once('-')
        .ok_or_else(|| anyhow!("score {raw:?} is not home-away"))?;
    let home = home.trim().parse().with_context(|| format!("home goals in {raw:?}"))?;
    let away = away.trim().parse().with_context(|| format!("away goals in {raw:?}"))?;
    Ok((home, away))
}

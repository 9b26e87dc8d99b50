use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use match_patterns::config::{self, PipelineConfig};
use match_patterns::enhance::{self, BackfillOptions};
use match_patterns::{logging, store};

fn main() -> Result<()> {
    logging::init();
    let cfg = PipelineConfig::from_env();
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    let db_path = config::flag_value(&args, "--db")
        .map(PathBuf::from)
        .or(cfg.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let batch_size = match config::flag_value(&args, "--batch-size") {
        Some(raw) => parse_count(&raw, "--batch-size")?,
        None => cfg.batch_size,
    };
    let limit = config::flag_value(&args, "--limit")
        .map(|raw| parse_count(&raw, "--limit"))
        .transpose()?;

    // The flag is only raised by the optional deadline; committed batches
    // survive either way.
    let stop = Arc::new(AtomicBool::new(false));
    if let Some(raw) = config::flag_value(&args, "--max-seconds") {
        let secs = parse_count(&raw, "--max-seconds")?;
        let flag = Arc::clone(&stop);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs as u64));
            flag.store(true, Ordering::Relaxed);
        });
    }

    let mut conn = store::open_db(&db_path)?;
    let summary = enhance::backfill(
        &mut conn,
        BackfillOptions { batch_size, limit },
        &stop,
    )?;

    println!("Pattern enhancement {}", if summary.interrupted { "interrupted" } else { "complete" });
    println!("DB: {}", db_path.display());
    println!("Pending at start: {}", summary.pending_at_start);
    println!(
        "Enhanced: {} in {} batches",
        summary.enhanced, summary.batches_committed
    );
    let d = summary.discoveries;
    println!(
        "Discoveries: golden={} fibonacci={} high_entropy={} coherent={} mirrors={}",
        d.golden, d.fibonacci, d.high_entropy, d.coherent, d.mirrors
    );
    println!("Still pending: {}", enhance::count_pending(&conn)?);

    Ok(())
}

fn parse_count(raw: &str, flag: &str) -> Result<usize> {
    raw.parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| anyhow!("{flag} expects a positive integer, got {raw:?}"))
}

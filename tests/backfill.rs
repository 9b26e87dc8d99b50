use std::sync::atomic::AtomicBool;

use match_patterns::enhance::{self, BackfillOptions};
use match_patterns::fingerprint::MatchScore;
use match_patterns::goal_stats::{HistoricalMatch, TeamType};
use match_patterns::store;
use rusqlite::Connection;

fn seeded(n: u32) -> Connection {
    let mut conn = store::open_in_memory().unwrap();
    let records: Vec<HistoricalMatch> = (0..n)
        .map(|i| {
            let goals = i64::from(i % 5);
            HistoricalMatch::new(1, TeamType::Home, i + 1, goals / 2, 0, goals, 1).unwrap()
        })
        .collect();
    assert_eq!(store::insert_matches(&mut conn, &records).unwrap(), n as usize);
    conn
}

#[test]
fn processes_everything_in_batches() {
    let mut conn = seeded(10);
    let stop = AtomicBool::new(false);
    let summary = enhance::backfill(
        &mut conn,
        BackfillOptions {
            batch_size: 3,
            limit: None,
        },
        &stop,
    )
    .unwrap();
    assert_eq!(summary.pending_at_start, 10);
    assert_eq!(summary.enhanced, 10);
    assert_eq!(summary.batches_committed, 4);
    assert!(!summary.interrupted);
    assert_eq!(enhance::count_pending(&conn).unwrap(), 0);

    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM pattern_enhancements", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 10);
}

#[test]
fn limit_then_rerun_resumes() {
    let mut conn = seeded(7);
    let stop = AtomicBool::new(false);
    let first = enhance::backfill(
        &mut conn,
        BackfillOptions {
            batch_size: 3,
            limit: Some(4),
        },
        &stop,
    )
    .unwrap();
    assert_eq!(first.enhanced, 4);
    assert_eq!(first.batches_committed, 2);
    assert_eq!(enhance::count_pending(&conn).unwrap(), 3);

    let second = enhance::backfill(&mut conn, BackfillOptions::default(), &stop).unwrap();
    assert_eq!(second.pending_at_start, 3);
    assert_eq!(second.enhanced, 3);
    assert_eq!(enhance::count_pending(&conn).unwrap(), 0);

    let third = enhance::backfill(&mut conn, BackfillOptions::default(), &stop).unwrap();
    assert_eq!(third.enhanced, 0);
    assert_eq!(third.batches_committed, 0);
}

#[test]
fn raised_stop_flag_commits_nothing_new() {
    let mut conn = seeded(5);
    let stop = AtomicBool::new(true);
    let summary = enhance::backfill(&mut conn, BackfillOptions::default(), &stop).unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.enhanced, 0);
    assert_eq!(enhance::count_pending(&conn).unwrap(), 5);
}

#[test]
fn discoveries_are_counted() {
    let mut conn = store::open_in_memory().unwrap();
    let records = vec![
        // 13 / 8 is within 0.08 of phi, total 13 is Fibonacci.
        HistoricalMatch::new(2, TeamType::H2h, 1, 4, 4, 7, 6).unwrap(),
        // Goalless: mirror, Fibonacci total, fully coherent.
        HistoricalMatch::new(2, TeamType::H2h, 2, 0, 0, 0, 0).unwrap(),
    ];
    store::insert_matches(&mut conn, &records).unwrap();
    let stop = AtomicBool::new(false);
    let summary = enhance::backfill(&mut conn, BackfillOptions::default(), &stop).unwrap();
    assert_eq!(summary.discoveries.golden, 1);
    assert_eq!(summary.discoveries.fibonacci, 2);
    assert_eq!(summary.discoveries.mirrors, 1);
    assert_eq!(summary.discoveries.coherent, 1);
}

#[test]
fn changed_score_is_profiled_again() {
    let mut conn = store::open_in_memory().unwrap();
    let slot = |hh, ah, hf, af| HistoricalMatch::new(4, TeamType::Home, 1, hh, ah, hf, af).unwrap();
    store::insert_matches(&mut conn, &[slot(1, 0, 2, 1)]).unwrap();
    let stop = AtomicBool::new(false);
    enhance::backfill(&mut conn, BackfillOptions::default(), &stop).unwrap();
    assert_eq!(enhance::count_pending(&conn).unwrap(), 0);

    // Same score again keeps the profile.
    store::insert_matches(&mut conn, &[slot(1, 0, 2, 1)]).unwrap();
    assert_eq!(enhance::count_pending(&conn).unwrap(), 0);

    store::insert_matches(&mut conn, &[slot(0, 0, 0, 0)]).unwrap();
    assert_eq!(enhance::count_pending(&conn).unwrap(), 1);

    let summary = enhance::backfill(&mut conn, BackfillOptions::default(), &stop).unwrap();
    assert_eq!(summary.enhanced, 1);
    let (is_mirror, nash): (i64, String) = conn
        .query_row(
            "SELECT is_mirror, nash_class FROM pattern_enhancements",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(is_mirror, 1);
    assert_eq!(nash, enhance::profile(&MatchScore::from_counts(0, 0, 0, 0)).nash_class.as_str());
}

//! Match store behaviour: insert-or-increment on conflict, wildcard ignore
//! rows, retention purges, and category promotion.

use chrono::{DateTime, Duration, TimeZone, Utc};

use epg_reconciler::database::Database;
use epg_reconciler::models::{LangText, Program};

const SCHEMA: &str = include_str!("../db/create_schema.sql");

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
}

fn sports_program(title: &str) -> Program {
    let mut program = Program::new("10", at(10), at(11));
    program.titles.push(LangText::new(title));
    program
}

fn epg_program(title: &str) -> Program {
    let mut program = Program::new("I215.58690", at(10), at(11));
    program.titles.push(LangText::new(title));
    program
}

#[tokio::test]
async fn repeated_match_recording_increments_occurrences() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    let sports = sports_program("NHL: Bruins at Rangers");
    let epg = epg_program("Hockey: Bruins at Rangers");

    db.record_program_match(&sports, &epg, "a", "b", 80, 75)
        .await
        .unwrap();
    db.record_program_match(&sports, &epg, "a", "b", 80, 75)
        .await
        .unwrap();

    let record = db.program_match(&sports, &epg).await.unwrap().unwrap();
    assert_eq!(record.number_of_occurrences, 2);
    assert_eq!(record.match_type, "safe");
    assert_eq!(record.is_valid, None);
    assert!(!record.reviewed);
}

#[tokio::test]
async fn risky_scores_store_a_risky_match_type() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    let sports = sports_program("Game");
    let epg = epg_program("Match");

    db.record_program_match(&sports, &epg, "game", "match", 55, 60)
        .await
        .unwrap();

    let record = db.program_match(&sports, &epg).await.unwrap().unwrap();
    assert_eq!(record.match_type, "risky");
}

#[tokio::test]
async fn repeated_failures_increment_occurrences() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    let sports = sports_program("Obscure Event");

    db.record_failed_match(&sports).await.unwrap();
    db.record_failed_match(&sports).await.unwrap();

    let occurrences: i64 = sqlx::query_scalar(
        "SELECT number_of_occurrences FROM failed_program_match
         WHERE smooth_streams_program_title = 'Obscure Event'",
    )
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(occurrences, 2);
}

#[tokio::test]
async fn wildcard_ignore_rows_match_any_channel_and_times() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    sqlx::query(
        "INSERT INTO ignored_smooth_streams_program_match
             (smooth_streams_program_title, smooth_streams_program_sub_title,
              smooth_streams_program_channel, smooth_streams_program_start,
              smooth_streams_program_stop)
         VALUES ('Paid Programming', '', '', '', '')",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let ignored = sports_program("Paid Programming");
    assert!(db.is_sports_program_ignored(&ignored).await.unwrap());

    let not_ignored = sports_program("Championship Final");
    assert!(!db.is_sports_program_ignored(&not_ignored).await.unwrap());
}

#[tokio::test]
async fn title_only_epg_ignore_row_is_a_wildcard() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    sqlx::query(
        "INSERT INTO ignored_epg_program_match
             (epg_program_title, epg_program_sub_title, epg_program_channel,
              epg_program_start, epg_program_stop)
         VALUES ('Infomercial', '', '', '', '')",
    )
    .execute(db.pool())
    .await
    .unwrap();

    assert!(db
        .is_epg_program_ignored(&epg_program("Infomercial"))
        .await
        .unwrap());
    assert!(!db
        .is_epg_program_ignored(&epg_program("Documentary"))
        .await
        .unwrap());
}

#[tokio::test]
async fn purge_removes_rows_not_touched_this_run() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    let sports = sports_program("Stale Event");
    db.record_failed_match(&sports).await.unwrap();

    // A run starting after the failure was recorded sweeps it away.
    db.purge_expired(Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM failed_program_match")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn purge_keeps_rows_touched_during_the_run() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    let sports = sports_program("Fresh Event");
    let run_start = Utc::now() - Duration::minutes(5);
    db.record_failed_match(&sports).await.unwrap();

    db.purge_expired(run_start).await.unwrap();
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM failed_program_match")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn purge_keeps_recent_forced_matches_and_sentinel_ignores() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    sqlx::query(
        "INSERT INTO forced_program_match
             (smooth_streams_program_title, smooth_streams_program_sub_title,
              smooth_streams_program_channel, smooth_streams_program_start,
              smooth_streams_program_stop, epg_program_title, epg_program_sub_title,
              epg_program_channel, epg_program_start, epg_program_stop)
         VALUES ('Old', '', '10', '2025-01-01 10:00:00', '2025-01-01 11:00:00',
                 'T', '', 'I215.58690', '2025-01-01 10:00:00', '2025-01-01 11:00:00'),
                ('New', '', '10', '2025-06-01 10:00:00', '2025-06-01 11:00:00',
                 'T', '', 'I215.58690', '2025-06-01 10:00:00', '2025-06-01 11:00:00')",
    )
    .execute(db.pool())
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO ignored_smooth_streams_program_match
             (smooth_streams_program_title, smooth_streams_program_sub_title,
              smooth_streams_program_channel, smooth_streams_program_start,
              smooth_streams_program_stop)
         VALUES ('Sentinel', '', '', '', '')",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let run_start = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
    db.purge_expired(run_start).await.unwrap();

    let forced_titles: Vec<String> =
        sqlx::query_scalar("SELECT smooth_streams_program_title FROM forced_program_match")
            .fetch_all(db.pool())
            .await
            .unwrap();
    assert_eq!(forced_titles, vec!["New"]);

    let sentinels: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM ignored_smooth_streams_program_match")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(sentinels, 1);
}

#[tokio::test]
async fn category_map_insert_ignores_duplicates() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    db.record_category_map("NFL", "Football").await.unwrap();
    db.record_category_map("NFL", "Football").await.unwrap();

    let records = db.category_map_for("NFL").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].epg_category, "Football");
    assert_eq!(records[0].is_valid, None);
    assert!(!records[0].reviewed);
}

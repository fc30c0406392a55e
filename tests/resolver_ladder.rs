//! Resolver ladder coverage: forced rows, pattern rows, and the four broad
//! fuzzy phases with relaxing constraints.

use chrono::{DateTime, TimeZone, Utc};

use epg_reconciler::database::Database;
use epg_reconciler::index::ProgramIndex;
use epg_reconciler::matcher::resolver::{find_best_matching_program, Resolution};
use epg_reconciler::models::{LangText, Program};
use epg_reconciler::orchestrator::context::EngineContext;

const SCHEMA: &str = include_str!("../db/create_schema.sql");

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
}

fn program(channel: &str, title: &str, start: DateTime<Utc>, stop: DateTime<Utc>) -> Program {
    let mut program = Program::new(channel, start, stop);
    program.titles.push(LangText::new(title));
    program
}

async fn context(db: Database) -> EngineContext {
    let mut ctx = EngineContext::new(db, at(9, 0), 7).await.unwrap();
    ctx.latest_epg_stop = Some(Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap());
    ctx
}

fn index_of(programs: &[Program]) -> ProgramIndex {
    let mut index = ProgramIndex::new();
    for program in programs {
        index.insert(program);
    }
    index
}

#[tokio::test]
async fn forced_match_wins_and_adopts_sports_times() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    sqlx::query(
        "INSERT INTO forced_program_match
             (smooth_streams_program_title, smooth_streams_program_sub_title,
              smooth_streams_program_channel, smooth_streams_program_start,
              smooth_streams_program_stop, epg_program_title, epg_program_sub_title,
              epg_program_channel, epg_program_start, epg_program_stop)
         VALUES ('Big Fight', '', '10', '2025-06-01 10:00:00', '2025-06-01 11:30:00',
                 'Boxing Night', '', 'I215.58690', '2025-06-01 10:00:00', '2025-06-01 11:00:00')",
    )
    .execute(db.pool())
    .await
    .unwrap();
    let mut ctx = context(db).await;

    let base = program("I215.58690", "Boxing Night", at(10, 0), at(11, 0));
    let index = index_of(&[base]);
    let sports = program("10", "Big Fight", at(10, 0), at(11, 30));

    let resolution = find_best_matching_program(&mut ctx, &index, &sports)
        .await
        .unwrap();
    let Resolution::Matched(matched) = resolution else {
        panic!("forced row must resolve");
    };
    assert_eq!(matched.title(), "Boxing Night");
    // Times differ from the stored EPG program, so the clone carries the
    // sports window.
    assert_eq!(matched.start, at(10, 0));
    assert_eq!(matched.stop, at(11, 30));
}

#[tokio::test]
async fn pattern_match_requires_only_time_alignment() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    sqlx::query(
        "INSERT INTO pattern_program_match (smooth_streams_program_title, epg_program_pattern)
         VALUES ('EPL Matchday', 'Premier League')",
    )
    .execute(db.pool())
    .await
    .unwrap();
    let mut ctx = context(db).await;

    let base = program(
        "I215.58690",
        "Premier League Soccer",
        at(10, 10),
        at(12, 10),
    );
    let index = index_of(&[base]);
    let sports = program("10", "EPL Matchday", at(10, 0), at(12, 0));

    let resolution = find_best_matching_program(&mut ctx, &index, &sports)
        .await
        .unwrap();
    let Resolution::Matched(matched) = resolution else {
        panic!("pattern row must resolve");
    };
    assert_eq!(matched.title(), "Premier League Soccer");
    assert_eq!(matched.start, at(10, 0));
    assert_eq!(matched.stop, at(12, 0));
}

#[tokio::test]
async fn aligned_same_channel_match_keeps_epg_times() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    let mut ctx = context(db).await;

    let base = program("I215.58690", "Patriots at Jets", at(10, 5), at(12, 55));
    let index = index_of(&[base]);
    let sports = program("10", "Patriots at Jets", at(10, 0), at(13, 0));

    let resolution = find_best_matching_program(&mut ctx, &index, &sports)
        .await
        .unwrap();
    let Resolution::Matched(matched) = resolution else {
        panic!("aligned same-channel candidate must resolve");
    };
    assert_eq!(matched.channel, "I215.58690");
    assert_eq!(matched.start, at(10, 5));
    assert_eq!(matched.stop, at(12, 55));
}

#[tokio::test]
async fn equal_duration_match_on_another_channel_adopts_sports_times() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    let mut ctx = context(db).await;

    // Same title, same two-hour duration, but hours away on a different
    // service channel: only the fourth phase accepts it, cloning the
    // program onto the sports window.
    let base = program("I206.32645", "Patriots at Jets", at(16, 0), at(18, 0));
    let index = index_of(&[base]);
    let sports = program("10", "Patriots at Jets", at(10, 0), at(12, 0));

    let resolution = find_best_matching_program(&mut ctx, &index, &sports)
        .await
        .unwrap();
    let Resolution::Matched(matched) = resolution else {
        panic!("equal-duration candidate must resolve");
    };
    assert_eq!(matched.channel, "I206.32645");
    assert_eq!(matched.start, at(10, 0));
    assert_eq!(matched.stop, at(12, 0));
}

#[tokio::test]
async fn ignored_epg_program_cannot_resolve() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    sqlx::query(
        "INSERT INTO ignored_epg_program_match
             (epg_program_title, epg_program_sub_title, epg_program_channel,
              epg_program_start, epg_program_stop)
         VALUES ('Patriots at Jets', '', '', '', '')",
    )
    .execute(db.pool())
    .await
    .unwrap();
    let mut ctx = context(db).await;

    let base = program("I215.58690", "Patriots at Jets", at(10, 0), at(12, 0));
    let index = index_of(&[base]);
    let sports = program("10", "Patriots at Jets", at(10, 0), at(12, 0));

    let resolution = find_best_matching_program(&mut ctx, &index, &sports)
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::Unmatched);
}

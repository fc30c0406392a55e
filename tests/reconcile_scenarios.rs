//! End-to-end merge scenarios over in-memory stores: exact replacement,
//! partial overlaps, splits, category-driven fuzzy resolution, ignore
//! patterns, and the force-mode guarantees.

use chrono::{DateTime, TimeZone, Utc};

use epg_reconciler::database::Database;
use epg_reconciler::index::ProgramIndex;
use epg_reconciler::merger::{merge_sports_epg, MergeMode};
use epg_reconciler::models::{Channel, ChannelSet, LangText, Program};
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

/// Base EPG with one service channel holding the given upstream programs,
/// plus the matching sports timeline channel.
fn timelines(
    service_channel: &str,
    base_programs: Vec<Program>,
    sports_programs: Vec<Program>,
) -> (ChannelSet, ChannelSet, ProgramIndex) {
    let mut index = ProgramIndex::new();
    let mut base_channel = Channel::new(service_channel);
    base_channel
        .display_names
        .push(LangText::new(format!("Channel {service_channel}")));
    for program in base_programs {
        index.insert(&program);
        base_channel.insert_program(program);
    }
    let mut epg = ChannelSet::new();
    epg.insert(base_channel);

    let mut sports_channel = Channel::new(service_channel);
    sports_channel
        .display_names
        .push(LangText::new(format!("Channel {service_channel}")));
    for program in sports_programs {
        sports_channel.insert_program(program);
    }
    let mut sports_epg = ChannelSet::new();
    sports_epg.insert(sports_channel);

    (epg, sports_epg, index)
}

async fn context() -> EngineContext {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    context_with_db(db).await
}

async fn context_with_db(db: Database) -> EngineContext {
    let mut ctx = EngineContext::new(db, at(9, 0), 7).await.unwrap();
    ctx.latest_epg_stop = Some(Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap());
    ctx
}

fn assert_timeline_invariants(programs: &[Program]) {
    for window in programs.windows(2) {
        assert!(
            window[0].start <= window[1].start,
            "timeline must be start-ordered"
        );
        assert!(
            window[0].stop <= window[1].start,
            "timeline must be non-overlapping: {} - {} overlaps {} - {}",
            window[0].start,
            window[0].stop,
            window[1].start,
            window[1].stop
        );
    }
}

#[tokio::test]
async fn exact_replacement_is_not_duplicated_in_relax_mode() {
    let mut ctx = context().await;
    let base = program("I215.58690", "News", at(10, 0), at(11, 0));
    let sports = program("10", "News", at(10, 0), at(11, 0));
    let (mut epg, sports_epg, index) = timelines("10", vec![base], vec![sports]);

    merge_sports_epg(&mut ctx, &index, &mut epg, &sports_epg, MergeMode::Relax)
        .await
        .unwrap();

    let programs = &epg.get("10").unwrap().programs;
    assert_eq!(programs.len(), 1);
    assert_eq!(programs[0].channel, "I215.58690");
    assert_eq!(programs[0].start, at(10, 0));
    assert_eq!(programs[0].stop, at(11, 0));
    assert_timeline_invariants(programs);
}

#[tokio::test]
async fn start_aligned_partial_overlap_trims_the_base_program() {
    let mut ctx = context().await;
    let base = program("I215.58690", "Movie", at(10, 0), at(12, 0));
    let sports = program("10", "Football", at(10, 0), at(10, 30));
    let (mut epg, sports_epg, index) = timelines("10", vec![base], vec![sports]);

    merge_sports_epg(&mut ctx, &index, &mut epg, &sports_epg, MergeMode::Relax)
        .await
        .unwrap();

    let programs = &epg.get("10").unwrap().programs;
    assert_eq!(programs.len(), 2);
    assert_eq!(programs[0].title(), "Football");
    assert_eq!(programs[0].stop, at(10, 30));
    assert_eq!(programs[1].title(), "Movie");
    assert_eq!(programs[1].start, at(10, 30));
    assert_eq!(programs[1].stop, at(12, 0));
    assert_timeline_invariants(programs);
}

#[tokio::test]
async fn sports_program_inside_a_base_program_splits_it() {
    let mut ctx = context().await;
    let base = program("I215.58690", "Movie", at(10, 0), at(12, 0));
    let sports = program("10", "Football", at(10, 30), at(11, 0));
    let (mut epg, sports_epg, index) = timelines("10", vec![base], vec![sports]);

    merge_sports_epg(&mut ctx, &index, &mut epg, &sports_epg, MergeMode::Relax)
        .await
        .unwrap();

    let programs = &epg.get("10").unwrap().programs;
    assert_eq!(programs.len(), 3);
    assert_eq!(programs[0].title(), "Movie");
    assert_eq!(programs[0].stop, at(10, 30));
    assert_eq!(programs[1].title(), "Football");
    assert_eq!(programs[2].title(), "Movie");
    assert_eq!(programs[2].start, at(11, 0));
    assert_eq!(programs[2].stop, at(12, 0));
    assert_timeline_invariants(programs);
}

#[tokio::test]
async fn category_mapped_fuzzy_match_keeps_the_base_program() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    sqlx::query(
        "INSERT INTO category_map (smooth_streams_category, epg_category, is_valid, reviewed)
         VALUES ('NFL', 'Football', 1, 0)",
    )
    .execute(db.pool())
    .await
    .unwrap();
    let mut ctx = context_with_db(db).await;

    // Channel 5 is upstream I219.82547.
    let base = program(
        "I219.82547",
        "Football: Patriots at Jets",
        at(10, 0),
        at(13, 0),
    );
    let sports = program("5", "NFL: Patriots at Jets", at(10, 2), at(12, 58));
    let (mut epg, sports_epg, index) = timelines("5", vec![base], vec![sports]);

    merge_sports_epg(&mut ctx, &index, &mut epg, &sports_epg, MergeMode::Relax)
        .await
        .unwrap();

    let programs = &epg.get("5").unwrap().programs;
    assert_eq!(programs.len(), 1);
    assert_eq!(programs[0].title(), "Football: Patriots at Jets");
    assert_eq!(programs[0].start, at(10, 0));
    assert_eq!(programs[0].stop, at(13, 0));
    assert_timeline_invariants(programs);

    // The safe match was memoised for operator review.
    let record = ctx.db.program_match(&sports_epg.get("5").unwrap().programs[0], &programs[0])
        .await
        .unwrap();
    assert!(record.is_some());
    assert_eq!(record.unwrap().match_type, "safe");
}

#[tokio::test]
async fn ignore_pattern_keeps_sports_program_out_of_relax_merge() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    sqlx::query(
        "INSERT INTO ignored_smooth_streams_program_pattern (smooth_streams_program_pattern)
         VALUES ('^Special:')",
    )
    .execute(db.pool())
    .await
    .unwrap();
    let mut ctx = context_with_db(db).await;

    let base = program("I215.58690", "Movie", at(9, 30), at(12, 0));
    let sports = program("10", "Special: Gala", at(10, 0), at(11, 0));
    let (mut epg, sports_epg, index) = timelines("10", vec![base], vec![sports]);

    merge_sports_epg(&mut ctx, &index, &mut epg, &sports_epg, MergeMode::Relax)
        .await
        .unwrap();

    let programs = &epg.get("10").unwrap().programs;
    assert_eq!(programs.len(), 1);
    assert_eq!(programs[0].title(), "Movie");
    assert_eq!(programs[0].stop, at(12, 0));
}

#[tokio::test]
async fn force_mode_inserts_every_sports_program_with_unmodified_times() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    sqlx::query(
        "INSERT INTO ignored_smooth_streams_program_pattern (smooth_streams_program_pattern)
         VALUES ('^Special:')",
    )
    .execute(db.pool())
    .await
    .unwrap();
    let mut ctx = context_with_db(db).await;

    let base = vec![
        program("I215.58690", "Morning", at(10, 0), at(10, 45)),
        program("I215.58690", "Midday", at(10, 45), at(11, 30)),
        program("I215.58690", "Afternoon", at(11, 30), at(12, 30)),
    ];
    let sports = vec![
        program("10", "Special: Gala", at(10, 15), at(12, 0)),
        program("10", "Late Game", at(12, 30), at(13, 30)),
    ];
    let (mut epg, sports_epg, index) = timelines("10", base, sports);

    merge_sports_epg(&mut ctx, &index, &mut epg, &sports_epg, MergeMode::Force)
        .await
        .unwrap();

    let programs = &epg.get("10").unwrap().programs;
    let titles: Vec<&str> = programs.iter().map(|p| p.title()).collect();
    assert_eq!(
        titles,
        vec!["Morning", "Special: Gala", "Afternoon", "Late Game"]
    );
    // Sports times survive untouched; neighbours were trimmed around them.
    assert_eq!(programs[0].stop, at(10, 15));
    assert_eq!(programs[1].start, at(10, 15));
    assert_eq!(programs[1].stop, at(12, 0));
    assert_eq!(programs[2].start, at(12, 0));
    assert_eq!(programs[3].start, at(12, 30));
    assert_timeline_invariants(programs);
}

#[tokio::test]
async fn unmatched_sports_program_is_recorded_as_failed() {
    let mut ctx = context().await;
    let base = program("I215.58690", "Movie", at(10, 0), at(12, 0));
    let sports = program("10", "Obscure Event", at(10, 0), at(10, 30));
    let (mut epg, sports_epg, index) = timelines("10", vec![base], vec![sports]);

    merge_sports_epg(&mut ctx, &index, &mut epg, &sports_epg, MergeMode::Relax)
        .await
        .unwrap();

    let failures: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM failed_program_match WHERE smooth_streams_program_title = 'Obscure Event'",
    )
    .fetch_one(ctx.db.pool())
    .await
    .unwrap();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn pre_validated_match_skips_overlap_processing() {
    let db = Database::open_in_memory(SCHEMA).await.unwrap();
    sqlx::query(
        "INSERT INTO program_match (smooth_streams_program_title, smooth_streams_program_sub_title,
             smooth_streams_program_channel, smooth_streams_program_start, smooth_streams_program_stop,
             epg_program_title, epg_program_sub_title, epg_program_channel, epg_program_start,
             epg_program_stop, smooth_streams_program_string_compared, epg_program_string_compared,
             token_sort_ratio_score, jaro_winkler_ratio_score, match_type, date_time_of_last_match,
             number_of_occurrences, is_valid, reviewed)
         VALUES ('The Big Game', '', '10', '2025-06-01 10:00:00', '2025-06-01 11:00:00',
                 'Completely Different', '', '10', '2025-06-01 10:00:00', '2025-06-01 11:00:00',
                 'The Big Game', 'Completely Different', 40, 40, 'risky', '2025-06-01 08:00:00', 3, 1, 1)",
    )
    .execute(db.pool())
    .await
    .unwrap();
    let mut ctx = context_with_db(db).await;

    let base = program("I215.58690", "Completely Different", at(10, 0), at(11, 0));
    let sports = program("10", "The Big Game", at(10, 0), at(11, 0));
    let (mut epg, sports_epg, index) = timelines("10", vec![base], vec![sports]);

    merge_sports_epg(&mut ctx, &index, &mut epg, &sports_epg, MergeMode::Relax)
        .await
        .unwrap();

    // The operator-confirmed row vouches for the pair: the base program
    // stands, and the memoised row's counter moved.
    let programs = &epg.get("10").unwrap().programs;
    assert_eq!(programs.len(), 1);
    assert_eq!(programs[0].title(), "Completely Different");

    let occurrences: i64 = sqlx::query_scalar(
        "SELECT number_of_occurrences FROM program_match WHERE smooth_streams_program_title = 'The Big Game'",
    )
    .fetch_one(ctx.db.pool())
    .await
    .unwrap();
    assert_eq!(occurrences, 4);
}

//! Drives a full reconciliation run: parse, validate, merge twice, emit
//! eight files, promote category hypotheses, purge expired store rows.

pub mod context;

use std::path::Path;

use anyhow::{Context as _, Result};
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::constants::CATEGORY_MAP_PROMOTION_THRESHOLD;
use crate::database::Database;
use crate::emitter::generate_epg_files;
use crate::ingestor::{fetch_sports_feed, GuideState};
use crate::merger::{merge_sports_epg, MergeMode};
use crate::utils::backup_output_files;
use crate::utils::datetime::{is_observing_dst, truncate_subseconds};
use context::EngineContext;

pub struct RunReport {
    pub errors: Vec<String>,
}

/// Execute one reconciliation run. Fatal errors (store, channel map) abort;
/// everything else degrades to the best EPG achievable with partial data
/// and lands in the report.
pub async fn run(
    config: &Config,
    db: Database,
    output_directory: &Path,
    backup_previous_output: bool,
) -> Result<RunReport> {
    let run_start = truncate_subseconds(Utc::now());
    let max_horizon = config
        .output
        .number_of_days
        .iter()
        .copied()
        .max()
        .expect("validated: at least one horizon");

    let mut ctx = EngineContext::new(db, run_start, max_horizon).await?;
    let mut state = GuideState::new();

    state
        .parse_channel_map(&config.paths.channel_map)
        .context("failed to parse the service channel map")?;

    ingest_lineups(config, &mut ctx, &mut state);
    state.validate_source_channels(&mut ctx.errors);
    ctx.latest_epg_stop = state.latest_epg_stop;

    ingest_sports_feed(config, &mut ctx, &mut state).await;
    state.cleanup_sports_epg();

    std::fs::create_dir_all(output_directory)?;
    if backup_previous_output {
        if let Err(error) = backup_output_files(output_directory) {
            ctx.record_error(format!("Failed to back up previous output: {error}"));
        }
    }

    // The force pass merges against the pristine base, not the timelines
    // the relax pass already rewrote.
    let pristine_epg = state.epg.clone();

    info!("Running relax merge");
    let mut relaxed_epg = pristine_epg.clone();
    match merge_sports_epg(
        &mut ctx,
        &state.index,
        &mut relaxed_epg,
        &state.sports_epg,
        MergeMode::Relax,
    )
    .await
    {
        Ok(()) => {
            generate_epg_files(
                &relaxed_epg,
                run_start,
                output_directory,
                &config.output.number_of_days,
                false,
            )?;
        }
        Err(error) => ctx.record_error(format!("Relax merge failed: {error}")),
    }

    info!("Running force merge");
    let mut forced_epg = pristine_epg;
    match merge_sports_epg(
        &mut ctx,
        &state.index,
        &mut forced_epg,
        &state.sports_epg,
        MergeMode::Force,
    )
    .await
    {
        Ok(()) => {
            generate_epg_files(
                &forced_epg,
                run_start,
                output_directory,
                &config.output.number_of_days,
                true,
            )?;
        }
        Err(error) => ctx.record_error(format!("Force merge failed: {error}")),
    }

    promote_category_hypotheses(&mut ctx).await?;
    ctx.db.purge_expired(run_start).await?;

    if !ctx.errors.is_empty() {
        warn!("Run finished with {} recorded errors", ctx.errors.len());
    } else {
        info!("Run finished cleanly");
    }

    Ok(RunReport { errors: ctx.errors })
}

/// Parse every `<lineup>.xml` in the input directory, honouring an
/// optional `<lineup>.chl` expected-channel list beside each.
fn ingest_lineups(config: &Config, ctx: &mut EngineContext, state: &mut GuideState) {
    let input_directory = &config.paths.input_xmltv_directory;
    let mut lineup_files: Vec<_> = match std::fs::read_dir(input_directory) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "xml"))
            .collect(),
        Err(error) => {
            ctx.record_error(format!(
                "Cannot read input XMLTV directory {}: {error}",
                input_directory.display()
            ));
            return;
        }
    };
    lineup_files.sort();

    if lineup_files.is_empty() {
        ctx.record_error(format!(
            "No lineup XMLTV files found in {}",
            input_directory.display()
        ));
    }

    for lineup_file in lineup_files {
        let expected_channels_file = lineup_file.with_extension("chl");
        if expected_channels_file.exists() {
            if let Err(error) = state.read_expected_channels(&expected_channels_file) {
                ctx.record_error(format!(
                    "Cannot read expected channel list {}: {error}",
                    expected_channels_file.display()
                ));
            }
        } else {
            state.clear_expected_channels();
        }

        if let Err(error) = state.parse_lineup(&lineup_file) {
            ctx.record_error(format!(
                "Failed to parse lineup {}: {error}",
                lineup_file.display()
            ));
        }

        state.validate_expected_channels(&mut ctx.errors);
    }
}

/// Fetch and parse the sports feed; a download failure degrades to a run
/// without sports overlays.
async fn ingest_sports_feed(config: &Config, ctx: &mut EngineContext, state: &mut GuideState) {
    let content = match fetch_sports_feed(&config.feed.base_url, &config.feed.file_name).await {
        Ok(content) => content,
        Err(error) => {
            ctx.record_error(format!("Sports feed download failed: {error}"));
            return;
        }
    };

    // The feed stamps everything one hour late while the local zone is on
    // daylight saving time.
    let dst_correction = if is_observing_dst(config.local_timezone(), ctx.run_start) {
        info!("Local timezone is observing DST; shifting sports feed back one hour");
        Duration::hours(1)
    } else {
        Duration::zero()
    };

    if let Err(error) = state.parse_sports_feed(&content, dst_correction) {
        ctx.record_error(format!("Failed to parse sports feed: {error}"));
    }
}

/// Insert every (sports category, epg category) pair witnessed by enough
/// safe matches during this run.
async fn promote_category_hypotheses(ctx: &mut EngineContext) -> Result<()> {
    let hypotheses = std::mem::take(&mut ctx.category_hypotheses);
    for (sports_category, epg_categories) in hypotheses {
        for (epg_category, count) in epg_categories {
            if count > CATEGORY_MAP_PROMOTION_THRESHOLD {
                info!(
                    "Promoting category pairing '{}' -> '{}' ({} witnesses)",
                    sports_category, epg_category, count
                );
                ctx.db
                    .record_category_map(&sports_category, &epg_category)
                    .await?;
            }
        }
    }
    Ok(())
}

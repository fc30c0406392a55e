//! The match resolver: given a sports program, find the base-EPG program it
//! stands for. The ladder runs memoised → forced → pattern → broad fuzzy
//! (four phases with relaxing constraints); the first hit wins, and a full
//! miss is recorded in failed_program_match.

use anyhow::Result;
use regex::Regex;
use tracing::{debug, warn};

use crate::constants::MAXIMUM_TIME_DELTA_IN_SECONDS;
use crate::index::ProgramIndex;
use crate::matcher::{create_match_tuples, create_program_query_strings, evaluate_match_tuples};
use crate::models::{service_channel_of, Program};
use crate::orchestrator::context::EngineContext;
use crate::utils::datetime::{absolute_delta_seconds, parse_storage};

/// Outcome of a resolver invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every ladder stage missed; the sports program stays as-is.
    Unmatched,
    /// The base-EPG program standing in for the sports event, possibly
    /// cloned with the event's own start/stop.
    Matched(Program),
}

/// The sports program already ended relative to the run start.
pub fn is_program_in_the_past(ctx: &EngineContext, sports: &Program) -> bool {
    sports.start < ctx.run_start && sports.stop <= ctx.run_start
}

/// The sports program starts past the common horizon cutoff, or runs past
/// the end of the parsed base EPGs.
pub fn is_program_past_cutoff(ctx: &EngineContext, sports: &Program) -> bool {
    if sports.start >= ctx.horizon_cutoff {
        return true;
    }
    match ctx.latest_epg_stop {
        Some(latest) => sports.start >= latest || sports.stop >= latest,
        None => true,
    }
}

/// Pre-filters shared by the merger and the resolver: past, beyond the
/// horizon, blacklisted, or matching an ignore pattern.
pub async fn should_leave_alone(ctx: &EngineContext, sports: &Program) -> Result<bool> {
    if is_program_in_the_past(ctx, sports) || is_program_past_cutoff(ctx, sports) {
        return Ok(true);
    }
    if ctx.db.is_sports_program_ignored(sports).await? {
        debug!("Sports program '{}' is blacklisted", sports.title());
        return Ok(true);
    }
    if ctx.matches_ignore_pattern(sports.title()) {
        debug!("Sports program '{}' matches an ignore pattern", sports.title());
        return Ok(true);
    }
    Ok(false)
}

/// Operator-confirmed memoised match: an `is_valid = 1` row short-circuits
/// the ladder and refreshes the row's timestamp.
pub async fn is_pre_validated_match(
    ctx: &EngineContext,
    sports: &Program,
    epg: &Program,
) -> Result<bool> {
    if let Some(record) = ctx.db.program_match(sports, epg).await? {
        if record.is_valid == Some(1) {
            ctx.db.touch_program_match(sports, epg).await?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether a (sports, epg) pair matches under the requested constraints.
///
/// Alignment requires both endpoints within tolerance and comparable
/// durations; duration equivalency requires exactly equal lengths. With
/// title scoring enabled a safe match is tried first, falling back to a
/// risky match only when alignment was also checked.
pub async fn do_programs_match(
    ctx: &mut EngineContext,
    sports: &Program,
    epg: &Program,
    check_alignment: bool,
    check_duration: bool,
    score_titles: bool,
) -> Result<bool> {
    if ctx.db.is_epg_program_ignored(epg).await? {
        return Ok(false);
    }

    if check_alignment {
        let aligned = absolute_delta_seconds(sports.start, epg.start)
            <= MAXIMUM_TIME_DELTA_IN_SECONDS
            && absolute_delta_seconds(sports.stop, epg.stop) <= MAXIMUM_TIME_DELTA_IN_SECONDS
            && (sports.duration_seconds() - epg.duration_seconds()).abs()
                <= 2 * MAXIMUM_TIME_DELTA_IN_SECONDS;
        if !aligned {
            return Ok(false);
        }
        if !score_titles {
            return Ok(true);
        }
    }

    if check_duration {
        if sports.duration_seconds() != epg.duration_seconds() {
            return Ok(false);
        }
        if !score_titles {
            return Ok(true);
        }
    }

    let tuples = create_match_tuples(ctx, sports, epg).await?;
    if evaluate_match_tuples(ctx, sports, epg, &tuples, true).await? {
        return Ok(true);
    }
    if check_alignment && evaluate_match_tuples(ctx, sports, epg, &tuples, false).await? {
        return Ok(true);
    }

    Ok(false)
}

async fn find_forced_match(
    ctx: &EngineContext,
    index: &ProgramIndex,
    sports: &Program,
) -> Result<Option<Program>> {
    let Some(record) = ctx.db.forced_match_for(sports).await? else {
        return Ok(None);
    };

    let sub_title = (!record.epg_program_sub_title.is_empty())
        .then_some(record.epg_program_sub_title.as_str());
    let (Ok(start), Ok(stop)) = (
        parse_storage(&record.epg_program_start),
        parse_storage(&record.epg_program_stop),
    ) else {
        warn!(
            "Forced match for '{}' carries unparseable times; skipping",
            sports.title()
        );
        return Ok(None);
    };

    let key = if index.contains_key(&record.epg_program_title) {
        Some(record.epg_program_title.as_str())
    } else {
        sub_title.filter(|sub_title| index.contains_key(sub_title))
    };
    let Some(key) = key else {
        return Ok(None);
    };

    for candidate in index.programs_for(key) {
        if candidate.title() == record.epg_program_title
            && candidate.sub_title() == sub_title
            && candidate.channel == record.epg_program_channel
            && candidate.start == start
            && candidate.stop == stop
        {
            debug!("Forced program match for '{}'", sports.title());
            let matched = if sports.start == candidate.start && sports.stop == candidate.stop {
                candidate.clone()
            } else {
                candidate.with_times(sports.start, sports.stop)
            };
            return Ok(Some(matched));
        }
    }

    Ok(None)
}

async fn find_pattern_match(
    ctx: &mut EngineContext,
    index: &ProgramIndex,
    sports: &Program,
) -> Result<Option<Program>> {
    let Some(pattern) = ctx.db.pattern_for(sports.title()).await? else {
        return Ok(None);
    };
    let regex = match Regex::new(&pattern) {
        Ok(regex) => regex,
        Err(error) => {
            warn!(
                "Invalid pattern_program_match pattern '{}': {}",
                pattern, error
            );
            return Ok(None);
        }
    };

    let matching_keys: Vec<String> = index
        .keys()
        .filter(|key| regex.is_match(key))
        .map(str::to_string)
        .collect();

    for key in matching_keys {
        for candidate in index.programs_for(&key).to_vec() {
            // Time-alignment only; the pattern already vouches for the name.
            if do_programs_match(ctx, sports, &candidate, true, false, false).await? {
                debug!("Pattern program match for '{}'", sports.title());
                let matched = if sports.start == candidate.start && sports.stop == candidate.stop {
                    candidate
                } else {
                    candidate.with_times(sports.start, sports.stop)
                };
                return Ok(Some(matched));
            }
        }
    }

    Ok(None)
}

async fn determine_matching_program(
    ctx: &mut EngineContext,
    index: &ProgramIndex,
    sports: &Program,
    potential_matches: &[(String, i32)],
    check_same_channel: bool,
    check_alignment: bool,
    check_duration: bool,
) -> Result<Option<Program>> {
    for (key, _) in potential_matches {
        for candidate in index.programs_for(key).to_vec() {
            let service_channel = service_channel_of(&candidate.channel);
            if check_same_channel {
                if service_channel != Some(sports.channel.as_str()) {
                    continue;
                }
            } else if service_channel == Some(sports.channel.as_str()) {
                continue;
            }

            if do_programs_match(ctx, sports, &candidate, check_alignment, check_duration, true)
                .await?
            {
                let matched = if !check_alignment && check_duration {
                    candidate.with_times(sports.start, sports.stop)
                } else {
                    candidate
                };
                return Ok(Some(matched));
            }
        }
    }

    Ok(None)
}

/// Run the full ladder for a sports program.
pub async fn find_best_matching_program(
    ctx: &mut EngineContext,
    index: &ProgramIndex,
    sports: &Program,
) -> Result<Resolution> {
    let mut matched = find_forced_match(ctx, index, sports).await?;

    if matched.is_none() {
        matched = find_pattern_match(ctx, index, sports).await?;
    }

    if matched.is_none() {
        let queries = create_program_query_strings(ctx, sports).await?;
        let potential_matches = crate::matcher::fuzzy::broad_search(index, &queries);

        // Four phases with relaxing constraints: same channel aligned,
        // any channel aligned, same channel equal duration, any channel
        // equal duration.
        let phases = [(true, true, false), (false, true, false), (true, false, true), (false, false, true)];
        for (check_same_channel, check_alignment, check_duration) in phases {
            matched = determine_matching_program(
                ctx,
                index,
                sports,
                &potential_matches,
                check_same_channel,
                check_alignment,
                check_duration,
            )
            .await?;
            if matched.is_some() {
                break;
            }
        }
    }

    match matched {
        Some(matched) => {
            debug!(
                "Sports program '{}' ({} - {}) resolved to '{}' ({} - {})",
                sports.title(),
                sports.start,
                sports.stop,
                matched.title(),
                matched.start,
                matched.stop
            );
            Ok(Resolution::Matched(matched))
        }
        None => {
            ctx.db.record_failed_match(sports).await?;
            debug!(
                "Failed to match sports program '{}' ({} - {})",
                sports.title(),
                sports.start,
                sports.stop
            );
            Ok(Resolution::Unmatched)
        }
    }
}

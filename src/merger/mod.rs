//! Interval-algebra merge of the sports timeline into each service
//! channel's base timeline.
//!
//! The scan walks the base programs in start order classifying the overlap
//! between the sports program P and each base program B, then trims,
//! removes, or splits B so that P's window wins. Relax mode first asks the
//! resolver whether the base EPG already carries the event; force mode
//! writes P in unconditionally. The non-overlap and start-order invariants
//! hold on every channel afterwards.

use anyhow::Result;
use tracing::debug;

use crate::index::ProgramIndex;
use crate::matcher::resolver::{
    do_programs_match, find_best_matching_program, is_pre_validated_match, should_leave_alone,
    Resolution,
};
use crate::models::{insertion_point, Channel, ChannelSet, Program};
use crate::orchestrator::context::EngineContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Sports programs already represented in the base EPG are skipped.
    Relax,
    /// Every sports program is written in; sports always wins.
    Force,
}

enum OverlapDecision {
    Proceed,
    Skip,
    Restart,
}

/// Merge every channel of the sports timeline into the base EPG.
pub async fn merge_sports_epg(
    ctx: &mut EngineContext,
    index: &ProgramIndex,
    epg: &mut ChannelSet,
    sports_epg: &ChannelSet,
    mode: MergeMode,
) -> Result<()> {
    for sports_channel in sports_epg.iter() {
        if epg.get(&sports_channel.id).is_none() {
            continue;
        }
        debug!(
            "Reconciling channel {} ({}), {} sports programs",
            sports_channel.id,
            sports_channel.display_name(),
            sports_channel.programs.len()
        );

        for sports_program in &sports_channel.programs {
            if mode == MergeMode::Relax {
                // Blacklisted sports programs are never merged in relax
                // mode; force mode writes them in like everything else.
                if ctx.db.is_sports_program_ignored(sports_program).await?
                    || ctx.matches_ignore_pattern(sports_program.title())
                {
                    debug!(
                        "Skipping blacklisted sports program '{}'",
                        sports_program.title()
                    );
                    continue;
                }
            }

            let channel = epg
                .get_mut(&sports_channel.id)
                .expect("channel presence checked above");
            merge_program(ctx, index, channel, sports_program.clone(), mode).await?;
        }
    }

    Ok(())
}

/// Merge a single sports program into a channel timeline.
///
/// In relax mode the resolver runs at most once per sports program; when it
/// returns a program with different times the scan restarts with the
/// replacement, and the disabled resolver guarantees termination.
async fn merge_program(
    ctx: &mut EngineContext,
    index: &ProgramIndex,
    channel: &mut Channel,
    mut p: Program,
    mode: MergeMode,
) -> Result<()> {
    let mut resolver_enabled = mode == MergeMode::Relax;

    'restart: loop {
        let mut processed = false;
        let mut i = 0;

        while i < channel.programs.len() {
            if processed && channel.programs[i] == p {
                // Our own insertion; never classify P against itself. An
                // unprocessed P equal to a base program is handled by the
                // overlap decision instead.
                i += 1;
                continue;
            }
            let b_start = channel.programs[i].start;
            let b_stop = channel.programs[i].stop;

            if p.start < b_start {
                if p.stop <= b_start {
                    // P entirely before B.
                    if !processed {
                        if resolve_before_insert(ctx, index, &mut p, &mut resolver_enabled)
                            .await?
                        {
                            continue 'restart;
                        }
                        insert_at_sorted_position(channel, p.clone());
                    }
                    processed = true;
                    break;
                } else if p.stop < b_stop {
                    // P overflows into B's head: trim B forward.
                    if !processed {
                        if resolve_before_insert(ctx, index, &mut p, &mut resolver_enabled)
                            .await?
                        {
                            continue 'restart;
                        }
                        channel.programs[i].start = p.stop;
                        insert_at_sorted_position(channel, p.clone());
                        processed = true;
                    } else {
                        channel.programs[i].start = p.stop;
                    }
                    break;
                } else if p.stop == b_stop {
                    // P covers B exactly from before its start.
                    if !processed {
                        if resolve_before_insert(ctx, index, &mut p, &mut resolver_enabled)
                            .await?
                        {
                            continue 'restart;
                        }
                        channel.programs.remove(i);
                        insert_at_sorted_position(channel, p.clone());
                        processed = true;
                    } else {
                        channel.programs.remove(i);
                    }
                    break;
                } else {
                    // P swallows B whole; keep scanning, it may swallow more.
                    if !processed {
                        if resolve_before_insert(ctx, index, &mut p, &mut resolver_enabled)
                            .await?
                        {
                            continue 'restart;
                        }
                        channel.programs.remove(i);
                        let position = insert_at_sorted_position(channel, p.clone());
                        processed = true;
                        if position <= i {
                            i += 1;
                        }
                    } else {
                        channel.programs.remove(i);
                    }
                    continue;
                }
            } else if p.start == b_start {
                let decision =
                    overlap_decision(ctx, index, &mut p, i, channel, &mut resolver_enabled, mode)
                        .await?;
                match decision {
                    OverlapDecision::Restart => continue 'restart,
                    OverlapDecision::Skip => {
                        processed = true;
                        break;
                    }
                    OverlapDecision::Proceed => {}
                }

                if p.stop < b_stop {
                    // Start-aligned, shorter: trim B forward.
                    channel.programs[i].start = p.stop;
                    insert_at_sorted_position(channel, p.clone());
                    processed = true;
                    break;
                } else if p.stop == b_stop {
                    // Same window: replace B.
                    channel.programs.remove(i);
                    insert_at_sorted_position(channel, p.clone());
                    processed = true;
                    break;
                } else {
                    // Start-aligned overflow: replace B, keep scanning.
                    channel.programs.remove(i);
                    let position = insert_at_sorted_position(channel, p.clone());
                    processed = true;
                    if position <= i {
                        i += 1;
                    }
                    continue;
                }
            } else {
                if p.start >= b_stop {
                    // No overlap yet.
                    i += 1;
                    continue;
                }

                let decision =
                    overlap_decision(ctx, index, &mut p, i, channel, &mut resolver_enabled, mode)
                        .await?;
                match decision {
                    OverlapDecision::Restart => continue 'restart,
                    OverlapDecision::Skip => {
                        processed = true;
                        break;
                    }
                    OverlapDecision::Proceed => {}
                }

                if p.stop < b_stop {
                    // P inside B: split B around P.
                    let mut tail = channel.programs[i].clone();
                    channel.programs[i].stop = p.start;
                    insert_at_sorted_position(channel, p.clone());
                    tail.start = p.stop;
                    insert_at_sorted_position(channel, tail);
                    processed = true;
                    break;
                } else if p.stop == b_stop {
                    // P covers B's tail exactly: trim B back.
                    channel.programs[i].stop = p.start;
                    insert_at_sorted_position(channel, p.clone());
                    processed = true;
                    break;
                } else {
                    // P overflows past B: trim B back, keep scanning.
                    channel.programs[i].stop = p.start;
                    insert_at_sorted_position(channel, p.clone());
                    processed = true;
                    i += 1;
                    continue;
                }
            }
        }

        if !processed {
            // Scan exhausted without an overlap; the timeline's tail (or an
            // empty channel) takes P as-is.
            if resolver_enabled && !should_leave_alone(ctx, &p).await? {
                if let Resolution::Matched(matched) =
                    find_best_matching_program(ctx, index, &p).await?
                {
                    p = matched;
                }
            }
            insert_at_sorted_position(channel, p.clone());
        }

        return Ok(());
    }
}

fn insert_at_sorted_position(channel: &mut Channel, program: Program) -> usize {
    let position = insertion_point(&channel.programs, program.start);
    channel.programs.insert(position, program);
    position
}

/// Relax-mode consult before an insertion in the "P starts first" cases:
/// one resolver call per sports program; returns true when the scan must
/// restart because the resolution changed P's times.
async fn resolve_before_insert(
    ctx: &mut EngineContext,
    index: &ProgramIndex,
    p: &mut Program,
    resolver_enabled: &mut bool,
) -> Result<bool> {
    if !*resolver_enabled || should_leave_alone(ctx, p).await? {
        return Ok(false);
    }

    if let Resolution::Matched(matched) = find_best_matching_program(ctx, index, p).await? {
        *resolver_enabled = false;
        let times_differ = matched.start != p.start || matched.stop != p.stop;
        *p = matched;
        return Ok(times_differ);
    }

    Ok(false)
}

/// Relax-mode decision for the overlapping cases: skip the action when the
/// store pre-validates the pair, when P fuzzily matches B directly, or when
/// P resolves to B itself.
async fn overlap_decision(
    ctx: &mut EngineContext,
    index: &ProgramIndex,
    p: &mut Program,
    b_index: usize,
    channel: &Channel,
    resolver_enabled: &mut bool,
    mode: MergeMode,
) -> Result<OverlapDecision> {
    if mode == MergeMode::Force {
        return Ok(OverlapDecision::Proceed);
    }

    let b = channel.programs[b_index].clone();
    let mut proceed = true;

    if !should_leave_alone(ctx, p).await? {
        if is_pre_validated_match(ctx, p, &b).await? {
            proceed = false;
        } else if *resolver_enabled {
            if do_programs_match(ctx, p, &b, false, false, true).await? {
                proceed = false;
            } else if let Resolution::Matched(matched) =
                find_best_matching_program(ctx, index, p).await?
            {
                *resolver_enabled = false;
                let times_differ = matched.start != p.start || matched.stop != p.stop;
                *p = matched;
                if times_differ {
                    return Ok(OverlapDecision::Restart);
                }
            }
        }
    }

    if *p == b {
        proceed = false;
    }

    Ok(if proceed {
        OverlapDecision::Proceed
    } else {
        OverlapDecision::Skip
    })
}

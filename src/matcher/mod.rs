//! Fuzzy name matching between sports-feed programs and base-EPG programs:
//! candidate string construction (category-map aware), two-metric scoring,
//! and the memoising evaluation that records matches in the store.

pub mod fuzzy;
pub mod resolver;

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::debug;

use crate::models::Program;
use crate::orchestrator::context::EngineContext;
use fuzzy::MatchScores;

/// Strips everything up to (and including) the last colon-and-whitespace.
static AFTER_COLON_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A.*:\s+").expect("valid after-colon pattern"));

/// `"NFL: Patriots at Jets"` → `"Patriots at Jets"`; titles without a colon
/// pass through unchanged.
pub fn title_after_colon(title: &str) -> String {
    AFTER_COLON_REGEX.replace(title, "").into_owned()
}

/// Split `"NFL: Patriots at Jets"` into `("NFL", "Patriots at Jets")`.
pub fn split_category(title: &str) -> Option<(&str, &str)> {
    title
        .find(": ")
        .map(|position| (&title[..position], &title[position + 2..]))
}

/// Build the ordered pairs of strings to score for a (sports, epg)
/// candidate. An empty result means an explicit operator negative vetoed
/// the comparison.
pub async fn create_match_tuples(
    ctx: &EngineContext,
    sports: &Program,
    epg: &Program,
) -> Result<Vec<(String, String)>> {
    let mut tuples = Vec::new();
    let sports_title = sports.title();

    if let Some((category, rest)) = split_category(sports_title) {
        let epg_title_category = title_after_colon(epg.title());

        for record in ctx.db.category_map_for(category).await? {
            if record.is_valid == Some(1) {
                if record.epg_category == epg_title_category {
                    if let Some(sub_title) = epg.sub_title() {
                        tuples.push((rest.to_string(), sub_title.to_string()));
                        if sub_title.contains(": ") {
                            tuples.push((rest.to_string(), title_after_colon(sub_title)));
                        }
                    }
                }
            } else if record.reviewed {
                // Reviewed and not valid: an explicit negative.
                return Ok(tuples);
            }
        }

        if tuples.is_empty() {
            if let Some(sub_title) = epg.sub_title() {
                tuples.push((rest.to_string(), sub_title.to_string()));
                if sub_title.contains(": ") {
                    tuples.push((rest.to_string(), title_after_colon(sub_title)));
                }
            }
        }
    } else {
        tuples.push((sports_title.to_string(), epg.title().to_string()));
    }

    tuples.push((concatenated_title(sports), concatenated_title(epg)));

    Ok(tuples)
}

fn concatenated_title(program: &Program) -> String {
    match program.sub_title() {
        Some(sub_title) => format!("{}: {}", program.title(), sub_title),
        None => program.title().to_string(),
    }
}

/// Query strings used to sweep the index keys for a sports program:
/// category-substituted variants first, then the bare event name, the full
/// title, and the concatenated form.
pub async fn create_program_query_strings(
    ctx: &EngineContext,
    sports: &Program,
) -> Result<Vec<String>> {
    let mut queries = Vec::new();
    let title = sports.title();

    if let Some((category, rest)) = split_category(title) {
        for record in ctx.db.category_map_for(category).await? {
            if record.is_valid.is_some_and(|valid| valid != 0) {
                queries.push(title.replace(category, &record.epg_category));
            }
        }

        queries.push(rest.to_string());
        queries.push(title.to_string());
        if let Some(sub_title) = sports.sub_title() {
            queries.push(format!("{title}: {sub_title}"));
        }
    } else {
        queries.push(title.to_string());
        if let Some(sub_title) = sports.sub_title() {
            queries.push(format!("{title}: {sub_title}"));
        }
    }

    Ok(queries)
}

/// Walk the match tuples looking for the first passing pair.
///
/// Safe mode returns on the first tuple clearing the safe threshold,
/// memoising it unless the pair scored a perfect 100, and witnesses the
/// category pairing. Risky mode requires both metrics past the risky
/// threshold and always memoises.
pub async fn evaluate_match_tuples(
    ctx: &mut EngineContext,
    sports: &Program,
    epg: &Program,
    tuples: &[(String, String)],
    perform_safe_match: bool,
) -> Result<bool> {
    for (sports_string, epg_string) in tuples {
        let scores = MatchScores::compute(sports_string, epg_string);

        if perform_safe_match {
            if scores.is_safe() {
                if scores.token_sort < 100 && scores.jaro_winkler < 100 {
                    ctx.db
                        .record_program_match(
                            sports,
                            epg,
                            sports_string,
                            epg_string,
                            scores.token_sort,
                            scores.jaro_winkler,
                        )
                        .await?;
                }
                witness_category_pairing(ctx, sports, epg);
                return Ok(true);
            }
        } else if scores.is_risky() {
            debug!(
                "Risky match: token sort {}%, Jaro-Winkler {}% for '{}' vs '{}'",
                scores.token_sort, scores.jaro_winkler, sports_string, epg_string
            );
            ctx.db
                .record_program_match(
                    sports,
                    epg,
                    sports_string,
                    epg_string,
                    scores.token_sort,
                    scores.jaro_winkler,
                )
                .await?;
            return Ok(true);
        }
    }

    Ok(false)
}

fn witness_category_pairing(ctx: &mut EngineContext, sports: &Program, epg: &Program) {
    if let Some((category, _)) = split_category(sports.title()) {
        let category = category.to_string();
        let epg_category = title_after_colon(epg.title());
        ctx.witness_category_pair(&category, &epg_category);
    }
}

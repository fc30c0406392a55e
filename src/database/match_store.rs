//! Match store tables: memoised fuzzy matches, failures, operator-curated
//! forced/pattern/ignore rules, and the category map.
//!
//! Uniqueness is enforced by the schema; inserters translate a unique
//! violation into the update-counter path instead of surfacing it. Empty
//! strings act as wildcards in the ignore tables, so lookups OR the
//! concrete tuple against the sentinel tuples.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::debug;

use crate::constants::SAFE_FUZZY_MATCH_PERCENTAGE;
use crate::models::{canonical_channel_id, service_channel_of, Program};
use crate::utils::datetime::{format_for_storage, truncate_subseconds};

#[derive(Debug, Clone)]
pub struct ProgramMatchRecord {
    pub match_type: String,
    pub number_of_occurrences: i64,
    pub is_valid: Option<i64>,
    pub reviewed: bool,
}

#[derive(Debug, Clone)]
pub struct ForcedMatchRecord {
    pub epg_program_title: String,
    pub epg_program_sub_title: String,
    pub epg_program_channel: String,
    pub epg_program_start: String,
    pub epg_program_stop: String,
}

#[derive(Debug, Clone)]
pub struct CategoryMapRecord {
    pub smooth_streams_category: String,
    pub epg_category: String,
    pub is_valid: Option<i64>,
    pub reviewed: bool,
}

/// The five-field key identifying a program in the store.
struct ProgramKey {
    title: String,
    sub_title: String,
    channel: String,
    start: String,
    stop: String,
}

impl ProgramKey {
    fn sports(program: &Program) -> Self {
        Self {
            title: program.title().to_string(),
            sub_title: program.sub_title().unwrap_or("").to_string(),
            channel: program.channel.clone(),
            start: format_for_storage(&program.start),
            stop: format_for_storage(&program.stop),
        }
    }

    /// Base-EPG key as stored in `program_match`: the channel is the
    /// service number when the upstream id is mapped.
    fn epg(program: &Program) -> Self {
        let canonical = canonical_channel_id(&program.channel);
        let channel = service_channel_of(&program.channel)
            .map(str::to_string)
            .unwrap_or_else(|| canonical.to_string());
        Self {
            title: program.title().to_string(),
            sub_title: program.sub_title().unwrap_or("").to_string(),
            channel,
            start: format_for_storage(&program.start),
            stop: format_for_storage(&program.stop),
        }
    }
}

fn now_for_storage() -> String {
    format_for_storage(&truncate_subseconds(Utc::now()))
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

impl crate::database::Database {
    /// Memoised match row for the (sports, epg) pair, if one exists.
    pub async fn program_match(
        &self,
        sports: &Program,
        epg: &Program,
    ) -> Result<Option<ProgramMatchRecord>> {
        let s = ProgramKey::sports(sports);
        let e = ProgramKey::epg(epg);

        let row = sqlx::query(
            "SELECT match_type, number_of_occurrences, is_valid, reviewed
             FROM program_match
             WHERE smooth_streams_program_title = ?
               AND smooth_streams_program_sub_title = ?
               AND smooth_streams_program_channel = ?
               AND smooth_streams_program_start = ?
               AND smooth_streams_program_stop = ?
               AND epg_program_title = ?
               AND epg_program_sub_title = ?
               AND epg_program_channel = ?
               AND epg_program_start = ?
               AND epg_program_stop = ?",
        )
        .bind(&s.title)
        .bind(&s.sub_title)
        .bind(&s.channel)
        .bind(&s.start)
        .bind(&s.stop)
        .bind(&e.title)
        .bind(&e.sub_title)
        .bind(&e.channel)
        .bind(&e.start)
        .bind(&e.stop)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| ProgramMatchRecord {
            match_type: row.get("match_type"),
            number_of_occurrences: row.get("number_of_occurrences"),
            is_valid: row.get("is_valid"),
            reviewed: row.get::<i64, _>("reviewed") != 0,
        }))
    }

    /// Refresh the last-match timestamp and bump the occurrence counter.
    pub async fn touch_program_match(&self, sports: &Program, epg: &Program) -> Result<()> {
        let s = ProgramKey::sports(sports);
        let e = ProgramKey::epg(epg);

        sqlx::query(
            "UPDATE program_match
             SET date_time_of_last_match = ?,
                 number_of_occurrences = number_of_occurrences + 1
             WHERE smooth_streams_program_title = ?
               AND smooth_streams_program_sub_title = ?
               AND smooth_streams_program_channel = ?
               AND smooth_streams_program_start = ?
               AND smooth_streams_program_stop = ?
               AND epg_program_title = ?
               AND epg_program_sub_title = ?
               AND epg_program_channel = ?
               AND epg_program_start = ?
               AND epg_program_stop = ?",
        )
        .bind(now_for_storage())
        .bind(&s.title)
        .bind(&s.sub_title)
        .bind(&s.channel)
        .bind(&s.start)
        .bind(&s.stop)
        .bind(&e.title)
        .bind(&e.sub_title)
        .bind(&e.channel)
        .bind(&e.start)
        .bind(&e.stop)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Record a fuzzy match. A row that already exists takes the
    /// counter-increment path instead.
    pub async fn record_program_match(
        &self,
        sports: &Program,
        epg: &Program,
        sports_string_compared: &str,
        epg_string_compared: &str,
        token_sort_ratio_score: i32,
        jaro_winkler_ratio_score: i32,
    ) -> Result<()> {
        let s = ProgramKey::sports(sports);
        let e = ProgramKey::epg(epg);
        let match_type = if token_sort_ratio_score >= SAFE_FUZZY_MATCH_PERCENTAGE
            || jaro_winkler_ratio_score >= SAFE_FUZZY_MATCH_PERCENTAGE
        {
            "safe"
        } else {
            "risky"
        };

        let inserted = sqlx::query(
            "INSERT INTO program_match (smooth_streams_program_title,
                 smooth_streams_program_sub_title, smooth_streams_program_channel,
                 smooth_streams_program_start, smooth_streams_program_stop,
                 epg_program_title, epg_program_sub_title, epg_program_channel,
                 epg_program_start, epg_program_stop,
                 smooth_streams_program_string_compared, epg_program_string_compared,
                 token_sort_ratio_score, jaro_winkler_ratio_score, match_type,
                 date_time_of_last_match, number_of_occurrences, is_valid, reviewed)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, NULL, 0)",
        )
        .bind(&s.title)
        .bind(&s.sub_title)
        .bind(&s.channel)
        .bind(&s.start)
        .bind(&s.stop)
        .bind(&e.title)
        .bind(&e.sub_title)
        .bind(&e.channel)
        .bind(&e.start)
        .bind(&e.stop)
        .bind(sports_string_compared)
        .bind(epg_string_compared)
        .bind(token_sort_ratio_score)
        .bind(jaro_winkler_ratio_score)
        .bind(match_type)
        .bind(now_for_storage())
        .execute(self.pool())
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => {
                self.touch_program_match(sports, epg).await
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Record a ladder failure for the sports program.
    pub async fn record_failed_match(&self, sports: &Program) -> Result<()> {
        let s = ProgramKey::sports(sports);

        let inserted = sqlx::query(
            "INSERT INTO failed_program_match (smooth_streams_program_title,
                 smooth_streams_program_sub_title, smooth_streams_program_channel,
                 smooth_streams_program_start, smooth_streams_program_stop,
                 date_time_of_last_failure, number_of_occurrences, reviewed)
             VALUES (?, ?, ?, ?, ?, ?, 1, 0)",
        )
        .bind(&s.title)
        .bind(&s.sub_title)
        .bind(&s.channel)
        .bind(&s.start)
        .bind(&s.stop)
        .bind(now_for_storage())
        .execute(self.pool())
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => {
                sqlx::query(
                    "UPDATE failed_program_match
                     SET date_time_of_last_failure = ?,
                         number_of_occurrences = number_of_occurrences + 1
                     WHERE smooth_streams_program_title = ?
                       AND smooth_streams_program_sub_title = ?
                       AND smooth_streams_program_channel = ?
                       AND smooth_streams_program_start = ?
                       AND smooth_streams_program_stop = ?",
                )
                .bind(now_for_storage())
                .bind(&s.title)
                .bind(&s.sub_title)
                .bind(&s.channel)
                .bind(&s.start)
                .bind(&s.stop)
                .execute(self.pool())
                .await?;
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Operator-forced target for the sports program, if one exists.
    pub async fn forced_match_for(&self, sports: &Program) -> Result<Option<ForcedMatchRecord>> {
        let s = ProgramKey::sports(sports);

        let row = sqlx::query(
            "SELECT epg_program_title, epg_program_sub_title, epg_program_channel,
                    epg_program_start, epg_program_stop
             FROM forced_program_match
             WHERE smooth_streams_program_title = ?
               AND smooth_streams_program_sub_title = ?
               AND smooth_streams_program_channel = ?
               AND smooth_streams_program_start = ?
               AND smooth_streams_program_stop = ?",
        )
        .bind(&s.title)
        .bind(&s.sub_title)
        .bind(&s.channel)
        .bind(&s.start)
        .bind(&s.stop)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| ForcedMatchRecord {
            epg_program_title: row.get("epg_program_title"),
            epg_program_sub_title: row.get("epg_program_sub_title"),
            epg_program_channel: row.get("epg_program_channel"),
            epg_program_start: row.get("epg_program_start"),
            epg_program_stop: row.get("epg_program_stop"),
        }))
    }

    /// Regex to search the base-EPG index with, keyed by sports title.
    pub async fn pattern_for(&self, sports_title: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT epg_program_pattern
             FROM pattern_program_match
             WHERE smooth_streams_program_title = ?",
        )
        .bind(sports_title)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| row.get("epg_program_pattern")))
    }

    /// Blacklist check for a base-EPG program. Sentinel rows with empty
    /// sub-title/channel/times match any program sharing the title.
    pub async fn is_epg_program_ignored(&self, epg: &Program) -> Result<bool> {
        let title = epg.title();
        let sub_title = epg.sub_title().unwrap_or("");
        let start = format_for_storage(&epg.start);
        let stop = format_for_storage(&epg.stop);

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)
             FROM ignored_epg_program_match
             WHERE epg_program_title = ?
               AND ((epg_program_sub_title = ?
                     AND epg_program_channel = ?
                     AND epg_program_start = ?
                     AND epg_program_stop = ?)
                 OR (epg_program_sub_title = ?
                     AND epg_program_channel = ''
                     AND epg_program_start = ''
                     AND epg_program_stop = '')
                 OR (epg_program_sub_title = ''
                     AND epg_program_channel = ''
                     AND epg_program_start = ''
                     AND epg_program_stop = ''))",
        )
        .bind(title)
        .bind(sub_title)
        .bind(&epg.channel)
        .bind(&start)
        .bind(&stop)
        .bind(sub_title)
        .fetch_one(self.pool())
        .await?;

        Ok(count > 0)
    }

    /// Blacklist check for a sports program; wildcard rows match on title
    /// and sub-title alone.
    pub async fn is_sports_program_ignored(&self, sports: &Program) -> Result<bool> {
        let s = ProgramKey::sports(sports);

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)
             FROM ignored_smooth_streams_program_match
             WHERE smooth_streams_program_title = ?
               AND smooth_streams_program_sub_title = ?
               AND ((smooth_streams_program_channel = ?
                     AND smooth_streams_program_start = ?
                     AND smooth_streams_program_stop = ?)
                 OR (smooth_streams_program_channel = ''
                     AND smooth_streams_program_start = ''
                     AND smooth_streams_program_stop = ''))",
        )
        .bind(&s.title)
        .bind(&s.sub_title)
        .bind(&s.channel)
        .bind(&s.start)
        .bind(&s.stop)
        .fetch_one(self.pool())
        .await?;

        Ok(count > 0)
    }

    pub async fn ignored_sports_patterns(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT smooth_streams_program_pattern
             FROM ignored_smooth_streams_program_pattern",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get("smooth_streams_program_pattern"))
            .collect())
    }

    /// All category_map rows for a sports category.
    pub async fn category_map_for(&self, sports_category: &str) -> Result<Vec<CategoryMapRecord>> {
        let rows = sqlx::query(
            "SELECT smooth_streams_category, epg_category, is_valid, reviewed
             FROM category_map
             WHERE smooth_streams_category = ?",
        )
        .bind(sports_category)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryMapRecord {
                smooth_streams_category: row.get("smooth_streams_category"),
                epg_category: row.get("epg_category"),
                is_valid: row.get("is_valid"),
                reviewed: row.get::<i64, _>("reviewed") != 0,
            })
            .collect())
    }

    /// Insert a category hypothesis; an existing pair is left untouched.
    pub async fn record_category_map(
        &self,
        sports_category: &str,
        epg_category: &str,
    ) -> Result<()> {
        let inserted = sqlx::query(
            "INSERT INTO category_map (smooth_streams_category, epg_category, is_valid, reviewed)
             VALUES (?, ?, NULL, 0)",
        )
        .bind(sports_category)
        .bind(epg_category)
        .execute(self.pool())
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    /// End-of-run retention: rows not touched this run (or whose programs
    /// ended more than a day before it) are removed. Sentinel ignore rows
    /// are kept.
    pub async fn purge_expired(&self, run_start: DateTime<Utc>) -> Result<()> {
        let day_before = format_for_storage(&(run_start - chrono::Duration::days(1)));
        let run_start = format_for_storage(&run_start);

        let purged = sqlx::query(
            "DELETE FROM failed_program_match WHERE date_time_of_last_failure < ?",
        )
        .bind(&run_start)
        .execute(self.pool())
        .await?;
        debug!("Purged failed_program_match: {} rows", purged.rows_affected());

        let purged = sqlx::query(
            "DELETE FROM forced_program_match WHERE smooth_streams_program_stop < ?",
        )
        .bind(&day_before)
        .execute(self.pool())
        .await?;
        debug!("Purged forced_program_match: {} rows", purged.rows_affected());

        let purged = sqlx::query(
            "DELETE FROM ignored_epg_program_match
             WHERE epg_program_stop < ? AND epg_program_stop <> ''",
        )
        .bind(&day_before)
        .execute(self.pool())
        .await?;
        debug!(
            "Purged ignored_epg_program_match: {} rows",
            purged.rows_affected()
        );

        let purged = sqlx::query(
            "DELETE FROM ignored_smooth_streams_program_match
             WHERE smooth_streams_program_stop < ? AND smooth_streams_program_stop <> ''",
        )
        .bind(&day_before)
        .execute(self.pool())
        .await?;
        debug!(
            "Purged ignored_smooth_streams_program_match: {} rows",
            purged.rows_affected()
        );

        let purged =
            sqlx::query("DELETE FROM program_match WHERE date_time_of_last_match < ?")
                .bind(&run_start)
                .execute(self.pool())
                .await?;
        debug!("Purged program_match: {} rows", purged.rows_affected());

        Ok(())
    }
}

//! Per-run state threaded explicitly through the matching and merging
//! components: the store handle, run timestamps, cached ignore patterns,
//! the category-map hypothesis counters, and the error accumulator.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::warn;

use crate::database::Database;
use crate::utils::datetime::midnight_of;

pub struct EngineContext {
    pub db: Database,
    /// UTC instant the run started, truncated to whole seconds.
    pub run_start: DateTime<Utc>,
    /// Midnight of the run start plus the longest horizon plus one day;
    /// sports programs starting past this are left alone.
    pub horizon_cutoff: DateTime<Utc>,
    /// Greatest stop seen across the base EPGs; populated after parsing.
    pub latest_epg_stop: Option<DateTime<Utc>>,
    /// Compiled ignore patterns, loaded once per run.
    pub ignore_patterns: Vec<Regex>,
    /// (sports category, epg category) pairs witnessed by safe matches this
    /// run.
    pub category_hypotheses: HashMap<String, HashMap<String, u32>>,
    /// Non-fatal errors reported at shutdown.
    pub errors: Vec<String>,
}

impl EngineContext {
    pub async fn new(
        db: Database,
        run_start: DateTime<Utc>,
        max_horizon_days: u32,
    ) -> Result<Self> {
        let horizon_cutoff =
            midnight_of(run_start) + Duration::days(i64::from(max_horizon_days) + 1);

        let mut ignore_patterns = Vec::new();
        for pattern in db.ignored_sports_patterns().await? {
            match Regex::new(&pattern) {
                Ok(regex) => ignore_patterns.push(regex),
                Err(error) => warn!("Skipping invalid ignore pattern '{}': {}", pattern, error),
            }
        }

        Ok(Self {
            db,
            run_start,
            horizon_cutoff,
            latest_epg_stop: None,
            ignore_patterns,
            category_hypotheses: HashMap::new(),
            errors: Vec::new(),
        })
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        tracing::error!("{error}");
        self.errors.push(error);
    }

    /// Whether any ignore pattern matches the sports program title.
    pub fn matches_ignore_pattern(&self, title: &str) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.is_match(title))
    }

    /// Count a (sports category, epg category) pairing witnessed by a safe
    /// match.
    pub fn witness_category_pair(&mut self, sports_category: &str, epg_category: &str) {
        *self
            .category_hypotheses
            .entry(sports_category.to_string())
            .or_default()
            .entry(epg_category.to_string())
            .or_insert(0) += 1;
    }
}

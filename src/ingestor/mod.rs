//! XMLTV ingestion: the channel map, the per-lineup listings, and the live
//! sports feed, routed into the run's in-memory state.

pub mod xmltv;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::CHANNEL_ID_MAP;
use crate::errors::{AppResult, SourceError};
use crate::index::ProgramIndex;
use crate::models::{canonical_channel_id, service_channel_of, ChannelSet, Program};
use xmltv::{parse_xmltv, ParsedItem};

const FEED_TIMEOUT: StdDuration = StdDuration::from_secs(60);

/// Everything a run accumulates while parsing: the service-channel EPG, the
/// unmapped sports timeline, the title/sub-title index, and bookkeeping for
/// source validation.
#[derive(Default)]
pub struct GuideState {
    pub epg: ChannelSet,
    pub sports_epg: ChannelSet,
    pub index: ProgramIndex,
    /// Greatest stop observed across all base-EPG programs on service
    /// channels.
    pub latest_epg_stop: Option<DateTime<Utc>>,
    /// Upstream channel ids a lineup declared, flagged once witnessed.
    expected_channels: BTreeMap<String, bool>,
}

impl GuideState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the static channel map, creating every service channel in both
    /// the base EPG and the sports timeline.
    pub fn parse_channel_map(&mut self, path: &Path) -> AppResult<()> {
        info!("Parsing service channel map from {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        let source_name = path.display().to_string();

        let mut items = Vec::new();
        parse_xmltv(reader, &source_name, |item| items.push(item))?;

        for item in items {
            match item {
                ParsedItem::Channel(channel) => {
                    let mut sports_channel = channel.clone();
                    sports_channel.programs.clear();
                    self.sports_epg.insert(sports_channel);
                    if !self.epg.insert(channel) {
                        warn!("Duplicate channel id in channel map; keeping the first");
                    }
                }
                ParsedItem::Program(program) => self.route_base_program(program),
            }
        }

        info!("Channel map declared {} service channels", self.epg.len());
        Ok(())
    }

    /// Forget the previous lineup's expected-channel list.
    pub fn clear_expected_channels(&mut self) {
        self.expected_channels.clear();
    }

    /// Load the expected-channel list (`.chl`) accompanying a lineup file.
    /// Lines starting with `#` are comments.
    pub fn read_expected_channels(&mut self, path: &Path) -> AppResult<()> {
        self.expected_channels.clear();
        let contents = std::fs::read_to_string(path)?;
        for line in contents.lines() {
            let line = line.trim();
            if !line.is_empty() && !line.starts_with('#') {
                self.expected_channels.insert(line.to_string(), false);
            }
        }
        Ok(())
    }

    /// Parse one external lineup's XMLTV. Channels are not created here;
    /// they came from the channel map. Every programme goes into the index,
    /// and programmes on mapped upstream channels join the service
    /// channel's timeline.
    pub fn parse_lineup(&mut self, path: &Path) -> AppResult<()> {
        info!("Parsing lineup listings from {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        let source_name = path.display().to_string();

        let mut programs = Vec::new();
        parse_xmltv(reader, &source_name, |item| {
            if let ParsedItem::Program(program) = item {
                programs.push(program);
            }
        })?;

        for program in programs {
            self.route_base_program(program);
        }
        Ok(())
    }

    fn route_base_program(&mut self, program: Program) {
        self.index.insert(&program);

        if let Some(flag) = self.expected_channels.get_mut(&program.channel) {
            *flag = true;
        }

        if let Some(service_channel) = service_channel_of(&program.channel) {
            if self
                .latest_epg_stop
                .is_none_or(|latest| latest < program.stop)
            {
                self.latest_epg_stop = Some(program.stop);
            }
            if let Some(channel) = self.epg.get_mut(service_channel) {
                channel.insert_program(program);
            }
        }
    }

    /// Parse the sports feed, shifting every programme back by
    /// `dst_correction` (one hour while the local zone observes DST,
    /// compensating for the upstream feed bug).
    pub fn parse_sports_feed(&mut self, content: &str, dst_correction: Duration) -> AppResult<()> {
        let mut programs = Vec::new();
        parse_xmltv(content.as_bytes(), "sports feed", |item| {
            if let ParsedItem::Program(program) = item {
                programs.push(program);
            }
        })?;

        let mut attached = 0usize;
        for mut program in programs {
            program.start -= dst_correction;
            program.stop -= dst_correction;

            let channel_id = canonical_channel_id(&program.channel).to_string();
            match self.sports_epg.get_mut(&channel_id) {
                Some(channel) => {
                    channel.insert_program(program);
                    attached += 1;
                }
                None => {
                    debug!("Sports feed references unknown channel '{}'", channel_id);
                }
            }
        }

        info!("Sports feed supplied {} programs", attached);
        Ok(())
    }

    /// Drop sports programs that start before the previous program on the
    /// same channel has stopped; the earlier program is kept.
    pub fn cleanup_sports_epg(&mut self) {
        for channel in self.sports_epg.iter_mut() {
            let mut last_program_stop: Option<DateTime<Utc>> = None;
            let before = channel.programs.len();
            channel.programs.retain(|program| match last_program_stop {
                None => {
                    last_program_stop = Some(program.stop);
                    true
                }
                Some(last_stop) if program.start >= last_stop => {
                    last_program_stop = Some(program.stop);
                    true
                }
                Some(_) => {
                    debug!(
                        "Dropping overlapping sports program '{}' ({} - {})",
                        program.title(),
                        program.start,
                        program.stop
                    );
                    false
                }
            });
            let dropped = before - channel.programs.len();
            if dropped > 0 {
                debug!(
                    "Removed {} overlapping sports programs on channel {}",
                    dropped, channel.id
                );
            }
        }
    }

    /// Every declared upstream channel id that produced no programme is a
    /// source-coverage failure.
    pub fn validate_expected_channels(&self, errors: &mut Vec<String>) {
        for (channel_id, witnessed) in &self.expected_channels {
            if !witnessed {
                let error = format!(
                    "Lineup source issue encountered: declared channel '{}' supplied no programs",
                    channel_id
                );
                tracing::error!("{error}");
                errors.push(error);
            }
        }
    }

    /// Every service channel with an upstream source but no programs is a
    /// source-coverage failure.
    pub fn validate_source_channels(&self, errors: &mut Vec<String>) {
        for channel in self.epg.iter() {
            let has_source = CHANNEL_ID_MAP.values().any(|&number| number == channel.id);
            if has_source && channel.programs.is_empty() {
                let error = format!(
                    "EPG source issue encountered: channel {} ({}) has no programs",
                    channel.id,
                    channel.display_name()
                );
                tracing::error!("{error}");
                errors.push(error);
            }
        }
    }
}

/// Download the sports feed. 60-second timeout; a non-2xx status is a
/// source error.
pub async fn fetch_sports_feed(base_url: &str, file_name: &str) -> AppResult<String> {
    let url = Url::parse(base_url)
        .and_then(|base| base.join(file_name))
        .map_err(|error| SourceError::Parse {
            source_name: "sports feed".to_string(),
            message: format!("invalid feed url: {error}"),
        })?;

    info!("Downloading sports feed from {}", url);

    let client = reqwest::Client::builder().timeout(FEED_TIMEOUT).build()?;
    let response = client.get(url.clone()).send().await?;

    if !response.status().is_success() {
        return Err(SourceError::Http {
            status: response.status().as_u16(),
            url: url.to_string(),
        }
        .into());
    }

    Ok(response.text().await?)
}

//! Channel and Program records parsed from XMLTV.
//!
//! A `Program`'s identity is its `(channel, start, stop)` triple; all other
//! fields are payload. Per-channel timelines are kept start-ordered and
//! non-overlapping by the merge engine.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::constants;

/// Canonical upstream channel id pattern: `I<major>.<minor>` with an
/// optional third component, possibly followed by a lineup suffix.
static UPSTREAM_CHANNEL_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"I[0-9]+\.[0-9]+(\.[0-9]+)?").expect("valid channel id pattern"));

/// Extract the canonical `I<major>.<minor>` form from a possibly-suffixed
/// upstream channel identifier. Identifiers that do not carry the upstream
/// shape (service channel numbers, for instance) are returned unchanged.
pub fn canonical_channel_id(channel: &str) -> &str {
    match UPSTREAM_CHANNEL_ID_REGEX.find(channel) {
        Some(found) => found.as_str(),
        None => channel,
    }
}

/// The service channel number an upstream program belongs to, if its
/// canonical channel id is mapped.
pub fn service_channel_of(channel: &str) -> Option<&'static str> {
    constants::service_channel_for(canonical_channel_id(channel))
}

/// Text with an optional XMLTV `lang` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LangText {
    pub value: String,
    pub language: Option<String>,
}

impl LangText {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub source: String,
    pub width: Option<String>,
    pub height: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub value: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credits {
    pub directors: Vec<String>,
    pub actors: Vec<Actor>,
    pub writers: Vec<String>,
    pub adapters: Vec<String>,
    pub producers: Vec<String>,
    pub composers: Vec<String>,
    pub editors: Vec<String>,
    pub presenters: Vec<String>,
    pub commentators: Vec<String>,
    pub guests: Vec<String>,
}

impl Credits {
    pub fn is_empty(&self) -> bool {
        self.directors.is_empty()
            && self.actors.is_empty()
            && self.writers.is_empty()
            && self.adapters.is_empty()
            && self.producers.is_empty()
            && self.composers.is_empty()
            && self.editors.is_empty()
            && self.presenters.is_empty()
            && self.commentators.is_empty()
            && self.guests.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeNumber {
    pub value: String,
    pub system: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Length {
    pub value: String,
    pub units: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Video {
    pub present: Option<String>,
    pub colour: Option<String>,
    pub aspect: Option<String>,
    pub quality: Option<String>,
}

impl Video {
    pub fn is_empty(&self) -> bool {
        self.present.is_none()
            && self.colour.is_none()
            && self.aspect.is_none()
            && self.quality.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audio {
    pub present: Option<String>,
    pub stereo: Option<String>,
}

impl Audio {
    pub fn is_empty(&self) -> bool {
        self.present.is_none() && self.stereo.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviouslyShown {
    pub start: Option<String>,
    pub channel: Option<String>,
}

/// `<premiere>` and `<last-chance>`: an optional announcement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub value: Option<String>,
    pub language: Option<String>,
}

/// `<rating>` and `<star-rating>` share this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rating {
    pub system: Option<String>,
    pub icons: Vec<Icon>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub value: String,
    pub kind: String,
    pub source: Option<String>,
    pub reviewer: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitlesTrack {
    pub kind: Option<String>,
    pub language: Option<LangText>,
}

#[derive(Debug, Clone)]
pub struct Program {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub channel: String,
    pub titles: Vec<LangText>,
    pub sub_titles: Vec<LangText>,
    pub descriptions: Vec<LangText>,
    pub categories: Vec<LangText>,
    pub keywords: Vec<LangText>,
    pub episode_numbers: Vec<EpisodeNumber>,
    pub countries: Vec<LangText>,
    pub icons: Vec<Icon>,
    pub urls: Vec<String>,
    pub credits: Credits,
    pub date: Option<String>,
    pub language: Option<LangText>,
    pub original_language: Option<LangText>,
    pub length: Option<Length>,
    pub video: Video,
    pub audio: Audio,
    pub new: bool,
    pub previously_shown: Option<PreviouslyShown>,
    pub premiere: Option<Announcement>,
    pub last_chance: Option<Announcement>,
    pub showview: Option<String>,
    pub videoplus: Option<String>,
    pub pdc_start: Option<String>,
    pub vps_start: Option<String>,
    pub clumpidx: Option<String>,
    pub ratings: Vec<Rating>,
    pub star_ratings: Vec<Rating>,
    pub reviews: Vec<Review>,
    pub subtitle_tracks: Vec<SubtitlesTrack>,
}

impl Program {
    pub fn new(channel: impl Into<String>, start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        Self {
            start,
            stop,
            channel: channel.into(),
            titles: Vec::new(),
            sub_titles: Vec::new(),
            descriptions: Vec::new(),
            categories: Vec::new(),
            keywords: Vec::new(),
            episode_numbers: Vec::new(),
            countries: Vec::new(),
            icons: Vec::new(),
            urls: Vec::new(),
            credits: Credits::default(),
            date: None,
            language: None,
            original_language: None,
            length: None,
            video: Video::default(),
            audio: Audio::default(),
            new: false,
            previously_shown: None,
            premiere: None,
            last_chance: None,
            showview: None,
            videoplus: None,
            pdc_start: None,
            vps_start: None,
            clumpidx: None,
            ratings: Vec::new(),
            star_ratings: Vec::new(),
            reviews: Vec::new(),
            subtitle_tracks: Vec::new(),
        }
    }

    /// First title value; programs without a title get the empty string.
    pub fn title(&self) -> &str {
        self.titles.first().map(|t| t.value.as_str()).unwrap_or("")
    }

    pub fn sub_title(&self) -> Option<&str> {
        self.sub_titles.first().map(|t| t.value.as_str())
    }

    pub fn has_sub_titles(&self) -> bool {
        !self.sub_titles.is_empty()
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.stop - self.start).num_seconds()
    }

    /// Clone with different start/stop; used when a base-EPG program stands
    /// in for a sports event at the event's own times.
    pub fn with_times(&self, start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        let mut clone = self.clone();
        clone.start = start;
        clone.stop = stop;
        clone
    }
}

/// Identity: owning channel plus the start/stop pair. Payload is not
/// compared.
impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        self.channel == other.channel && self.start == other.start && self.stop == other.stop
    }
}

impl Eq for Program {}

#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub id: String,
    pub display_names: Vec<LangText>,
    pub icons: Vec<Icon>,
    pub urls: Vec<String>,
    pub programs: Vec<Program>,
}

impl Channel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.display_names
            .first()
            .map(|name| name.value.as_str())
            .unwrap_or(self.id.as_str())
    }

    /// Insert keeping the list start-ordered; equal starts keep insertion
    /// order.
    pub fn insert_program(&mut self, program: Program) {
        let position = insertion_point(&self.programs, program.start);
        self.programs.insert(position, program);
    }

    /// Remove the first program with the given identity, if present.
    pub fn remove_program(&mut self, program: &Program) {
        if let Some(position) = self.programs.iter().position(|p| p == program) {
            self.programs.remove(position);
        }
    }
}

/// Index at which a program starting at `start` is inserted to keep the
/// list sorted, after any programs sharing the same start.
pub fn insertion_point(programs: &[Program], start: DateTime<Utc>) -> usize {
    programs.partition_point(|p| p.start <= start)
}

/// Channels keyed by id, iterated in insertion order. Two channels with the
/// same id cannot coexist; a later insert with a known id is rejected.
#[derive(Debug, Clone, Default)]
pub struct ChannelSet {
    channels: Vec<Channel>,
    positions: std::collections::HashMap<String, usize>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (leaving the set unchanged) when the id is taken.
    pub fn insert(&mut self, channel: Channel) -> bool {
        if self.positions.contains_key(&channel.id) {
            return false;
        }
        self.positions
            .insert(channel.id.clone(), self.channels.len());
        self.channels.push(channel);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.positions.get(id).map(|&position| &self.channels[position])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Channel> {
        self.positions
            .get(id)
            .map(|&position| &mut self.channels[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn program(channel: &str, start_hour: u32, stop_hour: u32) -> Program {
        Program::new(
            channel,
            Utc.with_ymd_and_hms(2025, 6, 1, start_hour, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, stop_hour, 0, 0).unwrap(),
        )
    }

    #[test]
    fn canonical_id_strips_lineup_suffix() {
        assert_eq!(canonical_channel_id("I215.58690.zap2it.com"), "I215.58690");
        assert_eq!(canonical_channel_id("I2.1.31507.zap2it.com"), "I2.1.31507");
    }

    #[test]
    fn canonical_id_passes_through_service_numbers() {
        assert_eq!(canonical_channel_id("10"), "10");
    }

    #[test]
    fn service_channel_lookup() {
        assert_eq!(service_channel_of("I215.58690.suffix"), Some("10"));
        assert_eq!(service_channel_of("I999.99999"), None);
    }

    #[test]
    fn program_identity_ignores_payload() {
        let mut a = program("10", 10, 11);
        let b = program("10", 10, 11);
        a.titles.push(LangText::new("News"));
        assert_eq!(a, b);
        assert_ne!(a, program("11", 10, 11));
        assert_ne!(a, program("10", 10, 12));
    }

    #[test]
    fn insert_program_keeps_start_order() {
        let mut channel = Channel::new("10");
        channel.insert_program(program("10", 12, 13));
        channel.insert_program(program("10", 10, 11));
        channel.insert_program(program("10", 11, 12));
        let starts: Vec<u32> = channel
            .programs
            .iter()
            .map(|p| p.start.format("%H").to_string().parse().unwrap())
            .collect();
        assert_eq!(starts, vec![10, 11, 12]);
    }

    #[test]
    fn with_times_preserves_payload() {
        let mut base = program("10", 10, 12);
        base.titles.push(LangText::new("Football"));
        let moved = base.with_times(
            Utc.with_ymd_and_hms(2025, 6, 1, 10, 2, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 58, 0).unwrap(),
        );
        assert_eq!(moved.title(), "Football");
        assert_eq!(moved.duration_seconds(), 2 * 3600 + 56 * 60);
    }

    #[test]
    fn channel_set_rejects_duplicate_ids_and_keeps_order() {
        let mut set = ChannelSet::new();
        assert!(set.insert(Channel::new("2")));
        assert!(set.insert(Channel::new("1")));
        assert!(!set.insert(Channel::new("2")));
        let ids: Vec<&str> = set.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[test]
    fn remove_program_matches_identity_only() {
        let mut channel = Channel::new("10");
        channel.insert_program(program("10", 10, 11));
        let mut ghost = program("10", 10, 11);
        ghost.titles.push(LangText::new("anything"));
        channel.remove_program(&ghost);
        assert!(channel.programs.is_empty());
    }
}

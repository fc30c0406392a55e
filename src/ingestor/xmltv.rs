//! Streaming XMLTV pull-parser built on quick-xml events.
//!
//! One `Channel` or `Program` is materialised at a time and handed to the
//! caller's sink when its end tag arrives; nothing else is retained, so
//! memory stays bounded regardless of guide size. All child elements of
//! `<programme>` recognised by the XMLTV DTD are captured.

use std::collections::HashMap;
use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use crate::errors::{AppResult, SourceError};
use crate::models::{
    Actor, Announcement, Channel, EpisodeNumber, Icon, LangText, Length, PreviouslyShown, Program,
    Rating, Review, SubtitlesTrack,
};
use crate::utils::datetime;

/// A completed top-level XMLTV element.
pub enum ParsedItem {
    Channel(Channel),
    Program(Program),
}

#[derive(Default)]
struct Scratch {
    channel: Option<Channel>,
    program: Option<Program>,
    rating: Option<Rating>,
    star_rating: Option<Rating>,
    subtitles: Option<SubtitlesTrack>,
    in_credits: bool,
    in_video: bool,
    in_audio: bool,
    /// Attributes of the leaf element whose text is still being collected.
    leaf_attrs: HashMap<String, String>,
}

/// Pull-parse `reader`, feeding each completed `<channel>`/`<programme>` to
/// `sink`. Programmes with missing or malformed required attributes are
/// skipped with a warning rather than failing the whole document.
pub fn parse_xmltv<R: BufRead>(
    reader: R,
    source_name: &str,
    mut sink: impl FnMut(ParsedItem),
) -> AppResult<()> {
    let mut xml_reader = Reader::from_reader(reader);
    xml_reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut current_text = String::new();
    let mut scratch = Scratch::default();

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref element)) => {
                let name = element_name(element);
                handle_start(&name, element, &mut scratch, source_name)?;
                current_text.clear();
            }
            Ok(Event::Empty(ref element)) => {
                let name = element_name(element);
                handle_start(&name, element, &mut scratch, source_name)?;
                handle_end(&name, "", &mut scratch, &mut sink);
                current_text.clear();
            }
            Ok(Event::End(ref element)) => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                handle_end(&name, current_text.trim(), &mut scratch, &mut sink);
                current_text.clear();
            }
            Ok(Event::Text(text)) => {
                if let Ok(decoded) = text.unescape() {
                    current_text.push_str(&decoded);
                }
            }
            Ok(Event::CData(data)) => {
                current_text.push_str(&String::from_utf8_lossy(&data));
            }
            Ok(Event::Eof) => break,
            Err(error) => {
                return Err(SourceError::Parse {
                    source_name: source_name.to_string(),
                    message: error.to_string(),
                }
                .into());
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn element_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

fn attributes(element: &BytesStart<'_>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for attribute in element.attributes().flatten() {
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        if let Ok(value) = attribute.unescape_value() {
            map.insert(key, value.into_owned());
        }
    }
    map
}

fn icon_from(attrs: &HashMap<String, String>) -> Option<Icon> {
    attrs.get("src").map(|source| Icon {
        source: source.clone(),
        width: attrs.get("width").cloned(),
        height: attrs.get("height").cloned(),
    })
}

fn lang_text(text: &str, attrs: &HashMap<String, String>) -> LangText {
    LangText {
        value: text.to_string(),
        language: attrs.get("lang").cloned(),
    }
}

fn handle_start(
    name: &str,
    element: &BytesStart<'_>,
    scratch: &mut Scratch,
    source_name: &str,
) -> AppResult<()> {
    match name {
        "tv" => {}
        "channel" => {
            let attrs = attributes(element);
            let Some(id) = attrs.get("id") else {
                return Err(SourceError::MissingAttribute {
                    element: "channel".to_string(),
                    attribute: "id".to_string(),
                }
                .into());
            };
            scratch.channel = Some(Channel::new(id.clone()));
        }
        "programme" => {
            let attrs = attributes(element);
            match programme_from(&attrs) {
                Ok(program) => scratch.program = Some(program),
                Err(error) => {
                    warn!(
                        "Skipping unparseable <programme> in '{}': {}",
                        source_name, error
                    );
                    scratch.program = None;
                }
            }
        }
        "credits" => scratch.in_credits = true,
        "video" => scratch.in_video = true,
        "audio" => scratch.in_audio = true,
        "rating" if scratch.program.is_some() => {
            let attrs = attributes(element);
            scratch.rating = Some(Rating {
                system: attrs.get("system").cloned(),
                icons: Vec::new(),
                value: None,
            });
        }
        "star-rating" if scratch.program.is_some() => {
            let attrs = attributes(element);
            scratch.star_rating = Some(Rating {
                system: attrs.get("system").cloned(),
                icons: Vec::new(),
                value: None,
            });
        }
        "subtitles" if scratch.program.is_some() => {
            let attrs = attributes(element);
            scratch.subtitles = Some(SubtitlesTrack {
                kind: attrs.get("type").cloned(),
                language: None,
            });
        }
        "icon" => {
            let attrs = attributes(element);
            let Some(icon) = icon_from(&attrs) else {
                return Ok(());
            };
            if let Some(rating) = scratch.rating.as_mut() {
                rating.icons.push(icon);
            } else if let Some(star_rating) = scratch.star_rating.as_mut() {
                star_rating.icons.push(icon);
            } else if let Some(program) = scratch.program.as_mut() {
                program.icons.push(icon);
            } else if let Some(channel) = scratch.channel.as_mut() {
                channel.icons.push(icon);
            }
        }
        "previously-shown" => {
            if let Some(program) = scratch.program.as_mut() {
                let attrs = attributes(element);
                program.previously_shown = Some(PreviouslyShown {
                    start: attrs.get("start").cloned(),
                    channel: attrs.get("channel").cloned(),
                });
            }
        }
        "new" => {
            if let Some(program) = scratch.program.as_mut() {
                program.new = true;
            }
        }
        _ => {
            scratch.leaf_attrs = attributes(element);
        }
    }
    Ok(())
}

fn programme_from(attrs: &HashMap<String, String>) -> Result<Program, SourceError> {
    let channel = attrs
        .get("channel")
        .ok_or_else(|| SourceError::MissingAttribute {
            element: "programme".to_string(),
            attribute: "channel".to_string(),
        })?;
    let start = attrs
        .get("start")
        .ok_or_else(|| SourceError::MissingAttribute {
            element: "programme".to_string(),
            attribute: "start".to_string(),
        })?;
    let stop = attrs
        .get("stop")
        .ok_or_else(|| SourceError::MissingAttribute {
            element: "programme".to_string(),
            attribute: "stop".to_string(),
        })?;

    let mut program = Program::new(
        channel.clone(),
        datetime::parse_xmltv(start)?,
        datetime::parse_xmltv(stop)?,
    );
    program.pdc_start = attrs.get("pdc-start").cloned();
    program.vps_start = attrs.get("vps-start").cloned();
    program.showview = attrs.get("showview").cloned();
    program.videoplus = attrs.get("videoplus").cloned();
    program.clumpidx = attrs.get("clumpidx").cloned();
    Ok(program)
}

fn handle_end(name: &str, text: &str, scratch: &mut Scratch, sink: &mut impl FnMut(ParsedItem)) {
    if name == "programme" {
        if let Some(program) = scratch.program.take() {
            sink(ParsedItem::Program(program));
        }
        *scratch = Scratch::default();
        return;
    }

    if scratch.program.is_none() {
        // Channel children; a <channel> never nests programme content.
        if let Some(channel) = scratch.channel.as_mut() {
            match name {
                "display-name" => channel
                    .display_names
                    .push(lang_text(text, &scratch.leaf_attrs)),
                "url" => channel.urls.push(text.to_string()),
                "channel" => {
                    if let Some(channel) = scratch.channel.take() {
                        sink(ParsedItem::Channel(channel));
                    }
                }
                _ => {}
            }
        }
        scratch.leaf_attrs.clear();
        return;
    }

    if scratch.in_credits {
        let program = scratch.program.as_mut().expect("program is present");
        match name {
            "actor" => program.credits.actors.push(Actor {
                value: text.to_string(),
                role: scratch.leaf_attrs.get("role").cloned(),
            }),
            "adapter" => program.credits.adapters.push(text.to_string()),
            "commentator" => program.credits.commentators.push(text.to_string()),
            "composer" => program.credits.composers.push(text.to_string()),
            "director" => program.credits.directors.push(text.to_string()),
            "editor" => program.credits.editors.push(text.to_string()),
            "guest" => program.credits.guests.push(text.to_string()),
            "presenter" => program.credits.presenters.push(text.to_string()),
            "producer" => program.credits.producers.push(text.to_string()),
            "writer" => program.credits.writers.push(text.to_string()),
            "credits" => scratch.in_credits = false,
            _ => {}
        }
        scratch.leaf_attrs.clear();
        return;
    }

    if scratch.in_video {
        let program = scratch.program.as_mut().expect("program is present");
        match name {
            "aspect" => program.video.aspect = Some(text.to_string()),
            "colour" => program.video.colour = Some(text.to_string()),
            "present" => program.video.present = Some(text.to_string()),
            "quality" => program.video.quality = Some(text.to_string()),
            "video" => scratch.in_video = false,
            _ => {}
        }
        scratch.leaf_attrs.clear();
        return;
    }

    if scratch.in_audio {
        let program = scratch.program.as_mut().expect("program is present");
        match name {
            "present" => program.audio.present = Some(text.to_string()),
            "stereo" => program.audio.stereo = Some(text.to_string()),
            "audio" => scratch.in_audio = false,
            _ => {}
        }
        scratch.leaf_attrs.clear();
        return;
    }

    if scratch.rating.is_some() {
        match name {
            "value" => {
                scratch.rating.as_mut().expect("rating is present").value =
                    Some(text.to_string());
            }
            "rating" => {
                let rating = scratch.rating.take().expect("rating is present");
                scratch
                    .program
                    .as_mut()
                    .expect("program is present")
                    .ratings
                    .push(rating);
            }
            _ => {}
        }
        scratch.leaf_attrs.clear();
        return;
    }

    if scratch.star_rating.is_some() {
        match name {
            "value" => {
                scratch
                    .star_rating
                    .as_mut()
                    .expect("star rating is present")
                    .value = Some(text.to_string());
            }
            "star-rating" => {
                let star_rating = scratch.star_rating.take().expect("star rating is present");
                scratch
                    .program
                    .as_mut()
                    .expect("program is present")
                    .star_ratings
                    .push(star_rating);
            }
            _ => {}
        }
        scratch.leaf_attrs.clear();
        return;
    }

    if scratch.subtitles.is_some() {
        match name {
            "language" => {
                scratch
                    .subtitles
                    .as_mut()
                    .expect("subtitles track is present")
                    .language = Some(lang_text(text, &scratch.leaf_attrs));
            }
            "subtitles" => {
                let subtitles = scratch.subtitles.take().expect("subtitles track is present");
                scratch
                    .program
                    .as_mut()
                    .expect("program is present")
                    .subtitle_tracks
                    .push(subtitles);
            }
            _ => {}
        }
        scratch.leaf_attrs.clear();
        return;
    }

    let program = scratch.program.as_mut().expect("program is present");
    match name {
        "title" => program.titles.push(lang_text(text, &scratch.leaf_attrs)),
        "sub-title" => program.sub_titles.push(lang_text(text, &scratch.leaf_attrs)),
        "desc" => program
            .descriptions
            .push(lang_text(text, &scratch.leaf_attrs)),
        "category" => program
            .categories
            .push(lang_text(text, &scratch.leaf_attrs)),
        "keyword" => program.keywords.push(lang_text(text, &scratch.leaf_attrs)),
        "country" => program.countries.push(lang_text(text, &scratch.leaf_attrs)),
        "url" => program.urls.push(text.to_string()),
        "date" => program.date = Some(text.to_string()),
        "language" => program.language = Some(lang_text(text, &scratch.leaf_attrs)),
        "orig-language" => {
            program.original_language = Some(lang_text(text, &scratch.leaf_attrs));
        }
        "episode-num" => program.episode_numbers.push(EpisodeNumber {
            value: text.to_string(),
            system: scratch.leaf_attrs.get("system").cloned(),
        }),
        "length" => {
            program.length = Some(Length {
                value: text.to_string(),
                units: scratch.leaf_attrs.get("units").cloned().unwrap_or_default(),
            });
        }
        "premiere" => {
            program.premiere = Some(Announcement {
                value: (!text.is_empty()).then(|| text.to_string()),
                language: scratch.leaf_attrs.get("lang").cloned(),
            });
        }
        "last-chance" => {
            program.last_chance = Some(Announcement {
                value: (!text.is_empty()).then(|| text.to_string()),
                language: scratch.leaf_attrs.get("lang").cloned(),
            });
        }
        "review" => program.reviews.push(Review {
            value: text.to_string(),
            kind: scratch.leaf_attrs.get("type").cloned().unwrap_or_default(),
            source: scratch.leaf_attrs.get("source").cloned(),
            reviewer: scratch.leaf_attrs.get("reviewer").cloned(),
            language: scratch.leaf_attrs.get("lang").cloned(),
        }),
        _ => {}
    }
    scratch.leaf_attrs.clear();
}

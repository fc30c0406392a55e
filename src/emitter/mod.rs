//! Reconciled-EPG XMLTV output.
//!
//! Each horizon yields a full file and a short file per merge mode, named
//! `xmltv_<f|r><f|s><days>.xml`. Short files concatenate the sub-title
//! into the title and drop everything but titles, descriptions and
//! categories. Output is built as escaped strings, start/stop always in
//! UTC with an explicit `+0000`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use quick_xml::escape::escape;
use tracing::info;

use crate::models::{ChannelSet, Program};
use crate::utils::datetime::{format_xmltv, midnight_of};

#[derive(Debug, Clone, Copy)]
pub struct EmitOptions {
    pub is_forced: bool,
    pub number_of_days: u32,
    /// Short variant: `"<title>: <subtitle>"`, most sub-elements omitted.
    pub concatenate_sub_title_to_title: bool,
    pub generate_all_elements: bool,
}

impl EmitOptions {
    pub fn file_name(&self) -> String {
        format!(
            "xmltv_{}{}{}.xml",
            if self.is_forced { 'f' } else { 'r' },
            if self.generate_all_elements { 'f' } else { 's' },
            self.number_of_days
        )
    }
}

/// Write the full and short variants for every horizon.
pub fn generate_epg_files(
    epg: &ChannelSet,
    run_start: DateTime<Utc>,
    output_directory: &Path,
    horizons: &[u32],
    is_forced: bool,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for &number_of_days in horizons {
        for (concatenate, all_elements) in [(false, true), (true, false)] {
            let options = EmitOptions {
                is_forced,
                number_of_days,
                concatenate_sub_title_to_title: concatenate,
                generate_all_elements: all_elements,
            };
            written.push(generate_epg_file(epg, run_start, output_directory, options)?);
        }
    }
    Ok(written)
}

pub fn generate_epg_file(
    epg: &ChannelSet,
    run_start: DateTime<Utc>,
    output_directory: &Path,
    options: EmitOptions,
) -> Result<PathBuf> {
    let path = output_directory.join(options.file_name());
    std::fs::write(&path, render_epg(epg, run_start, options))?;
    info!("Wrote {}", path.display());
    Ok(path)
}

/// Render the document; a program is included iff it is still running or
/// upcoming at the run start and starts before the horizon cutoff.
pub fn render_epg(epg: &ChannelSet, run_start: DateTime<Utc>, options: EmitOptions) -> String {
    let cutoff = midnight_of(run_start) + Duration::days(i64::from(options.number_of_days) + 1);

    let mut channels_output = String::new();
    let mut programs_output = String::new();

    for channel in epg.iter() {
        write_channel(&mut channels_output, channel);
        for program in &channel.programs {
            if cutoff > program.start && run_start < program.stop {
                write_program(&mut programs_output, channel.id.as_str(), program, &options);
            }
        }
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<tv>\n{channels_output}{programs_output}</tv>\n"
    )
}

fn lang_attribute(language: &Option<String>) -> String {
    match language {
        Some(language) => format!(" lang=\"{}\"", escape(language.as_str())),
        None => String::new(),
    }
}

fn write_channel(out: &mut String, channel: &crate::models::Channel) {
    let _ = writeln!(out, "\t<channel id=\"{}\">", escape(channel.id.as_str()));

    for display_name in &channel.display_names {
        let _ = writeln!(
            out,
            "\t\t<display-name{}>{}</display-name>",
            lang_attribute(&display_name.language),
            escape(display_name.value.as_str())
        );
    }
    // The channel number is itself a display name for clients keying on it.
    let _ = writeln!(
        out,
        "\t\t<display-name>{}</display-name>",
        escape(channel.id.as_str())
    );

    for icon in &channel.icons {
        write_icon(out, "\t\t", icon);
    }

    for url in &channel.urls {
        let _ = writeln!(out, "\t\t<url>{}</url>", escape(url.as_str()));
    }

    let _ = writeln!(out, "\t</channel>");
}

fn write_icon(out: &mut String, indent: &str, icon: &crate::models::Icon) {
    let height = icon
        .height
        .as_ref()
        .map(|height| format!("height=\"{}\" ", escape(height.as_str())))
        .unwrap_or_default();
    let width = icon
        .width
        .as_ref()
        .map(|width| format!(" width=\"{}\"", escape(width.as_str())))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "{indent}<icon {height}src=\"{}\"{width} />",
        escape(icon.source.as_str())
    );
}

fn optional_attribute(name: &str, value: &Option<String>) -> String {
    match value {
        Some(value) => format!(" {name}=\"{}\"", escape(value.as_str())),
        None => String::new(),
    }
}

fn strip_live_prefix(title: &str) -> String {
    title.replace("Live: ", "")
}

fn write_program(out: &mut String, channel_id: &str, program: &Program, options: &EmitOptions) {
    let _ = writeln!(
        out,
        "\t<programme start=\"{}\" stop=\"{}\"{}{}{}{} channel=\"{}\"{}>",
        escape(format_xmltv(&program.start).as_str()),
        escape(format_xmltv(&program.stop).as_str()),
        optional_attribute("pdc-start", &program.pdc_start),
        optional_attribute("vps-start", &program.vps_start),
        optional_attribute("showview", &program.showview),
        optional_attribute("videoplus", &program.videoplus),
        escape(channel_id),
        optional_attribute("clumpidx", &program.clumpidx),
    );

    if !options.concatenate_sub_title_to_title {
        for title in &program.titles {
            let _ = writeln!(
                out,
                "\t\t<title{}>{}</title>",
                lang_attribute(&title.language),
                escape(strip_live_prefix(&title.value).as_str())
            );
        }
        for sub_title in &program.sub_titles {
            let _ = writeln!(
                out,
                "\t\t<sub-title{}>{}</sub-title>",
                lang_attribute(&sub_title.language),
                escape(sub_title.value.as_str())
            );
        }
    } else if let Some(title) = program.titles.first() {
        match program.sub_titles.first() {
            Some(sub_title) => {
                let _ = writeln!(
                    out,
                    "\t\t<title{}>{}: {}</title>",
                    lang_attribute(&title.language),
                    escape(strip_live_prefix(&title.value).as_str()),
                    escape(sub_title.value.as_str())
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "\t\t<title{}>{}</title>",
                    lang_attribute(&title.language),
                    escape(strip_live_prefix(&title.value).as_str())
                );
            }
        }
    }

    for description in &program.descriptions {
        let _ = writeln!(
            out,
            "\t\t<desc{}>{}</desc>",
            lang_attribute(&description.language),
            escape(description.value.as_str())
        );
    }

    if options.generate_all_elements {
        write_credits(out, program);
        if let Some(date) = &program.date {
            let _ = writeln!(out, "\t\t<date>{}</date>", escape(date.as_str()));
        }
    }

    for category in &program.categories {
        let _ = writeln!(
            out,
            "\t\t<category{}>{}</category>",
            lang_attribute(&category.language),
            escape(category.value.as_str())
        );
    }

    if options.generate_all_elements {
        for keyword in &program.keywords {
            let _ = writeln!(
                out,
                "\t\t<keyword{}>{}</keyword>",
                lang_attribute(&keyword.language),
                escape(keyword.value.as_str())
            );
        }

        if let Some(language) = &program.language {
            let _ = writeln!(
                out,
                "\t\t<language{}>{}</language>",
                lang_attribute(&language.language),
                escape(language.value.as_str())
            );
        }

        if let Some(original_language) = &program.original_language {
            let _ = writeln!(
                out,
                "\t\t<orig-language{}>{}</orig-language>",
                lang_attribute(&original_language.language),
                escape(original_language.value.as_str())
            );
        }

        if let Some(length) = &program.length {
            let _ = writeln!(
                out,
                "\t\t<length units=\"{}\">{}</length>",
                escape(length.units.as_str()),
                escape(length.value.as_str())
            );
        }

        for icon in &program.icons {
            write_icon(out, "\t\t", icon);
        }

        for url in &program.urls {
            let _ = writeln!(out, "\t\t<url>{}</url>", escape(url.as_str()));
        }

        for country in &program.countries {
            let _ = writeln!(
                out,
                "\t\t<country{}>{}</country>",
                lang_attribute(&country.language),
                escape(country.value.as_str())
            );
        }

        for episode_number in &program.episode_numbers {
            let system = episode_number
                .system
                .as_ref()
                .map(|system| format!(" system=\"{}\"", escape(system.as_str())))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "\t\t<episode-num{system}>{}</episode-num>",
                escape(episode_number.value.as_str())
            );
        }

        if !program.video.is_empty() {
            let _ = writeln!(out, "\t\t<video>");
            for (element, value) in [
                ("present", &program.video.present),
                ("colour", &program.video.colour),
                ("aspect", &program.video.aspect),
                ("quality", &program.video.quality),
            ] {
                if let Some(value) = value {
                    let _ = writeln!(
                        out,
                        "\t\t\t<{element}>{}</{element}>",
                        escape(value.as_str())
                    );
                }
            }
            let _ = writeln!(out, "\t\t</video>");
        }

        if !program.audio.is_empty() {
            let _ = writeln!(out, "\t\t<audio>");
            for (element, value) in [
                ("present", &program.audio.present),
                ("stereo", &program.audio.stereo),
            ] {
                if let Some(value) = value {
                    let _ = writeln!(
                        out,
                        "\t\t\t<{element}>{}</{element}>",
                        escape(value.as_str())
                    );
                }
            }
            let _ = writeln!(out, "\t\t</audio>");
        }

        if let Some(previously_shown) = &program.previously_shown {
            let _ = writeln!(
                out,
                "\t\t<previously-shown{}{} />",
                optional_attribute("start", &previously_shown.start),
                optional_attribute("channel", &previously_shown.channel),
            );
        }

        for (element, announcement) in [
            ("premiere", &program.premiere),
            ("last-chance", &program.last_chance),
        ] {
            if let Some(announcement) = announcement {
                match &announcement.value {
                    Some(value) => {
                        let _ = writeln!(
                            out,
                            "\t\t<{element}{}>{}</{element}>",
                            lang_attribute(&announcement.language),
                            escape(value.as_str())
                        );
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "\t\t<{element}{} />",
                            lang_attribute(&announcement.language)
                        );
                    }
                }
            }
        }

        if program.new {
            let _ = writeln!(out, "\t\t<new />");
        }

        for subtitles in &program.subtitle_tracks {
            let kind = subtitles
                .kind
                .as_ref()
                .map(|kind| format!(" type=\"{}\"", escape(kind.as_str())))
                .unwrap_or_default();
            match &subtitles.language {
                Some(language) => {
                    let _ = writeln!(out, "\t\t<subtitles{kind}>");
                    let _ = writeln!(
                        out,
                        "\t\t\t<language{}>{}</language>",
                        lang_attribute(&language.language),
                        escape(language.value.as_str())
                    );
                    let _ = writeln!(out, "\t\t</subtitles>");
                }
                None => {
                    let _ = writeln!(out, "\t\t<subtitles{kind} />");
                }
            }
        }

        for (element, ratings) in [
            ("rating", &program.ratings),
            ("star-rating", &program.star_ratings),
        ] {
            for rating in ratings {
                let system = rating
                    .system
                    .as_ref()
                    .map(|system| format!(" system=\"{}\"", escape(system.as_str())))
                    .unwrap_or_default();
                let _ = writeln!(out, "\t\t<{element}{system}>");
                for icon in &rating.icons {
                    write_icon(out, "\t\t\t", icon);
                }
                if let Some(value) = &rating.value {
                    let _ = writeln!(out, "\t\t\t<value>{}</value>", escape(value.as_str()));
                }
                let _ = writeln!(out, "\t\t</{element}>");
            }
        }

        for review in &program.reviews {
            let _ = writeln!(
                out,
                "\t\t<review type=\"{}\"{}{}{}>{}</review>",
                escape(review.kind.as_str()),
                optional_attribute("source", &review.source),
                optional_attribute("reviewer", &review.reviewer),
                lang_attribute(&review.language),
                escape(review.value.as_str())
            );
        }
    }

    let _ = writeln!(out, "\t</programme>");
}

fn write_credits(out: &mut String, program: &Program) {
    if program.credits.is_empty() {
        return;
    }

    let credits = &program.credits;
    let _ = writeln!(out, "\t\t<credits>");
    for director in &credits.directors {
        let _ = writeln!(out, "\t\t\t<director>{}</director>", escape(director.as_str()));
    }
    for actor in &credits.actors {
        let role = actor
            .role
            .as_ref()
            .map(|role| format!(" role=\"{}\"", escape(role.as_str())))
            .unwrap_or_default();
        let _ = writeln!(out, "\t\t\t<actor{role}>{}</actor>", escape(actor.value.as_str()));
    }
    for writer in &credits.writers {
        let _ = writeln!(out, "\t\t\t<writer>{}</writer>", escape(writer.as_str()));
    }
    for adapter in &credits.adapters {
        let _ = writeln!(out, "\t\t\t<adapter>{}</adapter>", escape(adapter.as_str()));
    }
    for producer in &credits.producers {
        let _ = writeln!(out, "\t\t\t<producer>{}</producer>", escape(producer.as_str()));
    }
    for composer in &credits.composers {
        let _ = writeln!(out, "\t\t\t<composer>{}</composer>", escape(composer.as_str()));
    }
    for editor in &credits.editors {
        let _ = writeln!(out, "\t\t\t<editor>{}</editor>", escape(editor.as_str()));
    }
    for presenter in &credits.presenters {
        let _ = writeln!(
            out,
            "\t\t\t<presenter>{}</presenter>",
            escape(presenter.as_str())
        );
    }
    for commentator in &credits.commentators {
        let _ = writeln!(
            out,
            "\t\t\t<commentator>{}</commentator>",
            escape(commentator.as_str())
        );
    }
    for guest in &credits.guests {
        let _ = writeln!(out, "\t\t\t<guest>{}</guest>", escape(guest.as_str()));
    }
    let _ = writeln!(out, "\t\t</credits>");
}

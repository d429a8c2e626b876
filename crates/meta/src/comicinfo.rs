//! ComicInfo.xml, the de facto sidecar schema (ComicRack and descendants).

use crate::IssueNumber;
use crate::models::{ComicMetadata, Credit, Role, push_unique};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use time::{Date, Month};
use tracing::instrument;

const SIDECAR_NAME: &str = "comicinfo.xml";

/// A parsed sidecar.
#[derive(Debug, Clone, Default)]
pub struct ComicInfo {
    pub metadata: ComicMetadata,
    /// The document stopped being well-formed part-way; `metadata` holds
    /// what was read before that point.
    pub malformed: bool,
    /// Elements whose values were present but unusable.
    pub rejected: Vec<String>,
}

/// Pick the ComicInfo.xml sidecar among a container's member names:
/// basename matched case-insensitively, shallowest path first, then the
/// first in stored order.
pub fn locate<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    names
        .into_iter()
        .filter(|name| {
            let basename = name.rsplit(['/', '\\']).next().unwrap_or(name);
            basename.eq_ignore_ascii_case(SIDECAR_NAME)
        })
        .enumerate()
        .min_by_key(|(position, name)| (name.matches(['/', '\\']).count(), *position))
        .map(|(_, name)| name)
}

#[derive(Default)]
struct Builder {
    metadata: ComicMetadata,
    month: Option<u8>,
    day: Option<u8>,
    rejected: Vec<String>,
}

impl Builder {
    fn reject(&mut self, element: &str, value: &str) {
        tracing::debug!(element, value, "Ignoring unusable ComicInfo.xml value");
        self.rejected.push(element.to_string());
    }

    fn assign(&mut self, element: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let m = &mut self.metadata;
        match element {
            "Title" => m.title = Some(text.to_string()),
            "Series" => m.series = Some(text.to_string()),
            "Number" => match text.parse::<IssueNumber>() {
                Ok(number) => m.issue_number = Some(number),
                Err(_) => self.reject(element, text),
            },
            "Volume" => match text.parse::<i64>() {
                // ComicRack writes -1 for "unset".
                Ok(n) if n < 0 => {},
                Ok(n) => match u32::try_from(n) {
                    Ok(volume) => m.volume = Some(volume),
                    Err(_) => self.reject(element, text),
                },
                Err(_) => self.reject(element, text),
            },
            "Year" => match text.parse::<i32>() {
                Ok(n) if n <= 0 => {},
                Ok(year) if year <= 9999 => m.year = Some(year),
                _ => self.reject(element, text),
            },
            "Month" => match text.parse::<u8>() {
                Ok(month @ 1..=12) => self.month = Some(month),
                _ => self.reject(element, text),
            },
            "Day" => match text.parse::<u8>() {
                Ok(day @ 1..=31) => self.day = Some(day),
                _ => self.reject(element, text),
            },
            "Publisher" => m.publisher = Some(text.to_string()),
            "Summary" => m.summary = Some(text.to_string()),
            "Notes" => m.notes = Some(text.to_string()),
            "Genre" => m.genres.extend(split_list(text).map(str::to_string)),
            "Tags" => m.tags.extend(split_list(text).map(str::to_string)),
            "LanguageISO" => m.language = Some(text.to_string()),
            "Web" => m.web = Some(text.to_string()),
            "PageCount" | "Count" => match text.parse::<i64>() {
                Ok(n) if n < 0 => {},
                Ok(n) => match (u32::try_from(n), element) {
                    (Ok(n), "PageCount") => m.page_count = Some(n),
                    (Ok(n), _) => m.count = Some(n),
                    (Err(_), _) => self.reject(element, text),
                },
                Err(_) => self.reject(element, text),
            },
            "StoryArc" => m.story_arc = Some(text.to_string()),
            "AgeRating" if !text.eq_ignore_ascii_case("unknown") => m.age_rating = Some(text.to_string()),
            "Characters" => m.characters.extend(split_list(text).map(str::to_string)),
            "Teams" => m.teams.extend(split_list(text).map(str::to_string)),
            "Locations" => m.locations.extend(split_list(text).map(str::to_string)),
            "Manga" => m.manga = yes_no(text),
            "BlackAndWhite" => m.black_and_white = yes_no(text),
            _ => {
                if let Some(role) = Role::ALL.into_iter().find(|role| role.element() == element) {
                    for name in split_list(text) {
                        m.credits.push(Credit { name: name.to_string(), role });
                    }
                }
            },
        }
    }

    fn page(&mut self, page: &BytesStart<'_>) {
        if self.metadata.cover_page.is_some() {
            return;
        }
        let mut image = None;
        let mut front_cover = false;
        for attribute in page.attributes().flatten() {
            let Ok(value) = attribute.unescape_value() else {
                continue;
            };
            match attribute.key.as_ref() {
                b"Image" => image = value.trim().parse::<usize>().ok(),
                b"Type" => front_cover = value.split_whitespace().any(|t| t == "FrontCover"),
                _ => {},
            }
        }
        if front_cover {
            self.metadata.cover_page = image;
        }
    }

    fn finish(mut self, malformed: bool) -> ComicInfo {
        let m = &mut self.metadata;
        if let (Some(year), Some(month), Some(day)) = (m.year, self.month, self.day) {
            m.published = Month::try_from(month).ok().and_then(|month| Date::from_calendar_date(year, month, day).ok());
        }
        for credit in &m.credits {
            if credit.role == Role::Writer {
                push_unique(&mut m.writers, &credit.name);
            } else if credit.role.is_artist() {
                push_unique(&mut m.artists, &credit.name);
            }
        }
        ComicInfo { metadata: self.metadata, malformed, rejected: self.rejected }
    }
}

fn split_list(text: &str) -> impl Iterator<Item = &str> {
    text.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn yes_no(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "yes" | "yesandrighttoleft" | "true" | "1" => Some(true),
        "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Parse ComicInfo.xml bytes. Never fails: everything read before a
/// syntax error is kept.
#[instrument(skip(xml), fields(xml_size = xml.len()))]
pub fn parse(xml: &[u8]) -> ComicInfo {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);
    let mut builder = Builder::default();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut buf = Vec::new();
    let malformed = loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, position = reader.buffer_position(), "ComicInfo.xml is malformed");
                break true;
            },
        };
        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                if name == "Page" && stack.last().is_some_and(|parent| parent == "Pages") {
                    builder.page(&start);
                }
                stack.push(name);
                text.clear();
            },
            Event::Empty(empty) => {
                if empty.local_name().as_ref() == b"Page" && stack.last().is_some_and(|parent| parent == "Pages") {
                    builder.page(&empty);
                }
            },
            Event::Text(content) => match content.unescape() {
                Ok(content) => text.push_str(&content),
                Err(e) => tracing::debug!(error = %e, "Skipping undecodable ComicInfo.xml text"),
            },
            Event::CData(content) => text.push_str(&String::from_utf8_lossy(&content)),
            Event::End(_) => {
                // Fields are direct children of the root element.
                if stack.len() == 2
                    && let Some(element) = stack.last()
                {
                    builder.assign(element, &text);
                }
                stack.pop();
                text.clear();
            },
            Event::Eof => break false,
            _ => {},
        }
        buf.clear();
    };
    builder.finish(malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SAGA: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ComicInfo xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <Title>Chapter One</Title>
  <Series>Saga</Series>
  <Number>1</Number>
  <Volume>2012</Volume>
  <Year>2012</Year>
  <Month>3</Month>
  <Day>14</Day>
  <Writer>Brian K. Vaughan</Writer>
  <Penciller>Fiona Staples</Penciller>
  <Colorist>Fiona Staples</Colorist>
  <Letterer>Fonografiks</Letterer>
  <Publisher>Image</Publisher>
  <Genre>Science Fiction, Fantasy</Genre>
  <Summary>When two soldiers &amp; lovers...</Summary>
  <LanguageISO>en</LanguageISO>
  <PageCount>44</PageCount>
  <Manga>No</Manga>
  <BlackAndWhite>Unknown</BlackAndWhite>
  <Pages>
    <Page Image="0" Type="FrontCover" ImageSize="12345" />
    <Page Image="1" />
  </Pages>
</ComicInfo>"#;

    #[test]
    fn full_document() {
        let info = parse(SAGA.as_bytes());
        assert!(!info.malformed);
        let m = info.metadata;
        assert_eq!(m.title.as_deref(), Some("Chapter One"));
        assert_eq!(m.series.as_deref(), Some("Saga"));
        assert_eq!(m.issue_number.map(|n| n.to_string()).as_deref(), Some("1"));
        assert_eq!(m.volume, Some(2012));
        assert_eq!(m.published, Date::from_calendar_date(2012, Month::March, 14).ok());
        assert_eq!(m.writers, ["Brian K. Vaughan"]);
        assert_eq!(m.artists, ["Fiona Staples"]);
        assert_eq!(m.credits.len(), 4);
        assert_eq!(m.credits[3], Credit { name: "Fonografiks".into(), role: Role::Letterer });
        assert_eq!(m.summary.as_deref(), Some("When two soldiers & lovers..."));
        assert!(m.genres.contains("Fantasy"));
        assert_eq!(m.page_count, Some(44));
        assert_eq!(m.manga, Some(false));
        assert_eq!(m.black_and_white, None);
        assert_eq!(m.cover_page, Some(0));
    }

    #[test]
    fn malformed_keeps_earlier_fields() {
        let xml = b"<ComicInfo><Title>Kept</Title><Series>Also kept</Series><Number>3</Numbr></ComicInfo>";
        let info = parse(xml);
        assert!(info.malformed);
        assert_eq!(info.metadata.title.as_deref(), Some("Kept"));
        assert_eq!(info.metadata.series.as_deref(), Some("Also kept"));
        assert_eq!(info.metadata.issue_number, None);
    }

    #[test]
    fn invalid_values_are_rejected_individually() {
        let xml = b"<ComicInfo><Number>twelve</Number><Year>MMX</Year><Series>Ok</Series><Volume>-1</Volume></ComicInfo>";
        let info = parse(xml);
        assert!(!info.malformed);
        assert_eq!(info.rejected, ["Number", "Year"]);
        assert_eq!(info.metadata.series.as_deref(), Some("Ok"));
        assert_eq!(info.metadata.volume, None);
    }

    #[test]
    fn comma_separated_creators() {
        let xml = b"<ComicInfo><Writer>Alan Moore, Neil Gaiman</Writer><Inker>A, B</Inker><CoverArtist>B</CoverArtist></ComicInfo>";
        let m = parse(xml).metadata;
        assert_eq!(m.writers, ["Alan Moore", "Neil Gaiman"]);
        assert_eq!(m.artists, ["A", "B"]);
    }

    #[test]
    fn empty_elements_are_absent() {
        let m = parse(b"<ComicInfo><Title></Title><Series>   </Series><Summary/></ComicInfo>").metadata;
        assert_eq!(m, ComicMetadata::default());
    }

    #[rstest]
    #[case(&["ComicInfo.xml", "001.jpg"], Some("ComicInfo.xml"))]
    #[case(&["sub/ComicInfo.xml", "comicinfo.XML"], Some("comicinfo.XML"))]
    #[case(&["a/comicinfo.xml", "b/ComicInfo.xml"], Some("a/comicinfo.xml"))]
    #[case(&["notes/ComicInfo.xml.bak", "001.jpg"], None)]
    fn locates_sidecar(#[case] names: &[&str], #[case] expected: Option<&str>) {
        assert_eq!(locate(names.iter().copied()), expected);
    }
}

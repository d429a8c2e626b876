//! The PDF document information dictionary, mapped onto [`ComicMetadata`].

use crate::consts::PDF_DATE_REGEX;
use crate::models::{ComicMetadata, push_unique};
use std::collections::BTreeMap;
use time::{Date, Month};

/// Years outside this range in `CreationDate` are authoring-tool noise.
const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1900..=2100;

fn text<'a>(info: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    info.get(key).map(|value| value.trim()).filter(|value| !value.is_empty())
}

/// Map `Title`, `Author`, `Subject`, `Keywords`, `Producer` and
/// `CreationDate`. Unknown keys are ignored.
pub fn from_document_info(info: &BTreeMap<String, String>) -> ComicMetadata {
    let mut metadata = ComicMetadata {
        title: text(info, "Title").map(str::to_string),
        summary: text(info, "Subject").map(str::to_string),
        publisher: text(info, "Producer").map(str::to_string),
        ..Default::default()
    };
    if let Some(authors) = text(info, "Author") {
        for author in authors.split(';').map(str::trim).filter(|a| !a.is_empty()) {
            push_unique(&mut metadata.writers, author);
        }
    }
    if let Some(keywords) = text(info, "Keywords") {
        metadata.tags = keywords
            .split([',', ';'])
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(created) = text(info, "CreationDate")
        && let Some(found) = PDF_DATE_REGEX.captures(created)
        && let Ok(year) = found[1].parse::<i32>()
        && PLAUSIBLE_YEARS.contains(&year)
    {
        metadata.year = Some(year);
        let part = |index: usize| found.get(index).and_then(|m| m.as_str().parse::<u8>().ok());
        if let (Some(month), Some(day)) = (part(2), part(3)) {
            metadata.published = Month::try_from(month)
                .ok()
                .and_then(|month| Date::from_calendar_date(year, month, day).ok());
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn info(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn maps_known_keys() {
        let metadata = from_document_info(&info(&[
            ("Title", "Watchmen #1"),
            ("Author", "Alan Moore; Dave Gibbons;"),
            ("Subject", "At midnight, all the agents"),
            ("Keywords", "superhero, mystery;noir"),
            ("Producer", "DC Comics"),
            ("CreationDate", "D:19860915120000+01'00'"),
            ("Creator", "ignored"),
        ]));
        assert_eq!(metadata.title.as_deref(), Some("Watchmen #1"));
        assert_eq!(metadata.writers, ["Alan Moore", "Dave Gibbons"]);
        assert_eq!(metadata.summary.as_deref(), Some("At midnight, all the agents"));
        assert_eq!(metadata.publisher.as_deref(), Some("DC Comics"));
        assert_eq!(metadata.tags.iter().map(String::as_str).collect::<Vec<_>>(), ["mystery", "noir", "superhero"]);
        assert_eq!(metadata.year, Some(1986));
        assert_eq!(metadata.published, Date::from_calendar_date(1986, Month::September, 15).ok());
    }

    #[rstest]
    #[case("D:2010", Some(2010), false)]
    #[case("20100314", Some(2010), true)]
    #[case("D:20101399", Some(2010), false)]
    #[case("D:18500101", None, false)]
    #[case("yesterday", None, false)]
    fn creation_dates(#[case] raw: &str, #[case] year: Option<i32>, #[case] full_date: bool) {
        let metadata = from_document_info(&info(&[("CreationDate", raw)]));
        assert_eq!(metadata.year, year);
        assert_eq!(metadata.published.is_some(), full_date);
    }

    #[test]
    fn blank_values_are_absent() {
        let metadata = from_document_info(&info(&[("Title", "  "), ("Author", " ; ")]));
        assert_eq!(metadata, ComicMetadata::default());
    }
}

//! Metadata guessed from a comic's file name.
//!
//! Handles the `Series - Issue (Year)` family of names that comic scanners
//! and store downloads produce, e.g. `Saga 001 (2012) (digital).cbz`.

use crate::IssueNumber;
use crate::consts::{
    SERIES_HASH_ISSUE_REGEX, SERIES_ISSUE_REGEX, SERIES_ISSUE_TITLE_REGEX, SERIES_VOLUME_ISSUE_REGEX,
    SERIES_VOLUME_REGEX, TRAILING_GROUP_REGEX, WHITESPACE_REGEX, YEAR_REGEX,
};
use crate::models::ComicMetadata;
use regex::Captures;

/// Parse a file stem (no directory, no extension).
///
/// Returns `None` when no pattern matches; the caller then falls back to
/// the bare stem as the title.
pub fn parse(stem: &str) -> Option<ComicMetadata> {
    let mut metadata = ComicMetadata::default();
    let mut name = stem.replace('_', " ");
    let year = YEAR_REGEX.captures(&name).and_then(|found| Some((found.get(0)?.range(), found[1].parse().ok())));
    if let Some((range, year)) = year {
        metadata.year = year;
        name.replace_range(range, " ");
    }
    while let Some(start) = TRAILING_GROUP_REGEX.find(&name).map(|group| group.start()) {
        name.truncate(start);
    }
    let name = WHITESPACE_REGEX.replace_all(name.trim(), " ").into_owned();
    if name.is_empty() {
        return metadata.year.is_some().then_some(metadata);
    }

    let matched = if let Some(found) = SERIES_ISSUE_TITLE_REGEX.captures(&name) {
        series_and_issue(&mut metadata, &found);
        metadata.title = Some(found["title"].trim().to_string());
        true
    } else if let Some(found) = SERIES_VOLUME_ISSUE_REGEX.captures(&name) {
        series_and_issue(&mut metadata, &found);
        metadata.volume = found["volume"].parse().ok();
        true
    } else if let Some(found) = SERIES_VOLUME_REGEX.captures(&name) {
        metadata.series = Some(found["series"].trim().to_string());
        metadata.volume = found["volume"].parse().ok();
        true
    } else if let Some(found) = SERIES_HASH_ISSUE_REGEX.captures(&name) {
        series_and_issue(&mut metadata, &found);
        true
    } else if let Some(found) = SERIES_ISSUE_REGEX.captures(&name) {
        series_and_issue(&mut metadata, &found);
        true
    } else if metadata.year.is_some() {
        metadata.series = Some(name.clone());
        true
    } else {
        false
    };
    if !matched {
        return None;
    }
    if metadata.title.is_none() {
        metadata.title = metadata.series.clone();
    }
    Some(metadata)
}

fn series_and_issue(metadata: &mut ComicMetadata, found: &Captures<'_>) {
    let series = found["series"].trim().trim_end_matches('-').trim();
    if !series.is_empty() {
        metadata.series = Some(series.to_string());
    }
    metadata.issue_number = found["issue"].parse::<IssueNumber>().ok();
}

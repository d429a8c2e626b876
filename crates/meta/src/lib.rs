//! Comic metadata from every source a container offers, normalized into
//! one [`ComicMetadata`].
//!
//! Sources are layered, highest precedence first:
//!
//! 1. an embedded ComicInfo.xml sidecar,
//! 2. the PDF document information dictionary,
//! 3. heuristics over the file name.
//!
//! A lower layer only fills fields the layers above it left empty, and each
//! field remembers which layer it came from.

pub mod comicinfo;
mod consts;
pub mod error;
pub mod filename;
mod issue;
mod models;
pub mod pdf;

pub use crate::issue::IssueNumber;
pub use crate::models::{ComicMetadata, Credit, Field, Role, Source};
use std::collections::BTreeMap;
use tracing::instrument;

/// The raw inputs for [`extract`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Sources<'a> {
    /// File name without directory or extension.
    pub stem: &'a str,
    /// Bytes of the container's ComicInfo.xml, when it has one.
    pub comic_info: Option<&'a [u8]>,
    /// PDF document information dictionary, for PDF containers.
    pub document_info: Option<&'a BTreeMap<String, String>>,
}

/// Merge every available source into one record.
///
/// Never fails. Unusable values are dropped field by field, and when no
/// source provides a title the bare file stem is used (without provenance,
/// so [`ComicMetadata::source`] still reports what was actually found).
#[instrument(skip(sources), fields(stem = sources.stem, comic_info = sources.comic_info.is_some()))]
pub fn extract(sources: &Sources<'_>) -> ComicMetadata {
    let mut metadata = ComicMetadata::default();

    if let Some(xml) = sources.comic_info {
        let info = comicinfo::parse(xml);
        if info.malformed {
            tracing::warn!("ComicInfo.xml is malformed, keeping the fields read before the error");
        }
        if !info.rejected.is_empty() {
            tracing::debug!(rejected = ?info.rejected, "Dropped unusable ComicInfo.xml values");
        }
        metadata.fill_from(info.metadata, Source::Embedded);
    }
    if let Some(info) = sources.document_info {
        metadata.fill_from(pdf::from_document_info(info), Source::Embedded);
    }
    if let Some(guessed) = filename::parse(sources.stem) {
        metadata.fill_from(guessed, Source::FilenameHeuristic);
    }

    if metadata.title.is_none() {
        let stem = sources.stem.trim();
        if !stem.is_empty() {
            metadata.title = Some(stem.to_string());
        }
    }
    tracing::debug!(source = ?metadata.source, fields = metadata.provenance.len(), "Extracted metadata");
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMIC_INFO: &[u8] = b"<ComicInfo><Series>Saga</Series><Number>7</Number><Writer>Brian K. Vaughan</Writer></ComicInfo>";

    #[test]
    fn embedded_beats_filename() {
        let metadata = extract(&Sources {
            stem: "Something Else 012 (2014)",
            comic_info: Some(COMIC_INFO),
            document_info: None,
        });
        assert_eq!(metadata.series.as_deref(), Some("Saga"));
        assert_eq!(metadata.issue_number, Some(IssueNumber::whole(7)));
        // The sidecar has no year or title; those come from the name.
        assert_eq!(metadata.year, Some(2014));
        assert_eq!(metadata.title.as_deref(), Some("Something Else"));
        assert_eq!(metadata.source_of(Field::Series), Source::Embedded);
        assert_eq!(metadata.source_of(Field::Year), Source::FilenameHeuristic);
        assert_eq!(metadata.source, Source::Embedded);
    }

    #[test]
    fn comic_info_beats_document_info() {
        let info: BTreeMap<String, String> = [("Title", "From PDF"), ("Author", "PDF Author"), ("Producer", "Press")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let metadata = extract(&Sources { stem: "scan", comic_info: Some(COMIC_INFO), document_info: Some(&info) });
        assert_eq!(metadata.writers, ["Brian K. Vaughan"]);
        assert_eq!(metadata.title.as_deref(), Some("From PDF"));
        assert_eq!(metadata.publisher.as_deref(), Some("Press"));
        assert_eq!(metadata.source_of(Field::Title), Source::Embedded);
    }

    #[test]
    fn filename_only() {
        let metadata = extract(&Sources { stem: "Series 001 (2010)", ..Default::default() });
        assert_eq!(metadata.series.as_deref(), Some("Series"));
        assert_eq!(metadata.issue_number, Some(IssueNumber::whole(1)));
        assert_eq!(metadata.year, Some(2010));
        assert_eq!(metadata.source, Source::FilenameHeuristic);
    }

    #[test]
    fn bare_stem_fallback() {
        let metadata = extract(&Sources { stem: "scan", ..Default::default() });
        assert_eq!(metadata.title.as_deref(), Some("scan"));
        assert_eq!(metadata.source, Source::None);
        assert_eq!(metadata.source_of(Field::Title), Source::None);
    }

    #[test]
    fn malformed_sidecar_still_contributes() {
        let metadata = extract(&Sources {
            stem: "Fallback 002",
            comic_info: Some(b"<ComicInfo><Title>Partial</Title><Series>".as_slice()),
            document_info: None,
        });
        assert_eq!(metadata.title.as_deref(), Some("Partial"));
        assert_eq!(metadata.series.as_deref(), Some("Fallback"));
        assert_eq!(metadata.source_of(Field::Series), Source::FilenameHeuristic);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_issue_numbers_as_strings() {
        let metadata = extract(&Sources { stem: "Series #12.50", ..Default::default() });
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["issue_number"], "12.5");
    }
}

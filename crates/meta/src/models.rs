use crate::IssueNumber;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::Date;

/// Where a metadata value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Source {
    /// Structured data inside the container (ComicInfo.xml, PDF info).
    Embedded,
    /// Parsed out of the file name.
    FilenameHeuristic,
    /// Nothing was found.
    #[default]
    None,
}

/// Every field of [`ComicMetadata`] that carries its own provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Field {
    Title,
    Series,
    IssueNumber,
    Volume,
    Publisher,
    Year,
    Published,
    Writers,
    Artists,
    Credits,
    Summary,
    Tags,
    Genres,
    Language,
    Web,
    PageCount,
    Count,
    StoryArc,
    AgeRating,
    Notes,
    Characters,
    Teams,
    Locations,
    Manga,
    BlackAndWhite,
    CoverPage,
}

/// A creator's job on the book, as ComicInfo.xml names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Role {
    Writer,
    Penciller,
    Inker,
    Colorist,
    Letterer,
    CoverArtist,
    Editor,
}
impl Role {
    pub const ALL: [Role; 7] = [
        Role::Writer,
        Role::Penciller,
        Role::Inker,
        Role::Colorist,
        Role::Letterer,
        Role::CoverArtist,
        Role::Editor,
    ];

    /// The ComicInfo.xml element holding this role's names.
    pub fn element(&self) -> &'static str {
        match self {
            Role::Writer => "Writer",
            Role::Penciller => "Penciller",
            Role::Inker => "Inker",
            Role::Colorist => "Colorist",
            Role::Letterer => "Letterer",
            Role::CoverArtist => "CoverArtist",
            Role::Editor => "Editor",
        }
    }

    /// Whether this role counts towards [`ComicMetadata::artists`].
    pub fn is_artist(&self) -> bool {
        matches!(self, Role::Penciller | Role::Inker | Role::Colorist | Role::CoverArtist)
    }
}
impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.element())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Credit {
    pub name: String,
    pub role: Role,
}

/// Canonical, format-independent comic metadata.
///
/// Absent values are `None` or empty, never empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ComicMetadata {
    pub title: Option<String>,
    pub series: Option<String>,
    pub issue_number: Option<IssueNumber>,
    pub volume: Option<u32>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    /// Full publication date, when year, month and day are all known.
    pub published: Option<Date>,
    /// Ordered, de-duplicated.
    pub writers: Vec<String>,
    /// Pencillers, inkers, colorists and cover artists, ordered and
    /// de-duplicated.
    pub artists: Vec<String>,
    /// Every creator with their role, in document order.
    pub credits: Vec<Credit>,
    pub summary: Option<String>,
    pub tags: BTreeSet<String>,
    pub genres: BTreeSet<String>,
    /// ISO language code.
    pub language: Option<String>,
    pub web: Option<String>,
    /// Page count as declared by the sidecar. The container's own page
    /// count is authoritative.
    pub page_count: Option<u32>,
    /// Issues in the series.
    pub count: Option<u32>,
    pub story_arc: Option<String>,
    pub age_rating: Option<String>,
    pub notes: Option<String>,
    pub characters: Vec<String>,
    pub teams: Vec<String>,
    pub locations: Vec<String>,
    pub manga: Option<bool>,
    pub black_and_white: Option<bool>,
    /// Reading-order index of the page marked as the front cover.
    pub cover_page: Option<usize>,
    /// [`Source::Embedded`] if any field came from embedded data, else
    /// [`Source::FilenameHeuristic`] if any came from the file name.
    pub source: Source,
    /// Per-field source of every field that has a value.
    pub provenance: BTreeMap<Field, Source>,
}

/// Whether a field holds a value.
trait Present {
    fn is_present(&self) -> bool;
}
impl<T> Present for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}
impl<T> Present for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}
impl<T> Present for BTreeSet<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

fn fill<T: Present>(
    slot: &mut T,
    value: T,
    field: Field,
    source: Source,
    provenance: &mut BTreeMap<Field, Source>,
) {
    if !slot.is_present() && value.is_present() {
        *slot = value;
        provenance.insert(field, source);
    }
}

impl ComicMetadata {
    /// Take every field `other` has and `self` lacks, recording `source`
    /// as its provenance. Fields `self` already holds are never replaced.
    pub fn fill_from(&mut self, other: ComicMetadata, source: Source) {
        // Destructured so a new field can't be forgotten here.
        let ComicMetadata {
            title,
            series,
            issue_number,
            volume,
            publisher,
            year,
            published,
            writers,
            artists,
            credits,
            summary,
            tags,
            genres,
            language,
            web,
            page_count,
            count,
            story_arc,
            age_rating,
            notes,
            characters,
            teams,
            locations,
            manga,
            black_and_white,
            cover_page,
            source: _,
            provenance: _,
        } = other;
        let p = &mut self.provenance;
        fill(&mut self.title, title, Field::Title, source, p);
        fill(&mut self.series, series, Field::Series, source, p);
        fill(&mut self.issue_number, issue_number, Field::IssueNumber, source, p);
        fill(&mut self.volume, volume, Field::Volume, source, p);
        fill(&mut self.publisher, publisher, Field::Publisher, source, p);
        fill(&mut self.year, year, Field::Year, source, p);
        fill(&mut self.published, published, Field::Published, source, p);
        fill(&mut self.writers, writers, Field::Writers, source, p);
        fill(&mut self.artists, artists, Field::Artists, source, p);
        fill(&mut self.credits, credits, Field::Credits, source, p);
        fill(&mut self.summary, summary, Field::Summary, source, p);
        fill(&mut self.tags, tags, Field::Tags, source, p);
        fill(&mut self.genres, genres, Field::Genres, source, p);
        fill(&mut self.language, language, Field::Language, source, p);
        fill(&mut self.web, web, Field::Web, source, p);
        fill(&mut self.page_count, page_count, Field::PageCount, source, p);
        fill(&mut self.count, count, Field::Count, source, p);
        fill(&mut self.story_arc, story_arc, Field::StoryArc, source, p);
        fill(&mut self.age_rating, age_rating, Field::AgeRating, source, p);
        fill(&mut self.notes, notes, Field::Notes, source, p);
        fill(&mut self.characters, characters, Field::Characters, source, p);
        fill(&mut self.teams, teams, Field::Teams, source, p);
        fill(&mut self.locations, locations, Field::Locations, source, p);
        fill(&mut self.manga, manga, Field::Manga, source, p);
        fill(&mut self.black_and_white, black_and_white, Field::BlackAndWhite, source, p);
        fill(&mut self.cover_page, cover_page, Field::CoverPage, source, p);
        self.source = self.aggregate_source();
    }

    fn aggregate_source(&self) -> Source {
        let sources = self.provenance.values();
        sources.copied().min().unwrap_or(Source::None)
    }

    /// Source of one field, [`Source::None`] when it has no value.
    pub fn source_of(&self, field: Field) -> Source {
        self.provenance.get(&field).copied().unwrap_or_default()
    }
}

/// Push `name` unless it's already there.
pub(crate) fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|existing| existing == name) {
        list.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_never_overwrites() {
        let mut embedded = ComicMetadata::default();
        embedded.fill_from(
            ComicMetadata { title: Some("Embedded".into()), ..Default::default() },
            Source::Embedded,
        );
        embedded.fill_from(
            ComicMetadata {
                title: Some("Heuristic".into()),
                year: Some(2010),
                ..Default::default()
            },
            Source::FilenameHeuristic,
        );
        assert_eq!(embedded.title.as_deref(), Some("Embedded"));
        assert_eq!(embedded.year, Some(2010));
        assert_eq!(embedded.source_of(Field::Title), Source::Embedded);
        assert_eq!(embedded.source_of(Field::Year), Source::FilenameHeuristic);
        assert_eq!(embedded.source_of(Field::Series), Source::None);
        assert_eq!(embedded.source, Source::Embedded);
    }

    #[test]
    fn heuristic_only_source() {
        let mut metadata = ComicMetadata::default();
        metadata.fill_from(ComicMetadata { year: Some(1999), ..Default::default() }, Source::FilenameHeuristic);
        assert_eq!(metadata.source, Source::FilenameHeuristic);
        let mut empty = ComicMetadata::default();
        empty.fill_from(ComicMetadata::default(), Source::Embedded);
        assert_eq!(empty.source, Source::None);
    }
}

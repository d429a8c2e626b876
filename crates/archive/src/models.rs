use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// How a backend addresses one readable unit of a container.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryRef {
    /// An archive member, by its full stored name.
    Member(String),
    /// A PDF page, 1-based.
    Page(u32),
}

impl Display for EntryRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            EntryRef::Member(name) => f.write_str(name),
            EntryRef::Page(number) => write!(f, "page {number}"),
        }
    }
}

/// One item of a container listing. Listing never decodes image data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub entry_ref: EntryRef,
    /// Display name: the member path, or `page-N` for PDF pages.
    pub name: String,
    /// Uncompressed size, as declared by the container.
    pub size: u64,
    pub is_dir: bool,
    /// Set when the listing itself already shows the entry can't be read
    /// (data past end-of-file, encrypted member, bad local header).
    pub damage: Option<String>,
}

impl Entry {
    pub fn member(name: impl Into<String>, size: u64) -> Self {
        let name = name.into();
        Self {
            entry_ref: EntryRef::Member(name.clone()),
            name,
            size,
            is_dir: false,
            damage: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self { is_dir: true, ..Self::member(name, 0) }
    }

    pub fn with_damage(mut self, reason: impl Into<String>) -> Self {
        self.damage = Some(reason.into());
        self
    }
}

/// The structural index of a container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub entries: Vec<Entry>,
    /// The container's own index was damaged: the listing ended early on a
    /// structural error, or had to be rebuilt from a linear scan. Entries
    /// that *were* listed are still usable.
    pub damaged: bool,
}

/// How member data can be reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Any member can be read independently.
    Random,
    /// Members share one compression stream; reading any of them means
    /// decompressing everything before it. Backends extract these once, in
    /// full, to a scratch directory.
    Solid,
}

/// A PDF document-information dictionary, with keys as they appear in the
/// file (`Title`, `Author`, `CreationDate`, ...) and text values decoded.
pub type DocumentInfo = BTreeMap<String, String>;

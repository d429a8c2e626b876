use comix_archive::EntryRef;
use comix_format::ImageFormat;

/// One page of a comic, in reading order.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PageEntry {
    /// 0-based position in reading order. Contiguous and stable across
    /// re-opens of the same file.
    pub index: usize,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub entry_ref: EntryRef,
    /// Archive member name, or `page-N` for PDF pages.
    pub name: String,
    /// Declared uncompressed size; zero for PDF pages.
    pub size_bytes: u64,
    /// Read from the entry's leading bytes when the container was probed,
    /// never from the name.
    pub declared_image_format: Option<ImageFormat>,
}

/// How much of a container could be indexed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
pub enum IntegrityStatus {
    #[default]
    Clean,
    /// Some pages are known to be damaged, or the container's own index
    /// had to be recovered. Every other page is readable.
    PartiallyCorrupted {
        /// Indexes of pages that were found damaged while opening. They
        /// still count towards the page count.
        skipped_pages: Vec<usize>,
        /// The container's index was cut short or rebuilt by scanning.
        structure_damaged: bool,
    },
    /// No page index could be built. Only reported by
    /// [`Engine::check`](crate::Engine::check); `open` fails instead.
    Unreadable,
}

impl IntegrityStatus {
    pub(crate) fn from_damage(skipped_pages: Vec<usize>, structure_damaged: bool) -> Self {
        if skipped_pages.is_empty() && !structure_damaged {
            Self::Clean
        } else {
            Self::PartiallyCorrupted { skipped_pages, structure_damaged }
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Pages skipped while opening; empty unless partially corrupted.
    pub fn skipped_pages(&self) -> &[usize] {
        match self {
            Self::PartiallyCorrupted { skipped_pages, .. } => skipped_pages,
            _ => &[],
        }
    }
}

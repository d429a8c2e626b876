//! Turning a container listing into pages in reading order.

use crate::models::PageEntry;
use comix_archive::{Backend, Entry, EntryRef, Listing};
use comix_format::ImageFormat;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

/// Directories that hold previews rather than pages.
const THUMBNAIL_DIRS: [&str; 4] = ["thumbs", "thumbnails", ".thumbnails", "@eadir"];

pub(crate) struct PageIndex {
    pub pages: Vec<PageEntry>,
    /// Page index to the reason it was skipped.
    pub skipped: BTreeMap<usize, String>,
    pub structure_damaged: bool,
}

/// Whether a listed entry can be a page at all. Non-page entries (sidecars,
/// text files) stay available to the metadata normalizer.
pub(crate) fn is_page_candidate(entry: &Entry) -> bool {
    if entry.is_dir {
        return false;
    }
    match &entry.entry_ref {
        EntryRef::Page(_) => true,
        EntryRef::Member(name) => {
            let mut components = name.split(['/', '\\']).filter(|c| !c.is_empty()).peekable();
            while let Some(component) = components.next() {
                let is_last = components.peek().is_none();
                if component.starts_with('.') || component == "__MACOSX" {
                    return false;
                }
                if !is_last && THUMBNAIL_DIRS.iter().any(|dir| component.eq_ignore_ascii_case(dir)) {
                    return false;
                }
            }
            ImageFormat::from_path(name).is_some()
        },
    }
}

/// Reading order: numeric-aware and case-insensitive, falling back to byte
/// order so the result never depends on the listing order.
pub(crate) fn reading_order(a: &Entry, b: &Entry) -> Ordering {
    match (&a.entry_ref, &b.entry_ref) {
        (EntryRef::Page(x), EntryRef::Page(y)) => x.cmp(y),
        _ => natord::compare_ignore_case(&a.name, &b.name).then_with(|| a.name.cmp(&b.name)),
    }
}

/// Build the page index. With `probe` set, every page's leading bytes are
/// read to find damaged entries and record the image format.
#[instrument(skip_all, fields(entries = listing.entries.len(), probe = probe))]
pub(crate) fn build(listing: &Listing, backend: &dyn Backend, probe: bool) -> PageIndex {
    // A name listed twice is read as its last copy.
    let mut latest: HashMap<&str, &Entry> = HashMap::new();
    for entry in listing.entries.iter().filter(|entry| is_page_candidate(entry)) {
        latest.insert(entry.name.as_str(), entry);
    }
    let mut candidates: Vec<&Entry> = latest.into_values().collect();
    candidates.sort_by(|a, b| reading_order(a, b));

    let mut pages = Vec::with_capacity(candidates.len());
    let mut skipped = BTreeMap::new();
    for (index, entry) in candidates.into_iter().enumerate() {
        let mut declared_image_format = None;
        let damage = if let Some(reason) = &entry.damage {
            Some(reason.clone())
        } else if matches!(entry.entry_ref, EntryRef::Member(_)) && entry.size == 0 {
            Some("empty entry".to_string())
        } else if probe {
            match backend.probe(&entry.entry_ref) {
                Ok(Some(format)) => {
                    declared_image_format = Some(format);
                    (!comix_render::is_decodable(format)).then(|| format!("unsupported image format: {format}"))
                },
                Ok(None) => Some("no image signature".to_string()),
                Err(e) => Some((*e).to_string()),
            }
        } else {
            None
        };
        if let Some(reason) = damage {
            tracing::warn!(index, entry = %entry.name, %reason, "Skipping damaged page");
            skipped.insert(index, reason);
        }
        pages.push(PageEntry {
            index,
            entry_ref: entry.entry_ref.clone(),
            name: entry.name.clone(),
            size_bytes: entry.size,
            declared_image_format,
        });
    }
    tracing::debug!(pages = pages.len(), skipped = skipped.len(), "Built page index");
    PageIndex { pages, skipped, structure_damaged: listing.damaged }
}

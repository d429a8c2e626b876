//! In-memory cache of decoded comic pages and covers.
//!
//! Values are keyed by a [`ContainerKey`] (a BLAKE3 digest of the file's
//! path, modification time and size) and a [`Slot`] within that container.
//! The cache is never persisted and is never global: an engine creates one
//! and shares it between every container it opens.
//!
//! # Architecture
//! - **Budget**: the sum of [`Weigh::weight`] over resident values. Least
//!   recently used values are evicted once an insert goes over it.
//! - **Staleness**: the cache remembers the newest key per path. Presenting
//!   a newer key for the same path (the file was modified) drops the old
//!   key's entries on that lookup or insert; an older key only misses.

pub mod error;
mod key;
mod store;

pub use crate::key::ContainerKey;
pub use crate::store::{CacheStats, ExtractionCache};
use comix_render::PageImage;

/// Where in a container a cached value belongs.
///
/// Pages and covers never share a slot, even for the same page, and each
/// requested size is its own slot (`None` is the page's native size).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Page { index: usize, max_dimension: Option<u32> },
    Cover { max_dimension: Option<u32> },
}

/// The cost of keeping a value resident.
pub trait Weigh {
    fn weight(&self) -> u64;
}

impl Weigh for PageImage {
    fn weight(&self) -> u64 {
        self.len() as u64
    }
}

/// The cache the engine uses.
pub type PageCache = ExtractionCache<PageImage>;

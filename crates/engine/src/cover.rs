//! Cover derivation.

use crate::container::Inner;
use crate::error::{ErrorKind, Result};
use comix_cache::Slot;
use comix_render::{PageImage, scale};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

impl Inner {
    /// Candidate pages in the order they are tried: the sidecar's front
    /// cover first, then every page in reading order.
    pub(crate) fn cover_candidates(&self) -> impl Iterator<Item = usize> + '_ {
        let marked = self.metadata.cover_page.filter(|index| *index < self.pages.len());
        marked
            .into_iter()
            .chain((0..self.pages.len()).filter(move |index| Some(*index) != marked))
            .filter(|index| !self.skipped.contains_key(index))
    }

    #[instrument(skip(self, token), fields(path = %self.path.display()))]
    pub(crate) fn cover(&self, max_dimension: Option<u32>, token: &CancellationToken) -> Result<PageImage> {
        self.ensure_open()?;
        let slot = Slot::Cover { max_dimension };
        if let Some(hit) = self.cache.get(&self.key, slot) {
            return Ok(hit);
        }
        for index in self.cover_candidates() {
            let native = match self.native_page(index, token) {
                Ok(native) => native,
                Err(err) if matches!(&*err, ErrorKind::Cancelled | ErrorKind::Closed) => return Err(err),
                Err(err) => {
                    tracing::debug!(index, error = %(*err).to_string(), "Cover candidate unreadable");
                    continue;
                },
            };
            // Fully decoded either way: a page with a valid header and a
            // corrupt body is not a cover.
            let cover = match max_dimension {
                Some(max_dimension) => scale::thumbnail(&native, max_dimension),
                None => scale::decode(&native).map(|_| native),
            };
            match cover {
                Ok(cover) => {
                    if token.is_cancelled() {
                        exn::bail!(ErrorKind::Cancelled);
                    }
                    tracing::debug!(index, width = cover.width, height = cover.height, "Derived cover");
                    self.cache.insert(&self.key, slot, cover.clone());
                    return Ok(cover);
                },
                Err(err) => tracing::debug!(index, error = %(*err).to_string(), "Cover candidate does not decode"),
            }
        }
        exn::bail!(ErrorKind::NoCoverAvailable)
    }
}

#[cfg(test)]
mod tests {
    use crate::ErrorKind;
    use crate::tests::{engine, open_mock};
    use comix_archive::backend::MockBackend;
    use comix_archive::fixtures;
    use comix_format::ImageFormat;
    use std::sync::Arc;

    const SIDECAR: &[u8] = br#"<ComicInfo><Pages><Page Image="2" Type="FrontCover"/></Pages></ComicInfo>"#;

    #[tokio::test]
    async fn first_decodable_page() {
        let engine = engine(1 << 20);
        let mut corrupt = fixtures::png(64, 64, 1);
        corrupt.truncate(45);
        let backend = Arc::new(MockBackend::with_entries([
            ("01.png", corrupt),
            ("02.png", fixtures::png(900, 600, 2)),
            ("03.png", fixtures::png(10, 10, 3)),
        ]));
        let container = open_mock(&engine, backend.clone()).await;
        let cover = container.cover(Some(450)).await.unwrap();
        assert_eq!(cover.format, ImageFormat::Jpeg);
        assert_eq!((cover.width, cover.height), (450, 300));
        // Page three was never touched.
        assert_eq!(backend.reads(), 2);

        let again = container.cover(Some(450)).await.unwrap();
        assert!(Arc::ptr_eq(&cover.bytes, &again.bytes));
        assert_eq!(backend.reads(), 2);
    }

    #[tokio::test]
    async fn marked_front_cover_wins() {
        let engine = engine(1 << 20);
        let backend = Arc::new(MockBackend::with_entries([
            ("ComicInfo.xml", SIDECAR.to_vec()),
            ("01.png", fixtures::png(20, 20, 1)),
            ("02.png", fixtures::png(20, 20, 2)),
            ("03.png", fixtures::png(30, 10, 3)),
        ]));
        let container = open_mock(&engine, backend).await;
        assert_eq!(container.metadata().cover_page, Some(2));
        let cover = container.cover(None).await.unwrap();
        assert_eq!((cover.width, cover.height), (30, 10));
        assert_eq!(cover.format, ImageFormat::Png);
    }

    #[tokio::test]
    async fn native_and_thumbnail_slots_are_separate() {
        let engine = engine(1 << 20);
        let backend = Arc::new(MockBackend::with_entries([("01.png", fixtures::png(100, 50, 1))]));
        let container = open_mock(&engine, backend).await;
        let native = container.cover(None).await.unwrap();
        let thumbnail = container.cover(Some(10)).await.unwrap();
        assert_eq!(native.format, ImageFormat::Png);
        assert_eq!((thumbnail.width, thumbnail.height), (10, 5));
        // Never upscaled.
        let large = container.cover(Some(1000)).await.unwrap();
        assert_eq!(large.longest_side(), 100);
        assert_eq!(large.format, ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn no_cover_available() {
        let engine = engine(1 << 20);
        let mut corrupt = fixtures::png(64, 64, 1);
        corrupt.truncate(45);
        let backend = Arc::new(MockBackend::with_entries([("01.png", corrupt), ("02.png", Vec::new())]));
        let container = open_mock(&engine, backend).await;
        let err = container.cover(Some(100)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NoCoverAvailable);
    }
}

//! Open comic book containers as uniform, page-addressable comics.
//!
//! An [`Engine`] turns a path into a [`ComicContainer`]: the format is
//! sniffed from the file's leading bytes, the pages are indexed in reading
//! order, damaged pages are set aside without failing the whole comic, and
//! metadata is normalized from every source the container offers. Page
//! images are only decoded when asked for, and go through a byte-budgeted
//! cache shared by every container the engine opened.
//!
//! ```no_run
//! # async fn run() -> comix_engine::error::Result<()> {
//! use comix_engine::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::default());
//! let comic = engine.open("Saga 001 (2012).cbz").await?;
//! println!("{} pages, {:?}", comic.page_count(), comic.integrity());
//! let cover = comic.cover(Some(450)).await?;
//! # Ok(())
//! # }
//! ```

mod container;
mod cover;
mod engine;
pub mod error;
mod index;
mod models;
pub mod scan;

pub use crate::container::ComicContainer;
pub use crate::engine::Engine;
pub use crate::error::ErrorKind;
pub use crate::models::{IntegrityStatus, PageEntry};
pub use comix_config::EngineConfig;
pub use comix_format::{Format, ImageFormat};
pub use comix_meta::{ComicMetadata, Credit, Field, IssueNumber, Role, Source};
pub use comix_render::PageImage;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use comix_archive::backend::MockBackend;
    use comix_archive::fixtures;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    pub(crate) fn engine(budget: u64) -> Engine {
        Engine::new(EngineConfig { cache_budget_bytes: budget, probe_on_open: true, ..EngineConfig::default() })
    }

    pub(crate) async fn open_mock(engine: &Engine, backend: Arc<MockBackend>) -> ComicContainer {
        engine.open_with_backend("/comics/Mock Comic 001 (2020).cbz", backend).await.unwrap()
    }

    fn write(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn metadata_falls_back_to_the_file_name() {
        let engine = engine(1 << 20);
        let backend = Arc::new(MockBackend::with_entries([("01.png", fixtures::png(4, 4, 1))]));
        let container = open_mock(&engine, backend).await;
        let metadata = container.metadata();
        assert_eq!(metadata.series.as_deref(), Some("Mock Comic"));
        assert_eq!(metadata.issue_number, Some(IssueNumber::whole(1)));
        assert_eq!(metadata.year, Some(2020));
        assert_eq!(metadata.source, Source::FilenameHeuristic);
    }

    #[tokio::test]
    async fn opens_a_zip_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = b"<ComicInfo><Series>Saga</Series><Number>1</Number><Writer>Brian K. Vaughan</Writer></ComicInfo>";
        let page = fixtures::png(30, 40, 1);
        let bytes = fixtures::zip(&[
            ("ComicInfo.xml", sidecar.as_slice()),
            ("002.png", page.as_slice()),
            ("001.png", page.as_slice()),
            ("__MACOSX/._001.png", b"resource fork".as_slice()),
        ]);
        let path = write(&dir, "whatever.cbz", &bytes);

        let engine = engine(1 << 20);
        let container = engine.open(&path).await.unwrap();
        assert_eq!(container.format(), Format::Zip);
        assert_eq!(container.page_count(), 2);
        assert_eq!(container.pages()[0].name, "001.png");
        assert_eq!(container.pages()[0].declared_image_format, Some(ImageFormat::Png));
        assert!(container.integrity().is_clean());
        assert_eq!(container.metadata().series.as_deref(), Some("Saga"));
        assert_eq!(container.metadata().writers, ["Brian K. Vaughan"]);
        assert_eq!(container.metadata().source_of(Field::Series), Source::Embedded);

        let image = container.read_page(1, None).await.unwrap();
        assert_eq!((image.width, image.height), (30, 40));
    }

    #[tokio::test]
    async fn format_comes_from_content_not_extension() {
        let dir = tempfile::tempdir().unwrap();
        let page = fixtures::png(8, 8, 1);
        let path = write(&dir, "Mislabelled 002.cbr", &fixtures::tar(&[("p1.png", page.as_slice())]));
        let container = engine(1 << 20).open(&path).await.unwrap();
        assert_eq!(container.format(), Format::Tar);
        assert_eq!(container.page_count(), 1);
    }

    #[tokio::test]
    async fn opens_a_pdf_with_document_info() {
        let dir = tempfile::tempdir().unwrap();
        let info = BTreeMap::from([("Title", "Document Title"), ("Author", "Jane Doe; John Roe")]);
        let pages = vec![(40, 20, fixtures::jpeg(40, 20, 1)), (40, 20, fixtures::jpeg(40, 20, 2))];
        let path = write(&dir, "scan.pdf", &fixtures::pdf(&pages, &info));

        let container = engine(1 << 20).open(&path).await.unwrap();
        assert_eq!(container.format(), Format::Pdf);
        assert_eq!(container.page_count(), 2);
        assert_eq!(container.metadata().title.as_deref(), Some("Document Title"));
        assert_eq!(container.metadata().writers, ["Jane Doe", "John Roe"]);
    }

    #[tokio::test]
    async fn text_files_are_not_comics() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "notes.txt", b"just some notes, nothing to see here");
        let err = engine(1 << 20).open(&path).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownFormat(_)));
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = engine(1 << 20).open(dir.path().join("gone.cbz")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn check_reports_unreadable_containers() {
        let dir = tempfile::tempdir().unwrap();
        // A ZIP signature followed by nothing usable.
        let mut bytes = b"PK\x03\x04".to_vec();
        bytes.extend(std::iter::repeat_n(0xA5, 64));
        let path = write(&dir, "broken.cbz", &bytes);

        let engine = engine(1 << 20);
        assert_eq!(engine.check(&path).await.unwrap(), IntegrityStatus::Unreadable);
        let err = engine.open(&path).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unreadable(_)));
    }

    #[tokio::test]
    async fn containers_without_pages_are_unreadable() {
        let backend = Arc::new(MockBackend::with_entries([("ComicInfo.xml", b"<ComicInfo/>".to_vec())]));
        let err = engine(1 << 20).open_with_backend("/comics/empty.cbz", backend.clone()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unreadable(_)));
        assert!(backend.is_closed());
    }

    #[tokio::test]
    async fn solid_archives_are_not_probed() {
        let page = fixtures::png(4, 4, 1);
        let backend =
            Arc::new(MockBackend::with_entries([("1.png", page.clone()), ("2.png", b"garbage".to_vec())]).solid());
        let container = open_mock(&engine(1 << 20), backend.clone()).await;
        assert!(container.integrity().is_clean());
        assert_eq!(backend.head_reads(), 0);

        container.read_page(0, None).await.unwrap();
        assert_eq!(backend.extractions(), 1);
        let err = container.read_page(1, None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::EntryRead { index: 1, .. }));
        assert_eq!(backend.extractions(), 1);
    }

    #[tokio::test]
    async fn partially_corrupted_containers_open() {
        let page = fixtures::png(4, 4, 1);
        let backend = Arc::new(
            MockBackend::with_entries([("1.png", page.clone()), ("2.png", page.clone()), ("3.png", Vec::new())])
                .with_damaged_listing(),
        );
        let container = open_mock(&engine(1 << 20), backend).await;
        assert_eq!(container.page_count(), 3);
        assert_eq!(
            *container.integrity(),
            IntegrityStatus::PartiallyCorrupted { skipped_pages: vec![2], structure_damaged: true }
        );
    }

    #[tokio::test]
    async fn modified_files_never_serve_stale_pages() {
        let dir = tempfile::tempdir().unwrap();
        let before = fixtures::png(10, 10, 1);
        let path = write(&dir, "Changing 001.cbz", &fixtures::zip(&[("001.png", before.as_slice())]));
        let engine = engine(1 << 20);
        let container = engine.open(&path).await.unwrap();
        let first = container.read_page(0, None).await.unwrap();
        assert_eq!((first.width, first.height), (10, 10));

        let after = fixtures::png(20, 30, 2);
        std::fs::write(&path, fixtures::zip(&[("001.png", after.as_slice())])).unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();
        drop(file);

        let err = container.read_page(0, None).await.unwrap_err();
        assert_eq!(*err, ErrorKind::SourceChanged(path.clone()));
        let err = container.cover(None).await.unwrap_err();
        assert_eq!(*err, ErrorKind::SourceChanged(path.clone()));

        let reopened = engine.open(&path).await.unwrap();
        let page = reopened.read_page(0, None).await.unwrap();
        assert_eq!((page.width, page.height), (20, 30));
        assert!(!Arc::ptr_eq(&first.bytes, &page.bytes));
        let stats = engine.cache().stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn undecodable_image_formats_are_skipped() {
        let jxl = vec![0xFF, 0x0A, 0xFA, 0x7F, 0x01, 0x00];
        let backend = Arc::new(MockBackend::with_entries([("001.jxl", jxl), ("002.png", fixtures::png(6, 9, 1))]));
        let container = open_mock(&engine(1 << 20), backend).await;
        assert_eq!(container.page_count(), 2);
        assert_eq!(
            *container.integrity(),
            IntegrityStatus::PartiallyCorrupted { skipped_pages: vec![0], structure_damaged: false }
        );
        let err = container.read_page(0, None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::SkippedPage { index: 0, .. }));
        let cover = container.cover(None).await.unwrap();
        assert_eq!((cover.width, cover.height), (6, 9));
    }

    #[tokio::test]
    async fn opens_a_7z_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (one, two) = (fixtures::png(12, 16, 1), fixtures::png(16, 12, 2));
        let members: [(&str, &[u8]); 2] = [("b/002.png", two.as_slice()), ("a/001.png", one.as_slice())];
        let path = write(&dir, "Seven 003.cb7", &fixtures::sevenz(&members, false));

        let container = engine(1 << 20).open(&path).await.unwrap();
        assert_eq!(container.format(), Format::SevenZip);
        assert_eq!(container.page_count(), 2);
        assert!(container.integrity().is_clean());
        let page = container.read_page(1, None).await.unwrap();
        assert_eq!((page.width, page.height), (16, 12));
    }

    #[tokio::test]
    async fn opens_a_solid_7z_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let pages: Vec<Vec<u8>> = (1..=3).map(|shade| fixtures::png(8, 4 * u32::from(shade), shade)).collect();
        let members: Vec<(&str, &[u8])> =
            ["1.png", "2.png", "3.png"].into_iter().zip(pages.iter().map(Vec::as_slice)).collect();
        let path = write(&dir, "solid.cb7", &fixtures::sevenz(&members, true));

        let container = engine(1 << 20).open(&path).await.unwrap();
        assert_eq!(container.page_count(), 3);
        for index in [2, 0, 1] {
            let page = container.read_page(index, None).await.unwrap();
            assert_eq!(page.height, 4 * (index as u32 + 1));
        }
    }

    #[tokio::test]
    async fn opens_a_rar_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (one, two) = (fixtures::png(10, 5, 1), fixtures::png(5, 10, 2));
        let members: [(&str, &[u8]); 2] = [("001.png", one.as_slice()), ("002.png", two.as_slice())];
        let path = write(&dir, "Stored 004.cbr", &fixtures::rar(&members, false));

        let container = engine(1 << 20).open(&path).await.unwrap();
        assert_eq!(container.format(), Format::Rar);
        assert_eq!(container.page_count(), 2);
        assert!(container.integrity().is_clean());
        let page = container.read_page(1, None).await.unwrap();
        assert_eq!((page.width, page.height), (5, 10));
    }

    #[tokio::test]
    async fn zeroed_central_directory_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let page = fixtures::png(9, 7, 3);
        let mut bytes = fixtures::zip(&[("001.png", page.as_slice()), ("002.png", page.as_slice())]);
        let directory = bytes.windows(4).position(|window| window == b"PK\x01\x02").unwrap();
        bytes[directory..].fill(0);
        let path = write(&dir, "damaged.cbz", &bytes);

        let container = engine(1 << 20).open(&path).await.unwrap();
        assert_eq!(container.page_count(), 2);
        assert_eq!(
            *container.integrity(),
            IntegrityStatus::PartiallyCorrupted { skipped_pages: vec![], structure_damaged: true }
        );
        let image = container.read_page(1, None).await.unwrap();
        assert_eq!((image.width, image.height), (9, 7));
    }
}

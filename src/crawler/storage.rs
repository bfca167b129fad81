//! On-disk archive of crawled pages
//!
//! Every scrape gets its own directory under the configured base path:
//!
//! ```text
//! <base>/<scrape_id>/pages/0001_<slug>.xml
//! <base>/<scrape_id>/report.json
//! <base>/<scrape_id>/index.db
//! ```
//!
//! Pages are written one XML file each, numbered in crawl order so that
//! loading them back reproduces the original document order.

use quick_xml::{de::from_str, se::to_string};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::{io, path::Path, path::PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::{CrawlReport, CrawledPage, DocumentKind, PageMetadata};

const PAGES_DIR: &str = "pages";
const INDEX_FILE: &str = "index.db";
const REPORT_FILE: &str = "report.json";
const MAX_SLUG_CHARS: usize = 60;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base path for storage
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("scraped_pages"),
        }
    }
}

/// XML representation of pages for storage
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "pages")]
pub struct Pages {
    #[serde(rename = "page")]
    pub pages: Vec<PageEntry>,
}

/// XML representation of a single page for storage
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PageEntry {
    /// URL of the page
    pub url: String,

    /// `html` or `pdf`
    pub kind: String,

    /// Link distance from the seed
    pub depth: u32,

    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub domain: String,

    /// Extracted plain text
    pub content: String,
}

impl From<&CrawledPage> for PageEntry {
    fn from(page: &CrawledPage) -> Self {
        PageEntry {
            url: page.url.clone(),
            kind: page.kind.as_str().to_string(),
            depth: page.depth,
            title: page.metadata.title.clone(),
            description: page.metadata.description.clone(),
            language: page.metadata.language.clone(),
            domain: page.metadata.domain.clone(),
            content: page.content.clone(),
        }
    }
}

impl TryFrom<PageEntry> for CrawledPage {
    type Error = StorageError;

    fn try_from(entry: PageEntry) -> Result<Self> {
        let kind = DocumentKind::parse(&entry.kind)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown document kind '{}'", entry.kind)))?;
        // Absent optional elements can come back as empty strings
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Ok(CrawledPage {
            url: entry.url,
            kind,
            content: entry.content,
            metadata: PageMetadata {
                title: non_empty(entry.title),
                description: non_empty(entry.description),
                language: non_empty(entry.language),
                domain: entry.domain,
            },
            depth: entry.depth,
        })
    }
}

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("XML serialization error: {0}")]
    SerializeError(#[from] quick_xml::errors::serialize::SeError),

    #[error("XML deserialization error: {0}")]
    DeserializeError(#[from] quick_xml::errors::serialize::DeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid scrape id: {0}")]
    InvalidScrapeId(String),

    #[error("Corrupt archive entry: {0}")]
    Corrupt(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for crate::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(scrape_id) => crate::Error::ScrapeNotFound(scrape_id),
            other => crate::Error::Storage(other.to_string()),
        }
    }
}

type Result<T> = std::result::Result<T, StorageError>;

/// A scrape found in the archive
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeListing {
    pub scrape_id: String,
    pub page_count: usize,
    pub has_index: bool,
    pub report: Option<CrawlReport>,
}

/// Scrape ids become directory names, so they must stay a single path component
fn validate_scrape_id(scrape_id: &str) -> Result<()> {
    if scrape_id.is_empty()
        || scrape_id.contains(['/', '\\'])
        || scrape_id == "."
        || scrape_id.contains("..")
    {
        return Err(StorageError::InvalidScrapeId(scrape_id.to_string()));
    }
    Ok(())
}

static SLUG_PATTERNS: LazyLock<Option<(Regex, Regex)>> = LazyLock::new(|| {
    Some((
        Regex::new(r"[^\w\s-]").ok()?,
        Regex::new(r"[-\s]+").ok()?,
    ))
});

/// Turn free text into a lowercase, filesystem-safe slug.
/// Returns an empty string when nothing usable is left.
pub fn slugify(text: &str) -> String {
    let Some((strip, collapse)) = SLUG_PATTERNS.as_ref() else {
        return String::new();
    };
    let stripped = strip.replace_all(text, "");
    let collapsed = collapse.replace_all(stripped.trim(), "_");
    collapsed
        .trim_matches('_')
        .to_lowercase()
        .chars()
        .take(MAX_SLUG_CHARS)
        .collect::<String>()
        .trim_end_matches('_')
        .to_string()
}

/// File name for the page at `position` (zero based): title slug, then path
/// slug, then a random id
fn page_file_name(position: usize, page: &CrawledPage) -> String {
    let from_title = page.metadata.title.as_deref().map(slugify);
    let from_path = || {
        url::Url::parse(&page.url)
            .ok()
            .map(|url| slugify(&url.path().replace('/', " ")))
    };
    let slug = from_title
        .filter(|slug| !slug.is_empty())
        .or_else(|| from_path().filter(|slug| !slug.is_empty()))
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    format!("{:04}_{}.xml", position + 1, slug)
}

/// Crawl position encoded in an archived page's file name
fn archive_position(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .split_once('_')?
        .0
        .parse()
        .ok()
}

/// Order archived page files by crawl position, past the zero padding width
fn sort_archive_files(files: &mut [PathBuf]) {
    files.sort_by(|a, b| {
        archive_position(a)
            .cmp(&archive_position(b))
            .then_with(|| a.cmp(b))
    });
}

/// Storage manager for crawled pages and scrape artifacts
#[derive(Debug, Clone)]
pub struct Storage {
    config: StorageConfig,
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    /// Create a new storage with default configuration
    pub fn new() -> Self {
        Self {
            config: StorageConfig::default(),
        }
    }

    /// Create a new storage with custom configuration
    pub fn with_config(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Directory holding everything for one scrape
    pub fn scrape_dir(&self, scrape_id: &str) -> Result<PathBuf> {
        validate_scrape_id(scrape_id)?;
        Ok(self.config.base_path.join(scrape_id))
    }

    pub fn pages_dir(&self, scrape_id: &str) -> Result<PathBuf> {
        Ok(self.scrape_dir(scrape_id)?.join(PAGES_DIR))
    }

    /// Where the vector index for a scrape lives
    pub fn index_path(&self, scrape_id: &str) -> Result<PathBuf> {
        Ok(self.scrape_dir(scrape_id)?.join(INDEX_FILE))
    }

    pub fn report_path(&self, scrape_id: &str) -> Result<PathBuf> {
        Ok(self.scrape_dir(scrape_id)?.join(REPORT_FILE))
    }

    /// Write every page of a scrape, replacing any pages stored before
    pub async fn store_pages(&self, scrape_id: &str, pages: &[CrawledPage]) -> Result<Vec<PathBuf>> {
        let dir = self.pages_dir(scrape_id)?;
        if fs::try_exists(&dir).await? {
            fs::remove_dir_all(&dir).await?;
        }
        fs::create_dir_all(&dir).await?;

        let mut written = Vec::with_capacity(pages.len());
        for (position, page) in pages.iter().enumerate() {
            let path = dir.join(page_file_name(position, page));

            // Wrap in Pages struct for XML structure
            let wrapper = Pages {
                pages: vec![PageEntry::from(page)],
            };
            let xml = to_string(&wrapper)?;
            fs::write(
                &path,
                format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml),
            )
            .await?;
            written.push(path);
        }

        debug!(scrape_id, pages = written.len(), "Stored pages");
        Ok(written)
    }

    /// Loads a page entry from an XML file
    pub async fn load_page(&self, path: &Path) -> Result<CrawledPage> {
        let xml_content = fs::read_to_string(path).await?;
        let pages: Pages = from_str(&xml_content)?;

        // Since we store one page per file, take the first one
        let entry = pages.pages.into_iter().next().ok_or_else(|| {
            StorageError::Corrupt(format!("{} contains no pages", path.display()))
        })?;
        entry.try_into()
    }

    /// Load every archived page of a scrape in crawl order
    pub async fn load_pages(&self, scrape_id: &str) -> Result<Vec<CrawledPage>> {
        let dir = self.pages_dir(scrape_id)?;
        if !fs::try_exists(&dir).await? {
            return Err(StorageError::NotFound(scrape_id.to_string()));
        }

        let mut files = Vec::new();
        let mut dir_entries = fs::read_dir(&dir).await?;
        while let Some(entry) = dir_entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "xml") {
                files.push(path);
            }
        }
        sort_archive_files(&mut files);

        let mut pages = Vec::with_capacity(files.len());
        for path in files {
            match self.load_page(&path).await {
                Ok(page) => pages.push(page),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable page"),
            }
        }

        if pages.is_empty() {
            return Err(StorageError::NotFound(scrape_id.to_string()));
        }
        Ok(pages)
    }

    /// Save the crawl report next to the pages
    pub async fn store_report(&self, report: &CrawlReport) -> Result<PathBuf> {
        let path = self.report_path(&report.scrape_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, serde_json::to_vec_pretty(report)?).await?;
        Ok(path)
    }

    pub async fn load_report(&self, scrape_id: &str) -> Result<CrawlReport> {
        let path = self.report_path(scrape_id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(scrape_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every scrape under the base path, sorted by id
    pub async fn list_scrapes(&self) -> Result<Vec<ScrapeListing>> {
        let base = &self.config.base_path;
        if !fs::try_exists(base).await? {
            return Ok(Vec::new());
        }

        let mut listings = Vec::new();
        let mut dir_entries = fs::read_dir(base).await?;
        while let Some(entry) = dir_entries.next_entry().await? {
            if !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let Some(scrape_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_scrape_id(&scrape_id).is_err() {
                continue;
            }

            let page_count = count_pages(&entry.path().join(PAGES_DIR)).await;
            let has_index = fs::try_exists(entry.path().join(INDEX_FILE))
                .await
                .unwrap_or(false);
            let report = match self.load_report(&scrape_id).await {
                Ok(report) => Some(report),
                Err(StorageError::NotFound(_)) => None,
                Err(e) => {
                    warn!(scrape_id, error = %e, "Unreadable crawl report");
                    None
                }
            };

            listings.push(ScrapeListing {
                scrape_id,
                page_count,
                has_index,
                report,
            });
        }

        listings.sort_by(|a, b| a.scrape_id.cmp(&b.scrape_id));
        Ok(listings)
    }
}

async fn count_pages(dir: &Path) -> usize {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return 0;
    };
    let mut count = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.path().extension().is_some_and(|ext| ext == "xml") {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> Storage {
        Storage::with_config(StorageConfig {
            base_path: dir.path().to_path_buf(),
        })
    }

    fn page(url: &str, title: Option<&str>, content: &str) -> CrawledPage {
        CrawledPage {
            url: url.to_string(),
            kind: DocumentKind::Html,
            content: content.to_string(),
            metadata: PageMetadata {
                title: title.map(str::to_string),
                description: None,
                language: Some("en".to_string()),
                domain: "example.com".to_string(),
            },
            depth: 1,
        }
    }

    fn report(scrape_id: &str) -> CrawlReport {
        CrawlReport {
            scrape_id: scrape_id.to_string(),
            seed_url: "https://example.com/".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            visited_count: 3,
            document_count: 2,
            failures: Vec::new(),
            skipped: Vec::new(),
            external_links: vec!["https://other.test/x".to_string()],
            chunk_count: Some(5),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Contact Us | Acme, Inc."), "contact_us_acme_inc");
        assert_eq!(slugify("  Pricing -- Plans  "), "pricing_plans");
        assert_eq!(slugify("???"), "");
        assert_eq!(slugify(&"a".repeat(100)).len(), MAX_SLUG_CHARS);
    }

    #[test]
    fn test_page_file_name_fallbacks() {
        let titled = page("https://example.com/x", Some("About Us"), "");
        assert_eq!(page_file_name(0, &titled), "0001_about_us.xml");

        let untitled = page("https://example.com/docs/getting-started", None, "");
        assert_eq!(page_file_name(11, &untitled), "0012_docs_getting_started.xml");

        let root = page("https://example.com/", Some("!!!"), "");
        let name = page_file_name(2, &root);
        assert!(name.starts_with("0003_") && name.ends_with(".xml"));
        assert!(name.len() > "0003_.xml".len());
    }

    #[test]
    fn test_archive_files_sort_by_position() {
        let mut files: Vec<PathBuf> = ["10000_last.xml", "1001_middle.xml", "0002_early.xml", "notes.xml"]
            .iter()
            .map(|name| Path::new("pages").join(name))
            .collect();
        sort_archive_files(&mut files);

        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name()?.to_str())
            .collect();
        assert_eq!(
            names,
            ["notes.xml", "0002_early.xml", "1001_middle.xml", "10000_last.xml"]
        );
        assert_eq!(archive_position(Path::new("pages/10000_last.xml")), Some(10000));
        assert_eq!(archive_position(Path::new("pages/notes.xml")), None);
    }

    #[test]
    fn test_scrape_id_validation() {
        let storage = Storage::new();
        assert_eq!(
            storage.index_path("abc").unwrap(),
            Path::new("scraped_pages/abc/index.db")
        );
        for bad in ["", "..", "../etc", "a/b", "a\\b", "."] {
            assert!(
                matches!(storage.scrape_dir(bad), Err(StorageError::InvalidScrapeId(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_store_and_load_pages_in_order() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let pages = vec![
            page("https://example.com/", Some("Home"), "Welcome home.\n\nSecond paragraph & more <stuff>"),
            page("https://example.com/about", None, "About us"),
            CrawledPage {
                kind: DocumentKind::Pdf,
                ..page("https://example.com/report.pdf", Some("report"), "Annual numbers")
            },
        ];

        let written = storage.store_pages("scrape-1", &pages).await.unwrap();
        assert_eq!(written.len(), 3);
        assert!(written[0].ends_with("pages/0001_home.xml"));

        let loaded = storage.load_pages("scrape-1").await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].url, "https://example.com/");
        assert_eq!(loaded[0].content, pages[0].content);
        assert_eq!(loaded[0].metadata, pages[0].metadata);
        assert_eq!(loaded[1].metadata.title, None);
        assert_eq!(loaded[2].kind, DocumentKind::Pdf);
        assert_eq!(loaded[2].depth, 1);
    }

    #[tokio::test]
    async fn test_store_pages_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .store_pages("s", &[page("https://example.com/a", Some("A"), "a"), page("https://example.com/b", Some("B"), "b")])
            .await
            .unwrap();
        storage
            .store_pages("s", &[page("https://example.com/c", Some("C"), "c")])
            .await
            .unwrap();

        let loaded = storage.load_pages("s").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].url, "https://example.com/c");
    }

    #[tokio::test]
    async fn test_load_missing_scrape() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let result = storage.load_pages("nope").await;
        assert!(matches!(result, Err(StorageError::NotFound(ref id)) if id == "nope"));

        storage.store_pages("empty", &[]).await.unwrap();
        assert!(matches!(
            storage.load_pages("empty").await,
            Err(StorageError::NotFound(_))
        ));

        let err: crate::Error = StorageError::NotFound("nope".to_string()).into();
        assert!(matches!(err, crate::Error::ScrapeNotFound(_)));
    }

    #[tokio::test]
    async fn test_report_and_listing() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        assert!(storage.list_scrapes().await.unwrap().is_empty());

        storage.store_report(&report("b-scrape")).await.unwrap();
        storage
            .store_pages("a-scrape", &[page("https://example.com/", Some("Home"), "hi")])
            .await
            .unwrap();
        fs::write(dir.path().join("stray.txt"), "ignore me").await.unwrap();

        let loaded = storage.load_report("b-scrape").await.unwrap();
        assert_eq!(loaded.chunk_count, Some(5));
        assert_eq!(loaded.external_links, vec!["https://other.test/x"]);

        let listings = storage.list_scrapes().await.unwrap();
        let ids: Vec<_> = listings.iter().map(|l| l.scrape_id.as_str()).collect();
        assert_eq!(ids, vec!["a-scrape", "b-scrape"]);
        assert_eq!(listings[0].page_count, 1);
        assert!(listings[0].report.is_none());
        assert!(!listings[0].has_index);
        assert!(listings[1].report.is_some());
    }
}

use std::path::Path;
use std::sync::Arc;

use iscr_core::{ArchiveYear, CaseRecord, DiscoveredCase, InvalidYear, RetryPolicy};
use iscr_store::{CacheLayout, write_atomic};
use tracing::{debug, info};
use url::Url;

use crate::FetchError;
use crate::discover::{self, YearLink};
use crate::source::PageSource;

/// Root page of the ISCR hearing-decision archive.
pub const DEFAULT_ARCHIVE_URL: &str = "https://doha.ogc.osd.mil/Industrial-Security-Program/Industrial-Security-Clearance-Decisions/ISCR-Hearing-Decisions/";

const PDF_MAGIC: &[u8] = b"%PDF-";

/// First line of a cached year page, recording where it was fetched from so
/// relative links resolve the same way on reuse.
const SOURCE_MARKER: &str = "<!-- iscr-source: ";

/// Discovers a year's case documents and downloads them into the raw cache.
pub struct Fetcher {
    source: Arc<dyn PageSource>,
    layout: CacheLayout,
    retry: RetryPolicy,
    root_url: Url,
}

impl Fetcher {
    pub fn new(
        source: Arc<dyn PageSource>,
        layout: CacheLayout,
        root_url: &str,
    ) -> Result<Self, FetchError> {
        let root_url = Url::parse(root_url).map_err(|e| FetchError::InvalidUrl {
            url: root_url.to_string(),
            detail: e.to_string(),
        })?;
        Ok(Self {
            source,
            layout,
            retry: RetryPolicy::default(),
            root_url,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    async fn page(&self, url: &str) -> Result<String, FetchError> {
        self.retry
            .run("fetch page", |_| self.source.page(url))
            .await
    }

    /// Years listed on the archive root page, newest first.
    pub async fn list_years(&self) -> Result<Vec<YearLink>, FetchError> {
        let html = self.page(self.root_url.as_str()).await?;
        let years = discover::parse_year_links(&html, &self.root_url);
        debug!(count = years.len(), "listed archive years");
        Ok(years)
    }

    /// The case documents published for `year`, in stable URL order.
    ///
    /// The year page is cached under the site directory and reused unless
    /// `refresh` is set. A year outside the archive range, or one the archive
    /// does not list, is an [`InvalidYear`].
    pub async fn discover(
        &self,
        year: i32,
        refresh: bool,
    ) -> Result<Vec<DiscoveredCase>, FetchError> {
        let year = ArchiveYear::new(year)?.get();
        let cache_path = self.layout.site_index_path(year);

        if !refresh && let Some((page_url, html)) = read_cached_page(&cache_path) {
            let cases = discover::parse_case_links(&html, &page_url);
            debug!(year, cases = cases.len(), "year page cache hit");
            return Ok(cases);
        }

        let link = self
            .list_years()
            .await?
            .into_iter()
            .find(|l| l.year == year)
            .ok_or_else(|| InvalidYear {
                year,
                detail: "not listed on the archive".into(),
            })?;
        let page_url = Url::parse(&link.url).map_err(|e| FetchError::InvalidUrl {
            url: link.url.clone(),
            detail: e.to_string(),
        })?;

        let html = self.page(page_url.as_str()).await?;
        let cached = format!("{SOURCE_MARKER}{page_url} -->\n{html}");
        write_atomic(&cache_path, cached.as_bytes())?;

        let cases = discover::parse_case_links(&html, &page_url);
        info!(year, cases = cases.len(), url = %page_url, "discovered cases");
        Ok(cases)
    }

    /// Download a case document to `raw/{year}/{case_id}.pdf` unless it is
    /// already cached.
    pub async fn fetch(&self, year: i32, case: &DiscoveredCase) -> Result<CaseRecord, FetchError> {
        let record = self.layout.case_record(year, case);
        if is_cached_pdf(&record.raw_path) {
            debug!(case_id = %record.case_id, "raw document cache hit");
            return Ok(record);
        }

        let url = case.source_url.as_str();
        let bytes = self
            .retry
            .run("fetch document", |_| self.source.document(url))
            .await?;
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(FetchError::Malformed {
                url: url.to_string(),
                detail: "response is not a PDF".into(),
            });
        }

        write_atomic(&record.raw_path, &bytes)?;
        info!(case_id = %record.case_id, bytes = bytes.len(), "fetched document");
        Ok(record)
    }
}

fn is_cached_pdf(path: &Path) -> bool {
    use std::io::Read;

    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut head = [0u8; 4];
    file.read_exact(&mut head).is_ok() && head == PDF_MAGIC[..4]
}

fn read_cached_page(path: &Path) -> Option<(Url, String)> {
    let contents = std::fs::read_to_string(path).ok()?;
    let (first, html) = contents.split_once('\n')?;
    let url = first.strip_prefix(SOURCE_MARKER)?.strip_suffix(" -->")?;
    Some((Url::parse(url).ok()?, html.to_string()))
}

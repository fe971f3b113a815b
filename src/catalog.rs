//! Catalog site operations.
//!
//! Combines a page fetcher with the extraction rules into the three things
//! the tool asks of the site: search, list episodes, read a download table.

use crate::extractor::{
    DownloadLink, Episode, ExtractionError, SearchResult, extract_download_links, extract_episodes,
    extract_search_results,
};
use crate::fetcher::{FetchError, PageFetcher, PageKind};
use thiserror::Error;
use tracing::{debug, info};
use url::form_urlencoded;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The page could not be fetched
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The page could not be processed
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Trait for sources of catalog data.
///
/// An empty result is a valid answer meaning "nothing found"; errors are
/// reserved for pages that could not be retrieved at all.
pub(crate) trait CatalogSource {
    /// Searches the catalog for titles matching `term`.
    fn search(&self, term: &str) -> Result<Vec<SearchResult>, CatalogError>;

    /// Lists the episodes of the title behind `title_link`.
    fn episodes(&self, title_link: &str) -> Result<Vec<Episode>, CatalogError>;

    /// Reads the download table of the episode behind `episode_link`.
    fn download_links(&self, episode_link: &str) -> Result<Vec<DownloadLink>, CatalogError>;
}

/// Catalog source reading the live site through a page fetcher.
pub(crate) struct SiteCatalog<F: PageFetcher> {
    fetcher: F,
    search_path: String,
}

impl<F: PageFetcher> SiteCatalog<F> {
    /// Creates a catalog querying `search_path` for searches.
    pub fn new(fetcher: F, search_path: &str) -> Self {
        Self {
            fetcher,
            search_path: search_path.to_string(),
        }
    }

    /// Builds the relative search URL for a term.
    fn search_query(&self, term: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(term.as_bytes()).collect();
        format!("{}?q={}", self.search_path, encoded)
    }
}

impl<F: PageFetcher> CatalogSource for SiteCatalog<F> {
    fn search(&self, term: &str) -> Result<Vec<SearchResult>, CatalogError> {
        let html = self.fetcher.fetch_plain(&self.search_query(term))?;
        let results = extract_search_results(&html)?;

        info!("Search for {:?} returned {} result(s)", term, results.len());
        Ok(results)
    }

    fn episodes(&self, title_link: &str) -> Result<Vec<Episode>, CatalogError> {
        let page = self.fetcher.fetch(title_link, PageKind::Listing)?;
        let episodes = extract_episodes(&page.html)?;

        // A plain page is already what a retry would return
        if !episodes.is_empty() || !page.rendered {
            return Ok(episodes);
        }

        // A rendered page without episodes is usually an interstitial
        debug!(
            "No episodes in rendered page of {}, retrying with plain request",
            title_link
        );
        let html = self.fetcher.fetch_plain(title_link)?;
        Ok(extract_episodes(&html)?)
    }

    fn download_links(&self, episode_link: &str) -> Result<Vec<DownloadLink>, CatalogError> {
        let page = self.fetcher.fetch(episode_link, PageKind::Episode)?;
        Ok(extract_download_links(&page.html)?)
    }
}

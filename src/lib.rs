//! link_harvester - Collect the download links of a streaming catalog title
//!
//! This library provides the core functionality for searching the catalog,
//! crawling a title's episodes, writing the links into a text report and
//! converting that report into a metalink document.

mod aggregator;
mod catalog;
mod config;
mod extractor;
mod fetcher;
mod file_operations;
mod metalink;
mod report;
mod selection;
mod temp;

use aggregator::crawl;
use catalog::{CatalogSource, SiteCatalog};
use chrono::Local;
use fetcher::FallbackFetcher;
use report::render_report;

// Re-export error types
pub use catalog::CatalogError;
pub use config::ConfigError;
pub use extractor::ExtractionError;
pub use fetcher::FetchError;
pub use file_operations::FileOperationError;
pub use metalink::ConversionError;
pub use selection::SelectionError;

pub use aggregator::{Aggregate, CrawlStats};
pub use config::{
    HarvesterConfig, MetalinkConfig, RenderConfig, SiteConfig, TimingConfig, default_config_path,
};
pub use extractor::{
    DownloadLink, Episode, ExtractionRule, Record, SearchResult, extract, extract_download_links,
    extract_episodes, extract_search_results,
};
pub use fetcher::{FetchBudget, PageKind};
pub use file_operations::{ReportPaths, report_paths, sanitize_filename, write_report};
pub use metalink::{
    BatchOutcome, EpisodeLinkScanner, FileHash, METALINK_NAMESPACE, MetalinkDocument,
    MetalinkFile, batch_convert, convert, convert_report_file, is_valid_mega_url,
    parse_episode_links, sidecar_path,
};
pub use report::{EPISODE_LABEL, LINK_LABEL, PROVIDER_LABEL};
pub use selection::parse_selection;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Progress event emitted during a harvest
///
/// These events allow library users to track progress and provide feedback
/// while the catalog is searched and crawled.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Searching the catalog
    Searching { term: String },

    /// Search finished
    SearchComplete { count: usize },

    /// Fetching the episode list of a title
    FetchingEpisodes { title: String },

    /// Episode list retrieved
    EpisodesFound { count: usize },

    /// Processing a specific episode
    ProcessingEpisode {
        index: usize,
        total: usize,
        name: String,
    },

    /// Download links read for an episode
    EpisodeLinksFound { index: usize, count: usize },

    /// An episode could not be read and was recorded without links
    EpisodeFailed { index: usize, reason: String },

    /// Text report written
    ReportWritten { path: PathBuf },

    /// Metalink sidecar written
    MetalinkWritten {
        path: PathBuf,
        files: usize,
        total_size: u64,
    },

    /// No metalink sidecar was written
    MetalinkSkipped { reason: String },

    /// Harvest complete
    Complete { stats: CrawlStats },
}

/// Result of harvesting one title
#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    /// Totals of the crawl
    pub stats: CrawlStats,

    /// Where the report and sidecar were placed
    pub paths: ReportPaths,

    /// The metalink document, if one was written
    pub metalink: Option<MetalinkDocument>,
}

/// Top-level error type for link_harvester operations
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Error while loading configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error while setting up fetching
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Error during a catalog operation
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Error during metalink conversion
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Error while writing output files
    #[error("File operation error: {0}")]
    FileOperation(#[from] FileOperationError),

    /// Error while choosing a search result
    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    /// The title lists no episodes
    #[error("No episodes found for {title:?}")]
    NoEpisodes { title: String },
}

type SiteFetcher = FallbackFetcher<fetcher::RenderedSource, fetcher::PlainSource>;

fn site_catalog(config: &HarvesterConfig) -> Result<SiteCatalog<SiteFetcher>, HarvesterError> {
    let fetcher = FallbackFetcher::from_config(config)?;
    Ok(SiteCatalog::new(fetcher, &config.site.search_path))
}

/// Searches the catalog for titles matching `term`
///
/// An empty result means nothing matched; errors are reserved for a search
/// page that could not be retrieved.
pub fn search_catalog<F>(
    config: &HarvesterConfig,
    term: &str,
    mut progress_callback: F,
) -> Result<Vec<SearchResult>, HarvesterError>
where
    F: FnMut(ProgressEvent),
{
    progress_callback(ProgressEvent::Searching {
        term: term.to_string(),
    });

    let catalog = site_catalog(config)?;
    let results = catalog.search(term)?;

    progress_callback(ProgressEvent::SearchComplete {
        count: results.len(),
    });

    Ok(results)
}

/// Harvests the download links of a title
///
/// Fetches the episode list of `title`, crawls every episode in order and
/// writes `<title>.txt` plus its `.metalink` sidecar into `output_dir`.
/// Individual episodes may fail without failing the harvest. A report with
/// no convertible link skips the sidecar instead of failing.
///
/// # Arguments
///
/// * `config` - Site, timing and conversion settings
/// * `title` - The search result chosen by the user
/// * `output_dir` - Directory receiving the report and sidecar
/// * `progress_callback` - Closure called with progress events (can be empty for silent operation)
///
/// # Examples
///
/// ```no_run
/// use link_harvester::{HarvesterConfig, ProgressEvent, harvest_title, search_catalog};
/// use std::path::Path;
///
/// let config = HarvesterConfig::default();
/// let results = search_catalog(&config, "one piece", |_| {}).unwrap();
///
/// let outcome = harvest_title(&config, &results[0], Path::new("."), |event| {
///     if let ProgressEvent::ProcessingEpisode { index, total, name } = event {
///         println!("[{}/{}] {}", index + 1, total, name);
///     }
/// })
/// .unwrap();
/// println!("{} link(s)", outcome.stats.total_links);
/// ```
pub fn harvest_title<F>(
    config: &HarvesterConfig,
    title: &SearchResult,
    output_dir: &Path,
    mut progress_callback: F,
) -> Result<HarvestOutcome, HarvesterError>
where
    F: FnMut(ProgressEvent),
{
    // Fail on an unusable name before spending time on the crawl
    let paths = report_paths(output_dir, &title.name)?;

    progress_callback(ProgressEvent::FetchingEpisodes {
        title: title.name.clone(),
    });

    let catalog = site_catalog(config)?;
    let episodes = catalog.episodes(&title.link)?;

    if episodes.is_empty() {
        return Err(HarvesterError::NoEpisodes {
            title: title.name.clone(),
        });
    }

    progress_callback(ProgressEvent::EpisodesFound {
        count: episodes.len(),
    });

    let aggregate = crawl(
        &catalog,
        &episodes,
        config.timing.episode_pause(),
        &mut progress_callback,
    );
    let stats = aggregate.stats(episodes.len());

    let text = render_report(&title.name, &episodes, &aggregate, Local::now().naive_local());
    write_report(&paths.report, &text)?;

    progress_callback(ProgressEvent::ReportWritten {
        path: paths.report.clone(),
    });

    let metalink = match convert_report_file(&paths.report, &paths.metalink, &config.metalink) {
        Ok(document) => {
            progress_callback(ProgressEvent::MetalinkWritten {
                path: paths.metalink.clone(),
                files: document.files.len(),
                total_size: document.total_size(),
            });
            Some(document)
        }
        Err(e @ ConversionError::NoEpisodes { .. }) => {
            progress_callback(ProgressEvent::MetalinkSkipped {
                reason: e.to_string(),
            });
            None
        }
        Err(e) => return Err(e.into()),
    };

    progress_callback(ProgressEvent::Complete { stats });

    Ok(HarvestOutcome {
        stats,
        paths,
        metalink,
    })
}

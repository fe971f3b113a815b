//! Page fetching with a rendered-first strategy.
//!
//! A page is first loaded in a headless browser so client-side script can
//! reveal its content. If that fails for any reason the fetcher escalates
//! once to a plain HTTP GET. Callers only ever see HTML text.

mod plain;
mod rendered;

pub(crate) use plain::PlainSource;
pub(crate) use rendered::RenderedSource;

use crate::config::{HarvesterConfig, TimingConfig};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Errors that can occur while fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The headless browser could not be launched or failed to render
    #[error("Render failed: {0}")]
    Render(String),

    /// The rendered fetch did not finish inside its budget
    #[error("Render timed out after {0:?}")]
    Timeout(Duration),

    /// The plain request failed at the transport level
    #[error("Request failed: {0}")]
    Request(String),

    /// The plain request returned a non-200 status
    #[error("HTTP status {0}")]
    Status(u16),

    /// The relative path could not be joined onto the site origin
    #[error("Invalid URL {path}: {reason}")]
    InvalidUrl { path: String, reason: String },

    /// Both the rendered and the plain fetch failed
    #[error("Rendered fetch failed ({rendered}); plain fetch failed ({plain})")]
    Exhausted {
        rendered: Box<FetchError>,
        plain: Box<FetchError>,
    },
}

/// The kind of page being fetched, which decides the render budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// A title's episode list; heavier client-side content
    Listing,
    /// A single episode with its download table
    Episode,
}

/// How long a single fetch may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchBudget {
    /// Upper bound for the whole fetch
    pub timeout: Duration,
    /// Pause after navigation so scripts can populate the page
    pub settle: Duration,
}

impl FetchBudget {
    /// The render budget for a page kind.
    pub fn for_page(kind: PageKind, timing: &TimingConfig) -> Self {
        match kind {
            PageKind::Listing => Self {
                timeout: Duration::from_secs(timing.listing_render_timeout_secs),
                settle: Duration::from_secs(timing.listing_settle_secs),
            },
            PageKind::Episode => Self {
                timeout: Duration::from_secs(timing.episode_render_timeout_secs),
                settle: Duration::from_secs(timing.episode_settle_secs),
            },
        }
    }

    /// The budget for a plain request; nothing to settle.
    pub fn plain(timing: &TimingConfig) -> Self {
        Self {
            timeout: timing.plain_timeout(),
            settle: Duration::ZERO,
        }
    }
}

/// A fetched page and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub html: String,
    /// Whether client-side script ran before the HTML was read
    pub rendered: bool,
}

impl FetchedPage {
    fn rendered(html: String) -> Self {
        Self {
            html,
            rendered: true,
        }
    }

    fn plain(html: String) -> Self {
        Self {
            html,
            rendered: false,
        }
    }
}

/// One way of turning a URL into HTML.
pub(crate) trait PageSource {
    /// Fetches the HTML behind `url` within `budget`.
    fn fetch_html(&self, url: &Url, budget: FetchBudget) -> Result<String, FetchError>;
}

/// Fetches site pages by relative path.
pub(crate) trait PageFetcher {
    /// Fetches a page, rendering it first and falling back to a plain GET.
    fn fetch(&self, path: &str, kind: PageKind) -> Result<FetchedPage, FetchError>;

    /// Fetches a page with a plain GET only.
    fn fetch_plain(&self, path: &str) -> Result<String, FetchError>;
}

/// Fetcher that tries a rendered source and escalates once to a plain one.
///
/// The escalation is not a retry: the second attempt always uses the plain
/// source, since a second render is assumed to fail the same way.
pub(crate) struct FallbackFetcher<R: PageSource, P: PageSource> {
    base_url: Url,
    timing: TimingConfig,
    rendered: Option<R>,
    plain: P,
}

impl<R: PageSource, P: PageSource> FallbackFetcher<R, P> {
    /// Creates a fetcher; with `rendered` set to None every fetch is plain.
    pub fn new(base_url: Url, timing: TimingConfig, rendered: Option<R>, plain: P) -> Self {
        Self {
            base_url,
            timing,
            rendered,
            plain,
        }
    }

    fn resolve(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::InvalidUrl {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }
}

impl FallbackFetcher<RenderedSource, PlainSource> {
    /// Builds the production fetcher from configuration.
    pub fn from_config(config: &HarvesterConfig) -> Result<Self, FetchError> {
        let rendered = config
            .render
            .enabled
            .then(|| RenderedSource::new(config.render.chrome_path.clone()));
        let plain = PlainSource::new(&config.site)?;

        Ok(Self::new(
            config.site.base_url.clone(),
            config.timing.clone(),
            rendered,
            plain,
        ))
    }
}

impl<R: PageSource, P: PageSource> PageFetcher for FallbackFetcher<R, P> {
    fn fetch(&self, path: &str, kind: PageKind) -> Result<FetchedPage, FetchError> {
        let url = self.resolve(path)?;
        let plain_budget = FetchBudget::plain(&self.timing);

        let Some(rendered) = &self.rendered else {
            return self.plain.fetch_html(&url, plain_budget).map(FetchedPage::plain);
        };

        let render_budget = FetchBudget::for_page(kind, &self.timing);
        let rendered_error = match rendered.fetch_html(&url, render_budget) {
            Ok(html) => {
                debug!("Rendered {}", url);
                return Ok(FetchedPage::rendered(html));
            }
            Err(e) => e,
        };

        warn!(
            "Rendered fetch of {} failed ({}), falling back to plain request",
            url, rendered_error
        );

        self.plain
            .fetch_html(&url, plain_budget)
            .map(FetchedPage::plain)
            .map_err(|plain_error| FetchError::Exhausted {
                rendered: Box::new(rendered_error),
                plain: Box::new(plain_error),
            })
    }

    fn fetch_plain(&self, path: &str) -> Result<String, FetchError> {
        let url = self.resolve(path)?;
        self.plain.fetch_html(&url, FetchBudget::plain(&self.timing))
    }
}

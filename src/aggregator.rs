//! Episode crawl module
//!
//! Walks a title's episodes one at a time and collects their download links.
//! A failing episode never fails the crawl: it is logged, reported through
//! the progress callback and recorded with no links.

use crate::ProgressEvent;
use crate::catalog::CatalogSource;
use crate::extractor::{DownloadLink, Episode};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Download links of one crawl, keyed by episode link
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    links: HashMap<String, Vec<DownloadLink>>,
}

/// Totals of a finished crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    /// Episodes the title lists
    pub total_episodes: usize,
    /// Episodes that yielded at least one link
    pub episodes_with_links: usize,
    /// Links across all episodes
    pub total_links: usize,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the links of an episode, replacing earlier ones
    pub fn insert(&mut self, episode_link: &str, links: Vec<DownloadLink>) {
        self.links.insert(episode_link.to_string(), links);
    }

    /// Links recorded for an episode; None if the episode was never recorded
    pub fn get(&self, episode_link: &str) -> Option<&[DownloadLink]> {
        self.links.get(episode_link).map(Vec::as_slice)
    }

    /// Number of recorded episodes, including those without links
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Computes totals for a crawl over `total_episodes` episodes
    pub fn stats(&self, total_episodes: usize) -> CrawlStats {
        let with_links = self.links.values().filter(|links| !links.is_empty());

        CrawlStats {
            total_episodes,
            episodes_with_links: with_links.clone().count(),
            total_links: with_links.map(Vec::len).sum(),
        }
    }
}

/// Crawls the download links of every episode, in order
///
/// Sleeps `pause` between two episodes to go easy on the site. The crawl is
/// strictly sequential: the site's bot detection and the cost of a browser
/// per fetch make parallel requests counterproductive.
pub(crate) fn crawl<C, F>(
    catalog: &C,
    episodes: &[Episode],
    pause: Duration,
    progress_callback: &mut F,
) -> Aggregate
where
    C: CatalogSource + ?Sized,
    F: FnMut(ProgressEvent),
{
    let mut aggregate = Aggregate::new();
    let total = episodes.len();

    for (index, episode) in episodes.iter().enumerate() {
        if index > 0 && !pause.is_zero() {
            thread::sleep(pause);
        }

        progress_callback(ProgressEvent::ProcessingEpisode {
            index,
            total,
            name: episode.name.clone(),
        });

        let links = match catalog.download_links(&episode.link) {
            Ok(links) => {
                progress_callback(ProgressEvent::EpisodeLinksFound {
                    index,
                    count: links.len(),
                });
                links
            }
            Err(e) => {
                warn!("Skipping episode {:?} ({}): {}", episode.name, episode.link, e);
                progress_callback(ProgressEvent::EpisodeFailed {
                    index,
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };

        aggregate.insert(&episode.link, links);
    }

    let stats = aggregate.stats(total);
    info!(
        "Crawled {} episode(s): {} with links, {} link(s) total",
        stats.total_episodes, stats.episodes_with_links, stats.total_links
    );

    aggregate
}

//! HTML extraction module
//!
//! Turns catalog pages into records. Each rule is a pure function over parsed
//! HTML; entries missing a required field are skipped and a page without the
//! expected structure simply yields nothing.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during extraction
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// A selector failed to compile
    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// A title found by a catalog search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub name: String,
    /// Site-relative link to the title page
    pub link: String,
}

/// One episode of a title, in the order the site lists it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub name: String,
    /// Site-relative link to the episode page
    pub link: String,
}

/// One row of an episode's download table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub provider_name: String,
    pub url: String,
}

/// The named extraction rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRule {
    /// Search result entries of the catalog browse page
    CatalogEntry,
    /// Episode entries of a title page
    EpisodeEntry,
    /// Rows of an episode's download table
    DownloadRow,
}

/// A record produced by one of the rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    SearchResult(SearchResult),
    Episode(Episode),
    DownloadLink(DownloadLink),
}

/// Applies a rule to a page and returns the records it yields
pub fn extract(html: &str, rule: ExtractionRule) -> Result<Vec<Record>, ExtractionError> {
    let records = match rule {
        ExtractionRule::CatalogEntry => extract_search_results(html)?
            .into_iter()
            .map(Record::SearchResult)
            .collect(),
        ExtractionRule::EpisodeEntry => extract_episodes(html)?
            .into_iter()
            .map(Record::Episode)
            .collect(),
        ExtractionRule::DownloadRow => extract_download_links(html)?
            .into_iter()
            .map(Record::DownloadLink)
            .collect(),
    };

    Ok(records)
}

/// Extracts search results from a catalog browse page
pub fn extract_search_results(html: &str) -> Result<Vec<SearchResult>, ExtractionError> {
    let document = Html::parse_document(html);
    let entry = selector(".ListAnimes .Anime")?;
    let anchor = selector("a")?;
    let title = selector(".Title")?;

    let results = document
        .select(&entry)
        .filter_map(|entry| {
            let (name, link) = named_link(entry, &anchor, &title)?;
            Some(SearchResult { name, link })
        })
        .collect();

    Ok(results)
}

/// Extracts the episode list from a title page
pub fn extract_episodes(html: &str) -> Result<Vec<Episode>, ExtractionError> {
    let document = Html::parse_document(html);
    let entry = selector("ul.ListCaps li")?;
    let anchor = selector("a")?;
    let label = selector("p")?;

    let episodes = document
        .select(&entry)
        .filter_map(|entry| {
            let (name, link) = named_link(entry, &anchor, &label)?;
            Some(Episode { name, link })
        })
        .collect();

    Ok(episodes)
}

/// Extracts the download table from an episode page
///
/// A row needs at least four cells: the provider name is the text of the
/// first one, the link is the anchor in the fourth.
pub fn extract_download_links(html: &str) -> Result<Vec<DownloadLink>, ExtractionError> {
    let document = Html::parse_document(html);
    let row = selector("tbody tr")?;
    let cell = selector("td")?;
    let anchor = selector("a")?;

    let links = document
        .select(&row)
        .filter_map(|row| {
            let cells: Vec<ElementRef> = row.select(&cell).collect();
            if cells.len() < 4 {
                return None;
            }

            let provider_name = element_text(cells[0]);
            let url = cells[3]
                .select(&anchor)
                .next()?
                .value()
                .attr("href")?
                .to_string();

            if provider_name.is_empty() {
                return None;
            }

            Some(DownloadLink { provider_name, url })
        })
        .collect();

    Ok(links)
}

/// Reads the first anchor of an entry and the text of a label inside it
fn named_link(entry: ElementRef, anchor: &Selector, label: &Selector) -> Option<(String, String)> {
    let anchor = entry.select(anchor).next()?;
    let link = anchor.value().attr("href")?.to_string();
    let name: String = anchor.select(label).map(element_text).collect();
    let name = name.trim().to_string();

    if name.is_empty() {
        return None;
    }

    Some((name, link))
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::InvalidSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
        <html><body>
          <ul class="ListAnimes">
            <li><article class="Anime">
              <a href="/anime/shingeki-no-kyojin"><h3 class="Title"> Shingeki no Kyojin </h3></a>
            </article></li>
            <li><article class="Anime">
              <a href="/anime/no-title"><h3 class="Title"></h3></a>
            </article></li>
            <li><article class="Anime">
              <a><h3 class="Title">Missing Link</h3></a>
            </article></li>
            <li><article class="Anime">
              <a href="/anime/final-season"><h3 class="Title">Attack on Titan: Final Season</h3></a>
            </article></li>
          </ul>
        </body></html>
    "#;

    const TITLE_PAGE: &str = r#"
        <ul class="ListCaps">
          <li><a href="/ver/show-1"><p>Episodio 1</p></a></li>
          <li><a href="/ver/show-2"><p>Episodio 2</p></a></li>
          <li><a href="/ver/show-3"></a></li>
        </ul>
    "#;

    const EPISODE_PAGE: &str = r#"
        <table><tbody>
          <tr><td>MEGA</td><td>720p</td><td>SUB</td><td><a href="https://mega.nz/#!AAA!BBB">Descargar</a></td></tr>
          <tr><td>Zippyshare</td><td>720p</td><td>SUB</td><td><a href="https://zippy.example/x">Descargar</a></td></tr>
          <tr><td>MEGA</td><td>720p</td><td>SUB</td><td><a href="https://mega.nz/#!AAA!BBB">Descargar</a></td></tr>
          <tr><td>Short</td><td>row</td></tr>
          <tr><td> </td><td>720p</td><td>SUB</td><td><a href="https://nameless.example">x</a></td></tr>
          <tr><td>NoAnchor</td><td>720p</td><td>SUB</td><td>gone</td></tr>
        </tbody></table>
    "#;

    #[test]
    fn test_extract_search_results() {
        let results = extract_search_results(SEARCH_PAGE).unwrap();
        assert_eq!(
            results,
            vec![
                SearchResult {
                    name: "Shingeki no Kyojin".to_string(),
                    link: "/anime/shingeki-no-kyojin".to_string(),
                },
                SearchResult {
                    name: "Attack on Titan: Final Season".to_string(),
                    link: "/anime/final-season".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_extract_episodes_keeps_site_order() {
        let episodes = extract_episodes(TITLE_PAGE).unwrap();
        let names: Vec<_> = episodes.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Episodio 1", "Episodio 2"]);
        assert_eq!(episodes[1].link, "/ver/show-2");
    }

    #[test]
    fn test_extract_download_links_keeps_duplicates() {
        let links = extract_download_links(EPISODE_PAGE).unwrap();
        let providers: Vec<_> = links.iter().map(|l| l.provider_name.as_str()).collect();
        assert_eq!(providers, vec!["MEGA", "Zippyshare", "MEGA"]);
        assert_eq!(links[0], links[2]);
        assert_eq!(links[0].url, "https://mega.nz/#!AAA!BBB");
    }

    #[test]
    fn test_unstructured_html_yields_nothing() {
        let pages = [
            "",
            "<html></html>",
            "<p>Just checking your browser...</p>",
            "<table><tbody><tr><td>a</td><td>b</td></tr></tbody></table>",
            "<<<not even html",
        ];

        for page in pages {
            for rule in [
                ExtractionRule::CatalogEntry,
                ExtractionRule::EpisodeEntry,
                ExtractionRule::DownloadRow,
            ] {
                let records = extract(page, rule).unwrap();
                assert!(records.is_empty(), "{:?} on {:?} yielded {:?}", rule, page, records);
            }
        }
    }

    #[test]
    fn test_extract_dispatches_by_rule() {
        let records = extract(TITLE_PAGE, ExtractionRule::EpisodeEntry).unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[0], Record::Episode(e) if e.link == "/ver/show-1"));

        let records = extract(EPISODE_PAGE, ExtractionRule::DownloadRow).unwrap();
        assert!(records.iter().all(|r| matches!(r, Record::DownloadLink(_))));
    }
}

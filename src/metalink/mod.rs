//! Metalink conversion module
//!
//! Reads a text report back in and turns the links it lists into a metalink
//! document, one file entry per episode. Only the episode number and one
//! matching URL per episode survive the trip.

mod document;

pub use document::{FileHash, METALINK_NAMESPACE, MetalinkDocument, MetalinkFile};

use crate::config::MetalinkConfig;
use crate::report::{EPISODE_LABEL, LINK_LABEL};
use crate::temp::write_atomic;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur during conversion
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The report held no episode with a matching link
    #[error("No episodes found with links containing {marker:?}")]
    NoEpisodes { marker: String },

    /// The document could not be serialized
    #[error("Failed to serialize metalink document: {0}")]
    Serialize(#[from] quick_xml::SeError),

    /// Reading the report or writing the document failed
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

static EPISODE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Episodio (\d+)").expect("episode pattern is valid"));

static MEGA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://mega\.nz/#![A-Za-z0-9_-]+![A-Za-z0-9_-]+$")
        .expect("MEGA pattern is valid")
});

/// Where the scanner stands while reading the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// No episode header seen yet
    AwaitingEpisode,
    /// Inside the block of an episode; link lines belong to it
    InEpisode(u64),
}

/// Line-by-line scanner collecting one URL per episode number
///
/// An `EPISODIO:` line with an `Episodio <N>` moves the scanner into episode
/// N, whatever N is; one without a number leaves it where it is. An `Enlace:`
/// line containing the marker is captured for the current episode, overwriting
/// any earlier capture. Episode 0 never captures anything, so its links cannot
/// end up under a neighbouring episode.
#[derive(Debug)]
pub struct EpisodeLinkScanner<'a> {
    marker: &'a str,
    state: ScanState,
    links: BTreeMap<u64, String>,
}

impl<'a> EpisodeLinkScanner<'a> {
    pub fn new(marker: &'a str) -> Self {
        Self {
            marker,
            state: ScanState::AwaitingEpisode,
            links: BTreeMap::new(),
        }
    }

    /// Feeds one line of the report
    pub fn feed(&mut self, line: &str) {
        let line = line.trim();

        if let Some(header) = line.strip_prefix(EPISODE_LABEL) {
            if let Some(number) = episode_number(header) {
                self.state = ScanState::InEpisode(number);
            }
            return;
        }

        let ScanState::InEpisode(number) = self.state else {
            return;
        };
        if number == 0 {
            return;
        }
        if let Some(url) = line.strip_prefix(LINK_LABEL) {
            if url.contains(self.marker) {
                self.links.insert(number, url.trim().to_string());
            }
        }
    }

    /// Returns the captured URLs by episode number
    pub fn finish(self) -> BTreeMap<u64, String> {
        self.links
    }
}

/// Reads `Episodio <N>` out of an episode header
///
/// The pattern only matches digits, so a failed parse means overflow; such an
/// episode saturates to `u64::MAX` and is later dropped by the cap.
fn episode_number(header: &str) -> Option<u64> {
    let captures = EPISODE_NUMBER.captures(header)?;
    Some(captures[1].parse::<u64>().unwrap_or(u64::MAX))
}

/// Collects the URL captured for each episode number in a report
pub fn parse_episode_links(report: &str, marker: &str) -> BTreeMap<u64, String> {
    let mut scanner = EpisodeLinkScanner::new(marker);
    for line in report.lines() {
        scanner.feed(line);
    }
    scanner.finish()
}

/// Converts a report into a metalink document
///
/// Episodes 1 through the configured cap are added in ascending order;
/// higher numbers are dropped. Fails if the report has no capturable link.
pub fn convert(
    report: &str,
    title: &str,
    base_name: &str,
    options: &MetalinkConfig,
) -> Result<MetalinkDocument, ConversionError> {
    let links = parse_episode_links(report, &options.link_marker);

    if links.is_empty() {
        return Err(ConversionError::NoEpisodes {
            marker: options.link_marker.clone(),
        });
    }

    let mut document = MetalinkDocument::new(title);
    let within_cap = links
        .iter()
        .filter_map(|(n, url)| u32::try_from(*n).ok().map(|n| (n, url)))
        .filter(|(n, _)| *n <= options.episode_cap);
    for (number, url) in within_cap {
        document.add_episode(url, base_name, number, options.estimated_size);
    }

    let dropped = links.len() - document.files.len();
    if dropped > 0 {
        warn!(
            "Dropped {} episode(s) above the cap of {}",
            dropped, options.episode_cap
        );
    }

    Ok(document)
}

/// Path of the metalink sidecar for a report: the report path plus `.metalink`
pub fn sidecar_path(report_path: &Path) -> PathBuf {
    let mut name = report_path.as_os_str().to_owned();
    name.push(".metalink");
    PathBuf::from(name)
}

/// Converts a report file and writes the document to `output`
///
/// The title is the report's file name without `.txt`; the base name of the
/// file entries is the title with spaces replaced by underscores.
pub fn convert_report_file(
    input: &Path,
    output: &Path,
    options: &MetalinkConfig,
) -> Result<MetalinkDocument, ConversionError> {
    let report = fs::read_to_string(input).map_err(|e| ConversionError::Io {
        path: input.to_path_buf(),
        source: e,
    })?;

    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let title = file_name.strip_suffix(".txt").unwrap_or(&file_name);
    let base_name = title.replace(' ', "_");

    let document = convert(&report, title, &base_name, options)?;
    let xml = document.to_xml()?;

    write_atomic(output, xml.as_bytes()).map_err(|e| ConversionError::Io {
        path: output.to_path_buf(),
        source: e,
    })?;

    info!(
        "Wrote {} file entries to {}",
        document.files.len(),
        output.display()
    );
    Ok(document)
}

/// Outcome of converting one file in a batch
#[derive(Debug)]
pub struct BatchOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub result: Result<MetalinkDocument, ConversionError>,
}

/// Converts several reports
///
/// Each sidecar goes next to its report, or into `output_dir` when given
/// (created if missing). A failing file does not stop the batch.
pub fn batch_convert(
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    options: &MetalinkConfig,
) -> Result<Vec<BatchOutcome>, ConversionError> {
    if let Some(dir) = output_dir {
        fs::create_dir_all(dir).map_err(|e| ConversionError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }

    let outcomes = inputs
        .iter()
        .map(|input| {
            let sidecar = sidecar_path(input);
            let output = match output_dir {
                Some(dir) => dir.join(sidecar.file_name().unwrap_or_default()),
                None => sidecar,
            };

            let result = convert_report_file(input, &output, options);
            if let Err(e) = &result {
                warn!("Failed to convert {}: {}", input.display(), e);
            }

            BatchOutcome {
                input: input.clone(),
                output,
                result,
            }
        })
        .collect();

    Ok(outcomes)
}

/// Checks whether a URL has the shape of a MEGA file link
pub fn is_valid_mega_url(url: &str) -> bool {
    MEGA_URL.is_match(url.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregate;
    use crate::extractor::{DownloadLink, Episode};
    use crate::report::render_report;
    use chrono::NaiveDate;

    fn options() -> MetalinkConfig {
        MetalinkConfig::default()
    }

    #[test]
    fn test_episode_link_example() {
        let report = "ENLACES DE DESCARGA - Show\n\
                      EPISODIO: Episodio 3\n\
                      ----------------------------------------\n\
                      Proveedor: MEGA\n\
                      Enlace: https://mega.nz/#!AAA!BBB\n";

        let document = convert(report, "Show", "Show", &options()).unwrap();
        assert_eq!(document.files.len(), 1);
        assert_eq!(document.files[0].url, "https://mega.nz/#!AAA!BBB");
        assert!(document.files[0].name.ends_with("_Episodio_03.mkv"));
        assert_eq!(document.files[0].size, 367_001_600);
    }

    #[test]
    fn test_report_without_episodes_fails() {
        let report = "ENLACES DE DESCARGA - Show\nEnlace: https://mega.nz/#!AAA!BBB\n";
        assert!(matches!(
            convert(report, "Show", "Show", &options()),
            Err(ConversionError::NoEpisodes { .. })
        ));
        assert!(matches!(
            convert("", "Show", "Show", &options()),
            Err(ConversionError::NoEpisodes { .. })
        ));
    }

    #[test]
    fn test_scanner_states() {
        let mut scanner = EpisodeLinkScanner::new("mega.nz");
        assert_eq!(scanner.state, ScanState::AwaitingEpisode);

        scanner.feed("Enlace: https://mega.nz/#!early!link");
        assert_eq!(scanner.state, ScanState::AwaitingEpisode);

        scanner.feed("EPISODIO: Episodio 2");
        assert_eq!(scanner.state, ScanState::InEpisode(2));

        // Header without a number keeps the current episode
        scanner.feed("EPISODIO: Especial OVA");
        assert_eq!(scanner.state, ScanState::InEpisode(2));

        scanner.feed("Enlace: https://zippy.example/2");
        scanner.feed("  Enlace: https://mega.nz/#!first!2  ");
        scanner.feed("Enlace: https://mega.nz/#!last!2");
        scanner.feed("Proveedor: mega.nz");

        scanner.feed("EPISODIO: Episodio 0");
        assert_eq!(scanner.state, ScanState::InEpisode(0));
        scanner.feed("Enlace: https://mega.nz/#!zero!k");

        scanner.feed("EPISODIO: Episodio 99999999999999999999999");
        assert_eq!(scanner.state, ScanState::InEpisode(u64::MAX));

        let links = scanner.finish();
        assert_eq!(links.len(), 1);
        assert_eq!(links[&2], "https://mega.nz/#!last!2");
    }

    #[test]
    fn test_unusable_episode_numbers_keep_links_apart() {
        let report = "EPISODIO: Episodio 2\n\
                      Enlace: https://mega.nz/#!two!k\n\
                      EPISODIO: Episodio 0\n\
                      Enlace: https://mega.nz/#!zero!k\n\
                      EPISODIO: Episodio 3\n\
                      Enlace: https://mega.nz/#!three!k\n\
                      EPISODIO: Episodio 99999999999\n\
                      Enlace: https://mega.nz/#!huge!k\n";

        let links = parse_episode_links(report, "mega.nz");
        assert_eq!(links.get(&2).map(String::as_str), Some("https://mega.nz/#!two!k"));
        assert_eq!(links.get(&3).map(String::as_str), Some("https://mega.nz/#!three!k"));
        assert!(!links.contains_key(&0));

        // Out-of-range episodes are dropped from the document, not an error
        let document = convert(report, "Show", "Show", &options()).unwrap();
        let urls: Vec<_> = document.files.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(urls, vec!["https://mega.nz/#!two!k", "https://mega.nz/#!three!k"]);
    }

    #[test]
    fn test_cap_drops_higher_episodes() {
        let mut report = String::new();
        for n in [1, 12, 13, 25] {
            report.push_str(&format!(
                "EPISODIO: Episodio {}\nEnlace: https://mega.nz/#!e{}!k\n",
                n, n
            ));
        }

        let document = convert(&report, "Show", "Show", &options()).unwrap();
        let names: Vec<_> = document.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Show_Episodio_01.mkv", "Show_Episodio_12.mkv"]);

        let wide = MetalinkConfig {
            episode_cap: 24,
            ..options()
        };
        assert_eq!(convert(&report, "Show", "Show", &wide).unwrap().files.len(), 3);
    }

    #[test]
    fn test_only_episodes_above_cap_gives_empty_document() {
        let report = "EPISODIO: Episodio 13\nEnlace: https://mega.nz/#!a!b\n";
        let document = convert(report, "Show", "Show", &options()).unwrap();
        assert!(document.files.is_empty());
    }

    #[test]
    fn test_round_trip_through_report() {
        let episodes: Vec<Episode> = (1..=14)
            .map(|n| Episode {
                name: format!("Show Episodio {}", n),
                link: format!("/ver/show-{}", n),
            })
            .collect();

        let mut aggregate = Aggregate::new();
        for n in 1..=14 {
            // Leave a gap to check that missing episodes stay missing
            if n == 5 {
                continue;
            }
            aggregate.insert(
                &format!("/ver/show-{}", n),
                vec![
                    DownloadLink {
                        provider_name: "Zippyshare".to_string(),
                        url: format!("https://zippy.example/{}", n),
                    },
                    DownloadLink {
                        provider_name: "MEGA".to_string(),
                        url: format!("https://mega.nz/#!ep{}!key", n),
                    },
                ],
            );
        }

        let generated_at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let report = render_report("Show", &episodes, &aggregate, generated_at);
        let document = convert(&report, "Show", "Show", &options()).unwrap();

        let recovered: Vec<(String, String)> = document
            .files
            .iter()
            .map(|f| (f.name.clone(), f.url.clone()))
            .collect();
        let expected: Vec<(String, String)> = (1..=12u32)
            .filter(|n| *n != 5)
            .map(|n| {
                (
                    format!("Show_Episodio_{:02}.mkv", n),
                    format!("https://mega.nz/#!ep{}!key", n),
                )
            })
            .collect();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn test_convert_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("My Show.txt");
        fs::write(
            &input,
            "EPISODIO: Episodio 1\nEnlace: https://mega.nz/#!a!b\n",
        )
        .unwrap();
        let output = sidecar_path(&input);

        let document = convert_report_file(&input, &output, &options()).unwrap();
        assert_eq!(document.title, "My Show");
        assert_eq!(document.files[0].name, "My_Show_Episodio_01.mkv");
        assert_eq!(document.files[0].description, "My Show - Episodio 1");

        assert_eq!(output, dir.path().join("My Show.txt.metalink"));
        let xml = fs::read_to_string(&output).unwrap();
        assert!(xml.contains(r#"<file name="My_Show_Episodio_01.mkv">"#));
    }

    #[test]
    fn test_batch_convert_continues_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        let empty = dir.path().join("empty.txt");
        let missing = dir.path().join("missing.txt");
        fs::write(&good, "EPISODIO: Episodio 2\nEnlace: https://mega.nz/#!a!b\n").unwrap();
        fs::write(&empty, "nothing here\n").unwrap();

        let out_dir = dir.path().join("out");
        let outcomes = batch_convert(
            &[empty.clone(), missing.clone(), good.clone()],
            Some(&out_dir),
            &options(),
        )
        .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0].result, Err(ConversionError::NoEpisodes { .. })));
        assert!(matches!(outcomes[1].result, Err(ConversionError::Io { .. })));
        assert!(outcomes[2].result.is_ok());
        assert_eq!(outcomes[2].output, out_dir.join("good.txt.metalink"));
        assert!(outcomes[2].output.is_file());
        assert!(!out_dir.join("empty.txt.metalink").exists());
    }

    #[test]
    fn test_is_valid_mega_url() {
        assert!(is_valid_mega_url("https://mega.nz/#!AAA!BBB"));
        assert!(is_valid_mega_url(" https://mega.nz/#!a_b-c!D-e_f \n"));
        assert!(!is_valid_mega_url("https://mega.nz/file/AAA#BBB"));
        assert!(!is_valid_mega_url("http://mega.nz/#!AAA!BBB"));
        assert!(!is_valid_mega_url("https://mega.nz/#!AAA"));
    }
}

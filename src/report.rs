//! Text report module
//!
//! Renders a crawl into the flat text report. The labels are part of the
//! format: the metalink converter reads the report back by them.

use crate::aggregator::Aggregate;
use crate::extractor::Episode;
use chrono::NaiveDateTime;

/// Label opening an episode block
pub const EPISODE_LABEL: &str = "EPISODIO:";
/// Label of a provider line
pub const PROVIDER_LABEL: &str = "Proveedor:";
/// Label of a link line
pub const LINK_LABEL: &str = "Enlace:";

const HEADER_RULE: &str = "========================================";
const EPISODE_RULE: &str = "----------------------------------------";

/// Renders the report for a title
///
/// Episodes appear in crawl order. Episodes without links, including those
/// missing from the aggregate, are left out entirely.
pub fn render_report(
    title: &str,
    episodes: &[Episode],
    aggregate: &Aggregate,
    generated_at: NaiveDateTime,
) -> String {
    let mut report = String::new();

    report.push_str(&format!("ENLACES DE DESCARGA - {}\n", title));
    report.push_str(&format!(
        "Generado el: {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    report.push_str(&format!("{}\n\n", HEADER_RULE));

    for episode in episodes {
        let links = match aggregate.get(&episode.link) {
            Some(links) if !links.is_empty() => links,
            _ => continue,
        };

        report.push_str(&format!("{} {}\n", EPISODE_LABEL, episode.name));
        report.push_str(&format!("{}\n", EPISODE_RULE));

        for link in links {
            report.push_str(&format!("{} {}\n", PROVIDER_LABEL, link.provider_name));
            report.push_str(&format!("{} {}\n\n", LINK_LABEL, link.url));
        }

        report.push('\n');
    }

    report
}

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use dialoguer::Input;
use humansize::{BINARY, format_size};
use link_harvester::{
    BatchOutcome, HarvesterConfig, HarvesterError, MetalinkDocument, ProgressEvent, SearchResult,
    SelectionError, batch_convert, harvest_title, is_valid_mega_url, parse_selection,
    search_catalog,
};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "link_harvester",
    about = "Search a streaming catalog and collect the download links of a title",
    version
)]
struct Cli {
    /// Title to search for
    #[arg(short, long)]
    search: Option<String>,

    /// Directory receiving the report and the metalink sidecar
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Configuration file (defaults to config.toml in the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog site origin, overriding the configuration
    #[arg(long)]
    base_url: Option<String>,

    /// Skip the headless browser and fetch every page with plain requests
    #[arg(long)]
    no_render: bool,

    /// Highest episode number written to the metalink document
    #[arg(long, global = true)]
    episode_cap: Option<u32>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert existing text reports into metalink documents
    Convert {
        /// Report files to convert
        #[arg(required = true)]
        reports: Vec<PathBuf>,

        /// Directory for the documents (defaults to next to each report)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

/// Handles progress events and prints formatted output to stdout
fn handle_progress_event(event: ProgressEvent) {
    match event {
        ProgressEvent::Searching { term } => {
            println!("Searching the catalog for '{}'...", term);
        }
        ProgressEvent::SearchComplete { count } => {
            if count == 0 {
                println!("No titles found.");
            } else {
                println!("Found {} title(s)\n", count);
            }
        }
        ProgressEvent::FetchingEpisodes { title } => {
            println!("\n=== Fetching Episode List ===");
            println!("Retrieving episodes of '{}'...", title);
        }
        ProgressEvent::EpisodesFound { count } => {
            println!("Found {} episode(s)\n", count);
        }
        ProgressEvent::ProcessingEpisode { index, total, name } => {
            println!("[{}/{}] Processing: {}", index + 1, total, name);
        }
        ProgressEvent::EpisodeLinksFound { count, .. } => {
            println!("  {} download link(s)", count);
        }
        ProgressEvent::EpisodeFailed { reason, .. } => {
            println!("  Skipped: {}", reason);
        }
        ProgressEvent::ReportWritten { path } => {
            println!("\nReport written to {}", path.display());
        }
        ProgressEvent::MetalinkWritten {
            path,
            files,
            total_size,
        } => {
            println!(
                "Metalink written to {} ({} file(s), ~{})",
                path.display(),
                files,
                format_size(total_size, BINARY)
            );
        }
        ProgressEvent::MetalinkSkipped { reason } => {
            println!("Metalink skipped: {}", reason);
        }
        ProgressEvent::Complete { stats } => {
            println!("\n=== Summary ===");
            println!("Episodes:            {}", stats.total_episodes);
            println!("Episodes with links: {}", stats.episodes_with_links);
            println!("Links:               {}", stats.total_links);
        }
    }
}

/// Warns about captured URLs that do not look like MEGA file links
fn warn_about_unexpected_urls(document: &MetalinkDocument) {
    for file in &document.files {
        if !is_valid_mega_url(&file.url) {
            println!("  Warning: unexpected link format for {}: {}", file.name, file.url);
        }
    }
}

/// Prints the results and asks the user to pick one
fn choose_title(results: &[SearchResult]) -> Result<&SearchResult, SelectionError> {
    for (index, result) in results.iter().enumerate() {
        println!("{:>3}. {}", index + 1, result.name);
    }
    println!();

    let input: String = Input::new()
        .with_prompt("Select a title")
        .interact_text()
        .map_err(|e| SelectionError::Prompt(e.to_string()))?;

    let index = parse_selection(&input, results.len())?;
    Ok(&results[index])
}

fn load_config(cli: &Cli) -> Result<HarvesterConfig, HarvesterError> {
    let mut config = HarvesterConfig::load(cli.config.as_deref())?;

    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url)?;
    }
    if cli.no_render {
        config.render.enabled = false;
    }
    if let Some(cap) = cli.episode_cap {
        config.metalink.episode_cap = cap;
    }

    Ok(config)
}

fn run_harvest(
    config: &HarvesterConfig,
    term: &str,
    output_dir: &Path,
) -> Result<(), HarvesterError> {
    let results = search_catalog(config, term, handle_progress_event)?;
    if results.is_empty() {
        return Ok(());
    }

    let title = choose_title(&results)?;
    let outcome = harvest_title(config, title, output_dir, handle_progress_event)?;

    if let Some(document) = &outcome.metalink {
        warn_about_unexpected_urls(document);
    }

    Ok(())
}

/// Converts the reports, returning whether every one succeeded
fn run_convert(
    config: &HarvesterConfig,
    reports: &[PathBuf],
    output_dir: Option<&Path>,
) -> Result<bool, HarvesterError> {
    let outcomes = batch_convert(reports, output_dir, &config.metalink)?;

    let mut converted = 0;
    for BatchOutcome {
        input,
        output,
        result,
    } in &outcomes
    {
        match result {
            Ok(document) => {
                converted += 1;
                println!(
                    "{} -> {} ({} file(s), ~{})",
                    input.display(),
                    output.display(),
                    document.files.len(),
                    format_size(document.total_size(), BINARY)
                );
                warn_about_unexpected_urls(document);
            }
            Err(e) => {
                eprintln!("{}: {}", input.display(), e);
            }
        }
    }

    println!("\nConverted {} of {} report(s).", converted, outcomes.len());
    Ok(converted == outcomes.len())
}

fn main() {
    let cli = Cli::parse();

    // Diagnostics go to stderr so progress output on stdout stays readable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.command.is_none() && cli.search.is_none() {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "a search term is required: --search <TERM>",
            )
            .exit();
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    match &cli.command {
        Some(Commands::Convert {
            reports,
            output_dir,
        }) => match run_convert(&config, reports, output_dir.as_deref()) {
            Ok(true) => {}
            Ok(false) => process::exit(1),
            Err(e) => {
                eprintln!("\nError during conversion: {}", e);
                process::exit(1);
            }
        },
        None => {
            let term = cli.search.as_deref().unwrap_or_default();
            if let Err(e) = run_harvest(&config, term, &cli.output_dir) {
                eprintln!("\nError during harvest: {}", e);
                process::exit(1);
            }
        }
    }
}

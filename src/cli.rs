use crate::capture::{CaptureOutcome, CapturePipeline, CaptureStatus, ChromeCapturer, ListingSearch, VisionExtractor};
use crate::config::AppConfig;
use crate::explore::{self, ListingQuery};
use crate::models::RecordFilter;
use crate::queue::ValidationQueue;
use crate::session::ValidationSession;
use crate::store::{BigQueryStore, MemoryStore, RecordStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "curator", version, about = "Human-in-the-loop curation for property listings")]
pub struct Cli {
    #[arg(long, global = true, help = "Use an in-memory store seeded with demo listings")]
    pub demo: bool,
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Work through unvalidated records interactively
    Validate {
        #[arg(long, help = "Validator name recorded on each validated row")]
        name: String,
        #[arg(long, help = "Maximum records to load (default from QUEUE_LOAD_LIMIT)")]
        limit: Option<usize>,
    },
    /// Table-wide validation counts
    Summary,
    /// Filter the full table and report ranges and map center
    Explore {
        #[arg(long = "type")]
        property_type: Option<String>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long)]
        min_rooms: Option<i64>,
        #[arg(long)]
        max_rooms: Option<i64>,
    },
    /// Search for listings near a location, then capture and extract them
    Scrape {
        #[arg(long)]
        location: String,
        #[arg(long, value_delimiter = ',', help = "1-based result numbers to capture (default: all)")]
        pick: Vec<usize>,
        #[command(flatten)]
        capture: CaptureArgs,
    },
    /// Capture and extract specific listing URLs
    Capture {
        #[arg(required = true)]
        urls: Vec<String>,
        #[command(flatten)]
        capture: CaptureArgs,
    },
}

#[derive(clap::Args, Debug)]
pub struct CaptureArgs {
    #[arg(long, help = "Insert extracted listings into the records table")]
    pub save: bool,
    #[arg(long, help = "Folder to write screenshots into")]
    pub out: Option<PathBuf>,
    #[arg(long, default_value_t = 10, help = "Seconds to wait for each page body")]
    pub wait: u64,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_env()?;
    let store = open_store(&config, cli.demo)?;

    match cli.command {
        Commands::Validate { name, limit } => {
            if name.trim().is_empty() {
                anyhow::bail!("--name must not be empty");
            }
            let filter = RecordFilter::unvalidated(limit.unwrap_or(config.queue_load_limit));
            let queue = ValidationQueue::with_ttl(config.queue_ttl);
            let mut session = ValidationSession::new(store, queue, filter, &name);
            let mut stdout = std::io::stdout();
            session
                .run(BufReader::new(tokio::io::stdin()), &mut stdout)
                .await
        }
        Commands::Summary => summary(store.as_ref(), cli.json).await,
        Commands::Explore {
            property_type,
            min_price,
            max_price,
            min_rooms,
            max_rooms,
        } => {
            let query = ListingQuery {
                property_type,
                price: bounds(min_price, max_price, f64::MIN, f64::MAX),
                rooms: bounds(min_rooms, max_rooms, i64::MIN, i64::MAX),
            };
            explore_table(store.as_ref(), &query, cli.json).await
        }
        Commands::Scrape {
            location,
            pick,
            capture,
        } => {
            let (key, engine) = config.search()?;
            let hits = ListingSearch::new(key, engine)?.search(&location).await?;
            if hits.is_empty() {
                println!("No properties found.");
                return Ok(());
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("{:>3}. {}\n     {}", i + 1, hit.title, hit.link);
            }

            let urls: Vec<String> = if pick.is_empty() {
                hits.iter().map(|h| h.link.clone()).collect()
            } else {
                pick.iter()
                    .map(|&n| {
                        n.checked_sub(1)
                            .and_then(|i| hits.get(i))
                            .map(|h| h.link.clone())
                            .with_context(|| format!("--pick {} is not a listed result", n))
                    })
                    .collect::<Result<_>>()?
            };
            capture_urls(&config, store.as_ref(), &urls, &capture, cli.json).await
        }
        Commands::Capture { urls, capture } => {
            capture_urls(&config, store.as_ref(), &urls, &capture, cli.json).await
        }
    }
}

fn open_store(config: &AppConfig, demo: bool) -> Result<Arc<dyn RecordStore>> {
    if demo {
        return Ok(Arc::new(MemoryStore::demo()));
    }
    let (project, dataset, table, token) = config.bigquery()?;
    let store = BigQueryStore::new(project, dataset, table, token)
        .context("Failed to configure BigQuery store")?;
    info!("Using BigQuery table {}.{}.{}", project, dataset, table);
    Ok(Arc::new(store))
}

fn bounds<T: Copy>(lo: Option<T>, hi: Option<T>, min: T, max: T) -> Option<(T, T)> {
    match (lo, hi) {
        (None, None) => None,
        (lo, hi) => Some((lo.unwrap_or(min), hi.unwrap_or(max))),
    }
}

async fn summary(store: &dyn RecordStore, json: bool) -> Result<()> {
    let summary = store
        .fetch_summary()
        .await
        .context("Failed to fetch validation summary")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("📊 Total rows:       {}", explore::format_thousands(summary.total as i64));
    println!(
        "✅ Validated rows:   {} ({:.1}%)",
        explore::format_thousands(summary.validated as i64),
        summary.validated_pct()
    );
    println!(
        "⏳ Unvalidated rows: {} ({:.1}%)",
        explore::format_thousands(summary.unvalidated as i64),
        summary.unvalidated_pct()
    );
    Ok(())
}

async fn explore_table(store: &dyn RecordStore, query: &ListingQuery, json: bool) -> Result<()> {
    let records = store
        .fetch(&RecordFilter::all())
        .await
        .context("Failed to fetch records")?;
    let matches = query.apply(&records);

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    println!("Property types: {}", explore::property_types(&records).join(", "));
    if let Some((lo, hi)) = explore::price_range(&records) {
        println!("Price range:    {} - {}", explore::format_money(lo), explore::format_money(hi));
    }
    if let Some((lo, hi)) = explore::rooms_range(&records) {
        println!("Rooms range:    {} - {}", lo, hi);
    }
    println!("\nShowing {} properties", explore::format_thousands(matches.len() as i64));
    if let Some((lat, lon)) = explore::map_center(matches.iter().copied()) {
        println!("Map center:     {:.6}, {:.6}", lat, lon);
    }
    for record in &matches {
        println!("  {}  {}", record.property_id, explore::tooltip(record));
    }
    Ok(())
}

async fn capture_urls(
    config: &AppConfig,
    store: &dyn RecordStore,
    urls: &[String],
    args: &CaptureArgs,
    json: bool,
) -> Result<()> {
    let wait = Duration::from_secs(args.wait);
    let capturer = tokio::task::spawn_blocking(move || ChromeCapturer::new(wait))
        .await
        .context("Chrome launch task panicked")??;
    let extractor = VisionExtractor::new(&config.vision_api_url, config.vision_key()?, &config.vision_model)?;

    let mut pipeline = CapturePipeline::new(Arc::new(capturer), Arc::new(extractor));
    if let Some(dir) = &args.out {
        pipeline = pipeline.with_output_dir(dir);
    }

    let outcomes = pipeline.run(urls).await?;
    report_outcomes(&outcomes, json)?;

    if args.save {
        let inserted = CapturePipeline::save(store, &outcomes).await?;
        println!("✅ Saved {} listings to {}", inserted, store.store_name());
    }
    Ok(())
}

fn report_outcomes(outcomes: &[CaptureOutcome], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
        return Ok(());
    }
    for outcome in outcomes {
        println!("📸 {}", outcome.url);
        match &outcome.status {
            CaptureStatus::Captured { listing, .. } => {
                println!("{}", serde_json::to_string_pretty(listing)?);
            }
            CaptureStatus::Failed { stage, reason } => {
                println!("❌ {:?} error: {}", stage, reason);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_scrape_picks() {
        let cli = Cli::try_parse_from([
            "curator", "--demo", "scrape", "--location", "Kingston", "--pick", "1,3", "--save",
        ])
        .unwrap();
        assert!(cli.demo);
        match cli.command {
            Commands::Scrape { location, pick, capture } => {
                assert_eq!(location, "Kingston");
                assert_eq!(pick, vec![1, 3]);
                assert!(capture.save);
                assert_eq!(capture.wait, 10);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn capture_requires_urls() {
        assert!(Cli::try_parse_from(["curator", "capture"]).is_err());
    }

    #[test]
    fn open_bounds_fill_with_extremes() {
        assert_eq!(bounds::<i64>(None, None, 0, 10), None);
        assert_eq!(bounds(Some(2), None, 0, 10), Some((2, 10)));
        assert_eq!(bounds(None, Some(5.0), f64::MIN, f64::MAX), Some((f64::MIN, 5.0)));
    }

    #[tokio::test]
    async fn explore_runs_against_demo_store() {
        let store = MemoryStore::demo();
        let query = ListingQuery {
            property_type: Some("House".into()),
            ..Default::default()
        };
        explore_table(&store, &query, true).await.unwrap();
    }
}

mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use eventfeed_core::tracing_setup::init_tracing;
use eventfeed_core::{AccountSource, EventPoller, FeedConfig, HttpApiClient, SeenApi, SeenMarker};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::render::render_snapshot;

#[derive(Parser)]
#[command(name = "eventfeed")]
#[command(about = "Follow account events and notifications from the terminal")]
struct Cli {
    /// Path to JSON config file (defaults to <config dir>/eventfeed/config.json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the API base URL from the config file
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep polling and print the feed every time it changes
    Watch {
        /// Mark events seen as soon as they are printed
        #[arg(long)]
        mark_seen: bool,
    },

    /// Poll once, print the feed and exit
    Once {
        /// Also load this many pages of older events
        #[arg(long, default_value_t = 0)]
        older: u32,
    },

    /// Mark every unseen event in the feed as seen
    MarkSeen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let config = load_config(&cli)?;
    let token = config.resolve_token();
    if token.is_none() {
        warn!("no API token configured, requests will be unauthenticated");
    }
    let client = Arc::new(HttpApiClient::new(&config.api_base_url, token));

    match cli.command {
        Commands::Watch { mark_seen } => watch_feed(config, client, mark_seen).await,
        Commands::Once { older } => print_once(config, client, older).await,
        Commands::MarkSeen => mark_all_seen(config, client).await,
    }
}

/// Load configuration: explicit `--config` path, else the default location.
fn load_config(cli: &Cli) -> Result<FeedConfig> {
    let mut config = match cli.config.clone().or_else(FeedConfig::default_path) {
        Some(path) => FeedConfig::load(&path)?,
        None => FeedConfig::default(),
    };

    if let Some(url) = &cli.api_url {
        config.api_base_url = url.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn watch_feed(config: FeedConfig, client: Arc<HttpApiClient>, mark_seen: bool) -> Result<()> {
    let account_source: Arc<dyn AccountSource> = client.clone();
    let (poller, mut snapshots) = EventPoller::new(config, client.clone(), Some(account_source));
    let marker = mark_seen.then(|| SeenMarker::new(client.clone(), tokio::runtime::Handle::current()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = tokio::spawn(poller.run(shutdown_rx));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print!("{}", render_snapshot(&snapshot, Utc::now().naive_utc()));
                println!();
                if let Some(marker) = &marker {
                    marker.mark_visible_seen(&snapshot);
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupted, stopping");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    driver.await.context("Poller task failed")?;
    Ok(())
}

async fn print_once(config: FeedConfig, client: Arc<HttpApiClient>, older: u32) -> Result<()> {
    let account_source: Arc<dyn AccountSource> = client.clone();
    let (mut poller, _snapshots) = EventPoller::new(config, client, Some(account_source));

    if let Err(e) = poller.refresh_account().await {
        warn!(error = %e, "could not load account data");
    }
    poller.poll_once().await.context("Failed to fetch events")?;

    for _ in 0..older {
        if !poller
            .load_older()
            .await
            .context("Failed to fetch older events")?
        {
            break;
        }
    }

    print!("{}", render_snapshot(&poller.snapshot(), Utc::now().naive_utc()));
    Ok(())
}

/// One-shot variant of the background marker: requests are awaited so the
/// process does not exit before they are sent.
async fn mark_all_seen(config: FeedConfig, client: Arc<HttpApiClient>) -> Result<()> {
    let (mut poller, _snapshots) = EventPoller::new(config, client.clone(), None);
    poller.poll_once().await.context("Failed to fetch events")?;

    let ids = poller.snapshot().unseen_event_ids();
    let results = futures::future::join_all(ids.iter().map(|id| client.mark_event_seen(*id))).await;

    let mut marked = 0;
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(()) => marked += 1,
            Err(e) => warn!(event_id = *id, error = %e, "failed to mark event seen"),
        }
    }

    println!("Marked {} of {} event(s) seen", marked, ids.len());
    Ok(())
}

//! flickr-gallery-rs command-line entry point.
//!
//! Builds the client, store, cache, fetcher and resolver from the parsed
//! configuration and dispatches one subcommand.

#![warn(clippy::all)]

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use flickr_gallery::cache::BinaryCache;
use flickr_gallery::cli::{self, Command};
use flickr_gallery::config::Config;
use flickr_gallery::flickr::FlickrClient;
use flickr_gallery::gallery::PagingFetcher;
use flickr_gallery::resolver::ImageResolver;
use flickr_gallery::state::{PhotoFilter, PhotoRepository, SqlitePhotoRepository};
use flickr_gallery::shutdown;
use flickr_gallery::sync::{self, SyncOptions};

/// Everything a command needs, wired once.
struct Services {
    repo: Arc<SqlitePhotoRepository>,
    cache: Arc<BinaryCache>,
    fetcher: PagingFetcher,
    resolver: Arc<ImageResolver>,
}

async fn build_services(config: &Config, api_key: &str) -> anyhow::Result<Services> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("flickr-gallery-rs/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .build()?;
    let client = Arc::new(FlickrClient::new(
        Arc::new(http),
        api_key,
        config.threads_num as usize,
    ));

    let repo = Arc::new(SqlitePhotoRepository::open(&config.database_path()).await?);
    let cache = Arc::new(BinaryCache::open(&config.images_dir(), config.memory_cache_bytes).await?);

    let resolver = Arc::new(
        ImageResolver::new(Arc::clone(&client), Arc::clone(&cache))
            .with_concurrency(config.threads_num as usize),
    );
    let fetcher = PagingFetcher::new(client, repo.clone(), Arc::clone(&cache), Arc::clone(&resolver));

    Ok(Services {
        repo,
        cache,
        fetcher,
        resolver,
    })
}

async fn run_sync(config: &Config, args: &cli::SyncArgs) -> anyhow::Result<()> {
    let services = build_services(config, config.require_api_key()?).await?;
    let shutdown_token = shutdown::install_signal_handler();

    let options = SyncOptions {
        pages: args.pages,
        page_size: config.page_size,
        with_images: args.with_images,
        max_retries: config.max_retries,
        concurrency: config.threads_num as usize,
        no_progress_bar: config.no_progress_bar,
    };
    let result = sync::run_sync(
        &services.fetcher,
        &services.resolver,
        &options,
        shutdown_token,
    )
    .await;
    services.repo.flush().await?;

    let summary = result?;
    if summary.images_failed > 0 {
        anyhow::bail!(
            "{} of {} image requests failed",
            summary.images_failed,
            summary.images_failed + summary.images_resolved
        );
    }
    Ok(())
}

async fn run_list(config: &Config, args: &cli::ListArgs) -> anyhow::Result<()> {
    // Listing never touches the network, so a missing key is fine here.
    let services = build_services(config, config.api_key.as_deref().unwrap_or_default()).await?;
    let records = services.fetcher.restore_from_local().await?;
    let limit = args.limit.unwrap_or(records.len());

    for record in records.iter().take(limit) {
        if args.json {
            println!("{}", serde_json::to_string(record)?);
            continue;
        }
        println!(
            "{}  {}  {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.external_id,
            record.title
        );
    }
    if records.len() > limit && !args.json {
        println!("... {} more", records.len() - limit);
    }
    Ok(())
}

async fn run_fetch_image(config: &Config, args: &cli::FetchImageArgs) -> anyhow::Result<()> {
    let services = build_services(config, config.require_api_key()?).await?;

    let filter = PhotoFilter::ExternalIds([args.id.clone()].into());
    let record = services
        .repo
        .query_all(Some(&filter), &[])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Photo {} is not in the local store; run `sync` first", args.id))?;

    let bytes = services
        .resolver
        .resolve(&record, args.size, args.tier, config.max_retries)
        .await?;
    tokio::fs::write(&args.output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    tracing::info!(
        photo_id = %record.external_id,
        tier = %args.tier,
        bytes = bytes.len(),
        "Wrote {}",
        args.output.display()
    );
    Ok(())
}

async fn run_reset(config: &Config, args: &cli::ResetArgs) -> anyhow::Result<()> {
    let api_key = config.require_api_key()?;
    if !args.yes {
        if !std::io::stdin().is_terminal() {
            anyhow::bail!("Refusing to reset without confirmation; pass --yes");
        }
        print!(
            "Delete all stored photos and cached images under {}? [y/N] ",
            config.data_dir.display()
        );
        std::io::Write::flush(&mut std::io::stdout())?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let services = build_services(config, api_key).await?;
    let result = services.fetcher.reset_and_refetch(config.page_size).await;
    services.repo.flush().await?;
    let records = result?;
    println!("Reset complete; fetched {} photos", records.len());
    Ok(())
}

async fn run_status(config: &Config) -> anyhow::Result<()> {
    let db_path = config.database_path();
    if !db_path.exists() {
        println!("No store found at {}", db_path.display());
        return Ok(());
    }
    let services = build_services(config, config.api_key.as_deref().unwrap_or_default()).await?;
    let photos = services.repo.count().await?;
    let disk = services.cache.disk_usage().await?;

    println!("Data directory: {}", config.data_dir.display());
    println!("  Photos:        {}", photos);
    println!("  Cached images: {}", disk.files);
    println!("  Cache size:    {:.1} MiB", disk.bytes as f64 / (1024.0 * 1024.0));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.global.log_level.as_filter())),
        )
        .init();

    let config = Config::from_cli(&cli.global);
    tracing::debug!(?config, "Starting flickr-gallery-rs");

    match &cli.command {
        Command::Sync(args) => run_sync(&config, args).await,
        Command::List(args) => run_list(&config, args).await,
        Command::FetchImage(args) => run_fetch_image(&config, args).await,
        Command::Reset(args) => run_reset(&config, args).await,
        Command::Status => run_status(&config).await,
    }
}

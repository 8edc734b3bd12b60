use clap::{Args, Parser, Subcommand};

use crate::types::{CacheTier, LogLevel, SizeVariant};

#[derive(Parser, Debug)]
#[command(
    name = "flickr-gallery-rs",
    about = "Browse recent Flickr photos with a local metadata store and image cache"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Flickr API key.
    /// Prefer the FLICKR_API_KEY environment variable; flags are visible
    /// in process listings.
    #[arg(long, env = "FLICKR_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Directory for the metadata database and image cache
    #[arg(long, default_value = "~/.flickr-gallery-rs", global = true)]
    pub data_dir: String,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Number of concurrent network requests
    #[arg(long = "threads", default_value_t = 4, global = true,
          value_parser = clap::value_parser!(u16).range(1..=64))]
    pub threads_num: u16,

    /// Photos per listing page
    #[arg(long, default_value_t = 30, global = true,
          value_parser = clap::value_parser!(u32).range(1..=500))]
    pub page_size: u32,

    /// Fallback attempts when an image size is missing upstream
    #[arg(long, default_value_t = 1, global = true)]
    pub max_retries: u32,

    /// Memory image cache budget in MiB
    #[arg(long, default_value_t = 64, global = true)]
    pub memory_cache_mb: u32,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch recent photo pages and optionally cache their images
    Sync(SyncArgs),

    /// List stored photos, newest first
    List(ListArgs),

    /// Resolve one photo's image and write it to a file
    FetchImage(FetchImageArgs),

    /// Delete all stored photos and cached images, then fetch the first page
    Reset(ResetArgs),

    /// Show store and cache status
    Status,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Number of pages to fetch
    #[arg(long, default_value_t = 1)]
    pub pages: u32,

    /// Also resolve a preview and a full image for each fetched photo
    #[arg(long)]
    pub with_images: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Show at most this many photos
    #[arg(long)]
    pub limit: Option<usize>,

    /// Print one JSON object per photo
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FetchImageArgs {
    /// Photo id
    #[arg(long)]
    pub id: String,

    /// Cache tier to resolve into
    #[arg(long, value_enum, default_value = "full")]
    pub tier: CacheTier,

    /// Image size to request first
    #[arg(long, value_enum, default_value = "large")]
    pub size: SizeVariant,

    /// Write the image here
    #[arg(short, long)]
    pub output: std::path::PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

use std::path::PathBuf;

use crate::cli::GlobalArgs;
use crate::types::LogLevel;

const DATABASE_FILE: &str = "gallery.db";
const IMAGES_DIR: &str = "images";

/// Application configuration built from the global CLI arguments.
pub struct Config {
    pub api_key: Option<String>,
    pub data_dir: PathBuf,
    pub memory_cache_bytes: usize,
    pub max_retries: u32,
    pub page_size: u32,
    pub threads_num: u16,
    pub log_level: LogLevel,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("data_dir", &self.data_dir)
            .field("threads_num", &self.threads_num)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(args: &GlobalArgs) -> Self {
        Self {
            api_key: args.api_key.clone().filter(|k| !k.trim().is_empty()),
            data_dir: expand_tilde(&args.data_dir),
            memory_cache_bytes: (args.memory_cache_mb as usize).saturating_mul(1024 * 1024),
            max_retries: args.max_retries,
            page_size: args.page_size,
            threads_num: args.threads_num,
            log_level: args.log_level,
            no_progress_bar: args.no_progress_bar,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join(IMAGES_DIR)
    }

    /// The API key, or an error telling the user how to supply one.
    pub fn require_api_key(&self) -> anyhow::Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No API key given. Set FLICKR_API_KEY or pass --api-key.")
        })
    }
}

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read once from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory for rendered batch PDFs.
    pub storage_dir: PathBuf,
    /// Directory holding the credential fonts (TTF).
    pub fonts_dir: PathBuf,
    /// Base of the verification URL encoded into every QR code.
    pub verify_base: String,
    /// Max credentials rendered concurrently inside one batch run.
    pub render_parallelism: usize,
    /// Default border stroke for multi-zone boxes.
    pub default_stroke_width: u32,
    /// TTL for the per-event default-template cache.
    pub template_cache_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let storage_dir = std::env::var("CREDPASS_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("storage/batches"));

        let fonts_dir = std::env::var("CREDPASS_FONTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("assets/fonts"));

        let verify_base = std::env::var("CREDPASS_VERIFY_BASE")
            .unwrap_or_else(|_| "https://credpass.local/verify".to_string());

        let render_parallelism = std::env::var("CREDPASS_RENDER_PARALLELISM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4)
            .max(1);

        let template_cache_ttl = std::env::var("CREDPASS_TEMPLATE_CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        Self {
            storage_dir,
            fonts_dir,
            verify_base,
            render_parallelism,
            default_stroke_width: 3,
            template_cache_ttl,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

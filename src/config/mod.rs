use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Upload ceiling per file (50 MB).
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Extra room granted to the request body for multipart framing.
pub const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Relay configuration, built once at startup and handed to each component.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// PDF.co API key. `None` keeps every conversion endpoint closed.
    pub pdfco_api_key: Option<String>,

    /// Base URL of the conversion API (default: "https://api.pdf.co")
    pub pdfco_base_url: String,

    /// Listen port (default: 3000)
    pub port: u16,

    /// Staging directory for uploads and results (default: "/tmp/uploads")
    pub staging_dir: PathBuf,

    /// Maximum accepted upload size in bytes
    pub max_file_size: usize,

    /// Age after which the sweep removes a staged file
    pub staging_retention: Duration,

    /// Period of the recurring sweep
    pub cleanup_interval: Duration,

    /// Delay between answering a request and deleting its staged files
    pub deletion_delay: Duration,

    /// How often due deferred deletions are executed
    pub deletion_tick: Duration,

    /// Optional transport timeout for every upstream call
    pub upstream_timeout: Option<Duration>,

    /// Allowed CORS origins; empty allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pdfco_api_key: None,
            pdfco_base_url: "https://api.pdf.co".to_string(),
            port: 3000,
            staging_dir: PathBuf::from("/tmp/uploads"),
            max_file_size: MAX_UPLOAD_BYTES,
            staging_retention: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(3600),
            deletion_delay: Duration::from_secs(60),
            deletion_tick: Duration::from_secs(5),
            upstream_timeout: None,
            allowed_origins: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            pdfco_api_key: env::var("PDFCO_API_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),

            pdfco_base_url: env::var("PDFCO_BASE_URL")
                .ok()
                .map(|v| v.trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default.pdfco_base_url),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            staging_dir: env::var("STAGING_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            upstream_timeout: env::var("UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| parse_origins(&v))
                .unwrap_or(default.allowed_origins),

            ..default
        }
    }

    /// Config for local development and tests: no credential, staging under
    /// the given directory.
    pub fn development(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            ..Self::default()
        }
    }

    pub fn api_key_configured(&self) -> bool {
        self.pdfco_api_key.is_some()
    }

    /// Request body limit applied at the router, above the per-file ceiling.
    pub fn body_limit(&self) -> usize {
        self.max_file_size + MULTIPART_OVERHEAD_BYTES
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "*")
        .collect()
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

// =============================================================================
// File config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [preview]
//                    heartbeat_interval_ms = 500
//
//   env var:         CRAB_PREVIEW_PREVIEW__HEARTBEAT_INTERVAL_MS=500

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub preview: PreviewFileConfig,
}

/// Listener settings (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 picks a free port.
    #[serde(default)]
    pub port: u16,
    /// Externally visible base URL, when it differs from the bound address.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            public_url: None,
        }
    }
}

/// Live preview tunables (lives under `[preview]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreviewFileConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_liveness_timeout_ms")]
    pub liveness_timeout_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Origins allowed on the channels in addition to the server's own.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for PreviewFileConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            liveness_timeout_ms: default_liveness_timeout_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            channel_capacity: default_channel_capacity(),
            allowed_origins: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_liveness_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    256
}

fn default_max_file_bytes() -> u64 {
    25 * 1024 * 1024
}

/// Build a figment that layers: defaults → config.toml → CRAB_PREVIEW_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `CRAB_PREVIEW_SERVER__PORT=4173`  →  `server.port = 4173`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("CRAB_PREVIEW_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_url: Option<Url>,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Self {
        let public_url = fc.public_url.as_deref().and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Ignoring invalid public_url {:?}: {}", raw, e);
                None
            }
        });
        Self {
            host: fc.host.clone(),
            port: fc.port,
            public_url,
        }
    }
}

/// Live preview settings (runtime view).
#[derive(Clone, Debug)]
pub struct PreviewConfig {
    /// How often surfaces heartbeat and the hub sweeps.
    pub heartbeat_interval: Duration,
    /// Silence after which a surface is evicted. Always at least two
    /// heartbeat intervals.
    pub liveness_timeout: Duration,
    /// How long a virtual-server request waits for its response.
    pub request_timeout: Duration,
    pub channel_capacity: usize,
    pub allowed_origins: Vec<String>,
    pub max_file_bytes: u64,
}

impl PreviewConfig {
    pub fn from_file(fc: &PreviewFileConfig) -> Self {
        let heartbeat_interval = Duration::from_millis(fc.heartbeat_interval_ms.max(50));
        let liveness_timeout =
            Duration::from_millis(fc.liveness_timeout_ms).max(heartbeat_interval * 2);
        Self {
            heartbeat_interval,
            liveness_timeout,
            request_timeout: Duration::from_secs(fc.request_timeout_secs.max(1)),
            channel_capacity: fc.channel_capacity.max(16),
            allowed_origins: fc.allowed_origins.clone(),
            max_file_bytes: fc.max_file_bytes,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self::from_file(&PreviewFileConfig::default())
    }
}

// =============================================================================
// Directory layout (not tunable via figment; derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct PreviewDirs {
    pub data_dir: PathBuf,
}

impl PreviewDirs {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".crabpreview"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

//! Configuration management for crabcast
//!
//! Settings are read once at startup from `crabcast.toml` (missing file means
//! defaults), overridden from the command line, validated, and then treated
//! as immutable for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to write config: {0}")]
    Write(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StreamerConfig {
    pub capture: CaptureConfig,
    pub encoder: EncoderConfig,
    pub server: ServerConfig,
    pub transport: TransportConfig,
    pub relay: RelayConfig,
}

/// Capture device and frame geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device index, `/dev/videoN`, device name, or `synthetic`
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// H.264 encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Force an IDR frame every N frames (0 = encoder decides)
    pub keyframe_interval: u32,
    /// Frames allowed to wait for the encoder before the relay blocks
    pub input_capacity: usize,
}

/// HTTP signaling server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding `index.html`
    pub static_dir: PathBuf,
    /// How long `GET /offer` waits for gathering to finish
    pub offer_timeout_ms: u64,
}

/// Peer connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TransportConfig {
    /// STUN/TURN URLs; empty means host candidates only
    pub ice_servers: Vec<String>,
}

/// Relay loop pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Sleep between checks while paused
    pub pause_poll_ms: u64,
    /// Sleep after an acquisition that produced no frame
    pub miss_backoff_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: "0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            keyframe_interval: 30,
            input_capacity: 4,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            static_dir: PathBuf::from("static"),
            offer_timeout_ms: 5000,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pause_poll_ms: 50,
            miss_backoff_ms: 5,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bad bind address {}: {}", self.host, e)))
    }

    pub fn offer_timeout(&self) -> Duration {
        Duration::from_millis(self.offer_timeout_ms)
    }
}

impl RelayConfig {
    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn miss_backoff(&self) -> Duration {
        Duration::from_millis(self.miss_backoff_ms)
    }
}

impl CaptureConfig {
    /// Capture from the built-in test pattern instead of a device
    pub fn is_synthetic(&self) -> bool {
        self.source.eq_ignore_ascii_case("synthetic")
    }
}

impl StreamerConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: StreamerConfig =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Write(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Write(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ConfigError::Write(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabcast.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if capture.width == 0 || capture.height == 0 {
            return Err(ConfigError::Invalid("Invalid resolution".to_string()));
        }
        // I420 subsampling needs even dimensions.
        if capture.width % 2 != 0 || capture.height % 2 != 0 {
            return Err(ConfigError::Invalid(format!(
                "Resolution {}x{} must have even dimensions",
                capture.width, capture.height
            )));
        }
        if capture.fps == 0 || capture.fps > 240 {
            return Err(ConfigError::Invalid(
                "Invalid FPS (must be 1-240)".to_string(),
            ));
        }
        if capture.source.trim().is_empty() {
            return Err(ConfigError::Invalid("Capture source is empty".to_string()));
        }

        if self.encoder.input_capacity == 0 {
            return Err(ConfigError::Invalid(
                "Encoder input capacity must be at least 1".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Invalid("Port must be non-zero".to_string()));
        }
        if self.server.offer_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "Offer timeout must be non-zero".to_string(),
            ));
        }
        self.server.bind_addr()?;

        if self.relay.pause_poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "Pause poll interval must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

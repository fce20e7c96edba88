use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FprintError, FprintResult};

/// Trailing magic written at the end of every complete MCAP file
pub const MCAP_SIGNATURE: &str = "MCAP0\r\n";

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FprintConfig {
    pub daemon: DaemonConfig,
    pub watch: WatchConfig,
    pub hash: HashConfig,
    pub format: FormatConfig,
    pub register: RegisterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Prometheus metrics endpoint (disabled when unset)
    pub metrics_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory to watch (default: /shared)
    pub root: PathBuf,
    /// Also watch subdirectories
    pub recursive: bool,
    /// Quiet period after the last write before a file counts as stable
    pub debounce_ms: u64,
    /// File extensions (without the dot) that are worth sniffing
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    /// Number of parallel chunk workers per file (fixed, never auto-scaled)
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Bytes expected at the very end of a complete file
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterBackend {
    /// Log the fingerprint only
    Log,
    /// Append a JSON line per fingerprint to `journal_path`
    Journal,
    /// Publish to NATS JetStream (requires the `nats` feature)
    Nats,
}

impl std::fmt::Display for RegisterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterBackend::Log => f.write_str("log"),
            RegisterBackend::Journal => f.write_str("journal"),
            RegisterBackend::Nats => f.write_str("nats"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    pub backend: RegisterBackend,
    /// Journal file for the `journal` backend
    pub journal_path: PathBuf,
    /// NATS endpoint for the `nats` backend
    pub nats_url: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
            metrics_addr: None,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/shared"),
            recursive: false,
            debounce_ms: 100,
            extensions: vec!["mcap".into()],
        }
    }
}

impl Default for HashConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            signature: MCAP_SIGNATURE.into(),
        }
    }
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            backend: RegisterBackend::Log,
            journal_path: PathBuf::from("/var/lib/fprint/fingerprints.jsonl"),
            nats_url: "nats://localhost:4222".into(),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Case-insensitive extension match against `extensions`.
    pub fn wants(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self
                .extensions
                .iter()
                .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

impl FormatConfig {
    pub fn signature_bytes(&self) -> Vec<u8> {
        self.signature.as_bytes().to_vec()
    }
}

impl FprintConfig {
    /// Read and parse a TOML config file, then validate it.
    pub fn from_file(path: &Path) -> FprintResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FprintError::Config(format!("reading {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| FprintError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> FprintResult<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> FprintResult<()> {
        if self.hash.workers == 0 {
            return Err(FprintError::Config("hash.workers must be at least 1".into()));
        }
        if self.watch.debounce_ms == 0 {
            return Err(FprintError::Config(
                "watch.debounce_ms must be at least 1".into(),
            ));
        }
        if self.format.signature.is_empty() {
            return Err(FprintError::Config("format.signature must not be empty".into()));
        }
        Ok(())
    }
}

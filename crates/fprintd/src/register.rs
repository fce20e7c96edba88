//! Registration backends: where finished fingerprints are handed off
//!
//! Registration is fire-and-forget from the daemon's point of view: a failure
//! or rejection is logged and counted, never retried here.

use fprint_core::config::{RegisterBackend, RegisterConfig};
use fprint_core::FinalDigest;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as TokioMutex;
use tracing::info;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("journal {}: {source}", path.display())]
    Journal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("encoding fingerprint record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("publishing fingerprint: {0}")]
    Publish(String),

    #[error("registration backend `{0}` is not available in this build")]
    Unavailable(RegisterBackend),
}

/// The payload every backend records: the file, its fingerprint, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub path: String,
    pub digest: String,
    pub chunks: usize,
    /// Unix seconds
    pub registered_at: u64,
}

impl FingerprintRecord {
    pub fn new(path: &Path, digest: &FinalDigest) -> Self {
        Self {
            path: path.display().to_string(),
            digest: digest.to_string(),
            chunks: digest.chunk_count(),
            registered_at: now(),
        }
    }
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `RegisterFingerprint(path, digest) -> accepted`
pub trait Registrar: Send + Sync {
    fn register(
        &self,
        path: &Path,
        digest: &FinalDigest,
    ) -> impl Future<Output = Result<bool, RegistrationError>> + Send;
}

/// Logs the fingerprint and accepts it.
#[derive(Debug, Default, Clone)]
pub struct LogRegistrar;

impl Registrar for LogRegistrar {
    async fn register(&self, path: &Path, digest: &FinalDigest) -> Result<bool, RegistrationError> {
        info!(path = %path.display(), digest = %digest, "fingerprint registered");
        Ok(true)
    }
}

/// Appends one JSON line per fingerprint to a local file.
#[derive(Debug)]
pub struct JournalRegistrar {
    path: PathBuf,
    write_lock: TokioMutex<()>,
}

impl JournalRegistrar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: TokioMutex::new(()),
        }
    }

    fn err(&self, source: io::Error) -> RegistrationError {
        RegistrationError::Journal {
            path: self.path.clone(),
            source,
        }
    }
}

impl Registrar for JournalRegistrar {
    async fn register(&self, path: &Path, digest: &FinalDigest) -> Result<bool, RegistrationError> {
        let mut line = serde_json::to_vec(&FingerprintRecord::new(path, digest))?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.err(e))?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.err(e))?;
        file.write_all(&line).await.map_err(|e| self.err(e))?;
        file.flush().await.map_err(|e| self.err(e))?;

        info!(
            path = %path.display(),
            journal = %self.path.display(),
            "fingerprint journaled"
        );
        Ok(true)
    }
}

#[cfg(feature = "nats")]
pub use nats::NatsRegistrar;

#[cfg(feature = "nats")]
mod nats {
    use super::*;
    use async_nats::jetstream::{self, stream};
    use std::time::Duration;
    use tracing::{debug, warn};

    pub const STREAM_FINGERPRINTS: &str = "FINGERPRINTS";
    pub const SUBJECT_REGISTERED: &str = "FINGERPRINTS.registered";

    /// Publishes fingerprint records to a JetStream stream.
    pub struct NatsRegistrar {
        js: jetstream::Context,
    }

    impl std::fmt::Debug for NatsRegistrar {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("NatsRegistrar").finish_non_exhaustive()
        }
    }

    impl NatsRegistrar {
        /// Connect and make sure the FINGERPRINTS stream exists.
        pub async fn connect(url: &str) -> Result<Self, RegistrationError> {
            let client = async_nats::connect(url).await.map_err(|e| {
                RegistrationError::Publish(format!("connecting to NATS at {url}: {e}"))
            })?;
            info!("NATS: connected to {url}");
            let js = jetstream::new(client);

            js.get_or_create_stream(stream::Config {
                name: STREAM_FINGERPRINTS.to_string(),
                subjects: vec![format!("{STREAM_FINGERPRINTS}.>")],
                max_age: Duration::from_secs(30 * 24 * 3600),
                retention: stream::RetentionPolicy::Limits,
                storage: stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| RegistrationError::Publish(format!("ensuring FINGERPRINTS stream: {e}")))?;

            Ok(Self { js })
        }
    }

    impl Registrar for NatsRegistrar {
        async fn register(
            &self,
            path: &Path,
            digest: &FinalDigest,
        ) -> Result<bool, RegistrationError> {
            let payload = serde_json::to_vec(&FingerprintRecord::new(path, digest))?;
            let ack = self
                .js
                .publish(SUBJECT_REGISTERED, payload.into())
                .await
                .map_err(|e| RegistrationError::Publish(e.to_string()))?;

            match ack.await {
                Ok(ack) => {
                    debug!(path = %path.display(), seq = ack.sequence, "fingerprint published");
                    Ok(true)
                }
                Err(e) => {
                    warn!(path = %path.display(), "no publish ack: {e}");
                    Ok(false)
                }
            }
        }
    }
}

/// Backend chosen at runtime from `[register]`.
#[derive(Debug)]
pub enum AnyRegistrar {
    Log(LogRegistrar),
    Journal(JournalRegistrar),
    #[cfg(feature = "nats")]
    Nats(NatsRegistrar),
}

impl AnyRegistrar {
    pub async fn from_config(config: &RegisterConfig) -> Result<Self, RegistrationError> {
        match config.backend {
            RegisterBackend::Log => Ok(Self::Log(LogRegistrar)),
            RegisterBackend::Journal => {
                Ok(Self::Journal(JournalRegistrar::new(&config.journal_path)))
            }
            #[cfg(feature = "nats")]
            RegisterBackend::Nats => {
                Ok(Self::Nats(NatsRegistrar::connect(&config.nats_url).await?))
            }
            #[cfg(not(feature = "nats"))]
            RegisterBackend::Nats => Err(RegistrationError::Unavailable(RegisterBackend::Nats)),
        }
    }
}

impl Registrar for AnyRegistrar {
    async fn register(&self, path: &Path, digest: &FinalDigest) -> Result<bool, RegistrationError> {
        match self {
            Self::Log(r) => r.register(path, digest).await,
            Self::Journal(r) => r.register(path, digest).await,
            #[cfg(feature = "nats")]
            Self::Nats(r) => r.register(path, digest).await,
        }
    }
}

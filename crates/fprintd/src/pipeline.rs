//! Per-file work for one stable path: sniff → hash → register
//!
//! Each stage short-circuits the rest. File I/O runs on the blocking pool so
//! the runtime (and the coalescer's timers) never wait on disk.

use fprint_chunks::{ChunkHasher, HashError, SniffError, Sniffer};
use fprint_core::config::{FprintConfig, WatchConfig};
use fprint_core::{Classification, FinalDigest, StableEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::metrics::Metrics;
use crate::register::{Registrar, RegistrationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Extension not in `watch.extensions`
    Extension,
    /// Shorter than the signature window
    TooSmall,
    /// Trailing signature missing or different
    NotRecognized,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Extension => "extension",
            SkipReason::TooSmall => "too_small",
            SkipReason::NotRecognized => "not_recognized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    Registered { digest: FinalDigest, accepted: bool },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Sniff(SniffError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Register(#[from] RegistrationError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Sniff(_) => "sniff",
            PipelineError::Hash(_) => "hash",
            PipelineError::Register(_) => "register",
            PipelineError::Join(_) => "join",
        }
    }
}

pub struct Pipeline<R> {
    watch: WatchConfig,
    sniffer: Arc<Sniffer>,
    hasher: Arc<ChunkHasher>,
    registrar: R,
    metrics: Metrics,
}

impl<R> std::fmt::Debug for Pipeline<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("extensions", &self.watch.extensions)
            .field("workers", &self.hasher.workers())
            .finish_non_exhaustive()
    }
}

impl<R: Registrar> Pipeline<R> {
    pub fn new(config: &FprintConfig, registrar: R, metrics: Metrics) -> Result<Self, HashError> {
        Ok(Self {
            watch: config.watch.clone(),
            sniffer: Arc::new(Sniffer::new(config.format.signature_bytes())),
            hasher: Arc::new(ChunkHasher::new(config.hash.workers)?),
            registrar,
            metrics,
        })
    }

    /// Run every stage for `path` and report what happened.
    pub async fn process(&self, path: &Path) -> Result<Outcome, PipelineError> {
        if !self.watch.wants(path) {
            return Ok(Outcome::Skipped(SkipReason::Extension));
        }

        let sniffer = Arc::clone(&self.sniffer);
        let owned: PathBuf = path.to_path_buf();
        let sniffed = tokio::task::spawn_blocking(move || sniffer.sniff(&owned)).await?;
        match sniffed {
            Ok(Classification::Recognized) => {}
            Ok(Classification::NotRecognized) => {
                return Ok(Outcome::Skipped(SkipReason::NotRecognized))
            }
            Err(SniffError::TooSmall { size, needed, .. }) => {
                debug!(path = %path.display(), size, needed, "too small to classify");
                return Ok(Outcome::Skipped(SkipReason::TooSmall));
            }
            Err(e) => return Err(PipelineError::Sniff(e)),
        }

        let hasher = Arc::clone(&self.hasher);
        let owned: PathBuf = path.to_path_buf();
        let started = Instant::now();
        let digest = tokio::task::spawn_blocking(move || hasher.hash_file(&owned)).await??;
        self.metrics
            .hash_duration
            .observe(started.elapsed().as_secs_f64());
        self.metrics.files_hashed.inc();

        let accepted = self.registrar.register(path, &digest).await?;
        Ok(Outcome::Registered { digest, accepted })
    }

    /// Process one stable event, logging and counting the outcome.
    /// Never fails: per-file errors must not stop the daemon.
    pub async fn handle(&self, event: StableEvent) {
        self.metrics.stable_events.inc();
        let path = event.path;

        match self.process(&path).await {
            Ok(Outcome::Registered { digest, accepted }) => {
                let outcome = if accepted { "accepted" } else { "rejected" };
                self.metrics
                    .registrations
                    .get_or_create(&Metrics::label("outcome", outcome))
                    .inc();
                if accepted {
                    info!(path = %path.display(), digest = %digest, "fingerprint handed off");
                } else {
                    warn!(
                        path = %path.display(),
                        digest = %digest,
                        "fingerprint rejected by registrar"
                    );
                }
            }
            Ok(Outcome::Skipped(reason)) => {
                self.metrics
                    .files_skipped
                    .get_or_create(&Metrics::label("reason", reason.as_str()))
                    .inc();
                let reason_str = reason.as_str();
                match reason {
                    SkipReason::Extension => {
                        debug!(path = %path.display(), reason = reason_str, "skipped")
                    }
                    SkipReason::TooSmall => {
                        info!(path = %path.display(), reason = reason_str, "skipped: too small")
                    }
                    SkipReason::NotRecognized => warn!(
                        path = %path.display(),
                        reason = reason_str,
                        "skipped: format not recognized"
                    ),
                }
            }
            Err(e) => {
                self.metrics
                    .failures
                    .get_or_create(&Metrics::label("stage", e.stage()))
                    .inc();
                if let PipelineError::Register(_) = e {
                    self.metrics
                        .registrations
                        .get_or_create(&Metrics::label("outcome", "error"))
                        .inc();
                }
                error!(path = %path.display(), stage = e.stage(), error = %e, "pipeline failed");
            }
        }
    }
}

//! Daemon lifecycle: startup, the stable-event loop, shutdown

use anyhow::{Context, Result};
use fprint_core::config::FprintConfig;
use fprint_watch::{Coalescer, StableEvents, WatchError, WatchSource};
use prometheus_client::registry::Registry;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::metrics::Metrics;
use crate::pipeline::Pipeline;
use crate::register::{AnyRegistrar, Registrar};

/// Everything the running daemon owns. Built once at startup.
pub struct Daemon<R> {
    pipeline: Pipeline<R>,
    events: StableEvents,
    fatal: mpsc::UnboundedReceiver<WatchError>,
}

impl<R: Registrar> Daemon<R> {
    pub fn new(
        pipeline: Pipeline<R>,
        events: StableEvents,
        fatal: mpsc::UnboundedReceiver<WatchError>,
    ) -> Self {
        Self {
            pipeline,
            events,
            fatal,
        }
    }

    /// Dispatch stable events one at a time until `shutdown` resolves or the
    /// watch source fails. Only the latter is an error.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping");
                    return Ok(());
                }
                Some(err) = self.fatal.recv() => {
                    error!(error = %err, "watch source failed, exiting");
                    return Err(anyhow::Error::new(err).context("watch source failed"));
                }
                event = self.events.recv() => match event {
                    Some(event) => self.pipeline.handle(event).await,
                    None => {
                        warn!("stable event stream closed");
                        return Ok(());
                    }
                },
            }
        }
    }
}

pub async fn run(config: FprintConfig) -> Result<()> {
    info!("daemon starting");
    config.validate()?;

    let mut registry = Registry::default();
    let metrics = Metrics::new(&mut registry);

    if let Some(addr) = config.daemon.metrics_addr.clone() {
        let registry = Arc::new(registry);
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(addr, registry).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    let registrar = AnyRegistrar::from_config(&config.register)
        .await
        .with_context(|| {
            format!(
                "initializing {} registration backend",
                config.register.backend
            )
        })?;
    let pipeline =
        Pipeline::new(&config, registrar, metrics).context("building hash worker pool")?;

    let (coalescer, events) = Coalescer::new(config.watch.debounce());
    let (source, fatal) = WatchSource::start(&config.watch.root, config.watch.recursive, coalescer)
        .context("starting watch source")?;

    info!(
        root = %source.root().display(),
        debounce_ms = config.watch.debounce_ms,
        workers = config.hash.workers,
        backend = %config.register.backend,
        "fingerprint daemon ready"
    );

    notify_ready();

    let result = Daemon::new(pipeline, events, fatal)
        .run_until(shutdown_signal())
        .await;
    drop(source);
    result
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("registering SIGTERM handler failed: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
    }
}

fn notify_ready() {
    // Send sd_notify(READY=1) to systemd if running as a service
    // Uses $NOTIFY_SOCKET env var; no-op if not set
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{mcap_bytes, RecordingRegistrar};
    use fprint_core::WatchEvent;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn parts(
        registrar: Arc<RecordingRegistrar>,
    ) -> (Pipeline<Arc<RecordingRegistrar>>, Coalescer, StableEvents) {
        let pipeline =
            Pipeline::new(&FprintConfig::default(), registrar, Metrics::unregistered()).unwrap();
        let (coalescer, events) = Coalescer::new(Duration::from_millis(20));
        (pipeline, coalescer, events)
    }

    async fn wait_for_calls(registrar: &RecordingRegistrar, n: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while registrar.calls.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registrar called in time");
    }

    #[tokio::test]
    async fn stable_recognized_file_reaches_registrar() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.mcap");
        let partial = dir.path().join("partial.mcap");
        std::fs::write(&good, mcap_bytes(50_000)).unwrap();
        std::fs::write(&partial, b"\x89MCAP0\r\nstill writing").unwrap();

        let registrar = Arc::new(RecordingRegistrar::default());
        let (pipeline, coalescer, events) = parts(registrar.clone());
        let (_fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let daemon = tokio::spawn(Daemon::new(pipeline, events, fatal_rx).run_until(async {
            let _ = stop_rx.await;
        }));

        for _ in 0..3 {
            coalescer.notify(WatchEvent::written(&good));
            coalescer.notify(WatchEvent::written(&partial));
        }

        wait_for_calls(&registrar, 1).await;
        // Give the partial file's event time to be processed too
        tokio::time::sleep(Duration::from_millis(100)).await;

        stop_tx.send(()).unwrap();
        daemon.await.unwrap().unwrap();

        let calls = registrar.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, good);
        assert_eq!(calls[0].1, fprint_chunks::hash_file(&good, 4).unwrap());
    }

    #[tokio::test]
    async fn watch_source_error_is_fatal() {
        let registrar = Arc::new(RecordingRegistrar::default());
        let (pipeline, _coalescer, events) = parts(registrar);
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        fatal_tx
            .send(WatchError::Source(notify::Error::generic("inotify queue gone")))
            .unwrap();

        let result = Daemon::new(pipeline, events, fatal_rx)
            .run_until(std::future::pending())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn per_file_failures_do_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.mcap");
        std::fs::write(&good, mcap_bytes(10)).unwrap();

        let registrar = Arc::new(RecordingRegistrar::default());
        let (pipeline, coalescer, events) = parts(registrar.clone());
        let (_fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let daemon = tokio::spawn(Daemon::new(pipeline, events, fatal_rx).run_until(async {
            let _ = stop_rx.await;
        }));

        // Missing file first, then a good one
        coalescer.notify(WatchEvent::created(dir.path().join("vanished.mcap")));
        tokio::time::sleep(Duration::from_millis(60)).await;
        coalescer.notify(WatchEvent::created(&good));

        wait_for_calls(&registrar, 1).await;
        stop_tx.send(()).unwrap();
        daemon.await.unwrap().unwrap();
    }
}

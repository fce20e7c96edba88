//! Per-path debouncing of filesystem notifications
//!
//! Every create/write for a path pushes that path's deadline to
//! `now + debounce`. One timer task per path sleeps until the deadline; when it
//! wakes and the deadline has not moved, it removes the path from the registry
//! and emits a [`StableEvent`] in the same critical section. A notify that
//! races with expiry therefore either moves the deadline before the timer
//! checks it, or finds the path gone and starts a fresh countdown.

use fprint_core::{StableEvent, WatchEvent};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Default quiet period before a path counts as stable
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

struct Shared {
    debounce: Duration,
    /// path -> current deadline. Guarded by one lock for every read-modify-write.
    pending: Mutex<HashMap<PathBuf, Instant>>,
    stable_tx: mpsc::UnboundedSender<StableEvent>,
    runtime: Handle,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Instant>> {
        // Nothing panics while holding the lock; recover the map regardless
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Intake side of the debouncer. Cheap to clone; safe to call from any thread.
///
/// Dropping every `Coalescer` closes intake. Pending countdowns still run to
/// completion, and [`StableEvents::recv`] returns `None` once they have.
#[derive(Clone)]
pub struct Coalescer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Coalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coalescer")
            .field("debounce", &self.shared.debounce)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Single-consumer stream of stable paths.
#[derive(Debug)]
pub struct StableEvents {
    rx: mpsc::UnboundedReceiver<StableEvent>,
}

impl StableEvents {
    pub async fn recv(&mut self) -> Option<StableEvent> {
        self.rx.recv().await
    }

}

impl Coalescer {
    /// Build a coalescer whose timers run on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new(debounce: Duration) -> (Self, StableEvents) {
        Self::with_handle(debounce, Handle::current())
    }

    /// Build a coalescer whose timers run on `runtime`.
    pub fn with_handle(debounce: Duration, runtime: Handle) -> (Self, StableEvents) {
        let (stable_tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            debounce,
            pending: Mutex::new(HashMap::new()),
            stable_tx,
            runtime,
        });
        (Self { shared }, StableEvents { rx })
    }

    /// Number of paths with a live countdown
    pub fn pending(&self) -> usize {
        self.shared.lock().len()
    }

    /// Feed one raw notification. Only creates and writes restart the
    /// countdown; other kinds are dropped.
    pub fn notify(&self, event: WatchEvent) {
        if !event.kind.resets_countdown() {
            trace!(path = %event.path.display(), kind = ?event.kind, "ignored");
            return;
        }

        let mut pending = self.shared.lock();
        // Read the clock under the lock so deadlines follow lock order
        let deadline = Instant::now() + self.shared.debounce;

        if let Some(current) = pending.get_mut(&event.path) {
            *current = (*current).max(deadline);
            trace!(path = %event.path.display(), "countdown reset");
            return;
        }

        pending.insert(event.path.clone(), deadline);
        drop(pending);

        debug!(path = %event.path.display(), kind = ?event.kind, "countdown started");
        let shared = Arc::clone(&self.shared);
        self.shared
            .runtime
            .spawn(run_countdown(shared, event.path, deadline));
    }
}

async fn run_countdown(shared: Arc<Shared>, path: PathBuf, mut deadline: Instant) {
    loop {
        tokio::time::sleep_until(deadline).await;

        let mut pending = shared.lock();
        match pending.get(&path).copied() {
            Some(current) if current > deadline => {
                // Reset while we slept; go back to sleep until the new deadline
                deadline = current;
            }
            Some(_) => {
                pending.remove(&path);
                info!(path = %path.display(), "stable");
                // Receiver gone means nobody is listening any more; nothing to do
                let _ = shared.stable_tx.send(StableEvent { path });
                return;
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fprint_core::WatchKind;
    use proptest::prelude::*;
    use std::path::Path;
    use tokio::time::{sleep, timeout};

    const WINDOW: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn burst_yields_one_event_after_last_write() {
        let (coalescer, mut events) = Coalescer::new(WINDOW);
        let start = Instant::now();

        coalescer.notify(WatchEvent::written("/shared/run.dat"));
        sleep(Duration::from_millis(40)).await;
        coalescer.notify(WatchEvent::written("/shared/run.dat"));
        sleep(Duration::from_millis(50)).await;
        coalescer.notify(WatchEvent::written("/shared/run.dat"));

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.path, PathBuf::from("/shared/run.dat"));
        let fired_at = start.elapsed();
        assert!(fired_at >= Duration::from_millis(190), "fired at {fired_at:?}");
        assert!(fired_at < Duration::from_millis(200), "fired at {fired_at:?}");

        // No second event for the same burst
        assert!(timeout(Duration::from_secs(1), events.recv()).await.is_err());
        assert_eq!(coalescer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn other_kinds_are_ignored() {
        let (coalescer, mut events) = Coalescer::new(WINDOW);

        coalescer.notify(WatchEvent::new("/shared/a.mcap", WatchKind::Other));
        assert_eq!(coalescer.pending(), 0);
        assert!(timeout(Duration::from_secs(1), events.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn other_kind_does_not_extend_countdown() {
        let (coalescer, mut events) = Coalescer::new(WINDOW);
        let start = Instant::now();

        coalescer.notify(WatchEvent::created("/shared/a.mcap"));
        sleep(Duration::from_millis(80)).await;
        coalescer.notify(WatchEvent::new("/shared/a.mcap", WatchKind::Other));

        events.recv().await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn interleaved_paths_each_fire() {
        let (coalescer, mut events) = Coalescer::new(WINDOW);

        for _ in 0..5 {
            coalescer.notify(WatchEvent::written("/shared/a.mcap"));
            coalescer.notify(WatchEvent::written("/shared/b.mcap"));
            sleep(Duration::from_millis(30)).await;
        }
        assert_eq!(coalescer.pending(), 2);

        let mut got = vec![
            events.recv().await.unwrap().path,
            events.recv().await.unwrap().path,
        ];
        got.sort();
        assert_eq!(
            got,
            vec![
                PathBuf::from("/shared/a.mcap"),
                PathBuf::from("/shared/b.mcap")
            ]
        );
        assert!(timeout(Duration::from_secs(1), events.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn write_after_fire_starts_new_countdown() {
        let (coalescer, mut events) = Coalescer::new(WINDOW);

        coalescer.notify(WatchEvent::created("/shared/a.mcap"));
        events.recv().await.unwrap();

        let restart = Instant::now();
        coalescer.notify(WatchEvent::written("/shared/a.mcap"));
        assert_eq!(coalescer.pending(), 1);
        events.recv().await.unwrap();
        assert!(restart.elapsed() >= WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_timers_fire_after_intake_closes() {
        let (coalescer, mut events) = Coalescer::new(WINDOW);

        coalescer.notify(WatchEvent::written("/shared/a.mcap"));
        coalescer.notify(WatchEvent::written("/shared/b.mcap"));
        drop(coalescer);

        assert!(events.recv().await.is_some());
        assert!(events.recv().await.is_some());
        assert!(events.recv().await.is_none(), "stream ends once drained");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_never_moves_backwards() {
        let (coalescer, mut events) = Coalescer::new(WINDOW);
        let path = Path::new("/shared/a.mcap");
        let start = Instant::now();
        coalescer.notify(WatchEvent::written(path));

        // Stored deadline is later than anything the next notify computes
        let later = start + Duration::from_millis(300);
        coalescer.shared.lock().insert(path.to_path_buf(), later);

        coalescer.notify(WatchEvent::written(path));
        assert_eq!(coalescer.shared.lock().get(path).copied(), Some(later));

        events.recv().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(coalescer.pending(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn spaced_notifies_yield_one_event_after_last(
            gaps in prop::collection::vec(0u64..100, 0..12)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            rt.block_on(async {
                let (coalescer, mut events) = Coalescer::new(WINDOW);
                coalescer.notify(WatchEvent::written("/shared/run.mcap"));
                for gap in &gaps {
                    sleep(Duration::from_millis(*gap)).await;
                    coalescer.notify(WatchEvent::written("/shared/run.mcap"));
                }
                let last = Instant::now();

                events.recv().await.unwrap();
                let waited = last.elapsed();
                assert!(waited >= WINDOW, "fired {waited:?} after last notify");
                assert!(waited < WINDOW + Duration::from_millis(10), "fired {waited:?}");
                assert!(timeout(Duration::from_secs(1), events.recv()).await.is_err());
            });
        }
    }
}

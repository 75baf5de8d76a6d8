//! Poll-based detection of external store changes.

use crate::core::WatchSettings;
use crate::error::{Result, WatchError};
use crate::store::{Marker, MarkerStore};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use crate::metrics::WatcherMetrics;

/// Optional metrics collector; compiled away without the `metrics` feature.
#[cfg(feature = "metrics")]
pub(crate) type MetricsSlot = Option<WatcherMetrics>;
#[cfg(not(feature = "metrics"))]
pub(crate) type MetricsSlot = ();

/// What a single poll tick (or manual trigger) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The marker did not advance.
    Unchanged,
    /// The marker advanced within the ignore window of a `notify_save`.
    Suppressed,
    /// A reload signal was queued.
    Signaled,
    /// A reload signal was already pending; this change rides on it.
    Coalesced,
    /// The marker could not be read; the next tick retries.
    ReadFailed,
    /// The watcher has not been started; nothing is emitted yet.
    NotStarted,
    /// The watcher is closed and never emits again.
    Closed,
}

impl PollOutcome {
    /// Short label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Suppressed => "suppressed",
            Self::Signaled => "signaled",
            Self::Coalesced => "coalesced",
            Self::ReadFailed => "read_failed",
            Self::NotStarted => "not_started",
            Self::Closed => "closed",
        }
    }

    /// Whether the consumer will see a reload signal for this outcome.
    pub fn will_reload(self) -> bool {
        matches!(self, Self::Signaled | Self::Coalesced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Closed,
}

/// Marker tracking and lifecycle, guarded together.
struct MarkerState {
    last_seen: Marker,
    lifecycle: Lifecycle,
    reload_tx: Option<mpsc::Sender<()>>,
}

impl MarkerState {
    fn advance_to(&mut self, marker: Marker) -> bool {
        if marker > self.last_seen {
            self.last_seen = marker;
            true
        } else {
            false
        }
    }

    fn send_signal(&self) -> PollOutcome {
        match self.lifecycle {
            Lifecycle::Created => return PollOutcome::NotStarted,
            Lifecycle::Closed => return PollOutcome::Closed,
            Lifecycle::Running => {}
        }

        let Some(tx) = &self.reload_tx else {
            return PollOutcome::Closed;
        };

        match tx.try_send(()) {
            Ok(()) => PollOutcome::Signaled,
            Err(TrySendError::Full(())) => PollOutcome::Coalesced,
            Err(TrySendError::Closed(())) => PollOutcome::Closed,
        }
    }
}

/// State shared between the watcher handle and its poll loop.
struct WatcherShared {
    store: Arc<dyn MarkerStore>,
    settings: WatchSettings,
    state: Mutex<MarkerState>,
    /// Never held together with `state`.
    last_self_write: RwLock<Option<Instant>>,
    shutdown: CancellationToken,
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    metrics: MetricsSlot,
}

impl WatcherShared {
    fn poll_once(&self) -> PollOutcome {
        let outcome = self.check_and_notify();

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_poll(outcome);
        }

        outcome
    }

    fn check_and_notify(&self) -> PollOutcome {
        match self.state.lock().lifecycle {
            Lifecycle::Created => return PollOutcome::NotStarted,
            Lifecycle::Closed => return PollOutcome::Closed,
            Lifecycle::Running => {}
        }

        let current = match self.store.last_modified() {
            Ok(marker) => marker,
            Err(e) => {
                debug!(store = %self.store.name(), error = %e, "marker read failed, skipping tick");
                return PollOutcome::ReadFailed;
            }
        };

        {
            let mut state = self.state.lock();
            if state.lifecycle == Lifecycle::Closed {
                return PollOutcome::Closed;
            }
            if !state.advance_to(current) {
                return PollOutcome::Unchanged;
            }
        }

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_marker(current);
        }

        if self.within_ignore_window() {
            debug!(marker = current.value(), "ignoring own save");
            return PollOutcome::Suppressed;
        }

        debug!(marker = current.value(), "store changed externally");

        let outcome = self.state.lock().send_signal();
        if outcome == PollOutcome::Coalesced {
            debug!("reload signal already pending");
        }
        outcome
    }

    fn within_ignore_window(&self) -> bool {
        match *self.last_self_write.read() {
            Some(saved_at) => saved_at.elapsed() < self.settings.ignore_window,
            None => false,
        }
    }

    fn close(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.lifecycle == Lifecycle::Closed {
                return false;
            }
            state.lifecycle = Lifecycle::Closed;
            // Dropping the sender lets the consumer's `recv` end once drained
            state.reload_tx = None;
        }
        self.shutdown.cancel();
        true
    }
}

/// Read-only end of the watcher's reload signal channel.
///
/// Holds at most one pending signal. A signal carries no payload: it means
/// "the store changed, reload everything". Clones share the same channel.
#[derive(Clone)]
pub struct ReloadChannel {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<()>>>,
}

impl ReloadChannel {
    /// Wait for the next reload signal.
    ///
    /// Returns `None` once the watcher is closed and any pending signal has
    /// been received.
    pub async fn recv(&self) -> Option<()> {
        self.rx.lock().await.recv().await
    }

    /// Take a pending reload signal without waiting.
    ///
    /// Returns `false` if no signal is pending or another task is currently
    /// waiting in [`recv`](ReloadChannel::recv).
    pub fn try_recv(&self) -> bool {
        match self.rx.try_lock() {
            Ok(mut rx) => rx.try_recv().is_ok(),
            Err(_) => false,
        }
    }
}

/// Watches a shared store for changes made by other processes.
///
/// The watcher samples the store's modification marker at a fixed interval.
/// When the marker advances, it emits a reload signal on a single-slot
/// channel, unless the advance happened within the ignore window of this
/// process's own [`notify_save`](StoreWatcher::notify_save).
///
/// Polling is used instead of filesystem notifications because those are
/// unreliable on network and virtualized filesystems.
///
/// Dropping the watcher closes it.
///
/// # Examples
///
/// ```rust,no_run
/// use storewatch::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let store = MemoryStore::new();
/// let watcher = StoreWatcher::new(store.clone(), WatchSettings::default())?;
/// let reloads = watcher.reload_channel();
/// watcher.start()?;
///
/// // Our own write: announce it first so it is not reported back to us
/// watcher.notify_save();
/// store.touch();
///
/// // Someone else's write is reported within one poll interval
/// while let Some(()) = reloads.recv().await {
///     println!("store changed, reloading");
/// }
/// # Ok(())
/// # }
/// ```
pub struct StoreWatcher {
    shared: Arc<WatcherShared>,
    reload_rx: ReloadChannel,
}

impl StoreWatcher {
    /// Create a watcher for `store`.
    ///
    /// Reads the store's current marker once so that existing history is not
    /// reported as a change. Does not start polling; call
    /// [`start`](StoreWatcher::start).
    ///
    /// # Errors
    ///
    /// Returns an error if the settings fail validation. A failed initial
    /// marker read is not an error: the watcher starts from
    /// [`Marker::ZERO`] and the first successful tick reports a change.
    pub fn new(store: impl MarkerStore + 'static, settings: WatchSettings) -> Result<Self> {
        Self::from_parts(Arc::new(store), settings, MetricsSlot::default())
    }

    /// Create a new builder for constructing a watcher.
    pub fn builder() -> crate::core::StoreWatcherBuilder {
        crate::core::StoreWatcherBuilder::new()
    }

    pub(crate) fn from_parts(
        store: Arc<dyn MarkerStore>,
        settings: WatchSettings,
        metrics: MetricsSlot,
    ) -> Result<Self> {
        settings.validate()?;

        let initial = match store.last_modified() {
            Ok(marker) => marker,
            Err(e) => {
                warn!(store = %store.name(), error = %e, "initial marker read failed, starting from zero");
                Marker::ZERO
            }
        };

        let (reload_tx, reload_rx) = mpsc::channel(1);

        let shared = WatcherShared {
            store,
            settings,
            state: Mutex::new(MarkerState {
                last_seen: initial,
                lifecycle: Lifecycle::Created,
                reload_tx: Some(reload_tx),
            }),
            last_self_write: RwLock::new(None),
            shutdown: CancellationToken::new(),
            metrics,
        };

        Ok(Self {
            shared: Arc::new(shared),
            reload_rx: ReloadChannel {
                rx: Arc::new(tokio::sync::Mutex::new(reload_rx)),
            },
        })
    }

    /// Start the poll loop on the current tokio runtime.
    ///
    /// The first tick fires one poll interval after this call. Calling
    /// `start` again, or after [`close`](StoreWatcher::close), does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NoRuntime`] if called outside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;

        {
            let mut state = self.shared.state.lock();
            match state.lifecycle {
                Lifecycle::Created => state.lifecycle = Lifecycle::Running,
                Lifecycle::Running => {
                    debug!("watcher already running");
                    return Ok(());
                }
                Lifecycle::Closed => {
                    debug!("start called on a closed watcher");
                    return Ok(());
                }
            }
        }

        handle.spawn(run_poll_loop(Arc::clone(&self.shared)));
        Ok(())
    }

    /// Perform one poll tick right now, outside the regular schedule.
    ///
    /// Follows exactly the same rules as a scheduled tick. Before
    /// [`start`](StoreWatcher::start) this returns
    /// [`PollOutcome::NotStarted`] and leaves the marker untouched.
    pub fn poll_now(&self) -> PollOutcome {
        self.shared.poll_once()
    }

    /// Announce that this process is about to write to the store.
    ///
    /// Call immediately before the write. Marker advances observed within the
    /// ignore window after this call are treated as self-induced and do not
    /// produce a reload signal.
    pub fn notify_save(&self) {
        *self.shared.last_self_write.write() = Some(Instant::now());
    }

    /// Force a reload signal regardless of the ignore window.
    ///
    /// Moves the last seen marker forward to the store's current marker first,
    /// so the next tick does not report the same change again. If the marker
    /// cannot be read the signal is still sent.
    ///
    /// Before [`start`](StoreWatcher::start) this returns
    /// [`PollOutcome::NotStarted`] and leaves the marker untouched, so the
    /// first tick still reports changes made in the meantime.
    pub fn trigger_reload(&self) -> PollOutcome {
        let current = match self.shared.store.last_modified() {
            Ok(marker) => Some(marker),
            Err(e) => {
                debug!(store = %self.shared.store.name(), error = %e, "marker read failed during manual trigger");
                None
            }
        };

        let (outcome, advanced) = {
            let mut state = self.shared.state.lock();
            let advanced = match current {
                Some(marker) if state.lifecycle == Lifecycle::Running => state.advance_to(marker),
                _ => false,
            };
            (state.send_signal(), advanced)
        };

        debug!(outcome = outcome.as_str(), advanced, "manual reload trigger");

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.shared.metrics {
            metrics.record_trigger(outcome);
            if let (true, Some(marker)) = (advanced, current) {
                metrics.record_marker(marker);
            }
        }

        outcome
    }

    /// The channel on which reload signals are delivered.
    pub fn reload_channel(&self) -> ReloadChannel {
        self.reload_rx.clone()
    }

    /// Stop the poll loop.
    ///
    /// After the first call no reload signal is ever emitted again. Safe to
    /// call any number of times from any thread.
    pub fn close(&self) {
        if self.shared.close() {
            debug!(store = %self.shared.store.name(), "watcher closed");
        }
    }

    /// Whether the poll loop has been started and not closed.
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().lifecycle == Lifecycle::Running
    }

    /// Whether the watcher has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().lifecycle == Lifecycle::Closed
    }

    /// The last marker the watcher has accounted for.
    pub fn last_seen(&self) -> Marker {
        self.shared.state.lock().last_seen
    }

    /// The timing settings of this watcher.
    pub fn settings(&self) -> WatchSettings {
        self.shared.settings
    }

    /// Name of the watched store.
    pub fn store_name(&self) -> String {
        self.shared.store.name()
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn metrics(&self) -> Option<&WatcherMetrics> {
        self.shared.metrics.as_ref()
    }
}

impl Drop for StoreWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_poll_loop(shared: Arc<WatcherShared>) {
    let period = shared.settings.poll_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(
        store = %shared.store.name(),
        poll_interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
        "poll loop started"
    );

    loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                shared.poll_once();
            }
        }
    }

    debug!(store = %shared.store.name(), "poll loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn settings(poll_ms: u64, window_ms: u64) -> WatchSettings {
        WatchSettings::new(
            Duration::from_millis(poll_ms),
            Duration::from_millis(window_ms),
        )
    }

    /// Settings whose loop never ticks during a test that does not await.
    fn manual_settings() -> WatchSettings {
        settings(3_600_000, 3_600_000)
    }

    #[test]
    fn test_initial_marker_is_not_a_change() {
        let store = MemoryStore::with_marker(Marker::new(5));
        let watcher = StoreWatcher::new(store, WatchSettings::default()).unwrap();
        assert_eq!(watcher.last_seen(), Marker::new(5));
        assert!(!watcher.is_running());
        assert!(!watcher.is_closed());
    }

    #[test]
    fn test_initial_read_failure_starts_from_zero() {
        let store = MemoryStore::with_marker(Marker::new(5));
        store.set_unavailable(true);
        let watcher = StoreWatcher::new(store, WatchSettings::default()).unwrap();
        assert_eq!(watcher.last_seen(), Marker::ZERO);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let result = StoreWatcher::new(MemoryStore::new(), settings(0, 1000));
        assert!(matches!(result, Err(WatchError::ValidationError(_))));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let watcher = StoreWatcher::new(MemoryStore::new(), WatchSettings::default()).unwrap();
        assert!(matches!(watcher.start(), Err(WatchError::NoRuntime)));
        assert!(!watcher.is_running());
    }

    #[test]
    fn test_created_state_emits_nothing() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), manual_settings()).unwrap();
        let rx = watcher.reload_channel();

        store.touch();
        assert_eq!(watcher.poll_now(), PollOutcome::NotStarted);
        assert_eq!(watcher.last_seen(), Marker::ZERO);

        assert_eq!(watcher.trigger_reload(), PollOutcome::NotStarted);
        assert_eq!(watcher.last_seen(), Marker::ZERO);
        assert!(!rx.try_recv());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_outcomes() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), manual_settings()).unwrap();
        let rx = watcher.reload_channel();
        watcher.start().unwrap();
        assert!(watcher.is_running());

        assert_eq!(watcher.poll_now(), PollOutcome::Unchanged);

        store.touch();
        assert_eq!(watcher.poll_now(), PollOutcome::Signaled);
        assert_eq!(watcher.last_seen(), Marker::new(1));

        store.touch();
        assert_eq!(watcher.poll_now(), PollOutcome::Coalesced);

        assert!(rx.try_recv());
        assert!(!rx.try_recv());
        assert_eq!(watcher.poll_now(), PollOutcome::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_save_suppresses() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), manual_settings()).unwrap();
        let rx = watcher.reload_channel();
        watcher.start().unwrap();

        watcher.notify_save();
        store.touch();
        assert_eq!(watcher.poll_now(), PollOutcome::Suppressed);
        assert_eq!(watcher.last_seen(), Marker::new(1));
        assert!(!rx.try_recv());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_skips_tick() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), manual_settings()).unwrap();
        watcher.start().unwrap();

        store.set_unavailable(true);
        store.touch();
        assert_eq!(watcher.poll_now(), PollOutcome::ReadFailed);
        assert_eq!(watcher.last_seen(), Marker::ZERO);

        store.set_unavailable(false);
        assert_eq!(watcher.poll_now(), PollOutcome::Signaled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_reload_ignores_window_and_updates_marker() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), manual_settings()).unwrap();
        let rx = watcher.reload_channel();
        watcher.start().unwrap();

        watcher.notify_save();
        store.touch();
        assert_eq!(watcher.trigger_reload(), PollOutcome::Signaled);
        assert_eq!(watcher.last_seen(), Marker::new(1));

        // Same change is not reported a second time
        assert_eq!(watcher.poll_now(), PollOutcome::Unchanged);

        assert_eq!(watcher.trigger_reload(), PollOutcome::Coalesced);
        assert!(rx.try_recv());
        assert!(!rx.try_recv());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_reload_with_unreadable_store_still_signals() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), manual_settings()).unwrap();
        watcher.start().unwrap();

        store.set_unavailable(true);
        assert_eq!(watcher.trigger_reload(), PollOutcome::Signaled);
        assert_eq!(watcher.last_seen(), Marker::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_detects_change_within_interval() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), settings(2000, 3000)).unwrap();
        let rx = watcher.reload_channel();
        watcher.start().unwrap();

        store.touch();
        let result = timeout(Duration::from_millis(2100), rx.recv()).await;
        assert_eq!(result.unwrap(), Some(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_is_one_interval_after_start() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), settings(2000, 3000)).unwrap();
        let rx = watcher.reload_channel();
        watcher.start().unwrap();

        store.touch();
        sleep(Duration::from_millis(1900)).await;
        assert!(!rx.try_recv());
        sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_noop() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), settings(2000, 3000)).unwrap();
        let rx = watcher.reload_channel();
        watcher.start().unwrap();
        watcher.start().unwrap();

        store.touch();
        assert_eq!(
            timeout(Duration::from_secs(3), rx.recv()).await.unwrap(),
            Some(())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent_and_final() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), settings(2000, 3000)).unwrap();
        let rx = watcher.reload_channel();
        watcher.start().unwrap();

        watcher.close();
        watcher.close();
        assert!(watcher.is_closed());
        assert!(!watcher.is_running());

        store.touch();
        assert_eq!(watcher.poll_now(), PollOutcome::Closed);
        assert_eq!(watcher.trigger_reload(), PollOutcome::Closed);

        // Sender is gone, so the channel reports closure instead of hanging
        assert_eq!(
            timeout(Duration::from_secs(5), rx.recv()).await.unwrap(),
            None
        );

        watcher.start().unwrap();
        assert!(!watcher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_signal_survives_close() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), manual_settings()).unwrap();
        let rx = watcher.reload_channel();
        watcher.start().unwrap();

        store.touch();
        assert_eq!(watcher.poll_now(), PollOutcome::Signaled);
        watcher.close();

        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_closes_watcher() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::new(store.clone(), settings(2000, 3000)).unwrap();
        let rx = watcher.reload_channel();
        watcher.start().unwrap();

        drop(watcher);
        store.touch();
        assert_eq!(
            timeout(Duration::from_secs(5), rx.recv()).await.unwrap(),
            None
        );
    }

    #[cfg(feature = "metrics")]
    #[tokio::test(start_paused = true)]
    async fn test_trigger_with_metrics_advances_marker() {
        let store = MemoryStore::new();
        let watcher = StoreWatcher::builder()
            .with_store(store.clone())
            .with_settings(manual_settings())
            .with_metrics(opentelemetry::global::meter("test"))
            .build()
            .unwrap();
        assert!(watcher.metrics().is_some());
        watcher.start().unwrap();

        store.touch();
        assert_eq!(watcher.trigger_reload(), PollOutcome::Signaled);
        assert_eq!(watcher.last_seen(), Marker::new(1));
        assert_eq!(watcher.poll_now(), PollOutcome::Unchanged);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(PollOutcome::Suppressed.as_str(), "suppressed");
        assert!(PollOutcome::Coalesced.will_reload());
        assert!(!PollOutcome::ReadFailed.will_reload());
    }
}

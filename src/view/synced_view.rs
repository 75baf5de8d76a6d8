//! In-memory view of a watched store, refreshed on external changes.

use crate::core::{MetricsSlot, StoreWatcher};
use crate::error::{Result, WatchError};
use crate::view::{ListenerHandle, ReloadListeners};
use arc_swap::ArcSwap;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Type alias for loader functions producing a full snapshot of the store.
type Loader<T> = Arc<dyn Fn() -> Result<T> + Send + Sync>;

/// The parts of a view the auto-reload task needs. Holds no watcher, so
/// the task never keeps a watcher alive on its own.
struct ViewCore<T> {
    current: ArcSwap<T>,
    loader: Loader<T>,
    listeners: ReloadListeners,
    generation: AtomicU64,
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    metrics: MetricsSlot,
}

impl<T> ViewCore<T> {
    fn reload(&self) -> Result<u64> {
        // Bumped before loading; `save_at` compares against it
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(|m| m.start_reload());

        let loaded = (self.loader)();

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
            match &loaded {
                Ok(_) => metrics.record_reload_success(timer),
                Err(_) => metrics.record_reload_failure(timer),
            }
        }

        self.current.store(Arc::new(loaded?));
        debug!(generation, "view reloaded");
        self.listeners.notify_all(generation);
        Ok(generation)
    }
}

/// A consumer's in-memory snapshot of a watched store.
///
/// Wires a loader (full read of the store) and the consumer's writes to a
/// [`StoreWatcher`]:
/// - reads are lock-free snapshots via `arc-swap`
/// - [`save`](SyncedView::save) announces the write to the watcher right
///   before performing it, so it does not come back as a reload
/// - [`spawn_auto_reload`](SyncedView::spawn_auto_reload) reloads the whole
///   snapshot whenever the watcher signals an external change
///
/// Every reload bumps the view's generation. Background saves can capture the
/// generation up front and use [`save_at`](SyncedView::save_at), which refuses
/// to write once a reload has happened in between.
///
/// # Examples
///
/// ```rust,no_run
/// use storewatch::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example(store: FileMarkerStore) -> Result<()> {
/// let watcher = Arc::new(StoreWatcher::new(store, WatchSettings::default())?);
///
/// let view = SyncedView::load(Arc::clone(&watcher), || {
///     std::fs::read_to_string("sessions.json")
/// })?;
/// watcher.start()?;
/// let _task = view.spawn_auto_reload()?;
///
/// println!("{} bytes of sessions", view.get().len());
/// # Ok(())
/// # }
/// ```
pub struct SyncedView<T> {
    core: Arc<ViewCore<T>>,
    watcher: Arc<StoreWatcher>,
}

impl<T: Send + Sync + 'static> SyncedView<T> {
    /// Create a view and perform its initial full load.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::LoadError`] if the initial load fails.
    pub fn load<F, E>(watcher: Arc<StoreWatcher>, loader: F) -> Result<Self>
    where
        F: Fn() -> std::result::Result<T, E> + Send + Sync + 'static,
        E: Display,
    {
        let loader: Loader<T> =
            Arc::new(move || loader().map_err(|e| WatchError::LoadError(e.to_string())));
        let initial = loader()?;

        #[cfg(feature = "metrics")]
        let metrics = watcher.metrics().cloned();
        #[cfg(not(feature = "metrics"))]
        let metrics = ();

        Ok(Self {
            core: Arc::new(ViewCore {
                current: ArcSwap::new(Arc::new(initial)),
                loader,
                listeners: ReloadListeners::new(),
                generation: AtomicU64::new(0),
                metrics,
            }),
            watcher,
        })
    }

    /// Get a reference-counted handle to the current snapshot.
    ///
    /// Lock-free; readers never block reloads or other readers.
    pub fn get(&self) -> Arc<T> {
        self.core.current.load_full()
    }

    /// Number of reloads started on this view.
    pub fn generation(&self) -> u64 {
        self.core.generation.load(Ordering::SeqCst)
    }

    /// Reload the full snapshot from the store.
    ///
    /// If the loader fails, the previous snapshot is kept and the error is
    /// returned. Returns the new generation on success.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::LoadError`] if the loader fails.
    pub fn reload(&self) -> Result<u64> {
        self.core.reload()
    }

    /// Persist `value` with `writer` and make it the current snapshot.
    ///
    /// Calls [`StoreWatcher::notify_save`] immediately before `writer`, so the
    /// resulting marker advance is not reported back as an external change.
    /// The snapshot is only replaced if `writer` succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::SaveError`] if the writer fails.
    pub fn save<W, E>(&self, value: T, writer: W) -> Result<()>
    where
        W: FnOnce(&T) -> std::result::Result<(), E>,
        E: Display,
    {
        self.watcher.notify_save();
        writer(&value).map_err(|e| WatchError::SaveError(e.to_string()))?;

        self.core.current.store(Arc::new(value));
        self.core.listeners.notify_all(self.generation());
        Ok(())
    }

    /// Like [`save`](SyncedView::save), but only if no reload has started
    /// since the caller captured `generation`.
    ///
    /// The check is made right before the write; a reload that starts while
    /// the writer runs is not detected.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::StaleView`] if the view has been reloaded since
    /// `generation` was captured, or [`WatchError::SaveError`] if the writer
    /// fails.
    pub fn save_at<W, E>(&self, generation: u64, value: T, writer: W) -> Result<()>
    where
        W: FnOnce(&T) -> std::result::Result<(), E>,
        E: Display,
    {
        let current = self.generation();
        if current != generation {
            debug!(expected = generation, current, "refusing save against a reloaded view");
            return Err(WatchError::StaleView {
                expected: generation,
                current,
            });
        }
        self.save(value, writer)
    }

    /// Register a callback invoked with the generation whenever the snapshot
    /// is replaced by a reload or a save.
    pub fn subscribe<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.core.listeners.subscribe(callback)
    }

    /// Reload the view every time the watcher signals an external change.
    ///
    /// The task drains the watcher's reload channel and performs one full
    /// reload per signal. A failed reload is logged and the previous snapshot
    /// kept. The task ends when the watcher is closed. The loader runs on the
    /// runtime, so it should be a quick read.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NoRuntime`] if called outside a tokio runtime.
    pub fn spawn_auto_reload(&self) -> Result<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        let core = Arc::clone(&self.core);
        let reloads = self.watcher.reload_channel();

        Ok(handle.spawn(async move {
            while let Some(()) = reloads.recv().await {
                if let Err(e) = core.reload() {
                    warn!(error = %e, "reload after external change failed, keeping previous view");
                }
            }
            debug!("reload channel closed, auto-reload stopped");
        }))
    }

    /// The watcher this view is attached to.
    pub fn watcher(&self) -> &Arc<StoreWatcher> {
        &self.watcher
    }
}

impl<T> Clone for SyncedView<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            watcher: Arc::clone(&self.watcher),
        }
    }
}

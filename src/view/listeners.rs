//! Callbacks invoked whenever a synced view is replaced.

use parking_lot::RwLock;
use std::sync::{Arc, Weak};

type Listener = Arc<dyn Fn(u64) + Send + Sync>;

struct ListenerTable {
    listeners: Vec<(usize, Listener)>,
    next_id: usize,
}

/// Handle for a listener registration.
///
/// Dropping the handle removes the listener.
pub struct ListenerHandle {
    id: usize,
    table: Weak<RwLock<ListenerTable>>,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.write().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Registry of callbacks told about view replacements.
///
/// Each callback receives the view's generation after the change. Callbacks
/// run on the thread that replaced the view and are called outside the
/// registry lock, so they may subscribe or drop handles themselves.
///
/// # Examples
///
/// ```rust
/// use storewatch::view::ReloadListeners;
///
/// let listeners = ReloadListeners::new();
/// let handle = listeners.subscribe(|generation| {
///     println!("view replaced, generation {}", generation);
/// });
///
/// listeners.notify_all(1);
/// drop(handle);
/// assert_eq!(listeners.listener_count(), 0);
/// ```
#[derive(Clone)]
pub struct ReloadListeners {
    inner: Arc<RwLock<ListenerTable>>,
}

impl ReloadListeners {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ListenerTable {
                listeners: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Register a callback. Keep the handle alive for as long as the callback
    /// should be invoked.
    pub fn subscribe<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let mut table = self.inner.write();
        let id = table.next_id;
        table.next_id += 1;
        table.listeners.push((id, Arc::new(callback)));

        ListenerHandle {
            id,
            table: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every registered callback, in registration order.
    pub fn notify_all(&self, generation: u64) {
        let snapshot: Vec<Listener> = self
            .inner
            .read()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(generation);
        }
    }

    /// Number of registered callbacks.
    pub fn listener_count(&self) -> usize {
        self.inner.read().listeners.len()
    }
}

impl Default for ReloadListeners {
    fn default() -> Self {
        Self::new()
    }
}

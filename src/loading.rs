//! Reference-counted loading indicator.
//!
//! [`LoadingTracker`] counts in-flight requests and fires the "show" callback
//! on the 0→1 transition and the "hide" callback on the 1→0 transition.
//! [`LoadingGuard`] ties one request's slot to a value so the slot is
//! released exactly once, even if the request future is dropped.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// A no-argument callback driving the loading UI.
pub type LoadingCallback = Arc<dyn Fn() + Send + Sync>;

pub struct LoadingTracker {
    enabled: bool,
    /// Held across a transition and its callback so show/hide fire in order.
    edges: Mutex<()>,
    count: Mutex<usize>,
    on_show: Option<LoadingCallback>,
    on_hide: Option<LoadingCallback>,
}

impl LoadingTracker {
    pub fn new(enabled: bool, on_show: Option<LoadingCallback>, on_hide: Option<LoadingCallback>) -> Self {
        Self {
            enabled,
            edges: Mutex::new(()),
            count: Mutex::new(0),
            on_show,
            on_hide,
        }
    }

    /// Takes one slot. The counter is already updated when the callback
    /// runs, so the callback may read [`LoadingTracker::in_flight`]; it must
    /// not take or release slots itself.
    pub fn set_loading(&self) {
        if !self.enabled {
            return;
        }
        let _edges = lock(&self.edges);
        let shown = {
            let mut count = lock(&self.count);
            *count += 1;
            *count == 1
        };
        if shown {
            debug!("Loading shown");
            if let Some(show) = &self.on_show {
                show();
            }
        }
    }

    /// Releases one slot. Saturates at zero: an unbalanced call neither
    /// underflows nor fires "hide" a second time.
    pub fn hide_loading(&self) {
        if !self.enabled {
            return;
        }
        let _edges = lock(&self.edges);
        let hidden = {
            let mut count = lock(&self.count);
            if *count == 0 {
                return;
            }
            *count -= 1;
            *count == 0
        };
        if hidden {
            debug!("Loading hidden");
            if let Some(hide) = &self.on_hide {
                hide();
            }
        }
    }

    /// Number of requests currently holding a slot. Always 0 when disabled.
    pub fn in_flight(&self) -> usize {
        *lock(&self.count)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking callback poisons the lock; the guarded value stays valid.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One request's loading slot.
pub struct LoadingGuard {
    tracker: Arc<LoadingTracker>,
    released: bool,
}

impl LoadingGuard {
    /// Calls [`LoadingTracker::set_loading`] and returns the guard that owns
    /// the matching `hide_loading`.
    pub fn acquire(tracker: Arc<LoadingTracker>) -> Self {
        tracker.set_loading();
        Self {
            tracker,
            released: false,
        }
    }

    /// Releases the slot now. Later calls and the eventual drop are no-ops.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.hide_loading();
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.release();
    }
}

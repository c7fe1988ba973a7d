//! Shared connectivity state
//!
//! [`ConnectivityState`] holds the two flags every component consults:
//! whether the backend is believed reachable, and whether a sync pass is
//! currently running. The second flag is the engine's mutual exclusion;
//! it is only ever taken through [`ConnectivityState::try_begin_sync`],
//! whose guard releases it on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};

pub use ledgersync_core::domain::ConnectivitySignal;

/// Why a sync pass was requested outside of connectivity signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// An operation was enqueued while online
    Enqueued,
    /// An operator or caller asked for a pass explicitly
    Requested,
}

/// Online and in-progress flags shared by the queue, engine and monitor
#[derive(Debug)]
pub struct ConnectivityState {
    online: AtomicBool,
    sync_in_progress: AtomicBool,
}

impl ConnectivityState {
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            sync_in_progress: AtomicBool::new(false),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Sets the online flag and returns true if it changed
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::AcqRel) != online
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.sync_in_progress.load(Ordering::Acquire)
    }

    /// Claims the in-progress flag, or returns `None` if a pass already holds it
    pub fn try_begin_sync(&self) -> Option<SyncGuard<'_>> {
        self.sync_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard {
                flag: &self.sync_in_progress,
            })
    }
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Holds the in-progress flag; dropping it releases the flag
#[derive(Debug)]
#[must_use = "the sync flag is released as soon as the guard is dropped"]
pub struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_online_reports_transitions() {
        let state = ConnectivityState::new(false);
        assert!(!state.is_online());
        assert!(state.set_online(true));
        assert!(!state.set_online(true));
        assert!(state.is_online());
        assert!(state.set_online(false));
    }

    #[test]
    fn test_guard_is_exclusive_and_released_on_drop() {
        let state = ConnectivityState::new(true);
        let guard = state.try_begin_sync().expect("first claim succeeds");
        assert!(state.is_sync_in_progress());
        assert!(state.try_begin_sync().is_none());

        drop(guard);
        assert!(!state.is_sync_in_progress());
        assert!(state.try_begin_sync().is_some());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let state = ConnectivityState::new(true);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = state.try_begin_sync().unwrap();
            panic!("pass blew up");
        }));
        assert!(result.is_err());
        assert!(!state.is_sync_in_progress());
    }
}

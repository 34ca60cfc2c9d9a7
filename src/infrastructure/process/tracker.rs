//! Set of currently running supervised processes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::domain::models::{ProcessHandle, ProcessState};

/// Process handles keyed by pid.
///
/// Supervisors insert a handle right after spawn and remove it once the
/// exit has been observed; the signal coordinator only reads it. Every
/// operation is a short synchronous insert/remove/copy, so a plain
/// mutex that is never held across an await point is enough.
#[derive(Debug, Default)]
pub struct ProcessTracker {
    handles: Mutex<HashMap<u32, ProcessHandle>>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, ProcessHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn track(&self, handle: ProcessHandle) {
        debug!(pid = handle.pid, program = %handle.program, "Tracking process");
        self.lock().insert(handle.pid, handle);
    }

    pub fn set_state(&self, pid: u32, state: ProcessState) {
        if let Some(handle) = self.lock().get_mut(&pid) {
            handle.state = state;
        }
    }

    pub fn untrack(&self, pid: u32) -> Option<ProcessHandle> {
        let removed = self.lock().remove(&pid);
        if removed.is_some() {
            debug!(pid, "Untracked process");
        }
        removed
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.lock().contains_key(&pid)
    }

    /// Copy of every tracked handle, oldest first.
    pub fn snapshot(&self) -> Vec<ProcessHandle> {
        let mut handles: Vec<ProcessHandle> = self.lock().values().cloned().collect();
        handles.sort_by_key(|h| (h.started_at, h.pid));
        handles
    }

    pub fn pids(&self) -> Vec<u32> {
        self.snapshot().into_iter().map(|h| h.pid).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_untrack() {
        let tracker = ProcessTracker::new();
        tracker.track(ProcessHandle::new(41, "npx", vec!["playwright".to_string()]));
        tracker.track(ProcessHandle::new(42, "sleep", vec!["10".to_string()]));
        assert_eq!(tracker.len(), 2);

        tracker.set_state(42, ProcessState::Terminating);
        let handle = tracker.untrack(42).unwrap();
        assert_eq!(handle.state, ProcessState::Terminating);

        assert!(!tracker.contains(42));
        assert!(tracker.untrack(42).is_none());
        assert_eq!(tracker.pids(), vec![41]);
    }
}

//! Shared call log for the test doubles
//!
//! Every double in an environment records into the same [`CallRecorder`],
//! so a test can assert on the global order of remote and engine calls, or
//! that nothing was called at all.

use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered log of calls made on the doubles
#[derive(Debug, Clone, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call, e.g. `KeyService.register_device`
    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    /// Snapshot of every recorded call
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of times `call` was recorded
    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// True if no call was recorded
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_counts_calls() {
        let recorder = CallRecorder::new();
        assert!(recorder.is_empty());

        recorder.record("KeyService.register_device");
        recorder.record("KeyService.list_pending_operations");
        recorder.record("KeyService.list_pending_operations");

        assert_eq!(recorder.count("KeyService.list_pending_operations"), 2);
        assert_eq!(recorder.calls()[0], "KeyService.register_device");

        recorder.clear();
        assert!(recorder.is_empty());
    }
}

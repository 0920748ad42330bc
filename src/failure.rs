use std::sync::{Arc, Mutex};

/// Shared slot that keeps the first error recorded by any worker. Later
/// errors are logged and discarded so the originating failure is the one
/// reported after the concurrent join.
#[derive(Clone, Default)]
pub(crate) struct FailureSlot {
    first: Arc<Mutex<Option<anyhow::Error>>>,
}

impl FailureSlot {
    pub(crate) fn new() -> FailureSlot {
        FailureSlot::default()
    }

    pub(crate) fn record(&self, error: anyhow::Error) {
        let mut slot = self.first.lock().unwrap();
        if slot.is_none() {
            *slot = Some(error);
        } else {
            log::debug!("secondary failure suppressed: {:#}", error);
        }
    }

    pub(crate) fn take(&self) -> Option<anyhow::Error> {
        self.first.lock().unwrap().take()
    }
}

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::cancellation::{CancellationToken, Cancelled};

const WAIT_POLL: Duration = Duration::from_millis(50);

/// One-shot start signal. A sort configured with a gate does no work
/// until some other thread calls [`signal`](StartGate::signal); the first
/// call releases all waiters and later calls are no-ops. Waiting races
/// cancellation, so a gated sort can still be shut down before it starts.
///
/// # Examples
/// ```
/// use std::thread;
/// use numbered_line_sort::cancellation::CancellationToken;
/// use numbered_line_sort::coordinator::StartGate;
///
/// let gate = StartGate::new();
/// let waiter = gate.clone();
/// let handle = thread::spawn(move || waiter.wait(&CancellationToken::new()));
/// gate.signal();
/// handle.join().unwrap().unwrap();
/// ```
#[derive(Clone, Default)]
pub struct StartGate {
    inner: Arc<GateState>,
}

#[derive(Default)]
struct GateState {
    signalled: Mutex<bool>,
    released: Condvar,
}

impl StartGate {
    pub fn new() -> StartGate {
        StartGate::default()
    }

    /// Release the gate. Idempotent.
    pub fn signal(&self) {
        let mut signalled = self.inner.signalled.lock().unwrap();
        if !*signalled {
            *signalled = true;
            self.inner.released.notify_all();
        }
    }

    pub fn is_signalled(&self) -> bool {
        *self.inner.signalled.lock().unwrap()
    }

    /// Block until the gate is signalled or `token` is cancelled,
    /// whichever comes first.
    pub fn wait(&self, token: &CancellationToken) -> Result<(), anyhow::Error> {
        let mut signalled = self.inner.signalled.lock().unwrap();
        loop {
            if *signalled {
                return Ok(());
            }
            if token.is_cancelled() {
                return Err(anyhow::Error::new(Cancelled));
            }
            let (guard, _) = self
                .inner
                .released
                .wait_timeout(signalled, WAIT_POLL)
                .unwrap();
            signalled = guard;
        }
    }
}

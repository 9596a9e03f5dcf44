//! Injectable per-request instrumentation.
//!
//! The resource client fires exactly one event per request/response pair,
//! after the response body has been fully read, so harnesses can count
//! round trips deterministically. There is no process-wide registry; hooks
//! are attached per client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One completed request/response pair.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Size of the response body as read from the wire.
    pub body_bytes: usize,
}

/// Observer invoked once per request. Must be safe to call from any thread
/// issuing requests.
pub trait RequestObserver: Send + Sync {
    fn on_response(&self, event: &RequestEvent);
}

/// Counts round trips and remembers response statuses in arrival order.
#[derive(Debug, Default)]
pub struct RequestCounter {
    count: AtomicUsize,
    statuses: Mutex<Vec<u16>>,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn statuses(&self) -> Vec<u16> {
        self.statuses
            .lock()
            .map(|statuses| statuses.clone())
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.clear();
        }
    }
}

impl RequestObserver for RequestCounter {
    fn on_response(&self, event: &RequestEvent) {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.push(event.status);
        }
    }
}

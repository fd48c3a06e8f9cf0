use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Cooperative stop flag shared by the command loop, the console and the
/// status poller.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Block until someone requests shutdown, checking every `poll`.
    pub fn wait(&self, poll: Duration) {
        while !self.is_requested() {
            thread::sleep(poll);
        }
    }
}

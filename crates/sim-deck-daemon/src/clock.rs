//! Sleep abstraction for combo holds and macro delays

use std::sync::Mutex;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};

/// Source of delays for the executors.
///
/// The daemon uses [`TokioClock`]; tests swap in [`RecordingClock`] to check
/// requested delays without waiting for them.
pub trait Clock: Send + Sync {
    /// Suspend the calling task (not the thread) for `duration`
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real wall-clock delays on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Records every requested delay and completes immediately
#[derive(Debug, Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// All requested delays, in request order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for RecordingClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.sleeps.lock().unwrap().push(duration);
        future::ready(()).boxed()
    }
}

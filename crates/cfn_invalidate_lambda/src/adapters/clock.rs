use std::time::{Duration, Instant};

use crate::runtime::polling::{Clock, Sleeper};

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Parks the current worker on the ambient multi-thread tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuntimeSleeper;

impl Sleeper for RuntimeSleeper {
    fn sleep(&self, duration: Duration) {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(tokio::time::sleep(duration))
        })
    }
}

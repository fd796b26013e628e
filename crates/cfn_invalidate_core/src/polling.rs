use std::time::{Duration, Instant};

/// CloudFront's `InvalidationCompleted` waiter delay.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);
/// CloudFront's waiter gives up after 30 attempts of 20 seconds.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub trait Clock {
    fn now(&self) -> Instant;
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
    timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(MIN_POLL_INTERVAL),
            timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Shrinks the ceiling so polling ends within `budget`.
    pub fn clamped_to(self, budget: Duration) -> Self {
        Self {
            interval: self.interval,
            timeout: self.timeout.min(budget),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready { value: T, probes: u32 },
    TimedOut { probes: u32, elapsed: Duration },
}

/// Runs `probe` until it yields a value, fails, or the policy ceiling passes.
///
/// The first probe happens immediately. Sleeps never overshoot the
/// deadline, and one last probe is made once it is reached.
pub fn poll_until<T, E>(
    policy: PollPolicy,
    clock: &dyn Clock,
    sleeper: &dyn Sleeper,
    mut probe: impl FnMut(u32) -> Result<Option<T>, E>,
) -> Result<PollOutcome<T>, E> {
    let started_at = clock.now();
    let mut probes = 0u32;

    loop {
        probes += 1;
        if let Some(value) = probe(probes)? {
            return Ok(PollOutcome::Ready { value, probes });
        }

        let elapsed = clock.now().saturating_duration_since(started_at);
        if elapsed >= policy.timeout {
            return Ok(PollOutcome::TimedOut { probes, elapsed });
        }

        sleeper.sleep(policy.interval.min(policy.timeout - elapsed));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    struct FakeTime {
        origin: Instant,
        offset: Cell<Duration>,
        sleeps: RefCell<Vec<Duration>>,
    }

    impl FakeTime {
        fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Cell::new(Duration::ZERO),
                sleeps: RefCell::new(Vec::new()),
            }
        }
    }

    impl Clock for FakeTime {
        fn now(&self) -> Instant {
            self.origin + self.offset.get()
        }
    }

    impl Sleeper for FakeTime {
        fn sleep(&self, duration: Duration) {
            self.offset.set(self.offset.get() + duration);
            self.sleeps.borrow_mut().push(duration);
        }
    }

    #[test]
    fn returns_on_first_ready_probe_without_sleeping() {
        let time = FakeTime::new();
        let outcome = poll_until(PollPolicy::default(), &time, &time, |_| {
            Ok::<_, String>(Some("done"))
        })
        .expect("poll should succeed");

        assert_eq!(
            outcome,
            PollOutcome::Ready {
                value: "done",
                probes: 1
            }
        );
        assert!(time.sleeps.borrow().is_empty());
    }

    #[test]
    fn default_policy_matches_cloudfront_waiter_attempts() {
        let time = FakeTime::new();
        let outcome = poll_until(PollPolicy::default(), &time, &time, |_| {
            Ok::<Option<()>, String>(None)
        })
        .expect("poll should not error");

        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                probes: 31,
                elapsed: DEFAULT_POLL_TIMEOUT
            }
        );
        assert_eq!(time.sleeps.borrow().len(), 30);
    }

    #[test]
    fn final_sleep_is_trimmed_to_deadline() {
        let time = FakeTime::new();
        let policy = PollPolicy::new(Duration::from_secs(20), Duration::from_secs(50));
        poll_until(policy, &time, &time, |_| Ok::<Option<()>, String>(None))
            .expect("poll should not error");

        assert_eq!(
            *time.sleeps.borrow(),
            vec![
                Duration::from_secs(20),
                Duration::from_secs(20),
                Duration::from_secs(10)
            ]
        );
    }

    #[test]
    fn probe_error_stops_polling() {
        let time = FakeTime::new();
        let error = poll_until(PollPolicy::default(), &time, &time, |probe| {
            if probe == 3 {
                Err("throttled".to_string())
            } else {
                Ok::<Option<()>, String>(None)
            }
        })
        .expect_err("probe failure should propagate");

        assert_eq!(error, "throttled");
        assert_eq!(time.sleeps.borrow().len(), 2);
    }

    #[test]
    fn zero_interval_is_raised_to_minimum() {
        let policy = PollPolicy::new(Duration::ZERO, Duration::from_secs(5));
        assert_eq!(policy.interval(), MIN_POLL_INTERVAL);
    }

    #[test]
    fn clamping_only_shrinks_timeout() {
        let policy = PollPolicy::default();
        assert_eq!(
            policy.clamped_to(Duration::from_secs(120)).timeout(),
            Duration::from_secs(120)
        );
        assert_eq!(
            policy.clamped_to(Duration::from_secs(900)).timeout(),
            DEFAULT_POLL_TIMEOUT
        );
    }
}

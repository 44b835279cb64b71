use std::time::Duration;

/// Fixed-interval retry policy.
///
/// `max_retries` counts re-attempts after the first try, so a policy of
/// `5 × 250ms` makes at most six attempts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub const fn new(interval: Duration, max_retries: u32) -> Self {
        Self {
            interval,
            max_retries,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), 5)
    }
}

/// Outcome of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStep<T> {
    Done(T),
    /// The predicate missed; try again after the given delay.
    RetryAfter(Duration),
    /// The predicate missed and the retry budget is spent.
    Exhausted,
}

/// Bounded retry state shared by readiness polling and feature matching.
///
/// The caller owns scheduling: after `RetryAfter(d)` it arranges for
/// [`BoundedRetry::attempt`] to run again once `d` has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedRetry {
    policy: RetryPolicy,
    attempts: u32,
}

impl BoundedRetry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts > self.policy.max_retries
    }

    /// Runs `predicate` once and reports what to do next.
    pub fn attempt<T, F>(&mut self, predicate: F) -> RetryStep<T>
    where
        F: FnOnce() -> Option<T>,
    {
        if self.is_exhausted() {
            return RetryStep::Exhausted;
        }
        self.attempts += 1;
        if let Some(v) = predicate() {
            return RetryStep::Done(v);
        }
        if self.is_exhausted() {
            RetryStep::Exhausted
        } else {
            RetryStep::RetryAfter(self.policy.interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundedRetry, RetryPolicy, RetryStep};
    use std::time::Duration;

    #[test]
    fn gives_up_after_max_retries() {
        let mut r = BoundedRetry::new(RetryPolicy::new(Duration::from_millis(250), 5));
        let mut calls = 0;
        let mut steps = Vec::new();
        loop {
            let step: RetryStep<()> = r.attempt(|| {
                calls += 1;
                None
            });
            let done = step == RetryStep::Exhausted;
            steps.push(step);
            if done {
                break;
            }
        }
        assert_eq!(calls, 6);
        assert_eq!(
            steps.iter().filter(|s| matches!(s, RetryStep::RetryAfter(_))).count(),
            5
        );
        assert_eq!(r.attempt(|| Some(1)), RetryStep::Exhausted);
    }

    #[test]
    fn stops_on_first_hit() {
        let mut r = BoundedRetry::new(RetryPolicy::default());
        assert_eq!(
            r.attempt::<u8, _>(|| None),
            RetryStep::RetryAfter(Duration::from_millis(250))
        );
        assert_eq!(r.attempt(|| Some(7u8)), RetryStep::Done(7));
        assert_eq!(r.attempts(), 2);
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        let mut r = BoundedRetry::new(RetryPolicy::new(Duration::from_millis(10), 0));
        assert_eq!(r.attempt::<(), _>(|| None), RetryStep::Exhausted);
    }
}

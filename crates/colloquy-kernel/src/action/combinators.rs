//! Control-flow combinators.
//!
//! | Combinator | Result |
//! |------------|--------|
//! | `sequence` | `false` at the first failing child, else `true` |
//! | `selector` | `true` at the first succeeding child, else `false` |
//! | `always_fail` / `always_success` | fixed, after running the child |
//! | `inverter` | negation of the child |
//! | `retry_until_success(n, a)` | `true` at the first success within `n` attempts |
//! | `repeat_until_timer_expires(t, a)` | `false` if `a` fails before `t`; `true` once `t` elapses |
//! | `no_longer_than(t, a)` | the child's result, or `false` once `t` elapses |
//! | `random_one_of` | one uniformly chosen child; `true` when there are none |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::context::Context;
use crate::error::Result;

use super::{Action, BoxAction};

struct Sequence(Vec<BoxAction>);

#[async_trait]
impl Action for Sequence {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        for child in &self.0 {
            if !child.run(ctx).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Run children in order while they succeed.
pub fn sequence(children: impl IntoIterator<Item = BoxAction>) -> BoxAction {
    Arc::new(Sequence(children.into_iter().collect()))
}

struct Selector(Vec<BoxAction>);

#[async_trait]
impl Action for Selector {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        for child in &self.0 {
            if child.run(ctx).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Run children in order until one succeeds.
pub fn selector(children: impl IntoIterator<Item = BoxAction>) -> BoxAction {
    Arc::new(Selector(children.into_iter().collect()))
}

struct Fixed {
    child: BoxAction,
    outcome: bool,
}

#[async_trait]
impl Action for Fixed {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        self.child.run(ctx).await?;
        Ok(self.outcome)
    }
}

pub fn always_fail(child: BoxAction) -> BoxAction {
    Arc::new(Fixed {
        child,
        outcome: false,
    })
}

pub fn always_success(child: BoxAction) -> BoxAction {
    Arc::new(Fixed {
        child,
        outcome: true,
    })
}

struct Inverter(BoxAction);

#[async_trait]
impl Action for Inverter {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        Ok(!self.0.run(ctx).await?)
    }
}

pub fn inverter(child: BoxAction) -> BoxAction {
    Arc::new(Inverter(child))
}

struct RetryUntilSuccess {
    attempts: u32,
    child: BoxAction,
}

#[async_trait]
impl Action for RetryUntilSuccess {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        for attempt in 1..=self.attempts {
            if self.child.run(ctx).await? {
                return Ok(true);
            }
            tracing::trace!(conversation = %ctx.id(), attempt, "attempt failed");
        }
        Ok(false)
    }
}

/// Run `child` up to `attempts` times until it succeeds.
///
/// The child always runs at least once, even when `attempts` is zero.
pub fn retry_until_success(attempts: u32, child: BoxAction) -> BoxAction {
    Arc::new(RetryUntilSuccess {
        attempts: attempts.max(1),
        child,
    })
}

async fn repeat_until_failure(child: &dyn Action, ctx: &mut Context) -> Result<bool> {
    loop {
        if !child.run(ctx).await? {
            return Ok(false);
        }
        // A child that never suspends must not starve the runtime.
        tokio::task::yield_now().await;
    }
}

struct RepeatUntilTimerExpires {
    duration: Duration,
    child: BoxAction,
}

#[async_trait]
impl Action for RepeatUntilTimerExpires {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        match tokio::time::timeout(self.duration, repeat_until_failure(self.child.as_ref(), ctx))
            .await
        {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::debug!(conversation = %ctx.id(), "repeat timer expired");
                Ok(true)
            }
        }
    }
}

/// Re-run `child` until it fails or `seconds` elapse.
///
/// A failure before the deadline is returned as `false`.  Reaching the
/// deadline counts as success, whatever the child's last outcome was.
pub fn repeat_until_timer_expires(seconds: f64, child: BoxAction) -> BoxAction {
    Arc::new(RepeatUntilTimerExpires {
        duration: seconds_to_duration(seconds),
        child,
    })
}

struct NoLongerThan {
    duration: Duration,
    child: BoxAction,
}

#[async_trait]
impl Action for NoLongerThan {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        match tokio::time::timeout(self.duration, self.child.run(ctx)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::debug!(conversation = %ctx.id(), "deadline exceeded");
                Ok(false)
            }
        }
    }
}

/// Run `child` under a deadline.  Timing out is a failure.
pub fn no_longer_than(seconds: f64, child: BoxAction) -> BoxAction {
    Arc::new(NoLongerThan {
        duration: seconds_to_duration(seconds),
        child,
    })
}

struct RandomOneOf(Vec<BoxAction>);

#[async_trait]
impl Action for RandomOneOf {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        if self.0.is_empty() {
            return Ok(true);
        }
        let index = rand::thread_rng().gen_range(0..self.0.len());
        self.0[index].run(ctx).await
    }
}

/// Run one uniformly chosen child.
pub fn random_one_of(children: impl IntoIterator<Item = BoxAction>) -> BoxAction {
    Arc::new(RandomOneOf(children.into_iter().collect()))
}

/// Negative and NaN durations clamp to zero.
pub(crate) fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::context::{Author, Message};
    use crate::error::RuntimeError;
    use crate::platform::RecordingPlatform;

    /// Returns scripted outcomes, optionally after a delay, and counts calls.
    struct Scripted {
        outcomes: Vec<bool>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(outcomes: &[bool]) -> Arc<Self> {
            Self::delayed(outcomes, Duration::ZERO)
        }

        fn delayed(outcomes: &[bool], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcomes: outcomes.to_vec(),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Action for Scripted {
        async fn run(&self, _ctx: &mut Context) -> Result<bool> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let last = self.outcomes.last().copied().unwrap_or(true);
            Ok(self.outcomes.get(n).copied().unwrap_or(last))
        }
    }

    struct Boom;

    #[async_trait]
    impl Action for Boom {
        async fn run(&self, _ctx: &mut Context) -> Result<bool> {
            Err(RuntimeError::Internal("boom".into()))
        }
    }

    fn ctx() -> Context {
        Context::new(
            Message::new(Author::new("u1", "Alice"), "c1", "x"),
            Arc::new(RecordingPlatform::new()),
        )
    }

    #[tokio::test]
    async fn sequence_short_circuits_on_failure() {
        let first = Scripted::new(&[false]);
        let second = Scripted::new(&[true]);
        let tree = sequence([first.clone() as BoxAction, second.clone()]);

        assert!(!tree.run(&mut ctx()).await.unwrap());
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn selector_short_circuits_on_success() {
        let first = Scripted::new(&[true]);
        let second = Scripted::new(&[true]);
        let tree = selector([first.clone() as BoxAction, second.clone()]);

        assert!(tree.run(&mut ctx()).await.unwrap());
        assert_eq!(second.calls(), 0);

        let none = selector([Scripted::new(&[false]) as BoxAction]);
        assert!(!none.run(&mut ctx()).await.unwrap());
    }

    #[tokio::test]
    async fn fixed_outcomes_still_run_the_child() {
        let child = Scripted::new(&[true]);
        assert!(!always_fail(child.clone()).run(&mut ctx()).await.unwrap());
        assert!(
            always_success(Scripted::new(&[false]))
                .run(&mut ctx())
                .await
                .unwrap()
        );
        assert_eq!(child.calls(), 1);
        assert!(!inverter(Scripted::new(&[true])).run(&mut ctx()).await.unwrap());
    }

    #[tokio::test]
    async fn retry_stops_at_first_success() {
        let child = Scripted::new(&[false, false, true]);
        assert!(retry_until_success(3, child.clone()).run(&mut ctx()).await.unwrap());
        assert_eq!(child.calls(), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_n_attempts() {
        let child = Scripted::new(&[false]);
        assert!(!retry_until_success(3, child.clone()).run(&mut ctx()).await.unwrap());
        assert_eq!(child.calls(), 3);

        let once = Scripted::new(&[false]);
        retry_until_success(0, once.clone()).run(&mut ctx()).await.unwrap();
        assert_eq!(once.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_treats_timer_expiry_as_success() {
        // Two successes at 4s and 8s, then a failure that would land at 12s,
        // after the 10s deadline.
        let child = Scripted::delayed(&[true, true, false], Duration::from_secs(4));
        let started = tokio::time::Instant::now();
        let ok = repeat_until_timer_expires(10.0, child.clone())
            .run(&mut ctx())
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(child.calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_propagates_failure_before_deadline() {
        let child = Scripted::delayed(&[true, false], Duration::from_secs(1));
        let ok = repeat_until_timer_expires(10.0, child.clone())
            .run(&mut ctx())
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(child.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_longer_than_times_out_as_failure() {
        let slow = Scripted::delayed(&[true], Duration::from_secs(60));
        assert!(!no_longer_than(5.0, slow).run(&mut ctx()).await.unwrap());

        let fast = Scripted::delayed(&[true], Duration::from_secs(1));
        assert!(no_longer_than(5.0, fast).run(&mut ctx()).await.unwrap());
    }

    #[tokio::test]
    async fn random_one_of_runs_exactly_one_child() {
        let a = Scripted::new(&[true]);
        let b = Scripted::new(&[true]);
        let tree = random_one_of([a.clone() as BoxAction, b.clone()]);
        for _ in 0..10 {
            tree.run(&mut ctx()).await.unwrap();
        }
        assert_eq!(a.calls() + b.calls(), 10);

        let empty = random_one_of(Vec::new());
        assert!(empty.run(&mut ctx()).await.unwrap());
    }

    #[tokio::test]
    async fn errors_propagate_through_combinators() {
        let tree = selector([
            sequence([Arc::new(Boom) as BoxAction]),
            Scripted::new(&[true]),
        ]);
        assert!(matches!(
            always_success(tree).run(&mut ctx()).await,
            Err(RuntimeError::Internal(_))
        ));
    }

    #[test]
    fn durations_clamp() {
        assert_eq!(seconds_to_duration(-1.0), Duration::ZERO);
        assert_eq!(seconds_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(seconds_to_duration(1.5), Duration::from_millis(1500));
    }
}

//! Retry policies for `FLOOD_WAIT` and transient I/O errors.

use std::future::Future;
use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::errors::RemoteError;

/// Controls how a failed remote call is retried.
pub trait RetryPolicy: Send + Sync + 'static {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> ControlFlow<(), Duration>;
}

/// Context passed to [`RetryPolicy::should_retry`] on each failure.
pub struct RetryContext<'a> {
    pub fail_count:   NonZeroU32,
    pub slept_so_far: Duration,
    pub error:        &'a RemoteError,
}

/// Never retry.
pub struct NoRetries;
impl RetryPolicy for NoRetries {
    fn should_retry(&self, _: &RetryContext<'_>) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Sleep through short FLOOD_WAITs and retry transient I/O failures a few times.
pub struct AutoSleep {
    /// How many times a transient failure is retried.
    pub retries:         u32,
    /// Pause before retrying a transient failure.
    pub io_delay:        Duration,
    /// Longest FLOOD_WAIT worth sleeping through.
    pub flood_threshold: Duration,
}

impl Default for AutoSleep {
    fn default() -> Self {
        Self {
            retries:         3,
            io_delay:        Duration::from_secs(1),
            flood_threshold: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy for AutoSleep {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> ControlFlow<(), Duration> {
        if let Some(secs) = ctx.error.flood_wait_seconds() {
            if ctx.fail_count.get() == 1 && secs <= self.flood_threshold.as_secs() {
                tracing::info!("[mediadl] FLOOD_WAIT_{secs}, sleeping before retry");
                return ControlFlow::Continue(Duration::from_secs(secs));
            }
        }
        if ctx.error.is_transient() && ctx.fail_count.get() <= self.retries {
            tracing::warn!(
                "[mediadl] {} (attempt {}), retrying in {:?}",
                ctx.error, ctx.fail_count, self.io_delay
            );
            return ControlFlow::Continue(self.io_delay);
        }
        ControlFlow::Break(())
    }
}

/// Run `op` until it succeeds or `policy` gives up.
pub(crate) async fn retrying<T, F, Fut>(policy: &dyn RetryPolicy, mut op: F) -> Result<T, RemoteError>
where
    F:   FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut fail_count   = NonZeroU32::MIN;
    let mut slept_so_far = Duration::ZERO;
    loop {
        let error = match op().await {
            Ok(v)  => return Ok(v),
            Err(e) => e,
        };
        let ctx = RetryContext { fail_count, slept_so_far, error: &error };
        match policy.should_retry(&ctx) {
            ControlFlow::Continue(delay) => {
                tokio::time::sleep(delay).await;
                slept_so_far += delay;
                fail_count = fail_count.saturating_add(1);
            }
            ControlFlow::Break(()) => return Err(error),
        }
    }
}

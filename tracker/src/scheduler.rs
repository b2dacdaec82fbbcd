//! Fixed-interval poll loop.
//!
//! [`PollScheduler`] runs a tick callback on a tokio interval until it is
//! stopped. Stopping is cooperative: it prevents future ticks, but a tick
//! that is already running is always allowed to finish. Ticks that are
//! missed while a slow tick runs are skipped rather than replayed.
//!
//! # Example
//!
//! ```no_run
//! use std::ops::ControlFlow;
//! use std::time::Duration;
//! use livediff_tracker::scheduler::PollScheduler;
//!
//! # async fn example() {
//! let scheduler = PollScheduler::start(Duration::from_secs(3), || async {
//!     println!("tick");
//!     ControlFlow::Continue(())
//! });
//!
//! // Later...
//! scheduler.stop();
//! # }
//! ```

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Handle to a running poll loop. Dropping the handle stops the loop.
#[derive(Debug)]
pub struct PollScheduler {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    period: Duration,
}

impl PollScheduler {
    /// Spawns a loop that calls `tick` every `period`.
    ///
    /// The first tick fires one `period` after start. The loop ends when the
    /// scheduler is stopped or dropped, or when `tick` returns
    /// [`ControlFlow::Break`].
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero, or if called outside a tokio runtime.
    pub fn start<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        // The tick body is not a select branch future, so a
                        // cancellation arriving now waits for it to finish.
                        if tick().await.is_break() {
                            break;
                        }
                    }
                }
            }
            trace!("Poll loop exited");
        });

        Self {
            token,
            handle: Some(handle),
            period,
        }
    }

    /// Interval between ticks.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Prevents any further ticks. An in-flight tick runs to completion.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns true once [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops the loop and waits for an in-flight tick to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

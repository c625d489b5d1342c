//! Recurring background tasks.
//!
//! A task only has to run roughly on schedule: missed ticks are skipped
//! rather than bunched up, and nothing in the foreground depends on a task
//! having run.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait RecurringTask: Send + Sync + 'static {
    /// Name of the task (logging only).
    fn name(&self) -> &str;

    /// Perform one run. Failures are the task's own business to log; a
    /// failed run never stops the schedule.
    async fn run(&self);
}

/// Run `task` every `interval` until `cancel` fires.
///
/// The first run happens immediately. Must be called from within a Tokio
/// runtime.
pub fn spawn_recurring<T: RecurringTask + ?Sized>(task: Arc<T>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticks.tick() => {
                    tracing::debug!(task = task.name(), "Running recurring task");
                    task.run().await;
                },
            }
        }
        tracing::debug!(task = task.name(), "Recurring task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    #[async_trait]
    impl RecurringTask for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn run(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_schedule_until_cancelled() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let cancel = CancellationToken::new();
        let handle = spawn_recurring(counter.clone(), Duration::from_secs(60), cancel.clone());

        // Immediately, then at 60s and 120s.
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }
}

//! Interval Scheduler
//!
//! One independent task per interval, each sleeping until the next
//! calendar-aligned boundary of its interval and then asking the
//! [`FlushCoordinator`] to flush it. A slow flush of one interval never
//! delays the ticks of another.
//!
//! Missed boundaries are not replayed: after a pause the task fires once and
//! then realigns to the next boundary after the current time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::flush::FlushCoordinator;
use crate::application::ports::Clock;
use crate::domain::interval::Interval;

/// Spawns the per-interval flush tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalScheduler;

impl IntervalScheduler {
    /// Start one flush task per interval.
    ///
    /// Tasks stop when `cancel` (or the returned handle) is cancelled. A tick
    /// already in progress is allowed to finish.
    #[must_use]
    pub fn spawn(
        coordinator: Arc<FlushCoordinator>,
        intervals: &[Interval],
        clock: Arc<dyn Clock>,
        cancel: &CancellationToken,
    ) -> SchedulerHandle {
        let cancel = cancel.child_token();

        let tasks = intervals
            .iter()
            .map(|&interval| {
                let coordinator = Arc::clone(&coordinator);
                let clock = Arc::clone(&clock);
                let cancel = cancel.clone();
                tokio::spawn(run_interval(coordinator, interval, clock, cancel))
            })
            .collect();

        tracing::info!(intervals = ?intervals, "Interval scheduler started");

        SchedulerHandle { cancel, tasks }
    }
}

/// Handle to the running scheduler tasks.
#[derive(Debug)]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Number of running interval tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop future ticks and wait for every task to exit.
    ///
    /// Bucket contents are left untouched.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Interval task failed");
            }
        }
        tracing::info!("Interval scheduler stopped");
    }
}

async fn run_interval(
    coordinator: Arc<FlushCoordinator>,
    interval: Interval,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) {
    let mut last_fired: Option<DateTime<Utc>> = None;

    loop {
        // A wall clock stepping backwards must not re-fire a boundary.
        let now = clock.now();
        let from = last_fired.map_or(now, |fired| now.max(fired));
        let boundary = interval.next_boundary(from);

        // The monotonic timer and the wall clock can drift apart; keep
        // sleeping until the wall clock has actually reached the boundary.
        loop {
            let now = clock.now();
            if now >= boundary {
                break;
            }
            let wait = (boundary - now).to_std().unwrap_or_default();
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(interval = %interval, "Interval task cancelled");
                    return;
                }
                () = tokio::time::sleep(wait) => {}
            }
        }

        let lateness = clock.now() - boundary;
        if lateness.num_seconds() >= interval.period_secs() {
            tracing::warn!(
                interval = %interval,
                boundary = %boundary,
                late_secs = lateness.num_seconds(),
                "Missed flush boundaries, flushing once and realigning"
            );
        }

        last_fired = Some(boundary);
        let report = coordinator.on_tick(interval).await;
        tracing::info!(
            interval = %interval,
            boundary = %boundary,
            records = report.records,
            failed = report.failed,
            "Flush tick"
        );
    }
}

//! Background alert scheduler: periodic check trigger.
//!
//! Spawns a thread that runs one pipeline cycle every poll interval and
//! reports the outcome to the host. The interval never drops below
//! 15 minutes. Consecutive failures stretch the wait, up to 4x.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::pipeline::AlertPipeline;

/// Floor for the poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Upper bound on failure backoff, as a multiple of the poll interval.
const MAX_BACKOFF_FACTOR: u32 = 4;

/// What a background run reports back to the host scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundFetchResult {
    NewData,
    NoData,
    Failed,
}

pub fn clamp_poll_interval(requested: Duration) -> Duration {
    requested.max(MIN_POLL_INTERVAL)
}

/// Body of one background task execution. Safe to call headless.
pub fn run_background_fetch(pipeline: &AlertPipeline) -> BackgroundFetchResult {
    match pipeline.run_check() {
        Ok(outcome) if outcome.has_new_alerts() => BackgroundFetchResult::NewData,
        Ok(_) => BackgroundFetchResult::NoData,
        Err(e) => {
            tracing::error!(error = %e, "Background alert fetch failed");
            BackgroundFetchResult::Failed
        }
    }
}

/// Handle for the background scheduler thread.
///
/// Supports graceful shutdown via `shutdown()` or automatic cleanup on `Drop`.
pub struct BackgroundSchedulerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundSchedulerHandle {
    /// Request shutdown and wake the thread if it is waiting. A cycle
    /// already in progress completes first.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(h) = &self.handle {
            h.thread().unpark();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for BackgroundSchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Start the background scheduler.
///
/// `interval` is clamped to [`MIN_POLL_INTERVAL`]. `report` receives the
/// result of every run.
pub fn start_background_scheduler<F>(
    pipeline: Arc<AlertPipeline>,
    interval: Duration,
    report: F,
) -> BackgroundSchedulerHandle
where
    F: Fn(BackgroundFetchResult) + Send + 'static,
{
    spawn_scheduler(pipeline, clamp_poll_interval(interval), report)
}

fn spawn_scheduler<F>(
    pipeline: Arc<AlertPipeline>,
    interval: Duration,
    report: F,
) -> BackgroundSchedulerHandle
where
    F: Fn(BackgroundFetchResult) + Send + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!(interval_secs = interval.as_secs(), "Background alert scheduler started");
        scheduler_loop(&pipeline, interval, &flag, &report);
        tracing::info!("Background alert scheduler stopped");
    });

    BackgroundSchedulerHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn scheduler_loop<F>(pipeline: &AlertPipeline, interval: Duration, shutdown: &AtomicBool, report: &F)
where
    F: Fn(BackgroundFetchResult),
{
    let mut backoff = 1;

    loop {
        if !wait(interval.saturating_mul(backoff), shutdown) {
            return;
        }

        let result = run_background_fetch(pipeline);
        backoff = match result {
            BackgroundFetchResult::Failed => (backoff * 2).min(MAX_BACKOFF_FACTOR),
            _ => 1,
        };
        tracing::debug!(result = ?result, backoff, "Background alert fetch finished");
        report(result);
    }
}

/// Park until `duration` has elapsed. Returns false if shutdown was
/// requested in the meantime.
fn wait(duration: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now().checked_add(duration);
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                std::thread::park_timeout(deadline - now);
            }
            None => std::thread::park(),
        }
    }
}

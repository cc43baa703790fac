//! Cooperative scheduler: fires registered actions on fixed intervals, with
//! an early-wake hook. Ticks once a second, spawning any action whose
//! interval has elapsed and logging its terminal status; a failing action
//! is caught and logged, never killing the scheduler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

type BoxedAction = Box<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

/// One registered periodic action.
struct Schedule {
    friendly_name: &'static str,
    interval: Duration,
    action: BoxedAction,
    last_run: Mutex<Option<Instant>>,
}

impl Schedule {
    async fn due(&self, now: Instant) -> bool {
        match *self.last_run.lock().await {
            None => true,
            Some(last_run) => now.duration_since(last_run) >= self.interval,
        }
    }

    async fn mark_run(&self, now: Instant) {
        *self.last_run.lock().await = Some(now);
    }
}

/// A handle the rest of the application can use to request early execution
/// of a named schedule (the hook the upload endpoint uses to converge a
/// new project without waiting a full interval).
#[derive(Clone)]
pub struct Scheduler {
    schedules: Arc<Vec<Schedule>>,
}

pub struct SchedulerBuilder {
    schedules: Vec<Schedule>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self { schedules: Vec::new() }
    }

    /// Register a schedule. `action` is called with no arguments and must
    /// capture whatever state it needs.
    pub fn register<F, Fut>(mut self, friendly_name: &'static str, interval: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.schedules.push(Schedule {
            friendly_name,
            interval,
            action: Box::new(move || Box::pin(action())),
            last_run: Mutex::new(None),
        });
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler {
            schedules: Arc::new(self.schedules),
        }
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Run the tick loop forever, roughly once a second. Intended to be
    /// spawned as its own task at startup.
    pub async fn run(&self) -> ! {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let now = Instant::now();
            for schedule in self.schedules.iter() {
                if schedule.due(now).await {
                    schedule.mark_run(now).await;
                    self.spawn_and_log(schedule).await;
                }
            }
        }
    }

    async fn spawn_and_log(&self, schedule: &Schedule) {
        let name = schedule.friendly_name;
        tracing::info!(schedule = name, "Running scheduled action");
        let future = (schedule.action)();
        tokio::spawn(async move {
            match future.await {
                Ok(()) => tracing::info!(schedule = name, "Scheduled action completed"),
                Err(err) => {
                    tracing::error!(schedule = name, error = %err, "Scheduled action raised an error")
                }
            }
        });
    }

    /// Reset a schedule's `last_run` so the next tick fires it immediately.
    pub async fn request_early(&self, friendly_name: &str) {
        for schedule in self.schedules.iter() {
            if schedule.friendly_name == friendly_name {
                *schedule.last_run.lock().await = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_due_actions_and_logs_failures_without_dying() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let scheduler = SchedulerBuilder::new()
            .register("counting", Duration::from_millis(10), move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("deliberate failure")
                }
            })
            .build();

        tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn request_early_resets_last_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let scheduler = SchedulerBuilder::new()
            .register("slow", Duration::from_secs(600), move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .build();

        tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run().await }
        });

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        scheduler.request_early("slow").await;
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

//! Supervised background loops. Each loop is a named periodic task whose
//! tick failures and panics are caught and counted; repeated failures back
//! the loop off instead of letting it die silently.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct Supervisor {
    max_consecutive_failures: u32,
    failure_backoff: Duration,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            max_consecutive_failures: 5,
            failure_backoff: Duration::from_secs(30),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_restart_policy(max_consecutive_failures: u32, failure_backoff: Duration) -> Self {
        Self {
            max_consecutive_failures,
            failure_backoff,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a named periodic task. The tick closure runs once per period;
    /// errors and panics are logged and counted, and after
    /// `max_consecutive_failures` the loop sleeps `failure_backoff` before
    /// resuming. The loop itself never exits until shutdown.
    pub fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, tick: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let max_failures = self.max_consecutive_failures;
        let backoff = self.failure_backoff;

        let handle = tokio::spawn(async move {
            info!(task = name, period_secs = period.as_secs(), "background loop started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut consecutive_failures = 0u32;

            loop {
                interval.tick().await;
                match AssertUnwindSafe(tick()).catch_unwind().await {
                    Ok(Ok(())) => consecutive_failures = 0,
                    Ok(Err(e)) => {
                        consecutive_failures += 1;
                        error!(task = name, error = %e, consecutive_failures, "tick failed");
                    }
                    Err(_) => {
                        consecutive_failures += 1;
                        error!(task = name, consecutive_failures, "tick panicked");
                    }
                }

                if consecutive_failures >= max_failures {
                    error!(
                        task = name,
                        backoff_secs = backoff.as_secs(),
                        "consecutive failure limit reached, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    consecutive_failures = 0;
                }
            }
        });

        self.tasks.lock().push((name, handle));
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.lock().iter().map(|(name, _)| *name).collect()
    }

    /// Abort every supervised loop.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        for (name, handle) in tasks.drain(..) {
            info!(task = name, "stopping background loop");
            handle.abort();
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

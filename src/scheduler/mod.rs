//! Background polling loop.
//!
//! The scheduler alternates between probing and waiting. The wait starts
//! when a probe has been recorded, so a slow target stretches the period
//! instead of causing overlapping probes.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::monitor::Monitor;

pub struct Scheduler {
    monitor: Monitor,
    interval: Duration,
}

/// Running scheduler. Dropping the handle leaves the loop running for the
/// lifetime of the runtime; call [`SchedulerHandle::stop`] to end it.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Scheduler {
    pub fn new(monitor: Monitor, interval: Duration) -> Self {
        Scheduler { monitor, interval }
    }

    /// Spawns the polling loop. The first probe fires immediately.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Scheduler started for {} (interval {:?})",
            self.monitor.target(),
            self.interval
        );

        loop {
            self.tick().await;

            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = stop_requested(&mut shutdown) => break,
            }
        }

        tracing::info!("Scheduler stopped for {}", self.monitor.target());
    }

    /// Runs one probe in its own task so neither a storage error nor a
    /// panic can end the loop.
    async fn tick(&self) {
        let monitor = self.monitor.clone();
        match tokio::spawn(async move { monitor.check().await }).await {
            Ok(Ok(result)) => tracing::debug!(
                id = result.id,
                failed = result.is_failure(),
                "Scheduled probe recorded"
            ),
            Ok(Err(e)) => tracing::error!(
                "Failed to record scheduled probe for {}: {e}",
                self.monitor.target()
            ),
            Err(e) => tracing::error!("Scheduled probe task failed: {e}"),
        }
    }
}

/// Resolves once `true` is sent. A dropped sender never resolves.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let sender_alive = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !sender_alive {
        std::future::pending::<()>().await;
    }
}

impl SchedulerHandle {
    /// Signals the loop and waits for it to exit. A probe already in
    /// flight is recorded before the loop returns.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Scheduler task ended abnormally: {e}");
        }
    }
}

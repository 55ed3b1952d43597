//! Background presence simulation.
//!
//! The monitor wakes up every few seconds, notes whether any watched process
//! is running, and when the engine has been idle past the threshold nudges
//! the pointer once and refreshes the shared activity timestamp.
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::LivenessConfig;
use crate::errors::GatherResult;
use crate::executor::humanize::Humanizer;
use crate::perception::environment::ProcessProbe;

/// The per-tick work of the monitor, separate from its scheduling.
pub struct LivenessWatch {
    humanizer: Humanizer,
    processes: Box<dyn ProcessProbe>,
    idle_threshold: Duration,
}

impl LivenessWatch {
    pub fn new(humanizer: Humanizer, processes: Box<dyn ProcessProbe>, idle_threshold: Duration) -> Self {
        Self {
            humanizer,
            processes,
            idle_threshold,
        }
    }

    /// One monitor tick. Returns whether a perturbation was performed.
    pub async fn tick(&mut self) -> GatherResult<bool> {
        if self.processes.any_running() {
            tracing::debug!("watched process running");
        }

        let idle = self.humanizer.activity().idle_for();
        if idle <= self.idle_threshold {
            return Ok(false);
        }
        tracing::debug!(idle_secs = idle.as_secs(), "idle past threshold, perturbing");
        self.humanizer.micro_perturb().await?;
        self.humanizer.activity().touch();
        Ok(true)
    }

    fn next_interval(&mut self, cfg: &LivenessConfig) -> Duration {
        let secs = self
            .humanizer
            .jitter()
            .uniform(cfg.min_interval_secs, cfg.max_interval_secs);
        Duration::from_secs_f64(secs)
    }
}

pub struct LivenessMonitor {
    cfg: LivenessConfig,
    watch: Option<LivenessWatch>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<LivenessWatch>>,
}

impl LivenessMonitor {
    pub fn new(cfg: LivenessConfig, watch: LivenessWatch) -> Self {
        Self {
            cfg,
            watch: Some(watch),
            shutdown: None,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Spawn the background task. A no-op when already running.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let Some(watch) = self.watch.take() else {
            tracing::warn!("liveness monitor cannot restart after an aborted stop");
            return;
        };
        let (tx, rx) = watch::channel(false);
        self.shutdown = Some(tx);
        self.task = Some(tokio::spawn(run(watch, self.cfg.clone(), rx)));
        tracing::info!("liveness monitor started");
    }

    /// Signal the task and wait for it, aborting it if it does not finish
    /// within the join timeout. A no-op when not running.
    pub async fn stop(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }

        let timeout = Duration::from_secs_f64(self.cfg.join_timeout_secs);
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(watch)) => {
                self.watch = Some(watch);
                tracing::info!("liveness monitor stopped");
            }
            Ok(Err(e)) => tracing::error!(error = %e, "liveness task failed"),
            Err(_) => {
                task.abort();
                tracing::warn!(?timeout, "liveness monitor did not stop in time, aborted");
            }
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(mut watch: LivenessWatch, cfg: LivenessConfig, mut shutdown: watch::Receiver<bool>) -> LivenessWatch {
    let backoff = Duration::from_secs_f64(cfg.error_backoff_secs);
    let mut wait = watch.next_interval(&cfg);
    loop {
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => break,
        }
        wait = match watch.tick().await {
            Ok(_) => watch.next_interval(&cfg),
            Err(e) => {
                tracing::warn!(error = %e, ?backoff, "liveness tick failed, backing off");
                backoff
            }
        };
    }
    watch
}

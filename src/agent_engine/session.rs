//! Session loop: repeats interaction cycles within resource and time limits.
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;

use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::interaction::Interaction;
use crate::agent_engine::liveness::LivenessMonitor;
use crate::agent_engine::loop_control::{LoopController, StopHandle};
use crate::agent_engine::state::{ProgressEvent, SessionLimits, SessionSummary, StopReason};
use crate::config::SessionConfig;
use crate::perception::environment::FocusProbe;

pub struct Session {
    interaction: Interaction,
    focus: Box<dyn FocusProbe>,
    monitor: Option<LivenessMonitor>,
    cfg: SessionConfig,
    events: EventBus,
    stop: StopHandle,
}

impl Session {
    pub fn new(interaction: Interaction, focus: Box<dyn FocusProbe>, cfg: SessionConfig, events: EventBus) -> Self {
        Self {
            interaction,
            focus,
            monitor: None,
            cfg,
            events,
            stop: StopHandle::new(),
        }
    }

    pub fn with_monitor(mut self, monitor: LivenessMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn liveness(&self) -> Option<&LivenessMonitor> {
        self.monitor.as_ref()
    }

    /// Run cycles until a limit is hit, the inventory is full, or a stop is
    /// requested. The shutdown sequence runs on every exit path.
    pub async fn run(&mut self, limits: SessionLimits) -> SessionSummary {
        tracing::info!(
            max_resources = limits.max_resources,
            max_minutes = limits.max_time.as_secs() / 60,
            "gathering session started"
        );
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.start();
        }

        let ctrl = LoopController::new(limits, self.stop.clone());
        let mut cycles = 0u32;
        let result = AssertUnwindSafe(self.drive(&ctrl, &mut cycles))
            .catch_unwind()
            .await;
        let stop_reason = result.unwrap_or_else(|_| {
            tracing::error!("session loop panicked");
            StopReason::Fault
        });

        self.shutdown().await;

        let summary = SessionSummary {
            resources_gathered: self.interaction.counters().resources_gathered,
            cycles,
            elapsed_secs: ctrl.elapsed_secs(),
            stop_reason,
        };
        tracing::info!(
            gathered = summary.resources_gathered,
            cycles = summary.cycles,
            minutes = format!("{:.1}", summary.elapsed_secs / 60.0),
            reason = ?summary.stop_reason,
            "gathering session finished"
        );
        self.events.send(ProgressEvent::SessionFinished {
            summary: summary.clone(),
        });
        summary
    }

    async fn drive(&mut self, ctrl: &LoopController, cycles: &mut u32) -> StopReason {
        let [lo, hi] = self.cfg.startup_delay_secs;
        let settle = self.interaction.humanizer().jitter().uniform(lo, hi);
        tokio::time::sleep(Duration::from_secs_f64(settle)).await;

        let limits = ctrl.limits();
        loop {
            let gathered = self.interaction.counters().resources_gathered;
            if let Some(reason) = ctrl.should_stop(gathered) {
                return reason;
            }
            if !self.focus.is_focused() {
                tracing::warn!("target window not focused, pausing");
                tokio::time::sleep(Duration::from_secs_f64(self.cfg.unfocused_pause_secs)).await;
                continue;
            }
            if self.interaction.inventory_full() {
                tracing::info!("inventory full, ending session");
                return StopReason::InventoryFull;
            }

            self.interaction.run_cycle().await;
            *cycles += 1;

            let humanizer = self.interaction.humanizer();
            humanizer.pause(self.cfg.inter_cycle_delay_secs).await;

            let gathered = self.interaction.counters().resources_gathered;
            let elapsed_secs = ctrl.elapsed_secs();
            tracing::info!(
                gathered,
                max = limits.max_resources,
                minutes = format!("{:.1}", elapsed_secs / 60.0),
                "progress"
            );
            self.events.send(ProgressEvent::SessionProgress {
                resources_gathered: gathered,
                max_resources: limits.max_resources,
                elapsed_secs,
                max_secs: limits.max_time.as_secs_f64(),
            });

            let humanizer = self.interaction.humanizer();
            if humanizer.jitter().chance(self.cfg.long_pause_probability) {
                tracing::debug!("taking a longer break");
                humanizer.pause(self.cfg.long_pause_secs).await;
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.stop().await;
        }
        self.interaction.restore_presentation().await;
    }
}

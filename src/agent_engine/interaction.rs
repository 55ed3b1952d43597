//! The interaction state machine: search, approach, act, settle.
//!
//! One call to [`Interaction::run_cycle`] drives a single target from
//! `Searching` to a terminal state and back to `Idle`. Nothing escapes a
//! cycle: expected failures end `Abandoned`, anything else (errors, panics)
//! is logged and converted to `Abandoned` as well.
//!
//! Input is only sent while the target window has focus. A window that stays
//! in the background ends the cycle as `Abandoned(Unfocused)`.
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::Instant;

use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::state::{
    AbandonReason, ActionDurations, CycleOutcome, GatheringAttempt, InteractionState, ProgressEvent,
};
use crate::config::InteractionConfig;
use crate::errors::GatherResult;
use crate::executor::humanize::Humanizer;
use crate::perception::environment::{AlwaysFocused, FocusProbe};
use crate::perception::selector::TargetSelector;
use crate::perception::traits::{ConfirmationProbe, DetectionSource};
use crate::perception::types::Target;

pub struct Interaction {
    detections: Box<dyn DetectionSource>,
    probe: Box<dyn ConfirmationProbe>,
    humanizer: Humanizer,
    selector: TargetSelector,
    focus: Box<dyn FocusProbe>,
    durations: ActionDurations,
    cfg: InteractionConfig,
    counters: GatheringAttempt,
    state: InteractionState,
    overlay_hidden: bool,
    events: Option<EventBus>,
}

impl Interaction {
    pub fn new(
        detections: Box<dyn DetectionSource>,
        probe: Box<dyn ConfirmationProbe>,
        humanizer: Humanizer,
        selector: TargetSelector,
        cfg: InteractionConfig,
    ) -> GatherResult<Self> {
        Ok(Self {
            detections,
            probe,
            humanizer,
            selector,
            focus: Box::new(AlwaysFocused),
            durations: ActionDurations::from_config(&cfg)?,
            cfg,
            counters: GatheringAttempt::default(),
            state: InteractionState::Idle,
            overlay_hidden: false,
            events: None,
        })
    }

    /// Gate every input action on this probe.
    pub fn with_focus(mut self, focus: Box<dyn FocusProbe>) -> Self {
        self.focus = focus;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn counters(&self) -> GatheringAttempt {
        self.counters
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn humanizer(&mut self) -> &mut Humanizer {
        &mut self.humanizer
    }

    pub fn overlay_hidden(&self) -> bool {
        self.overlay_hidden
    }

    pub fn inventory_full(&self) -> bool {
        self.counters.resources_gathered >= self.cfg.inventory_limit
    }

    /// Run one full cycle and return to `Idle`.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let result = AssertUnwindSafe(self.cycle()).catch_unwind().await;
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!(error = %e, state = ?self.state, "cycle failed");
                CycleOutcome::abandoned(AbandonReason::Fault(e.to_string()))
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!(panic = %message, state = ?self.state, "cycle panicked");
                CycleOutcome::abandoned(AbandonReason::Fault(message))
            }
        };

        if matches!(outcome, CycleOutcome::Abandoned { .. }) {
            // A fault may have left the overlay hidden.
            self.restore_presentation().await;
        }

        match outcome {
            CycleOutcome::Completed => self.set_state(InteractionState::Completed),
            CycleOutcome::Abandoned { .. } => self.set_state(InteractionState::Abandoned),
            CycleOutcome::InventoryFull => {}
        }
        self.set_state(InteractionState::Idle);

        tracing::info!(
            outcome = ?outcome,
            gathered = self.counters.resources_gathered,
            attempts = self.counters.mining_attempts,
            "cycle finished"
        );
        self.emit(ProgressEvent::CycleFinished {
            outcome: outcome.clone(),
            counters: self.counters,
        });
        outcome
    }

    async fn cycle(&mut self) -> GatherResult<CycleOutcome> {
        if self.inventory_full() {
            tracing::info!(limit = self.cfg.inventory_limit, "inventory full");
            return Ok(CycleOutcome::InventoryFull);
        }
        if self.counters.mining_attempts >= self.cfg.max_attempts {
            tracing::warn!(
                attempts = self.counters.mining_attempts,
                "too many failed attempts, looking for a new target"
            );
            self.counters.mining_attempts = 0;
            self.selector.release();
            return Ok(CycleOutcome::abandoned(AbandonReason::RetryCeiling));
        }

        self.set_state(InteractionState::Searching);
        let frame = self.detections.next_frame().await?;
        let target = frame.as_ref().and_then(|f| self.selector.select(f));
        let Some(target) = target else {
            if !self.ensure_focus().await {
                return Ok(CycleOutcome::abandoned(AbandonReason::Unfocused));
            }
            tracing::info!("no target in view, sweeping");
            soft(self.humanizer.sweep(self.cfg.sweep_max_px).await, "view sweep");
            return Ok(CycleOutcome::abandoned(AbandonReason::NoTarget));
        };
        tracing::debug!(
            class_id = target.class_id,
            x = target.actuation.x,
            y = target.actuation.y,
            "target selected"
        );
        self.emit(ProgressEvent::TargetSelected { target });
        if !self.ensure_focus().await {
            return Ok(CycleOutcome::abandoned(AbandonReason::Unfocused));
        }

        self.set_state(InteractionState::Approaching);
        if self.cfg.hide_overlay {
            self.set_overlay_hidden(true).await;
        }
        soft(self.humanizer.click_at(target.actuation).await, "approach click");
        soft(self.humanizer.rest_pointer().await, "rest pointer");

        let outcome = match self.approach(&target).await {
            Approach::Arrived => {
                self.set_state(InteractionState::Acting);
                self.act(&target).await
            }
            Approach::TimedOut => {
                tracing::warn!("target not reached in time");
                self.selector.release();
                CycleOutcome::abandoned(AbandonReason::ApproachTimeout)
            }
            Approach::Unfocused => {
                tracing::warn!("focus lost while approaching");
                CycleOutcome::abandoned(AbandonReason::Unfocused)
            }
        };

        self.set_overlay_hidden(false).await;
        Ok(outcome)
    }

    /// Poll until the probe confirms arrival. Re-clicks once when the
    /// approach looks stuck.
    async fn approach(&mut self, target: &Target) -> Approach {
        let window = Duration::from_secs_f64(self.cfg.approach_timeout_secs);
        let stuck_after = Duration::from_secs_f64(self.cfg.stuck_after_secs());
        let started = Instant::now();
        let mut reissued = false;

        while started.elapsed() < window {
            self.humanizer.activity().touch();
            if self.probe().await {
                tracing::debug!(elapsed = ?started.elapsed(), "arrived at target");
                return Approach::Arrived;
            }
            if !reissued && started.elapsed() >= stuck_after {
                if !self.ensure_focus().await {
                    return Approach::Unfocused;
                }
                tracing::debug!("approach looks stuck, clicking again");
                soft(self.humanizer.click_at(target.actuation).await, "re-click");
                reissued = true;
            }
            self.humanizer.pause(self.cfg.poll_interval_secs).await;
        }
        Approach::TimedOut
    }

    /// Wait for the in-progress signal to clear, bounded by the expected
    /// duration for this class.
    async fn act(&mut self, target: &Target) -> CycleOutcome {
        let nominal = self.durations.lookup(target.class_id);
        let expected = self
            .humanizer
            .jitter()
            .spread(nominal, self.cfg.duration_jitter_secs);
        let limit = expected.mul_f64(self.cfg.timeout_factor);
        tracing::debug!(class_id = target.class_id, ?expected, ?limit, "acting");

        let started = Instant::now();
        let mut done = false;
        while started.elapsed() < limit {
            self.humanizer.activity().touch();
            if !self.probe().await {
                done = true;
                break;
            }
            self.humanizer.pause(self.cfg.poll_interval_secs).await;
        }

        let outcome = if done {
            self.counters.resources_gathered += 1;
            self.counters.mining_attempts = 0;
            tracing::info!(gathered = self.counters.resources_gathered, "action completed");
            CycleOutcome::Completed
        } else {
            self.counters.mining_attempts += 1;
            tracing::warn!(attempts = self.counters.mining_attempts, "action timed out");
            CycleOutcome::abandoned(AbandonReason::ActingTimeout)
        };

        self.humanizer.pause(self.cfg.settle_delay_secs).await;
        outcome
    }

    /// Probe errors count as "not in progress".
    async fn probe(&mut self) -> bool {
        match self.probe.in_progress().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "confirmation probe failed");
                false
            }
        }
    }

    /// Check focus up to `focus_retries` times, pausing between checks.
    async fn ensure_focus(&mut self) -> bool {
        let checks = self.cfg.focus_retries.max(1);
        for check in 1..=checks {
            if self.focus.is_focused() {
                return true;
            }
            tracing::warn!(check, of = checks, "target window not focused");
            if check < checks {
                self.humanizer.pause(self.cfg.focus_retry_secs).await;
            }
        }
        false
    }

    /// Toggle the overlay only when its state differs and the window has
    /// focus; otherwise it is left for a later restore.
    async fn set_overlay_hidden(&mut self, hidden: bool) {
        if self.overlay_hidden == hidden {
            return;
        }
        if !self.focus.is_focused() {
            tracing::warn!(hidden, "target window not focused, overlay left as is");
            return;
        }
        match self.humanizer.toggle_overlay().await {
            Ok(()) => self.overlay_hidden = hidden,
            Err(e) => tracing::warn!(error = %e, "overlay toggle failed"),
        }
    }

    /// Put the overlay back if a cycle left it hidden.
    pub async fn restore_presentation(&mut self) {
        if self.overlay_hidden {
            tracing::debug!("restoring overlay");
            self.set_overlay_hidden(false).await;
        }
    }

    fn set_state(&mut self, state: InteractionState) {
        if self.state != state {
            tracing::trace!(from = ?self.state, to = ?state, "state change");
            self.state = state;
            self.emit(ProgressEvent::StateChanged { state });
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(bus) = &self.events {
            bus.send(event);
        }
    }
}

enum Approach {
    Arrived,
    TimedOut,
    Unfocused,
}

fn soft(result: GatherResult<()>, what: &str) {
    if let Err(e) = result {
        tracing::warn!(error = %e, action = what, "input action failed");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

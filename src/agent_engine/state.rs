use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::InteractionConfig;
use crate::errors::GatherResult;
use crate::perception::types::Target;

/// States of one interaction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    Idle,
    Searching,
    Approaching,
    Acting,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum AbandonReason {
    /// Nothing selectable in the frame; the view was swept.
    NoTarget,
    ApproachTimeout,
    ActingTimeout,
    /// Too many consecutive acting timeouts; counter was reset.
    RetryCeiling,
    /// The target window stayed in the background; no input was sent.
    Unfocused,
    /// Unexpected error or panic caught at the cycle boundary.
    Fault(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    Abandoned { reason: AbandonReason },
    InventoryFull,
}

impl CycleOutcome {
    pub fn abandoned(reason: AbandonReason) -> Self {
        CycleOutcome::Abandoned { reason }
    }
}

/// Session-scoped counters, only mutated by the interaction state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatheringAttempt {
    pub mining_attempts: u32,
    pub resources_gathered: u32,
}

/// Nominal action duration per class, with a fallback for unknown classes.
#[derive(Debug, Clone)]
pub struct ActionDurations {
    by_class: HashMap<u32, Duration>,
    default: Duration,
}

impl ActionDurations {
    pub fn from_config(cfg: &InteractionConfig) -> GatherResult<Self> {
        crate::config::validate_durations(&cfg.durations, cfg.default_duration_secs)?;
        Ok(Self {
            by_class: cfg
                .durations
                .iter()
                .map(|e| (e.class_id, Duration::from_secs_f64(e.secs)))
                .collect(),
            default: Duration::from_secs_f64(cfg.default_duration_secs),
        })
    }

    pub fn lookup(&self, class_id: u32) -> Duration {
        self.by_class.get(&class_id).copied().unwrap_or(self.default)
    }
}

/// Stopping conditions for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLimits {
    pub max_resources: u32,
    pub max_time: Duration,
}

impl SessionLimits {
    pub fn new(max_resources: u32, max_time_minutes: u32) -> Self {
        Self {
            max_resources,
            max_time: Duration::from_secs(u64::from(max_time_minutes) * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ResourceLimit,
    TimeLimit,
    InventoryFull,
    StopRequested,
    Fault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub resources_gathered: u32,
    pub cycles: u32,
    pub elapsed_secs: f64,
    pub stop_reason: StopReason,
}

/// Everything the engine reports while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StateChanged {
        state: InteractionState,
    },
    TargetSelected {
        target: Target,
    },
    CycleFinished {
        outcome: CycleOutcome,
        counters: GatheringAttempt,
    },
    SessionProgress {
        resources_gathered: u32,
        max_resources: u32,
        elapsed_secs: f64,
        max_secs: f64,
    },
    SessionFinished {
        summary: SessionSummary,
    },
}

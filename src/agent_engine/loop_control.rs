// Session stopping rules: resource count, wall-clock budget, stop requests.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Instant;

use crate::agent_engine::state::{SessionLimits, StopReason};

/// Cooperative cancellation flag shared with whoever may end the session.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct LoopController {
    limits: SessionLimits,
    start_time: Instant,
    stop: StopHandle,
}

impl LoopController {
    pub fn new(limits: SessionLimits, stop: StopHandle) -> Self {
        Self {
            limits,
            start_time: Instant::now(),
            stop,
        }
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Reason to end the session now, if any.
    pub fn should_stop(&self, resources_gathered: u32) -> Option<StopReason> {
        if self.stop.is_stopped() {
            Some(StopReason::StopRequested)
        } else if resources_gathered >= self.limits.max_resources {
            Some(StopReason::ResourceLimit)
        } else if self.start_time.elapsed() >= self.limits.max_time {
            Some(StopReason::TimeLimit)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stops_on_each_limit() {
        let stop = StopHandle::new();
        let ctrl = LoopController::new(SessionLimits::new(5, 1), stop.clone());
        assert_eq!(ctrl.should_stop(4), None);
        assert_eq!(ctrl.should_stop(5), Some(StopReason::ResourceLimit));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(ctrl.should_stop(0), Some(StopReason::TimeLimit));

        stop.stop();
        assert_eq!(ctrl.should_stop(0), Some(StopReason::StopRequested));
    }
}

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wall-clock source in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock for replaying idle scenarios.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn at(ms: i64) -> Self {
        Self {
            now: AtomicI64::new(ms),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// The shared "last action" timestamp.
///
/// Both the interaction loop and the liveness monitor only ever overwrite it
/// with "now", so a single atomic with last-write-wins is enough.
#[derive(Clone)]
pub struct ActivityClock {
    clock: Arc<dyn Clock>,
    last_action_ms: Arc<AtomicI64>,
}

impl ActivityClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            last_action_ms: Arc::new(AtomicI64::new(now)),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Record an action at the current time.
    pub fn touch(&self) {
        self.last_action_ms.store(self.clock.now_ms(), Ordering::Relaxed);
    }

    pub fn last_action_ms(&self) -> i64 {
        self.last_action_ms.load(Ordering::Relaxed)
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn idle_for(&self) -> Duration {
        let idle = self.now_ms() - self.last_action_ms();
        Duration::from_millis(idle.max(0) as u64)
    }
}

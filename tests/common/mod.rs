#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gatherbot_lib::agent_engine::clock::{ActivityClock, Clock, ManualClock};
use gatherbot_lib::agent_engine::interaction::Interaction;
use gatherbot_lib::config::InteractionConfig;
use gatherbot_lib::errors::{GatherError, GatherResult};
use gatherbot_lib::executor::humanize::Humanizer;
use gatherbot_lib::executor::input::{Actuator, InputKey, MouseButton};
use gatherbot_lib::executor::jitter::{AntiDetectionProfile, Jitter};
use gatherbot_lib::perception::coords::AxisScaling;
use gatherbot_lib::perception::environment::{AlwaysFocused, FocusProbe, ProcessProbe};
use gatherbot_lib::perception::selector::{TargetPolicy, TargetSelector};
use gatherbot_lib::perception::traits::{ConfirmationProbe, DetectionSource};
use gatherbot_lib::perception::types::{
    AgentAnchor, BoundingBox, Detection, FrameDetections, FrameGeometry, FrameSize, Point,
    WindowGeometry,
};

pub fn reference_frame() -> FrameDetections {
    FrameDetections {
        detections: vec![Detection::new(BoundingBox::new(10.0, 10.0, 30.0, 30.0), 0.9, 0)],
        geometry: FrameGeometry {
            frame: FrameSize::square(640),
            window: Some(WindowGeometry {
                top: 0,
                left: 100,
                width: 800,
                height: 600,
            }),
        },
    }
}

/// Always returns the same frame and counts how often it was asked.
pub struct FixedDetections {
    pub frame: FrameDetections,
    pub calls: Arc<AtomicUsize>,
}

impl FixedDetections {
    pub fn new(frame: FrameDetections) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                frame,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl DetectionSource for FixedDetections {
    async fn next_frame(&mut self) -> GatherResult<Option<FrameDetections>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.frame.clone()))
    }
}

/// Answers from a fixed cycle of values, forever.
pub struct CyclingProbe {
    answers: Vec<bool>,
    next: usize,
}

impl CyclingProbe {
    pub fn new(answers: Vec<bool>) -> Self {
        Self { answers, next: 0 }
    }

    /// Arrives on the first poll, finishes on the first acting poll.
    pub fn instant_success() -> Self {
        Self::new(vec![true, false])
    }

    /// Arrives immediately, never finishes.
    pub fn never_finishes() -> Self {
        Self::new(vec![true])
    }
}

#[async_trait]
impl ConfirmationProbe for CyclingProbe {
    async fn in_progress(&mut self) -> GatherResult<bool> {
        let answer = self.answers[self.next % self.answers.len()];
        self.next += 1;
        Ok(answer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Move(Point),
    Click(MouseButton),
    Drag(i32, i32),
    Hotkey(Vec<InputKey>),
}

#[derive(Default)]
pub struct FakeActuator {
    pub log: Mutex<Vec<Input>>,
    hotkey_calls: AtomicUsize,
    /// 1-based index of the hotkey call to reject; 0 rejects none.
    pub fail_hotkey_call: AtomicUsize,
}

impl FakeActuator {
    pub fn inputs(&self) -> Vec<Input> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Actuator for FakeActuator {
    async fn move_to(&self, to: Point, _duration: Duration) -> GatherResult<()> {
        self.log.lock().unwrap().push(Input::Move(to));
        Ok(())
    }
    async fn click(&self, button: MouseButton) -> GatherResult<()> {
        self.log.lock().unwrap().push(Input::Click(button));
        Ok(())
    }
    async fn drag_relative(&self, _button: MouseButton, dx: i32, dy: i32, _duration: Duration) -> GatherResult<()> {
        self.log.lock().unwrap().push(Input::Drag(dx, dy));
        Ok(())
    }
    async fn hotkey(&self, keys: &[InputKey]) -> GatherResult<()> {
        let call = self.hotkey_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_hotkey_call.load(Ordering::SeqCst) {
            return Err(GatherError::Executor("key press rejected".into()));
        }
        self.log.lock().unwrap().push(Input::Hotkey(keys.to_vec()));
        Ok(())
    }
    async fn position(&self) -> GatherResult<Point> {
        Ok(Point::new(640.0, 360.0))
    }
    async fn display_size(&self) -> GatherResult<(u32, u32)> {
        Ok((1280, 720))
    }
}

/// Focus probe that reports "unfocused" a fixed number of times first.
pub struct FlakyFocus {
    unfocused_left: AtomicUsize,
    pub checks: Arc<AtomicUsize>,
}

impl FlakyFocus {
    pub fn new(unfocused: usize) -> Self {
        Self {
            unfocused_left: AtomicUsize::new(unfocused),
            checks: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FocusProbe for FlakyFocus {
    fn is_focused(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.unfocused_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}

/// Focused for the first `focused_for` checks, unfocused after that.
pub struct FocusLostAfter {
    focused_left: AtomicUsize,
}

impl FocusLostAfter {
    pub fn new(focused_for: usize) -> Self {
        Self {
            focused_left: AtomicUsize::new(focused_for),
        }
    }
}

impl FocusProbe for FocusLostAfter {
    fn is_focused(&self) -> bool {
        self.focused_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Focused until `panic_on` checks have been made, then panics.
pub struct PanickingFocus {
    checks: AtomicUsize,
    panic_on: usize,
}

impl PanickingFocus {
    pub fn on_check(panic_on: usize) -> Self {
        Self {
            checks: AtomicUsize::new(0),
            panic_on,
        }
    }
}

impl FocusProbe for PanickingFocus {
    fn is_focused(&self) -> bool {
        let n = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.panic_on {
            panic!("focus query crashed");
        }
        true
    }
}

pub struct NoProcesses;

impl ProcessProbe for NoProcesses {
    fn running(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// Deterministic profile with every randomisation switched off.
pub fn plain_profile() -> Arc<AntiDetectionProfile> {
    Arc::new(AntiDetectionProfile {
        session_id: uuid::Uuid::nil(),
        max_clicks_per_minute: 600,
        mouse_speed_variance: 0.3,
        randomize_delays: false,
        avoid_patterns: false,
        human_like_mouse: false,
    })
}

pub struct Rig {
    pub interaction: Interaction,
    pub actuator: Arc<FakeActuator>,
    pub detections: Arc<AtomicUsize>,
    pub clock: Arc<ManualClock>,
    pub activity: ActivityClock,
}

pub fn rig(probe: CyclingProbe, cfg: InteractionConfig) -> Rig {
    rig_with_focus(probe, cfg, Box::new(AlwaysFocused))
}

pub fn rig_with_focus(probe: CyclingProbe, cfg: InteractionConfig, focus: Box<dyn FocusProbe>) -> Rig {
    let actuator = Arc::new(FakeActuator::default());
    let clock = Arc::new(ManualClock::at(1_000));
    let activity = ActivityClock::new(clock.clone() as Arc<dyn Clock>);
    let humanizer = Humanizer::new(
        actuator.clone(),
        Jitter::seeded(plain_profile(), 17),
        activity.clone(),
    );
    let (source, detections) = FixedDetections::new(reference_frame());
    let selector = TargetSelector::new(
        AgentAnchor(Point::new(20.0, 20.0)),
        AxisScaling::Symmetric,
        TargetPolicy::Nearest,
    );
    let interaction = Interaction::new(Box::new(source), Box::new(probe), humanizer, selector, cfg)
        .expect("valid interaction config")
        .with_focus(focus);
    Rig {
        interaction,
        actuator,
        detections,
        clock,
        activity,
    }
}

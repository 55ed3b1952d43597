//! Human-paced pointer and keyboard actions built on an [`Actuator`].
//!
//! Every action stamps the shared activity clock before and after it runs so
//! the liveness monitor sees the engine as busy.
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::agent_engine::clock::ActivityClock;
use crate::errors::GatherResult;
use crate::executor::input::{Actuator, InputKey, MouseButton};
use crate::executor::jitter::Jitter;
use crate::perception::types::Point;

/// Reaction time between arriving on a point and clicking it.
const PRE_CLICK_SECS: f64 = 0.1;
/// Pause after a view sweep.
const POST_SWEEP_SECS: f64 = 0.3;
/// Pause before the overlay hotkey.
const PRE_TOGGLE_SECS: f64 = 0.2;
const OVERLAY_HOTKEY: [InputKey; 2] = [InputKey::Alt, InputKey::Char('h')];

pub struct Humanizer {
    actuator: Arc<dyn Actuator>,
    jitter: Jitter,
    activity: ActivityClock,
    bounds: Option<(u32, u32)>,
    last_click: Option<Instant>,
}

impl Humanizer {
    pub fn new(actuator: Arc<dyn Actuator>, jitter: Jitter, activity: ActivityClock) -> Self {
        Self {
            actuator,
            jitter,
            activity,
            bounds: None,
            last_click: None,
        }
    }

    pub fn jitter(&mut self) -> &mut Jitter {
        &mut self.jitter
    }

    pub fn activity(&self) -> &ActivityClock {
        &self.activity
    }

    /// Sleep for a jittered `base_secs`.
    pub async fn pause(&mut self, base_secs: f64) {
        let wait = self.jitter.delay_secs(base_secs);
        tokio::time::sleep(wait).await;
    }

    /// Display size, queried once and cached.
    async fn bounds(&mut self) -> GatherResult<(u32, u32)> {
        if let Some(bounds) = self.bounds {
            return Ok(bounds);
        }
        let bounds = self.actuator.display_size().await?;
        self.bounds = Some(bounds);
        Ok(bounds)
    }

    /// Hold back until the minimum click spacing of the profile has passed.
    async fn pace_click(&mut self) {
        let spacing = self.jitter.profile().min_click_interval();
        if let Some(last) = self.last_click {
            let since = last.elapsed();
            if since < spacing {
                tokio::time::sleep(spacing - since).await;
            }
        }
        self.last_click = Some(Instant::now());
    }

    /// Move to a nudged `target` and left-click it.
    pub async fn click_at(&mut self, target: Point) -> GatherResult<()> {
        self.activity.touch();
        let bounds = self.bounds().await?;
        let point = self.jitter.safe_point(target.x, target.y, bounds);
        let duration = self.jitter.mouse_duration();
        self.actuator.move_to(point, duration).await?;
        self.pause(PRE_CLICK_SECS).await;
        self.pace_click().await;
        self.actuator.click(MouseButton::Left).await?;
        self.activity.touch();
        tracing::debug!(x = point.x, y = point.y, "click");
        Ok(())
    }

    /// Park the pointer near the top-left corner, out of the play area.
    pub async fn rest_pointer(&mut self) -> GatherResult<()> {
        self.activity.touch();
        let bounds = self.bounds().await?;
        let x = self.jitter.uniform(5.0, 20.0).round();
        let y = self.jitter.uniform(5.0, 20.0).round();
        let point = self.jitter.safe_point(x, y, bounds);
        let duration = self.jitter.mouse_duration();
        self.actuator.move_to(point, duration).await?;
        self.activity.touch();
        Ok(())
    }

    /// Rotate the view with a short horizontal right-drag.
    pub async fn sweep(&mut self, max_px: f64) -> GatherResult<()> {
        self.activity.touch();
        let reach = max_px.max(0.0);
        let dx = self.jitter.uniform(-reach, reach).round() as i32;
        let duration = self.jitter.mouse_duration();
        self.actuator
            .drag_relative(MouseButton::Right, dx, 0, duration)
            .await?;
        self.activity.touch();
        tracing::debug!(dx, "view sweep");
        self.pause(POST_SWEEP_SECS).await;
        Ok(())
    }

    /// Nudge the pointer by a couple of pixels and put it back.
    pub async fn micro_perturb(&mut self) -> GatherResult<()> {
        self.activity.touch();
        let origin = self.actuator.position().await?;
        let dx = self.jitter.uniform(-2.0, 2.0);
        let dy = self.jitter.uniform(-2.0, 2.0);
        let out = Duration::from_secs_f64(self.jitter.uniform(0.5, 1.0));
        self.actuator
            .move_to(Point::new(origin.x + dx, origin.y + dy), out)
            .await?;
        let back = Duration::from_secs_f64(self.jitter.uniform(0.5, 1.0));
        self.actuator.move_to(origin, back).await?;
        self.activity.touch();
        tracing::debug!(dx, dy, "micro perturbation");
        Ok(())
    }

    /// Press the overlay toggle hotkey (Alt+H).
    pub async fn toggle_overlay(&mut self) -> GatherResult<()> {
        self.pause(PRE_TOGGLE_SECS).await;
        self.activity.touch();
        self.actuator.hotkey(&OVERLAY_HOTKEY).await?;
        self.activity.touch();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::agent_engine::clock::ManualClock;
    use crate::executor::jitter::test_profile;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Move(Point),
        Click(MouseButton),
        Drag(MouseButton, i32, i32),
        Hotkey(Vec<InputKey>),
    }

    #[derive(Default)]
    pub(crate) struct RecordingActuator {
        pub calls: Mutex<Vec<Call>>,
    }

    impl RecordingActuator {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Actuator for RecordingActuator {
        async fn move_to(&self, to: Point, _duration: Duration) -> GatherResult<()> {
            self.calls.lock().unwrap().push(Call::Move(to));
            Ok(())
        }
        async fn click(&self, button: MouseButton) -> GatherResult<()> {
            self.calls.lock().unwrap().push(Call::Click(button));
            Ok(())
        }
        async fn drag_relative(&self, button: MouseButton, dx: i32, dy: i32, _duration: Duration) -> GatherResult<()> {
            self.calls.lock().unwrap().push(Call::Drag(button, dx, dy));
            Ok(())
        }
        async fn hotkey(&self, keys: &[InputKey]) -> GatherResult<()> {
            self.calls.lock().unwrap().push(Call::Hotkey(keys.to_vec()));
            Ok(())
        }
        async fn position(&self) -> GatherResult<Point> {
            Ok(Point::new(400.0, 300.0))
        }
        async fn display_size(&self) -> GatherResult<(u32, u32)> {
            Ok((800, 600))
        }
    }

    fn humanizer(enabled: bool) -> (Humanizer, Arc<RecordingActuator>, Arc<ManualClock>) {
        let actuator = Arc::new(RecordingActuator::default());
        let clock = Arc::new(ManualClock::at(0));
        let h = Humanizer::new(
            actuator.clone(),
            Jitter::seeded(test_profile(enabled), 11),
            ActivityClock::new(clock.clone()),
        );
        (h, actuator, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn click_moves_then_clicks_and_touches_clock() {
        let (mut h, actuator, clock) = humanizer(false);
        clock.set(9_000);
        h.click_at(Point::new(125.0, 18.75)).await.unwrap();

        assert_eq!(
            actuator.calls(),
            vec![Call::Move(Point::new(125.0, 18.75)), Call::Click(MouseButton::Left)]
        );
        assert_eq!(h.activity().last_action_ms(), 9_000);
    }

    #[tokio::test(start_paused = true)]
    async fn clicks_are_spaced_by_profile_rate() {
        let (mut h, _actuator, _clock) = humanizer(false);
        let spacing = h.jitter().profile().min_click_interval();
        let start = Instant::now();
        h.click_at(Point::new(1.0, 1.0)).await.unwrap();
        h.click_at(Point::new(2.0, 2.0)).await.unwrap();
        assert!(start.elapsed() >= spacing);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_is_bounded_right_drag() {
        let (mut h, actuator, _clock) = humanizer(true);
        for _ in 0..20 {
            h.sweep(20.0).await.unwrap();
        }
        for call in actuator.calls() {
            match call {
                Call::Drag(MouseButton::Right, dx, 0) => assert!((-20..=20).contains(&dx)),
                other => panic!("unexpected call {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn perturbation_returns_to_origin() {
        let (mut h, actuator, _clock) = humanizer(true);
        h.micro_perturb().await.unwrap();
        let calls = actuator.calls();
        assert_eq!(calls.len(), 2);
        let Call::Move(out) = &calls[0] else { panic!("expected move") };
        assert!((out.x - 400.0).abs() <= 2.0 && (out.y - 300.0).abs() <= 2.0);
        assert_eq!(calls[1], Call::Move(Point::new(400.0, 300.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn resting_point_stays_in_corner() {
        let (mut h, actuator, _clock) = humanizer(true);
        h.rest_pointer().await.unwrap();
        let Call::Move(p) = &actuator.calls()[0] else { panic!("expected move") };
        assert!(p.x >= 0.0 && p.x <= 25.0 && p.y >= 0.0 && p.y <= 25.0);
    }
}

//! Per-session randomisation profile and the jitter generator that reads it.
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AntiDetectionConfig;
use crate::perception::types::Point;

/// Probability that `delay` adds an extra hesitation.
const HESITATION_PROBABILITY: f64 = 0.05;
/// Floor for humanised pointer movement.
const MIN_MOUSE_SECS: f64 = 0.1;
/// Per-axis offset applied by `safe_point`.
const SAFE_OFFSET_PX: f64 = 5.0;

/// Randomisation parameters fixed for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiDetectionProfile {
    pub session_id: Uuid,
    pub max_clicks_per_minute: u32,
    pub mouse_speed_variance: f64,
    pub randomize_delays: bool,
    pub avoid_patterns: bool,
    pub human_like_mouse: bool,
}

impl AntiDetectionProfile {
    /// Draw a fresh profile. Toggles come from configuration; the human
    /// factors are sampled once here and never change afterwards.
    pub fn generate(cfg: &AntiDetectionConfig, rng: &mut impl Rng) -> Self {
        let variance = if cfg.safe_mode {
            rng.gen_range(0.5..=0.8)
        } else {
            rng.gen_range(0.3..=0.6)
        };
        let profile = Self {
            session_id: Uuid::new_v4(),
            max_clicks_per_minute: rng.gen_range(70..=120),
            mouse_speed_variance: variance,
            randomize_delays: cfg.randomize_delays,
            avoid_patterns: cfg.avoid_patterns,
            human_like_mouse: cfg.human_like_mouse,
        };
        tracing::info!(
            session = %profile.session_id,
            cpm = profile.max_clicks_per_minute,
            variance = profile.mouse_speed_variance,
            randomize = profile.randomize_delays,
            avoid_patterns = profile.avoid_patterns,
            human_mouse = profile.human_like_mouse,
            "anti-detection profile created"
        );
        profile
    }

    /// Minimum spacing between two clicks.
    pub fn min_click_interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.max_clicks_per_minute.max(1) as f64)
    }
}

/// Randomised timing and positioning. Owns its random source; shares only
/// the read-only profile.
pub struct Jitter {
    profile: Arc<AntiDetectionProfile>,
    rng: StdRng,
}

impl Jitter {
    pub fn new(profile: Arc<AntiDetectionProfile>) -> Self {
        Self {
            profile,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(profile: Arc<AntiDetectionProfile>, seed: u64) -> Self {
        Self {
            profile,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn profile(&self) -> &AntiDetectionProfile {
        &self.profile
    }

    /// `base` scaled by a factor in [0.7, 1.3], occasionally plus a
    /// [0.2, 1.0] s hesitation. Identity when delay randomisation is off.
    pub fn delay(&mut self, base: Duration) -> Duration {
        if !self.profile.randomize_delays {
            return base;
        }
        let mut secs = base.as_secs_f64() * self.rng.gen_range(0.7..=1.3);
        if self.rng.gen_bool(HESITATION_PROBABILITY) {
            secs += self.rng.gen_range(0.2..=1.0);
        }
        Duration::from_secs_f64(secs)
    }

    pub fn delay_secs(&mut self, base_secs: f64) -> Duration {
        self.delay(Duration::from_secs_f64(base_secs.max(0.0)))
    }

    /// `(x, y)` nudged by up to 5 px per axis and clamped to
    /// `[0, bound - 1]`. Identity when pattern avoidance is off.
    pub fn safe_point(&mut self, x: f64, y: f64, bounds: (u32, u32)) -> Point {
        if !self.profile.avoid_patterns {
            return Point::new(x, y);
        }
        let dx = self.rng.gen_range(-SAFE_OFFSET_PX..=SAFE_OFFSET_PX);
        let dy = self.rng.gen_range(-SAFE_OFFSET_PX..=SAFE_OFFSET_PX);
        let max_x = bounds.0.saturating_sub(1) as f64;
        let max_y = bounds.1.saturating_sub(1) as f64;
        Point::new((x + dx).clamp(0.0, max_x), (y + dy).clamp(0.0, max_y))
    }

    /// Duration of one pointer movement.
    pub fn mouse_duration(&mut self) -> Duration {
        if !self.profile.human_like_mouse {
            return Duration::from_secs_f64(MIN_MOUSE_SECS);
        }
        let base = self.rng.gen_range(0.2..=0.4);
        let v = self.profile.mouse_speed_variance;
        let variance = if v > 0.0 { self.rng.gen_range(-v..=v) } else { 0.0 };
        Duration::from_secs_f64((base + variance).max(MIN_MOUSE_SECS))
    }

    /// `nominal` plus symmetric noise of up to `spread` seconds, never below zero.
    pub fn spread(&mut self, nominal: Duration, spread_secs: f64) -> Duration {
        if spread_secs <= 0.0 {
            return nominal;
        }
        let offset = self.rng.gen_range(-spread_secs..=spread_secs);
        Duration::from_secs_f64((nominal.as_secs_f64() + offset).max(0.0))
    }

    /// Uniform sample in `[lo, hi]` (returns `lo` for an empty range).
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
pub(crate) fn test_profile(enabled: bool) -> Arc<AntiDetectionProfile> {
    Arc::new(AntiDetectionProfile {
        session_id: Uuid::nil(),
        max_clicks_per_minute: 600,
        mouse_speed_variance: 0.4,
        randomize_delays: enabled,
        avoid_patterns: enabled,
        human_like_mouse: enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_identity_when_disabled() {
        let mut jitter = Jitter::seeded(test_profile(false), 1);
        for _ in 0..50 {
            assert_eq!(jitter.delay(Duration::from_millis(750)), Duration::from_millis(750));
        }
    }

    #[test]
    fn delay_mostly_within_thirty_percent() {
        let mut jitter = Jitter::seeded(test_profile(true), 42);
        let base = Duration::from_secs(2);
        let samples = 10_000;
        let within = (0..samples)
            .map(|_| jitter.delay(base).as_secs_f64())
            .filter(|&d| (1.4..=2.6).contains(&d))
            .count();
        assert!(within as f64 / samples as f64 >= 0.95, "within={within}");

        // Nothing ever falls below the lower factor or above upper + hesitation.
        for _ in 0..1_000 {
            let d = jitter.delay(base).as_secs_f64();
            assert!(d >= 1.4 - 1e-9 && d <= 2.6 + 1.0 + 1e-9);
        }
    }

    #[test]
    fn safe_point_stays_in_bounds() {
        let mut jitter = Jitter::seeded(test_profile(true), 7);
        for _ in 0..500 {
            let p = jitter.safe_point(1.0, 598.0, (800, 600));
            assert!(p.x >= 0.0 && p.x <= 6.0);
            assert!(p.y >= 593.0 && p.y <= 599.0);
        }
    }

    #[test]
    fn safe_point_identity_when_disabled() {
        let mut jitter = Jitter::seeded(test_profile(false), 7);
        assert_eq!(jitter.safe_point(12.0, 34.0, (800, 600)), Point::new(12.0, 34.0));
    }

    #[test]
    fn mouse_duration_respects_floor_and_toggle() {
        let mut on = Jitter::seeded(test_profile(true), 3);
        for _ in 0..500 {
            let d = on.mouse_duration().as_secs_f64();
            assert!(d >= MIN_MOUSE_SECS && d <= 0.4 + 0.4 + 1e-9);
        }
        let mut off = Jitter::seeded(test_profile(false), 3);
        assert_eq!(off.mouse_duration(), Duration::from_millis(100));
    }

    #[test]
    fn generated_profile_ranges() {
        let mut rng = StdRng::seed_from_u64(9);
        let cfg = AntiDetectionConfig::default();
        for _ in 0..100 {
            let p = AntiDetectionProfile::generate(&cfg, &mut rng);
            assert!((70..=120).contains(&p.max_clicks_per_minute));
            assert!((0.3..=0.6).contains(&p.mouse_speed_variance));
        }
        let safe = AntiDetectionConfig {
            safe_mode: true,
            ..AntiDetectionConfig::default()
        };
        let p = AntiDetectionProfile::generate(&safe, &mut rng);
        assert!((0.5..=0.8).contains(&p.mouse_speed_variance));
    }
}

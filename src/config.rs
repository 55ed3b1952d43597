use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{GatherError, GatherResult};
use crate::perception::coords::AxisScaling;
use crate::perception::selector::TargetPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub anti_detection: AntiDetectionConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStrategyKind {
    /// Window owned by the configured process / application name.
    Process,
    /// Window whose title matches exactly.
    Title,
    /// Best keyword match over all visible window titles.
    SimilarTitle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_window_title")]
    pub window_title: String,
    #[serde(default = "default_process_name")]
    pub process_name: String,
    /// Keywords scored against window titles by the `similar_title` strategy.
    #[serde(default = "default_title_keywords")]
    pub title_keywords: Vec<String>,
    /// Tried in order; the first strategy that resolves a window wins.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<CaptureStrategyKind>,
}

fn default_window_title() -> String {
    "Albion Online Client".into()
}

fn default_process_name() -> String {
    "AlbionClient".into()
}

fn default_title_keywords() -> Vec<String> {
    ["albion", "online", "client", "game"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_strategies() -> Vec<CaptureStrategyKind> {
    vec![
        CaptureStrategyKind::Process,
        CaptureStrategyKind::Title,
        CaptureStrategyKind::SimilarTitle,
    ]
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_title: default_window_title(),
            process_name: default_process_name(),
            title_keywords: default_title_keywords(),
            strategies: default_strategies(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// Side of the square working frame the detector runs on.
    #[serde(default = "default_frame_size")]
    pub frame_size: u32,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default = "default_iou")]
    pub iou_threshold: f32,
    /// Human-readable labels indexed by class id (logging only).
    #[serde(default = "default_class_names")]
    pub class_names: Vec<String>,
    /// Agent anchor in working-frame pixels. Defaults to just above centre.
    #[serde(default)]
    pub anchor: Option<[f64; 2]>,
}

fn default_model_path() -> String {
    "best.onnx".into()
}

fn default_frame_size() -> u32 {
    640
}

fn default_confidence() -> f32 {
    0.7
}

fn default_iou() -> f32 {
    0.45
}

fn default_class_names() -> Vec<String> {
    ["stone", "wood", "fiber", "ore", "hide"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            frame_size: default_frame_size(),
            confidence: default_confidence(),
            iou_threshold: default_iou(),
            class_names: default_class_names(),
            anchor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Reference image of the progress-bar border.
    #[serde(default = "default_reference_image")]
    pub reference_image: String,
    /// Region `[x1, y1, x2, y2]` of the working frame that holds the bar.
    #[serde(default = "default_region")]
    pub region: [u32; 4],
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
}

fn default_reference_image() -> String {
    "images/cropped_bar_resource.png".into()
}

fn default_region() -> [u32; 4] {
    [265, 365, 293, 410]
}

fn default_match_threshold() -> f32 {
    0.8
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            reference_image: default_reference_image(),
            region: default_region(),
            match_threshold: default_match_threshold(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationEntry {
    pub class_id: u32,
    pub secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
    #[serde(default = "default_approach_timeout")]
    pub approach_timeout_secs: f64,
    /// Unconfirmed approach older than this gets its click re-issued once.
    /// Defaults to half the approach window.
    #[serde(default)]
    pub stuck_after_secs: Option<f64>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_inventory_limit")]
    pub inventory_limit: u32,
    #[serde(default = "default_durations")]
    pub durations: Vec<DurationEntry>,
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: f64,
    /// Symmetric jitter added to the nominal action duration.
    #[serde(default = "default_duration_jitter")]
    pub duration_jitter_secs: f64,
    /// Acting times out after `expected * timeout_factor`.
    #[serde(default = "default_timeout_factor")]
    pub timeout_factor: f64,
    #[serde(default = "default_sweep_px")]
    pub sweep_max_px: f64,
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: f64,
    /// Toggle the in-app overlay (Alt+H) around each approach.
    #[serde(default = "default_true")]
    pub hide_overlay: bool,
    /// Focus checks before an input action gives up on the cycle.
    #[serde(default = "default_focus_retries")]
    pub focus_retries: u32,
    #[serde(default = "default_focus_retry")]
    pub focus_retry_secs: f64,
    #[serde(default)]
    pub axis_scaling: AxisScaling,
    #[serde(default)]
    pub target_policy: TargetPolicy,
}

fn default_poll_interval() -> f64 {
    0.5
}

fn default_approach_timeout() -> f64 {
    15.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_inventory_limit() -> u32 {
    15
}

fn default_durations() -> Vec<DurationEntry> {
    [(0, 12.0), (1, 10.0), (2, 8.0), (3, 15.0), (4, 9.0)]
        .into_iter()
        .map(|(class_id, secs)| DurationEntry { class_id, secs })
        .collect()
}

fn default_duration_secs() -> f64 {
    12.0
}

fn default_duration_jitter() -> f64 {
    1.0
}

fn default_timeout_factor() -> f64 {
    1.5
}

fn default_sweep_px() -> f64 {
    20.0
}

fn default_settle_delay() -> f64 {
    0.7
}

fn default_focus_retries() -> u32 {
    3
}

fn default_focus_retry() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            approach_timeout_secs: default_approach_timeout(),
            stuck_after_secs: None,
            max_attempts: default_max_attempts(),
            inventory_limit: default_inventory_limit(),
            durations: default_durations(),
            default_duration_secs: default_duration_secs(),
            duration_jitter_secs: default_duration_jitter(),
            timeout_factor: default_timeout_factor(),
            sweep_max_px: default_sweep_px(),
            settle_delay_secs: default_settle_delay(),
            hide_overlay: true,
            focus_retries: default_focus_retries(),
            focus_retry_secs: default_focus_retry(),
            axis_scaling: AxisScaling::default(),
            target_policy: TargetPolicy::default(),
        }
    }
}

impl InteractionConfig {
    pub fn stuck_after_secs(&self) -> f64 {
        self.stuck_after_secs
            .unwrap_or(self.approach_timeout_secs / 2.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiDetectionConfig {
    #[serde(default = "default_true")]
    pub randomize_delays: bool,
    #[serde(default = "default_true")]
    pub avoid_patterns: bool,
    #[serde(default = "default_true")]
    pub human_like_mouse: bool,
    /// Slower, more variable pointer movement.
    #[serde(default)]
    pub safe_mode: bool,
}

impl Default for AntiDetectionConfig {
    fn default() -> Self {
        Self {
            randomize_delays: true,
            avoid_patterns: true,
            human_like_mouse: true,
            safe_mode: false,
        }
    }
}

impl AntiDetectionConfig {
    pub fn disable_all(&mut self) {
        self.randomize_delays = false;
        self.avoid_patterns = false;
        self.human_like_mouse = false;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_tick")]
    pub min_interval_secs: f64,
    #[serde(default = "default_max_tick")]
    pub max_interval_secs: f64,
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: f64,
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: f64,
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: f64,
    /// Process names whose presence is logged on every tick.
    #[serde(default)]
    pub watched_processes: Vec<String>,
}

fn default_min_tick() -> f64 {
    5.0
}

fn default_max_tick() -> f64 {
    15.0
}

fn default_idle_threshold() -> f64 {
    300.0
}

fn default_error_backoff() -> f64 {
    30.0
}

fn default_join_timeout() -> f64 {
    1.0
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: default_min_tick(),
            max_interval_secs: default_max_tick(),
            idle_threshold_secs: default_idle_threshold(),
            error_backoff_secs: default_error_backoff(),
            join_timeout_secs: default_join_timeout(),
            watched_processes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_resources")]
    pub max_resources: u32,
    #[serde(default = "default_max_minutes")]
    pub max_time_minutes: u32,
    #[serde(default = "default_inter_cycle")]
    pub inter_cycle_delay_secs: f64,
    #[serde(default = "default_long_pause_probability")]
    pub long_pause_probability: f64,
    #[serde(default = "default_long_pause")]
    pub long_pause_secs: f64,
    #[serde(default = "default_unfocused_pause")]
    pub unfocused_pause_secs: f64,
    /// Random wait before the first cycle, `[min, max]` seconds.
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: [f64; 2],
    /// Write progress events to a JSONL file under the local data dir.
    #[serde(default = "default_true")]
    pub record_history: bool,
}

fn default_max_resources() -> u32 {
    100
}

fn default_max_minutes() -> u32 {
    60
}

fn default_inter_cycle() -> f64 {
    1.0
}

fn default_long_pause_probability() -> f64 {
    0.05
}

fn default_long_pause() -> f64 {
    5.0
}

fn default_unfocused_pause() -> f64 {
    2.0
}

fn default_startup_delay() -> [f64; 2] {
    [1.5, 3.0]
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_resources: default_max_resources(),
            max_time_minutes: default_max_minutes(),
            inter_cycle_delay_secs: default_inter_cycle(),
            long_pause_probability: default_long_pause_probability(),
            long_pause_secs: default_long_pause(),
            unfocused_pause_secs: default_unfocused_pause(),
            startup_delay_secs: default_startup_delay(),
            record_history: true,
        }
    }
}

impl AppConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> GatherResult<()> {
        if self.capture.strategies.is_empty() {
            return Err(GatherError::Config(
                "capture.strategies must list at least one strategy".into(),
            ));
        }
        if self.detector.frame_size == 0 {
            return Err(GatherError::Config("detector.frame_size must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(GatherError::Config(format!(
                "detector.confidence {} outside [0, 1]",
                self.detector.confidence
            )));
        }

        let [x1, y1, x2, y2] = self.confirmation.region;
        if x2 <= x1 || y2 <= y1 || x2 > self.detector.frame_size || y2 > self.detector.frame_size {
            return Err(GatherError::Config(format!(
                "confirmation.region {:?} is empty or outside the working frame",
                self.confirmation.region
            )));
        }

        let i = &self.interaction;
        positive("interaction.poll_interval_secs", i.poll_interval_secs)?;
        positive("interaction.approach_timeout_secs", i.approach_timeout_secs)?;
        if let Some(stuck) = i.stuck_after_secs {
            positive("interaction.stuck_after_secs", stuck)?;
        }
        non_negative("interaction.duration_jitter_secs", i.duration_jitter_secs)?;
        non_negative("interaction.sweep_max_px", i.sweep_max_px)?;
        non_negative("interaction.settle_delay_secs", i.settle_delay_secs)?;
        non_negative("interaction.focus_retry_secs", i.focus_retry_secs)?;
        if !(i.timeout_factor.is_finite() && i.timeout_factor >= 1.0) {
            return Err(GatherError::Config(
                "interaction.timeout_factor must be >= 1.0".into(),
            ));
        }
        if i.max_attempts == 0 {
            return Err(GatherError::Config("interaction.max_attempts must be > 0".into()));
        }
        if i.focus_retries == 0 {
            return Err(GatherError::Config("interaction.focus_retries must be > 0".into()));
        }
        if let TargetPolicy::Sticky { radius } = i.target_policy {
            non_negative("interaction.target_policy.radius", radius)?;
        }
        validate_durations(&i.durations, i.default_duration_secs)?;

        let l = &self.liveness;
        positive("liveness.min_interval_secs", l.min_interval_secs)?;
        positive("liveness.max_interval_secs", l.max_interval_secs)?;
        if l.max_interval_secs < l.min_interval_secs {
            return Err(GatherError::Config(format!(
                "liveness interval [{}, {}] is invalid",
                l.min_interval_secs, l.max_interval_secs
            )));
        }
        positive("liveness.idle_threshold_secs", l.idle_threshold_secs)?;
        positive("liveness.error_backoff_secs", l.error_backoff_secs)?;
        positive("liveness.join_timeout_secs", l.join_timeout_secs)?;

        let s = &self.session;
        if !(0.0..=1.0).contains(&s.long_pause_probability) {
            return Err(GatherError::Config(
                "session.long_pause_probability outside [0, 1]".into(),
            ));
        }
        non_negative("session.inter_cycle_delay_secs", s.inter_cycle_delay_secs)?;
        non_negative("session.long_pause_secs", s.long_pause_secs)?;
        positive("session.unfocused_pause_secs", s.unfocused_pause_secs)?;
        let [lo, hi] = s.startup_delay_secs;
        non_negative("session.startup_delay_secs", lo)?;
        non_negative("session.startup_delay_secs", hi)?;
        if hi < lo {
            return Err(GatherError::Config("session.startup_delay_secs is invalid".into()));
        }
        Ok(())
    }
}

/// Finite and strictly positive. Thresholds, timeouts and intervals.
fn positive(field: &str, value: f64) -> GatherResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(GatherError::Config(format!("{field} must be positive, got {value}")))
    }
}

/// Finite and not negative. Delays and jitter, where zero switches them off.
fn non_negative(field: &str, value: f64) -> GatherResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(GatherError::Config(format!("{field} must not be negative, got {value}")))
    }
}

pub(crate) fn validate_durations(entries: &[DurationEntry], default_secs: f64) -> GatherResult<()> {
    if entries.is_empty() {
        return Err(GatherError::Config(
            "interaction.durations must map at least one class".into(),
        ));
    }
    positive("interaction.default_duration_secs", default_secs)?;
    let mut seen = HashSet::new();
    for entry in entries {
        positive(&format!("duration for class {}", entry.class_id), entry.secs)?;
        if !seen.insert(entry.class_id) {
            return Err(GatherError::Config(format!(
                "duplicate duration entry for class {}",
                entry.class_id
            )));
        }
    }
    Ok(())
}

fn resolve_config_path() -> GatherResult<Option<PathBuf>> {
    if let Ok(explicit) = std::env::var("GATHER_CONFIG") {
        let path = PathBuf::from(explicit);
        if !path.exists() {
            return Err(GatherError::Config(format!(
                "GATHER_CONFIG points to missing file {}",
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(Some(candidate));
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(Some(candidate));
    }

    Ok(None)
}

/// Load `config.toml` if one is found, defaults otherwise.
pub fn load_config() -> GatherResult<AppConfig> {
    match resolve_config_path()? {
        Some(path) => load_config_from(&path),
        None => {
            tracing::info!("no config.toml found; using built-in defaults");
            Ok(AppConfig::default())
        }
    }
}

pub fn load_config_from(path: &std::path::Path) -> GatherResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;
    tracing::info!(
        path = %path.display(),
        window = %config.capture.window_title,
        "config loaded"
    );
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &std::path::Path) -> GatherResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.interaction.max_attempts, 3);
        assert_eq!(cfg.interaction.inventory_limit, 15);
        assert_eq!(cfg.interaction.stuck_after_secs(), 7.5);
        assert_eq!(cfg.liveness.idle_threshold_secs, 300.0);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [session]
            max_resources = 40

            [interaction]
            default_duration_secs = 11.0

            [[interaction.durations]]
            class_id = 7
            secs = 4.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.session.max_resources, 40);
        assert_eq!(cfg.session.max_time_minutes, 60);
        assert_eq!(cfg.interaction.durations, vec![DurationEntry { class_id: 7, secs: 4.5 }]);
        assert_eq!(cfg.interaction.axis_scaling, AxisScaling::Symmetric);
        cfg.validate().unwrap();
    }

    #[test]
    fn empty_duration_table_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.interaction.durations.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("at least one class"));
    }

    #[test]
    fn duplicate_duration_entries_are_rejected() {
        let entries = vec![
            DurationEntry { class_id: 1, secs: 3.0 },
            DurationEntry { class_id: 1, secs: 4.0 },
        ];
        assert!(validate_durations(&entries, 12.0).is_err());
    }

    #[test]
    fn negative_join_timeout_is_rejected() {
        let cfg: AppConfig = toml::from_str("[liveness]\njoin_timeout_secs = -1.0").unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("liveness.join_timeout_secs"));
    }

    #[test]
    fn out_of_range_seconds_are_rejected() {
        let cases: &[(&str, fn(&mut AppConfig))] = &[
            ("interaction.poll_interval_secs", |c| c.interaction.poll_interval_secs = 0.0),
            ("interaction.approach_timeout_secs", |c| c.interaction.approach_timeout_secs = f64::INFINITY),
            ("interaction.stuck_after_secs", |c| c.interaction.stuck_after_secs = Some(-2.0)),
            ("interaction.duration_jitter_secs", |c| c.interaction.duration_jitter_secs = f64::NAN),
            ("interaction.settle_delay_secs", |c| c.interaction.settle_delay_secs = -0.5),
            ("interaction.sweep_max_px", |c| c.interaction.sweep_max_px = -1.0),
            ("interaction.focus_retry_secs", |c| c.interaction.focus_retry_secs = -1.0),
            ("interaction.focus_retries", |c| c.interaction.focus_retries = 0),
            ("interaction.timeout_factor", |c| c.interaction.timeout_factor = f64::NAN),
            ("interaction.default_duration_secs", |c| c.interaction.default_duration_secs = f64::NAN),
            ("duration for class 0", |c| c.interaction.durations[0].secs = -3.0),
            ("interaction.target_policy.radius", |c| {
                c.interaction.target_policy = TargetPolicy::Sticky { radius: -1.0 }
            }),
            ("liveness.idle_threshold_secs", |c| c.liveness.idle_threshold_secs = -300.0),
            ("liveness.error_backoff_secs", |c| c.liveness.error_backoff_secs = -30.0),
            ("liveness.join_timeout_secs", |c| c.liveness.join_timeout_secs = 0.0),
            ("liveness.min_interval_secs", |c| c.liveness.min_interval_secs = f64::NAN),
            ("liveness interval", |c| c.liveness.max_interval_secs = 1.0),
            ("session.inter_cycle_delay_secs", |c| c.session.inter_cycle_delay_secs = -1.0),
            ("session.long_pause_secs", |c| c.session.long_pause_secs = f64::NEG_INFINITY),
            ("session.unfocused_pause_secs", |c| c.session.unfocused_pause_secs = -2.0),
            ("session.startup_delay_secs", |c| c.session.startup_delay_secs = [-1.0, 3.0]),
            ("session.startup_delay_secs", |c| c.session.startup_delay_secs = [3.0, 1.0]),
        ];
        for &(field, break_it) in cases {
            let mut cfg = AppConfig::default();
            break_it(&mut cfg);
            let err = cfg.validate().expect_err(field);
            assert!(err.to_string().contains(field), "{field}: {err}");
        }
    }

    #[test]
    fn zero_delays_are_allowed() {
        let mut cfg = AppConfig::default();
        cfg.interaction.duration_jitter_secs = 0.0;
        cfg.interaction.settle_delay_secs = 0.0;
        cfg.session.inter_cycle_delay_secs = 0.0;
        cfg.session.startup_delay_secs = [0.0, 0.0];
        cfg.validate().unwrap();
    }

    #[test]
    fn save_then_load_preserves_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.session.max_resources = 7;
        cfg.interaction.target_policy = TargetPolicy::Sticky { radius: 24.0 };
        save_config(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.session.max_resources, 7);
        assert_eq!(loaded.interaction.target_policy, TargetPolicy::Sticky { radius: 24.0 });
    }
}

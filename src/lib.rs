pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod perception;

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;

use crate::agent_engine::clock::ActivityClock;
use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::history::SessionHistory;
use crate::agent_engine::interaction::Interaction;
use crate::agent_engine::liveness::{LivenessMonitor, LivenessWatch};
use crate::agent_engine::session::Session;
use crate::agent_engine::state::{SessionLimits, SessionSummary};
use crate::config::AppConfig;
use crate::errors::GatherResult;
use crate::executor::humanize::Humanizer;
use crate::executor::input::{Actuator, EnigoActuator};
use crate::executor::jitter::{AntiDetectionProfile, Jitter};
use crate::perception::confirmation::build_probe;
use crate::perception::environment::{FocusProbe, ProcessProbe, ProcessWatch, WindowFocus};
use crate::perception::pipeline::VisionPipeline;
use crate::perception::screenshot::{open_window_capture, WindowCapture};
use crate::perception::selector::TargetSelector;
use crate::perception::traits::CaptureSource;
use crate::perception::types::{AgentAnchor, FrameSize, Point};
use crate::perception::yolo_detector::YoloDetector;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global subscriber. `RUST_LOG` wins over the `debug` flag.
pub fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
}

/// Capture plus detector, ready to produce filtered detections.
pub struct Vision {
    pub capture: Arc<WindowCapture>,
    pub pipeline: VisionPipeline,
    pub frame: FrameSize,
    pub anchor: AgentAnchor,
}

/// Resolve the target window and load the detector.
///
/// Fails with `CaptureUnavailable` when no capture strategy finds a window.
pub fn build_vision(cfg: &AppConfig) -> GatherResult<Vision> {
    let capture = Arc::new(open_window_capture(&cfg.capture)?);
    let frame = FrameSize::square(cfg.detector.frame_size);
    let detector = YoloDetector::load(
        &cfg.detector.model_path,
        cfg.detector.frame_size,
        cfg.detector.confidence,
        cfg.detector.iou_threshold,
        cfg.detector.class_names.clone(),
    )?;
    let pipeline = VisionPipeline::new(
        capture.clone() as Arc<dyn CaptureSource>,
        Box::new(detector),
        frame,
        cfg.detector.confidence,
    );
    let anchor = cfg
        .detector
        .anchor
        .map(|[x, y]| AgentAnchor(Point::new(x, y)))
        .unwrap_or_else(|| AgentAnchor::for_frame(frame));
    Ok(Vision {
        capture,
        pipeline,
        frame,
        anchor,
    })
}

/// Wire every component of a gathering session.
pub fn build_session(cfg: &AppConfig, events: EventBus) -> GatherResult<(Session, Arc<AntiDetectionProfile>)> {
    cfg.validate()?;
    let vision = build_vision(cfg)?;

    let profile = Arc::new(AntiDetectionProfile::generate(
        &cfg.anti_detection,
        &mut rand::rngs::StdRng::from_entropy(),
    ));
    let activity = ActivityClock::system();
    let actuator: Arc<dyn Actuator> = Arc::new(EnigoActuator);

    let probe = build_probe(
        &cfg.confirmation,
        vision.capture.clone() as Arc<dyn CaptureSource>,
        vision.frame,
    );
    let selector = TargetSelector::new(
        vision.anchor,
        cfg.interaction.axis_scaling,
        cfg.interaction.target_policy,
    );
    let humanizer = Humanizer::new(actuator.clone(), Jitter::new(profile.clone()), activity.clone());
    let interaction = Interaction::new(
        Box::new(vision.pipeline),
        probe,
        humanizer,
        selector,
        cfg.interaction.clone(),
    )?
    .with_focus(Box::new(WindowFocus::new(vision.capture.title())))
    .with_events(events.clone());

    let focus: Box<dyn FocusProbe> = Box::new(WindowFocus::new(vision.capture.title()));
    let mut session = Session::new(interaction, focus, cfg.session.clone(), events);

    if cfg.liveness.enabled {
        let watch = LivenessWatch::new(
            Humanizer::new(actuator, Jitter::new(profile.clone()), activity),
            Box::new(ProcessWatch::new(cfg.liveness.watched_processes.clone())),
            Duration::from_secs_f64(cfg.liveness.idle_threshold_secs),
        );
        session = session.with_monitor(LivenessMonitor::new(cfg.liveness.clone(), watch));
    }
    Ok((session, profile))
}

/// Run one gathering session until a limit, a full inventory, or Ctrl+C.
pub async fn run_gather(cfg: &AppConfig) -> GatherResult<SessionSummary> {
    let events = EventBus::new();
    let (mut session, profile) = build_session(cfg, events.clone())?;

    let recorder = cfg.session.record_history.then(|| {
        let history = SessionHistory::new(profile.session_id.to_string());
        tracing::info!(path = %history.path().display(), "session history");
        history.spawn_recorder(events.subscribe())
    });

    let stop = session.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stop requested");
            stop.stop();
        }
    });

    let limits = SessionLimits::new(cfg.session.max_resources, cfg.session.max_time_minutes);
    let summary = session.run(limits).await;

    if let Some(recorder) = recorder {
        if tokio::time::timeout(Duration::from_secs(2), recorder).await.is_err() {
            tracing::warn!("history recorder did not finish");
        }
    }
    Ok(summary)
}

/// Perception-only loop: log what would be targeted, never act.
pub async fn run_detect(cfg: &AppConfig, frames: Option<u32>) -> GatherResult<()> {
    cfg.validate()?;
    let vision = build_vision(cfg)?;
    let mut selector = TargetSelector::new(
        vision.anchor,
        cfg.interaction.axis_scaling,
        cfg.interaction.target_policy,
    );
    let label = |class_id: u32| {
        cfg.detector
            .class_names
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    };

    let mut seen = 0u32;
    loop {
        if frames.is_some_and(|n| seen >= n) {
            break;
        }
        seen += 1;
        tokio::select! {
            result = vision.pipeline.run() => match result? {
                None => tracing::info!(frame = seen, "no frame"),
                Some(frame) => match selector.select(&frame) {
                    Some(t) => tracing::info!(
                        frame = seen,
                        detections = frame.detections.len(),
                        target = %label(t.class_id),
                        center = ?(t.center.x, t.center.y),
                        actuation = ?(t.actuation.x, t.actuation.y),
                        "target"
                    ),
                    None => tracing::info!(frame = seen, "nothing detected"),
                },
            },
            _ = tokio::signal::ctrl_c() => break,
        }
        tokio::time::sleep(Duration::from_secs_f64(cfg.interaction.poll_interval_secs)).await;
    }
    Ok(())
}

/// One-shot environment self-test. Returns whether everything needed for a
/// session is in place.
pub async fn run_check(cfg: &AppConfig) -> GatherResult<bool> {
    let mut ok = true;

    match cfg.validate() {
        Ok(()) => tracing::info!("config: ok"),
        Err(e) => {
            tracing::error!(error = %e, "config: invalid");
            ok = false;
        }
    }

    if std::path::Path::new(&cfg.confirmation.reference_image).exists() {
        tracing::info!(path = %cfg.confirmation.reference_image, "progress-bar reference: ok");
    } else {
        tracing::warn!(
            path = %cfg.confirmation.reference_image,
            "progress-bar reference missing; confirmation will be assumed"
        );
    }

    let running = ProcessWatch::new(cfg.liveness.watched_processes.clone()).running();
    if running.is_empty() {
        tracing::info!("watched processes: none running");
    } else {
        tracing::info!(processes = ?running, "watched processes: running");
    }

    let vision = match build_vision(cfg) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "capture/detector: unavailable");
            return Ok(false);
        }
    };
    tracing::info!(
        window = %vision.capture.title(),
        geometry = ?vision.capture.geometry(),
        "capture: ok"
    );

    let focused = WindowFocus::new(vision.capture.title()).is_focused();
    tracing::info!(focused, "focus");

    match vision.pipeline.run().await {
        Ok(Some(frame)) => tracing::info!(detections = frame.detections.len(), "detection pass: ok"),
        Ok(None) => tracing::warn!("detection pass: no frame (window minimized?)"),
        Err(e) => {
            tracing::error!(error = %e, "detection pass: failed");
            ok = false;
        }
    }
    Ok(ok)
}

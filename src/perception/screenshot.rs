//! Window capture through xcap, resolved from a ranked list of strategies.
use std::sync::Mutex;

use image::RgbaImage;
use regex::RegexBuilder;

use crate::config::{CaptureConfig, CaptureStrategyKind};
use crate::errors::{GatherError, GatherResult};
use crate::perception::traits::CaptureSource;
use crate::perception::types::WindowGeometry;

/// One way of locating the target window.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureStrategy {
    Process { name: String },
    Title { title: String },
    SimilarTitle { keywords: Vec<String> },
}

impl CaptureStrategy {
    pub fn from_config(cfg: &CaptureConfig) -> Vec<CaptureStrategy> {
        cfg.strategies
            .iter()
            .map(|kind| match kind {
                CaptureStrategyKind::Process => CaptureStrategy::Process {
                    name: cfg.process_name.clone(),
                },
                CaptureStrategyKind::Title => CaptureStrategy::Title {
                    title: cfg.window_title.clone(),
                },
                CaptureStrategyKind::SimilarTitle => CaptureStrategy::SimilarTitle {
                    keywords: cfg.title_keywords.clone(),
                },
            })
            .collect()
    }

    fn label(&self) -> String {
        match self {
            CaptureStrategy::Process { name } => format!("process '{name}'"),
            CaptureStrategy::Title { title } => format!("title '{title}'"),
            CaptureStrategy::SimilarTitle { keywords } => format!("keywords {keywords:?}"),
        }
    }
}

/// Metadata of a candidate window, decoupled from xcap for ranking.
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub id: u32,
    pub title: String,
    pub app_name: String,
    pub minimized: bool,
    pub geometry: WindowGeometry,
}

/// Pick the window a strategy refers to from a list of candidates.
pub fn pick_window(strategy: &CaptureStrategy, windows: &[WindowInfo]) -> Option<WindowInfo> {
    match strategy {
        CaptureStrategy::Process { name } => {
            let wanted = name.trim_end_matches(".exe").to_lowercase();
            windows
                .iter()
                .find(|w| w.app_name.trim_end_matches(".exe").to_lowercase() == wanted)
                .cloned()
        }
        CaptureStrategy::Title { title } => windows.iter().find(|w| &w.title == title).cloned(),
        CaptureStrategy::SimilarTitle { keywords } => {
            let patterns: Vec<_> = keywords
                .iter()
                .filter_map(|k| {
                    RegexBuilder::new(&regex::escape(k))
                        .case_insensitive(true)
                        .build()
                        .ok()
                })
                .collect();
            let mut best: Option<(usize, &WindowInfo)> = None;
            for w in windows.iter().filter(|w| !w.title.is_empty()) {
                let score = patterns.iter().filter(|p| p.is_match(&w.title)).count();
                if score == 0 {
                    continue;
                }
                if best.map_or(true, |(s, _)| score > s) {
                    best = Some((score, w));
                }
            }
            best.map(|(_, w)| w.clone())
        }
    }
}

fn list_windows() -> GatherResult<Vec<(xcap::Window, WindowInfo)>> {
    let windows =
        xcap::Window::all().map_err(|e| GatherError::Capture(format!("enumerate windows: {e}")))?;
    Ok(windows
        .into_iter()
        .map(|w| {
            let info = WindowInfo {
                id: w.id(),
                title: w.title().to_string(),
                app_name: w.app_name().to_string(),
                minimized: w.is_minimized(),
                geometry: WindowGeometry {
                    top: w.y(),
                    left: w.x(),
                    width: w.width(),
                    height: w.height(),
                },
            };
            (w, info)
        })
        .collect())
}

/// Live capture of one resolved window. The window is re-looked-up on every
/// screenshot so moves and resizes are picked up.
pub struct WindowCapture {
    window_id: u32,
    title: String,
    geometry: Mutex<Option<WindowGeometry>>,
}

impl WindowCapture {
    /// Try one strategy against the current desktop.
    pub fn resolve(strategy: &CaptureStrategy) -> GatherResult<Self> {
        let windows = list_windows()?;
        let infos: Vec<WindowInfo> = windows.into_iter().map(|(_, info)| info).collect();
        let found = pick_window(strategy, &infos).ok_or_else(|| {
            GatherError::Capture(format!("no window matches {}", strategy.label()))
        })?;
        tracing::info!(
            title = %found.title,
            id = found.id,
            strategy = %strategy.label(),
            "window resolved"
        );
        Ok(Self {
            window_id: found.id,
            title: found.title,
            geometry: Mutex::new(Some(found.geometry)),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    fn store_geometry(&self, geometry: Option<WindowGeometry>) {
        if let Ok(mut slot) = self.geometry.lock() {
            *slot = geometry;
        }
    }
}

impl CaptureSource for WindowCapture {
    fn name(&self) -> &str {
        &self.title
    }

    fn screenshot(&self) -> GatherResult<Option<RgbaImage>> {
        let Some((window, info)) = list_windows()?
            .into_iter()
            .find(|(_, info)| info.id == self.window_id)
        else {
            tracing::warn!(title = %self.title, "captured window disappeared");
            self.store_geometry(None);
            return Ok(None);
        };

        if info.minimized {
            tracing::debug!(title = %self.title, "window minimized; no frame");
            return Ok(None);
        }
        self.store_geometry(Some(info.geometry));

        match window.capture_image() {
            Ok(img) => Ok(Some(img)),
            Err(e) => {
                tracing::warn!(error = %e, "window capture failed");
                Ok(None)
            }
        }
    }

    fn geometry(&self) -> Option<WindowGeometry> {
        self.geometry.lock().ok().and_then(|g| *g)
    }
}

/// Try each strategy in order and return the first that resolves.
/// Fails with `CaptureUnavailable` when none does.
pub fn resolve_capture<F, C>(strategies: &[CaptureStrategy], mut attempt: F) -> GatherResult<C>
where
    F: FnMut(&CaptureStrategy) -> GatherResult<C>,
{
    let mut failures = Vec::new();
    for strategy in strategies {
        match attempt(strategy) {
            Ok(capture) => return Ok(capture),
            Err(e) => {
                tracing::warn!(strategy = %strategy.label(), error = %e, "capture strategy failed");
                failures.push(format!("{}: {e}", strategy.label()));
            }
        }
    }
    Err(GatherError::CaptureUnavailable(if failures.is_empty() {
        "no capture strategies configured".into()
    } else {
        failures.join("; ")
    }))
}

/// Resolve the configured strategies against live windows.
pub fn open_window_capture(cfg: &CaptureConfig) -> GatherResult<WindowCapture> {
    resolve_capture(&CaptureStrategy::from_config(cfg), WindowCapture::resolve)
}

// Physical input simulation through enigo.
use std::time::Duration;

use async_trait::async_trait;
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{GatherError, GatherResult};
use crate::perception::types::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKey {
    Alt,
    Control,
    Shift,
    Char(char),
}

/// Pointer/keyboard primitives. Calls are fire-and-forget; callers treat
/// errors as soft failures.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Move the pointer to `to` over `duration`.
    async fn move_to(&self, to: Point, duration: Duration) -> GatherResult<()>;
    async fn click(&self, button: MouseButton) -> GatherResult<()>;
    /// Hold `button` and move by `(dx, dy)` over `duration`.
    async fn drag_relative(&self, button: MouseButton, dx: i32, dy: i32, duration: Duration) -> GatherResult<()>;
    /// Press `keys` in order, release in reverse.
    async fn hotkey(&self, keys: &[InputKey]) -> GatherResult<()>;
    async fn position(&self) -> GatherResult<Point>;
    async fn display_size(&self) -> GatherResult<(u32, u32)>;
}

/// Milliseconds per interpolation step.
const STEP_MS: u64 = 10;

/// Ease-out quadratic, `t` in [0, 1].
pub fn ease_out_quad(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * (2.0 - t)
}

/// Intermediate pointer positions for a move from `from` to `to`.
/// Always ends exactly at `to`.
pub fn interpolate(from: (i32, i32), to: (i32, i32), duration: Duration) -> Vec<(i32, i32)> {
    let steps = (duration.as_millis() as u64 / STEP_MS).max(1);
    (1..=steps)
        .map(|i| {
            let k = ease_out_quad(i as f64 / steps as f64);
            (
                from.0 + ((to.0 - from.0) as f64 * k).round() as i32,
                from.1 + ((to.1 - from.1) as f64 * k).round() as i32,
            )
        })
        .collect()
}

/// `Actuator` backed by enigo. Each call builds its own connection on a
/// blocking thread; enigo handles are not `Send` on every platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnigoActuator;

fn connect() -> GatherResult<Enigo> {
    Enigo::new(&Settings::default()).map_err(|e| GatherError::Executor(format!("enigo connect: {e}")))
}

fn input_err(e: enigo::InputError) -> GatherError {
    GatherError::Executor(format!("input: {e}"))
}

fn enigo_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
    }
}

fn enigo_key(key: InputKey) -> Key {
    match key {
        InputKey::Alt => Key::Alt,
        InputKey::Control => Key::Control,
        InputKey::Shift => Key::Shift,
        InputKey::Char(c) => Key::Unicode(c),
    }
}

async fn blocking<T, F>(f: F) -> GatherResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> GatherResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GatherError::Executor(format!("join: {e}")))?
}

fn glide(enigo: &mut Enigo, to: (i32, i32), duration: Duration) -> GatherResult<()> {
    let from = enigo.location().map_err(input_err)?;
    let steps = interpolate(from, to, duration);
    let pause = duration / steps.len() as u32;
    for (x, y) in steps {
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err)?;
        std::thread::sleep(pause);
    }
    Ok(())
}

/// Press `keys` in order and release them in reverse. Keys already down are
/// released even when a later press fails.
fn chord(
    keys: &[InputKey],
    mut send: impl FnMut(InputKey, Direction) -> GatherResult<()>,
) -> GatherResult<()> {
    let mut pressed = 0;
    let mut result = Ok(());
    for key in keys {
        if let Err(e) = send(*key, Direction::Press) {
            result = Err(e);
            break;
        }
        pressed += 1;
    }
    for key in keys[..pressed].iter().rev() {
        let released = send(*key, Direction::Release);
        if result.is_ok() {
            result = released;
        }
    }
    result
}

#[async_trait]
impl Actuator for EnigoActuator {
    async fn move_to(&self, to: Point, duration: Duration) -> GatherResult<()> {
        let target = to.to_pixels();
        blocking(move || {
            let mut enigo = connect()?;
            glide(&mut enigo, target, duration)
        })
        .await
    }

    async fn click(&self, button: MouseButton) -> GatherResult<()> {
        blocking(move || {
            let mut enigo = connect()?;
            enigo
                .button(enigo_button(button), Direction::Click)
                .map_err(input_err)
        })
        .await
    }

    async fn drag_relative(&self, button: MouseButton, dx: i32, dy: i32, duration: Duration) -> GatherResult<()> {
        blocking(move || {
            let mut enigo = connect()?;
            let (x, y) = enigo.location().map_err(input_err)?;
            enigo
                .button(enigo_button(button), Direction::Press)
                .map_err(input_err)?;
            let moved = glide(&mut enigo, (x + dx, y + dy), duration);
            // Release even if the glide failed halfway.
            let released = enigo
                .button(enigo_button(button), Direction::Release)
                .map_err(input_err);
            moved.and(released)
        })
        .await
    }

    async fn hotkey(&self, keys: &[InputKey]) -> GatherResult<()> {
        let keys = keys.to_vec();
        blocking(move || {
            let mut enigo = connect()?;
            chord(&keys, |key, direction| {
                enigo.key(enigo_key(key), direction).map_err(input_err)
            })
        })
        .await
    }

    async fn position(&self) -> GatherResult<Point> {
        blocking(|| {
            let enigo = connect()?;
            let (x, y) = enigo.location().map_err(input_err)?;
            Ok(Point::new(x as f64, y as f64))
        })
        .await
    }

    async fn display_size(&self) -> GatherResult<(u32, u32)> {
        blocking(|| {
            let enigo = connect()?;
            let (w, h) = enigo.main_display().map_err(input_err)?;
            Ok((w.max(0) as u32, h.max(0) as u32))
        })
        .await
    }
}

//! Environment probes: is the target window focused, and are any watched
//! processes running.
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

/// Whether the target application currently has input focus.
pub trait FocusProbe: Send + Sync {
    fn is_focused(&self) -> bool;
}

/// Whether any process from a watch list is running.
pub trait ProcessProbe: Send {
    /// Names of the watched processes currently running.
    fn running(&mut self) -> Vec<String>;

    fn any_running(&mut self) -> bool {
        !self.running().is_empty()
    }
}

/// Focus check for a window identified by its title.
///
/// On Windows this compares the foreground window's title; elsewhere it
/// settles for "the window exists and is not minimized".
pub struct WindowFocus {
    title: String,
}

impl WindowFocus {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }
}

impl FocusProbe for WindowFocus {
    #[cfg(windows)]
    fn is_focused(&self) -> bool {
        use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW, IsIconic};

        // SAFETY: plain Win32 queries on the foreground handle; the buffer
        // outlives the call.
        unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.0.is_null() || IsIconic(hwnd).as_bool() {
                return false;
            }
            let mut buf = [0u16; 512];
            let len = GetWindowTextW(hwnd, &mut buf);
            if len <= 0 {
                return false;
            }
            String::from_utf16_lossy(&buf[..len as usize]) == self.title
        }
    }

    #[cfg(not(windows))]
    fn is_focused(&self) -> bool {
        match xcap::Window::all() {
            Ok(windows) => windows
                .iter()
                .any(|w| w.title() == self.title && !w.is_minimized()),
            Err(e) => {
                tracing::warn!(error = %e, "window enumeration failed during focus check");
                false
            }
        }
    }
}

/// Always-focused probe for setups without a desktop session (dry runs).
pub struct AlwaysFocused;

impl FocusProbe for AlwaysFocused {
    fn is_focused(&self) -> bool {
        true
    }
}

/// Scans the process table for names on a watch list.
pub struct ProcessWatch {
    system: System,
    names: Vec<String>,
}

impl ProcessWatch {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            system: System::new(),
            names: names.into_iter().map(|n| n.to_lowercase()).collect(),
        }
    }
}

impl ProcessProbe for ProcessWatch {
    fn running(&mut self) -> Vec<String> {
        if self.names.is_empty() {
            return Vec::new();
        }
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::new());

        let mut found: Vec<String> = self
            .system
            .processes()
            .values()
            .map(|p| p.name().to_string_lossy().to_lowercase())
            .filter(|name| self.names.iter().any(|w| w == name))
            .collect();
        found.sort();
        found.dedup();
        found
    }
}

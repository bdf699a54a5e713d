//! Foreground process resolution
//!
//! Turning a foreground window into an application name and PID is
//! platform-coupled and best-effort. Strategies live behind
//! [`ProcessResolver`] so the click source never branches on the platform.

use crate::capture::traits::WindowHint;
use parking_lot::Mutex as ParkingMutex;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: Option<u32>,
}

/// Resolve a foreground window hint to the owning process
pub trait ProcessResolver: Send + Sync {
    fn resolve(&self, hint: &WindowHint) -> Option<ProcessInfo>;
}

/// Resolver that only echoes what the window hint already carries
pub struct NoopResolver;

impl ProcessResolver for NoopResolver {
    fn resolve(&self, hint: &WindowHint) -> Option<ProcessInfo> {
        hint.app_name.as_ref().map(|name| ProcessInfo {
            name: name.clone(),
            pid: hint.pid,
        })
    }
}

/// Window title suffixes and the process name of the browser behind them
const BROWSER_TITLES: &[(&str, &str)] = &[
    ("Google Chrome", "chrome"),
    ("Chrome", "chrome"),
    ("Microsoft Edge", "msedge"),
    ("Edge", "msedge"),
    ("Mozilla Firefox", "firefox"),
    ("Firefox", "firefox"),
    ("Brave", "brave"),
    ("Opera", "opera"),
];

/// Guess the browser process from a window title like `Docs - Google Chrome`
pub fn browser_from_title(title: &str) -> Option<&'static str> {
    let suffix = title.rsplit(" - ").next()?.trim();
    if suffix == title.trim() {
        return None;
    }
    BROWSER_TITLES
        .iter()
        .find(|(label, _)| suffix.eq_ignore_ascii_case(label))
        .map(|(_, process)| *process)
}

/// Lowercase process name without a Windows `.exe` suffix
pub fn normalize_process_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    lower
        .strip_suffix(".exe")
        .map(str::to_string)
        .unwrap_or(lower)
}

/// Resolver backed by the process table (`sysinfo`)
///
/// Tries the window's PID first, then falls back to scanning running
/// processes for the browser named in the window title.
pub struct SysinfoResolver {
    system: ParkingMutex<System>,
}

impl SysinfoResolver {
    pub fn new() -> Self {
        Self {
            system: ParkingMutex::new(System::new()),
        }
    }

    fn by_pid(&self, pid: u32) -> Option<ProcessInfo> {
        let pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        system.process(pid).map(|process| ProcessInfo {
            name: normalize_process_name(&process.name().to_string_lossy()),
            pid: Some(pid.as_u32()),
        })
    }

    fn by_browser_title(&self, title: &str) -> Option<ProcessInfo> {
        let browser = browser_from_title(title)?;
        let mut system = self.system.lock();
        system.refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::new());

        // Lowest PID is usually the browser's main process.
        let pid = system
            .processes()
            .iter()
            .filter(|(_, process)| normalize_process_name(&process.name().to_string_lossy()) == browser)
            .map(|(pid, _)| pid.as_u32())
            .min();

        Some(ProcessInfo {
            name: browser.to_string(),
            pid,
        })
    }
}

impl Default for SysinfoResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessResolver for SysinfoResolver {
    fn resolve(&self, hint: &WindowHint) -> Option<ProcessInfo> {
        if let Some(info) = hint.pid.and_then(|pid| self.by_pid(pid)) {
            return Some(info);
        }
        if let Some(info) = hint.title.as_deref().and_then(|t| self.by_browser_title(t)) {
            return Some(info);
        }
        NoopResolver.resolve(hint)
    }
}

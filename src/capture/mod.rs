//! Activity capture
//!
//! Screen capture, the OS click source, monitor geometry and the platform
//! collaborators behind them.

pub mod config;
pub mod headless;
pub mod input;
pub mod marker;
pub mod monitor;
pub mod process;
pub mod screen;
pub mod traits;

#[cfg(feature = "native")]
pub mod native;

use std::sync::Arc;

pub use config::{CaptureConfig, ConfigHandle};
pub use input::{ClickEvent, ExtEvent, MouseButton, OsClickSource};
pub use monitor::{locate_monitor, locate_monitor_scaled, MonitorRect, PRIMARY_MONITOR};
pub use process::{NoopResolver, ProcessInfo, ProcessResolver, SysinfoResolver};
pub use screen::{CaptureEvent, CaptureScheduler, ScreenCapturer};
pub use traits::{MouseHook, ScreenSource, WindowHint, WindowInspector};

/// The set of platform collaborators the service runs on
#[derive(Clone)]
pub struct Backends {
    pub screen: Arc<dyn ScreenSource>,
    pub hook: Arc<dyn MouseHook>,
    pub windows: Arc<dyn WindowInspector>,
    pub resolver: Arc<dyn ProcessResolver>,
}

impl Backends {
    pub fn headless() -> Self {
        Self {
            screen: Arc::new(headless::HeadlessScreen),
            hook: Arc::new(headless::HeadlessHook),
            windows: Arc::new(headless::HeadlessWindows),
            resolver: Arc::new(NoopResolver),
        }
    }

    #[cfg(feature = "native")]
    pub fn native() -> Self {
        let hub = native::PointerHub::shared();
        Self {
            screen: Arc::new(native::XcapScreen::new(hub.clone())),
            hook: Arc::new(native::RdevHook::new(hub)),
            windows: Arc::new(native::XcapWindows),
            resolver: Arc::new(SysinfoResolver::new()),
        }
    }

    /// Native backends when compiled in, headless otherwise
    pub fn detect() -> Self {
        #[cfg(feature = "native")]
        {
            tracing::info!("Using native capture backends");
            Self::native()
        }
        #[cfg(not(feature = "native"))]
        {
            tracing::info!("Using headless capture backends; only extension events are recorded");
            Self::headless()
        }
    }
}

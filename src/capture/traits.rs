//! Platform collaborator traits
//!
//! The capture core never talks to the OS directly. Screen grabbing, the
//! global mouse hook and foreground-window lookup sit behind these traits so
//! platform backends can be swapped without touching the scheduler, the
//! click source or the correlation engine.

use crate::capture::input::types::MouseButton;
use crate::capture::monitor::MonitorRect;
use crate::recorder::channel::CaptureResult;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Screen access: monitor layout, pointer position and bitmap grabs
pub trait ScreenSource: Send + Sync {
    /// Monitor rectangles; index 0 is the virtual desktop bounding box
    fn monitors(&self) -> CaptureResult<Vec<MonitorRect>>;

    /// Current pointer position in global desktop coordinates
    fn pointer_position(&self) -> CaptureResult<(i32, i32)>;

    /// Grab a bitmap of the given monitor rectangle
    fn grab(&self, monitor: &MonitorRect) -> CaptureResult<RgbaImage>;
}

/// Callback invoked by a mouse hook for every button press
pub type PressCallback = Arc<dyn Fn(i32, i32, MouseButton) + Send + Sync>;

/// Global OS mouse hook
pub trait MouseHook: Send + Sync {
    /// Start delivering button presses to `on_press`
    fn install(&self, on_press: PressCallback) -> CaptureResult<()>;

    /// Stop delivering button presses
    fn uninstall(&self);
}

/// Best-effort description of the foreground window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowHint {
    pub title: Option<String>,
    pub app_name: Option<String>,
    pub pid: Option<u32>,
}

/// Foreground window lookup
pub trait WindowInspector: Send + Sync {
    fn foreground(&self) -> Option<WindowHint>;
}

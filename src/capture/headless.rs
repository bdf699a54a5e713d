//! Headless backend
//!
//! Used when the crate is built without the `native` feature (servers, CI,
//! containers). Screen access and the mouse hook report platform errors, so
//! only the browser-extension ingress produces records.

use crate::capture::monitor::MonitorRect;
use crate::capture::traits::{MouseHook, PressCallback, ScreenSource, WindowHint, WindowInspector};
use crate::recorder::channel::{CaptureError, CaptureResult};
use image::RgbaImage;

const UNAVAILABLE: &str = "built without the `native` feature";

pub struct HeadlessScreen;

impl ScreenSource for HeadlessScreen {
    fn monitors(&self) -> CaptureResult<Vec<MonitorRect>> {
        Err(CaptureError::Platform(format!("Monitor enumeration {}", UNAVAILABLE)))
    }

    fn pointer_position(&self) -> CaptureResult<(i32, i32)> {
        Err(CaptureError::Platform(format!("Pointer query {}", UNAVAILABLE)))
    }

    fn grab(&self, _monitor: &MonitorRect) -> CaptureResult<RgbaImage> {
        Err(CaptureError::Platform(format!("Screen grab {}", UNAVAILABLE)))
    }
}

pub struct HeadlessHook;

impl MouseHook for HeadlessHook {
    fn install(&self, _on_press: PressCallback) -> CaptureResult<()> {
        Err(CaptureError::Platform(format!("Global mouse hook {}", UNAVAILABLE)))
    }

    fn uninstall(&self) {}
}

pub struct HeadlessWindows;

impl WindowInspector for HeadlessWindows {
    fn foreground(&self) -> Option<WindowHint> {
        None
    }
}

use crate::capture::monitor::MonitorRect;
use crate::capture::native::input::PointerHub;
use crate::capture::traits::{ScreenSource, WindowHint, WindowInspector};
use crate::recorder::channel::{CaptureError, CaptureResult};
use image::RgbaImage;
use std::sync::Arc;
use xcap::{Monitor, Window};

fn rect_of(monitor: &Monitor) -> CaptureResult<MonitorRect> {
    let geometry = (|| {
        Ok::<_, xcap::XCapError>(MonitorRect::new(
            monitor.x()?,
            monitor.y()?,
            monitor.width()?,
            monitor.height()?,
        ))
    })();
    geometry.map_err(|e| CaptureError::Monitor(e.to_string()))
}

/// Monitors with the primary one first
fn ordered_monitors() -> CaptureResult<Vec<Monitor>> {
    let mut monitors = Monitor::all().map_err(|e| CaptureError::Monitor(e.to_string()))?;
    monitors.sort_by_key(|m| !m.is_primary().unwrap_or(false));
    Ok(monitors)
}

/// Screen source backed by `xcap`, with the pointer from the `rdev` listener
pub struct XcapScreen {
    hub: Arc<PointerHub>,
}

impl XcapScreen {
    pub fn new(hub: Arc<PointerHub>) -> Self {
        Self { hub }
    }
}

impl ScreenSource for XcapScreen {
    fn monitors(&self) -> CaptureResult<Vec<MonitorRect>> {
        let rects = ordered_monitors()?
            .iter()
            .map(rect_of)
            .collect::<CaptureResult<Vec<_>>>()?;

        let virtual_desktop = MonitorRect::bounding(&rects)
            .ok_or_else(|| CaptureError::Monitor("No monitors found".to_string()))?;
        let mut all = Vec::with_capacity(rects.len() + 1);
        all.push(virtual_desktop);
        all.extend(rects);
        Ok(all)
    }

    fn pointer_position(&self) -> CaptureResult<(i32, i32)> {
        self.hub.ensure_listening()?;
        self.hub
            .position()
            .ok_or_else(|| CaptureError::Pointer("No pointer movement observed yet".to_string()))
    }

    fn grab(&self, rect: &MonitorRect) -> CaptureResult<RgbaImage> {
        let monitors = ordered_monitors()?;
        let monitor = monitors
            .iter()
            .find(|m| rect_of(m).map(|r| r == *rect).unwrap_or(false))
            .ok_or_else(|| CaptureError::Monitor(format!("No monitor at {:?}", rect)))?;

        let image = monitor
            .capture_image()
            .map_err(|e| CaptureError::Grab(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(CaptureError::Grab(
                "Captured empty screenshot (missing screen recording permission?)".to_string(),
            ));
        }
        Ok(image)
    }
}

/// Focused-window lookup through `xcap`
pub struct XcapWindows;

impl WindowInspector for XcapWindows {
    fn foreground(&self) -> Option<WindowHint> {
        let windows = Window::all().ok()?;
        let focused = windows.iter().find(|w| w.is_focused().unwrap_or(false))?;

        Some(WindowHint {
            title: focused.title().ok().filter(|t| !t.is_empty()),
            app_name: focused.app_name().ok().filter(|a| !a.is_empty()),
            pid: focused.pid().ok(),
        })
    }
}

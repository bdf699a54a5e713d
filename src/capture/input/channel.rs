use crate::capture::monitor::{locate_monitor, MonitorRect};
use crate::capture::process::ProcessResolver;
use crate::capture::traits::{MouseHook, ScreenSource, WindowInspector};
use crate::capture::input::types::{ClickEvent, MouseButton};
use crate::recorder::channel::{CaptureChannel, CaptureResult, ChannelType};
use crate::recorder::engine::CorrelationEngine;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything the hook callback needs to turn a press into a [`ClickEvent`]
struct ClickContext {
    screen: Arc<dyn ScreenSource>,
    windows: Arc<dyn WindowInspector>,
    resolver: Arc<dyn ProcessResolver>,
    engine: CorrelationEngine,
    is_running: Arc<AtomicBool>,
}

impl ClickContext {
    fn on_press(&self, x: i32, y: i32, button: MouseButton) {
        if button != MouseButton::Left || !self.is_running.load(Ordering::SeqCst) {
            return;
        }

        let monitors = match self.screen.monitors() {
            Ok(monitors) => monitors,
            Err(e) => {
                tracing::debug!("Monitor lookup failed for click: {}", e);
                Vec::new()
            }
        };
        let click = self.describe(x, y, &monitors);
        tracing::debug!(
            "Mouse click detected: x={}, y={}, monitor={}",
            x,
            y,
            click.monitor_index
        );
        self.engine.on_os_click(click);
    }

    fn describe(&self, x: i32, y: i32, monitors: &[MonitorRect]) -> ClickEvent {
        let monitor_index = locate_monitor(monitors, x, y);
        let (local_x, local_y) = monitors
            .get(monitor_index)
            .map(|rect| rect.to_local(x, y))
            .unwrap_or((x, y));

        let hint = self.windows.foreground().unwrap_or_default();
        let process = self.resolver.resolve(&hint);

        ClickEvent {
            x,
            y,
            local_x,
            local_y,
            timestamp: Utc::now(),
            app_name: process.as_ref().map(|p| p.name.clone()),
            pid: process.and_then(|p| p.pid),
            window_title: hint.title,
            monitor_index,
        }
    }
}

/// OS-level click source feeding primary-button presses to the engine
pub struct OsClickSource {
    id: String,
    hook: Arc<dyn MouseHook>,
    context: Arc<ClickContext>,
    is_running: Arc<AtomicBool>,
}

impl OsClickSource {
    pub fn new(
        hook: Arc<dyn MouseHook>,
        screen: Arc<dyn ScreenSource>,
        windows: Arc<dyn WindowInspector>,
        resolver: Arc<dyn ProcessResolver>,
        engine: CorrelationEngine,
    ) -> Self {
        let is_running = Arc::new(AtomicBool::new(false));
        Self {
            id: "input".to_string(),
            hook,
            context: Arc::new(ClickContext {
                screen,
                windows,
                resolver,
                engine,
                is_running: is_running.clone(),
            }),
            is_running,
        }
    }
}

#[async_trait]
impl CaptureChannel for OsClickSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Input
    }

    async fn start(&mut self) -> CaptureResult<()> {
        if self.is_running.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.is_running.store(true, Ordering::SeqCst);
        let context = self.context.clone();
        if let Err(e) = self
            .hook
            .install(Arc::new(move |x: i32, y: i32, button: MouseButton| {
                context.on_press(x, y, button)
            }))
        {
            self.is_running.store(false, Ordering::SeqCst);
            tracing::error!("Failed to start mouse listener: {}", e);
            return Err(e);
        }

        tracing::info!("Click listener started");
        Ok(())
    }

    async fn stop(&mut self) -> CaptureResult<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.hook.uninstall();
        tracing::info!("Click listener stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

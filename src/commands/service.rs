//! Activity service
//!
//! Owns the capture scheduler, the OS click source, the correlation engine
//! and the record sink, and exposes the boundary operations used by the
//! HTTP server and the CLI.

use crate::capture::config::{CaptureConfig, ConfigHandle};
use crate::capture::input::types::ExtEvent;
use crate::capture::input::OsClickSource;
use crate::capture::monitor::{locate_monitor_scaled, PRIMARY_MONITOR};
use crate::capture::screen::{CaptureEvent, CaptureScheduler, ScreenCapturer};
use crate::capture::Backends;
use crate::recorder::channel::{CaptureChannel, CaptureError, CaptureResult};
use crate::recorder::engine::{CorrelationEngine, CorrelationSettings};
use crate::recorder::record::{ActivityRecord, Source};
use crate::recorder::sink::{ClickLogger, RecordSink};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub capture_running: bool,
    pub listener_running: bool,
    pub hz: f64,
    pub output_base: PathBuf,
    pub pending: usize,
}

/// Result of submitting a browser-extension event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub merged: bool,
    pub screenshot_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestLogOutcome {
    pub ndjson_path: PathBuf,
    pub csv_path: PathBuf,
}

pub struct ActivityService {
    config: ConfigHandle,
    logger: Arc<ClickLogger>,
    engine: CorrelationEngine,
    capturer: Arc<ScreenCapturer>,
    scheduler: Mutex<CaptureScheduler>,
    listener: Mutex<OsClickSource>,
}

impl ActivityService {
    /// Wire the service together. Must be called inside a tokio runtime.
    pub fn new(
        config: CaptureConfig,
        settings: CorrelationSettings,
        backends: Backends,
    ) -> CaptureResult<Arc<Self>> {
        let config = ConfigHandle::new(config);
        let logger = Arc::new(ClickLogger::new(config.clone()));
        let engine = CorrelationEngine::new(settings, config.clone(), logger.clone())?;

        let screen = backends.screen.clone();
        engine.set_display_resolver(Some(Arc::new(move |x: i32, y: i32, dpr: Option<f64>| {
            let monitors = screen.monitors().ok()?;
            let found = locate_monitor_scaled(&monitors, x, y, dpr);
            found.contained.then_some(found.index)
        })));

        let scheduler = CaptureScheduler::new(backends.screen.clone(), config.clone());
        let capture_engine = engine.clone();
        scheduler.set_on_capture(Some(Arc::new(move |event: &CaptureEvent| {
            capture_engine.on_capture_event(event);
        })));

        let listener = OsClickSource::new(
            backends.hook,
            backends.screen,
            backends.windows,
            backends.resolver,
            engine.clone(),
        );

        Ok(Arc::new(Self {
            config,
            logger,
            engine,
            capturer: scheduler.capturer(),
            scheduler: Mutex::new(scheduler),
            listener: Mutex::new(listener),
        }))
    }

    pub fn engine(&self) -> &CorrelationEngine {
        &self.engine
    }

    pub async fn status(&self) -> ServiceStatus {
        let config = self.config.snapshot();
        ServiceStatus {
            capture_running: self.scheduler.lock().await.is_running(),
            listener_running: self.listener.lock().await.is_running(),
            hz: config.hz,
            output_base: config.output_base,
            pending: self.engine.pending_count(),
        }
    }

    /// Start screen capture and the click listener.
    ///
    /// A listener that cannot start (no input access, headless build) is
    /// logged; capture keeps running and extension events are still recorded.
    pub async fn start(&self) -> ServiceStatus {
        if let Err(e) = self.scheduler.lock().await.start().await {
            tracing::error!("Failed to start screen capture: {}", e);
        }
        if let Err(e) = self.listener.lock().await.start().await {
            tracing::warn!("Click listener unavailable: {}", e);
        }
        self.status().await
    }

    pub async fn stop(&self) -> ServiceStatus {
        if let Err(e) = self.scheduler.lock().await.stop().await {
            tracing::error!("Failed to stop screen capture: {}", e);
        }
        if let Err(e) = self.listener.lock().await.stop().await {
            tracing::error!("Failed to stop click listener: {}", e);
        }
        self.status().await
    }

    pub fn set_config(&self, hz: Option<f64>, output_base: Option<PathBuf>) -> CaptureConfig {
        self.config.update(hz, output_base)
    }

    /// Sole ingress for browser-extension activity.
    ///
    /// The matching OS click is claimed on arrival, then an on-demand
    /// screenshot is taken so the freshest image can go into the merged (or
    /// standalone) record. The rest runs on its own task so a dropped
    /// request cannot strand a claimed click.
    pub async fn submit_ext_event(&self, ev: ExtEvent) -> SubmitOutcome {
        tracing::info!(
            "Received extension event (url={:?}, text_len={})",
            ev.url,
            ev.text.as_deref().map(str::len).unwrap_or(0)
        );

        let claim = self.engine.claim_ext_match(&ev);
        let capturer = self.capturer.clone();
        let engine = self.engine.clone();

        let task = tokio::spawn(async move {
            let screenshot_path = match capturer.snapshot().await {
                Ok(event) => Some(event.path.to_string_lossy().into_owned()),
                Err(e) => {
                    tracing::debug!("On-demand capture unavailable: {}", e);
                    None
                }
            };

            let path = screenshot_path.clone();
            let merged = tokio::task::spawn_blocking(move || {
                engine.complete_ext_event(claim, ev, path)
            })
            .await
            .unwrap_or_else(|e| {
                tracing::error!("Extension event handling failed: {}", e);
                false
            });

            SubmitOutcome {
                merged,
                screenshot_path,
            }
        });

        task.await.unwrap_or_else(|e| {
            tracing::error!("Extension event task failed: {}", e);
            SubmitOutcome {
                merged: false,
                screenshot_path: None,
            }
        })
    }

    pub async fn capture_once(&self) -> CaptureResult<CaptureEvent> {
        self.capturer.capture_once().await
    }

    /// Write a `test` record straight through the sink
    pub async fn test_log(&self) -> CaptureResult<TestLogOutcome> {
        let mut record = ActivityRecord::new(Source::Test);
        record.x = Some(100);
        record.y = Some(200);
        record.app_name = Some("test".to_string());
        record.window_title = Some("Test Window".to_string());
        record.display_id = Some(PRIMARY_MONITOR);
        record.text = Some("Test click from API".to_string());
        record.set_url(Some("http://test.example.com".to_string()));

        let outcome = TestLogOutcome {
            ndjson_path: self.logger.ndjson_path(&record.timestamp),
            csv_path: self.logger.csv_path(&record.timestamp),
        };

        let logger = self.logger.clone();
        tokio::task::spawn_blocking(move || logger.log_click(&record))
            .await
            .map_err(|e| CaptureError::Shutdown(format!("Test log task failed: {}", e)))?;
        Ok(outcome)
    }

    /// Stop both sources and flush every pending click before exit
    pub async fn shutdown(&self) {
        self.stop().await;
        self.engine.flush_all();
        self.engine.settle().await;
        tracing::info!("Activity service shut down");
    }
}

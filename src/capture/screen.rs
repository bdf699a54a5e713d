//! Periodic screen capture
//!
//! `CaptureScheduler` runs a cancellable loop that grabs the monitor under
//! the pointer, marks the pointer with a ring and saves a PNG under the
//! day directory. Each saved screenshot is reported through an optional
//! callback as a [`CaptureEvent`].

use crate::capture::config::ConfigHandle;
use crate::capture::marker::{draw_ring, MarkerStyle};
use crate::capture::monitor::{locate_monitor, MonitorRect};
use crate::capture::traits::ScreenSource;
use crate::recorder::channel::{CaptureChannel, CaptureError, CaptureResult, ChannelType};
use crate::recorder::record::{day_dir, file_timestamp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{ImageFormat, RgbaImage};
use parking_lot::Mutex as ParkingMutex;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const GRAB_RETRY_DELAY: Duration = Duration::from_millis(20);
const SAVE_RETRY_DELAY: Duration = Duration::from_millis(50);
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// A saved screenshot
#[derive(Debug, Clone, Serialize)]
pub struct CaptureEvent {
    pub path: PathBuf,
    /// Pointer position in global desktop coordinates
    pub x: i32,
    pub y: i32,
    pub monitor_index: usize,
    pub timestamp: DateTime<Utc>,
}

pub type CaptureCallback = Arc<dyn Fn(&CaptureEvent) + Send + Sync>;

/// One capture iteration, shared by the loop and on-demand captures
pub struct ScreenCapturer {
    source: Arc<dyn ScreenSource>,
    config: ConfigHandle,
    marker: MarkerStyle,
    on_capture: ParkingMutex<Option<CaptureCallback>>,
}

impl ScreenCapturer {
    pub fn new(source: Arc<dyn ScreenSource>, config: ConfigHandle) -> Self {
        Self {
            source,
            config,
            marker: MarkerStyle::default(),
            on_capture: ParkingMutex::new(None),
        }
    }

    pub fn set_on_capture(&self, callback: Option<CaptureCallback>) {
        *self.on_capture.lock() = callback;
    }

    /// Grab, mark and save one screenshot without notifying the callback
    pub async fn snapshot(&self) -> CaptureResult<CaptureEvent> {
        let source = self.source.clone();
        let output_base = self.config.snapshot().output_base;
        let marker = self.marker;

        tokio::task::spawn_blocking(move || capture_blocking(source.as_ref(), &output_base, &marker))
            .await
            .map_err(|e| CaptureError::Grab(format!("Capture task failed: {}", e)))?
    }

    /// Fails with `Platform` when this build or host has no screen access
    pub async fn check_access(&self) -> CaptureResult<()> {
        let source = self.source.clone();
        tokio::task::spawn_blocking(move || source.monitors().map(|_| ()))
            .await
            .map_err(|e| CaptureError::Monitor(format!("Screen access check failed: {}", e)))?
    }

    /// Capture one screenshot and report it to the callback
    pub async fn capture_once(&self) -> CaptureResult<CaptureEvent> {
        let event = self.snapshot().await?;
        self.notify(&event);
        Ok(event)
    }

    fn notify(&self, event: &CaptureEvent) {
        let callback = self.on_capture.lock().clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!("Capture callback panicked for {:?}", event.path);
            }
        }
    }
}

fn capture_blocking(
    source: &dyn ScreenSource,
    output_base: &Path,
    marker: &MarkerStyle,
) -> CaptureResult<CaptureEvent> {
    let (x, y) = source.pointer_position()?;
    let monitors = source.monitors()?;
    let monitor_index = locate_monitor(&monitors, x, y);
    let rect = monitors
        .get(monitor_index)
        .or_else(|| monitors.first())
        .copied()
        .ok_or_else(|| CaptureError::Monitor("No monitors available".to_string()))?;

    let mut image = grab_with_retry(source, &rect)?;
    let (local_x, local_y) = rect.to_local(x, y);
    draw_ring(&mut image, local_x, local_y, marker);

    let timestamp = Utc::now();
    let dir = day_dir(output_base, &timestamp);
    let path = dir.join(format!("{}.png", file_timestamp(&timestamp)));
    save_with_retry(&image, &dir, &path)?;

    tracing::debug!("Saved screenshot {:?} (monitor {})", path, monitor_index);
    Ok(CaptureEvent {
        path,
        x,
        y,
        monitor_index,
        timestamp,
    })
}

fn grab_with_retry(source: &dyn ScreenSource, rect: &MonitorRect) -> CaptureResult<RgbaImage> {
    match source.grab(rect) {
        Ok(image) => Ok(image),
        Err(e) => {
            tracing::warn!("Screen grab failed, retrying once: {}", e);
            std::thread::sleep(GRAB_RETRY_DELAY);
            source.grab(rect)
        }
    }
}

fn save_with_retry(image: &RgbaImage, dir: &Path, path: &Path) -> CaptureResult<()> {
    let save = || -> CaptureResult<()> {
        std::fs::create_dir_all(dir)?;
        image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    };

    match save() {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!("Saving screenshot failed, retrying once: {}", e);
            std::thread::sleep(SAVE_RETRY_DELAY);
            save()
        }
    }
}

/// Cancellable periodic capture loop
pub struct CaptureScheduler {
    id: String,
    capturer: Arc<ScreenCapturer>,
    config: ConfigHandle,
    is_running: Arc<AtomicBool>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl CaptureScheduler {
    pub fn new(source: Arc<dyn ScreenSource>, config: ConfigHandle) -> Self {
        Self {
            id: "screen".to_string(),
            capturer: Arc::new(ScreenCapturer::new(source, config.clone())),
            config,
            is_running: Arc::new(AtomicBool::new(false)),
            cancel: None,
            task: None,
        }
    }

    /// Handle for on-demand captures that does not borrow the scheduler
    pub fn capturer(&self) -> Arc<ScreenCapturer> {
        self.capturer.clone()
    }

    pub fn set_on_capture(&self, callback: Option<CaptureCallback>) {
        self.capturer.set_on_capture(callback);
    }

    pub async fn capture_once(&self) -> CaptureResult<CaptureEvent> {
        self.capturer.capture_once().await
    }
}

async fn run_loop(capturer: Arc<ScreenCapturer>, config: ConfigHandle, cancel: CancellationToken) {
    loop {
        let next = tokio::time::Instant::now() + config.snapshot().interval();

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = capturer.capture_once() => {
                if let Err(e) = result {
                    tracing::warn!("Capture iteration skipped: {}", e);
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(next) => {}
        }
    }
}

#[async_trait]
impl CaptureChannel for CaptureScheduler {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Screen
    }

    async fn start(&mut self) -> CaptureResult<()> {
        if self.is_running.load(Ordering::SeqCst) {
            tracing::debug!("Screen capture already running");
            return Ok(());
        }

        match self.capturer.check_access().await {
            Err(e @ CaptureError::Platform(_)) => return Err(e),
            Err(e) => tracing::warn!("Monitor enumeration failed; starting anyway: {}", e),
            Ok(()) => {}
        }

        let cancel = CancellationToken::new();
        let capturer = self.capturer.clone();
        let config = self.config.clone();
        let is_running = self.is_running.clone();
        let token = cancel.clone();

        is_running.store(true, Ordering::SeqCst);
        self.task = Some(tokio::spawn(async move {
            run_loop(capturer, config, token).await;
            is_running.store(false, Ordering::SeqCst);
        }));
        self.cancel = Some(cancel);

        tracing::info!("Screen capture started (hz={})", self.config.snapshot().hz);
        Ok(())
    }

    async fn stop(&mut self) -> CaptureResult<()> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(STOP_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Screen capture task ended abnormally: {}", e),
                Err(_) => {
                    tracing::warn!("Screen capture did not stop within {:?}; aborting", STOP_TIMEOUT);
                    task.abort();
                }
            }
            tracing::info!("Screen capture stopped");
        }

        self.is_running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

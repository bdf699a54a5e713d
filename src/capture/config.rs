//! Process-wide capture configuration
//!
//! Readers take a snapshot per use; writers replace the value through a
//! `watch` channel so every update is a new version and the capture loop is
//! never held up by a reconfiguration in progress.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Floor applied to the capture frequency before deriving the interval
pub const MIN_HZ: f64 = 0.1;

/// Shortest allowed interval between two captures
pub const MIN_INTERVAL: Duration = Duration::from_millis(50);

/// Lower bound of the screenshot attach window
pub const MIN_ATTACH_WINDOW: Duration = Duration::from_millis(750);

/// Slack added to one capture period for the screenshot attach window
pub const ATTACH_SLACK: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub hz: f64,
    pub output_base: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            hz: 1.0,
            output_base: PathBuf::from("data"),
        }
    }
}

impl CaptureConfig {
    pub fn new(hz: f64, output_base: impl Into<PathBuf>) -> Self {
        let mut config = Self {
            output_base: output_base.into(),
            ..Self::default()
        };
        if is_valid_hz(hz) {
            config.hz = hz;
        }
        config
    }

    /// Time between capture iterations: `max(50ms, 1/hz)`
    pub fn interval(&self) -> Duration {
        let period = Duration::from_secs_f64(1.0 / self.hz.max(MIN_HZ));
        period.max(MIN_INTERVAL)
    }

    /// How long a pending click may wait for a screenshot: always longer
    /// than one capture period.
    pub fn screenshot_attach_timeout(&self) -> Duration {
        let period = Duration::from_secs_f64(1.0 / self.hz.max(MIN_HZ));
        (period + ATTACH_SLACK).max(MIN_ATTACH_WINDOW)
    }
}

fn is_valid_hz(hz: f64) -> bool {
    hz.is_finite() && hz > 0.0
}

/// Shared, versioned handle to the current [`CaptureConfig`]
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<CaptureConfig>>,
}

impl ConfigHandle {
    pub fn new(config: CaptureConfig) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current configuration
    pub fn snapshot(&self) -> CaptureConfig {
        self.tx.borrow().clone()
    }

    /// Partial update; an `hz` that is not a positive finite number is ignored.
    pub fn update(&self, hz: Option<f64>, output_base: Option<PathBuf>) -> CaptureConfig {
        self.tx.send_modify(|config| {
            if let Some(hz) = hz {
                if is_valid_hz(hz) {
                    config.hz = hz;
                } else {
                    tracing::warn!("Ignoring invalid capture frequency {}", hz);
                }
            }
            if let Some(base) = output_base {
                config.output_base = base;
            }
        });

        let current = self.snapshot();
        tracing::info!(
            "Capture config updated (hz={}, output_base={:?})",
            current.hz,
            current.output_base
        );
        current
    }
}

//! CLI argument parsing using clap.

use crate::capture::config::CaptureConfig;
use crate::recorder::engine::CorrelationSettings;
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Desktop activity capture: OS clicks, browser-extension clicks and
/// screenshots merged into one activity log
#[derive(Parser, Debug, Clone)]
#[command(name = "desktop-capture")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Screenshot capture rate in Hz
    #[arg(long, default_value_t = 1.0, env = "DESKTOP_CAPTURE_HZ")]
    pub hz: f64,

    /// Output directory for records and screenshots
    #[arg(short, long, default_value = "data", env = "DESKTOP_CAPTURE_OUTPUT")]
    pub output: PathBuf,

    /// Host to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8000, env = "DESKTOP_CAPTURE_PORT")]
    pub port: u16,

    /// Start capture and the click listener immediately
    #[arg(long)]
    pub autostart: bool,

    /// How long an OS click waits for an extension event or screenshot
    #[arg(long, default_value_t = 250)]
    pub merge_timeout_ms: u64,

    /// Max distance in pixels between an OS click and an extension event
    #[arg(long, default_value_t = 80.0)]
    pub merge_distance: f64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run as a browser native-messaging host on stdin/stdout
    NativeHost,
}

impl Args {
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig::new(self.hz, self.output.clone())
    }

    pub fn correlation_settings(&self) -> CorrelationSettings {
        CorrelationSettings {
            merge_timeout: Duration::from_millis(self.merge_timeout_ms),
            merge_distance: self.merge_distance,
            ..CorrelationSettings::default()
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_values() {
        let args = Args::parse_from(["desktop-capture"]);
        assert_eq!(args.hz, 1.0);
        assert_eq!(args.output, PathBuf::from("data"));
        assert_eq!(args.bind_addr(), "127.0.0.1:8000".parse().unwrap());
        assert!(!args.autostart);
        assert!(args.command.is_none());
        assert_eq!(args.correlation_settings(), CorrelationSettings::default());
    }

    #[test]
    fn test_args_capture_flags() {
        let args = Args::parse_from([
            "desktop-capture",
            "--hz",
            "2.5",
            "--output",
            "/tmp/out",
            "--port",
            "9001",
            "--autostart",
        ]);
        let config = args.capture_config();
        assert_eq!(config.hz, 2.5);
        assert_eq!(config.output_base, PathBuf::from("/tmp/out"));
        assert_eq!(args.port, 9001);
        assert!(args.autostart);
    }

    #[test]
    fn test_args_invalid_hz_falls_back_to_default() {
        let args = Args::parse_from(["desktop-capture", "--hz", "0"]);
        assert_eq!(args.capture_config().hz, 1.0);
    }

    #[test]
    fn test_args_correlation_overrides() {
        let args = Args::parse_from([
            "desktop-capture",
            "--merge-timeout-ms",
            "400",
            "--merge-distance",
            "50",
        ]);
        let settings = args.correlation_settings();
        assert_eq!(settings.merge_timeout, Duration::from_millis(400));
        assert_eq!(settings.merge_distance, 50.0);
        assert_eq!(settings.screenshot_attach_distance, 120.0);
    }

    #[test]
    fn test_args_native_host_subcommand() {
        let args = Args::parse_from(["desktop-capture", "native-host"]);
        assert_eq!(args.command, Some(Command::NativeHost));
    }
}

//! Desktop Capture - OS clicks, browser-extension clicks and screenshots
//! correlated into one activity log.
//!
//! The binary wires these modules into an HTTP service or a browser
//! native-messaging host; see `commands`.

pub mod capture;
pub mod commands;
pub mod recorder;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging. Always writes to stderr so the native-messaging
/// host keeps stdout for framed replies.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "desktop_capture_lib=info,desktop_capture=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

//! Click input
//!
//! The OS click source (a `CaptureChannel` over a global mouse hook) and the
//! click event types shared with the browser-extension ingress.

pub mod channel;
pub mod types;

pub use channel::OsClickSource;
pub use types::{ClickEvent, ExtEvent, MouseButton};

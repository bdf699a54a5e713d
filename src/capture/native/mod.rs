//! Native desktop backends (`native` feature)
//!
//! `xcap` provides monitor enumeration, grabs and the focused window;
//! `rdev` provides the global mouse hook and pointer tracking.

pub mod input;
pub mod screen;

pub use input::{PointerHub, RdevHook};
pub use screen::{XcapScreen, XcapWindows};

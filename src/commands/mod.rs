//! Outer surfaces of the capture service
//!
//! The HTTP server and the native-messaging host both drive the same
//! [`service::ActivityService`] / record sink stack.

pub mod args;
pub mod native_host;
pub mod server;
pub mod service;

//! Activity recording
//!
//! The correlation engine, the records it produces and the sink that
//! persists them.

pub mod channel;
pub mod engine;
pub mod record;
pub mod sink;

pub use channel::{CaptureChannel, CaptureError, CaptureResult, ChannelType};
pub use engine::{CorrelationEngine, CorrelationSettings};
pub use record::{ActivityRecord, Source};
pub use sink::{ClickLogger, RecordSink};

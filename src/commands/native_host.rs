//! Browser native-messaging host
//!
//! Frames are a `u32` length in native byte order followed by that many
//! bytes of UTF-8 JSON, on stdin and stdout. Each inbound message is written
//! as an `ext` record and acknowledged with `{"status":"ok"}`. EOF on stdin
//! ends the session. Logging must go to stderr; stdout carries frames only.

use crate::capture::input::types::ExtEvent;
use crate::recorder::channel::{CaptureError, CaptureResult};
use crate::recorder::record::ActivityRecord;
use crate::recorder::sink::RecordSink;
use serde_json::{json, Value};
use std::io::{ErrorKind, Read, Write};

/// Largest frame accepted from the browser
pub const MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

/// Read one frame; `None` on a clean EOF before the length prefix.
pub fn read_message<R: Read>(reader: &mut R) -> CaptureResult<Option<Value>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_ne_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(CaptureError::Io(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("Native message of {} bytes exceeds limit", len),
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(serde_json::from_slice(&payload)?))
}

pub fn write_message<W: Write>(writer: &mut W, message: &Value) -> CaptureResult<()> {
    let encoded = serde_json::to_vec(message)?;
    let len = u32::try_from(encoded.len()).map_err(|_| {
        CaptureError::Io(std::io::Error::new(
            ErrorKind::InvalidData,
            "Native message too large",
        ))
    })?;
    writer.write_all(&len.to_ne_bytes())?;
    writer.write_all(&encoded)?;
    writer.flush()?;
    Ok(())
}

/// Turn a native message into an `ext` record; unreadable fields are dropped
pub fn record_from_message(message: &Value) -> ActivityRecord {
    let event = serde_json::from_value::<ExtEvent>(message.clone()).unwrap_or_else(|e| {
        tracing::warn!("Native message is not an object ({}); writing an empty record", e);
        ExtEvent::default()
    });
    ActivityRecord::from_ext_event(&event, None)
}

/// Serve frames until EOF. Returns the number of messages handled.
pub fn run<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    sink: &dyn RecordSink,
) -> CaptureResult<usize> {
    let mut handled = 0;
    loop {
        let message = match read_message(reader) {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(CaptureError::Json(e)) => {
                tracing::warn!("Discarding malformed native message: {}", e);
                write_message(writer, &json!({ "status": "error", "error": e.to_string() }))?;
                continue;
            }
            Err(e) => return Err(e),
        };

        let record = record_from_message(&message);
        sink.log_click(&record);
        write_message(writer, &json!({ "status": "ok" }))?;
        handled += 1;
    }

    tracing::info!("Native host finished after {} message(s)", handled);
    Ok(handled)
}

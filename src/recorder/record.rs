//! Unified activity records
//!
//! One `ActivityRecord` is written per logical user action, whichever
//! source (OS hook, browser extension, or a test call) produced it.

use crate::capture::input::types::ExtEvent;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};

/// Browser assumed for extension records that do not name one
pub const DEFAULT_BROWSER: &str = "chrome";

/// Which source produced (or enriched) a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Os,
    Ext,
    Test,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Os => "os",
            Source::Ext => "ext",
            Source::Test => "test",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted activity record.
///
/// Field order is the column order of the CSV representation; missing
/// optional fields serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(rename = "timestamp_utc", serialize_with = "serialize_millis")]
    pub timestamp: DateTime<Utc>,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub app_name: Option<String>,
    pub process_id: Option<u32>,
    pub window_title: Option<String>,
    pub display_id: Option<usize>,
    pub source: Source,
    pub url_or_path: Option<String>,
    pub doc_path: Option<String>,
    pub text: Option<String>,
    pub screenshot_path: Option<String>,
}

/// CSV header, one column per record field
pub const CSV_HEADER: [&str; 12] = [
    "timestamp_utc",
    "x",
    "y",
    "app_name",
    "process_id",
    "window_title",
    "display_id",
    "source",
    "url_or_path",
    "doc_path",
    "text",
    "screenshot_path",
];

impl ActivityRecord {
    /// An empty record stamped now
    pub fn new(source: Source) -> Self {
        Self {
            timestamp: Utc::now(),
            x: None,
            y: None,
            app_name: None,
            process_id: None,
            window_title: None,
            display_id: None,
            source,
            url_or_path: None,
            doc_path: None,
            text: None,
            screenshot_path: None,
        }
    }

    /// A standalone `ext` record built from the extension payload alone
    pub fn from_ext_event(ev: &ExtEvent, screenshot_path: Option<String>) -> Self {
        let mut record = Self::new(Source::Ext);
        record.timestamp = ev.timestamp.unwrap_or_else(Utc::now);
        if let Some((x, y)) = ev.point() {
            record.x = Some(x);
            record.y = Some(y);
        }
        record.app_name = Some(
            ev.app_name
                .clone()
                .unwrap_or_else(|| DEFAULT_BROWSER.to_string()),
        );
        record.window_title = ev.title.clone();
        record.display_id = ev.display_id;
        record.text = ev.text.clone();
        record.set_url(ev.url.clone());
        record.screenshot_path = screenshot_path;
        record
    }

    /// Set `url_or_path`, deriving `doc_path` for `file://` URLs
    pub fn set_url(&mut self, url: Option<String>) {
        if let Some(path) = url.as_deref().and_then(doc_path_from_url) {
            self.doc_path = Some(path);
        }
        self.url_or_path = url;
    }

    /// Whether the record carries something worth persisting
    pub fn is_meaningful(&self) -> bool {
        (self.x.is_some() || self.y.is_some())
            || self.text.as_deref().is_some_and(|t| !t.is_empty())
            || self.url_or_path.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Row for the tabular representation
    pub fn csv_row(&self) -> Vec<String> {
        fn opt<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(ToString::to_string).unwrap_or_default()
        }

        vec![
            format_timestamp(&self.timestamp),
            opt(&self.x),
            opt(&self.y),
            opt(&self.app_name),
            opt(&self.process_id),
            opt(&self.window_title),
            opt(&self.display_id),
            self.source.to_string(),
            opt(&self.url_or_path),
            opt(&self.doc_path),
            self.text
                .as_deref()
                .map(|t| t.replace(['\r', '\n'], " ").trim().to_string())
                .unwrap_or_default(),
            opt(&self.screenshot_path),
        ]
    }
}

fn serialize_millis<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

/// RFC 3339 with millisecond precision, e.g. `2024-05-01T09:30:12.345Z`
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Filesystem-safe timestamp: colons replaced by hyphens,
/// e.g. `2024-05-01T09-30-12.345Z`
pub fn file_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H-%M-%S%.3fZ").to_string()
}

/// Per-day directory under the output root, e.g. `<base>/2024-05-01`
pub fn day_dir(base: &Path, ts: &DateTime<Utc>) -> PathBuf {
    base.join(ts.format("%Y-%m-%d").to_string())
}

/// Local document path for a `file://` URL, percent-decoded
pub fn doc_path_from_url(url: &str) -> Option<String> {
    let rest = url.strip_prefix("file://")?;
    // file:///C:/x.pdf -> C:/x.pdf, file:///home/u/x.pdf -> /home/u/x.pdf
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    let trimmed = match rest.as_bytes() {
        [b'/', drive, b':', ..] if drive.is_ascii_alphabetic() => &rest[1..],
        _ => rest,
    };
    let decoded = urlencoding::decode(trimmed).ok()?;
    if decoded.is_empty() {
        None
    } else {
        Some(decoded.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 12).unwrap() + chrono::Duration::milliseconds(345)
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(format_timestamp(&ts()), "2024-05-01T09:30:12.345Z");
        assert_eq!(file_timestamp(&ts()), "2024-05-01T09-30-12.345Z");
        assert_eq!(day_dir(Path::new("out"), &ts()), PathBuf::from("out/2024-05-01"));
    }

    #[test]
    fn test_json_keeps_nulls_and_field_names() {
        let mut record = ActivityRecord::new(Source::Os);
        record.timestamp = ts();
        record.x = Some(10);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["timestamp_utc"], "2024-05-01T09:30:12.345Z");
        assert_eq!(json["source"], "os");
        assert!(json["text"].is_null());
        assert!(json["screenshot_path"].is_null());
        assert_eq!(json.as_object().unwrap().len(), CSV_HEADER.len());
    }

    #[test]
    fn test_csv_row_flattens_text() {
        let mut record = ActivityRecord::new(Source::Ext);
        record.timestamp = ts();
        record.text = Some("  line one\nline two\r\n".to_string());
        let row = record.csv_row();
        assert_eq!(row.len(), CSV_HEADER.len());
        assert_eq!(row[7], "ext");
        assert_eq!(row[10], "line one line two");
        assert_eq!(row[1], "");
    }

    #[test]
    fn test_doc_path_from_file_url() {
        assert_eq!(
            doc_path_from_url("file:///C:/Users/Admin/Downloads/example.pdf").as_deref(),
            Some("C:/Users/Admin/Downloads/example.pdf")
        );
        assert_eq!(
            doc_path_from_url("file:///home/me/My%20Doc.pdf").as_deref(),
            Some("/home/me/My Doc.pdf")
        );
        assert_eq!(doc_path_from_url("https://example.com/a.pdf"), None);

        let mut record = ActivityRecord::new(Source::Ext);
        record.set_url(Some("file:///tmp/a.pdf".to_string()));
        assert_eq!(record.doc_path.as_deref(), Some("/tmp/a.pdf"));
        assert_eq!(record.url_or_path.as_deref(), Some("file:///tmp/a.pdf"));
    }

    #[test]
    fn test_from_ext_event_defaults_browser() {
        let ev: ExtEvent = serde_json::from_str(
            r#"{"text":"Save","url":"file:///tmp/a%20b.pdf","title":"a b.pdf","timestamp":1714555812345}"#,
        )
        .unwrap();
        let record = ActivityRecord::from_ext_event(&ev, None);
        assert_eq!(record.source, Source::Ext);
        assert_eq!(record.app_name.as_deref(), Some(DEFAULT_BROWSER));
        assert_eq!(record.doc_path.as_deref(), Some("/tmp/a b.pdf"));
        assert_eq!(record.window_title.as_deref(), Some("a b.pdf"));
        assert_eq!(format_timestamp(&record.timestamp), "2024-05-01T09:30:12.345Z");
        assert_eq!(record.x, None);
    }

    #[test]
    fn test_meaningful_requires_position_or_content() {
        let mut record = ActivityRecord::new(Source::Ext);
        assert!(!record.is_meaningful());
        record.url_or_path = Some("https://a.test".into());
        assert!(record.is_meaningful());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

/// A primary-button press observed by the OS hook
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    /// Global desktop coordinates, used for correlation
    pub x: i32,
    pub y: i32,
    /// Coordinates inside the owning monitor's image
    pub local_x: i32,
    pub local_y: i32,
    pub timestamp: DateTime<Utc>,
    pub app_name: Option<String>,
    pub pid: Option<u32>,
    pub window_title: Option<String>,
    pub monitor_index: usize,
}

impl ClickEvent {
    /// A click with no monitor or window metadata; local equals global
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            local_x: x,
            local_y: y,
            timestamp: Utc::now(),
            app_name: None,
            pid: None,
            window_title: None,
            monitor_index: crate::capture::monitor::PRIMARY_MONITOR,
        }
    }
}

/// A click reported by the browser extension
///
/// Every field is optional and read leniently: coordinates may be integers,
/// floats or numeric strings, timestamps epoch milliseconds or RFC 3339.
/// A value that cannot be read becomes `None` so malformed payloads degrade
/// to partial records instead of being rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtEvent {
    #[serde(default, deserialize_with = "lenient::text")]
    pub text: Option<String>,
    #[serde(default, alias = "browser_url", deserialize_with = "lenient::text")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: Option<String>,
    /// Viewport coordinates (CSS pixels)
    #[serde(default, deserialize_with = "lenient::coord")]
    pub x: Option<i32>,
    #[serde(default, deserialize_with = "lenient::coord")]
    pub y: Option<i32>,
    /// Screen coordinates as seen by the page (CSS pixels)
    #[serde(default, alias = "global_x", deserialize_with = "lenient::coord")]
    pub global_x: Option<i32>,
    #[serde(default, alias = "global_y", deserialize_with = "lenient::coord")]
    pub global_y: Option<i32>,
    #[serde(default, alias = "devicePixelRatio", deserialize_with = "lenient::ratio")]
    pub dpr: Option<f64>,
    #[serde(default, alias = "display_id", deserialize_with = "lenient::index")]
    pub display_id: Option<usize>,
    #[serde(default, alias = "app_name", deserialize_with = "lenient::text")]
    pub app_name: Option<String>,
    #[serde(
        default,
        serialize_with = "chrono::serde::ts_milliseconds_option::serialize",
        deserialize_with = "lenient::timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ExtEvent {
    /// The point used for correlation: screen coordinates when present,
    /// otherwise the viewport coordinates.
    pub fn point(&self) -> Option<(i32, i32)> {
        match (self.global_x, self.global_y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => match (self.x, self.y) {
                (Some(x), Some(y)) => Some((x, y)),
                _ => None,
            },
        }
    }
}

/// Field readers that never fail on a well-formed JSON value
mod lenient {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn read<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
        Ok(Option::<Value>::deserialize(deserializer)?.filter(|v| !v.is_null()))
    }

    fn unreadable<T>(value: &Value) -> Option<T> {
        tracing::warn!("Ignoring unreadable extension field value {}", value);
        None
    }

    fn number(value: &Value) -> Option<f64> {
        let n = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        n.filter(|n| n.is_finite())
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(read(deserializer)?.and_then(|value| match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => unreadable(&other),
        }))
    }

    pub fn coord<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
        Ok(read(deserializer)?.and_then(|value| {
            match number(&value).map(f64::round) {
                Some(n) if n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) => Some(n as i32),
                _ => unreadable(&value),
            }
        }))
    }

    pub fn index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
        Ok(read(deserializer)?.and_then(|value| {
            match number(&value).map(f64::round) {
                Some(n) if n >= 0.0 && n <= f64::from(u32::MAX) => Some(n as usize),
                _ => unreadable(&value),
            }
        }))
    }

    pub fn ratio<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(read(deserializer)?.and_then(|value| match number(&value) {
            Some(n) if n > 0.0 => Some(n),
            _ => unreadable(&value),
        }))
    }

    fn from_millis(ms: f64) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(ms.round() as i64).single()
    }

    fn from_text(text: &str) -> Option<DateTime<Utc>> {
        let text = text.trim();
        DateTime::parse_from_rfc3339(text)
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
            .or_else(|| text.parse::<f64>().ok().and_then(from_millis))
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(read(deserializer)?.and_then(|value| {
            let parsed = match &value {
                Value::Number(n) => n.as_f64().and_then(from_millis),
                Value::String(s) => from_text(s),
                _ => None,
            };
            parsed.or_else(|| unreadable(&value))
        }))
    }
}

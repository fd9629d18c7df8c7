use std::fmt::Write;

use chrono::{DateTime, Utc};

/// A time-series point destined for the sink
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, f64)>,
    timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp,
        }
    }

    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    /// Build a reading point: measurement and field named after the semantic
    /// type, tagged with the channel's display name
    pub fn reading(
        semantic_type: &str,
        display_name: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Point::new(semantic_type, timestamp)
            .tag("id", display_name)
            .field(semantic_type, value)
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Line protocol with nanosecond timestamps
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape_measurement(&self.measurement);

        for (key, value) in &self.tags {
            let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
        }

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            let _ = write!(line, "{}={}", escape_key(key), value);
        }

        let nanos = self
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or_else(|| self.timestamp.timestamp_millis().saturating_mul(1_000_000));
        let _ = write!(line, " {}", nanos);
        line
    }
}

#[cfg(test)]
impl Point {
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn field_value(&self, key: &str) -> Option<f64> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }
}

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

// Tag keys, tag values and field keys share the same escaping rules
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

//! Date conversions the provider cannot do reliably on its own. Block timestamps come back as
//! unix seconds and questions are phrased in calendar dates, so most registries want these.
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};

use super::{Capability, CapabilityRegistry};

pub struct TimestampToReadable {
    parameters: Value,
}

impl Default for TimestampToReadable {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampToReadable {
    pub fn new() -> Self {
        Self {
            parameters: json!({
                "type": "object",
                "properties": {
                    "timestamp": {
                        "type": "number",
                        "description": "The timestamp either in seconds or milliseconds, ex. 1620000000 or 1620000000000"
                    },
                    "isMs": {
                        "type": "boolean",
                        "default": false,
                        "description": "Whether the timestamp is in milliseconds, default is false (seconds)"
                    }
                },
                "required": ["timestamp"]
            }),
        }
    }
}

#[async_trait]
impl Capability for TimestampToReadable {
    fn name(&self) -> &str {
        "timestampToReadable"
    }

    fn description(&self) -> &str {
        "Convert unix timestamp in a certain time period to readable date text"
    }

    fn parameters(&self) -> &Value {
        &self.parameters
    }

    async fn call(&self, params: Value) -> Result<Value> {
        let timestamp = params["timestamp"]
            .as_f64()
            .ok_or_else(|| anyhow!("timestamp must be a number"))?;
        let is_ms = params["isMs"].as_bool().unwrap_or(false);
        let millis = if is_ms { timestamp } else { timestamp * 1000.0 };

        let date = DateTime::<Utc>::from_timestamp_millis(millis as i64)
            .ok_or_else(|| anyhow!("timestamp {} is out of range", timestamp))?;
        Ok(json!(date.to_rfc2822()))
    }
}

pub struct ReadableDateToTimestamp {
    parameters: Value,
}

impl Default for ReadableDateToTimestamp {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadableDateToTimestamp {
    pub fn new() -> Self {
        Self {
            parameters: json!({
                "type": "object",
                "properties": {
                    "date": {
                        "type": "string",
                        "description": "The readable date text, ex. '2023-10-01T00:00:00Z'"
                    }
                },
                "required": ["date"]
            }),
        }
    }
}

#[async_trait]
impl Capability for ReadableDateToTimestamp {
    fn name(&self) -> &str {
        "readableDateToTimestamp"
    }

    fn description(&self) -> &str {
        "Convert readable date text to unix timestamp in milliseconds"
    }

    fn parameters(&self) -> &Value {
        &self.parameters
    }

    async fn call(&self, params: Value) -> Result<Value> {
        let text = params["date"]
            .as_str()
            .ok_or_else(|| anyhow!("date must be a string"))?
            .trim();
        Ok(json!(parse_date(text)?.timestamp_millis()))
    }
}

fn parse_date(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Ok(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(text) {
        return Ok(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| anyhow!("Unrecognized date format: {}", text))
}

/// Register the date conversion capabilities
pub fn register(registry: &mut CapabilityRegistry) -> Result<()> {
    registry.register(TimestampToReadable::new())?;
    registry.register(ReadableDateToTimestamp::new())?;
    Ok(())
}

//! Wire records
//!
//! The intake protocol is a plain line stream: each record is the API key,
//! one space, a JSON object and a newline. JSON escaping keeps newlines in
//! user content from splitting a record.

use super::config::DefaultTags;
use super::error::Result;
use super::log_entry::LogEntry;
use chrono::SecondsFormat;
use serde_json::{Map, Value};

/// A framed record ready to be written, consumed by exactly one write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    bytes: Vec<u8>,
    payload_len: usize,
}

impl Record {
    /// Frame an already encoded payload as `<api_key> <payload>\n`
    ///
    /// The payload is taken as-is; callers writing raw bytes are responsible
    /// for it not containing a newline.
    pub fn frame(api_key: &str, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(api_key.len() + payload.len() + 2);
        bytes.extend_from_slice(api_key.as_bytes());
        bytes.push(b' ');
        bytes.extend_from_slice(payload);
        bytes.push(b'\n');
        Self {
            bytes,
            payload_len: payload.len(),
        }
    }

    /// Encode an entry and frame it
    pub fn from_entry(api_key: &str, tags: &DefaultTags, entry: &LogEntry) -> Result<Self> {
        let payload = encode_entry(tags, entry)?;
        Ok(Self::frame(api_key, &payload))
    }

    /// Bytes as they go on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the framed record
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Length of the payload alone, without key, separator and newline
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
}

/// Build the JSON object for one entry
///
/// Default tags go in first so caller fields may override them; `level`,
/// `message` and `timestamp` are written last and always win.
pub fn encode_entry(tags: &DefaultTags, entry: &LogEntry) -> Result<Vec<u8>> {
    let mut object = Map::new();
    object.insert("host".into(), Value::String(tags.host.clone()));
    object.insert("service".into(), Value::String(tags.service.clone()));
    object.insert("source".into(), Value::String(tags.source.clone()));

    for (key, value) in entry.fields.fields() {
        object.insert(key.clone(), value.to_json_value(key)?);
    }

    object.insert(
        "level".into(),
        Value::String(entry.level.as_wire_str().to_string()),
    );
    object.insert("message".into(), Value::String(entry.message.clone()));
    object.insert(
        "timestamp".into(),
        Value::String(entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );

    Ok(serde_json::to_vec(&Value::Object(object))?)
}

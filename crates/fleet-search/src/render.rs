//! Output renderers.
//!
//! A renderer turns the ordered record stream into bytes. It sees every
//! record exactly once, in order, and is told when the stream ends.

use std::fmt;

use chrono::DateTime;
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, SearchError};
use crate::merge::TIME_FIELD;

/// Streaming record encoder.
pub trait Renderer: Send {
    /// Encodes one record into `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded.
    fn render(&mut self, record: &Value, out: &mut Vec<u8>) -> Result<()>;

    /// Writes any trailer once the stream is complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailer cannot be encoded.
    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()>;
}

/// One JSON object per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesRenderer;

impl Renderer for JsonLinesRenderer {
    fn render(&mut self, record: &Value, out: &mut Vec<u8>) -> Result<()> {
        serde_json::to_writer(&mut *out, record)?;
        out.push(b'\n');
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

/// Trace-viewer event array built from each record's `evt` object.
///
/// Timestamps are microseconds relative to the first event rendered. Nothing
/// is written for a stream without events.
#[derive(Debug, Clone, Default)]
pub struct TraceEventRenderer {
    base_micros: Option<i64>,
    emitted: usize,
}

impl TraceEventRenderer {
    /// Creates a renderer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events written so far.
    #[must_use]
    pub const fn emitted(&self) -> usize {
        self.emitted
    }

    fn build_event(&mut self, record: &Value, evt: &Map<String, Value>) -> Result<Value> {
        let micros = record
            .get(TIME_FIELD)
            .and_then(Value::as_str)
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp_micros())
            .ok_or_else(|| SearchError::Render(format!("record has no valid {TIME_FIELD}")))?;
        let base = *self.base_micros.get_or_insert(micros);

        let source_name = record.get("name").and_then(Value::as_str).unwrap_or_default();
        let pid = record.get("pid").cloned().unwrap_or(Value::Null);
        let id = match record.get("req_id") {
            Some(Value::String(id)) => id.clone(),
            _ => format!("(no req_id {})", Uuid::new_v4()),
        };

        let mut event = evt.clone();
        let event_name = event.get("name").and_then(Value::as_str).unwrap_or_default();
        let name = format!("{source_name}.{event_name}");
        let cat = match event.get("cat").and_then(Value::as_str) {
            Some(cat) => format!("{source_name},{cat}"),
            None => source_name.to_string(),
        };

        event.insert("pid".to_string(), pid.clone());
        event.insert("tid".to_string(), pid);
        event.insert("id".to_string(), Value::String(id));
        event.insert("ts".to_string(), Value::from(micros - base));
        event.insert("name".to_string(), Value::String(name));
        event.insert("cat".to_string(), Value::String(cat));
        event
            .entry("args")
            .or_insert_with(|| Value::Object(Map::new()));

        Ok(Value::Object(event))
    }
}

impl Renderer for TraceEventRenderer {
    fn render(&mut self, record: &Value, out: &mut Vec<u8>) -> Result<()> {
        let Some(evt) = record.get("evt").and_then(Value::as_object) else {
            warn!("skipping record without an evt object");
            return Ok(());
        };

        let event = self.build_event(record, evt)?;
        out.extend_from_slice(if self.emitted == 0 { b"[" } else { b",\n" });
        serde_json::to_writer(&mut *out, &event)?;
        self.emitted += 1;
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.emitted > 0 {
            out.extend_from_slice(b"]\n");
        }
        Ok(())
    }
}

/// Output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One JSON object per line.
    #[default]
    JsonLines,
    /// A trace-event JSON array.
    TraceEvent,
}

impl OutputFormat {
    /// Creates a fresh renderer for this format.
    #[must_use]
    pub fn renderer(&self) -> Box<dyn Renderer> {
        match self {
            Self::JsonLines => Box::new(JsonLinesRenderer),
            Self::TraceEvent => Box::new(TraceEventRenderer::new()),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JsonLines => f.write_str("json-lines"),
            Self::TraceEvent => f.write_str("trace-event"),
        }
    }
}

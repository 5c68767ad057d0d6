//! Inbound message envelope and classification.
//!
//! The server speaks a loose JSON dialect: a frame may carry an explicit
//! `type` tag, or only a payload whose shape implies its kind. Fields may sit
//! under `data` or at the top level. [`classify`] maps any parsed frame to a
//! [`ClassifiedFrame`] without touching the transport.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StreamError;
use crate::ws::preview::extract_preview_url;

/// Message kind tags understood by the client.
pub mod kinds {
    /// Incremental progress update.
    pub const PROGRESS: &str = "progress";
    /// Job finished.
    pub const COMPLETE: &str = "complete";
    /// Job or server failure.
    pub const ERROR: &str = "error";
}

/// Message applied to progress updates that carry none.
pub const DEFAULT_PROGRESS_MESSAGE: &str = "Processing...";

/// Description used when an error frame names no cause.
pub const FALLBACK_ERROR_DESCRIPTION: &str = "Unknown error";

/// The normalized kind of an inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Progress update with a numeric completion value.
    Progress {
        /// Completion value as sent by the server.
        value: f64,
        /// Human-readable status, if the server sent one.
        message: Option<String>,
    },
    /// Job completion with its payload.
    Complete {
        /// The `data` object of the frame, or an empty object.
        payload: Value,
    },
    /// Server-reported error.
    Error {
        /// Most specific description available.
        description: String,
    },
    /// A frame tagged with a known kind that lacks the fields that kind needs.
    Invalid {
        /// The declared kind.
        kind: String,
        /// What was missing.
        reason: String,
    },
    /// Nothing recognizable.
    Unrecognized,
}

/// A frame after classification.
///
/// The preview location is independent of the kind: a progress update and a
/// preview notification can come from the same frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedFrame {
    /// The normalized kind.
    pub message: StreamMessage,
    /// Repaired preview location, if the frame carried one.
    pub preview_url: Option<String>,
}

impl ClassifiedFrame {
    /// Whether the frame produces no notification at all.
    pub fn is_empty(&self) -> bool {
        self.preview_url.is_none()
            && matches!(self.message, StreamMessage::Unrecognized | StreamMessage::Invalid { .. })
    }
}

/// Parse a text frame and classify it.
pub fn parse_frame(text: &str) -> Result<ClassifiedFrame, StreamError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(classify(&value))
}

/// Classify a parsed frame.
///
/// Order of precedence: an explicit `type` of `progress`, `complete` or
/// `error`; then an implicit progress value; then an implicit `error` field.
/// Anything else is [`StreamMessage::Unrecognized`], which still yields a
/// preview notification when a preview location is present.
pub fn classify(frame: &Value) -> ClassifiedFrame {
    let preview_url = extract_preview_url(frame);
    let kind = frame.get("type").and_then(Value::as_str);

    let message = match kind {
        Some(kinds::PROGRESS) => match progress_value(frame) {
            Some(value) => StreamMessage::Progress {
                value,
                message: text_field(frame, "message"),
            },
            None => StreamMessage::Invalid {
                kind: kinds::PROGRESS.to_string(),
                reason: "missing numeric progress value".to_string(),
            },
        },
        Some(kinds::COMPLETE) => StreamMessage::Complete {
            payload: frame
                .get("data")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
        },
        Some(kinds::ERROR) => StreamMessage::Error {
            description: error_description(frame),
        },
        _ => {
            if let Some(value) = progress_value(frame) {
                StreamMessage::Progress {
                    value,
                    message: text_field(frame, "message"),
                }
            } else if has_error_field(frame) {
                StreamMessage::Error {
                    description: error_description(frame),
                }
            } else {
                StreamMessage::Unrecognized
            }
        }
    };

    ClassifiedFrame { message, preview_url }
}

/// Look up a field under `data` first, then at the top level.
fn lookup<'a>(frame: &'a Value, field: &str) -> Option<&'a Value> {
    frame
        .get("data")
        .and_then(|data| data.get(field))
        .or_else(|| frame.get(field))
}

fn progress_value(frame: &Value) -> Option<f64> {
    lookup(frame, "progress").and_then(Value::as_f64)
}

fn text_field(frame: &Value, field: &str) -> Option<String> {
    lookup(frame, field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn has_error_field(frame: &Value) -> bool {
    lookup(frame, "error").is_some_and(|error| !error.is_null())
}

/// Pick the most specific error description available.
fn error_description(frame: &Value) -> String {
    let nested = frame.get("data").and_then(|data| data.get("error"));
    [nested, frame.get("error")]
        .into_iter()
        .flatten()
        .find_map(describe)
        .or_else(|| text_field(frame, "message"))
        .unwrap_or_else(|| FALLBACK_ERROR_DESCRIPTION.to_string())
}

/// Render an error field, which is usually a string but sometimes an object.
fn describe(error: &Value) -> Option<String> {
    match error {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

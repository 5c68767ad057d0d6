//! Error types for the progress stream client.

use thiserror::Error;

/// Failures observed while running a progress stream session.
///
/// None of these are returned to the host from `connect` or `disconnect`.
/// Transport failures are rendered with [`StreamError::description`] and
/// delivered through the `on_error` callback; message failures are logged
/// and the frame is dropped.
#[derive(Error, Debug)]
pub enum StreamError {
    /// WebSocket protocol or transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The WebSocket handshake did not finish in time
    #[error("Connection attempt timed out")]
    ConnectTimeout,

    /// `connect` was called outside of a tokio runtime
    #[error("No tokio runtime available to drive the connection")]
    NoRuntime,

    /// The server closed the connection
    #[error("WebSocket connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for the closure
        reason: String,
    },

    /// A frame parsed but failed validation for its declared kind
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl StreamError {
    /// The description handed to the host's `on_error` callback.
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Whether the error came from the transport rather than a single frame.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::WebSocket(_) | Self::ConnectTimeout | Self::NoRuntime | Self::ConnectionClosed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_closed_display() {
        let error = StreamError::ConnectionClosed {
            reason: "going away".to_string(),
        };
        assert_eq!(error.description(), "WebSocket connection closed: going away");
        assert!(error.is_transport());
    }

    #[test]
    fn test_json_error_is_not_transport() {
        let error: StreamError = serde_json::from_str::<serde_json::Value>("{nope")
            .unwrap_err()
            .into();
        assert!(!error.is_transport());
        assert!(error.description().starts_with("JSON error"));
    }
}

//! Progress stream client implementation.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::ws::callbacks::Callbacks;
use crate::ws::messages::DEFAULT_PROGRESS_MESSAGE;
use crate::ws::stream::{ConnectionState, Shared};

/// Configuration for progress stream connections.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Delay before the first reconnection attempt; doubles on each further one.
    pub base_delay: Duration,
    /// Upper bound for the reconnection delay (None = unbounded).
    pub max_backoff: Option<Duration>,
    /// Consecutive reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Handshake timeout for each connection attempt (None = wait indefinitely).
    pub connect_timeout: Option<Duration>,
    /// Message passed to `on_progress` when the server sends none.
    pub default_progress_message: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_backoff: None,
            max_reconnect_attempts: 5,
            connect_timeout: Some(Duration::from_secs(10)),
            default_progress_message: DEFAULT_PROGRESS_MESSAGE.to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Delay before reconnection attempt `attempt` (1-based):
    /// `base_delay * 2^(attempt - 1)`, capped at `max_backoff` when set.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        match self.max_backoff {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the base reconnection delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Cap the reconnection delay.
    pub fn max_backoff(mut self, max: Duration) -> Self {
        self.config.max_backoff = Some(max);
        self
    }

    /// Set maximum reconnection attempts.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Set the handshake timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Wait for handshakes indefinitely.
    pub fn no_connect_timeout(mut self) -> Self {
        self.config.connect_timeout = None;
        self
    }

    /// Set the message used for progress updates that carry none.
    pub fn default_progress_message(mut self, message: impl Into<String>) -> Self {
        self.config.default_progress_message = message.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Map a web endpoint onto the matching WebSocket scheme.
///
/// `http://` becomes `ws://`, `https://` becomes `wss://`; anything else is
/// returned unchanged. The scheme is matched case-insensitively.
pub fn to_stream_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if let Some(rest) = strip_scheme(endpoint, "https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = strip_scheme(endpoint, "http://") {
        format!("ws://{rest}")
    } else {
        endpoint.to_string()
    }
}

fn strip_scheme<'a>(endpoint: &'a str, scheme: &str) -> Option<&'a str> {
    let prefix = endpoint.get(..scheme.len())?;
    if prefix.eq_ignore_ascii_case(scheme) {
        Some(&endpoint[scheme.len()..])
    } else {
        None
    }
}

/// Client for a job's progress stream.
///
/// Owns at most one WebSocket at a time, reconnects with exponential back-off
/// after unintentional closes, and reports everything through [`Callbacks`].
/// None of its methods fail or block; they must be called from within a tokio
/// runtime for `connect` to have any effect.
///
/// Dropping the client disconnects it.
///
/// # Example
///
/// ```rust,no_run
/// use progress_stream_client::ws::{Callbacks, ProgressClient};
///
/// #[tokio::main]
/// async fn main() {
///     let callbacks = Callbacks::new()
///         .on_progress(|value, message| println!("{value:.0}% {message}"))
///         .on_complete(|payload| println!("done: {payload}"));
///
///     let client = ProgressClient::new("https://jobs.example.com/progress?token=abc", callbacks);
///     client.connect();
///     // ... later
///     client.disconnect();
/// }
/// ```
pub struct ProgressClient {
    endpoint: String,
    shared: Arc<Shared>,
}

impl ProgressClient {
    /// Create a client with default settings.
    pub fn new(endpoint: impl Into<String>, callbacks: Callbacks) -> Self {
        Self::with_config(endpoint, callbacks, ClientConfig::default())
    }

    /// Create a client with custom configuration.
    pub fn with_config(endpoint: impl Into<String>, callbacks: Callbacks, config: ClientConfig) -> Self {
        let endpoint = endpoint.into();
        let url = to_stream_url(&endpoint);
        Self {
            endpoint,
            shared: Arc::new(Shared::new(url, config, callbacks)),
        }
    }

    /// The endpoint as supplied by the host.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The WebSocket URL actually dialed.
    pub fn stream_url(&self) -> &str {
        &self.shared.url
    }

    /// Get the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Open the stream.
    ///
    /// A no-op while a session is live (connecting, open or waiting to
    /// reconnect). After [`disconnect`](Self::disconnect) or terminal closure
    /// it starts a fresh session with a full reconnect budget.
    pub fn connect(&self) {
        self.shared.start();
    }

    /// Close the stream and cancel any pending reconnect. Idempotent.
    ///
    /// No callback fires for this client afterwards, other than one already
    /// running.
    pub fn disconnect(&self) {
        self.shared.stop();
    }

    /// Check if the transport is open.
    pub fn is_connected(&self) -> bool {
        self.shared.state() == ConnectionState::Open
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Reconnection attempts since the last successful open.
    pub fn reconnect_attempt(&self) -> u32 {
        self.shared.reconnect_attempt()
    }

    /// A weak handle usable from inside callbacks.
    ///
    /// Callbacks are owned by the client, so capturing the client itself would
    /// form a cycle; the handle does not keep the client alive.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl Drop for ProgressClient {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl fmt::Debug for ProgressClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressClient")
            .field("url", &self.shared.url)
            .field("state", &self.shared.state())
            .field("reconnect_attempt", &self.shared.reconnect_attempt())
            .finish()
    }
}

/// Non-owning handle to a [`ProgressClient`].
///
/// Every method is a no-op once the client has been dropped.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    shared: Weak<Shared>,
}

impl ClientHandle {
    /// See [`ProgressClient::connect`].
    pub fn connect(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.start();
        }
    }

    /// See [`ProgressClient::disconnect`].
    pub fn disconnect(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.stop();
        }
    }

    /// See [`ProgressClient::is_connected`].
    pub fn is_connected(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.state() == ConnectionState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_mapping() {
        assert_eq!(to_stream_url("http://host/progress"), "ws://host/progress");
        assert_eq!(to_stream_url("https://host/progress"), "wss://host/progress");
        assert_eq!(to_stream_url("HTTPS://host/p?token=x"), "wss://host/p?token=x");
        assert_eq!(to_stream_url("ws://host/progress"), "ws://host/progress");
        assert_eq!(to_stream_url("wss://host/progress"), "wss://host/progress");
        assert_eq!(to_stream_url("ftp://host/progress"), "ftp://host/progress");
        assert_eq!(to_stream_url("  http://host/p \n"), "ws://host/p");
        assert_eq!(to_stream_url("http"), "http");
    }

    #[test]
    fn test_backoff_delay_sequence() {
        let config = ClientConfig::builder()
            .base_delay(Duration::from_millis(250))
            .build();
        let delays: Vec<_> = (1..=5).map(|attempt| config.backoff_delay(attempt)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn test_backoff_delay_cap_and_saturation() {
        let capped = ClientConfig::builder()
            .base_delay(Duration::from_secs(1))
            .max_backoff(Duration::from_secs(5))
            .build();
        assert_eq!(capped.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(capped.backoff_delay(4), Duration::from_secs(5));
        assert_eq!(capped.backoff_delay(200), Duration::from_secs(5));

        let uncapped = ClientConfig::default();
        assert!(uncapped.backoff_delay(u32::MAX) >= Duration::from_secs(1));
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.default_progress_message, "Processing...");
    }

    #[test]
    fn test_new_client_is_idle() {
        let client = ProgressClient::new("https://host/progress", Callbacks::new());
        assert_eq!(client.endpoint(), "https://host/progress");
        assert_eq!(client.stream_url(), "wss://host/progress");
        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(!client.is_connected());
        assert_eq!(client.reconnect_attempt(), 0);
    }

    #[test]
    fn test_disconnect_before_connect_is_harmless() {
        let client = ProgressClient::new("http://host/progress", Callbacks::new());
        client.disconnect();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_handle_outlives_client() {
        let client = ProgressClient::new("http://host/progress", Callbacks::new());
        let handle = client.handle();
        drop(client);
        handle.connect();
        handle.disconnect();
        assert!(!handle.is_connected());
    }
}

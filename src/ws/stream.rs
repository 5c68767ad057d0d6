//! Connection worker and session state machine.
//!
//! Each `connect()` from `Idle` or `Closed` starts a new session generation
//! and spawns one worker task that owns the socket for that generation. The
//! worker opens the transport, dispatches frames, and on an unintentional
//! close either sleeps out the back-off delay and loops, or gives up.
//! `disconnect()` flips the intentional-close flag and signals the worker
//! through a `watch` channel; every callback is gated on the generation still
//! being current and not intentionally closed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::StreamError;
use crate::ws::callbacks::Callbacks;
use crate::ws::client::ClientConfig;
use crate::ws::messages::{StreamMessage, parse_frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle state of a [`ProgressClient`](crate::ws::ProgressClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Constructed, never connected.
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Transport established.
    Open,
    /// Transport dropped; waiting out the back-off delay.
    Reconnecting,
    /// Disconnected on request, or reconnect budget exhausted.
    Closed,
}

/// Bookkeeping shared between the client handle and its worker task.
#[derive(Debug)]
struct Session {
    state: ConnectionState,
    reconnect_attempt: u32,
    intentional_close: bool,
    generation: u64,
    shutdown: Option<watch::Sender<bool>>,
}

/// What to do after the transport closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseDecision {
    /// Session was cancelled or superseded.
    Stop,
    /// Budget exhausted.
    GiveUp,
    /// Sleep, then connect again.
    Retry { attempt: u32, delay: Duration },
}

/// How a connected session ended.
enum SessionEnd {
    Shutdown,
    Dropped,
}

pub(crate) struct Shared {
    pub(crate) url: String,
    pub(crate) config: ClientConfig,
    callbacks: Callbacks,
    session: Mutex<Session>,
}

impl Shared {
    pub(crate) fn new(url: String, config: ClientConfig, callbacks: Callbacks) -> Self {
        Self {
            url,
            config,
            callbacks,
            session: Mutex::new(Session {
                state: ConnectionState::Idle,
                reconnect_attempt: 0,
                intentional_close: false,
                generation: 0,
                shutdown: None,
            }),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        // Callbacks never run under this lock, so poisoning cannot leave the
        // session half-updated.
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.session().state
    }

    pub(crate) fn reconnect_attempt(&self) -> u32 {
        self.session().reconnect_attempt
    }

    /// Start a new session unless one is already live.
    pub(crate) fn start(self: &Arc<Self>) {
        let mut session = self.session();
        match session.state {
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Reconnecting => {
                tracing::debug!(state = ?session.state, "connect() ignored, session already live");
                return;
            }
            ConnectionState::Idle | ConnectionState::Closed => {}
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                drop(session);
                let error = StreamError::NoRuntime;
                tracing::warn!(error = %error, "Cannot start progress stream");
                self.callbacks.error(&error.description());
                return;
            }
        };

        session.generation += 1;
        session.intentional_close = false;
        session.reconnect_attempt = 0;
        session.state = ConnectionState::Connecting;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        session.shutdown = Some(shutdown_tx);
        let generation = session.generation;
        drop(session);

        runtime.spawn(run_session(Arc::clone(self), generation, shutdown_rx));
    }

    /// Mark the session intentionally closed and signal the worker.
    pub(crate) fn stop(&self) {
        let mut session = self.session();
        if !session.intentional_close {
            tracing::debug!(generation = session.generation, "Disconnect requested");
        }
        session.intentional_close = true;
        session.state = ConnectionState::Closed;
        if let Some(shutdown) = session.shutdown.take() {
            let _ = shutdown.send(true);
        }
    }

    fn is_current(session: &Session, generation: u64) -> bool {
        session.generation == generation && !session.intentional_close
    }

    /// Invoke a callback if the session is still live. The lock is released
    /// before the callback runs so it may call back into the client.
    fn emit(&self, generation: u64, f: impl FnOnce(&Callbacks)) {
        let live = Self::is_current(&self.session(), generation);
        if live {
            f(&self.callbacks);
        }
    }

    fn transition(&self, generation: u64, state: ConnectionState) -> bool {
        let mut session = self.session();
        if !Self::is_current(&session, generation) {
            return false;
        }
        session.state = state;
        true
    }

    fn mark_open(&self, generation: u64) -> bool {
        let mut session = self.session();
        if !Self::is_current(&session, generation) {
            return false;
        }
        session.state = ConnectionState::Open;
        session.reconnect_attempt = 0;
        true
    }

    fn on_transport_closed(&self, generation: u64) -> CloseDecision {
        let mut session = self.session();
        if !Self::is_current(&session, generation) {
            return CloseDecision::Stop;
        }
        if session.reconnect_attempt < self.config.max_reconnect_attempts {
            session.reconnect_attempt += 1;
            session.state = ConnectionState::Reconnecting;
            let attempt = session.reconnect_attempt;
            CloseDecision::Retry {
                attempt,
                delay: self.config.backoff_delay(attempt),
            }
        } else {
            session.state = ConnectionState::Closed;
            session.shutdown = None;
            CloseDecision::GiveUp
        }
    }
}

/// Drive one session generation until it is cancelled or gives up.
async fn run_session(shared: Arc<Shared>, generation: u64, mut shutdown: watch::Receiver<bool>) {
    loop {
        if !shared.transition(generation, ConnectionState::Connecting) {
            return;
        }
        tracing::debug!(url = %shared.url, generation, "Connecting to progress stream");

        let opened = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => return,
            opened = open(&shared.url, shared.config.connect_timeout) => opened,
        };

        match opened {
            Ok(ws) => {
                if !shared.mark_open(generation) {
                    let mut ws = ws;
                    let _ = ws.close(None).await;
                    return;
                }
                tracing::info!(url = %shared.url, "Progress stream open");
                shared.emit(generation, |cb| cb.open());

                match read_frames(&shared, generation, ws, &mut shutdown).await {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Dropped => {}
                }
            }
            Err(error) => {
                tracing::warn!(url = %shared.url, error = %error, "Progress stream connection failed");
                shared.emit(generation, |cb| cb.error(&error.description()));
            }
        }

        match shared.on_transport_closed(generation) {
            CloseDecision::Stop => return,
            CloseDecision::GiveUp => {
                tracing::info!(
                    url = %shared.url,
                    max_attempts = shared.config.max_reconnect_attempts,
                    "Reconnect attempts exhausted, closing progress stream"
                );
                shared.emit(generation, |cb| cb.close());
                return;
            }
            CloseDecision::Retry { attempt, delay } => {
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling progress stream reconnect"
                );
                tokio::select! {
                    _ = shutdown_requested(&mut shutdown) => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// Resolves once shutdown was signalled or the sender was dropped.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn open(url: &str, timeout: Option<Duration>) -> Result<WsStream, StreamError> {
    let connect = connect_async(url);
    let (ws, _response) = match timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| StreamError::ConnectTimeout)??,
        None => connect.await?,
    };
    Ok(ws)
}

async fn read_frames(
    shared: &Shared,
    generation: u64,
    ws: WsStream,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut receiver) = ws.split();

    loop {
        let next = tokio::select! {
            _ = shutdown_requested(shutdown) => {
                let _ = sink.send(WsMessage::Close(None)).await;
                tracing::debug!(generation, "Progress stream closed on request");
                return SessionEnd::Shutdown;
            }
            next = receiver.next() => next,
        };

        match next {
            Some(Ok(WsMessage::Text(text))) => dispatch(shared, generation, text.as_str()),
            Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => dispatch(shared, generation, text),
                Err(e) => tracing::warn!(error = %e, "Dropping non-UTF-8 binary frame"),
            },
            Some(Ok(WsMessage::Close(frame))) => {
                let closed = StreamError::ConnectionClosed {
                    reason: frame
                        .map(|f| f.reason.as_str().to_string())
                        .unwrap_or_default(),
                };
                tracing::debug!(error = %closed, "Server closed progress stream");
                return SessionEnd::Dropped;
            }
            // Ping/pong are answered by tungstenite.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                // A read error ends the socket; the close is handled by the caller.
                let error = StreamError::from(e);
                tracing::warn!(error = %error, "Progress stream transport error");
                shared.emit(generation, |cb| cb.error(&error.description()));
                return SessionEnd::Dropped;
            }
            None => {
                tracing::debug!(generation, "Progress stream ended");
                return SessionEnd::Dropped;
            }
        }
    }
}

/// Classify one text frame and notify the host.
fn dispatch(shared: &Shared, generation: u64, text: &str) {
    let frame = match parse_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed progress frame");
            return;
        }
    };

    if let Some(url) = frame.preview_url.as_deref() {
        shared.emit(generation, |cb| cb.preview_ready(url));
    }

    match frame.message {
        StreamMessage::Progress { value, message } => {
            let message = message
                .as_deref()
                .unwrap_or(shared.config.default_progress_message.as_str());
            shared.emit(generation, |cb| cb.progress(value, message));
        }
        StreamMessage::Complete { payload } => {
            shared.emit(generation, |cb| cb.complete(&payload));
        }
        StreamMessage::Error { description } => {
            shared.emit(generation, |cb| cb.error(&description));
        }
        StreamMessage::Invalid { kind, reason } => {
            let error = StreamError::InvalidMessage(format!("{kind}: {reason}"));
            tracing::warn!(error = %error, "Dropping invalid progress frame");
        }
        StreamMessage::Unrecognized => {
            if frame.preview_url.is_none() {
                tracing::debug!(frame = %text, "Dropping unrecognized progress frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(max_attempts: u32) -> Arc<Shared> {
        let config = ClientConfig::builder()
            .base_delay(Duration::from_millis(100))
            .max_reconnect_attempts(max_attempts)
            .build();
        Arc::new(Shared::new("ws://127.0.0.1:1".to_string(), config, Callbacks::new()))
    }

    fn live(shared: &Shared) -> u64 {
        let mut session = shared.session();
        session.generation += 1;
        session.state = ConnectionState::Connecting;
        session.generation
    }

    #[test]
    fn test_close_decisions_follow_backoff_and_budget() {
        let shared = shared(3);
        let generation = live(&shared);

        let delays: Vec<_> = (0..3)
            .map(|_| match shared.on_transport_closed(generation) {
                CloseDecision::Retry { delay, .. } => delay,
                other => panic!("expected retry, got {other:?}"),
            })
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
        assert_eq!(shared.state(), ConnectionState::Reconnecting);

        assert_eq!(shared.on_transport_closed(generation), CloseDecision::GiveUp);
        assert_eq!(shared.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_open_resets_attempts() {
        let shared = shared(5);
        let generation = live(&shared);

        shared.on_transport_closed(generation);
        shared.on_transport_closed(generation);
        assert_eq!(shared.reconnect_attempt(), 2);

        assert!(shared.mark_open(generation));
        assert_eq!(shared.reconnect_attempt(), 0);
        assert_eq!(
            shared.on_transport_closed(generation),
            CloseDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(100)
            }
        );
    }

    #[test]
    fn test_stop_makes_generation_stale() {
        let shared = shared(5);
        let generation = live(&shared);

        shared.stop();
        shared.stop();
        assert_eq!(shared.state(), ConnectionState::Closed);
        assert!(!shared.transition(generation, ConnectionState::Connecting));
        assert!(!shared.mark_open(generation));
        assert_eq!(shared.on_transport_closed(generation), CloseDecision::Stop);
    }

    #[test]
    fn test_start_without_runtime_stays_idle() {
        let shared = shared(5);
        shared.start();
        assert_eq!(shared.state(), ConnectionState::Idle);
    }
}

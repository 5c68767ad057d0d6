//! Host-supplied notification callbacks.

use std::fmt;

use serde_json::Value;

type OpenCallback = Box<dyn Fn() + Send + Sync + 'static>;
type ProgressCallback = Box<dyn Fn(f64, &str) + Send + Sync + 'static>;
type PreviewCallback = Box<dyn Fn(&str) + Send + Sync + 'static>;
type CompleteCallback = Box<dyn Fn(&Value) + Send + Sync + 'static>;
type ErrorCallback = Box<dyn Fn(&str) + Send + Sync + 'static>;
type CloseCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// The set of callbacks a [`ProgressClient`](crate::ws::ProgressClient) notifies.
///
/// Every entry is optional; missing ones are skipped. Callbacks run on the
/// connection task and should return quickly. Calling
/// [`ProgressClient::disconnect`](crate::ws::ProgressClient::disconnect) from
/// inside one is allowed.
///
/// # Example
///
/// ```rust
/// use progress_stream_client::ws::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_progress(|value, message| println!("{value:.0}% {message}"))
///     .on_preview_ready(|url| println!("preview at {url}"))
///     .on_close(|| println!("gave up"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    on_open: Option<OpenCallback>,
    on_progress: Option<ProgressCallback>,
    on_preview_ready: Option<PreviewCallback>,
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
    on_close: Option<CloseCallback>,
}

impl Callbacks {
    /// An empty callback set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called each time the transport opens, including after a reconnect.
    pub fn on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    /// Called with the completion value and a status message.
    pub fn on_progress(mut self, f: impl Fn(f64, &str) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Called with a repaired preview location.
    pub fn on_preview_ready(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_preview_ready = Some(Box::new(f));
        self
    }

    /// Called with the payload of a completion frame.
    pub fn on_complete(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called for server-reported and transport errors. Advisory only: the
    /// connection may recover on its own.
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called once the reconnect budget is exhausted. Terminal.
    pub fn on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    pub(crate) fn open(&self) {
        if let Some(f) = &self.on_open {
            f();
        }
    }

    pub(crate) fn progress(&self, value: f64, message: &str) {
        if let Some(f) = &self.on_progress {
            f(value, message);
        }
    }

    pub(crate) fn preview_ready(&self, url: &str) {
        if let Some(f) = &self.on_preview_ready {
            f(url);
        }
    }

    pub(crate) fn complete(&self, payload: &Value) {
        if let Some(f) = &self.on_complete {
            f(payload);
        }
    }

    pub(crate) fn error(&self, description: &str) {
        if let Some(f) = &self.on_error {
            f(description);
        }
    }

    pub(crate) fn close(&self) {
        if let Some(f) = &self.on_close {
            f();
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_preview_ready", &self.on_preview_ready.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

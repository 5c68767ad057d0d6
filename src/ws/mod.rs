//! Resilient WebSocket client for job progress streams.
//!
//! Receives progress, completion, error and preview notifications from a
//! progress-reporting service and survives transient disconnects.
//!
//! # Example
//!
//! ```rust,no_run
//! use progress_stream_client::ws::{Callbacks, ClientConfig, ProgressClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let callbacks = Callbacks::new()
//!         .on_open(|| println!("connected"))
//!         .on_progress(|value, message| println!("{value:.0}% {message}"))
//!         .on_preview_ready(|url| println!("preview: {url}"))
//!         .on_complete(|payload| println!("complete: {payload}"))
//!         .on_error(|error| eprintln!("error: {error}"))
//!         .on_close(|| println!("stream closed"));
//!
//!     let config = ClientConfig::builder()
//!         .base_delay(Duration::from_millis(500))
//!         .max_reconnect_attempts(8)
//!         .build();
//!
//!     let client = ProgressClient::with_config("https://jobs.example.com/progress", callbacks, config);
//!     client.connect();
//!
//!     tokio::time::sleep(Duration::from_secs(30)).await;
//!     client.disconnect();
//! }
//! ```

mod callbacks;
mod client;
pub mod messages;
pub mod preview;
mod stream;

pub use callbacks::Callbacks;
pub use client::{ClientConfig, ClientConfigBuilder, ClientHandle, ProgressClient, to_stream_url};
pub use messages::{ClassifiedFrame, StreamMessage, classify, parse_frame};
pub use stream::ConnectionState;

//! # Progress Stream Client
//!
//! A resilient async WebSocket client for job progress streams.
//!
//! ## Features
//!
//! - Automatic reconnection with exponential back-off and a bounded budget
//! - Tolerant classification of loosely-shaped JSON frames
//! - Lenient preview-location extraction and repair
//! - Optional, independently-set callbacks for every notification
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use progress_stream_client::ws::{Callbacks, ProgressClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let callbacks = Callbacks::new()
//!         .on_progress(|value, message| println!("{value:.0}% {message}"));
//!     let client = ProgressClient::new("https://jobs.example.com/progress", callbacks);
//!     client.connect();
//! }
//! ```

pub mod error;
pub mod ws;

// Re-export commonly used types at crate root
pub use error::StreamError;
pub use ws::{Callbacks, ClientConfig, ConnectionState, ProgressClient};

/// Result type alias using StreamError
pub type Result<T> = std::result::Result<T, StreamError>;

//! Example: Watching a job's progress stream.
//!
//! Connects to the endpoint given as the first argument (or
//! `PROGRESS_STREAM_URL`) and prints every notification until the job
//! completes or the stream gives up.
//!
//! Run with: cargo run --example watch_progress -- https://jobs.example.com/progress?token=...

use std::time::Duration;

use progress_stream_client::ws::{Callbacks, ClientConfig, ProgressClient};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PROGRESS_STREAM_URL").ok())
        .ok_or("usage: watch_progress <endpoint>")?;

    // Either completion or terminal closure ends the demo.
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let on_done = done_tx.clone();

    let callbacks = Callbacks::new()
        .on_open(|| println!("[Open] Connected"))
        .on_progress(|value, message| println!("[Progress] {value:>5.1}% {message}"))
        .on_preview_ready(|url| println!("[Preview] {url}"))
        .on_complete(move |payload| {
            println!("[Complete] {payload}");
            let _ = on_done.send(());
        })
        .on_error(|error| println!("[Error] {error}"))
        .on_close(move || {
            println!("[Closed] Reconnect attempts exhausted");
            let _ = done_tx.send(());
        });

    let config = ClientConfig::builder()
        .base_delay(Duration::from_millis(500))
        .max_reconnect_attempts(5)
        .build();

    let client = ProgressClient::with_config(endpoint, callbacks, config);
    println!("Connecting to {}...", client.stream_url());
    client.connect();

    tokio::select! {
        _ = done_rx.recv() => {}
        _ = tokio::signal::ctrl_c() => println!("\nInterrupted."),
    }

    client.disconnect();
    println!("Connection closed.");

    Ok(())
}

//! WebSocket session with auto-reconnect, feeding text frames to a handler.
//!
//! Each `WsConnection` runs as a tokio task that:
//! 1. Connects to the stream endpoint (TLS).
//! 2. Sends the optional subscription frame.
//! 3. Hands every text frame to the message handler.
//! 4. Answers server pings and optionally sends its own.
//! 5. Reconnects on disconnection with exponential backoff.
//!
//! The handler runs on the session task. If it publishes into a blocking
//! transport, a full buffer stalls reads from the socket; that is the
//! transport's backpressure reaching the network.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::FeedError;

/// Handler invoked for each received text frame.
pub type TextHandler = Box<dyn FnMut(&str) + Send>;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Configuration for a single WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `wss://data-stream.binance.vision:443/ws/btcusdt@trade`).
    pub url: String,
    /// Frame sent immediately after each (re)connect.
    pub subscribe_msg: Option<String>,
    /// Interval between client pings.
    pub ping_interval: Option<Duration>,
    /// Label used in log lines.
    pub label: String,
}

/// A WebSocket session managed by a background tokio task.
pub struct WsConnection {
    pub config: WsConnConfig,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<tokio::task::JoinHandle<u64>>,
}

impl WsConnection {
    /// Create a new (not yet started) connection.
    pub fn new(config: WsConnConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Spawn the session task. Must be called from inside a tokio runtime.
    pub fn start(&mut self, on_text: TextHandler) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = self.config.clone();

        self.task = Some(tokio::spawn(connection_loop(config, on_text, shutdown_rx)));
        self.shutdown_tx = Some(shutdown_tx);
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the session and wait for the task. Returns the number of text
    /// frames received over the session's lifetime.
    pub async fn stop(&mut self) -> u64 {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                error!("[{}] session task failed: {e}", self.config.label);
                0
            }),
            None => 0,
        }
    }
}

/// Connect, subscribe, read, ping, reconnect, until shutdown.
async fn connection_loop(
    config: WsConnConfig,
    mut on_text: TextHandler,
    mut shutdown_rx: watch::Receiver<bool>,
) -> u64 {
    let label = config.label.as_str();
    let mut backoff = INITIAL_BACKOFF;
    let mut total_messages = 0u64;

    loop {
        if *shutdown_rx.borrow() {
            info!("[{label}] shutdown requested");
            return total_messages;
        }

        info!("[{label}] connecting to {}", config.url);

        let connected = tokio::select! {
            r = connect_ws(&config.url) => r,
            _ = shutdown_rx.changed() => return total_messages,
        };

        let ws_stream = match connected {
            Ok(s) => {
                backoff = INITIAL_BACKOFF;
                info!("[{label}] connected, listening for market data");
                s
            }
            Err(e) => {
                error!("[{label}] {e}, retrying in {backoff:?}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {},
                    _ = shutdown_rx.changed() => return total_messages,
                }
                backoff = next_backoff(backoff);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        if let Some(ref sub_msg) = config.subscribe_msg {
            debug!("[{label}] subscribing: {sub_msg}");
            if let Err(e) = ws_write.send(Message::Text(sub_msg.clone().into())).await {
                error!("[{label}] subscribe send failed: {e}");
                continue;
            }
        }

        let mut session_messages = 0u64;
        let mut ping = config
            .ping_interval
            .map(|period| tokio::time::interval_at(tokio::time::Instant::now() + period, period));

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("[{label}] shutdown signal received, {session_messages} message(s) this session");
                    let _ = ws_write.close().await;
                    return total_messages + session_messages;
                }

                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            session_messages += 1;
                            on_text(text.as_str());
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[{label}] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[{label}] read error: {e}");
                            break;
                        }
                        None => {
                            warn!("[{label}] stream ended");
                            break;
                        }
                        _ => {} // Binary, Pong, Frame
                    }
                }

                _ = async {
                    match ping.as_mut() {
                        Some(interval) => {
                            interval.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    if let Err(e) = ws_write.send(Message::Ping(Vec::new().into())).await {
                        error!("[{label}] ping send error: {e}");
                        break;
                    }
                }
            }
        }

        total_messages += session_messages;
        warn!(
            "[{label}] disconnected after {session_messages} message(s) ({total_messages} total), reconnecting in {backoff:?}"
        );
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {},
            _ = shutdown_rx.changed() => return total_messages,
        }
        backoff = next_backoff(backoff);
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect_ws(url: &str) -> Result<WsStream, FeedError> {
    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| FeedError::WebSocket(format!("connect to {url} failed: {e}")))?;
    Ok(stream)
}

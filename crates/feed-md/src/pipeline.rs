//! Trade feed pipeline: one WebSocket session, one transport, N consumers.
//!
//! # Architecture
//!
//! ```text
//! TradePipeline::new()   ──► validate config
//!               start()  ──► transport (queue | ring) + consumer threads + WS task
//!               stop()   ──► stop WS task, raise stop flag, join consumers
//! ```
//!
//! The WebSocket handler is the only producer. With the queue transport any
//! number of consumers poll concurrently; with the ring transport there is
//! exactly one reader, enforced by [`RingBuffer::split`]. Consumers poll
//! without blocking, so `stop()` always joins them after they drain.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use feed_core::{
    EventSink, EventSource, LockFreeQueue, RingBuffer, TradeEvent,
    config::{AppConfig, TransportKind},
    ws::{TextHandler, WsConnConfig, WsConnection},
};
use tracing::{debug, error, info, warn};

use crate::{
    binance,
    consumer::{self, ConsumerParams, ConsumerReport},
};

struct ConsumerHandle {
    label: String,
    join: thread::JoinHandle<ConsumerReport>,
}

/// The running feed: session, transport, and consumer threads.
pub struct TradePipeline {
    name: String,
    config: AppConfig,
    stop: Arc<AtomicBool>,
    consumers: Vec<ConsumerHandle>,
    session: Option<WsConnection>,
}

impl TradePipeline {
    /// Validate `config` and prepare a (not yet started) pipeline.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: config.module_name(),
            config,
            stop: Arc::new(AtomicBool::new(false)),
            consumers: Vec::new(),
            session: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build the transport, spawn consumers, and connect the session.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        let transport = self.config.transport.clone();

        let sink: Box<dyn EventSink<TradeEvent>> = match transport.effective_kind() {
            TransportKind::Queue => {
                let queue = Arc::new(LockFreeQueue::<TradeEvent>::new());
                for idx in 0..transport.effective_consumers() {
                    self.spawn_consumer(idx, Arc::clone(&queue), transport.idle_sleep())?;
                }
                Box::new(queue)
            }
            TransportKind::Ring => {
                let ring = RingBuffer::<TradeEvent>::with_poll_intervals(
                    transport.effective_ring_capacity(),
                    transport.write_poll(),
                    transport.read_poll(),
                )?;
                let (writer, reader) = ring.split();
                self.spawn_consumer(0, reader, transport.read_poll())?;
                Box::new(writer)
            }
        };

        let streams = self.config.feed.effective_streams();
        let (first, rest) = streams.split_first().context("no stream configured")?;
        let ws_config = WsConnConfig {
            url: binance::stream_url(&self.config.feed.effective_endpoint(), first),
            subscribe_msg: binance::build_subscribe(rest, 1),
            ping_interval: self.config.feed.ping_interval(),
            label: format!("{}-ws", self.name),
        };

        let mut session = WsConnection::new(ws_config);
        session.start(trade_handler(self.name.clone(), sink));
        self.session = Some(session);

        info!(
            "[{}] started: transport={}, {} consumer(s), streams={streams:?}",
            self.name,
            transport.effective_kind(),
            self.consumers.len()
        );
        Ok(())
    }

    /// Stop the session, then the consumers. Each consumer drains what is
    /// left in the transport before it is joined.
    pub async fn stop(&mut self) -> Vec<ConsumerReport> {
        if let Some(mut session) = self.session.take() {
            let received = session.stop().await;
            info!(
                "[{}] session closed, total messages received: {received}",
                self.name
            );
        }

        self.stop.store(true, Ordering::Release);

        let mut reports = Vec::new();
        for handle in self.consumers.drain(..) {
            match handle.join.join() {
                Ok(report) => {
                    info!("[{}] joined: {report}", handle.label);
                    reports.push(report);
                }
                Err(_) => error!("[{}] consumer thread panicked", handle.label),
            }
        }

        info!("[{}] stopped", self.name);
        reports
    }

    fn spawn_consumer<S>(&mut self, idx: usize, source: S, idle_sleep: Duration) -> Result<()>
    where
        S: EventSource<TradeEvent> + 'static,
    {
        let label = format!("{}-consumer-{idx}", self.name);
        let params = ConsumerParams {
            label: label.clone(),
            source,
            stop: Arc::clone(&self.stop),
            idle_sleep,
            cpu_core: self.config.cpu_affinity.consumer_core(idx),
        };

        let thread_label = label.clone();
        let join = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                consumer::run_consumer_loop(params, consumer::log_trade(&thread_label))
            })
            .with_context(|| format!("failed to spawn {label}"))?;

        self.consumers.push(ConsumerHandle { label, join });
        Ok(())
    }
}

/// WebSocket text handler: decode trades and publish them into `sink`.
pub fn trade_handler(label: String, mut sink: Box<dyn EventSink<TradeEvent>>) -> TextHandler {
    let mut rejected = 0u64;
    Box::new(move |text: &str| match binance::parse_trade(text) {
        Ok(Some(trade)) => sink.publish(trade),
        Ok(None) => debug!("[{label}] ignoring non-trade message: {text}"),
        Err(e) => {
            rejected += 1;
            warn!("[{label}] {e} ({rejected} rejected so far)");
        }
    })
}

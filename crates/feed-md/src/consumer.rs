//! Consumer worker loop that runs on a dedicated thread.
//!
//! Pulls [`TradeEvent`]s from an [`EventSource`], hands each one to the
//! downstream handler, and keeps running counters (events consumed and
//! exchange-to-consumer latency) that are logged periodically and returned as
//! a [`ConsumerReport`] when the loop exits.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use feed_core::{EventSource, TradeEvent, cpu_affinity, time_util};
use tracing::{debug, info};

/// Emit a progress line every this many events.
pub const SUMMARY_EVERY: u64 = 10_000;

/// Parameters for one consumer loop.
pub struct ConsumerParams<S> {
    pub label: String,
    pub source: S,
    pub stop: Arc<AtomicBool>,
    /// Sleep after an empty poll of a non-blocking source.
    pub idle_sleep: Duration,
    pub cpu_core: Option<usize>,
}

/// What a consumer saw over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConsumerReport {
    pub consumed: u64,
    pub last_trade_id: Option<u32>,
    pub min_latency_ms: Option<u64>,
    pub max_latency_ms: Option<u64>,
    pub avg_latency_ms: Option<f64>,
}

impl fmt::Display for ConsumerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumed={}", self.consumed)?;
        if let (Some(min), Some(max), Some(avg)) =
            (self.min_latency_ms, self.max_latency_ms, self.avg_latency_ms)
        {
            write!(f, " latency min={min}ms max={max}ms avg={avg:.1}ms")?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Tally {
    consumed: u64,
    last_trade_id: Option<u32>,
    latency_sum: u64,
    latency_min: Option<u64>,
    latency_max: Option<u64>,
}

impl Tally {
    #[inline]
    fn record(&mut self, trade: &TradeEvent, now_ms: u64) {
        let latency = now_ms.saturating_sub(trade.event_time_ms);
        self.consumed += 1;
        self.last_trade_id = Some(trade.trade_id);
        self.latency_sum += latency;
        self.latency_min = Some(self.latency_min.map_or(latency, |m| m.min(latency)));
        self.latency_max = Some(self.latency_max.map_or(latency, |m| m.max(latency)));
    }

    fn report(&self) -> ConsumerReport {
        ConsumerReport {
            consumed: self.consumed,
            last_trade_id: self.last_trade_id,
            min_latency_ms: self.latency_min,
            max_latency_ms: self.latency_max,
            avg_latency_ms: (self.consumed > 0)
                .then(|| self.latency_sum as f64 / self.consumed as f64),
        }
    }
}

/// Run a consumer loop on the calling thread until `stop` is raised.
///
/// After `stop`, the source is drained of whatever it still holds before
/// returning.
pub fn run_consumer_loop<S, F>(params: ConsumerParams<S>, mut on_trade: F) -> ConsumerReport
where
    S: EventSource<TradeEvent>,
    F: FnMut(&TradeEvent),
{
    let ConsumerParams {
        label,
        mut source,
        stop,
        idle_sleep,
        cpu_core,
    } = params;

    cpu_affinity::pin_current_thread(cpu_core);
    info!("[{label}] consumer loop started");

    let mut tally = Tally::default();
    let mut handle = |trade: TradeEvent, tally: &mut Tally| {
        tally.record(&trade, time_util::now_ms());
        on_trade(&trade);
        if tally.consumed % SUMMARY_EVERY == 0 {
            info!("[{label}] {}", tally.report());
        }
    };

    while !stop.load(Ordering::Acquire) {
        match source.next_event() {
            Some(trade) => handle(trade, &mut tally),
            None => thread::sleep(idle_sleep),
        }
    }

    while let Some(trade) = source.next_event() {
        handle(trade, &mut tally);
    }

    let report = tally.report();
    info!("[{label}] consumer loop exited: {report}");
    report
}

/// Default downstream handler: log each trade at debug level.
pub fn log_trade(label: &str) -> impl FnMut(&TradeEvent) + '_ {
    move |trade| debug!("[{label}] {trade}")
}

#[cfg(test)]
mod tests {
    use feed_core::{LockFreeQueue, RingBuffer};

    use super::*;

    fn trade(id: u32, event_time_ms: u64) -> TradeEvent {
        TradeEvent::new(event_time_ms, "BTCUSDT", id, "16500.50", "0.001", false)
    }

    #[test]
    fn tally_tracks_latency() {
        let mut t = Tally::default();
        t.record(&trade(1, 1_000), 1_010);
        t.record(&trade(2, 1_000), 1_030);
        t.record(&trade(3, 2_000), 1_000); // clock skew clamps to zero
        let r = t.report();
        assert_eq!(r.consumed, 3);
        assert_eq!(r.last_trade_id, Some(3));
        assert_eq!(r.min_latency_ms, Some(0));
        assert_eq!(r.max_latency_ms, Some(30));
        assert_eq!(r.avg_latency_ms, Some(40.0 / 3.0));
    }

    #[test]
    fn empty_report_display() {
        assert_eq!(ConsumerReport::default().to_string(), "consumed=0");
    }

    #[test]
    fn queue_consumer_drains_after_stop() {
        let q = Arc::new(LockFreeQueue::new());
        for id in 0..100 {
            q.enqueue(trade(id, 0));
        }

        // Stop is already raised: the loop must still drain everything.
        let stop = Arc::new(AtomicBool::new(true));
        let mut seen = Vec::new();
        let report = run_consumer_loop(
            ConsumerParams {
                label: "test".into(),
                source: Arc::clone(&q),
                stop,
                idle_sleep: Duration::from_micros(10),
                cpu_core: None,
            },
            |t| seen.push(t.trade_id),
        );

        assert_eq!(report.consumed, 100);
        assert_eq!(report.last_trade_id, Some(99));
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        assert!(q.is_empty());
    }

    #[test]
    fn queue_consumer_runs_until_stopped() {
        let q = Arc::new(LockFreeQueue::new());
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let params = ConsumerParams {
                label: "worker".into(),
                source: Arc::clone(&q),
                stop: Arc::clone(&stop),
                idle_sleep: Duration::from_micros(10),
                cpu_core: None,
            };
            thread::spawn(move || run_consumer_loop(params, |_| {}))
        };

        for id in 0..1_000 {
            q.enqueue(trade(id, time_util::now_ms()));
        }
        stop.store(true, Ordering::Release);

        let report = worker.join().unwrap();
        assert_eq!(report.consumed, 1_000);
        assert_eq!(report.last_trade_id, Some(999));
    }

    #[test]
    fn ring_consumer_drains_after_stop() {
        let (mut w, r) = RingBuffer::<TradeEvent>::new(4).unwrap().split();
        for id in 0..3 {
            w.write(trade(id, 0));
        }

        let stop = Arc::new(AtomicBool::new(true));
        let mut seen = Vec::new();
        let report = run_consumer_loop(
            ConsumerParams {
                label: "ring".into(),
                source: r,
                stop,
                idle_sleep: Duration::from_micros(10),
                cpu_core: None,
            },
            |t| seen.push(t.trade_id),
        );

        assert_eq!(report.consumed, 3);
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(w.ring().is_empty());
    }

    #[test]
    fn ring_consumer_sees_writer_order() {
        let (mut w, r) = RingBuffer::<TradeEvent>::new(4).unwrap().split();
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut ids = Vec::new();
                let params = ConsumerParams {
                    label: "ring".into(),
                    source: r,
                    stop: Arc::clone(&stop),
                    idle_sleep: Duration::ZERO,
                    cpu_core: None,
                };
                let report = run_consumer_loop(params, |t| {
                    ids.push(t.trade_id);
                    if ids.len() == 20 {
                        stop.store(true, Ordering::Release);
                    }
                });
                (report, ids)
            })
        };

        for id in 0..20 {
            w.write(trade(id, 0));
        }

        let (report, ids) = worker.join().unwrap();
        assert_eq!(report.consumed, 20);
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
    }
}

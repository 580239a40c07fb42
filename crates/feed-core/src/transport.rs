//! Producer and consumer seams over the two transports.
//!
//! The ingestion side publishes into exactly one transport and the consumer
//! workers pull from it, without either side knowing which policy (unbounded
//! lock-free vs. bounded blocking) is behind the trait object.

use std::sync::Arc;

use crate::{
    queue::LockFreeQueue,
    ring_buffer::{RingReader, RingWriter},
};

/// Producer-facing half of a transport.
pub trait EventSink<T>: Send {
    /// Hand `event` to the transport. May block if the transport applies
    /// backpressure.
    fn publish(&mut self, event: T);
}

/// Consumer-facing half of a transport.
pub trait EventSource<T>: Send {
    /// Take the next event, or `None` if nothing is available right now.
    /// Never blocks, so callers can observe a stop flag between polls.
    fn next_event(&mut self) -> Option<T>;
}

impl<T: Send> EventSink<T> for Arc<LockFreeQueue<T>> {
    #[inline]
    fn publish(&mut self, event: T) {
        self.enqueue(event);
    }
}

impl<T: Send> EventSource<T> for Arc<LockFreeQueue<T>> {
    #[inline]
    fn next_event(&mut self) -> Option<T> {
        self.try_dequeue()
    }
}

impl<T: Send> EventSink<T> for RingWriter<T> {
    #[inline]
    fn publish(&mut self, event: T) {
        self.write(event);
    }
}

impl<T: Clone + Send> EventSource<T> for RingReader<T> {
    #[inline]
    fn next_event(&mut self) -> Option<T> {
        self.try_read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ring_buffer::RingBuffer, types::TradeEvent};

    fn drain<S: EventSource<TradeEvent>>(src: &mut S, n: usize) -> Vec<u32> {
        (0..n).filter_map(|_| src.next_event()).map(|t| t.trade_id).collect()
    }

    #[test]
    fn queue_as_sink_and_source() {
        let q = Arc::new(LockFreeQueue::new());
        let mut sink: Box<dyn EventSink<TradeEvent>> = Box::new(Arc::clone(&q));
        for id in 0..3 {
            sink.publish(TradeEvent::new(0, "BTCUSDT", id, "1", "1", false));
        }

        let mut src = Arc::clone(&q);
        assert_eq!(drain(&mut src, 3), vec![0, 1, 2]);
        assert!(src.next_event().is_none());
    }

    #[test]
    fn ring_as_sink_and_source() {
        let (w, mut r) = RingBuffer::<TradeEvent>::new(4).unwrap().split();
        let mut sink: Box<dyn EventSink<TradeEvent>> = Box::new(w);
        assert!(r.next_event().is_none());

        for id in 0..3 {
            sink.publish(TradeEvent::new(0, "ETHUSDT", id, "1", "1", true));
        }
        assert_eq!(drain(&mut r, 10), vec![0, 1, 2]);

        sink.publish(TradeEvent::new(0, "ETHUSDT", 3, "1", "1", true));
        assert_eq!(drain(&mut r, 10), vec![3]);
        assert!(r.next_event().is_none());
    }
}

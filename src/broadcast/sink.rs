//! Subscriber sink abstraction.
//!
//! A sink is the write side of one subscriber's live connection. The hub
//! only requires that pushes return immediately: a sink either takes the
//! record now or fails, and a failed push is treated as a disconnect.

use crossbeam_channel::{Sender, TrySendError};
use thiserror::Error;

use crate::record::StreamRecord;

/// Failure pushing a record into a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink buffer is full")]
    Full,

    #[error("sink is closed")]
    Closed,
}

/// Write side of a subscriber connection.
pub trait RecordSink: Send + Sync {
    /// Delivers one record without blocking.
    ///
    /// Any error unsubscribes the owning subscriber; there is no retry
    /// queue for slow consumers.
    fn push(&self, record: StreamRecord) -> Result<(), SinkError>;

    /// Releases resources held by the sink. Invoked when the subscriber
    /// is removed from the hub.
    fn close(&self) {}
}

/// Sink backed by a bounded crossbeam channel.
///
/// This is what [`subscribe_stream`] wires up: the sending half lives in
/// the hub, the receiving half inside the returned stream handle. A full
/// channel means the consumer is not keeping up and reads as a failed
/// push.
///
/// [`subscribe_stream`]: super::BroadcastHub::subscribe_stream
pub struct ChannelSink {
    tx: Sender<StreamRecord>,
}

impl ChannelSink {
    /// Wraps the sending half of a record channel.
    #[must_use]
    pub const fn new(tx: Sender<StreamRecord>) -> Self {
        Self { tx }
    }
}

impl RecordSink for ChannelSink {
    fn push(&self, record: StreamRecord) -> Result<(), SinkError> {
        self.tx.try_send(record).map_err(|err| match err {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Disconnected(_) => SinkError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_record;
    use crate::record::StreamRecord;
    use crossbeam_channel::bounded;

    fn stream_record() -> StreamRecord {
        StreamRecord::new(sample_record("s1", "metric.sampled"), None)
    }

    #[test]
    fn test_channel_sink_delivers_until_full() {
        let (tx, rx) = bounded(1);
        let sink = ChannelSink::new(tx);

        assert_eq!(sink.push(stream_record()), Ok(()));
        assert_eq!(sink.push(stream_record()), Err(SinkError::Full));

        drop(rx.recv().unwrap());
        assert_eq!(sink.push(stream_record()), Ok(()));
    }

    #[test]
    fn test_channel_sink_reports_closed_receiver() {
        let (tx, rx) = bounded(1);
        let sink = ChannelSink::new(tx);
        drop(rx);

        assert_eq!(sink.push(stream_record()), Err(SinkError::Closed));
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::{StreamError, TelemetryError, TelemetryResult};
use crate::record::StreamRecord;

use super::hub::{ControlMsg, SubscriberId};

/// Receiving handle for a channel-backed subscription.
///
/// Dropping the stream attempts best-effort unsubscription; the hub also
/// reaps the subscriber on its next failed push once the receiving half
/// is gone.
#[derive(Debug)]
pub struct RecordStream {
    subscriber_id: SubscriberId,
    rx: Receiver<StreamRecord>,
    control_tx: Sender<ControlMsg>,
    unsubscribed: AtomicBool,
}

impl RecordStream {
    pub(crate) fn new(
        subscriber_id: SubscriberId,
        rx: Receiver<StreamRecord>,
        control_tx: Sender<ControlMsg>,
    ) -> Self {
        Self {
            subscriber_id,
            rx,
            control_tx,
            unsubscribed: AtomicBool::new(false),
        }
    }

    /// The subscriber id backing this stream.
    #[must_use]
    pub const fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    /// Best-effort explicit unsubscription.
    ///
    /// Non-blocking and idempotent. The hub removes the subscriber on the
    /// sweeper side; for synchronous removal use
    /// [`BroadcastHub::unsubscribe`](super::BroadcastHub::unsubscribe).
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.control_tx.try_send(ControlMsg::Unsubscribe {
            subscriber_id: self.subscriber_id,
        });
    }

    /// Receives the next record (blocking).
    pub fn recv(&self) -> TelemetryResult<StreamRecord> {
        self.rx
            .recv()
            .map_err(|_| TelemetryError::Stream(StreamError::Disconnected))
    }

    /// Receives the next record with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> TelemetryResult<StreamRecord> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => TelemetryError::Stream(StreamError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }),
            RecvTimeoutError::Disconnected => TelemetryError::Stream(StreamError::Disconnected),
        })
    }

    /// Receives a record if one is already buffered.
    pub fn try_recv(&self) -> Option<StreamRecord> {
        self.rx.try_recv().ok()
    }
}

impl Drop for RecordStream {
    fn drop(&mut self) {
        // Best-effort: do not block during teardown.
        if !self.unsubscribed.swap(true, Ordering::AcqRel) {
            let _ = self.control_tx.try_send(ControlMsg::Unsubscribe {
                subscriber_id: self.subscriber_id,
            });
        }
    }
}

//! Broadcast hub: subscriber registry, fan-out and the stale sweeper.
//!
//! The hub keeps live subscribers behind a read-write lock and publishes
//! by snapshotting the current registry, so subscribe and unsubscribe are
//! always safe against a concurrent publish. Pushes never block: a full
//! or closed sink is treated as a disconnect and the subscriber is
//! removed on the spot. A dedicated sweeper thread reaps subscribers
//! whose sinks have been idle beyond the configured timeout.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StreamError, TelemetryError, TelemetryResult};
use crate::record::StreamRecord;

use super::filter::RecordFilter;
use super::sink::{ChannelSink, RecordSink};
use super::stream::RecordStream;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    /// Creates a new random subscriber id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for a [`BroadcastHub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Records retained in the shared recent buffer. Default 1000.
    pub recent_capacity: usize,
    /// Channel capacity for streams created by `subscribe_stream`.
    /// Default 256.
    pub stream_capacity: usize,
    /// Idle time after which the sweeper reaps a subscriber. Default 60s.
    pub idle_timeout: Duration,
    /// Interval between stale sweeps. Default 30s.
    pub sweep_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 1000,
            stream_capacity: 256,
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Per-subscriber counters exposed by [`HubStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberStats {
    /// Subscriber id.
    pub subscriber_id: SubscriberId,
    /// When the subscriber registered.
    pub subscribed_at: DateTime<Utc>,
    /// Last successful push (or registration, whichever is later).
    pub last_push: DateTime<Utc>,
    /// Records successfully pushed.
    pub pushed: u64,
    /// Filter the subscriber registered with.
    pub filter: Option<RecordFilter>,
}

/// Operational counters for a [`BroadcastHub`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubStats {
    /// Records accepted for broadcast since the hub was created.
    pub total_published: u64,
    /// Pushes that failed and cost a subscriber its registration.
    pub dropped_pushes: u64,
    /// Records currently held in the recent buffer.
    pub buffered: usize,
    /// Live subscribers.
    pub subscriber_count: usize,
    /// Per-subscriber breakdown, oldest registration first.
    pub subscribers: Vec<SubscriberStats>,
}

pub(crate) enum ControlMsg {
    Unsubscribe { subscriber_id: SubscriberId },
    Shutdown,
}

struct SubscriberEntry {
    sink: Box<dyn RecordSink>,
    filter: Option<RecordFilter>,
    subscribed_at: DateTime<Utc>,
    last_push_ms: AtomicI64,
    pushed: AtomicU64,
}

struct HubInner {
    config: HubConfig,
    subscribers: RwLock<HashMap<SubscriberId, Arc<SubscriberEntry>>>,
    recent: Mutex<VecDeque<StreamRecord>>,
    published: AtomicU64,
    dropped_pushes: AtomicU64,
    closed: AtomicBool,
}

fn lock_err(context: &'static str) -> TelemetryError {
    TelemetryError::internal(format!("lock poisoned in {context}"))
}

impl HubInner {
    fn remove(&self, subscriber_id: SubscriberId) -> TelemetryResult<bool> {
        let removed = {
            let mut subscribers = self.subscribers.write().map_err(|_| lock_err("hub remove"))?;
            subscribers.remove(&subscriber_id)
        };
        match removed {
            Some(entry) => {
                entry.sink.close();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn cleanup_stale(&self, idle_timeout: Duration) -> TelemetryResult<usize> {
        let now_ms = Utc::now().timestamp_millis();
        let idle_ms = i64::try_from(idle_timeout.as_millis()).unwrap_or(i64::MAX);

        let stale: Vec<SubscriberId> = {
            let subscribers = self.subscribers.read().map_err(|_| lock_err("hub sweep"))?;
            subscribers
                .iter()
                .filter(|(_, entry)| {
                    now_ms.saturating_sub(entry.last_push_ms.load(Ordering::Relaxed)) > idle_ms
                })
                .map(|(id, _)| *id)
                .collect()
        };

        let mut removed = 0;
        for subscriber_id in stale {
            if self.remove(subscriber_id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Fan-out hub distributing broadcast records to live subscribers.
pub struct BroadcastHub {
    inner: Arc<HubInner>,
    control_tx: Sender<ControlMsg>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl BroadcastHub {
    /// Creates a hub and starts its sweeper thread.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let inner = Arc::new(HubInner {
            config,
            subscribers: RwLock::new(HashMap::new()),
            recent: Mutex::new(VecDeque::new()),
            published: AtomicU64::new(0),
            dropped_pushes: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        let (control_tx, control_rx) = bounded::<ControlMsg>(1024);
        let sweeper_inner = Arc::clone(&inner);
        let sweeper = thread::Builder::new()
            .name("signalhub-sweeper".to_string())
            .spawn(move || sweeper_loop(&sweeper_inner, &control_rx))
            .expect("failed to spawn signalhub sweeper");

        Self {
            inner,
            control_tx,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Configuration of this hub.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Registers a subscriber with its sink and optional filter.
    ///
    /// Fails with [`StreamError::DuplicateSubscriber`] if the id is
    /// already live, and [`StreamError::HubClosed`] after `close`. No
    /// history is replayed; delivery starts with the next publish.
    pub fn subscribe(
        &self,
        subscriber_id: SubscriberId,
        sink: Box<dyn RecordSink>,
        filter: Option<RecordFilter>,
    ) -> TelemetryResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TelemetryError::Stream(StreamError::HubClosed));
        }

        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .map_err(|_| lock_err("hub subscribe"))?;
        if subscribers.contains_key(&subscriber_id) {
            return Err(TelemetryError::Stream(StreamError::DuplicateSubscriber {
                subscriber_id,
            }));
        }

        let now = Utc::now();
        subscribers.insert(
            subscriber_id,
            Arc::new(SubscriberEntry {
                sink,
                filter,
                subscribed_at: now,
                last_push_ms: AtomicI64::new(now.timestamp_millis()),
                pushed: AtomicU64::new(0),
            }),
        );
        Ok(())
    }

    /// Registers a channel-backed subscriber and returns its stream.
    pub fn subscribe_stream(&self, filter: Option<RecordFilter>) -> TelemetryResult<RecordStream> {
        let subscriber_id = SubscriberId::new();
        let (tx, rx) = bounded(self.inner.config.stream_capacity.max(1));
        self.subscribe(subscriber_id, Box::new(ChannelSink::new(tx)), filter)?;
        Ok(RecordStream::new(subscriber_id, rx, self.control_tx.clone()))
    }

    /// Removes a subscriber and closes its sink.
    ///
    /// Idempotent: returns `false` when the id is not (or no longer)
    /// registered.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) -> TelemetryResult<bool> {
        self.inner.remove(subscriber_id)
    }

    /// Publishes a record to every subscriber whose filter matches.
    ///
    /// The record lands in the recent buffer first, then each subscriber
    /// in a registry snapshot gets a non-blocking push. Subscribers whose
    /// push fails are unsubscribed; slow consumers lose records rather
    /// than stalling the producer. Returns the number of successful
    /// pushes. Publishing on a closed hub is a no-op.
    pub fn publish(&self, record: &StreamRecord) -> TelemetryResult<usize> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Ok(0);
        }

        {
            let mut recent = self.inner.recent.lock().map_err(|_| lock_err("hub publish"))?;
            recent.push_back(record.clone());
            while recent.len() > self.inner.config.recent_capacity.max(1) {
                recent.pop_front();
            }
        }
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        let snapshot: Vec<(SubscriberId, Arc<SubscriberEntry>)> = {
            let subscribers = self
                .inner
                .subscribers
                .read()
                .map_err(|_| lock_err("hub publish"))?;
            subscribers
                .iter()
                .map(|(id, entry)| (*id, Arc::clone(entry)))
                .collect()
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (subscriber_id, entry) in snapshot {
            if entry.filter.as_ref().is_some_and(|f| !f.matches(record)) {
                continue;
            }
            match entry.sink.push(record.clone()) {
                Ok(()) => {
                    delivered += 1;
                    entry.pushed.fetch_add(1, Ordering::Relaxed);
                    entry
                        .last_push_ms
                        .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
                }
                Err(_) => {
                    // A failed push is a disconnect signal, not a retry queue.
                    self.inner.dropped_pushes.fetch_add(1, Ordering::Relaxed);
                    failed.push(subscriber_id);
                }
            }
        }

        for subscriber_id in failed {
            self.inner.remove(subscriber_id)?;
        }

        Ok(delivered)
    }

    /// Refreshes a subscriber's idle clock without delivering a record.
    ///
    /// Transports call this when they send a keepalive, so a healthy
    /// subscriber whose filter has not matched anything survives the
    /// stale sweep. Returns `false` for unknown ids.
    pub fn touch(&self, subscriber_id: SubscriberId) -> TelemetryResult<bool> {
        let subscribers = self
            .inner
            .subscribers
            .read()
            .map_err(|_| lock_err("hub touch"))?;
        match subscribers.get(&subscriber_id) {
            Some(entry) => {
                entry
                    .last_push_ms
                    .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns recent broadcast records, newest first, optionally
    /// filtered.
    pub fn recent_records(
        &self,
        filter: Option<&RecordFilter>,
        limit: usize,
    ) -> TelemetryResult<Vec<StreamRecord>> {
        let recent = self.inner.recent.lock().map_err(|_| lock_err("hub recent"))?;
        Ok(recent
            .iter()
            .rev()
            .filter(|record| filter.map_or(true, |f| f.matches(record)))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Removes subscribers idle beyond `idle_timeout` and returns how
    /// many were reaped. The sweeper calls this on every tick with the
    /// configured timeout.
    pub fn cleanup_stale(&self, idle_timeout: Duration) -> TelemetryResult<usize> {
        self.inner.cleanup_stale(idle_timeout)
    }

    /// Operational counters for this hub.
    pub fn stats(&self) -> TelemetryResult<HubStats> {
        let subscribers = self
            .inner
            .subscribers
            .read()
            .map_err(|_| lock_err("hub stats"))?;
        let mut per_subscriber: Vec<SubscriberStats> = subscribers
            .iter()
            .map(|(id, entry)| SubscriberStats {
                subscriber_id: *id,
                subscribed_at: entry.subscribed_at,
                last_push: DateTime::from_timestamp_millis(
                    entry.last_push_ms.load(Ordering::Relaxed),
                )
                .unwrap_or(entry.subscribed_at),
                pushed: entry.pushed.load(Ordering::Relaxed),
                filter: entry.filter.clone(),
            })
            .collect();
        per_subscriber.sort_by_key(|s| s.subscribed_at);

        let buffered = self.inner.recent.lock().map_err(|_| lock_err("hub stats"))?.len();

        Ok(HubStats {
            total_published: self.inner.published.load(Ordering::Relaxed),
            dropped_pushes: self.inner.dropped_pushes.load(Ordering::Relaxed),
            buffered,
            subscriber_count: per_subscriber.len(),
            subscribers: per_subscriber,
        })
    }

    /// Shuts the hub down: stops the sweeper, removes every subscriber
    /// and closes their sinks. Idempotent; publishing afterwards is a
    /// no-op and subscribing fails with [`StreamError::HubClosed`].
    pub fn close(&self) -> TelemetryResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Wake the sweeper so it exits promptly, then wait for it. The
        // send only fails if the sweeper is already gone.
        let _ = self.control_tx.send(ControlMsg::Shutdown);
        if let Some(handle) = self.sweeper.lock().map_err(|_| lock_err("hub close"))?.take() {
            let _ = handle.join();
        }

        let drained: Vec<Arc<SubscriberEntry>> = {
            let mut subscribers = self
                .inner
                .subscribers
                .write()
                .map_err(|_| lock_err("hub close"))?;
            subscribers.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            entry.sink.close();
        }
        Ok(())
    }

    /// True once `close` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Drop for BroadcastHub {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn sweeper_loop(inner: &Arc<HubInner>, control_rx: &Receiver<ControlMsg>) {
    loop {
        select! {
            recv(control_rx) -> msg => {
                match msg {
                    Ok(ControlMsg::Unsubscribe { subscriber_id }) => {
                        let _ = inner.remove(subscriber_id);
                    }
                    Ok(ControlMsg::Shutdown) | Err(_) => break,
                }
            }
            default(inner.config.sweep_interval) => {
                // Periodic reap of subscribers nothing has written to.
                let _ = inner.cleanup_stale(inner.config.idle_timeout);
            }
        }
    }
}

//! Live broadcast of emitted records to interested subscribers.
//!
//! The [`BroadcastHub`] owns the subscriber registry and a bounded
//! buffer of recent broadcasts. Subscribers are sinks behind the
//! [`RecordSink`] trait; [`subscribe_stream`](BroadcastHub::subscribe_stream)
//! wraps a bounded channel in a [`RecordStream`] handle for pull-style
//! consumers. Filters narrow delivery per subscriber, and a sweeper
//! thread reaps subscribers that have gone quiet.

/// Subscriber filtering.
mod filter;
/// The hub itself: registry, fan-out, sweeper.
mod hub;
/// Sink abstraction and the channel-backed implementation.
mod sink;
/// Pull-style stream handle over a subscribed channel.
mod stream;

pub use filter::RecordFilter;
pub use hub::{BroadcastHub, HubConfig, HubStats, SubscriberId, SubscriberStats};
pub use sink::{ChannelSink, RecordSink, SinkError};
pub use stream::RecordStream;

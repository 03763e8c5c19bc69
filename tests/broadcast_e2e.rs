use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use signalhub::{
    BroadcastHub, EventReport, HubConfig, OutcomeKind, PermissiveCatalog, Priority, RecordFilter,
    RecordSink, SignalDescriptor, SinkError, StateStore, StaticCatalog, StreamError,
    StreamRecord, SubscriberId, TelemetryEngine,
};

struct FailingSink;

impl RecordSink for FailingSink {
    fn push(&self, _record: StreamRecord) -> Result<(), SinkError> {
        Err(SinkError::Closed)
    }
}

fn engine_with_hub(hub: BroadcastHub) -> TelemetryEngine {
    let catalog = StaticCatalog::new()
        .with_signal(
            "detection.confirmed",
            SignalDescriptor::glyph("🔎")
                .with_category("detection")
                .with_priority(Priority::High),
            &[],
        )
        .with_signal("metric.sampled", SignalDescriptor::glyph("📈"), &[]);
    TelemetryEngine::new(Arc::new(StateStore::new()), Arc::new(hub), Arc::new(catalog))
}

fn engine() -> TelemetryEngine {
    engine_with_hub(BroadcastHub::new(HubConfig {
        sweep_interval: Duration::from_secs(3600),
        ..HubConfig::default()
    }))
}

fn detection(confidence: f32) -> EventReport {
    EventReport::builder()
        .source_id("detector")
        .source_name("Detector")
        .record_type("detection.confirmed")
        .outcome(OutcomeKind::Triggered)
        .payload(json!({"score": confidence}))
        .confidence(confidence)
        .build()
        .unwrap()
}

#[test]
fn filters_route_records_to_the_right_subscribers() {
    let engine = engine();

    let matching = engine
        .subscribe_stream(Some(
            RecordFilter::any()
                .with_min_confidence(0.9)
                .with_category("detection"),
        ))
        .unwrap();
    let critical_only = engine
        .subscribe_stream(Some(RecordFilter::any().with_priority(Priority::Critical)))
        .unwrap();

    engine.report(detection(0.95)).unwrap();

    let received = matching.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(received.record.confidence, Some(0.95));
    assert!(matching.try_recv().is_none());

    // High priority does not satisfy a critical-only filter.
    assert!(critical_only.try_recv().is_none());

    // A low-confidence emission reaches neither.
    engine.report(detection(0.5)).unwrap();
    assert!(matching.try_recv().is_none());
    assert!(critical_only.try_recv().is_none());
}

#[test]
fn failing_sink_is_isolated_from_healthy_subscribers() {
    let engine = engine();

    let failing_id = SubscriberId::new();
    engine
        .subscribe(failing_id, Box::new(FailingSink), None)
        .unwrap();
    let healthy = engine.subscribe_stream(None).unwrap();
    assert_eq!(engine.hub_stats().unwrap().subscriber_count, 2);

    // The report itself must not error.
    let outcome = engine.report(detection(0.95)).unwrap();
    assert!(outcome.is_accepted());

    let received = healthy.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(received.record.record_type, "detection.confirmed");

    let stats = engine.hub_stats().unwrap();
    assert_eq!(stats.subscriber_count, 1);
    assert_eq!(stats.dropped_pushes, 1);
    assert_eq!(stats.subscribers[0].subscriber_id, healthy.subscriber_id());
    assert_eq!(stats.subscribers[0].pushed, 1);
}

#[test]
fn unsubscribe_releases_the_stream_synchronously() {
    let engine = engine();
    let stream = engine.subscribe_stream(None).unwrap();
    let id = stream.subscriber_id();

    assert!(engine.unsubscribe(id).unwrap());
    assert!(!engine.unsubscribe(id).unwrap());

    let err = stream.recv_timeout(Duration::from_millis(50)).unwrap_err();
    assert_eq!(err, StreamError::Disconnected.into());

    // Later publishes are unaffected.
    engine.report(detection(0.95)).unwrap();
    assert_eq!(engine.recent_records(None, 10).unwrap().len(), 1);
}

#[test]
fn dropped_stream_is_reaped_by_the_sweeper() {
    let engine = engine_with_hub(BroadcastHub::new(HubConfig {
        sweep_interval: Duration::from_millis(10),
        ..HubConfig::default()
    }));

    let stream = engine.subscribe_stream(None).unwrap();
    let id = stream.subscriber_id();
    drop(stream);

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        let stats = engine.hub_stats().unwrap();
        if !stats.subscribers.iter().any(|s| s.subscriber_id == id) {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "dropped stream was never unsubscribed"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn stale_subscribers_are_swept_while_touched_ones_survive() {
    let engine = engine_with_hub(BroadcastHub::new(HubConfig {
        idle_timeout: Duration::from_millis(150),
        sweep_interval: Duration::from_millis(25),
        ..HubConfig::default()
    }));

    let stale = engine.subscribe_stream(None).unwrap();
    let kept = engine.subscribe_stream(None).unwrap();
    let kept_id = kept.subscriber_id();

    // Keep one subscriber fresh the way a transport keepalive would.
    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    loop {
        engine.hub().touch(kept_id).unwrap();
        let stats = engine.hub_stats().unwrap();
        if stats.subscriber_count == 1 {
            assert_eq!(stats.subscribers[0].subscriber_id, kept_id);
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "stale subscriber was never swept"
        );
        std::thread::sleep(Duration::from_millis(20));
    }
    drop(stale);
    drop(kept);
}

#[test]
fn slow_consumer_is_disconnected_but_history_survives() {
    let engine = engine_with_hub(BroadcastHub::new(HubConfig {
        stream_capacity: 2,
        sweep_interval: Duration::from_secs(3600),
        ..HubConfig::default()
    }));

    let stream = engine.subscribe_stream(None).unwrap();
    for _ in 0..5 {
        engine.report(detection(0.95)).unwrap();
    }

    // Two buffered pushes, then the third failure dropped the subscriber.
    let stats = engine.hub_stats().unwrap();
    assert_eq!(stats.subscriber_count, 0);
    assert_eq!(stats.dropped_pushes, 1);
    assert_eq!(stats.total_published, 5);

    stream.recv_timeout(Duration::from_secs(1)).unwrap();
    stream.recv_timeout(Duration::from_secs(1)).unwrap();
    let err = stream.recv_timeout(Duration::from_millis(50)).unwrap_err();
    assert_eq!(err, StreamError::Disconnected.into());

    // The shared buffer is independent of subscriber state.
    assert_eq!(engine.recent_records(None, 10).unwrap().len(), 5);
}

#[test]
fn recent_records_filter_by_source_name() {
    let engine = engine();

    engine.report(detection(0.95)).unwrap();
    engine
        .report(
            EventReport::builder()
                .source_id("sampler")
                .source_name("Sampler")
                .record_type("metric.sampled")
                .outcome(OutcomeKind::Triggered)
                .payload(json!({}))
                .build()
                .unwrap(),
        )
        .unwrap();

    let all = engine.recent_records(None, 10).unwrap();
    assert_eq!(all.len(), 2);
    // Newest first.
    assert_eq!(all[0].record.source_name, "Sampler");

    let filtered = engine
        .recent_records(Some(&RecordFilter::any().with_source_name("Sampler")), 10)
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].record.record_type, "metric.sampled");
}

#[test]
fn close_disconnects_streams_and_rejects_new_subscribers() {
    let engine = engine();
    let stream = engine.subscribe_stream(None).unwrap();

    engine.close().unwrap();

    let err = stream.recv_timeout(Duration::from_millis(50)).unwrap_err();
    assert_eq!(err, StreamError::Disconnected.into());

    let err = engine.subscribe_stream(None).unwrap_err();
    assert_eq!(err, StreamError::HubClosed.into());

    // Publishing is a silent no-op after close.
    let outcome = engine.report(detection(0.95)).unwrap();
    assert!(outcome.is_accepted());
    assert_eq!(engine.hub_stats().unwrap().total_published, 0);
}

#[test]
fn publish_order_is_preserved_per_subscriber() {
    let engine = TelemetryEngine::new(
        Arc::new(StateStore::new()),
        Arc::new(BroadcastHub::new(HubConfig {
            sweep_interval: Duration::from_secs(3600),
            ..HubConfig::default()
        })),
        Arc::new(PermissiveCatalog),
    );
    let stream = engine.subscribe_stream(None).unwrap();

    for n in 0..10 {
        engine
            .report(
                EventReport::builder()
                    .source_id("s1")
                    .source_name("s1-name")
                    .record_type("metric.sampled")
                    .outcome(OutcomeKind::Triggered)
                    .payload(json!({"seq": n}))
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }

    for n in 0..10 {
        let record = stream.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(record.record.payload["seq"], n);
    }
}

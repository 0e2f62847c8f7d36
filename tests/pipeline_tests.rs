//! End-to-end pipeline scenarios through the dry-run sink.
//!
//! These drive `EventPipeline` the way the watcher does and assert on the
//! NDJSON records the dry-run sink produces.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;

use kube_sentry_events::config::{default_event_reasons, default_event_thresholds};
use kube_sentry_events::dedup::Deduplicator;
use kube_sentry_events::filter::EventFilter;
use kube_sentry_events::sink::DryRunSink;
use kube_sentry_events::watcher::EventPipeline;

// =============================================================================
// Harness
// =============================================================================

/// Writer handle that lets assertions read what the sink produced.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn records(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

/// Pipeline with the default filter configuration (all namespaces except
/// kube-system, default reasons and thresholds) over a dry-run sink.
fn default_pipeline(window: Duration) -> (EventPipeline, Deduplicator, SharedBuf) {
    let buf = SharedBuf::default();
    let filter = EventFilter::new(
        &[],
        &["kube-system".to_string()],
        &default_event_reasons(),
        default_event_thresholds(),
    );
    let dedup = Deduplicator::new(window);
    let pipeline = EventPipeline::new(filter, dedup.clone(), Arc::new(DryRunSink::new(buf.clone())));
    (pipeline, dedup, buf)
}

fn warning_event(namespace: &str, pod: &str, reason: &str, count: i32) -> Event {
    Event {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        involved_object: ObjectReference {
            namespace: Some(namespace.to_string()),
            name: Some(pod.to_string()),
            kind: Some("Pod".to_string()),
            ..Default::default()
        },
        source: Some(EventSource {
            host: Some("node-1".to_string()),
            ..Default::default()
        }),
        reason: Some(reason.to_string()),
        message: Some(format!("{reason} on {pod}")),
        type_: Some("Warning".to_string()),
        count: Some(count),
        ..Default::default()
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn oomkilled_first_occurrence_creates_log_and_issue() {
    let (pipeline, _, buf) = default_pipeline(Duration::minutes(5));

    let event = warning_event("production", "worker-79c6dd4b57-wcdzt", "OOMKilled", 1);
    assert!(pipeline.process(&event).await);

    let records = buf.records();
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record["mode"], "log + issue");
    assert_eq!(record["meets_threshold"], true);
    assert_eq!(record["severity"], "error");
    assert_eq!(record["tags"]["k8s.deployment"], "worker");
    assert_eq!(
        record["fingerprint"],
        serde_json::json!(["k8s", "production", "worker", "OOMKilled"])
    );
}

#[tokio::test]
async fn unhealthy_below_threshold_logs_only() {
    let (pipeline, _, buf) = default_pipeline(Duration::minutes(5));

    let event = warning_event("production", "worker-79c6dd4b57-wcdzt", "Unhealthy", 3);
    assert!(pipeline.process(&event).await);

    let records = buf.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["mode"], "log only");
    assert_eq!(records[0]["meets_threshold"], false);
}

#[tokio::test]
async fn at_threshold_then_duplicate_is_suppressed() {
    let (pipeline, _, buf) = default_pipeline(Duration::minutes(5));

    let first = warning_event("production", "worker-79c6dd4b57-wcdzt", "Unhealthy", 5);
    assert!(pipeline.process(&first).await);

    // Same deployment again within the window: threshold is met but the
    // incident is already open.
    let second = warning_event("production", "worker-79c6dd4b57-wcdzt", "Unhealthy", 6);
    assert!(pipeline.process(&second).await);

    let records = buf.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["mode"], "log + issue");
    assert_eq!(records[1]["mode"], "log only");
    assert_eq!(records[1]["extra"]["count"], 2);
}

#[tokio::test]
async fn excluded_namespace_produces_nothing() {
    let (pipeline, dedup, buf) = default_pipeline(Duration::minutes(5));

    let event = warning_event("kube-system", "kube-proxy-abc12", "OOMKilled", 1);
    assert!(!pipeline.process(&event).await);

    assert!(buf.records().is_empty());
    // Dropped events never occupy a dedup slot.
    assert_eq!(dedup.size().await, 0);
}

#[tokio::test]
async fn normal_events_are_dropped_by_the_type_gate() {
    let (pipeline, dedup, buf) = default_pipeline(Duration::minutes(5));

    let mut event = warning_event("production", "worker-79c6dd4b57-wcdzt", "OOMKilled", 1);
    event.type_ = Some("Normal".to_string());
    assert!(!pipeline.process(&event).await);

    assert!(buf.records().is_empty());
    assert_eq!(dedup.size().await, 0);
}

#[tokio::test]
async fn rollout_replicas_share_one_incident() {
    let (pipeline, _, buf) = default_pipeline(Duration::minutes(5));

    // Two pods of the same deployment, different replicaset hashes.
    let first = warning_event("production", "worker-79c6dd4b57-wcdzt", "OOMKilled", 1);
    let second = warning_event("production", "worker-abc1234567-qqq12", "OOMKilled", 1);
    assert!(pipeline.process(&first).await);
    assert!(pipeline.process(&second).await);

    let records = buf.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["mode"], "log + issue");
    assert_eq!(records[1]["mode"], "log only");
    assert_eq!(records[0]["fingerprint"], records[1]["fingerprint"]);
    assert_eq!(
        records[0]["fingerprint"],
        serde_json::json!(["k8s", "production", "worker", "OOMKilled"])
    );
}

#[tokio::test]
async fn sub_threshold_sightings_occupy_the_dedup_slot() {
    // Preserved source behavior: a below-threshold event claims the dedup
    // entry, so the first at-threshold sighting inside the same window is
    // no longer "new" and does not open an issue.
    let (pipeline, _, buf) = default_pipeline(Duration::minutes(5));

    let below = warning_event("production", "worker-79c6dd4b57-wcdzt", "Unhealthy", 3);
    let at = warning_event("production", "worker-79c6dd4b57-wcdzt", "Unhealthy", 5);
    assert!(pipeline.process(&below).await);
    assert!(pipeline.process(&at).await);

    let records = buf.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["mode"], "log only");
    assert_eq!(records[1]["mode"], "log only");
}

#[tokio::test]
async fn incident_reopens_after_a_quiet_window() {
    let (pipeline, _, buf) = default_pipeline(Duration::milliseconds(20));

    let event = warning_event("production", "worker-79c6dd4b57-wcdzt", "OOMKilled", 1);
    assert!(pipeline.process(&event).await);

    tokio::time::sleep(std::time::Duration::from_millis(40)).await;
    assert!(pipeline.process(&event).await);

    let records = buf.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["mode"], "log + issue");
    assert_eq!(records[1]["mode"], "log + issue");
    assert_eq!(records[1]["extra"]["count"], 1);
}

#[tokio::test]
async fn stateful_pods_keep_their_own_identity() {
    let (pipeline, _, buf) = default_pipeline(Duration::minutes(5));

    // "redis-0" does not look like a deployment pod; it must not group
    // with anything else.
    let event = warning_event("production", "redis-0", "OOMKilled", 1);
    assert!(pipeline.process(&event).await);

    let records = buf.records();
    assert_eq!(records[0]["tags"]["k8s.deployment"], "redis-0");
    assert_eq!(
        records[0]["fingerprint"],
        serde_json::json!(["k8s", "production", "redis-0", "OOMKilled"])
    );
}

//! Emission sinks: where accepted events go.
//!
//! The watcher produces one [`EventRecord`] per accepted event and hands it
//! to an [`EventSink`]. Two implementations exist: [`SentrySink`] for the
//! real transport and [`DryRunSink`] for local inspection.

mod dry_run;
mod sentry;

pub use dry_run::DryRunSink;
pub use self::sentry::{SentrySink, SinkError, LOG_TARGET};

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Event;

use crate::filter::Severity;

/// A fully classified event, ready for emission.
pub struct EventRecord<'a> {
    pub event: &'a Event,
    pub severity: Severity,
    /// Dedup-cache sighting count for this incident.
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// True only when the event met its threshold AND the dedup cache
    /// reported a fresh incident.
    pub create_issue: bool,
}

/// Destination for emission decisions.
///
/// Implementations absorb transport failures; delivery guarantees are
/// whatever the transport provides plus the final [`flush`](Self::flush).
pub trait EventSink: Send + Sync {
    /// Emit the record. Fire-and-forget.
    fn send(&self, record: &EventRecord<'_>);

    /// Block until buffered records are delivered or the timeout elapses.
    /// Returns false when records may have been dropped.
    fn flush(&self, timeout: Duration) -> bool;
}

/// Namespace of the involved object, falling back to the event's own
/// metadata namespace.
#[must_use]
pub fn effective_namespace(event: &Event) -> &str {
    event
        .involved_object
        .namespace
        .as_deref()
        .filter(|namespace| !namespace.is_empty())
        .or(event.metadata.namespace.as_deref())
        .unwrap_or_default()
}

/// Derive the deployment name from a pod name.
///
/// Replicated pods are named `<deployment>-<replicaset hash>-<pod hash>`;
/// when the trailing two segments look like those hashes the prefix is the
/// deployment. Anything else (bare names, statefulset ordinals like
/// `redis-0`) is returned unchanged: not grouping is safer than grouping
/// unrelated apps together.
#[must_use]
pub fn deployment_name(pod_name: &str) -> &str {
    let parts: Vec<&str> = pod_name.split('-').collect();
    if parts.len() < 3 {
        return pod_name;
    }

    let pod_hash = parts[parts.len() - 1];
    let rs_hash = parts[parts.len() - 2];

    // Pod hash is short, replicaset hash is typically 9-10 characters.
    if pod_hash.len() <= 6
        && (5..=12).contains(&rs_hash.len())
        && is_lower_alphanumeric(pod_hash)
        && is_lower_alphanumeric(rs_hash)
    {
        let keep = pod_name.len() - pod_hash.len() - rs_hash.len() - 2;
        return &pod_name[..keep];
    }

    pod_name
}

fn is_lower_alphanumeric(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Grouping fingerprint for the backend: events sharing (namespace,
/// deployment, reason) collapse into one incident.
#[must_use]
pub fn fingerprint(namespace: &str, deployment: &str, reason: &str) -> Vec<String> {
    vec![
        "k8s".to_string(),
        namespace.to_string(),
        deployment.to_string(),
        reason.to_string(),
    ]
}

/// RFC-3339 UTC rendering used in record payloads.
#[must_use]
pub fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn involved_name(event: &Event) -> &str {
    event.involved_object.name.as_deref().unwrap_or_default()
}

pub(crate) fn involved_kind(event: &Event) -> &str {
    event.involved_object.kind.as_deref().unwrap_or_default()
}

pub(crate) fn node_name(event: &Event) -> &str {
    event
        .source
        .as_ref()
        .and_then(|source| source.host.as_deref())
        .unwrap_or_default()
}

pub(crate) fn mode_label(create_issue: bool) -> &'static str {
    if create_issue {
        "log + issue"
    } else {
        "log only"
    }
}

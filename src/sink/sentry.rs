//! Sentry sink: observability log records plus alertable issues.

use std::borrow::Cow;
use std::time::Duration;

use sentry::protocol::{Breadcrumb, Event as SentryEvent};
use sentry::types::Dsn;
use serde_json::json;
use thiserror::Error;

use crate::filter::Severity;
use crate::troubleshoot;

use super::{
    deployment_name, effective_namespace, fingerprint, involved_kind, involved_name, node_name,
    rfc3339, EventRecord, EventSink,
};

/// Tracing target for observability records. The sentry-tracing layer
/// routes events with this target to Sentry Logs.
pub const LOG_TARGET: &str = "cluster_events";

/// Errors raised while bringing up the Sentry client.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The DSN could not be parsed
    #[error("invalid Sentry DSN: {0}")]
    Dsn(#[from] sentry::types::ParseDsnError),
}

/// Sends emission decisions to Sentry: a log record for every accepted
/// event (when enabled) and an issue for alert-eligible ones.
pub struct SentrySink {
    enable_logs: bool,
    // Keeps the global Sentry client alive for the process lifetime.
    _guard: sentry::ClientInitGuard,
}

impl SentrySink {
    /// Initialize the global Sentry client and return the sink.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Dsn`] when the DSN does not parse.
    pub fn new(dsn: &str, environment: &str, enable_logs: bool) -> Result<Self, SinkError> {
        let dsn: Dsn = dsn.parse()?;
        let guard = sentry::init(sentry::ClientOptions {
            dsn: Some(dsn),
            environment: Some(environment.to_owned().into()),
            enable_logs,
            attach_stacktrace: false,
            // Release can be set via SENTRY_RELEASE
            ..Default::default()
        });

        Ok(Self {
            enable_logs,
            _guard: guard,
        })
    }
}

impl EventSink for SentrySink {
    fn send(&self, record: &EventRecord<'_>) {
        let event = record.event;
        let namespace = effective_namespace(event);
        let pod = involved_name(event);
        let node = node_name(event);
        let reason = event.reason.as_deref().unwrap_or_default();
        let kind = involved_kind(event);
        let deployment = deployment_name(pod);

        if self.enable_logs {
            emit_log(record, namespace, pod, node, reason, kind, deployment);
        }

        if record.create_issue {
            for command in debug_breadcrumbs(namespace, pod) {
                sentry::add_breadcrumb(Breadcrumb {
                    category: Some("debug".into()),
                    message: Some(command),
                    level: sentry::Level::Info,
                    ..Default::default()
                });
            }
            sentry::capture_event(build_issue(record, namespace, pod, node, reason, kind, deployment));
        }
    }

    fn flush(&self, timeout: Duration) -> bool {
        sentry::Hub::current()
            .client()
            .map_or(true, |client| client.flush(Some(timeout)))
    }
}

/// Observability record for every accepted event. Emitted as a tracing
/// event; the subscriber's sentry layer converts it into a Sentry Log.
fn emit_log(
    record: &EventRecord<'_>,
    namespace: &str,
    pod: &str,
    node: &str,
    reason: &str,
    kind: &str,
    deployment: &str,
) {
    let message = record.event.message.as_deref().unwrap_or_default();
    let event_count = record.event.count.unwrap_or(0);
    // Option field values record nothing when None, which keeps the node
    // attribute out of records for node-less events.
    let node = (!node.is_empty()).then_some(node);

    match record.severity {
        Severity::Error => tracing::event!(
            target: LOG_TARGET,
            tracing::Level::ERROR,
            k8s.namespace = namespace,
            k8s.pod = pod,
            k8s.reason = reason,
            k8s.kind = kind,
            k8s.deployment = deployment,
            k8s.event_count = event_count,
            k8s.node = node,
            "[{namespace}] {reason}: {pod} - {message}"
        ),
        Severity::Warning => tracing::event!(
            target: LOG_TARGET,
            tracing::Level::WARN,
            k8s.namespace = namespace,
            k8s.pod = pod,
            k8s.reason = reason,
            k8s.kind = kind,
            k8s.deployment = deployment,
            k8s.event_count = event_count,
            k8s.node = node,
            "[{namespace}] {reason}: {pod} - {message}"
        ),
        Severity::Info => tracing::event!(
            target: LOG_TARGET,
            tracing::Level::INFO,
            k8s.namespace = namespace,
            k8s.pod = pod,
            k8s.reason = reason,
            k8s.kind = kind,
            k8s.deployment = deployment,
            k8s.event_count = event_count,
            k8s.node = node,
            "[{namespace}] {reason}: {pod} - {message}"
        ),
    }
}

/// Build the alertable issue for an event that met its threshold and is
/// not a recent duplicate.
fn build_issue(
    record: &EventRecord<'_>,
    namespace: &str,
    pod: &str,
    node: &str,
    reason: &str,
    kind: &str,
    deployment: &str,
) -> SentryEvent<'static> {
    let event = record.event;
    let guide = troubleshoot::guide_for(reason);

    let mut issue = SentryEvent {
        message: Some(format!("{reason}: {pod}")),
        level: sentry_level(record.severity),
        ..Default::default()
    };

    issue.tags.insert("k8s.namespace".into(), namespace.to_string());
    issue.tags.insert("k8s.pod".into(), pod.to_string());
    issue.tags.insert("k8s.reason".into(), reason.to_string());
    issue.tags.insert("k8s.kind".into(), kind.to_string());
    if !node.is_empty() {
        issue.tags.insert("k8s.node".into(), node.to_string());
    }
    if !deployment.is_empty() && deployment != pod {
        issue.tags.insert("k8s.deployment".into(), deployment.to_string());
    }

    issue.extra.insert("message".into(), event.message.as_deref().unwrap_or_default().into());
    issue.extra.insert("count".into(), record.count.into());
    issue.extra.insert("first_seen".into(), rfc3339(record.first_seen).into());
    issue.extra.insert("last_seen".into(), rfc3339(record.last_seen).into());

    // Troubleshooting guidance for on-call
    issue.extra.insert("description".into(), guide.description.as_ref().into());
    issue.extra.insert("likely_causes".into(), json!(guide.likely_causes));
    issue.extra.insert("debug_commands".into(), json!(guide.debug_commands));
    issue.extra.insert("runbook_url".into(), guide.runbook_url.into());

    if let Some(first) = &event.first_timestamp {
        issue.extra.insert("k8s_first_timestamp".into(), rfc3339(first.0).into());
    }
    if let Some(last) = &event.last_timestamp {
        issue.extra.insert("k8s_last_timestamp".into(), rfc3339(last.0).into());
    }
    if event.count.unwrap_or(0) > 0 {
        issue.extra.insert("k8s_event_count".into(), event.count.unwrap_or(0).into());
    }

    issue.fingerprint = Cow::Owned(
        fingerprint(namespace, deployment, reason)
            .into_iter()
            .map(Cow::Owned)
            .collect(),
    );

    issue
}

const fn sentry_level(severity: Severity) -> sentry::Level {
    match severity {
        Severity::Error => sentry::Level::Error,
        Severity::Warning => sentry::Level::Warning,
        Severity::Info => sentry::Level::Info,
    }
}

fn debug_breadcrumbs(namespace: &str, pod: &str) -> [String; 3] {
    [
        format!("kubectl describe pod {pod} -n {namespace}"),
        format!("kubectl logs {pod} -n {namespace} --previous"),
        format!("kubectl get events -n {namespace} --field-selector involvedObject.name={pod}"),
    ]
}

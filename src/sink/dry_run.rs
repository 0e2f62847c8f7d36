//! Dry-run sink: emission decisions as newline-delimited JSON on a local
//! writer.

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;
use tracing::warn;

use super::{
    deployment_name, effective_namespace, fingerprint, involved_kind, involved_name, mode_label,
    node_name, rfc3339, EventRecord, EventSink,
};

/// Writes one JSON object per emission decision instead of talking to
/// Sentry. Useful for inspecting what would be sent.
pub struct DryRunSink<W> {
    writer: Mutex<W>,
}

impl<W: Write> DryRunSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> EventSink for DryRunSink<W> {
    fn send(&self, record: &EventRecord<'_>) {
        let event = record.event;
        let namespace = effective_namespace(event);
        let pod = involved_name(event);
        let reason = event.reason.as_deref().unwrap_or_default();

        let line = json!({
            "message": format!("{reason}: {pod}"),
            "severity": record.severity.as_str(),
            "meets_threshold": record.create_issue,
            "mode": mode_label(record.create_issue),
            "tags": {
                "k8s.namespace": namespace,
                "k8s.pod": pod,
                "k8s.reason": reason,
                "k8s.kind": involved_kind(event),
                "k8s.node": node_name(event),
                "k8s.deployment": deployment_name(pod),
            },
            "extra": {
                "message": event.message.as_deref().unwrap_or_default(),
                "count": record.count,
                "k8s_event_count": event.count.unwrap_or(0),
                "first_seen": rfc3339(record.first_seen),
                "last_seen": rfc3339(record.last_seen),
            },
            "fingerprint": fingerprint(namespace, deployment_name(pod), reason),
        });

        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writeln!(writer, "{line}") {
            warn!(error = %err, "failed to write dry-run record");
        }
    }

    fn flush(&self, _timeout: Duration) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Severity;
    use chrono::Utc;
    use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::Value;
    use std::sync::Arc;

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

    fn oom_event() -> Event {
        Event {
            metadata: ObjectMeta {
                namespace: Some("production".to_string()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                namespace: Some("production".to_string()),
                name: Some("worker-79c6dd4b57-wcdzt".to_string()),
                kind: Some("Pod".to_string()),
                ..Default::default()
            },
            source: Some(EventSource {
                host: Some("node-3".to_string()),
                ..Default::default()
            }),
            reason: Some("OOMKilled".to_string()),
            message: Some("Container worker exceeded memory limit".to_string()),
            type_: Some("Warning".to_string()),
            count: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn emits_one_json_object_per_line() {
        let buf = SharedBuf::default();
        let sink = DryRunSink::new(buf.clone());
        let event = oom_event();
        let now = Utc::now();

        sink.send(&EventRecord {
            event: &event,
            severity: Severity::Error,
            count: 1,
            first_seen: now,
            last_seen: now,
            create_issue: true,
        });
        sink.send(&EventRecord {
            event: &event,
            severity: Severity::Error,
            count: 2,
            first_seen: now,
            last_seen: now,
            create_issue: false,
        });

        let bytes = buf.0.lock().unwrap().clone();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        let first = &lines[0];
        assert_eq!(first["message"], "OOMKilled: worker-79c6dd4b57-wcdzt");
        assert_eq!(first["severity"], "error");
        assert_eq!(first["meets_threshold"], true);
        assert_eq!(first["mode"], "log + issue");
        assert_eq!(first["tags"]["k8s.deployment"], "worker");
        assert_eq!(first["tags"]["k8s.node"], "node-3");
        assert_eq!(first["extra"]["count"], 1);
        assert_eq!(first["extra"]["k8s_event_count"], 1);
        assert_eq!(
            first["fingerprint"],
            serde_json::json!(["k8s", "production", "worker", "OOMKilled"])
        );

        let second = &lines[1];
        assert_eq!(second["mode"], "log only");
        assert_eq!(second["extra"]["count"], 2);
    }

    #[test]
    fn flush_is_a_no_op() {
        let sink = DryRunSink::new(Vec::new());
        assert!(sink.flush(Duration::from_secs(1)));
    }
}

//! Event classification: which events are processed, and how severe.

use std::collections::{HashMap, HashSet};

use k8s_openapi::api::core::v1::Event;
use serde::{Deserialize, Serialize};

use crate::sink::effective_namespace;

/// Severity assigned to an event reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Critical failures that need attention.
    Error,
    /// Issues that may self-resolve.
    Warning,
    /// Informational.
    Info,
}

impl Severity {
    /// Lowercase display name, as it appears in dry-run output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// Decides which cluster events are worth forwarding.
///
/// The filter classifies; it never drops on occurrence count. An event
/// below its threshold is still processed ("log only"), it just does not
/// become an issue.
pub struct EventFilter {
    namespaces: HashSet<String>,
    exclude_namespaces: HashSet<String>,
    reasons: HashSet<String>,
    thresholds: HashMap<String, i32>,
    severities: HashMap<&'static str, Severity>,
}

impl EventFilter {
    #[must_use]
    pub fn new(
        namespaces: &[String],
        exclude_namespaces: &[String],
        reasons: &[String],
        thresholds: HashMap<String, i32>,
    ) -> Self {
        Self {
            namespaces: namespaces.iter().cloned().collect(),
            exclude_namespaces: exclude_namespaces.iter().cloned().collect(),
            reasons: reasons.iter().cloned().collect(),
            thresholds,
            severities: default_severities(),
        }
    }

    /// Whether this event passes the namespace, reason, and type gates.
    ///
    /// Thresholds are deliberately not consulted here; use
    /// [`meets_threshold`](Self::meets_threshold) for that.
    #[must_use]
    pub fn should_process(&self, event: &Event) -> bool {
        let namespace = effective_namespace(event);

        // When an allow-list is configured, only those namespaces pass.
        if !self.namespaces.is_empty() && !self.namespaces.contains(namespace) {
            return false;
        }
        if self.exclude_namespaces.contains(namespace) {
            return false;
        }

        let Some(reason) = event.reason.as_deref() else {
            return false;
        };
        if !self.reasons.contains(reason) {
            return false;
        }

        // Normal events are informational; only Warning events matter.
        event.type_.as_deref() == Some("Warning")
    }

    /// Whether the cluster-reported occurrence count meets the reason's
    /// minimum threshold. Reasons without a configured threshold pass.
    #[must_use]
    pub fn meets_threshold(&self, event: &Event) -> bool {
        let Some(reason) = event.reason.as_deref() else {
            return true;
        };
        match self.thresholds.get(reason) {
            Some(threshold) => event.count.unwrap_or(0) >= *threshold,
            None => true,
        }
    }

    /// Configured threshold for a reason, defaulting to 1.
    #[must_use]
    pub fn threshold_for(&self, reason: &str) -> i32 {
        self.thresholds.get(reason).copied().unwrap_or(1)
    }

    /// Severity for a reason, defaulting to warning.
    #[must_use]
    pub fn severity_of(&self, reason: &str) -> Severity {
        self.severities.get(reason).copied().unwrap_or(Severity::Warning)
    }
}

fn default_severities() -> HashMap<&'static str, Severity> {
    HashMap::from([
        // Critical failures
        ("OOMKilled", Severity::Error),
        ("CrashLoopBackOff", Severity::Error),
        ("FailedScheduling", Severity::Error),
        ("Evicted", Severity::Error),
        ("FailedMount", Severity::Error),
        ("FailedAttachVolume", Severity::Error),
        ("ImagePullBackOff", Severity::Error),
        ("ErrImagePull", Severity::Error),
        ("FailedCreate", Severity::Error),
        // May self-resolve
        ("Unhealthy", Severity::Warning),
        ("BackOff", Severity::Warning),
        ("Killing", Severity::Warning),
        ("NodeNotReady", Severity::Warning),
        ("FailedSync", Severity::Warning),
        // Informational
        ("NodeReady", Severity::Info),
    ])
}

//! Environment-variable configuration.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sentry DSN. May be empty in dry-run mode.
    pub sentry_dsn: String,
    /// Sentry environment tag.
    pub sentry_environment: String,
    /// Namespace allow-list. Empty means all namespaces.
    pub namespaces: Vec<String>,
    /// Namespaces that are never processed.
    pub exclude_namespaces: Vec<String>,
    /// Event reasons to watch.
    pub event_reasons: Vec<String>,
    /// Minimum cluster-reported occurrence count per reason before an issue
    /// is created. Events below threshold still produce log records.
    pub event_thresholds: HashMap<String, i32>,
    /// Send every accepted event to Sentry Logs.
    pub enable_logs: bool,
    /// Window during which repeated sightings collapse into one incident.
    pub dedup_window: chrono::Duration,
    /// Log level for the process itself.
    pub log_level: String,
}

/// Default event reasons to monitor.
///
/// Only Warning-type events are processed, so Normal reasons like "Killing"
/// never match.
#[must_use]
pub fn default_event_reasons() -> Vec<String> {
    [
        // High priority - always critical
        "OOMKilled",
        "CrashLoopBackOff",
        "FailedScheduling",
        "Evicted",
        "FailedMount",
        "FailedAttachVolume",
        // Medium priority - may be transient
        "Unhealthy",
        "ImagePullBackOff",
        "ErrImagePull",
        "BackOff",
        "FailedCreate",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Default minimum occurrence counts before an event creates an issue.
///
/// A threshold of 1 means alert on first sighting.
#[must_use]
pub fn default_event_thresholds() -> HashMap<String, i32> {
    [
        // Send immediately
        ("OOMKilled", 1),
        ("CrashLoopBackOff", 1),
        ("Evicted", 1),
        ("FailedScheduling", 1),
        ("FailedMount", 1),
        ("FailedAttachVolume", 1),
        // Often transient during startup or rolling updates
        ("Unhealthy", 5),
        ("BackOff", 3),
        ("ImagePullBackOff", 3),
        ("ErrImagePull", 2),
        ("FailedCreate", 2),
    ]
    .iter()
    .map(|(reason, count)| ((*reason).to_string(), *count))
    .collect()
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// In dry-run mode `SENTRY_DSN` is not required.
    ///
    /// # Errors
    ///
    /// Returns an error when `SENTRY_DSN` is missing outside dry-run mode,
    /// or when a threshold or the dedup window fails to parse.
    pub fn from_env(dry_run: bool) -> Result<Self> {
        Self::from_lookup(dry_run, |key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Lets tests supply variables without mutating the process environment.
    ///
    /// # Errors
    ///
    /// Same conditions as [`from_env`](Self::from_env).
    pub fn from_lookup(dry_run: bool, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let sentry_dsn = get("SENTRY_DSN").unwrap_or_default();
        if !dry_run && sentry_dsn.is_empty() {
            bail!("SENTRY_DSN environment variable is required (use --dry-run to skip)");
        }

        let namespaces = get("KUBE_SENTRY_NAMESPACES")
            .map(|value| split_and_trim(&value))
            .unwrap_or_default();
        let exclude_namespaces = get("KUBE_SENTRY_EXCLUDE_NAMESPACES")
            .map(|value| split_and_trim(&value))
            .unwrap_or_else(|| vec!["kube-system".to_string()]);
        let event_reasons = get("KUBE_SENTRY_EVENTS")
            .map(|value| split_and_trim(&value))
            .unwrap_or_else(default_event_reasons);

        // Custom thresholds ("Reason:count,Reason:count") merge over the
        // defaults rather than replacing them.
        let mut event_thresholds = default_event_thresholds();
        if let Some(spec) = get("KUBE_SENTRY_THRESHOLDS") {
            for item in split_and_trim(&spec) {
                let Some((reason, count)) = item.split_once(':') else {
                    continue;
                };
                let reason = reason.trim();
                let parsed: i32 = count.trim().parse().with_context(|| {
                    format!("invalid threshold for {reason}: expected integer, got {:?}", count.trim())
                })?;
                event_thresholds.insert(reason.to_string(), parsed);
            }
        }

        let enable_logs = get("KUBE_SENTRY_ENABLE_LOGS").map_or(true, |value| value == "true" || value == "1");

        let window = get("KUBE_SENTRY_DEDUP_WINDOW").unwrap_or_else(|| "5m".to_string());
        let dedup_window = parse_duration(&window).context("invalid KUBE_SENTRY_DEDUP_WINDOW")?;

        Ok(Self {
            sentry_dsn,
            sentry_environment: get("SENTRY_ENVIRONMENT").unwrap_or_else(|| "production".to_string()),
            namespaces,
            exclude_namespaces,
            event_reasons,
            event_thresholds,
            enable_logs,
            dedup_window,
            log_level: get("KUBE_SENTRY_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// Parse a duration string like "30s", "5m", or "2h".
fn parse_duration(s: &str) -> Result<chrono::Duration> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        let h: i64 = hours.parse().context("invalid hours")?;
        return Ok(chrono::Duration::hours(h));
    }
    if let Some(minutes) = s.strip_suffix('m') {
        let m: i64 = minutes.parse().context("invalid minutes")?;
        return Ok(chrono::Duration::minutes(m));
    }
    if let Some(seconds) = s.strip_suffix('s') {
        let secs: i64 = seconds.parse().context("invalid seconds")?;
        return Ok(chrono::Duration::seconds(secs));
    }

    bail!("unrecognized duration {s:?} (expected a value like \"30s\", \"5m\", or \"1h\")")
}

fn split_and_trim(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToString::to_string)
        .collect()
}

//! Forward Kubernetes cluster events to Sentry.
//!
//! This crate watches the cluster event stream and forwards a filtered,
//! deduplicated subset to Sentry on two channels:
//!
//! - **Logs**: every accepted event becomes a structured log record for
//!   observability.
//! - **Issues**: an event that meets its per-reason occurrence threshold and
//!   is not a recent duplicate becomes an alertable issue, grouped by
//!   (namespace, deployment, reason) so replicas and rollouts collapse into
//!   one incident.
//!
//! # Architecture
//!
//! Events flow through a single pipeline:
//!
//! ```text
//! watch stream -> EventFilter -> Deduplicator -> EventSink
//! ```
//!
//! - [`filter::EventFilter`] classifies events by namespace, reason, type,
//!   and occurrence threshold.
//! - [`dedup::Deduplicator`] is a bounded, time-windowed cache of recent
//!   incidents keyed by namespace/deployment/reason.
//! - [`sink::EventSink`] is the emission seam: [`sink::SentrySink`] for the
//!   real transport, [`sink::DryRunSink`] for NDJSON on a local writer.
//! - [`watcher::EventWatcher`] owns the watch connection and drives the
//!   pipeline, reconnecting on stream errors.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dedup;
pub mod filter;
pub mod sink;
pub mod troubleshoot;
pub mod watcher;

pub use config::Config;
pub use dedup::Deduplicator;
pub use filter::{EventFilter, Severity};
pub use sink::{DryRunSink, EventRecord, EventSink, SentrySink};
pub use watcher::{EventPipeline, EventWatcher};

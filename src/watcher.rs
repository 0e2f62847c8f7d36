//! Watch-stream ownership and the per-event pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Event;
use kube::api::{ListParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::dedup::Deduplicator;
use crate::filter::EventFilter;
use crate::sink::{self, EventRecord, EventSink};

/// Pause between reconnection attempts after a stream error.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Runs one event through filter, dedup, and emission.
pub struct EventPipeline {
    filter: EventFilter,
    dedup: Deduplicator,
    sink: Arc<dyn EventSink>,
}

impl EventPipeline {
    #[must_use]
    pub fn new(filter: EventFilter, dedup: Deduplicator, sink: Arc<dyn EventSink>) -> Self {
        Self { filter, dedup, sink }
    }

    /// Classify and emit one event. Returns false when the filter dropped
    /// it.
    pub async fn process(&self, event: &Event) -> bool {
        if !self.filter.should_process(event) {
            return false;
        }

        let namespace = sink::effective_namespace(event);
        let pod = event.involved_object.name.as_deref().unwrap_or_default();
        let reason = event.reason.as_deref().unwrap_or_default();

        // Dedup by deployment, not pod: every replica that fails across a
        // rollout shares one incident, matching the issue fingerprint.
        let deployment = sink::deployment_name(pod);

        let severity = self.filter.severity_of(reason);
        let meets_threshold = self.filter.meets_threshold(event);
        let check = self.dedup.check(namespace, deployment, reason).await;
        let create_issue = meets_threshold && check.is_new;

        if !check.is_new && meets_threshold {
            debug!(
                namespace,
                deployment,
                pod,
                reason,
                count = check.count,
                "suppressing duplicate issue (log still sent)"
            );
        }

        if create_issue {
            info!(
                namespace,
                deployment,
                pod,
                reason,
                severity = severity.as_str(),
                k8s_count = event.count.unwrap_or(0),
                "forwarding event (log + issue)"
            );
        } else {
            debug!(
                namespace,
                deployment,
                pod,
                reason,
                k8s_count = event.count.unwrap_or(0),
                threshold = self.filter.threshold_for(reason),
                "forwarding event (log only)"
            );
        }

        self.sink.send(&EventRecord {
            event,
            severity,
            count: check.count,
            first_seen: check.first_seen,
            last_seen: check.last_seen,
            create_issue,
        });

        true
    }
}

/// Owns the Kubernetes connection and feeds the pipeline.
pub struct EventWatcher {
    client: Client,
    pipeline: EventPipeline,
}

impl EventWatcher {
    #[must_use]
    pub fn new(client: Client, pipeline: EventPipeline) -> Self {
        Self { client, pipeline }
    }

    /// Watch events in all namespaces until the token is cancelled.
    ///
    /// Stream errors are logged, followed by a backoff and a reconnect;
    /// they never propagate out of this loop.
    ///
    /// # Errors
    ///
    /// Currently only returns `Ok`; the `Result` keeps the contract open
    /// for fatal conditions.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!("starting event watcher");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                result = self.watch_events(&cancel) => {
                    match result {
                        // Cancelled mid-stream
                        Ok(()) => return Ok(()),
                        Err(err) => {
                            error!(error = %err, "watch error, reconnecting");
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => return Ok(()),
                                () = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                            }
                        }
                    }
                }
            }
        }
    }

    /// List all current events, run the pipeline over each, and return.
    ///
    /// # Errors
    ///
    /// Returns an error when the list call fails.
    pub async fn list_once(&self) -> Result<()> {
        info!("listing current events (once mode)");

        let events: Api<Event> = Api::all(self.client.clone());
        let list = events
            .list(&ListParams::default())
            .await
            .context("failed to list events")?;

        info!(total = list.items.len(), "found events");

        let mut matched = 0usize;
        for event in &list.items {
            if self.pipeline.process(event).await {
                matched += 1;
            }
        }

        info!(matched, total = list.items.len(), "processed matching events");
        Ok(())
    }

    /// Consume one watch connection until it fails or the token fires.
    async fn watch_events(&self, cancel: &CancellationToken) -> Result<()> {
        let events: Api<Event> = Api::all(self.client.clone());
        let mut stream = events
            .watch(&WatchParams::default(), "0")
            .await
            .context("failed to create event watch")?
            .boxed();

        info!("watching for kubernetes events");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                item = stream.try_next() => {
                    match item.context("event watch stream failed")? {
                        Some(WatchEvent::Added(event) | WatchEvent::Modified(event)) => {
                            self.pipeline.process(&event).await;
                        }
                        Some(WatchEvent::Error(status)) => {
                            return Err(anyhow!("watch error delta: {status:?}"));
                        }
                        // Deletions and bookmarks carry nothing to forward.
                        Some(WatchEvent::Deleted(_) | WatchEvent::Bookmark(_)) => {}
                        None => return Err(anyhow!("watch channel closed")),
                    }
                }
            }
        }
    }
}

/// Build a Kubernetes client: explicit kubeconfig path when given,
/// otherwise in-cluster config, then the default local kubeconfig.
///
/// # Errors
///
/// Returns an error when no usable configuration can be found or the
/// client cannot be constructed from it.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to load kubeconfig from {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("failed to build client config from kubeconfig")?
        }
        None => Config::infer().await.context("failed to infer cluster config")?,
    };

    Client::try_from(config).context("failed to create kubernetes client")
}

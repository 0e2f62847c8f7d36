//! Static troubleshooting guidance attached to alerts, keyed by event
//! reason.

use std::borrow::Cow;

/// Debugging guidance for one event reason.
#[derive(Debug, Clone)]
pub struct TroubleshootingGuide {
    pub description: Cow<'static, str>,
    pub likely_causes: &'static [&'static str],
    pub debug_commands: &'static [&'static str],
    pub runbook_url: &'static str,
}

/// Look up guidance for an event reason.
///
/// Unknown reasons get a generic payload that names the reason and points
/// at the root debugging docs. Extending the catalog is a matter of adding
/// a match arm.
#[must_use]
pub fn guide_for(reason: &str) -> TroubleshootingGuide {
    match reason {
        "OOMKilled" => TroubleshootingGuide {
            description: Cow::Borrowed(
                "Container was terminated because it exceeded its memory limit.",
            ),
            likely_causes: &[
                "Memory limit set too low for the workload",
                "Memory leak in the application",
                "Spike in traffic causing increased memory usage",
                "Large data processing without streaming",
            ],
            debug_commands: &[
                "kubectl top pod <pod> -n <namespace>",
                "kubectl describe pod <pod> -n <namespace> | grep -A5 'Last State'",
                "kubectl logs <pod> -n <namespace> --previous",
            ],
            runbook_url: "https://kubernetes.io/docs/tasks/debug/debug-application/debug-running-pod/#container-is-terminated",
        },
        "CrashLoopBackOff" => TroubleshootingGuide {
            description: Cow::Borrowed(
                "Container keeps crashing and Kubernetes is backing off from restarting it.",
            ),
            likely_causes: &[
                "Application crashes on startup (check logs)",
                "Missing configuration or secrets",
                "Liveness probe failing",
                "Dependency not available (database, external service)",
            ],
            debug_commands: &[
                "kubectl logs <pod> -n <namespace> --previous",
                "kubectl describe pod <pod> -n <namespace>",
                "kubectl get events -n <namespace> --field-selector involvedObject.name=<pod>",
            ],
            runbook_url: "https://kubernetes.io/docs/tasks/debug/debug-application/debug-running-pod/",
        },
        "ImagePullBackOff" => TroubleshootingGuide {
            description: Cow::Borrowed("Kubernetes cannot pull the container image."),
            likely_causes: &[
                "Image tag doesn't exist",
                "Private registry authentication failed",
                "Registry is unreachable",
                "Image name is misspelled",
            ],
            debug_commands: &[
                "kubectl describe pod <pod> -n <namespace> | grep -A10 Events",
                "kubectl get secret -n <namespace>",
                "docker pull <image> (test locally)",
            ],
            runbook_url: "https://kubernetes.io/docs/concepts/containers/images/#image-pull-policy",
        },
        "ErrImagePull" => TroubleshootingGuide {
            description: Cow::Borrowed("The container image pull failed outright."),
            likely_causes: &[
                "Image or tag does not exist in the registry",
                "imagePullSecrets missing or expired",
                "Registry rate limiting or outage",
            ],
            debug_commands: &[
                "kubectl describe pod <pod> -n <namespace> | grep -A10 Events",
                "kubectl get secret -n <namespace>",
            ],
            runbook_url: "https://kubernetes.io/docs/concepts/containers/images/",
        },
        "Unhealthy" => TroubleshootingGuide {
            description: Cow::Borrowed("Container failed its liveness or readiness probe."),
            likely_causes: &[
                "Application is slow to start (increase initialDelaySeconds)",
                "Health endpoint is misconfigured",
                "Application is overloaded",
                "Dependency timeout affecting health check",
            ],
            debug_commands: &[
                "kubectl describe pod <pod> -n <namespace> | grep -A20 'Liveness\\|Readiness'",
                "kubectl logs <pod> -n <namespace> --tail=100",
                "kubectl exec <pod> -n <namespace> -- curl -v localhost:<port>/<health-path>",
            ],
            runbook_url: "https://kubernetes.io/docs/tasks/configure-pod-container/configure-liveness-readiness-startup-probes/",
        },
        "Evicted" => TroubleshootingGuide {
            description: Cow::Borrowed(
                "Pod was evicted from the node, usually due to resource pressure.",
            ),
            likely_causes: &[
                "Node is running out of disk space",
                "Node is running out of memory",
                "Too many pods on the node",
                "Pod exceeded ephemeral storage limit",
            ],
            debug_commands: &[
                "kubectl describe node <node>",
                "kubectl get pods -A -o wide --field-selector spec.nodeName=<node>",
                "kubectl top node <node>",
            ],
            runbook_url: "https://kubernetes.io/docs/concepts/scheduling-eviction/node-pressure-eviction/",
        },
        "FailedScheduling" => TroubleshootingGuide {
            description: Cow::Borrowed("Kubernetes cannot find a node to schedule the pod."),
            likely_causes: &[
                "Insufficient CPU or memory in cluster",
                "Node selector/affinity doesn't match any nodes",
                "Taints preventing scheduling",
                "PersistentVolumeClaim not bound",
            ],
            debug_commands: &[
                "kubectl describe pod <pod> -n <namespace> | grep -A10 Events",
                "kubectl get nodes -o wide",
                "kubectl describe nodes | grep -A5 'Allocated resources'",
            ],
            runbook_url: "https://kubernetes.io/docs/concepts/scheduling-eviction/assign-pod-node/",
        },
        "FailedMount" => TroubleshootingGuide {
            description: Cow::Borrowed("Volume could not be mounted to the pod."),
            likely_causes: &[
                "PersistentVolume not available",
                "Secret or ConfigMap doesn't exist",
                "NFS/cloud storage connectivity issue",
                "Volume is already mounted elsewhere (ReadWriteOnce)",
            ],
            debug_commands: &[
                "kubectl describe pod <pod> -n <namespace>",
                "kubectl get pv,pvc -n <namespace>",
                "kubectl get events -n <namespace> | grep -i mount",
            ],
            runbook_url: "https://kubernetes.io/docs/concepts/storage/persistent-volumes/",
        },
        "FailedAttachVolume" => TroubleshootingGuide {
            description: Cow::Borrowed("A persistent volume could not be attached to the node."),
            likely_causes: &[
                "Volume still attached to another node",
                "Cloud provider attach API errors or throttling",
                "CSI driver not healthy on the node",
            ],
            debug_commands: &[
                "kubectl get pv,pvc -n <namespace>",
                "kubectl describe pod <pod> -n <namespace>",
                "kubectl get pods -n kube-system | grep -i csi",
            ],
            runbook_url: "https://kubernetes.io/docs/concepts/storage/persistent-volumes/",
        },
        "BackOff" => TroubleshootingGuide {
            description: Cow::Borrowed("Container is in back-off state, waiting before restart."),
            likely_causes: &[
                "Previous container crash (check logs)",
                "Exit code non-zero",
                "Repeated failures triggering exponential backoff",
            ],
            debug_commands: &[
                "kubectl logs <pod> -n <namespace> --previous",
                "kubectl describe pod <pod> -n <namespace>",
            ],
            runbook_url: "https://kubernetes.io/docs/concepts/workloads/pods/pod-lifecycle/#restart-policy",
        },
        _ => TroubleshootingGuide {
            description: Cow::Owned(format!("Kubernetes event: {reason}")),
            likely_causes: &["Check pod events and logs for details"],
            debug_commands: &[
                "kubectl describe pod <pod> -n <namespace>",
                "kubectl logs <pod> -n <namespace>",
            ],
            runbook_url: "https://kubernetes.io/docs/tasks/debug/",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_reason_has_specific_guidance() {
        let guide = guide_for("OOMKilled");
        assert!(guide.description.contains("memory limit"));
        assert!(!guide.likely_causes.is_empty());
        assert!(!guide.debug_commands.is_empty());
        assert!(guide.runbook_url.starts_with("https://kubernetes.io/"));
    }

    #[test]
    fn unknown_reason_gets_generic_payload() {
        let guide = guide_for("SomethingBrandNew");
        assert!(guide.description.contains("SomethingBrandNew"));
        assert_eq!(guide.runbook_url, "https://kubernetes.io/docs/tasks/debug/");
    }
}

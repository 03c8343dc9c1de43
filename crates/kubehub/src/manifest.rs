//! Export live objects as storable manifests.

use anyhow::{Context, Result};
use serde_json::Value as Json;

const LAST_APPLIED: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Drop server-populated fields so the manifest can be re-applied elsewhere.
pub fn strip_noisy(mut v: Json) -> Json {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
        meta.remove("resourceVersion");
        meta.remove("generation");
        meta.remove("creationTimestamp");
        meta.remove("uid");
        meta.remove("selfLink");
        meta.remove("ownerReferences");
        if let Some(ann) = meta.get_mut("annotations").and_then(|a| a.as_object_mut()) {
            ann.remove(LAST_APPLIED);
        }
    }
    if let Some(obj) = v.as_object_mut() {
        obj.remove("status");
    }
    v
}

/// Stripped object rendered as YAML.
pub fn to_manifest_yaml(v: Json) -> Result<String> {
    serde_yaml::to_string(&strip_noisy(v)).context("rendering manifest as YAML")
}

/// `(desired replicas, ready)` from a workload object's spec/status.
pub fn replica_status(kind: &str, obj: &Json) -> (i32, bool) {
    let num = |path: &[&str]| -> Option<i64> {
        let mut cur = obj;
        for p in path {
            cur = cur.get(*p)?;
        }
        cur.as_i64()
    };
    let (desired, ready) = match kind {
        "DaemonSet" => (
            num(&["status", "desiredNumberScheduled"]).unwrap_or(0),
            num(&["status", "numberReady"]).unwrap_or(0),
        ),
        _ => (num(&["spec", "replicas"]).unwrap_or(1), num(&["status", "readyReplicas"]).unwrap_or(0)),
    };
    (i32::try_from(desired).unwrap_or(i32::MAX), ready >= desired)
}

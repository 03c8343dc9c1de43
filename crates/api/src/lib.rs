//! Hoist façade (in-process).
//!
//! Bundles the boundary traits the wizard drives into [`Backends`], reads the
//! `HOIST_*` environment into [`Config`], and ships in-memory mocks for tests.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

pub use hoist_kubehub::ClusterObserver;
pub use hoist_ops::{ControllerClient, StoredUnit, TargetInfo, UnitStore, WorkerLauncher};
pub use hoist_persist::{SessionSnapshot, SessionStore};

pub mod mock;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub metrics_addr: Option<String>,
    pub cub_bin: String,
    pub target_provider: String,
    pub test_annotation: String,
    pub sync_delay_ms: u64,
    pub sync_poll_ms: u64,
    /// `None` polls until the live object is readable.
    pub sync_max_polls: Option<u32>,
    pub db_path: Option<String>,
    pub session_ttl_secs: i64,
    pub argocd_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metrics_addr: None,
            cub_bin: "cub".to_string(),
            target_provider: "Kubernetes".to_string(),
            test_annotation: "hoist.dev/e2e-test".to_string(),
            sync_delay_ms: 5000,
            sync_poll_ms: 3000,
            sync_max_polls: None,
            db_path: None,
            session_ttl_secs: 86_400,
            argocd_namespace: "argocd".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup; unparsable values fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let text = |k: &str, dflt: String| get(k).filter(|v| !v.trim().is_empty()).unwrap_or(dflt);
        let num = |k: &str| get(k).and_then(|v| v.trim().parse::<u64>().ok());
        Self {
            metrics_addr: get("HOIST_METRICS_ADDR").filter(|v| !v.trim().is_empty()),
            cub_bin: text("HOIST_CUB_BIN", d.cub_bin),
            target_provider: text("HOIST_TARGET_PROVIDER", d.target_provider),
            test_annotation: text("HOIST_TEST_ANNOTATION", d.test_annotation),
            sync_delay_ms: num("HOIST_SYNC_DELAY_MS").unwrap_or(d.sync_delay_ms),
            sync_poll_ms: num("HOIST_SYNC_POLL_MS").unwrap_or(d.sync_poll_ms),
            sync_max_polls: num("HOIST_SYNC_MAX_POLLS").filter(|n| *n > 0).map(|n| n.min(u32::MAX as u64) as u32),
            db_path: get("HOIST_DB_PATH").filter(|v| !v.trim().is_empty()),
            session_ttl_secs: num("HOIST_SESSION_TTL_SECS").map(|n| n as i64).unwrap_or(d.session_ttl_secs),
            argocd_namespace: text("HOIST_ARGOCD_NAMESPACE", d.argocd_namespace),
        }
    }

    pub fn sync_delay(&self) -> Duration {
        Duration::from_millis(self.sync_delay_ms)
    }

    pub fn sync_poll(&self) -> Duration {
        Duration::from_millis(self.sync_poll_ms)
    }
}

/// Everything the wizard calls out to.
#[derive(Clone)]
pub struct Backends {
    pub cluster: Arc<dyn ClusterObserver>,
    pub store: Arc<dyn UnitStore>,
    pub controllers: Arc<dyn ControllerClient>,
    pub workers: Arc<dyn WorkerLauncher>,
}

impl Backends {
    /// Real implementations: kube-rs observer, `cub` CLI, Argo CD over kube.
    pub fn in_process(cfg: &Config) -> Self {
        info!(cub = %cfg.cub_bin, argocd_ns = %cfg.argocd_namespace, "api: in-process backends");
        Self {
            cluster: Arc::new(hoist_kubehub::KubeObserver::new(cfg.argocd_namespace.clone())),
            store: Arc::new(hoist_ops::CubStore::new(cfg.cub_bin.clone())),
            controllers: Arc::new(hoist_ops::ArgoClient::new()),
            workers: Arc::new(hoist_ops::CubWorker::new(cfg.cub_bin.clone())),
        }
    }
}

/// Session store at `HOIST_DB_PATH` or the default location.
pub fn open_sessions(cfg: &Config) -> anyhow::Result<hoist_persist::SqliteSessionStore> {
    match cfg.db_path.as_deref() {
        Some(p) => hoist_persist::SqliteSessionStore::open(p),
        None => hoist_persist::SqliteSessionStore::open_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn config_defaults() {
        let c = Config::from_lookup(|_| None);
        assert_eq!(c, Config::default());
        assert_eq!(c.sync_max_polls, None);
        assert_eq!(c.sync_delay(), Duration::from_secs(5));
    }

    #[test]
    fn config_overrides_and_bad_values() {
        let env: HashMap<&str, &str> = [
            ("HOIST_CUB_BIN", "/opt/bin/cub"),
            ("HOIST_SYNC_POLL_MS", "250"),
            ("HOIST_SYNC_DELAY_MS", "soon"),
            ("HOIST_SYNC_MAX_POLLS", "0"),
            ("HOIST_TARGET_PROVIDER", "  "),
            ("HOIST_SESSION_TTL_SECS", "60"),
        ]
        .into_iter()
        .collect();
        let c = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.cub_bin, "/opt/bin/cub");
        assert_eq!(c.sync_poll_ms, 250);
        assert_eq!(c.sync_delay_ms, 5000);
        assert_eq!(c.sync_max_polls, None);
        assert_eq!(c.target_provider, "Kubernetes");
        assert_eq!(c.session_ttl_secs, 60);

        let c = Config::from_lookup(|k| (k == "HOIST_SYNC_MAX_POLLS").then(|| "7".to_string()));
        assert_eq!(c.sync_max_polls, Some(7));
    }
}

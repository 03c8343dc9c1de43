//! Hoist Ops: side-effecting calls made by the import wizard.
//!
//! Three seams, each an async trait so the wizard can run against in-memory
//! fakes:
//! - [`UnitStore`]: the configuration store, driven through the `cub` CLI
//! - [`ControllerClient`]: competing GitOps controller objects (Argo CD Applications)
//! - [`WorkerLauncher`]: detached worker/connector processes

#![forbid(unsafe_code)]

use anyhow::Result;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use hoist_core::Labels;

pub mod argo;
pub mod cub;

pub use argo::ArgoClient;
pub use cub::{CubStore, CubWorker};

/// Failures of the external tooling itself, as opposed to kube/API errors.
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    #[error("failed to spawn {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{bin} {args}` exited with {code:?}: {stderr}")]
    Command { bin: String, args: String, code: Option<i32>, stderr: String },
    #[error("unexpected output from `{what}`: {message}")]
    Output { what: String, message: String },
}

/// A Unit as read back from the store. `data_b64` is the stored manifest,
/// base64-encoded as the store returns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUnit {
    pub data_b64: String,
    pub target: Option<String>,
}

impl StoredUnit {
    pub fn from_manifest(manifest: &[u8], target: Option<String>) -> Self {
        Self { data_b64: base64::engine::general_purpose::STANDARD.encode(manifest), target }
    }

    pub fn decode_manifest(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(self.data_b64.trim())
    }
}

/// Deployment target known to a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub slug: String,
    pub provider_type: String,
}

#[async_trait::async_trait]
pub trait UnitStore: Send + Sync {
    /// `Ok(false)` when the space already existed.
    async fn create_space(&self, space: &str) -> Result<bool>;
    async fn create_unit(&self, space: &str, slug: &str, labels: &Labels, manifest: &[u8]) -> Result<()>;
    async fn get_unit(&self, space: &str, slug: &str) -> Result<StoredUnit>;
    async fn update_unit(&self, space: &str, slug: &str, manifest: &[u8]) -> Result<()>;
    async fn apply_unit(&self, space: &str, slug: &str, wait: bool) -> Result<()>;
    async fn set_target(&self, space: &str, slug: &str, target: &str) -> Result<()>;
    async fn list_targets(&self, space: &str) -> Result<Vec<TargetInfo>>;
}

#[async_trait::async_trait]
pub trait ControllerClient: Send + Sync {
    async fn disable_auto_sync(&self, namespace: &str, name: &str) -> Result<()>;
    /// Delete without cascading to the managed workloads.
    async fn delete_app(&self, namespace: &str, name: &str) -> Result<()>;
}

#[async_trait::async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Returns once the process is spawned; it is never awaited.
    async fn start(&self, name: &str, space: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_unit_manifest_roundtrip() {
        let u = StoredUnit::from_manifest(b"kind: Deployment\n", Some("k8s".into()));
        assert_eq!(u.decode_manifest().unwrap(), b"kind: Deployment\n");
        let bad = StoredUnit { data_b64: "not base64!".into(), target: None };
        assert!(bad.decode_manifest().is_err());
    }

    #[test]
    fn ops_error_messages() {
        let e = OpsError::Command { bin: "cub".into(), args: "unit apply".into(), code: Some(1), stderr: "boom".into() };
        assert_eq!(e.to_string(), "`cub unit apply` exited with Some(1): boom");
    }
}

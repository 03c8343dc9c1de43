//! Argo CD Applications as competing controllers.

use anyhow::{Context, Result};
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
};
use metrics::counter;
use serde_json::json;
use tracing::info;

use crate::ControllerClient;

fn application_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("argoproj.io", "v1alpha1", "Application"))
}

/// Merge patch turning off automated sync.
pub fn disable_sync_patch() -> serde_json::Value {
    json!({ "spec": { "syncPolicy": { "automated": null } } })
}

/// Merge patch dropping finalizers so deletion does not cascade.
pub fn drop_finalizers_patch() -> serde_json::Value {
    json!({ "metadata": { "finalizers": null } })
}

#[derive(Debug, Clone, Default)]
pub struct ArgoClient;

impl ArgoClient {
    pub fn new() -> Self {
        Self
    }

    async fn api(&self, namespace: &str) -> Result<Api<DynamicObject>> {
        let client = hoist_kubehub::get_kube_client().await?;
        Ok(Api::namespaced_with(client, namespace, &application_resource()))
    }
}

#[async_trait::async_trait]
impl ControllerClient for ArgoClient {
    async fn disable_auto_sync(&self, namespace: &str, name: &str) -> Result<()> {
        let api = self.api(namespace).await?;
        let pp = PatchParams::default();
        api.patch(name, &pp, &Patch::Merge(&disable_sync_patch()))
            .await
            .with_context(|| format!("disabling auto-sync on {}/{}", namespace, name))?;
        counter!("argo_autosync_disabled", 1u64);
        info!(ns = %namespace, app = %name, "auto-sync disabled");
        Ok(())
    }

    async fn delete_app(&self, namespace: &str, name: &str) -> Result<()> {
        let api = self.api(namespace).await?;
        let pp = PatchParams::default();
        api.patch(name, &pp, &Patch::Merge(&drop_finalizers_patch()))
            .await
            .with_context(|| format!("removing finalizers from {}/{}", namespace, name))?;
        api.delete(name, &DeleteParams::default())
            .await
            .with_context(|| format!("deleting {}/{}", namespace, name))?;
        counter!("argo_app_deleted", 1u64);
        info!(ns = %namespace, app = %name, "application deleted, workloads kept");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patches_null_out_fields() {
        assert!(disable_sync_patch()["spec"]["syncPolicy"]["automated"].is_null());
        assert!(disable_sync_patch()["spec"]["syncPolicy"].as_object().unwrap().contains_key("automated"));
        assert!(drop_finalizers_patch()["metadata"].as_object().unwrap().contains_key("finalizers"));
    }

    #[test]
    fn application_gvk() {
        let ar = application_resource();
        assert_eq!(ar.api_version, "argoproj.io/v1alpha1");
        assert_eq!(ar.plural, "applications");
    }
}

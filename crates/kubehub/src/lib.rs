//! Hoist kubehub: cluster observation for the import wizard.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{Api, ListParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use metrics::histogram;
use serde_json::Value as Json;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use hoist_core::{GitOpsRef, Owner, WorkloadInfo};

pub mod manifest;
pub mod ownership;

/// Label carrying a Unit slug on workloads already imported once.
pub const UNIT_LABEL: &str = "hoist.dev/unit";

/// Workload kinds the observer lists, as `(group, version, kind)`.
pub const WORKLOAD_KINDS: &[(&str, &str, &str)] = &[
    ("apps", "v1", "Deployment"),
    ("apps", "v1", "StatefulSet"),
    ("apps", "v1", "DaemonSet"),
];

static CLIENT: OnceCell<Client> = OnceCell::const_new();

/// Shared client built from the default kubeconfig / in-cluster config.
pub async fn get_kube_client() -> Result<Client> {
    let client = CLIENT
        .get_or_try_init(|| async { Client::try_default().await })
        .await
        .context("building kube client")?;
    Ok(client.clone())
}

/// Read side of the cluster as seen by the wizard.
#[async_trait::async_trait]
pub trait ClusterObserver: Send + Sync {
    async fn list_namespaces(&self) -> Result<Vec<String>>;
    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadInfo>>;
    /// Re-appliable YAML for one object.
    async fn fetch_manifest(&self, kind: &str, namespace: &str, name: &str) -> Result<Vec<u8>>;
    async fn fetch_live_annotations(&self, kind: &str, namespace: &str, name: &str) -> Result<BTreeMap<String, String>>;
}

/// Resolve a workload kind to its API resource. Only the kinds the observer
/// lists are accepted.
pub fn workload_resource(kind: &str) -> Result<ApiResource> {
    WORKLOAD_KINDS
        .iter()
        .find(|(_, _, k)| k.eq_ignore_ascii_case(kind))
        .map(|(g, v, k)| ApiResource::from_gvk(&GroupVersionKind::gvk(g, v, k)))
        .ok_or_else(|| anyhow!("unsupported workload kind: {}", kind))
}

fn controller_resource(kind: &str) -> Option<ApiResource> {
    let gvk = match kind {
        "Kustomization" => GroupVersionKind::gvk("kustomize.toolkit.fluxcd.io", "v1", "Kustomization"),
        "Application" => GroupVersionKind::gvk("argoproj.io", "v1alpha1", "Application"),
        _ => return None,
    };
    Some(ApiResource::from_gvk(&gvk))
}

/// Source path declared by a Kustomization or Application object.
pub fn controller_path(kind: &str, data: &Json) -> Option<String> {
    let spec = data.get("spec")?;
    let path = match kind {
        "Kustomization" => spec.get("path"),
        "Application" => spec
            .get("source")
            .and_then(|s| s.get("path"))
            .or_else(|| spec.get("sources").and_then(|s| s.get(0)).and_then(|s| s.get("path"))),
        _ => None,
    }?;
    path.as_str().filter(|p| !p.is_empty()).map(|p| p.to_string())
}

/// Build a `WorkloadInfo` from a listed object. Path hints are filled later.
pub fn workload_from_object(kind: &str, obj: &DynamicObject, argocd_ns: &str) -> Option<WorkloadInfo> {
    let name = obj.metadata.name.as_deref()?;
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");
    let labels = obj.metadata.labels.clone().unwrap_or_default();
    let annotations = obj.metadata.annotations.clone().unwrap_or_default();
    let (owner, gitops_ref) = ownership::detect_owner(&labels, &annotations, argocd_ns);
    let (replicas, ready) = manifest::replica_status(kind, &obj.data);

    let mut w = WorkloadInfo::new(kind, namespace, name);
    w.owner = owner;
    w.gitops_ref = gitops_ref;
    w.unit_slug = labels.get(UNIT_LABEL).cloned();
    w.labels = labels;
    w.replicas = replicas;
    w.ready = ready;
    Some(w)
}

/// kube-rs backed observer.
pub struct KubeObserver {
    argocd_namespace: String,
}

impl KubeObserver {
    pub fn new(argocd_namespace: impl Into<String>) -> Self {
        Self { argocd_namespace: argocd_namespace.into() }
    }

    async fn get_object(&self, kind: &str, namespace: &str, name: &str) -> Result<DynamicObject> {
        let client = get_kube_client().await?;
        let ar = workload_resource(kind)?;
        let api: Api<DynamicObject> = Api::namespaced_with(client, namespace, &ar);
        api.get(name)
            .await
            .with_context(|| format!("getting {} {}/{}", kind, namespace, name))
    }

    /// Best-effort: a missing CRD or RBAC denial leaves the hint empty.
    async fn resolve_path(&self, client: &Client, r: &GitOpsRef) -> Option<String> {
        let ar = controller_resource(&r.kind)?;
        let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), &r.namespace, &ar);
        match api.get(&r.name).await {
            Ok(obj) => controller_path(&r.kind, &obj.data),
            Err(e) => {
                debug!(kind = %r.kind, ns = %r.namespace, name = %r.name, error = %e, "path hint lookup failed");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl ClusterObserver for KubeObserver {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let client = get_kube_client().await?;
        let api: Api<Namespace> = Api::all(client);
        let list = api.list(&ListParams::default()).await.context("listing namespaces")?;
        let mut out: Vec<String> = list.items.into_iter().filter_map(|ns| ns.metadata.name).collect();
        out.sort();
        Ok(out)
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadInfo>> {
        let t0 = Instant::now();
        let client = get_kube_client().await?;
        let mut out = Vec::new();
        for (g, v, k) in WORKLOAD_KINDS {
            let ar = ApiResource::from_gvk(&GroupVersionKind::gvk(g, v, k));
            let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);
            let list = api
                .list(&ListParams::default())
                .await
                .with_context(|| format!("listing {} in {}", k, namespace))?;
            out.extend(list.items.iter().filter_map(|o| workload_from_object(k, o, &self.argocd_namespace)));
        }

        let mut cache: HashMap<(String, String, String), Option<String>> = HashMap::new();
        for w in out.iter_mut() {
            let Some(r) = w.gitops_ref.clone() else { continue };
            let key = (r.kind.clone(), r.namespace.clone(), r.name.clone());
            let path = match cache.get(&key) {
                Some(p) => p.clone(),
                None => {
                    let p = self.resolve_path(&client, &r).await;
                    cache.insert(key, p.clone());
                    p
                }
            };
            match w.owner {
                Owner::Flux if r.kind == "Kustomization" => w.kustomization_path = path,
                Owner::ArgoCD => w.application_path = path,
                _ => {}
            }
        }

        histogram!("kube_list_workloads_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(ns = %namespace, count = out.len(), took_ms = %t0.elapsed().as_millis(), "workloads listed");
        Ok(out)
    }

    async fn fetch_manifest(&self, kind: &str, namespace: &str, name: &str) -> Result<Vec<u8>> {
        let obj = self.get_object(kind, namespace, name).await?;
        let raw = serde_json::to_value(&obj).context("serializing DynamicObject")?;
        let yaml = manifest::to_manifest_yaml(raw)?;
        debug!(kind, ns = %namespace, name, bytes = yaml.len(), "manifest exported");
        Ok(yaml.into_bytes())
    }

    async fn fetch_live_annotations(&self, kind: &str, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        let obj = self.get_object(kind, namespace, name).await?;
        Ok(obj.metadata.annotations.unwrap_or_default())
    }
}

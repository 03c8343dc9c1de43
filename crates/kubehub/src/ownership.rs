//! Decode ownership results from well-known controller labels/annotations.

use std::collections::BTreeMap;

use hoist_core::{GitOpsRef, Owner};

pub const FLUX_KS_NAME: &str = "kustomize.toolkit.fluxcd.io/name";
pub const FLUX_KS_NAMESPACE: &str = "kustomize.toolkit.fluxcd.io/namespace";
pub const FLUX_HR_NAME: &str = "helm.toolkit.fluxcd.io/name";
pub const FLUX_HR_NAMESPACE: &str = "helm.toolkit.fluxcd.io/namespace";
pub const ARGO_INSTANCE: &str = "argocd.argoproj.io/instance";
pub const ARGO_TRACKING_ID: &str = "argocd.argoproj.io/tracking-id";
pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";

const GITOPS_PREFIXES: &[&str] = &[
    "kustomize.toolkit.fluxcd.io/",
    "helm.toolkit.fluxcd.io/",
    "fluxcd.io/",
    "argocd.argoproj.io/",
];

type Map = BTreeMap<String, String>;

fn get<'a>(m: &'a Map, k: &str) -> Option<&'a str> {
    m.get(k).map(|s| s.as_str()).filter(|s| !s.is_empty())
}

/// Argo CD tracking id: `<app>:<group>/<kind>:<namespace>/<name>`, where
/// `<app>` may be `<namespace>_<app>` for apps outside the control namespace.
fn parse_tracking_id(id: &str, default_ns: &str) -> Option<(String, String)> {
    let app = id.split(':').next().filter(|s| !s.is_empty())?;
    match app.split_once('_') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() => Some((ns.to_string(), name.to_string())),
        _ => Some((default_ns.to_string(), app.to_string())),
    }
}

/// Owner and controlling GitOps object for a workload.
pub fn detect_owner(labels: &Map, annotations: &Map, argocd_ns: &str) -> (Owner, Option<GitOpsRef>) {
    if let Some(name) = get(labels, FLUX_KS_NAME) {
        let namespace = get(labels, FLUX_KS_NAMESPACE).unwrap_or("flux-system").to_string();
        return (Owner::Flux, Some(GitOpsRef { kind: "Kustomization".into(), name: name.to_string(), namespace }));
    }
    if let Some(name) = get(labels, FLUX_HR_NAME) {
        let namespace = get(labels, FLUX_HR_NAMESPACE).unwrap_or("flux-system").to_string();
        return (Owner::Flux, Some(GitOpsRef { kind: "HelmRelease".into(), name: name.to_string(), namespace }));
    }
    if let Some((namespace, name)) = get(annotations, ARGO_TRACKING_ID).and_then(|id| parse_tracking_id(id, argocd_ns)) {
        return (Owner::ArgoCD, Some(GitOpsRef { kind: "Application".into(), name, namespace }));
    }
    if let Some(name) = get(labels, ARGO_INSTANCE) {
        return (
            Owner::ArgoCD,
            Some(GitOpsRef { kind: "Application".into(), name: name.to_string(), namespace: argocd_ns.to_string() }),
        );
    }
    if get(labels, MANAGED_BY).map_or(false, |v| v.eq_ignore_ascii_case("helm")) {
        return (Owner::Helm, None);
    }
    (Owner::Native, None)
}

/// True when any annotation key belongs to a GitOps controller.
pub fn has_gitops_markers(annotations: &Map) -> bool {
    annotations.keys().any(|k| GITOPS_PREFIXES.iter().any(|p| k.starts_with(p)))
}

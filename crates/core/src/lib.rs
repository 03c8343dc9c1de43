//! Hoist core types: observed workloads, Unit proposals and declared apps.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod slug;

pub use slug::{sanitize, unique_slug};

/// Label map used on workloads and Units. Ordered for deterministic output.
pub type Labels = BTreeMap<String, String>;

/// Variant assigned when no signal yields one.
pub const DEFAULT_VARIANT: &str = "default";

/// Who manages a workload in the cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Owner {
    Flux,
    ArgoCD,
    Helm,
    Native,
}

impl Owner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Owner::Flux => "Flux",
            Owner::ArgoCD => "ArgoCD",
            Owner::Helm => "Helm",
            Owner::Native => "Native",
        }
    }

    /// Flux and Argo CD reconcile from a declarative source.
    pub fn is_gitops(&self) -> bool {
        matches!(self, Owner::Flux | Owner::ArgoCD)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controlling GitOps object (Kustomization, HelmRelease, Application).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitOpsRef {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

/// A workload as observed in the cluster. Read-only for the rest of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadInfo {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub owner: Owner,
    pub gitops_ref: Option<GitOpsRef>,
    pub kustomization_path: Option<String>,
    pub application_path: Option<String>,
    #[serde(default)]
    pub labels: Labels,
    pub ready: bool,
    pub replicas: i32,
    pub unit_slug: Option<String>,
}

impl WorkloadInfo {
    /// Minimal constructor for a native, ready workload.
    pub fn new(kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            owner: Owner::Native,
            gitops_ref: None,
            kustomization_path: None,
            application_path: None,
            labels: Labels::new(),
            ready: true,
            replicas: 1,
            unit_slug: None,
        }
    }

    /// `namespace/name`, the form Units reference workloads by.
    pub fn reference(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Declarative-source path hint; Kustomization path wins over Application path.
    pub fn path_hint(&self) -> Option<&str> {
        self.kustomization_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| self.application_path.as_deref().filter(|p| !p.is_empty()))
    }
}

/// Alignment of a Unit against the declared inventory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UnitStatus {
    Aligned,
    GitOnly,
    ClusterOnly,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Aligned => "aligned",
            UnitStatus::GitOnly => "git-only",
            UnitStatus::ClusterOnly => "cluster-only",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitProposal {
    pub slug: String,
    pub app: String,
    pub variant: String,
    pub region: Option<String>,
    pub tier: Option<String>,
    pub upstream: Option<String>,
    pub git_path: Option<String>,
    /// `namespace/name` references, in insertion order.
    pub workloads: Vec<String>,
    pub status: UnitStatus,
    pub labels: Labels,
}

impl UnitProposal {
    /// New Unit carrying the mandatory `app` and `variant` labels.
    pub fn new(slug: String, app: &str, variant: &str, status: UnitStatus) -> Self {
        let mut labels = Labels::new();
        labels.insert("app".to_string(), app.to_string());
        labels.insert("variant".to_string(), variant.to_string());
        Self {
            slug,
            app: app.to_string(),
            variant: variant.to_string(),
            region: None,
            tier: None,
            upstream: None,
            git_path: None,
            workloads: Vec::new(),
            status,
            labels,
        }
    }
}

/// Declarative base with no direct cluster instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubBase {
    pub slug: String,
    pub app: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriftPolicy {
    Revert,
    Accept,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalPolicy {
    Required,
    None,
}

/// Suggested reconciliation behavior for one variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub drift: DriftPolicy,
    pub approval: ApprovalPolicy,
}

impl fmt::Display for ReconcilePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let drift = match self.drift {
            DriftPolicy::Revert => "revert",
            DriftPolicy::Accept => "accept",
        };
        let approval = match self.approval {
            ApprovalPolicy::Required => "required",
            ApprovalPolicy::None => "none",
        };
        write!(f, "drift:{}, approval:{}", drift, approval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FullProposal {
    pub app_space: String,
    pub deployer: Option<Owner>,
    pub bases: Vec<HubBase>,
    pub units: Vec<UnitProposal>,
    pub reconcile: BTreeMap<String, ReconcilePolicy>,
    pub git_only: Vec<String>,
    pub orphans: Vec<String>,
}

impl FullProposal {
    pub fn unit_index(&self, slug: &str) -> Option<usize> {
        self.units.iter().position(|u| u.slug == slug)
    }

    /// Every workload reference across all Units, in Unit order.
    pub fn workload_refs(&self) -> impl Iterator<Item = &str> {
        self.units.iter().flat_map(|u| u.workloads.iter().map(|s| s.as_str()))
    }
}

/// Output of a declarative-source parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeclaredRepo {
    pub kind: String,
    pub apps: Vec<DeclaredApp>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeclaredApp {
    pub name: String,
    pub base_path: String,
    pub variants: Vec<DeclaredVariant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeclaredVariant {
    pub name: String,
    pub path: String,
}

pub mod prelude {
    pub use super::{
        DeclaredApp, DeclaredRepo, DeclaredVariant, FullProposal, GitOpsRef, HubBase, Labels,
        Owner, ReconcilePolicy, UnitProposal, UnitStatus, WorkloadInfo, DEFAULT_VARIANT,
    };
}

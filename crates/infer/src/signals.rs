//! Signal extraction: derive `(app, variant)` for a single workload.
//!
//! Heuristics run in a fixed order and each attribute is filled by the first
//! signal that yields a non-empty value:
//!
//! 1. declarative-source path hint (variant only)
//! 2. `app.kubernetes.io/name` / `app.kubernetes.io/instance`
//! 3. `app` / `environment` / `env` labels
//! 4. namespace pattern (`<app>-<variant>` or `<variant>-<app>`)
//! 5. workload name (app only)

use hoist_core::WorkloadInfo;

/// Recognized variant spellings, before normalization.
pub const VARIANT_KEYWORDS: &[&str] = &[
    "prod",
    "production",
    "staging",
    "stage",
    "stg",
    "dev",
    "development",
    "test",
    "testing",
    "qa",
    "uat",
    "sit",
    "demo",
    "sandbox",
    "preview",
    "canary",
];

const SYSTEM_NAMESPACES: &[&str] = &[
    "default",
    "kube-system",
    "kube-public",
    "kube-node-lease",
    "flux-system",
    "argocd",
    "argo-cd",
    "cert-manager",
    "ingress-nginx",
    "istio-system",
    "monitoring",
    "gatekeeper-system",
    "local-path-storage",
];

const SYSTEM_PREFIXES: &[&str] = &["kube-", "openshift-", "cattle-", "gke-", "aks-", "eks-"];

const LABEL_K8S_NAME: &str = "app.kubernetes.io/name";
const LABEL_K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Which heuristic produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Path,
    RecommendedLabels,
    CommonLabels,
    Namespace,
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signals {
    pub app: String,
    pub variant: String,
    pub app_source: Source,
    pub variant_source: Option<Source>,
}

impl Signals {
    /// True when `app` came from an actual signal rather than the name fallback.
    pub fn app_inferred(&self) -> bool {
        self.app_source != Source::Name
    }
}

/// Map synonyms onto the canonical variant vocabulary. Unknown values pass
/// through (lowercased).
pub fn normalize_variant(v: &str) -> String {
    let v = v.trim().to_ascii_lowercase();
    match v.as_str() {
        "production" => "prod".to_string(),
        "development" => "dev".to_string(),
        "stage" | "staging" => "staging".to_string(),
        "testing" => "test".to_string(),
        _ => v,
    }
}

pub fn is_variant_keyword(s: &str) -> bool {
    VARIANT_KEYWORDS.contains(&s)
}

/// Scan a declarative-source path for a variant keyword.
pub fn extract_variant(path: &str) -> String {
    let lowered = path.trim().to_ascii_lowercase();
    let trimmed = lowered.trim_start_matches("./");
    let segments: Vec<&str> = trimmed
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if let Some(seg) = segments.iter().find(|s| is_variant_keyword(s)) {
        return normalize_variant(seg);
    }
    if let [only] = segments.as_slice() {
        let normalized = normalize_variant(only);
        if VARIANT_KEYWORDS.iter().any(|k| normalize_variant(k) == normalized) {
            return normalized;
        }
    }
    String::new()
}

pub fn is_system_namespace(ns: &str) -> bool {
    SYSTEM_NAMESPACES.contains(&ns) || SYSTEM_PREFIXES.iter().any(|p| ns.starts_with(p))
}

/// Split `myapp-prod` / `prod-myapp` into `(app, variant)`. System namespaces
/// and namespaces without a keyword come back unchanged with no variant.
pub fn parse_namespace(ns: &str) -> (String, String) {
    if is_system_namespace(ns) {
        return (ns.to_string(), String::new());
    }
    for kw in VARIANT_KEYWORDS {
        if let Some(rest) = ns.strip_suffix(kw).and_then(|r| r.strip_suffix('-')) {
            if !rest.is_empty() {
                return (rest.to_string(), normalize_variant(kw));
            }
        }
    }
    for kw in VARIANT_KEYWORDS {
        if let Some(rest) = ns.strip_prefix(kw).and_then(|r| r.strip_prefix('-')) {
            if !rest.is_empty() {
                return (rest.to_string(), normalize_variant(kw));
            }
        }
    }
    (ns.to_string(), String::new())
}

fn instance_variant(instance: &str, name: &str) -> Option<String> {
    if instance.is_empty() || instance == name {
        return None;
    }
    if let Some(suffix) = instance.strip_prefix(name).and_then(|r| r.strip_prefix('-')) {
        if !suffix.is_empty() {
            return Some(normalize_variant(suffix));
        }
    }
    VARIANT_KEYWORDS
        .iter()
        .find(|kw| instance == **kw || instance.ends_with(&format!("-{}", kw)))
        .map(|kw| normalize_variant(kw))
}

fn label_value<'a>(w: &'a WorkloadInfo, key: &str) -> Option<&'a str> {
    w.labels.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Classify a workload. Never fails; missing signals leave the attribute
/// empty and `app` finally falls back to the workload name.
pub fn classify(w: &WorkloadInfo) -> Signals {
    let label = |k: &str| label_value(w, k);

    let mut app: Option<(String, Source)> = None;
    let mut variant: Option<(String, Source)> = None;

    if let Some(path) = w.path_hint() {
        let v = extract_variant(path);
        if !v.is_empty() {
            variant = Some((v, Source::Path));
        }
    }

    if let Some(name) = label(LABEL_K8S_NAME) {
        app = Some((name.to_string(), Source::RecommendedLabels));
        if variant.is_none() {
            variant = label(LABEL_K8S_INSTANCE)
                .and_then(|inst| instance_variant(inst, name))
                .map(|v| (v, Source::RecommendedLabels));
        }
    }

    if app.is_none() {
        app = label("app").map(|a| (a.to_string(), Source::CommonLabels));
    }
    if variant.is_none() {
        variant = label("environment")
            .or_else(|| label("env"))
            .map(|v| (normalize_variant(v), Source::CommonLabels));
    }

    if app.is_none() || variant.is_none() {
        let (ns_app, ns_variant) = parse_namespace(&w.namespace);
        if !ns_variant.is_empty() {
            if app.is_none() {
                app = Some((ns_app, Source::Namespace));
            }
            if variant.is_none() {
                variant = Some((ns_variant, Source::Namespace));
            }
        }
    }

    let (app, app_source) = app.unwrap_or_else(|| (w.name.clone(), Source::Name));
    let (variant, variant_source) = match variant {
        Some((v, s)) => (v, Some(s)),
        None => (String::new(), None),
    };
    Signals { app, variant, app_source, variant_source }
}

//! Partition classified workloads into Units.

use std::collections::HashMap;

use hoist_core::{sanitize, unique_slug, UnitProposal, UnitStatus, WorkloadInfo, DEFAULT_VARIANT};

use crate::signals::classify;

const REGION_LABELS: &[&str] = &["region", "topology.kubernetes.io/region", "cloud.region"];
const TIER_LABELS: &[&str] = &["tier", "app.kubernetes.io/component", "component"];
const TEAM_LABELS: &[&str] = &["team", "squad", "app.kubernetes.io/team", "owner-team"];

// Longer names first so `us-east-1` wins over `us-east`.
const REGION_NAMES: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-southeast-1",
    "ap-northeast-1",
    "us-east",
    "us-west",
    "eu-west",
    "eu-central",
    "ap-southeast",
    "ap-northeast",
    "emea",
    "apac",
    "amer",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupingMode {
    /// Group by inferred `(app, variant)`.
    #[default]
    Attribute,
    /// GitOps-owned workloads group by their controlling object's name.
    ControllerAware,
}

/// Workloads sharing one grouping key.
#[derive(Debug)]
pub(crate) struct Group<'a> {
    pub app: String,
    pub variant: String,
    pub members: Vec<&'a WorkloadInfo>,
}

pub(crate) fn variant_or_default(v: String) -> String {
    if v.is_empty() { DEFAULT_VARIANT.to_string() } else { v }
}

/// Slug for a group key: `key` alone for the default variant, else `key-variant`.
/// A key that already carries the variant still gets the suffix.
pub fn derive_slug(key: &str, variant: &str) -> String {
    if variant.is_empty() || variant == DEFAULT_VARIANT {
        return sanitize(key);
    }
    sanitize(&format!("{}-{}", key, variant))
}

pub(crate) fn collect_groups<'a, I>(workloads: I, mode: GroupingMode) -> Vec<Group<'a>>
where
    I: IntoIterator<Item = &'a WorkloadInfo>,
{
    let mut groups: Vec<Group<'a>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for w in workloads {
        let sig = classify(w);
        let variant = variant_or_default(sig.variant);
        let controller = match mode {
            GroupingMode::ControllerAware if w.owner.is_gitops() => w
                .gitops_ref
                .as_ref()
                .map(|r| r.name.trim())
                .filter(|n| !n.is_empty()),
            _ => None,
        };
        let (key, app) = match controller {
            Some(name) => (format!("ctrl\u{0}{}", name), name.to_string()),
            None => (format!("attr\u{0}{}\u{0}{}", sig.app, variant), sig.app),
        };
        match index.get(&key) {
            Some(&i) => groups[i].members.push(w),
            None => {
                index.insert(key, groups.len());
                groups.push(Group { app, variant, members: vec![w] });
            }
        }
    }
    groups
}

fn first_label(members: &[&WorkloadInfo], keys: &[&str]) -> Option<String> {
    members.iter().find_map(|w| {
        keys.iter()
            .find_map(|k| w.labels.get(*k).map(|v| v.trim()).filter(|v| !v.is_empty()))
            .map(str::to_string)
    })
}

fn region_from_path(path: &str) -> Option<String> {
    let lowered = path.to_ascii_lowercase();
    REGION_NAMES.iter().find(|r| lowered.contains(**r)).map(|r| r.to_string())
}

/// Team fallback: App Space name minus a trailing `-team`.
pub fn team_from_space(app_space: &str) -> Option<String> {
    let t = app_space.strip_suffix("-team").unwrap_or(app_space);
    if t.is_empty() { None } else { Some(t.to_string()) }
}

/// Fill owner/region/tier/team/git path on `unit` from its members; the first
/// non-empty value across members wins. `declared_path` is consulted for
/// region after the members' own path hints.
pub(crate) fn apply_group_attributes(
    unit: &mut UnitProposal,
    members: &[&WorkloadInfo],
    app_space: &str,
    declared_path: Option<&str>,
) {
    if unit.git_path.is_none() {
        unit.git_path = members.iter().find_map(|w| w.path_hint()).map(str::to_string);
    }
    if let Some(first) = members.first() {
        unit.labels.insert("owner".to_string(), first.owner.as_str().to_string());
    }

    unit.region = first_label(members, REGION_LABELS)
        .or_else(|| members.iter().find_map(|w| w.path_hint().and_then(region_from_path)))
        .or_else(|| declared_path.and_then(region_from_path));
    unit.tier = first_label(members, TIER_LABELS);
    let team = first_label(members, TEAM_LABELS).or_else(|| team_from_space(app_space));

    if let Some(r) = &unit.region {
        unit.labels.insert("region".to_string(), r.clone());
    }
    if let Some(t) = &unit.tier {
        unit.labels.insert("tier".to_string(), t.clone());
    }
    if let Some(t) = team {
        unit.labels.insert("team".to_string(), t);
    }
}

/// Build a Unit from a group. The slug is provisional; callers make it unique.
pub(crate) fn unit_from_group(group: &Group<'_>, app_space: &str) -> UnitProposal {
    let status = if group.members.iter().any(|w| w.path_hint().is_some()) {
        UnitStatus::Aligned
    } else {
        UnitStatus::ClusterOnly
    };
    let slug = derive_slug(&group.app, &group.variant);
    let mut unit = UnitProposal::new(slug, &group.app, &group.variant, status);
    unit.workloads = group.members.iter().map(|w| w.reference()).collect();
    apply_group_attributes(&mut unit, &group.members, app_space, None);
    unit
}

/// Rewrite slugs so that no two Units share one. Earlier Units keep theirs.
pub(crate) fn dedupe_slugs(units: &mut [UnitProposal]) {
    let mut taken: Vec<String> = Vec::with_capacity(units.len());
    for u in units.iter_mut() {
        let slug = unique_slug(&u.slug, taken.iter().map(|s| s.as_str()));
        u.slug = slug.clone();
        taken.push(slug);
    }
}

pub(crate) fn sort_units(units: &mut [UnitProposal], mode: GroupingMode) {
    match mode {
        GroupingMode::Attribute => {
            units.sort_by(|a, b| a.app.cmp(&b.app).then_with(|| a.variant.cmp(&b.variant)))
        }
        GroupingMode::ControllerAware => units.sort_by(|a, b| a.app.cmp(&b.app)),
    }
}

/// Group workloads into Units. Every input workload lands in exactly one Unit.
pub fn group_workloads(workloads: &[WorkloadInfo], app_space: &str, mode: GroupingMode) -> Vec<UnitProposal> {
    let groups = collect_groups(workloads.iter(), mode);
    tracing::debug!(workloads = workloads.len(), groups = groups.len(), ?mode, "grouped workloads");
    let mut units: Vec<UnitProposal> = groups.iter().map(|g| unit_from_group(g, app_space)).collect();
    sort_units(&mut units, mode);
    dedupe_slugs(&mut units);
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::{GitOpsRef, Owner};
    use std::collections::HashSet;

    fn wl(ns: &str, name: &str, labels: &[(&str, &str)]) -> WorkloadInfo {
        let mut w = WorkloadInfo::new("Deployment", ns, name);
        for (k, v) in labels {
            w.labels.insert(k.to_string(), v.to_string());
        }
        w
    }

    fn argo(ns: &str, name: &str, app: &str, labels: &[(&str, &str)]) -> WorkloadInfo {
        let mut w = wl(ns, name, labels);
        w.owner = Owner::ArgoCD;
        w.gitops_ref = Some(GitOpsRef { kind: "Application".into(), name: app.into(), namespace: "argocd".into() });
        w
    }

    #[test]
    fn derive_slug_rules() {
        assert_eq!(derive_slug("Web", "default"), "web");
        assert_eq!(derive_slug("web", ""), "web");
        assert_eq!(derive_slug("web", "prod"), "web-prod");
        assert_eq!(derive_slug("cart-dev", "dev"), "cart-dev-dev");
        assert_eq!(derive_slug("My API", "staging"), "my-api-staging");
    }

    #[test]
    fn attribute_mode_groups_by_app_and_variant() {
        let ws = vec![
            wl("shop", "api-a", &[("app", "api"), ("env", "prod")]),
            wl("shop", "api-b", &[("app", "api"), ("env", "production")]),
            wl("shop", "api-c", &[("app", "api"), ("env", "dev")]),
            wl("shop", "web", &[("app", "web")]),
        ];
        let units = group_workloads(&ws, "shop-team", GroupingMode::Attribute);
        let slugs: Vec<_> = units.iter().map(|u| u.slug.as_str()).collect();
        assert_eq!(slugs, vec!["api-dev", "api-prod", "web"]);
        assert_eq!(units[1].workloads, vec!["shop/api-a", "shop/api-b"]);
        assert_eq!(units[2].variant, "default");
        assert_eq!(units[2].labels.get("team").map(String::as_str), Some("shop"));
    }

    #[test]
    fn every_workload_referenced_once() {
        let ws: Vec<_> = (0..20)
            .map(|i| {
                let env = ["prod", "dev", "staging", ""][i % 4];
                let app = format!("a{}", i % 5);
                wl(&format!("ns{}", i % 3), &format!("w{}", i), &[("app", app.as_str()), ("env", env)])
            })
            .collect();
        for mode in [GroupingMode::Attribute, GroupingMode::ControllerAware] {
            let units = group_workloads(&ws, "x", mode);
            assert!(!units.is_empty());
            let refs: Vec<&str> = units.iter().flat_map(|u| u.workloads.iter().map(|s| s.as_str())).collect();
            assert_eq!(refs.len(), ws.len());
            let uniq: HashSet<&str> = refs.iter().copied().collect();
            let expected: HashSet<String> = ws.iter().map(|w| w.reference()).collect();
            assert_eq!(uniq.len(), ws.len());
            assert!(expected.iter().all(|r| uniq.contains(r.as_str())));
        }
    }

    #[test]
    fn controller_aware_groups_by_controller_name() {
        let ws = vec![
            argo("shop", "api", "shop-prod", &[("app", "api"), ("env", "prod")]),
            argo("shop", "web", "shop-prod", &[("app", "web"), ("env", "prod")]),
            wl("tools", "runner", &[("app", "runner")]),
        ];
        let units = group_workloads(&ws, "shop-team", GroupingMode::ControllerAware);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].app, "runner");
        assert_eq!(units[1].app, "shop-prod");
        assert_eq!(units[1].slug, "shop-prod-prod");
        assert_eq!(units[1].workloads, vec!["shop/api", "shop/web"]);
        assert_eq!(units[1].labels.get("owner").map(String::as_str), Some("ArgoCD"));

        let flat = group_workloads(&ws, "shop-team", GroupingMode::Attribute);
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn first_non_empty_attribute_wins() {
        let ws = vec![
            wl("a", "one", &[("app", "api"), ("tier", ""), ("region", "eu-west-1")]),
            wl("a", "two", &[("app", "api"), ("tier", "backend"), ("region", "us-east-1"), ("team", "payments")]),
        ];
        let units = group_workloads(&ws, "shop-team", GroupingMode::Attribute);
        assert_eq!(units.len(), 1);
        let u = &units[0];
        assert_eq!(u.region.as_deref(), Some("eu-west-1"));
        assert_eq!(u.tier.as_deref(), Some("backend"));
        assert_eq!(u.labels.get("team").map(String::as_str), Some("payments"));
    }

    #[test]
    fn region_from_declarative_path() {
        let mut w = wl("a", "one", &[("app", "api")]);
        w.owner = Owner::Flux;
        w.kustomization_path = Some("./clusters/us-west-2/prod".into());
        let units = group_workloads(&[w], "", GroupingMode::Attribute);
        assert_eq!(units[0].region.as_deref(), Some("us-west-2"));
        assert_eq!(units[0].variant, "prod");
        assert_eq!(units[0].status, UnitStatus::Aligned);
        assert!(!units[0].labels.contains_key("team"));
    }

    #[test]
    fn colliding_slugs_are_suffixed() {
        let ws = vec![wl("a", "x", &[("app", "My App")]), wl("a", "y", &[("app", "my-app")])];
        let units = group_workloads(&ws, "t", GroupingMode::Attribute);
        let slugs: Vec<_> = units.iter().map(|u| u.slug.as_str()).collect();
        assert_eq!(slugs, vec!["my-app", "my-app-2"]);
    }
}

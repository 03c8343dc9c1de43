//! Assemble a full proposal: Units plus App Space metadata.

use std::collections::BTreeMap;

use hoist_core::{
    sanitize, ApprovalPolicy, DeclaredRepo, DriftPolicy, FullProposal, HubBase, Owner, ReconcilePolicy,
    UnitProposal, UnitStatus, WorkloadInfo, DEFAULT_VARIANT,
};
use tracing::info;

use crate::grouping::{
    apply_group_attributes, collect_groups, dedupe_slugs, derive_slug, group_workloads, sort_units,
    unit_from_group, variant_or_default, GroupingMode,
};
use crate::signals::{classify, normalize_variant, parse_namespace, Signals};

/// App Space name used when nothing better can be inferred.
pub const DEFAULT_APP_SPACE: &str = "imported-team";

/// Fixed reconciliation suggestion per canonical variant.
pub fn suggest_policy(variant: &str) -> Option<ReconcilePolicy> {
    match variant {
        "prod" => Some(ReconcilePolicy { drift: DriftPolicy::Revert, approval: ApprovalPolicy::Required }),
        "staging" => Some(ReconcilePolicy { drift: DriftPolicy::Revert, approval: ApprovalPolicy::None }),
        "dev" => Some(ReconcilePolicy { drift: DriftPolicy::Accept, approval: ApprovalPolicy::None }),
        _ => None,
    }
}

/// Pick the App Space name: hint, then a strictly dominant inferred app, then
/// the first workload's namespace pattern, then [`DEFAULT_APP_SPACE`].
pub fn infer_app_space(workloads: &[WorkloadInfo], hint: Option<&str>) -> String {
    if let Some(h) = hint.map(sanitize).filter(|h| !h.is_empty()) {
        return h;
    }

    let mut counts: Vec<(String, usize)> = Vec::new();
    for sig in workloads.iter().map(classify).filter(Signals::app_inferred) {
        match counts.iter_mut().find(|(app, _)| *app == sig.app) {
            Some((_, n)) => *n += 1,
            None => counts.push((sig.app, 1)),
        }
    }
    if let Some(max) = counts.iter().map(|(_, n)| *n).max() {
        let mut top = counts.iter().filter(|(_, n)| *n == max);
        if let (Some((app, _)), None) = (top.next(), top.next()) {
            let slug = sanitize(app);
            if !slug.is_empty() {
                return format!("{}-team", slug);
            }
        }
    }

    if let Some(first) = workloads.first() {
        let (app, variant) = parse_namespace(&first.namespace);
        let slug = sanitize(&app);
        if !variant.is_empty() && !slug.is_empty() {
            return format!("{}-team", slug);
        }
    }
    DEFAULT_APP_SPACE.to_string()
}

/// Most common non-Native owner; ties go to the owner seen first.
pub fn dominant_deployer(workloads: &[WorkloadInfo]) -> Option<Owner> {
    let mut counts: Vec<(Owner, usize)> = Vec::new();
    for w in workloads.iter().filter(|w| w.owner != Owner::Native) {
        match counts.iter_mut().find(|(o, _)| *o == w.owner) {
            Some((_, n)) => *n += 1,
            None => counts.push((w.owner, 1)),
        }
    }
    let mut best: Option<(Owner, usize)> = None;
    for (owner, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((owner, n));
        }
    }
    best.map(|(o, _)| o)
}

fn reconcile_for(units: &[UnitProposal]) -> BTreeMap<String, ReconcilePolicy> {
    units
        .iter()
        .filter(|u| !u.workloads.is_empty())
        .filter_map(|u| suggest_policy(&u.variant).map(|p| (u.variant.clone(), p)))
        .collect()
}

fn trim_path(p: &str) -> &str {
    p.trim().trim_start_matches("./").trim_end_matches('/')
}

/// A declared base path that is a shared template rather than an instance.
pub fn is_base_path(path: &str) -> bool {
    trim_path(path).split('/').any(|seg| seg.eq_ignore_ascii_case("base"))
}

fn finish(mut proposal: FullProposal, mode: GroupingMode) -> FullProposal {
    sort_units(&mut proposal.units, mode);
    dedupe_slugs(&mut proposal.units);
    proposal.reconcile = reconcile_for(&proposal.units);
    info!(
        space = %proposal.app_space,
        units = proposal.units.len(),
        bases = proposal.bases.len(),
        git_only = proposal.git_only.len(),
        orphans = proposal.orphans.len(),
        "proposal built"
    );
    proposal
}

/// Build a proposal in attribute mode, aligning against `declared` when given.
pub fn build_proposal(
    workloads: &[WorkloadInfo],
    declared: Option<&DeclaredRepo>,
    app_space_hint: Option<&str>,
) -> FullProposal {
    let app_space = infer_app_space(workloads, app_space_hint);
    let deployer = dominant_deployer(workloads);

    let Some(repo) = declared else {
        let units = group_workloads(workloads, &app_space, GroupingMode::Attribute);
        let proposal = FullProposal { app_space, deployer, units, ..Default::default() };
        return finish(proposal, GroupingMode::Attribute);
    };

    let signals: Vec<Signals> = workloads.iter().map(classify).collect();
    let mut claimed = vec![false; workloads.len()];
    let mut proposal = FullProposal { app_space, deployer, ..Default::default() };

    for app in &repo.apps {
        let base_slug = if is_base_path(&app.base_path) {
            let slug = sanitize(&format!("{}-base", app.name));
            proposal.bases.push(HubBase { slug: slug.clone(), app: app.name.clone(), path: app.base_path.clone() });
            Some(slug)
        } else {
            None
        };

        let variants: Vec<(String, String)> = if app.variants.is_empty() {
            if base_slug.is_some() {
                Vec::new()
            } else {
                vec![(DEFAULT_VARIANT.to_string(), app.base_path.clone())]
            }
        } else {
            app.variants
                .iter()
                .map(|v| (variant_or_default(normalize_variant(&v.name)), v.path.clone()))
                .collect()
        };

        let app_slug = sanitize(&app.name);
        for (variant, path) in variants {
            let mut members: Vec<&WorkloadInfo> = Vec::new();
            for (i, w) in workloads.iter().enumerate() {
                if claimed[i] {
                    continue;
                }
                let sig = &signals[i];
                let by_attr = sanitize(&sig.app) == app_slug && variant_or_default(sig.variant.clone()) == variant;
                let by_path = w.path_hint().map_or(false, |p| trim_path(p) == trim_path(&path));
                if by_attr || by_path {
                    claimed[i] = true;
                    members.push(w);
                }
            }

            let status = if members.is_empty() { UnitStatus::GitOnly } else { UnitStatus::Aligned };
            let mut unit = UnitProposal::new(derive_slug(&app.name, &variant), &app.name, &variant, status);
            unit.git_path = Some(path.clone());
            unit.upstream = base_slug.clone();
            unit.workloads = members.iter().map(|w| w.reference()).collect();
            apply_group_attributes(&mut unit, &members, &proposal.app_space, Some(&path));
            if members.is_empty() {
                proposal.git_only.push(format!("{}/{}", app.name, variant));
            }
            proposal.units.push(unit);
        }
    }

    let leftovers = workloads.iter().enumerate().filter(|(i, _)| !claimed[*i]).map(|(_, w)| w);
    for group in collect_groups(leftovers, GroupingMode::Attribute) {
        let mut unit = unit_from_group(&group, &proposal.app_space);
        unit.status = UnitStatus::ClusterOnly;
        if !proposal.orphans.contains(&group.app) {
            proposal.orphans.push(group.app.clone());
        }
        proposal.units.push(unit);
    }

    finish(proposal, GroupingMode::Attribute)
}

/// Controller-aware proposal: GitOps-owned workloads group under the name of
/// the object that reconciles them.
pub fn build_controller_proposal(workloads: &[WorkloadInfo], app_space_hint: Option<&str>) -> FullProposal {
    let app_space = infer_app_space(workloads, app_space_hint);
    let deployer = dominant_deployer(workloads);
    let units = group_workloads(workloads, &app_space, GroupingMode::ControllerAware);
    finish(FullProposal { app_space, deployer, units, ..Default::default() }, GroupingMode::ControllerAware)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::{DeclaredApp, DeclaredVariant, GitOpsRef};

    fn wl(ns: &str, name: &str, labels: &[(&str, &str)]) -> WorkloadInfo {
        let mut w = WorkloadInfo::new("Deployment", ns, name);
        for (k, v) in labels {
            w.labels.insert(k.to_string(), v.to_string());
        }
        w
    }

    fn podinfo_repo() -> DeclaredRepo {
        DeclaredRepo {
            kind: "kustomize".into(),
            apps: vec![DeclaredApp {
                name: "podinfo".into(),
                base_path: "apps/podinfo/base".into(),
                variants: vec![
                    DeclaredVariant { name: "production".into(), path: "apps/podinfo/overlays/production".into() },
                    DeclaredVariant { name: "staging".into(), path: "apps/podinfo/overlays/staging".into() },
                ],
            }],
        }
    }

    #[test]
    fn policies_for_known_variants_only() {
        assert_eq!(suggest_policy("prod").map(|p| p.to_string()).as_deref(), Some("drift:revert, approval:required"));
        assert_eq!(suggest_policy("staging").map(|p| p.approval), Some(ApprovalPolicy::None));
        assert_eq!(suggest_policy("dev").map(|p| p.drift), Some(DriftPolicy::Accept));
        assert!(suggest_policy("qa").is_none());
        assert!(suggest_policy("default").is_none());
    }

    #[test]
    fn app_space_prefers_hint_then_dominant_app() {
        let ws = vec![
            wl("shop", "a", &[("app", "shop")]),
            wl("shop", "b", &[("app", "shop")]),
            wl("shop", "c", &[("app", "other")]),
        ];
        assert_eq!(infer_app_space(&ws, Some("Payments Team")), "payments-team");
        assert_eq!(infer_app_space(&ws, Some("  ")), "shop-team");
        assert_eq!(infer_app_space(&ws, None), "shop-team");
    }

    #[test]
    fn app_space_ignores_name_fallback_and_uses_namespace() {
        let ws = vec![wl("orders-prod", "x", &[]), wl("orders-prod", "y", &[])];
        // namespace pattern supplies the app, so it counts as inferred
        assert_eq!(infer_app_space(&ws, None), "orders-team");

        let ws = vec![wl("tools", "x", &[]), wl("tools", "y", &[])];
        assert_eq!(infer_app_space(&ws, None), DEFAULT_APP_SPACE);
        assert_eq!(infer_app_space(&[], None), DEFAULT_APP_SPACE);
    }

    #[test]
    fn deployer_excludes_native_and_breaks_ties_by_first_seen() {
        let mut a = wl("x", "a", &[]);
        a.owner = Owner::Helm;
        let mut b = wl("x", "b", &[]);
        b.owner = Owner::Flux;
        let c = wl("x", "c", &[]);
        let d = wl("x", "d", &[]);
        assert_eq!(dominant_deployer(&[c.clone(), d.clone()]), None);
        assert_eq!(dominant_deployer(&[c.clone(), a.clone(), b.clone(), d]), Some(Owner::Helm));
        let mut b2 = b.clone();
        b2.name = "b2".into();
        assert_eq!(dominant_deployer(&[a, b, b2, c]), Some(Owner::Flux));
    }

    #[test]
    fn declared_inventory_aligns_git_only_and_orphans() {
        let mut prod = wl("podinfo-prod", "podinfo", &[("app.kubernetes.io/name", "podinfo")]);
        prod.owner = Owner::Flux;
        prod.gitops_ref = Some(GitOpsRef { kind: "Kustomization".into(), name: "podinfo".into(), namespace: "flux-system".into() });
        prod.kustomization_path = Some("./apps/podinfo/overlays/production".into());
        let stray = wl("default", "nginx", &[("app", "nginx")]);

        let p = build_proposal(&[prod, stray], Some(&podinfo_repo()), None);
        assert_eq!(p.bases.len(), 1);
        assert_eq!(p.bases[0].slug, "podinfo-base");

        let slugs: Vec<_> = p.units.iter().map(|u| (u.slug.as_str(), u.status)).collect();
        assert_eq!(
            slugs,
            vec![
                ("nginx", UnitStatus::ClusterOnly),
                ("podinfo-prod", UnitStatus::Aligned),
                ("podinfo-staging", UnitStatus::GitOnly),
            ]
        );
        let prod_unit = &p.units[1];
        assert_eq!(prod_unit.workloads, vec!["podinfo-prod/podinfo"]);
        assert_eq!(prod_unit.upstream.as_deref(), Some("podinfo-base"));
        assert_eq!(p.git_only, vec!["podinfo/staging"]);
        assert_eq!(p.orphans, vec!["nginx"]);
        assert_eq!(p.deployer, Some(Owner::Flux));
        assert!(p.reconcile.contains_key("prod"));
        assert!(!p.reconcile.contains_key("staging"), "staging has no observed workloads");
    }

    #[test]
    fn controller_proposal_sorted_by_app() {
        let mut a = wl("shop", "api", &[("app", "api"), ("env", "prod")]);
        a.owner = Owner::ArgoCD;
        a.gitops_ref = Some(GitOpsRef { kind: "Application".into(), name: "storefront".into(), namespace: "argocd".into() });
        let b = wl("shop", "cache", &[("app", "cache")]);
        let p = build_controller_proposal(&[a, b], Some("shop"));
        let apps: Vec<_> = p.units.iter().map(|u| u.app.as_str()).collect();
        assert_eq!(apps, vec!["cache", "storefront"]);
        assert_eq!(p.units[1].slug, "storefront-prod");
        assert_eq!(p.deployer, Some(Owner::ArgoCD));
    }
}

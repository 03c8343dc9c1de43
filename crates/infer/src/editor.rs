//! In-place edits on a proposal during the configuration step.
//!
//! Every operation returns `true` when it changed the proposal. Invalid input
//! (empty names, malformed labels, out-of-range indices, slug clashes) leaves
//! the proposal untouched and returns `false`.

use hoist_core::{sanitize, FullProposal};

/// Labels every Unit must carry with a non-empty value.
const RESERVED_LABELS: &[&str] = &["app", "variant"];

pub trait ProposalEditor {
    fn rename_unit(&mut self, idx: usize, input: &str) -> bool;
    fn rename_space(&mut self, input: &str) -> bool;
    /// `key=value`, split on the first `=`.
    fn add_label(&mut self, idx: usize, input: &str) -> bool;
    fn edit_label(&mut self, idx: usize, key: &str, value: &str) -> bool;
    fn delete_label(&mut self, idx: usize, key: &str) -> bool;
    /// Fold Unit `src` into Unit `dst` and drop `src`. Indices above `src`
    /// shift down by one afterwards.
    fn merge_units(&mut self, src: usize, dst: usize) -> bool;
    /// Refuses to remove the last Unit.
    fn delete_unit(&mut self, idx: usize) -> bool;
}

fn set_label(p: &mut FullProposal, idx: usize, key: &str, value: &str) -> bool {
    let Some(unit) = p.units.get_mut(idx) else { return false };
    let value = value.trim();
    if RESERVED_LABELS.contains(&key) && value.is_empty() {
        return false;
    }
    if unit.labels.get(key).map(String::as_str) == Some(value) {
        return false;
    }
    match key {
        "app" => unit.app = value.to_string(),
        "variant" => unit.variant = value.to_string(),
        "region" => unit.region = Some(value.to_string()),
        "tier" => unit.tier = Some(value.to_string()),
        _ => {}
    }
    unit.labels.insert(key.to_string(), value.to_string());
    true
}

impl ProposalEditor for FullProposal {
    fn rename_unit(&mut self, idx: usize, input: &str) -> bool {
        let slug = sanitize(input);
        if slug.is_empty() || idx >= self.units.len() {
            return false;
        }
        if self.units.iter().enumerate().any(|(i, u)| u.slug == slug && i != idx) {
            return false;
        }
        if self.units[idx].slug == slug {
            return false;
        }
        self.units[idx].slug = slug;
        true
    }

    fn rename_space(&mut self, input: &str) -> bool {
        let name = sanitize(input);
        if name.is_empty() || name == self.app_space {
            return false;
        }
        self.app_space = name;
        true
    }

    fn add_label(&mut self, idx: usize, input: &str) -> bool {
        let Some((key, value)) = input.split_once('=') else { return false };
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        set_label(self, idx, key, value)
    }

    fn edit_label(&mut self, idx: usize, key: &str, value: &str) -> bool {
        let exists = self.units.get(idx).map_or(false, |u| u.labels.contains_key(key));
        exists && set_label(self, idx, key, value)
    }

    fn delete_label(&mut self, idx: usize, key: &str) -> bool {
        if key.is_empty() || RESERVED_LABELS.contains(&key) {
            return false;
        }
        let Some(unit) = self.units.get_mut(idx) else { return false };
        if unit.labels.remove(key).is_none() {
            return false;
        }
        match key {
            "region" => unit.region = None,
            "tier" => unit.tier = None,
            _ => {}
        }
        true
    }

    fn merge_units(&mut self, src: usize, dst: usize) -> bool {
        let n = self.units.len();
        if src == dst || src >= n || dst >= n {
            return false;
        }
        let from = self.units.remove(src);
        let dst = if src < dst { dst - 1 } else { dst };
        let into = &mut self.units[dst];
        into.workloads.extend(from.workloads);
        for (k, v) in from.labels {
            into.labels.entry(k).or_insert(v);
        }
        if into.region.is_none() {
            into.region = into.labels.get("region").cloned();
        }
        if into.tier.is_none() {
            into.tier = into.labels.get("tier").cloned();
        }
        true
    }

    fn delete_unit(&mut self, idx: usize) -> bool {
        if self.units.len() <= 1 || idx >= self.units.len() {
            return false;
        }
        self.units.remove(idx);
        true
    }
}

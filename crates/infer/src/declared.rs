//! Scan a kustomize-style repository into a declared app inventory.
//!
//! An app is any directory holding an `overlays/` directory; each child of
//! `overlays/` is a variant, and a sibling `base/` is the app's base path.

use std::path::Path;

use anyhow::{Context, Result};
use hoist_core::{DeclaredApp, DeclaredRepo, DeclaredVariant};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

const MAX_DEPTH: usize = 8;
const KUSTOMIZATION_FILES: &[&str] = &["kustomization.yaml", "kustomization.yml", "Kustomization"];

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn rel_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

fn child_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let walk = WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name();
    for entry in walk.into_iter().filter_entry(|e| !is_hidden(e)) {
        let entry = entry.with_context(|| format!("reading {}", dir.display()))?;
        if entry.file_type().is_dir() {
            out.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    Ok(out)
}

fn has_kustomization(dir: &Path) -> bool {
    KUSTOMIZATION_FILES.iter().any(|f| dir.join(f).is_file())
}

/// The app rooted at `dir`, whose `overlays/` is known to exist.
fn declared_app(dir: &Path, rel: &str, saw_kustomization: &mut bool) -> Result<DeclaredApp> {
    let name = dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let base = dir.join("base");
    let base_path = if base.is_dir() { format!("{}/base", rel) } else { rel.to_string() };
    let overlays = dir.join("overlays");
    let variants: Vec<DeclaredVariant> = child_dirs(&overlays)?
        .into_iter()
        .map(|v| DeclaredVariant { path: format!("{}/overlays/{}", rel, v), name: v })
        .collect();
    if has_kustomization(&base) || variants.iter().any(|v| has_kustomization(&overlays.join(&v.name))) {
        *saw_kustomization = true;
    }
    debug!(app = %name, path = %rel, variants = variants.len(), "declared app found");
    Ok(DeclaredApp { name, base_path, variants })
}

/// Walk `root` and collect declared apps in path order. The walk does not
/// descend into an app once found.
pub fn scan_repo(root: &Path) -> Result<DeclaredRepo> {
    if !root.is_dir() {
        anyhow::bail!("repository path {} is not a directory", root.display());
    }
    let mut apps = Vec::new();
    let mut saw_kustomization = false;
    let mut walk = WalkDir::new(root).max_depth(MAX_DEPTH).sort_by_file_name().into_iter().filter_entry(|e| !is_hidden(e));
    while let Some(entry) = walk.next() {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir = entry.path();
        if has_kustomization(dir) {
            saw_kustomization = true;
        }
        let rel = rel_path(root, dir);
        if rel.is_empty() || !dir.join("overlays").is_dir() {
            continue;
        }
        apps.push(declared_app(dir, &rel, &mut saw_kustomization)?);
        walk.skip_current_dir();
    }
    let kind = if saw_kustomization { "kustomize" } else { "plain" };
    Ok(DeclaredRepo { kind: kind.to_string(), apps })
}

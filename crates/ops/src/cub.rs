//! `cub` CLI backed store and worker launcher.

use std::process::Stdio;
use std::time::Instant;

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use serde_json::Value as Json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use hoist_core::Labels;

use crate::{OpsError, StoredUnit, TargetInfo, UnitStore, WorkerLauncher};

/// Store client that shells out to the `cub` binary.
#[derive(Debug, Clone)]
pub struct CubStore {
    bin: String,
}

impl CubStore {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run one command, optionally feeding `stdin`, and return stdout.
    async fn run(&self, args: &[String], stdin: Option<&[u8]>) -> Result<Vec<u8>, OpsError> {
        let t0 = Instant::now();
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|source| OpsError::Spawn { bin: self.bin.clone(), source })?;
        if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(data)
                .await
                .map_err(|source| OpsError::Spawn { bin: self.bin.clone(), source })?;
        }
        let out = child
            .wait_with_output()
            .await
            .map_err(|source| OpsError::Spawn { bin: self.bin.clone(), source })?;
        histogram!("cub_command_ms", t0.elapsed().as_secs_f64() * 1000.0);
        debug!(bin = %self.bin, args = %args.join(" "), code = ?out.status.code(), "cub command finished");
        if out.status.success() {
            counter!("cub_command_ok", 1u64);
            Ok(out.stdout)
        } else {
            counter!("cub_command_err", 1u64);
            Err(OpsError::Command {
                bin: self.bin.clone(),
                args: args.join(" "),
                code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            })
        }
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// `unit create` arguments; the manifest is read from stdin.
pub fn unit_create_args(space: &str, slug: &str, labels: &Labels) -> Vec<String> {
    let mut out = args(&["unit", "create", "--space", space]);
    for (k, v) in labels {
        out.push("--label".to_string());
        out.push(format!("{}={}", k, v));
    }
    out.push(slug.to_string());
    out.push("-".to_string());
    out
}

fn str_at<'a>(v: &'a Json, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| v.get(*k)).and_then(|s| s.as_str()).filter(|s| !s.is_empty())
}

/// Decode `unit get --json`. Accepts both the wrapped (`{"Unit": .., "Target": ..}`)
/// and the flat form.
pub fn parse_unit_json(raw: &[u8]) -> Result<StoredUnit, OpsError> {
    let v: Json = serde_json::from_slice(raw)
        .map_err(|e| OpsError::Output { what: "unit get".into(), message: e.to_string() })?;
    let unit = v.get("Unit").unwrap_or(&v);
    let data_b64 = str_at(unit, &["Data", "data"]).unwrap_or_default().to_string();
    let target = v
        .get("Target")
        .filter(|t| !t.is_null())
        .and_then(|t| str_at(t, &["Slug", "slug"]))
        .or_else(|| str_at(unit, &["TargetSlug", "target"]))
        .map(|s| s.to_string());
    Ok(StoredUnit { data_b64, target })
}

/// Decode `target list --json`.
pub fn parse_targets_json(raw: &[u8]) -> Result<Vec<TargetInfo>, OpsError> {
    let v: Json = serde_json::from_slice(raw)
        .map_err(|e| OpsError::Output { what: "target list".into(), message: e.to_string() })?;
    let Some(items) = v.as_array() else {
        return Err(OpsError::Output { what: "target list".into(), message: "expected a JSON array".into() });
    };
    Ok(items
        .iter()
        .filter_map(|item| {
            let t = item.get("Target").unwrap_or(item);
            let slug = str_at(t, &["Slug", "slug"])?;
            let provider_type = str_at(t, &["ProviderType", "providerType"]).unwrap_or_default();
            Some(TargetInfo { slug: slug.to_string(), provider_type: provider_type.to_string() })
        })
        .collect())
}

#[async_trait::async_trait]
impl UnitStore for CubStore {
    async fn create_space(&self, space: &str) -> Result<bool> {
        match self.run(&args(&["space", "create", space]), None).await {
            Ok(_) => {
                info!(space, "space created");
                Ok(true)
            }
            Err(OpsError::Command { stderr, .. }) if stderr.to_ascii_lowercase().contains("already exists") => {
                info!(space, "space already exists");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_unit(&self, space: &str, slug: &str, labels: &Labels, manifest: &[u8]) -> Result<()> {
        self.run(&unit_create_args(space, slug, labels), Some(manifest))
            .await
            .with_context(|| format!("creating unit {}/{}", space, slug))?;
        info!(space, unit = slug, bytes = manifest.len(), "unit created");
        Ok(())
    }

    async fn get_unit(&self, space: &str, slug: &str) -> Result<StoredUnit> {
        let out = self.run(&args(&["unit", "get", "--space", space, "--json", slug]), None).await?;
        Ok(parse_unit_json(&out)?)
    }

    async fn update_unit(&self, space: &str, slug: &str, manifest: &[u8]) -> Result<()> {
        self.run(&args(&["unit", "update", "--space", space, slug, "-"]), Some(manifest))
            .await
            .with_context(|| format!("updating unit {}/{}", space, slug))?;
        Ok(())
    }

    async fn apply_unit(&self, space: &str, slug: &str, wait: bool) -> Result<()> {
        let mut a = args(&["unit", "apply", "--space", space]);
        if wait {
            a.push("--wait".to_string());
        }
        a.push(slug.to_string());
        self.run(&a, None).await.with_context(|| format!("applying unit {}/{}", space, slug))?;
        Ok(())
    }

    async fn set_target(&self, space: &str, slug: &str, target: &str) -> Result<()> {
        self.run(&args(&["unit", "set-target", "--space", space, slug, target]), None)
            .await
            .with_context(|| format!("setting target of {}/{}", space, slug))?;
        Ok(())
    }

    async fn list_targets(&self, space: &str) -> Result<Vec<TargetInfo>> {
        let out = self.run(&args(&["target", "list", "--space", space, "--json"]), None).await?;
        Ok(parse_targets_json(&out)?)
    }
}

/// Starts `cub worker run` detached from this process.
#[derive(Debug, Clone)]
pub struct CubWorker {
    bin: String,
}

impl CubWorker {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait::async_trait]
impl WorkerLauncher for CubWorker {
    async fn start(&self, name: &str, space: &str) -> Result<()> {
        let mut cmd = std::process::Command::new(&self.bin);
        cmd.args(["worker", "run", "--space", space, name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        match cmd.spawn() {
            Ok(child) => {
                info!(worker = name, space, pid = child.id(), "worker started");
                Ok(())
            }
            Err(source) => {
                warn!(worker = name, error = %source, "worker spawn failed");
                Err(OpsError::Spawn { bin: self.bin.clone(), source }.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_args_carry_labels_in_order() {
        let mut labels = Labels::new();
        labels.insert("variant".into(), "prod".into());
        labels.insert("app".into(), "web".into());
        let a = unit_create_args("shop-team", "web-prod", &labels);
        assert_eq!(
            a,
            vec!["unit", "create", "--space", "shop-team", "--label", "app=web", "--label", "variant=prod", "web-prod", "-"]
        );
    }

    #[test]
    fn unit_json_wrapped_and_flat() {
        let wrapped = br#"{"Unit": {"Slug": "web", "Data": "a2luZDogRGVwbG95bWVudAo="}, "Target": {"Slug": "k8s"}}"#;
        let u = parse_unit_json(wrapped).unwrap();
        assert_eq!(u.target.as_deref(), Some("k8s"));
        assert_eq!(u.decode_manifest().unwrap(), b"kind: Deployment\n");

        let flat = br#"{"Data": "", "Target": null}"#;
        let u = parse_unit_json(flat).unwrap();
        assert_eq!(u, StoredUnit::default());

        assert!(matches!(parse_unit_json(b"nope"), Err(OpsError::Output { .. })));
    }

    #[test]
    fn targets_json() {
        let raw = br#"[{"Target": {"Slug": "dev-cluster", "ProviderType": "Kubernetes"}}, {"Slug": "bare"}, {"Other": 1}]"#;
        let t = parse_targets_json(raw).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t[0], TargetInfo { slug: "dev-cluster".into(), provider_type: "Kubernetes".into() });
        assert_eq!(t[1].provider_type, "");
        assert!(parse_targets_json(b"{}").is_err());
    }

    #[cfg(unix)]
    fn fake_cub(body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        let path = std::env::temp_dir().join(format!("hoist-fake-cub-{}-{}.sh", std::process::id(), nanos));
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn existing_space_is_not_an_error() {
        let bin = fake_cub("echo 'space shop-team already exists' >&2; exit 1");
        let store = CubStore::new(bin.to_string_lossy());
        assert!(!store.create_space("shop-team").await.unwrap());
        let _ = std::fs::remove_file(bin);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failures_surface_stderr() {
        let bin = fake_cub("echo 'unauthorized' >&2; exit 3");
        let store = CubStore::new(bin.to_string_lossy());
        let err = store.apply_unit("s", "web", true).await.unwrap_err();
        assert!(format!("{:#}", err).contains("unauthorized"));
        let _ = std::fs::remove_file(bin);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn manifest_goes_through_stdin() {
        let bin = fake_cub("cat");
        let store = CubStore::new(bin.to_string_lossy());
        let out = store.run(&args(&["unit", "update"]), Some(b"kind: Service\n")).await.unwrap();
        assert_eq!(out, b"kind: Service\n");
        let _ = std::fs::remove_file(bin);
    }
}

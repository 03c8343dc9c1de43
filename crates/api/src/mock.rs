//! In-memory backends for tests. Failures are scripted per object.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use hoist_core::{Labels, WorkloadInfo};

use crate::{Backends, ClusterObserver, ControllerClient, StoredUnit, TargetInfo, UnitStore, WorkerLauncher};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Minimal Deployment-shaped manifest with an annotations block.
pub fn sample_manifest(kind: &str, namespace: &str, name: &str) -> Vec<u8> {
    format!(
        "apiVersion: apps/v1\nkind: {}\nmetadata:\n  name: {}\n  namespace: {}\n  annotations:\n    team: imported\nspec:\n  replicas: 1\n",
        kind, name, namespace
    )
    .into_bytes()
}

#[derive(Default)]
pub struct MockCluster {
    pub namespaces: Vec<String>,
    pub workloads: Vec<WorkloadInfo>,
    /// Keyed by `namespace/name`; missing entries get [`sample_manifest`].
    pub manifests: HashMap<String, Vec<u8>>,
    /// `namespace/name` references whose manifest fetch fails.
    pub fail_manifest: HashSet<String>,
    pub fail_list: bool,
    annotations: Mutex<HashMap<String, BTreeMap<String, String>>>,
    /// Number of live-annotation reads that fail before reads succeed.
    live_failures: AtomicU32,
    live_reads: AtomicU32,
}

impl MockCluster {
    pub fn with_workloads(workloads: Vec<WorkloadInfo>) -> Self {
        let mut namespaces: Vec<String> = workloads.iter().map(|w| w.namespace.clone()).collect();
        namespaces.sort();
        namespaces.dedup();
        Self { namespaces, workloads, ..Default::default() }
    }

    pub fn set_annotations(&self, reference: &str, annotations: BTreeMap<String, String>) {
        lock(&self.annotations).insert(reference.to_string(), annotations);
    }

    pub fn fail_live_reads(&self, n: u32) {
        self.live_failures.store(n, Ordering::SeqCst);
    }

    pub fn live_reads(&self) -> u32 {
        self.live_reads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ClusterObserver for MockCluster {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        if self.fail_list {
            return Err(anyhow!("mock: namespaces unavailable"));
        }
        Ok(self.namespaces.clone())
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadInfo>> {
        if self.fail_list {
            return Err(anyhow!("mock: workloads unavailable"));
        }
        Ok(self.workloads.iter().filter(|w| w.namespace == namespace).cloned().collect())
    }

    async fn fetch_manifest(&self, kind: &str, namespace: &str, name: &str) -> Result<Vec<u8>> {
        let reference = format!("{}/{}", namespace, name);
        if self.fail_manifest.contains(&reference) {
            return Err(anyhow!("mock: manifest fetch failed for {}", reference));
        }
        Ok(self
            .manifests
            .get(&reference)
            .cloned()
            .unwrap_or_else(|| sample_manifest(kind, namespace, name)))
    }

    async fn fetch_live_annotations(&self, _kind: &str, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        self.live_reads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.live_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.live_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("mock: {}/{} not readable yet", namespace, name));
        }
        Ok(lock(&self.annotations).get(&format!("{}/{}", namespace, name)).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MockStore {
    pub targets: Vec<TargetInfo>,
    /// Unit slugs whose creation fails.
    pub fail_create: HashSet<String>,
    pub fail_apply: bool,
    spaces: Mutex<HashSet<String>>,
    units: Mutex<BTreeMap<(String, String), StoredUnit>>,
    calls: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn with_targets(targets: Vec<TargetInfo>) -> Self {
        Self { targets, ..Default::default() }
    }

    /// Every call in order, e.g. `create_unit shop-team/web`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn unit(&self, space: &str, slug: &str) -> Option<StoredUnit> {
        lock(&self.units).get(&(space.to_string(), slug.to_string())).cloned()
    }

    pub fn put_unit(&self, space: &str, slug: &str, unit: StoredUnit) {
        lock(&self.units).insert((space.to_string(), slug.to_string()), unit);
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }
}

#[async_trait::async_trait]
impl UnitStore for MockStore {
    async fn create_space(&self, space: &str) -> Result<bool> {
        self.record(format!("create_space {}", space));
        Ok(lock(&self.spaces).insert(space.to_string()))
    }

    async fn create_unit(&self, space: &str, slug: &str, _labels: &Labels, manifest: &[u8]) -> Result<()> {
        self.record(format!("create_unit {}/{}", space, slug));
        if self.fail_create.contains(slug) {
            return Err(anyhow!("mock: create {} rejected", slug));
        }
        self.put_unit(space, slug, StoredUnit::from_manifest(manifest, None));
        Ok(())
    }

    async fn get_unit(&self, space: &str, slug: &str) -> Result<StoredUnit> {
        self.record(format!("get_unit {}/{}", space, slug));
        self.unit(space, slug).ok_or_else(|| anyhow!("mock: unit {}/{} not found", space, slug))
    }

    async fn update_unit(&self, space: &str, slug: &str, manifest: &[u8]) -> Result<()> {
        self.record(format!("update_unit {}/{}", space, slug));
        let mut units = lock(&self.units);
        let unit = units
            .get_mut(&(space.to_string(), slug.to_string()))
            .ok_or_else(|| anyhow!("mock: unit {}/{} not found", space, slug))?;
        *unit = StoredUnit::from_manifest(manifest, unit.target.clone());
        Ok(())
    }

    async fn apply_unit(&self, space: &str, slug: &str, wait: bool) -> Result<()> {
        self.record(format!("apply_unit {}/{} wait={}", space, slug, wait));
        if self.fail_apply {
            return Err(anyhow!("mock: apply failed"));
        }
        Ok(())
    }

    async fn set_target(&self, space: &str, slug: &str, target: &str) -> Result<()> {
        self.record(format!("set_target {}/{} {}", space, slug, target));
        let mut units = lock(&self.units);
        let unit = units
            .get_mut(&(space.to_string(), slug.to_string()))
            .ok_or_else(|| anyhow!("mock: unit {}/{} not found", space, slug))?;
        unit.target = Some(target.to_string());
        Ok(())
    }

    async fn list_targets(&self, space: &str) -> Result<Vec<TargetInfo>> {
        self.record(format!("list_targets {}", space));
        Ok(self.targets.clone())
    }
}

#[derive(Default)]
pub struct MockControllers {
    /// Application names whose cleanup fails.
    pub fail_on: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockControllers {
    pub fn failing_on(names: &[&str]) -> Self {
        Self { fail_on: names.iter().map(|n| n.to_string()).collect(), ..Default::default() }
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn call(&self, op: &str, namespace: &str, name: &str) -> Result<()> {
        lock(&self.calls).push(format!("{} {}/{}", op, namespace, name));
        if self.fail_on.contains(name) {
            return Err(anyhow!("mock: {} refused for {}", op, name));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ControllerClient for MockControllers {
    async fn disable_auto_sync(&self, namespace: &str, name: &str) -> Result<()> {
        self.call("disable_auto_sync", namespace, name)
    }

    async fn delete_app(&self, namespace: &str, name: &str) -> Result<()> {
        self.call("delete_app", namespace, name)
    }
}

#[derive(Default)]
pub struct MockWorkers {
    pub fail: bool,
    started: Mutex<Vec<(String, String)>>,
}

impl MockWorkers {
    pub fn started(&self) -> Vec<(String, String)> {
        lock(&self.started).clone()
    }
}

#[async_trait::async_trait]
impl WorkerLauncher for MockWorkers {
    async fn start(&self, name: &str, space: &str) -> Result<()> {
        if self.fail {
            return Err(anyhow!("mock: worker binary missing"));
        }
        lock(&self.started).push((name.to_string(), space.to_string()));
        Ok(())
    }
}

/// Handles to every mock plus the [`Backends`] view over them.
pub struct MockSet {
    pub cluster: Arc<MockCluster>,
    pub store: Arc<MockStore>,
    pub controllers: Arc<MockControllers>,
    pub workers: Arc<MockWorkers>,
}

impl MockSet {
    pub fn new(cluster: MockCluster, store: MockStore, controllers: MockControllers) -> Self {
        Self {
            cluster: Arc::new(cluster),
            store: Arc::new(store),
            controllers: Arc::new(controllers),
            workers: Arc::new(MockWorkers::default()),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            cluster: self.cluster.clone(),
            store: self.store.clone(),
            controllers: self.controllers.clone(),
            workers: self.workers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_tracks_spaces_and_units() {
        let s = MockStore::default();
        assert!(s.create_space("team").await.unwrap());
        assert!(!s.create_space("team").await.unwrap());
        s.create_unit("team", "web", &Labels::new(), b"kind: Deployment\n").await.unwrap();
        s.set_target("team", "web", "k8s").await.unwrap();
        let u = s.get_unit("team", "web").await.unwrap();
        assert_eq!(u.target.as_deref(), Some("k8s"));
        assert_eq!(u.decode_manifest().unwrap(), b"kind: Deployment\n");
        assert!(s.get_unit("team", "missing").await.is_err());
        assert_eq!(s.calls()[0], "create_space team");
    }

    #[tokio::test]
    async fn cluster_scripted_failures() {
        let mut c = MockCluster::with_workloads(vec![WorkloadInfo::new("Deployment", "shop", "web")]);
        c.fail_manifest.insert("shop/web".into());
        assert!(c.fetch_manifest("Deployment", "shop", "web").await.is_err());
        assert_eq!(c.list_namespaces().await.unwrap(), vec!["shop".to_string()]);

        c.fail_live_reads(2);
        assert!(c.fetch_live_annotations("Deployment", "shop", "web").await.is_err());
        assert!(c.fetch_live_annotations("Deployment", "shop", "web").await.is_err());
        assert!(c.fetch_live_annotations("Deployment", "shop", "web").await.unwrap().is_empty());
        assert_eq!(c.live_reads(), 3);
    }
}

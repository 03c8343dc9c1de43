#![forbid(unsafe_code)]

use std::time::Instant;

use metrics::histogram;
use tracing::{info, warn};

use crate::{Msg, Wizard};

impl Wizard {
    pub(crate) fn start_create_space_task(&mut self) {
        let Some(space) = self.proposal().map(|p| p.app_space.clone()) else { return };
        self.dispatched();
        let tx = self.tx.clone();
        let store = self.backends.store.clone();
        tokio::spawn(async move {
            let res = store.create_space(&space).await.map_err(|e| format!("{:#}", e));
            info!(space = %space, created = ?res.as_ref().ok(), "apply: create space task ended");
            let _ = tx.send(Msg::SpaceCreated(res));
        });
    }

    /// Export the Unit's first workload and store it as the Unit's manifest.
    pub(crate) fn start_unit_task(&mut self, index: usize) {
        let Some(p) = self.configure.proposal.as_ref() else { return };
        let Some(unit) = p.units.get(index) else { return };
        let space = p.app_space.clone();
        let slug = unit.slug.clone();
        let labels = unit.labels.clone();
        let first = unit.workloads.first().cloned().unwrap_or_default();
        let workload = self.selected.iter().find(|w| w.reference() == first).cloned();
        self.dispatched();
        let tx = self.tx.clone();
        let cluster = self.backends.cluster.clone();
        let store = self.backends.store.clone();
        tokio::spawn(async move {
            let t0 = Instant::now();
            let result: Result<(), String> = async {
                let w = workload.ok_or_else(|| format!("workload {} is not among the selected workloads", first))?;
                let manifest = cluster
                    .fetch_manifest(&w.kind, &w.namespace, &w.name)
                    .await
                    .map_err(|e| format!("fetching manifest of {}: {:#}", first, e))?;
                store
                    .create_unit(&space, &slug, &labels, &manifest)
                    .await
                    .map_err(|e| format!("{:#}", e))
            }
            .await;
            histogram!("apply_unit_ms", t0.elapsed().as_secs_f64() * 1000.0);
            match &result {
                Ok(()) => info!(unit = %slug, index, "apply: unit stored"),
                Err(e) => warn!(unit = %slug, index, error = %e, "apply: unit task failed"),
            }
            let _ = tx.send(Msg::UnitApplied { index, result });
        });
    }
}

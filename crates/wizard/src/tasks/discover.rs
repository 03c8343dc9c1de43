#![forbid(unsafe_code)]

use std::time::Instant;

use hoist_infer::{build_controller_proposal, build_proposal, GroupingMode};
use tracing::info;

use crate::{Msg, Wizard};

impl Wizard {
    pub(crate) fn start_namespaces_task(&mut self) {
        self.namespaces.loading = true;
        self.dispatched();
        let tx = self.tx.clone();
        let cluster = self.backends.cluster.clone();
        tokio::spawn(async move {
            let t0 = Instant::now();
            let res = cluster.list_namespaces().await.map_err(|e| format!("{:#}", e));
            info!(ok = res.is_ok(), took_ms = %t0.elapsed().as_millis(), "discover: namespaces task ended");
            let _ = tx.send(Msg::Namespaces(res));
        });
    }

    /// List workloads of every selected namespace; the first failing
    /// namespace fails the whole listing.
    pub(crate) fn start_workloads_task(&mut self) {
        self.workloads.loading = true;
        self.dispatched();
        let tx = self.tx.clone();
        let cluster = self.backends.cluster.clone();
        let namespaces = self.namespaces.selected();
        tokio::spawn(async move {
            let t0 = Instant::now();
            let mut all = Vec::new();
            let mut failed = None;
            for ns in &namespaces {
                match cluster.list_workloads(ns).await {
                    Ok(ws) => all.extend(ws),
                    Err(e) => {
                        failed = Some(format!("{}: {:#}", ns, e));
                        break;
                    }
                }
            }
            info!(namespaces = namespaces.len(), count = all.len(), took_ms = %t0.elapsed().as_millis(), "discover: workloads task ended");
            let _ = tx.send(Msg::Workloads(match failed {
                Some(e) => Err(e),
                None => Ok(all),
            }));
        });
    }

    pub(crate) fn start_proposal_task(&mut self) {
        self.dispatched();
        let tx = self.tx.clone();
        let workloads = self.selected.clone();
        let settings = self.settings.clone();
        tokio::spawn(async move {
            let hint = settings.app_space_hint.as_deref();
            let proposal = match (&settings.declared, settings.grouping) {
                (Some(repo), _) => build_proposal(&workloads, Some(repo), hint),
                (None, GroupingMode::ControllerAware) => build_controller_proposal(&workloads, hint),
                (None, GroupingMode::Attribute) => build_proposal(&workloads, None, hint),
            };
            let _ = tx.send(Msg::Proposal(proposal));
        });
    }
}

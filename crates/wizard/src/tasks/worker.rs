#![forbid(unsafe_code)]

use tracing::info;

use crate::{Msg, Wizard};

impl Wizard {
    /// Fire-and-forget: the launched process outlives the wizard.
    pub(crate) fn start_worker_task(&mut self, name: String) {
        let Some(space) = self.proposal().map(|p| p.app_space.clone()) else { return };
        self.worker.starting = true;
        self.dispatched();
        let tx = self.tx.clone();
        let workers = self.backends.workers.clone();
        tokio::spawn(async move {
            let res = workers.start(&name, &space).await.map_err(|e| format!("{:#}", e));
            info!(worker = %name, space = %space, ok = res.is_ok(), "worker: start task ended");
            let _ = tx.send(Msg::WorkerStarted(res));
        });
    }
}

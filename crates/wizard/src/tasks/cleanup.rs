#![forbid(unsafe_code)]

use tracing::{info, warn};

use crate::model::{CleanupAction, CleanupFailure};
use crate::{Msg, Wizard};

impl Wizard {
    /// Apply `action` to every competing app in order, stopping at the first failure.
    pub(crate) fn start_cleanup_task(&mut self, action: CleanupAction) {
        self.cleanup.running = true;
        self.dispatched();
        let tx = self.tx.clone();
        let controllers = self.backends.controllers.clone();
        let apps = self.cleanup.apps.clone();
        tokio::spawn(async move {
            let mut result = Ok(apps.len());
            for app in &apps {
                let res = match action {
                    CleanupAction::DisableAutoSync => controllers.disable_auto_sync(&app.namespace, &app.name).await,
                    CleanupAction::Delete => controllers.delete_app(&app.namespace, &app.name).await,
                    CleanupAction::Keep => Ok(()),
                };
                if let Err(e) = res {
                    warn!(app = %app.name, action = action.as_str(), error = %e, "cleanup: app failed");
                    result = Err(CleanupFailure { app: app.name.clone(), error: format!("{:#}", e) });
                    break;
                }
            }
            info!(apps = apps.len(), action = action.as_str(), ok = result.is_ok(), "cleanup: task ended");
            let _ = tx.send(Msg::CleanupDone(result));
        });
    }
}

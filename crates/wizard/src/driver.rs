//! The control loop: receive one message, apply one transition.

#![forbid(unsafe_code)]

use tokio::sync::mpsc;
use tracing::info;

use crate::model::{CleanupAction, Msg, TestPhase};
use crate::{Action, Step, Wizard};

/// Source of operator input (a terminal UI, a script, a test).
pub trait Operator {
    /// Asked only when no operation is in flight. `None` ends the session.
    fn next_action(&mut self, wizard: &Wizard) -> Option<Action>;
}

/// Drive `wizard` until the operator quits or has nothing more to do.
/// Messages are applied strictly one at a time and the operator is consulted
/// only between messages with nothing pending.
pub async fn run(wizard: &mut Wizard, rx: &mut mpsc::UnboundedReceiver<Msg>, operator: &mut dyn Operator) {
    loop {
        if wizard.quit {
            break;
        }
        if wizard.pending() == 0 {
            match operator.next_action(wizard) {
                Some(action) => {
                    wizard.act(action);
                    continue;
                }
                None => break,
            }
        }
        match rx.recv().await {
            Some(msg) => wizard.update(msg),
            None => break,
        }
    }
    info!(step = wizard.step.as_str(), "wizard: control loop ended");
}

/// Non-interactive operator: select namespaces, take every workload, accept
/// the proposal, apply, clean up, optionally start a worker and run the Test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOperator {
    /// Namespaces to select; empty selects all listed ones.
    pub namespaces: Vec<String>,
    /// `None` skips competing-controller cleanup.
    pub cleanup: Option<CleanupAction>,
    pub worker: Option<String>,
    pub run_test: bool,
    cleanup_tried: bool,
    worker_tried: bool,
    test_tried: bool,
}

impl ScriptedOperator {
    pub fn new(namespaces: Vec<String>, cleanup: Option<CleanupAction>, worker: Option<String>, run_test: bool) -> Self {
        Self { namespaces, cleanup, worker, run_test, ..Default::default() }
    }

    fn after_apply(&mut self, w: &Wizard) -> Option<Action> {
        if let Some(name) = self.worker.clone() {
            if !self.worker_tried {
                self.worker_tried = true;
                return Some(Action::StartWorker(name));
            }
        }
        if self.run_test && !self.test_tried && w.can_test() {
            self.test_tried = true;
            return Some(Action::StartTest(None));
        }
        Some(Action::Quit)
    }
}

impl Operator for ScriptedOperator {
    fn next_action(&mut self, w: &Wizard) -> Option<Action> {
        match w.step {
            Step::SelectNamespaces => {
                if w.namespaces.items.is_empty() {
                    return Some(Action::Quit);
                }
                let want = |n: &str| self.namespaces.is_empty() || self.namespaces.iter().any(|x| x == n);
                if let Some(i) = w.namespaces.items.iter().position(|p| !p.selected && want(&p.item)) {
                    return Some(Action::ToggleNamespace(i));
                }
                if w.namespaces.selected().is_empty() {
                    return Some(Action::Quit);
                }
                Some(Action::Next)
            }
            Step::ReviewWorkloads => {
                if w.workloads.items.is_empty() {
                    return Some(Action::Quit);
                }
                if w.workloads.items.iter().any(|p| !p.selected) {
                    return Some(Action::SelectAllWorkloads);
                }
                Some(Action::Next)
            }
            Step::ConfigureStructure => Some(Action::Next),
            Step::Apply => {
                if w.apply.space_error.is_some() {
                    return Some(Action::Quit);
                }
                self.after_apply(w)
            }
            Step::ArgoCleanup => {
                if !w.cleanup.done {
                    if self.cleanup_tried {
                        return Some(Action::Quit);
                    }
                    self.cleanup_tried = true;
                    return Some(match self.cleanup {
                        Some(action) => Action::Cleanup(action),
                        None => Action::SkipCleanup,
                    });
                }
                self.after_apply(w)
            }
            Step::Test => match w.test.phase {
                TestPhase::Passed | TestPhase::Failed | TestPhase::Idle => Some(Action::Quit),
                _ => None,
            },
        }
    }
}

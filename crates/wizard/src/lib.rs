//! Hoist import wizard.
//!
//! One [`Wizard`] owns every piece of session state. Operator input arrives
//! through [`Wizard::act`]; blocking work runs in spawned tasks that each send
//! exactly one [`Msg`] back, applied by [`Wizard::update`]. The two are never
//! interleaved: see [`driver::run`].

#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info};

use hoist_api::{Backends, Config};
use hoist_core::{DeclaredRepo, GitOpsRef, Owner, WorkloadInfo};
use hoist_infer::{GroupingMode, ProposalEditor};

pub mod driver;
pub mod error;
pub mod model;
pub mod session;
mod tasks;
mod updates;
pub mod verify;

pub use driver::{run, Operator, ScriptedOperator};
pub use error::PhaseError;
pub use model::*;
pub use verify::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SelectNamespaces,
    ReviewWorkloads,
    ConfigureStructure,
    Apply,
    ArgoCleanup,
    Test,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::SelectNamespaces => "select-namespaces",
            Step::ReviewWorkloads => "review-workloads",
            Step::ConfigureStructure => "configure-structure",
            Step::Apply => "apply",
            Step::ArgoCleanup => "argo-cleanup",
            Step::Test => "test",
        }
    }

    pub fn parse(s: &str) -> Option<Step> {
        [
            Step::SelectNamespaces,
            Step::ReviewWorkloads,
            Step::ConfigureStructure,
            Step::Apply,
            Step::ArgoCleanup,
            Step::Test,
        ]
        .into_iter()
        .find(|st| st.as_str() == s)
    }
}

/// Operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Move the cursor of the current list.
    Cursor(usize),
    ToggleNamespace(usize),
    ToggleWorkload(usize),
    SelectAllWorkloads,
    RefreshWorkloads,
    /// Forward transition out of the current step.
    Next,
    /// Open the edit menu, or a sub-mode from the menu.
    Edit(EditMode),
    /// Text input for the active sub-mode.
    Submit(String),
    MergeInto(usize),
    DeleteUnit,
    Cancel,
    Cleanup(CleanupAction),
    SkipCleanup,
    StartWorker(String),
    /// Test the Unit with this slug, or the first Unit with workloads.
    StartTest(Option<String>),
    RetryTest,
    Quit,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub grouping: GroupingMode,
    pub app_space_hint: Option<String>,
    pub declared: Option<DeclaredRepo>,
    pub test_annotation: String,
    pub target_provider: String,
    pub sync_delay: Duration,
    pub sync_poll: Duration,
    pub sync_max_polls: Option<u32>,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            grouping: GroupingMode::ControllerAware,
            app_space_hint: None,
            declared: None,
            test_annotation: cfg.test_annotation.clone(),
            target_provider: cfg.target_provider.clone(),
            sync_delay: cfg.sync_delay(),
            sync_poll: cfg.sync_poll(),
            sync_max_polls: cfg.sync_max_polls,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct Wizard {
    pub step: Step,
    pub namespaces: NamespaceView,
    pub workloads: WorkloadView,
    /// Workloads confirmed when leaving the review step.
    pub selected: Vec<WorkloadInfo>,
    pub configure: ConfigureView,
    pub apply: ApplyProgress,
    pub cleanup: CleanupState,
    pub worker: WorkerState,
    pub test: TestRun,
    pub quit: bool,
    pub(crate) settings: Settings,
    pub(crate) backends: Backends,
    pub(crate) tx: mpsc::UnboundedSender<Msg>,
    pending: usize,
}

/// Argo CD Applications owning any of `workloads`, deduplicated, in first-seen order.
pub fn competing_apps(workloads: &[WorkloadInfo]) -> Vec<GitOpsRef> {
    let mut out: Vec<GitOpsRef> = Vec::new();
    for w in workloads {
        if w.owner != Owner::ArgoCD {
            continue;
        }
        if let Some(r) = w.gitops_ref.as_ref().filter(|r| r.kind == "Application") {
            if !out.contains(r) {
                out.push(r.clone());
            }
        }
    }
    out
}

impl Wizard {
    pub fn new(backends: Backends, settings: Settings) -> (Self, mpsc::UnboundedReceiver<Msg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let w = Self {
            step: Step::SelectNamespaces,
            namespaces: NamespaceView::default(),
            workloads: WorkloadView::default(),
            selected: Vec::new(),
            configure: ConfigureView::default(),
            apply: ApplyProgress::default(),
            cleanup: CleanupState::default(),
            worker: WorkerState::default(),
            test: TestRun::default(),
            quit: false,
            settings,
            backends,
            tx,
            pending: 0,
        };
        (w, rx)
    }

    /// Kick off the namespace listing.
    pub fn start(&mut self) {
        self.start_namespaces_task();
    }

    /// Operations dispatched whose result has not been processed yet.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub(crate) fn dispatched(&mut self) {
        self.pending += 1;
    }

    /// Apply one result message.
    pub fn update(&mut self, msg: Msg) {
        self.pending = self.pending.saturating_sub(1);
        updates::process_update(self, msg);
    }

    pub fn proposal(&self) -> Option<&hoist_core::FullProposal> {
        self.configure.proposal.as_ref()
    }

    /// Worker running, cleanup settled when there was anything to clean up.
    pub fn can_test(&self) -> bool {
        self.apply.done
            && self.worker.started
            && (self.cleanup.apps.is_empty() || self.cleanup.done)
            && !matches!(self.test.phase, TestPhase::Annotate | TestPhase::Apply | TestPhase::WaitSync | TestPhase::Verify)
    }

    pub fn act(&mut self, action: Action) {
        debug!(step = self.step.as_str(), ?action, "wizard: action");
        if action == Action::Quit {
            info!(step = self.step.as_str(), "wizard: quit");
            self.quit = true;
            return;
        }
        match self.step {
            Step::SelectNamespaces => self.act_namespaces(action),
            Step::ReviewWorkloads => self.act_workloads(action),
            Step::ConfigureStructure => self.act_configure(action),
            Step::Apply | Step::ArgoCleanup | Step::Test => self.act_post_apply(action),
        }
    }

    fn act_namespaces(&mut self, action: Action) {
        let view = &mut self.namespaces;
        match action {
            Action::Cursor(i) if i < view.items.len() => view.cursor = i,
            Action::ToggleNamespace(i) => {
                if let Some(p) = view.items.get_mut(i) {
                    p.selected = !p.selected;
                }
            }
            Action::Next => {
                if view.items.is_empty() {
                    return;
                }
                if !view.items.iter().any(|p| p.selected) {
                    let cursor = view.cursor.min(view.items.len() - 1);
                    view.items[cursor].selected = true;
                }
                self.step = Step::ReviewWorkloads;
                self.start_workloads_task();
            }
            _ => {}
        }
    }

    fn act_workloads(&mut self, action: Action) {
        let view = &mut self.workloads;
        match action {
            Action::Cursor(i) if i < view.items.len() => view.cursor = i,
            Action::ToggleWorkload(i) => {
                if let Some(p) = view.items.get_mut(i) {
                    p.selected = !p.selected;
                }
            }
            Action::SelectAllWorkloads => view.items.iter_mut().for_each(|p| p.selected = true),
            Action::RefreshWorkloads => self.start_workloads_task(),
            Action::Next => {
                let selected = view.selected();
                if selected.is_empty() {
                    return;
                }
                self.cleanup = CleanupState { apps: competing_apps(&selected), ..Default::default() };
                self.selected = selected;
                self.configure = ConfigureView::default();
                self.step = Step::ConfigureStructure;
                self.start_proposal_task();
            }
            _ => {}
        }
    }

    fn act_configure(&mut self, action: Action) {
        let mode = self.configure.mode;
        match (mode, action) {
            (EditMode::None, Action::Cursor(i)) => {
                if self.proposal().map_or(false, |p| i < p.units.len()) {
                    self.configure.cursor = i;
                }
            }
            (EditMode::None, Action::Next) => {
                if self.configure.proposal.is_some() {
                    self.begin_apply();
                }
            }
            (EditMode::None, Action::Edit(_)) => self.configure.mode = EditMode::Menu,
            (EditMode::Menu, Action::Edit(EditMode::None | EditMode::Menu)) => {}
            (EditMode::Menu, Action::Edit(sub)) => self.configure.mode = sub,
            (EditMode::Menu, Action::DeleteUnit) => {
                let cursor = self.configure.cursor;
                let changed = self.configure.proposal.as_mut().map_or(false, |p| p.delete_unit(cursor));
                self.finish_edit(changed, "delete unit");
            }
            (EditMode::Menu, Action::Cancel) => self.configure.mode = EditMode::None,
            (EditMode::MergeSelect, Action::MergeInto(dst)) => {
                let src = self.configure.cursor;
                let changed = self.configure.proposal.as_mut().map_or(false, |p| p.merge_units(src, dst));
                if changed {
                    self.configure.cursor = if src < dst { dst - 1 } else { dst };
                }
                self.finish_edit(changed, "merge");
            }
            (_, Action::Submit(input)) => {
                let cursor = self.configure.cursor;
                let Some(p) = self.configure.proposal.as_mut() else { return };
                let (changed, what) = match mode {
                    EditMode::RenameUnit => (p.rename_unit(cursor, &input), "rename unit"),
                    EditMode::RenameSpace => (p.rename_space(&input), "rename space"),
                    EditMode::AddLabel => (p.add_label(cursor, &input), "add label"),
                    EditMode::EditLabel => {
                        let changed = input
                            .split_once('=')
                            .map_or(false, |(k, v)| p.edit_label(cursor, k.trim(), v));
                        (changed, "edit label")
                    }
                    EditMode::DeleteLabelConfirm => (p.delete_label(cursor, input.trim()), "delete label"),
                    _ => return,
                };
                self.finish_edit(changed, what);
            }
            (EditMode::None, _) | (EditMode::Menu, _) => {}
            (_, Action::Cancel) => self.configure.mode = EditMode::Menu,
            _ => {}
        }
    }

    fn finish_edit(&mut self, changed: bool, what: &str) {
        if changed {
            counter!("wizard_edits_total", 1u64);
            self.configure.status = Some(format!("{}: done", what));
            self.configure.mode = EditMode::None;
            let len = self.proposal().map_or(0, |p| p.units.len());
            self.configure.cursor = self.configure.cursor.min(len.saturating_sub(1));
        } else {
            self.configure.status = Some(format!("{}: unchanged", what));
            self.configure.mode = EditMode::Menu;
        }
    }

    fn begin_apply(&mut self) {
        let total = self.proposal().map_or(0, |p| p.units.len());
        self.apply = ApplyProgress { started: Some(Instant::now()), total, ..Default::default() };
        self.step = Step::Apply;
        self.start_create_space_task();
    }

    fn act_post_apply(&mut self, action: Action) {
        match action {
            Action::Cleanup(choice) if self.step == Step::ArgoCleanup && !self.cleanup.done && !self.cleanup.running => {
                self.cleanup.action = Some(choice);
                self.cleanup.error = None;
                self.start_cleanup_task(choice);
            }
            Action::SkipCleanup if self.step == Step::ArgoCleanup && !self.cleanup.running => {
                info!(apps = self.cleanup.apps.len(), "cleanup skipped");
                self.cleanup.skipped = true;
                self.cleanup.done = true;
            }
            Action::StartWorker(name) if self.apply.done && !self.worker.starting => {
                self.worker.name = Some(name.clone());
                self.worker.error = None;
                self.start_worker_task(name);
            }
            Action::StartTest(unit) if self.can_test() && self.test.phase == TestPhase::Idle => {
                self.begin_test(unit);
            }
            Action::RetryTest if self.test.phase.is_terminal() && self.can_test() => {
                let unit = Some(self.test.unit.clone());
                self.begin_test(unit);
            }
            _ => {}
        }
    }

    fn begin_test(&mut self, unit: Option<String>) {
        let Some(p) = self.configure.proposal.as_ref() else { return };
        let chosen = match unit {
            Some(slug) => p.units.iter().find(|u| u.slug == slug),
            None => p.units.iter().find(|u| !u.workloads.is_empty()),
        };
        let Some(chosen) = chosen else { return };
        let workload = verify::resolve_workload(&chosen.workloads, &self.selected).cloned();
        let runs = self.test.runs + 1;
        self.test = TestRun {
            unit: chosen.slug.clone(),
            workload,
            value: verify::new_test_value(),
            phase: TestPhase::Annotate,
            started: Some(Instant::now()),
            runs,
            ..Default::default()
        };
        self.step = Step::Test;
        info!(unit = %self.test.unit, run = runs, "test: starting");
        self.start_annotate_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_api::mock::{MockCluster, MockControllers, MockSet, MockStore};
    use hoist_core::{FullProposal, UnitProposal, UnitStatus};

    fn wizard() -> Wizard {
        let mocks = MockSet::new(MockCluster::default(), MockStore::default(), MockControllers::default());
        Wizard::new(mocks.backends(), Settings::default()).0
    }

    fn with_namespaces(w: &mut Wizard, names: &[&str]) {
        w.namespaces.items = names.iter().map(|n| Pick { item: n.to_string(), selected: false }).collect();
    }

    #[test]
    fn step_names_roundtrip() {
        for s in [Step::SelectNamespaces, Step::ArgoCleanup, Step::Test] {
            assert_eq!(Step::parse(s.as_str()), Some(s));
        }
        assert_eq!(Step::parse("nope"), None);
    }

    #[test]
    fn competing_apps_dedupes_argo_only() {
        let mut a = WorkloadInfo::new("Deployment", "shop", "a");
        a.owner = Owner::ArgoCD;
        a.gitops_ref = Some(GitOpsRef { kind: "Application".into(), name: "shop".into(), namespace: "argocd".into() });
        let b = WorkloadInfo { name: "b".into(), ..a.clone() };
        let mut c = WorkloadInfo::new("Deployment", "shop", "c");
        c.owner = Owner::Flux;
        c.gitops_ref = Some(GitOpsRef { kind: "Kustomization".into(), name: "apps".into(), namespace: "flux-system".into() });
        let apps = competing_apps(&[a, b, c]);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "shop");
    }

    #[tokio::test]
    async fn next_without_selection_takes_highlighted_namespace() {
        let mut w = wizard();
        with_namespaces(&mut w, &["a", "b", "c"]);
        w.act(Action::Cursor(1));
        w.act(Action::Next);
        assert_eq!(w.step, Step::ReviewWorkloads);
        assert_eq!(w.namespaces.selected(), vec!["b".to_string()]);
        assert_eq!(w.pending(), 1);
    }

    #[tokio::test]
    async fn next_without_namespaces_is_blocked() {
        let mut w = wizard();
        w.act(Action::Next);
        assert_eq!(w.step, Step::SelectNamespaces);
        assert_eq!(w.pending(), 0);
    }

    #[test]
    fn review_requires_a_selected_workload() {
        let mut w = wizard();
        w.step = Step::ReviewWorkloads;
        w.workloads.items = vec![Pick { item: WorkloadInfo::new("Deployment", "a", "x"), selected: false }];
        w.act(Action::Next);
        assert_eq!(w.step, Step::ReviewWorkloads);
    }

    #[test]
    fn configure_next_blocked_until_proposal_arrives() {
        let mut w = wizard();
        w.step = Step::ConfigureStructure;
        w.act(Action::Next);
        assert_eq!(w.step, Step::ConfigureStructure);
    }

    fn configuring(slugs: &[&str]) -> Wizard {
        let mut w = wizard();
        w.step = Step::ConfigureStructure;
        let units = slugs
            .iter()
            .map(|s| {
                let mut u = UnitProposal::new(s.to_string(), s, "default", UnitStatus::ClusterOnly);
                u.workloads = vec![format!("shop/{}", s)];
                u
            })
            .collect();
        w.configure.proposal = Some(FullProposal { app_space: "shop-team".into(), units, ..Default::default() });
        w
    }

    fn slugs(w: &Wizard) -> Vec<String> {
        w.proposal().unwrap().units.iter().map(|u| u.slug.clone()).collect()
    }

    fn status(w: &Wizard) -> &str {
        w.configure.status.as_deref().unwrap_or_default()
    }

    #[test]
    fn edit_menu_opens_and_closes() {
        let mut w = configuring(&["api", "web"]);
        w.act(Action::Edit(EditMode::RenameUnit));
        assert_eq!(w.configure.mode, EditMode::Menu);
        w.act(Action::Edit(EditMode::None));
        assert_eq!(w.configure.mode, EditMode::Menu);
        w.act(Action::Edit(EditMode::AddLabel));
        assert_eq!(w.configure.mode, EditMode::AddLabel);
        w.act(Action::Cancel);
        assert_eq!(w.configure.mode, EditMode::Menu);
        w.act(Action::Cancel);
        assert_eq!(w.configure.mode, EditMode::None);
        // the menu swallows navigation
        w.act(Action::Edit(EditMode::Menu));
        w.act(Action::Next);
        assert_eq!(w.step, Step::ConfigureStructure);
    }

    #[test]
    fn rename_unit_and_space() {
        let mut w = configuring(&["api", "web"]);
        w.act(Action::Cursor(1));
        w.act(Action::Edit(EditMode::Menu));
        w.act(Action::Edit(EditMode::RenameUnit));
        w.act(Action::Submit("New Name".into()));
        assert_eq!(slugs(&w), vec!["api", "new-name"]);
        assert_eq!(w.configure.mode, EditMode::None);
        assert_eq!(status(&w), "rename unit: done");

        w.act(Action::Edit(EditMode::Menu));
        w.act(Action::Edit(EditMode::RenameUnit));
        w.act(Action::Submit("  ".into()));
        assert_eq!(slugs(&w), vec!["api", "new-name"]);
        assert_eq!(w.configure.mode, EditMode::Menu);
        assert_eq!(status(&w), "rename unit: unchanged");

        w.act(Action::Edit(EditMode::RenameSpace));
        w.act(Action::Submit("Storefront".into()));
        assert_eq!(w.proposal().unwrap().app_space, "storefront");
        assert_eq!(status(&w), "rename space: done");
    }

    #[test]
    fn label_edits_report_outcome() {
        let mut w = configuring(&["api", "web"]);
        let labels = |w: &Wizard| w.proposal().unwrap().units[0].labels.clone();

        w.act(Action::Edit(EditMode::Menu));
        w.act(Action::Edit(EditMode::AddLabel));
        w.act(Action::Submit("no-equals-sign".into()));
        assert_eq!(status(&w), "add label: unchanged");
        assert_eq!(w.configure.mode, EditMode::Menu);

        w.act(Action::Edit(EditMode::AddLabel));
        w.act(Action::Submit("team=core".into()));
        assert_eq!(status(&w), "add label: done");
        assert_eq!(labels(&w).get("team").map(String::as_str), Some("core"));

        w.act(Action::Edit(EditMode::Menu));
        w.act(Action::Edit(EditMode::EditLabel));
        w.act(Action::Submit("team=ops".into()));
        assert_eq!(status(&w), "edit label: done");
        assert_eq!(labels(&w).get("team").map(String::as_str), Some("ops"));

        w.act(Action::Edit(EditMode::Menu));
        w.act(Action::Edit(EditMode::EditLabel));
        w.act(Action::Submit("missing=x".into()));
        assert_eq!(status(&w), "edit label: unchanged");

        w.act(Action::Edit(EditMode::DeleteLabelConfirm));
        w.act(Action::Submit("app".into()));
        assert_eq!(status(&w), "delete label: unchanged");
        w.act(Action::Edit(EditMode::DeleteLabelConfirm));
        w.act(Action::Submit(" team ".into()));
        assert_eq!(status(&w), "delete label: done");
        assert!(!labels(&w).contains_key("team"));
        assert_eq!(w.configure.mode, EditMode::None);
    }

    #[test]
    fn merge_forward_moves_cursor_onto_merged_unit() {
        let mut w = configuring(&["api", "web", "worker"]);
        w.act(Action::Edit(EditMode::Menu));
        w.act(Action::Edit(EditMode::MergeSelect));
        w.act(Action::MergeInto(2));
        assert_eq!(slugs(&w), vec!["web", "worker"]);
        assert_eq!(w.configure.cursor, 1);
        assert_eq!(w.proposal().unwrap().units[1].workloads, vec!["shop/worker", "shop/api"]);
        assert_eq!(status(&w), "merge: done");
        assert_eq!(w.configure.mode, EditMode::None);
    }

    #[test]
    fn merge_backward_and_into_self() {
        let mut w = configuring(&["api", "web", "worker"]);
        w.act(Action::Cursor(2));
        w.act(Action::Edit(EditMode::Menu));
        w.act(Action::Edit(EditMode::MergeSelect));
        w.act(Action::MergeInto(2));
        assert_eq!(status(&w), "merge: unchanged");
        assert_eq!(w.configure.mode, EditMode::Menu);

        w.act(Action::Edit(EditMode::MergeSelect));
        w.act(Action::MergeInto(0));
        assert_eq!(slugs(&w), vec!["api", "web"]);
        assert_eq!(w.configure.cursor, 0);
    }

    #[test]
    fn delete_unit_clamps_cursor_and_keeps_the_last_unit() {
        let mut w = configuring(&["api", "web", "worker"]);
        w.act(Action::Cursor(2));
        w.act(Action::Edit(EditMode::Menu));
        w.act(Action::DeleteUnit);
        assert_eq!(slugs(&w), vec!["api", "web"]);
        assert_eq!(w.configure.cursor, 1);
        assert_eq!(status(&w), "delete unit: done");
        assert_eq!(w.configure.mode, EditMode::None);

        w.act(Action::Edit(EditMode::Menu));
        w.act(Action::DeleteUnit);
        assert_eq!(slugs(&w), vec!["api"]);
        assert_eq!(w.configure.cursor, 0);

        w.act(Action::Edit(EditMode::Menu));
        w.act(Action::DeleteUnit);
        assert_eq!(slugs(&w), vec!["api"]);
        assert_eq!(status(&w), "delete unit: unchanged");
        assert_eq!(w.configure.mode, EditMode::Menu);
    }

    #[test]
    fn delete_unit_needs_the_menu() {
        let mut w = configuring(&["api", "web"]);
        w.act(Action::DeleteUnit);
        assert_eq!(slugs(&w).len(), 2);
        assert!(w.configure.status.is_none());
    }

    #[tokio::test]
    async fn refresh_relists_selected_namespaces() {
        let mut w = wizard();
        with_namespaces(&mut w, &["a", "b"]);
        w.namespaces.items[1].selected = true;
        w.step = Step::ReviewWorkloads;
        w.act(Action::RefreshWorkloads);
        assert!(w.workloads.loading);
        assert_eq!(w.pending(), 1);
        assert_eq!(w.step, Step::ReviewWorkloads);
    }

    #[test]
    fn quit_is_unconditional() {
        let mut w = wizard();
        w.step = Step::Apply;
        w.act(Action::Quit);
        assert!(w.quit);
    }

    #[test]
    fn test_requires_worker_and_cleanup() {
        let mut w = wizard();
        w.apply.done = true;
        assert!(!w.can_test());
        w.worker.started = true;
        assert!(w.can_test());
        w.cleanup.apps.push(GitOpsRef { kind: "Application".into(), name: "x".into(), namespace: "argocd".into() });
        assert!(!w.can_test());
        w.cleanup.done = true;
        assert!(w.can_test());
    }
}

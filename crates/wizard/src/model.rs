#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use hoist_core::{FullProposal, GitOpsRef, WorkloadInfo};

use crate::error::PhaseError;
use crate::verify::Verdict;

/// Result of one background operation, delivered back into the control loop.
#[derive(Debug)]
pub enum Msg {
    Namespaces(Result<Vec<String>, String>),
    Workloads(Result<Vec<WorkloadInfo>, String>),
    Proposal(FullProposal),
    SpaceCreated(Result<bool, String>),
    UnitApplied { index: usize, result: Result<(), String> },
    CleanupDone(Result<usize, CleanupFailure>),
    WorkerStarted(Result<(), String>),
    Test(TestMsg),
}

#[derive(Debug)]
pub enum TestMsg {
    Annotated(Result<(), PhaseError>),
    /// Carries the target the Unit was applied to.
    Applied(Result<String, PhaseError>),
    SyncPoll { attempt: u32, result: Result<(), String> },
    Verified(Result<Verdict, PhaseError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub app: String,
    pub error: String,
}

/// A pickable row with a selection mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pick<T> {
    pub item: T,
    pub selected: bool,
}

#[derive(Debug, Default)]
pub struct NamespaceView {
    pub items: Vec<Pick<String>>,
    pub cursor: usize,
    pub loading: bool,
    pub error: Option<String>,
}

impl NamespaceView {
    pub fn selected(&self) -> Vec<String> {
        self.items.iter().filter(|p| p.selected).map(|p| p.item.clone()).collect()
    }
}

#[derive(Debug, Default)]
pub struct WorkloadView {
    pub items: Vec<Pick<WorkloadInfo>>,
    pub cursor: usize,
    pub loading: bool,
    pub error: Option<String>,
}

impl WorkloadView {
    pub fn selected(&self) -> Vec<WorkloadInfo> {
        self.items.iter().filter(|p| p.selected).map(|p| p.item.clone()).collect()
    }
}

/// Nested editing sub-machine of the configure step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    None,
    Menu,
    RenameUnit,
    RenameSpace,
    MergeSelect,
    AddLabel,
    EditLabel,
    DeleteLabelConfirm,
}

#[derive(Debug, Default)]
pub struct ConfigureView {
    pub proposal: Option<FullProposal>,
    pub cursor: usize,
    pub mode: EditMode,
    /// Outcome of the last edit, for display.
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub slug: String,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct ApplyProgress {
    pub started: Option<Instant>,
    pub space_created: Option<bool>,
    pub space_error: Option<String>,
    /// Next Unit index to process.
    pub index: usize,
    pub total: usize,
    pub outcomes: Vec<UnitOutcome>,
    pub done: bool,
    pub elapsed: Option<Duration>,
}

impl ApplyProgress {
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.ok).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.ok).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    DisableAutoSync,
    Delete,
    Keep,
}

impl CleanupAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupAction::DisableAutoSync => "disable-auto-sync",
            CleanupAction::Delete => "delete",
            CleanupAction::Keep => "keep",
        }
    }
}

#[derive(Debug, Default)]
pub struct CleanupState {
    /// Competing Argo CD Applications, collected when workloads were confirmed.
    pub apps: Vec<GitOpsRef>,
    pub action: Option<CleanupAction>,
    pub running: bool,
    pub done: bool,
    pub skipped: bool,
    pub error: Option<CleanupFailure>,
}

#[derive(Debug, Default)]
pub struct WorkerState {
    pub name: Option<String>,
    pub starting: bool,
    pub started: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestPhase {
    #[default]
    Idle,
    Annotate,
    Apply,
    WaitSync,
    Verify,
    Passed,
    Failed,
}

impl TestPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TestPhase::Passed | TestPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestPhase::Idle => "idle",
            TestPhase::Annotate => "annotate",
            TestPhase::Apply => "apply",
            TestPhase::WaitSync => "wait-sync",
            TestPhase::Verify => "verify",
            TestPhase::Passed => "passed",
            TestPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRecord {
    pub phase: TestPhase,
    pub ok: bool,
    /// Since the first phase started.
    pub elapsed: Duration,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct TestRun {
    pub unit: String,
    pub workload: Option<WorkloadInfo>,
    pub value: String,
    pub phase: TestPhase,
    pub started: Option<Instant>,
    pub records: Vec<PhaseRecord>,
    pub target: Option<String>,
    pub polls: u32,
    pub waiting: Option<String>,
    pub verdict: Option<Verdict>,
    pub error: Option<PhaseError>,
    pub runs: u32,
}

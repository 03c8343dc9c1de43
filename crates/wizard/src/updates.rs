#![forbid(unsafe_code)]

use metrics::{counter, histogram};
use tracing::{info, warn};

use crate::model::{Msg, PhaseRecord, Pick, TestMsg, TestPhase, UnitOutcome};
use crate::{PhaseError, Step, Wizard};

pub(crate) fn process_update(w: &mut Wizard, msg: Msg) {
    match msg {
        Msg::Namespaces(Ok(names)) => {
            info!(count = names.len(), "wizard: namespaces loaded");
            let keep = w.namespaces.selected();
            w.namespaces.items = names
                .into_iter()
                .map(|n| Pick { selected: keep.contains(&n), item: n })
                .collect();
            w.namespaces.cursor = w.namespaces.cursor.min(w.namespaces.items.len().saturating_sub(1));
            w.namespaces.loading = false;
            w.namespaces.error = None;
        }
        Msg::Namespaces(Err(e)) => {
            warn!(error = %e, "wizard: namespace listing failed");
            w.namespaces.loading = false;
            w.namespaces.error = Some(e);
        }
        Msg::Workloads(Ok(items)) => {
            info!(count = items.len(), "wizard: workloads loaded");
            let previous: Vec<String> = w.workloads.selected().iter().map(|x| x.reference()).collect();
            w.workloads.items = items
                .into_iter()
                .map(|item| Pick { selected: previous.contains(&item.reference()), item })
                .collect();
            w.workloads.cursor = w.workloads.cursor.min(w.workloads.items.len().saturating_sub(1));
            w.workloads.loading = false;
            w.workloads.error = None;
        }
        Msg::Workloads(Err(e)) => {
            warn!(error = %e, "wizard: workload listing failed");
            w.workloads.loading = false;
            w.workloads.error = Some(e);
        }
        Msg::Proposal(p) => {
            info!(space = %p.app_space, units = p.units.len(), "wizard: proposal ready");
            w.configure.cursor = 0;
            w.configure.proposal = Some(p);
        }
        Msg::SpaceCreated(Ok(created)) => {
            w.apply.space_created = Some(created);
            w.advance_apply();
        }
        Msg::SpaceCreated(Err(e)) => {
            warn!(error = %e, "apply: app space creation failed");
            w.apply.space_error = Some(e);
            finish_apply(w);
        }
        Msg::UnitApplied { index, result } => {
            if index != w.apply.index {
                warn!(index, expected = w.apply.index, "apply: out-of-order result ignored");
                return;
            }
            let slug = w.proposal().and_then(|p| p.units.get(index)).map(|u| u.slug.clone()).unwrap_or_default();
            match result {
                Ok(()) => {
                    counter!("apply_unit_ok", 1u64);
                    w.apply.outcomes.push(UnitOutcome { slug, ok: true, error: None });
                }
                Err(e) => {
                    counter!("apply_unit_err", 1u64);
                    warn!(unit = %slug, error = %e, "apply: unit failed");
                    w.apply.outcomes.push(UnitOutcome { slug, ok: false, error: Some(e) });
                }
            }
            w.apply.index += 1;
            w.advance_apply();
        }
        Msg::CleanupDone(result) => {
            w.cleanup.running = false;
            match result {
                Ok(n) => {
                    info!(apps = n, action = ?w.cleanup.action, "cleanup: done");
                    w.cleanup.done = true;
                }
                Err(f) => {
                    warn!(app = %f.app, error = %f.error, "cleanup: aborted");
                    w.cleanup.error = Some(f);
                }
            }
        }
        Msg::WorkerStarted(result) => {
            w.worker.starting = false;
            match result {
                Ok(()) => w.worker.started = true,
                Err(e) => w.worker.error = Some(e),
            }
        }
        Msg::Test(t) => process_test(w, t),
    }
}

impl Wizard {
    /// Record zero-workload Units as trivially applied, then dispatch the next
    /// Unit or finish.
    pub(crate) fn advance_apply(&mut self) {
        let Some(p) = self.configure.proposal.as_ref() else {
            finish_apply(self);
            return;
        };
        while self.apply.index < self.apply.total {
            let unit = &p.units[self.apply.index];
            if !unit.workloads.is_empty() {
                break;
            }
            self.apply.outcomes.push(UnitOutcome { slug: unit.slug.clone(), ok: true, error: None });
            self.apply.index += 1;
        }
        if self.apply.index < self.apply.total {
            self.start_unit_task(self.apply.index);
        } else {
            finish_apply(self);
        }
    }
}

fn finish_apply(w: &mut Wizard) {
    w.apply.done = true;
    if let Some(t0) = w.apply.started {
        let took = t0.elapsed();
        w.apply.elapsed = Some(took);
        histogram!("apply_phase_ms", took.as_secs_f64() * 1000.0);
    }
    info!(
        ok = w.apply.successes(),
        failed = w.apply.failures(),
        total = w.apply.total,
        "apply: finished"
    );
    if w.apply.space_error.is_none() && !w.cleanup.apps.is_empty() {
        w.step = Step::ArgoCleanup;
    }
}

fn record(w: &mut Wizard, ok: bool, detail: String) {
    let elapsed = w.test.started.map(|t| t.elapsed()).unwrap_or_default();
    let phase = w.test.phase;
    w.test.records.push(PhaseRecord { phase, ok, elapsed, detail });
}

fn fail_test(w: &mut Wizard, e: PhaseError) {
    warn!(unit = %w.test.unit, phase = w.test.phase.as_str(), error = %e, "test: failed");
    record(w, false, e.to_string());
    counter!("test_runs_failed", 1u64);
    w.test.error = Some(e);
    w.test.waiting = None;
    w.test.phase = TestPhase::Failed;
}

fn process_test(w: &mut Wizard, t: TestMsg) {
    match (w.test.phase, t) {
        (TestPhase::Annotate, TestMsg::Annotated(Ok(()))) => {
            let detail = format!("{}={}", w.settings.test_annotation, w.test.value);
            record(w, true, detail);
            w.test.phase = TestPhase::Apply;
            w.start_test_apply_task();
        }
        (TestPhase::Apply, TestMsg::Applied(Ok(target))) => {
            record(w, true, format!("applied to target {}", target));
            w.test.target = Some(target);
            w.test.phase = TestPhase::WaitSync;
            w.test.polls = 0;
            let delay = w.settings.sync_delay;
            w.start_sync_poll_task(1, delay);
        }
        (TestPhase::WaitSync, TestMsg::SyncPoll { attempt, result }) => {
            w.test.polls = attempt;
            match result {
                Ok(()) => {
                    w.test.waiting = None;
                    record(w, true, format!("live object readable after {} poll(s)", attempt));
                    w.test.phase = TestPhase::Verify;
                    w.start_verify_task();
                }
                Err(e) => {
                    if w.settings.sync_max_polls.map_or(false, |max| attempt >= max) {
                        fail_test(w, PhaseError::External { phase: "wait", message: format!("gave up after {} polls: {}", attempt, e) });
                        return;
                    }
                    w.test.waiting = Some(format!("still waiting for sync (poll {}): {}", attempt, e));
                    let poll = w.settings.sync_poll;
                    w.start_sync_poll_task(attempt + 1, poll);
                }
            }
        }
        (TestPhase::Verify, TestMsg::Verified(Ok(verdict))) => {
            let ok = verdict.passed();
            record(w, ok, verdict.detail());
            w.test.phase = if ok { TestPhase::Passed } else { TestPhase::Failed };
            if let Some(t0) = w.test.started {
                histogram!("test_run_ms", t0.elapsed().as_secs_f64() * 1000.0);
            }
            info!(unit = %w.test.unit, passed = ok, detail = %verdict.detail(), "test: verified");
            w.test.verdict = Some(verdict);
        }
        (
            TestPhase::Annotate | TestPhase::Apply | TestPhase::Verify,
            TestMsg::Annotated(Err(e)) | TestMsg::Applied(Err(e)) | TestMsg::Verified(Err(e)),
        ) => fail_test(w, e),
        (phase, t) => warn!(phase = phase.as_str(), msg = ?t, "test: unexpected message ignored"),
    }
}

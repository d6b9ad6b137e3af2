//! Reconciliation engine: single-slot mailbox, comparison worker and UI hand-off.
//!
//! Every `submit` builds its snapshot on the caller's thread and drops it into
//! a one-deep mailbox. A dedicated worker thread takes the latest submission,
//! compares it with the applied state and hands the result to the UI thread
//! through a channel. The worker then blocks until the UI thread acknowledges
//! the apply, so at most one comparison and one UI mutation are ever in
//! flight. A submission that is still waiting in the mailbox when a newer one
//! arrives is replaced, never applied.
use crate::binding::ListBinding;
use crate::config::ReconcilerConfig;
use crate::control::ListControl;
use crate::diff_engine::{PlanFor, diff};
use crate::errors::{ApplyError, ReconcilerError};
use crate::snapshot::Submission;
use crate::surface::{BindingSurface, Callback, DiagnosticHook};
use crate::types::{EdgeInsets, ItemsSection};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use log::{debug, error, trace, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How often a worker blocked on an acknowledgement re-checks for teardown.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    ComparisonInFlight,
    ApplyingOnUiThread,
    /// A list control rejected an update; submissions are refused from now on.
    Halted,
    Dismantled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Suppressed,
    SizeRefreshOnly,
    FullDiff { changes: usize },
}

/// Reported to the diagnostics hook of the binding surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    StaleSubmissionDiscarded { sequence: u64, superseded_by: u64 },
    Completed { sequence: u64, outcome: Outcome },
    ApplyFailed { sequence: u64, reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub submitted: u64,
    pub discarded: u64,
    pub suppressed: u64,
    pub size_refreshes: u64,
    pub full_diffs: u64,
}

pub(crate) type ApplyAck = Result<(), ApplyError>;

/// Work for the UI thread.
pub(crate) enum UiCommand<T: ItemsSection> {
    ApplyDiff {
        submission: Arc<Submission<T>>,
        plan: PlanFor<T>,
        animated: bool,
        scroll_to_top: bool,
        ack: Sender<ApplyAck>,
    },
    RefreshSizes {
        submission: Arc<Submission<T>>,
        ack: Sender<ApplyAck>,
    },
    EndRefresh,
    ContentInsets(EdgeInsets),
    InstallRefreshControl(Callback),
}

/// Outcome of one comparison, before it reaches the UI thread.
pub(crate) enum Decision<T: ItemsSection> {
    Suppressed,
    SizeRefreshOnly,
    FullDiff(PlanFor<T>),
}

/// Decides what a new submission requires, in priority order:
///
/// 1. non-empty and identical (identities and item values) to the last
///    confirmed submission: nothing to do;
/// 2. same identities as the applied state: re-measure only;
/// 3. anything else: a structural diff.
///
/// Diffing is by identity only. An item whose content changes while its
/// identity stays put never shows up in a plan; it only triggers rule 2.
pub(crate) fn evaluate<T: ItemsSection>(
    applied: &Submission<T>,
    confirmed: Option<&Submission<T>>,
    new: &Submission<T>,
) -> Decision<T> {
    if new.snapshot.number_of_items() > 0 && confirmed.is_some_and(|c| new.is_identical_to(c)) {
        return Decision::Suppressed;
    }
    if new.snapshot == applied.snapshot {
        return Decision::SizeRefreshOnly;
    }
    Decision::FullDiff(diff(&applied.snapshot, &new.snapshot))
}

#[derive(Debug, Clone, Copy)]
struct SurfaceFlags {
    animate_changes: bool,
    scroll_to_top_on_apply: bool,
}

struct EngineState<T: ItemsSection> {
    phase: EnginePhase,
    pending: Option<Submission<T>>,
    shutdown: bool,
    failure: Option<String>,
    next_sequence: u64,
    stats: ReconcileStats,
}

pub(crate) struct Shared<T: ItemsSection> {
    id: Uuid,
    state: Mutex<EngineState<T>>,
    changed: Condvar,
    flags: RwLock<SurfaceFlags>,
    pub(crate) refresh_pending: AtomicBool,
    diagnostics: Option<DiagnosticHook>,
    ui: Sender<UiCommand<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

enum DispatchError {
    Rejected(ApplyError),
    Disconnected,
}

impl<T: ItemsSection> Shared<T> {
    fn emit(&self, event: CycleEvent) {
        if let Some(hook) = &self.diagnostics {
            hook(&event);
        }
    }

    fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Blocks until a submission is waiting. Returns `None` on teardown.
    fn next_submission(&self) -> Option<Submission<T>> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(submission) = state.pending.take() {
                state.phase = EnginePhase::ComparisonInFlight;
                self.changed.notify_all();
                return Some(submission);
            }
            if state.phase != EnginePhase::Idle {
                state.phase = EnginePhase::Idle;
                self.changed.notify_all();
            }
            self.changed.wait(&mut state);
        }
    }

    fn set_phase(&self, phase: EnginePhase) {
        let mut state = self.state.lock();
        if !state.shutdown {
            state.phase = phase;
            self.changed.notify_all();
        }
    }

    fn record(&self, sequence: u64, outcome: Outcome) {
        {
            let mut state = self.state.lock();
            match outcome {
                Outcome::Suppressed => state.stats.suppressed += 1,
                Outcome::SizeRefreshOnly => state.stats.size_refreshes += 1,
                Outcome::FullDiff { .. } => state.stats.full_diffs += 1,
            }
        }
        debug!("Reconciler[{}]: submission #{} -> {:?}", self.id, sequence, outcome);
        self.emit(CycleEvent::Completed { sequence, outcome });
    }

    fn halt(&self, sequence: u64, err: ApplyError) {
        let reason = err.to_string();
        error!("Reconciler[{}]: list control rejected submission #{}: {}", self.id, sequence, reason);
        {
            let mut state = self.state.lock();
            state.pending = None;
            state.failure = Some(reason.clone());
            if !state.shutdown {
                state.phase = EnginePhase::Halted;
            }
            self.changed.notify_all();
        }
        self.emit(CycleEvent::ApplyFailed { sequence, reason });
    }

    /// Sends a command to the UI thread and waits for its acknowledgement.
    fn dispatch(&self, make: impl FnOnce(Sender<ApplyAck>) -> UiCommand<T>) -> Result<(), DispatchError> {
        if self.is_shutdown() {
            return Err(DispatchError::Disconnected);
        }
        let (ack_tx, ack_rx) = bounded(1);
        self.ui.send(make(ack_tx)).map_err(|_| DispatchError::Disconnected)?;
        loop {
            match ack_rx.recv_timeout(ACK_POLL_INTERVAL) {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => return Err(DispatchError::Rejected(err)),
                Err(RecvTimeoutError::Timeout) => {
                    if self.is_shutdown() {
                        return Err(DispatchError::Disconnected);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(DispatchError::Disconnected),
            }
        }
    }

    pub(crate) fn dismantle(&self) {
        let cancelled = {
            let mut state = self.state.lock();
            state.shutdown = true;
            state.phase = EnginePhase::Dismantled;
            self.changed.notify_all();
            state.pending.take()
        };
        if let Some(submission) = cancelled {
            debug!("Reconciler[{}]: cancelled queued submission #{}", self.id, submission.sequence);
        }
    }

    pub(crate) fn join_worker(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Reconciler[{}]: worker thread panicked", self.id);
            }
        }
    }
}

fn worker_loop<T: ItemsSection>(shared: Arc<Shared<T>>) {
    let mut applied: Arc<Submission<T>> = Arc::new(Submission::empty());
    let mut confirmed: Option<Arc<Submission<T>>> = None;

    while let Some(submission) = shared.next_submission() {
        let submission = Arc::new(submission);
        let sequence = submission.sequence;
        let flags = *shared.flags.read();

        match evaluate(&applied, confirmed.as_deref(), &submission) {
            Decision::Suppressed => {
                if shared.refresh_pending.load(Ordering::Acquire) {
                    if shared.ui.send(UiCommand::EndRefresh).is_err() {
                        debug!("Reconciler[{}]: end-refresh dropped, binding is gone", shared.id);
                    }
                }
                shared.record(sequence, Outcome::Suppressed);
            }
            Decision::SizeRefreshOnly => {
                shared.set_phase(EnginePhase::ApplyingOnUiThread);
                let dispatched = shared.dispatch(|ack| UiCommand::RefreshSizes { submission: submission.clone(), ack });
                match dispatched {
                    Ok(()) => {
                        applied = submission.clone();
                        confirmed = Some(submission);
                        shared.record(sequence, Outcome::SizeRefreshOnly);
                    }
                    Err(DispatchError::Rejected(err)) => {
                        shared.halt(sequence, err);
                        return;
                    }
                    Err(DispatchError::Disconnected) => break,
                }
            }
            Decision::FullDiff(plan) => {
                let changes = plan.len();
                trace!("Reconciler[{}]: submission #{} needs {} changes", shared.id, sequence, changes);
                shared.set_phase(EnginePhase::ApplyingOnUiThread);
                let dispatched = shared.dispatch(|ack| UiCommand::ApplyDiff {
                    submission: submission.clone(),
                    plan,
                    animated: flags.animate_changes,
                    scroll_to_top: flags.scroll_to_top_on_apply,
                    ack,
                });
                match dispatched {
                    Ok(()) => {
                        applied = submission.clone();
                        confirmed = Some(submission);
                        shared.record(sequence, Outcome::FullDiff { changes });
                    }
                    Err(DispatchError::Rejected(err)) => {
                        shared.halt(sequence, err);
                        return;
                    }
                    Err(DispatchError::Disconnected) => break,
                }
            }
        }
    }

    debug!("Reconciler[{}]: worker exiting", shared.id);
}

/// Handle to a running reconciler. Cheap to clone and usable from any thread.
pub struct Reconciler<T: ItemsSection> {
    shared: Arc<Shared<T>>,
}

impl<T: ItemsSection> Clone for Reconciler<T> {
    fn clone(&self) -> Self {
        Reconciler { shared: self.shared.clone() }
    }
}

impl<T: ItemsSection> Reconciler<T> {
    /// Starts the comparison worker and returns the submission handle plus
    /// the UI-thread half. Call this on the UI thread: the binding stays
    /// there and must be pumped by the host's event loop.
    pub fn spawn<L>(
        config: ReconcilerConfig,
        surface: BindingSurface<T, L::Content>,
        control: L,
    ) -> Result<(Reconciler<T>, ListBinding<T, L>), ReconcilerError>
    where
        L: ListControl<T>,
    {
        let (ui_tx, ui_rx): (Sender<UiCommand<T>>, Receiver<UiCommand<T>>) = unbounded();
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            state: Mutex::new(EngineState {
                phase: EnginePhase::Idle,
                pending: None,
                shutdown: false,
                failure: None,
                next_sequence: 0,
                stats: ReconcileStats::default(),
            }),
            changed: Condvar::new(),
            flags: RwLock::new(SurfaceFlags {
                animate_changes: config.animate_changes,
                scroll_to_top_on_apply: config.scroll_to_top_on_apply,
            }),
            refresh_pending: AtomicBool::new(false),
            diagnostics: surface.on_diagnostic.clone(),
            ui: ui_tx,
            worker: Mutex::new(None),
        });

        let mut builder = thread::Builder::new().name(config.worker_name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let thread_shared = shared.clone();
        let handle = builder
            .spawn(move || worker_loop(thread_shared))
            .map_err(|e| ReconcilerError::WorkerSpawn {
                name: config.worker_name.clone(),
                details: e.to_string(),
            })?;
        *shared.worker.lock() = Some(handle);

        debug!("Reconciler[{}]: started worker '{}'", shared.id, config.worker_name);
        let binding = ListBinding::new(shared.clone(), ui_rx, surface, control, config.content_insets);
        Ok((Reconciler { shared }, binding))
    }

    pub(crate) fn from_shared(shared: Arc<Shared<T>>) -> Self {
        Reconciler { shared }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Queues `sections` for reconciliation and returns the submission's
    /// sequence number.
    ///
    /// Duplicate identities are rejected here, synchronously. A submission
    /// still waiting behind an in-flight one is replaced by this one.
    pub fn submit(&self, sections: Vec<T>) -> Result<u64, ReconcilerError> {
        let mut submission = Submission::new(0, sections).inspect_err(|e| {
            warn!("Reconciler[{}]: rejected submission: {}", self.shared.id, e);
        })?;

        let (sequence, discarded) = {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return Err(ReconcilerError::Dismantled);
            }
            if let Some(reason) = &state.failure {
                return Err(ReconcilerError::Halted { reason: reason.clone() });
            }
            state.next_sequence += 1;
            submission.sequence = state.next_sequence;
            state.stats.submitted += 1;
            let sequence = submission.sequence;
            let discarded = state.pending.replace(submission).map(|stale| stale.sequence);
            if discarded.is_some() {
                state.stats.discarded += 1;
            }
            self.shared.changed.notify_all();
            (sequence, discarded)
        };

        trace!("Reconciler[{}]: queued submission #{}", self.shared.id, sequence);
        if let Some(stale) = discarded {
            debug!("Reconciler[{}]: submission #{} superseded by #{}", self.shared.id, stale, sequence);
            self.shared.emit(CycleEvent::StaleSubmissionDiscarded { sequence: stale, superseded_by: sequence });
        }
        Ok(sequence)
    }

    /// Read at the start of the next cycle.
    pub fn set_animated(&self, animated: bool) {
        self.shared.flags.write().animate_changes = animated;
    }

    /// Read at the start of the next cycle.
    pub fn set_scroll_to_top_on_apply(&self, scroll: bool) {
        self.shared.flags.write().scroll_to_top_on_apply = scroll;
    }

    pub fn set_content_insets(&self, insets: EdgeInsets) {
        if self.shared.ui.send(UiCommand::ContentInsets(insets)).is_err() {
            debug!("Reconciler[{}]: insets dropped, binding is gone", self.shared.id);
        }
    }

    pub fn register_pull_to_refresh<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.shared.ui.send(UiCommand::InstallRefreshControl(Arc::new(callback))).is_err() {
            debug!("Reconciler[{}]: refresh callback dropped, binding is gone", self.shared.id);
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.shared.state.lock().phase
    }

    pub fn stats(&self) -> ReconcileStats {
        self.shared.state.lock().stats
    }

    /// Why the reconciler halted, if it did.
    pub fn failure(&self) -> Option<String> {
        self.shared.state.lock().failure.clone()
    }

    pub fn has_pending(&self) -> bool {
        self.shared.state.lock().pending.is_some()
    }

    /// Nothing queued and nothing in flight.
    pub fn is_settled(&self) -> bool {
        let state = self.shared.state.lock();
        state.pending.is_none()
            && matches!(state.phase, EnginePhase::Idle | EnginePhase::Halted | EnginePhase::Dismantled)
    }

    /// Blocks until the engine reaches `phase`. Never call this on the UI
    /// thread while waiting for an apply: the UI thread is what completes it.
    pub fn wait_for_phase(&self, phase: EnginePhase, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.phase != phase {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return state.phase == phase;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ListSection;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u32,
        title: &'static str,
    }

    impl crate::types::Identifiable for Row {
        type Id = u32;
        fn id(&self) -> u32 {
            self.id
        }
    }

    type Section = ListSection<&'static str, Row>;

    fn submission(sequence: u64, layout: &[(&'static str, &[(u32, &'static str)])]) -> Submission<Section> {
        let sections = layout
            .iter()
            .map(|(key, rows)| ListSection::new(*key, rows.iter().map(|&(id, title)| Row { id, title }).collect()))
            .collect();
        Submission::new(sequence, sections).unwrap()
    }

    #[test]
    fn first_submission_is_a_full_diff() {
        let applied = Submission::empty();
        let new = submission(1, &[("A", &[(1, "a")])]);
        assert!(matches!(evaluate(&applied, None, &new), Decision::FullDiff(plan) if plan.len() == 2));
    }

    #[test]
    fn identical_to_confirmed_is_suppressed() {
        let applied = submission(1, &[("A", &[(1, "a"), (2, "b")])]);
        let new = submission(2, &[("A", &[(1, "a"), (2, "b")])]);
        assert!(matches!(evaluate(&applied, Some(&applied), &new), Decision::Suppressed));
    }

    #[test]
    fn content_only_change_refreshes_sizes_without_a_plan() {
        let applied = submission(1, &[("A", &[(1, "a"), (2, "b")])]);
        let edited = submission(2, &[("A", &[(1, "a"), (2, "B!")])]);
        assert!(matches!(evaluate(&applied, Some(&applied), &edited), Decision::SizeRefreshOnly));
    }

    #[test]
    fn empty_after_empty_refreshes_sizes() {
        let applied: Submission<Section> = Submission::empty();
        let new = submission(1, &[]);
        assert!(matches!(evaluate(&applied, Some(&applied), &new), Decision::SizeRefreshOnly));
    }

    #[test]
    fn empty_after_content_is_a_full_diff() {
        let applied = submission(1, &[("A", &[(1, "a")]), ("B", &[(2, "b")])]);
        let new = submission(2, &[]);
        match evaluate(&applied, Some(&applied), &new) {
            Decision::FullDiff(plan) => {
                assert_eq!(plan.len(), 2);
                assert_eq!(plan.section_changes().count(), 2);
            }
            _ => panic!("expected a full diff"),
        }
    }

    #[test]
    fn unconfirmed_identical_identities_refresh_sizes() {
        let applied = submission(1, &[("A", &[(1, "a")])]);
        let new = submission(2, &[("A", &[(1, "a")])]);
        assert!(matches!(evaluate(&applied, None, &new), Decision::SizeRefreshOnly));
    }
}

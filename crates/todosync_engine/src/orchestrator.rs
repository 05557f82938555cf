//! Sync run orchestration.
//!
//! A run is split between two tasks:
//! - a blocking worker that performs the network exchanges and the
//!   reconciliation pass, publishing a [`RunContext`] snapshot as it goes;
//! - an async supervisor that forwards phase transitions, conflict prompts
//!   and a periodic progress heartbeat to the consumer's event channel, and
//!   waits for the worker to finish.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::reconcile::{Case, DecisionMaker, Reconciler};
use crate::store::TaskStore;
use crate::transport::{connect_udp, DatagramSocket, TransportSession};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use todosync_protocol::{decode_snapshot, Changeset, Conflict, ConflictPolicy, Resolution};

/// Phase of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncPhase {
    /// Run accepted, nothing sent yet.
    #[default]
    Start,
    /// Registering the client.
    Register,
    /// Pulling and decoding the server's records.
    ServerClient,
    /// Reconciling.
    Sync,
    /// Encoding and pushing the changeset.
    ClientServer,
    /// Ending the session.
    Reset,
}

impl SyncPhase {
    /// Phase name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            SyncPhase::Start => "start",
            SyncPhase::Register => "register",
            SyncPhase::ServerClient => "server_client",
            SyncPhase::Sync => "sync",
            SyncPhase::ClientServer => "client_server",
            SyncPhase::Reset => "reset",
        }
    }
}

/// Snapshot of a run's progress counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    /// Current phase.
    pub phase: SyncPhase,
    /// Snapshot bytes decoded.
    pub pulled_bytes: usize,
    /// Snapshot size.
    pub pull_total: usize,
    /// Records reconciled.
    pub records_done: usize,
    /// Records to reconcile.
    pub records_total: usize,
    /// Changeset bytes acknowledged.
    pub pushed_bytes: usize,
    /// Changeset size.
    pub push_total: usize,
}

impl RunContext {
    /// Human-readable progress text.
    pub fn message(&self) -> String {
        match self.phase {
            SyncPhase::Start => "Starting...".to_string(),
            SyncPhase::Register => "Registering...".to_string(),
            SyncPhase::ServerClient => format!(
                "Server -> Client: {} out of {} bytes",
                self.pulled_bytes, self.pull_total
            ),
            SyncPhase::Sync => format!(
                "Synchronizing {} out of {} records",
                self.records_done, self.records_total
            ),
            SyncPhase::ClientServer => format!(
                "Client -> Server: {} out of {} bytes",
                self.pushed_bytes, self.push_total
            ),
            SyncPhase::Reset => "Closing...".to_string(),
        }
    }
}

/// A conflict waiting for an answer.
///
/// The worker blocks until [`answer`](Self::answer) is called. Dropping the
/// prompt aborts the run with [`SyncError::DecisionAbandoned`].
#[derive(Debug)]
pub struct ConflictPrompt {
    conflict: Conflict,
    reply: oneshot::Sender<Resolution>,
}

impl ConflictPrompt {
    /// The conflict to resolve.
    pub fn conflict(&self) -> &Conflict {
        &self.conflict
    }

    /// Sends the answer. Returns false, and logs a warning, if the run is
    /// already gone.
    pub fn answer(self, resolution: Resolution) -> bool {
        let id = self.conflict.id();
        let delivered = self.reply.send(resolution).is_ok();
        if !delivered {
            tracing::warn!(id, ?resolution, "conflict answered after the run ended");
        }
        delivered
    }
}

/// An event delivered to the progress consumer.
#[derive(Debug)]
pub struct ProgressEvent {
    /// Phase the run was in.
    pub phase: SyncPhase,
    /// Progress text.
    pub message: Option<String>,
    /// Conflict needing an answer.
    pub prompt: Option<ConflictPrompt>,
    /// Error that aborted the run.
    pub error: Option<String>,
    /// The run is over; no further events follow.
    pub done: bool,
}

impl ProgressEvent {
    fn status(phase: SyncPhase, message: String) -> Self {
        Self {
            phase,
            message: Some(message),
            prompt: None,
            error: None,
            done: false,
        }
    }

    fn conflict(phase: SyncPhase, prompt: ConflictPrompt) -> Self {
        Self {
            phase,
            message: None,
            prompt: Some(prompt),
            error: None,
            done: false,
        }
    }

    fn failed(phase: SyncPhase, error: String) -> Self {
        Self {
            phase,
            message: None,
            prompt: None,
            error: Some(error),
            done: false,
        }
    }

    fn finished(phase: SyncPhase) -> Self {
        Self {
            phase,
            message: None,
            prompt: None,
            error: None,
            done: true,
        }
    }
}

/// How conflicts are answered during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictMode {
    /// Every conflict gets the same answer.
    Automatic(ConflictPolicy),
    /// Every conflict is sent to the consumer as a [`ConflictPrompt`].
    Interactive,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Records pulled from the server.
    pub pulled: usize,
    /// New records pushed.
    pub pushed_new: usize,
    /// Updates pushed.
    pub pushed_updated: usize,
    /// Deletions pushed.
    pub pushed_deleted: usize,
    /// Server records imported as new local records.
    pub imported: usize,
    /// Provisional records given final identifiers.
    pub adjusted: usize,
    /// How often each reconciliation case was applied.
    pub cases: BTreeMap<Case, usize>,
}

impl RunReport {
    /// Number of times `case` was applied.
    pub fn count(&self, case: Case) -> usize {
        self.cases.get(&case).copied().unwrap_or(0)
    }

    /// Records pushed in total.
    pub fn pushed(&self) -> usize {
        self.pushed_new + self.pushed_updated + self.pushed_deleted
    }
}

enum WorkerSignal {
    Phase(RunContext),
    Prompt(ConflictPrompt),
}

/// Forwards conflicts to the supervisor and waits for the answer.
struct PromptDecider {
    signals: mpsc::UnboundedSender<WorkerSignal>,
}

impl DecisionMaker for PromptDecider {
    fn decide(&mut self, conflict: &Conflict) -> SyncResult<Resolution> {
        let (reply, answer) = oneshot::channel();
        let prompt = ConflictPrompt {
            conflict: conflict.clone(),
            reply,
        };
        self.signals
            .send(WorkerSignal::Prompt(prompt))
            .map_err(|_| SyncError::DecisionAbandoned)?;
        answer.blocking_recv().map_err(|_| SyncError::DecisionAbandoned)
    }
}

/// Clears the running flag when the worker ends, even on panic.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a started run.
pub struct SyncHandle {
    supervisor: JoinHandle<SyncResult<RunReport>>,
}

impl SyncHandle {
    /// Waits for the run to finish.
    pub async fn wait(self) -> SyncResult<RunReport> {
        self.supervisor
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))?
    }

    /// Returns true once the run and its final events are done.
    pub fn is_finished(&self) -> bool {
        self.supervisor.is_finished()
    }
}

/// Starts sync runs against a shared task store.
///
/// At most one run is in progress at a time. Runs must be started from
/// within a tokio runtime.
pub struct SyncOrchestrator<S: TaskStore + 'static> {
    config: SyncConfig,
    store: Arc<Mutex<S>>,
    running: Arc<AtomicBool>,
}

impl<S: TaskStore + 'static> SyncOrchestrator<S> {
    /// Creates an orchestrator owning `store`.
    pub fn new(config: SyncConfig, store: S) -> Self {
        Self::with_shared_store(config, Arc::new(Mutex::new(store)))
    }

    /// Creates an orchestrator over a shared store.
    pub fn with_shared_store(config: SyncConfig, store: Arc<Mutex<S>>) -> Self {
        Self {
            config,
            store,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The shared store. Do not hold its lock across a run.
    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    /// Returns true while a worker is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts a run against the configured server over UDP.
    pub fn start(
        &self,
        mode: ConflictMode,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> SyncResult<SyncHandle> {
        let server = self.config.server_addr;
        self.spawn(move || connect_udp(server), mode, events)
    }

    /// Starts a run over an already connected socket.
    pub fn start_with_socket<D: DatagramSocket + 'static>(
        &self,
        socket: D,
        mode: ConflictMode,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> SyncResult<SyncHandle> {
        self.spawn(move || Ok(socket), mode, events)
    }

    fn spawn<D, F>(
        &self,
        connect: F,
        mode: ConflictMode,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> SyncResult<SyncHandle>
    where
        D: DatagramSocket + 'static,
        F: FnOnce() -> SyncResult<D> + Send + 'static,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }
        let guard = RunGuard(Arc::clone(&self.running));

        let (context_tx, context_rx) = watch::channel(RunContext::default());
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let interval = config.progress_interval;

        let worker = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let mut decisions: Box<dyn DecisionMaker> = match mode {
                ConflictMode::Automatic(policy) => Box::new(policy),
                ConflictMode::Interactive => Box::new(PromptDecider {
                    signals: signal_tx.clone(),
                }),
            };
            let job = Worker {
                config: &config,
                store: &store,
                context: context_tx,
                signals: signal_tx,
            };
            job.run(connect, decisions.as_mut())
        });

        let supervisor = tokio::spawn(supervise(worker, context_rx, signal_rx, events, interval));
        Ok(SyncHandle { supervisor })
    }
}

async fn supervise(
    mut worker: JoinHandle<SyncResult<RunReport>>,
    context: watch::Receiver<RunContext>,
    mut signals: mpsc::UnboundedReceiver<WorkerSignal>,
    events: mpsc::UnboundedSender<ProgressEvent>,
    interval: Duration,
) -> SyncResult<RunReport> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut phase = SyncPhase::Start;
    let mut last_message = RunContext::default().message();
    let _ = events.send(ProgressEvent::status(phase, last_message.clone()));

    let result = loop {
        tokio::select! {
            biased;
            Some(signal) = signals.recv() => match signal {
                WorkerSignal::Phase(snapshot) => {
                    phase = snapshot.phase;
                    tracing::info!(phase = phase.name(), "sync phase");
                    last_message = snapshot.message();
                    let _ = events.send(ProgressEvent::status(phase, last_message.clone()));
                }
                WorkerSignal::Prompt(prompt) => {
                    tracing::debug!(id = prompt.conflict().id(), "waiting for conflict decision");
                    let _ = events.send(ProgressEvent::conflict(phase, prompt));
                }
            },
            joined = &mut worker => {
                break joined.map_err(|e| SyncError::Worker(e.to_string())).and_then(|r| r);
            }
            _ = ticker.tick() => {
                let snapshot = context.borrow().clone();
                if snapshot.phase == phase {
                    let message = snapshot.message();
                    if message != last_message {
                        last_message = message;
                        let _ = events.send(ProgressEvent::status(phase, last_message.clone()));
                    }
                }
            }
        }
    };

    match &result {
        Ok(report) => tracing::info!(
            pulled = report.pulled,
            pushed = report.pushed(),
            imported = report.imported,
            "sync run completed"
        ),
        Err(e) if e.is_remote_failure() => {
            tracing::warn!(error = %e, phase = phase.name(), "sync run aborted by peer");
            let _ = events.send(ProgressEvent::failed(phase, e.user_message()));
        }
        Err(e) => {
            tracing::error!(error = %e, phase = phase.name(), "sync run aborted");
            let _ = events.send(ProgressEvent::failed(phase, e.user_message()));
        }
    }
    let _ = events.send(ProgressEvent::finished(phase));
    result
}

/// The blocking half of a run.
struct Worker<'a, S: TaskStore> {
    config: &'a SyncConfig,
    store: &'a Mutex<S>,
    context: watch::Sender<RunContext>,
    signals: mpsc::UnboundedSender<WorkerSignal>,
}

impl<S: TaskStore> Worker<'_, S> {
    fn run<D, F>(&self, connect: F, decisions: &mut dyn DecisionMaker) -> SyncResult<RunReport>
    where
        D: DatagramSocket,
        F: FnOnce() -> SyncResult<D>,
    {
        let mut session = TransportSession::new(connect()?, self.config.transport.clone());
        match self.drive(&mut session, decisions) {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::warn!(error = %e, "releasing session after failure");
                session.release();
                let _ = self.store.lock().discard_mirror();
                Err(e)
            }
        }
    }

    fn enter(&self, phase: SyncPhase) {
        self.context.send_modify(|c| c.phase = phase);
        let snapshot = self.context.borrow().clone();
        let _ = self.signals.send(WorkerSignal::Phase(snapshot));
    }

    fn drive<D: DatagramSocket>(
        &self,
        session: &mut TransportSession<D>,
        decisions: &mut dyn DecisionMaker,
    ) -> SyncResult<RunReport> {
        let client_id = self.config.client_id;
        self.enter(SyncPhase::Register);
        if !session.register(client_id)? {
            return Err(SyncError::RegistrationDeclined { client_id });
        }

        self.enter(SyncPhase::ServerClient);
        let payload = session.pull_from_server()?;
        self.context.send_modify(|c| c.pull_total = payload.len());

        // Decode everything before touching the store.
        let mut decoder = decode_snapshot(&payload);
        let mut pulled = Vec::new();
        while let Some(record) = decoder.next() {
            pulled.push(record?);
            let position = decoder.position();
            self.context.send_modify(|c| c.pulled_bytes = position);
        }

        let mut report = RunReport {
            pulled: pulled.len(),
            ..RunReport::default()
        };

        let changeset = {
            let mut store = self.store.lock();
            store.begin_mirror()?;
            for record in pulled {
                store.import_remote_mirror(record)?;
            }

            self.enter(SyncPhase::Sync);
            let outcome = Reconciler::new(&mut *store, decisions).run(|done, total| {
                self.context.send_modify(|c| {
                    c.records_done = done;
                    c.records_total = total;
                });
            })?;
            report.cases = outcome.cases;
            report.adjusted = outcome.adjusted;
            report.imported = outcome.imported;

            Changeset {
                new: store.list_new_outbound()?,
                deleted: store.list_deleted_outbound()?,
                updated: store.list_updated_outbound()?,
            }
        };
        report.pushed_new = changeset.new.len();
        report.pushed_deleted = changeset.deleted.len();
        report.pushed_updated = changeset.updated.len();

        let bytes = changeset.encode()?;
        self.context.send_modify(|c| c.push_total = bytes.len());
        self.enter(SyncPhase::ClientServer);
        session.push_to_server(&bytes)?;
        self.context.send_modify(|c| c.pushed_bytes = bytes.len());

        self.enter(SyncPhase::Reset);
        session.close()?;
        self.store.lock().discard_mirror()?;
        Ok(report)
    }
}

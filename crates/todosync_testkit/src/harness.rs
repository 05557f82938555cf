//! Helpers that drive a sync run to completion.

use tokio::sync::mpsc;
use todosync_engine::{
    ConflictMode, ProgressEvent, RunReport, SyncOrchestrator, SyncResult, TaskStore,
};
use todosync_protocol::{Conflict, ConflictPolicy, Resolution};

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// The run result.
    pub result: SyncResult<RunReport>,
    /// Progress texts in delivery order.
    pub messages: Vec<String>,
    /// Conflicts that were prompted, in order.
    pub conflicts: Vec<Conflict>,
    /// Error texts delivered to the consumer.
    pub errors: Vec<String>,
}

impl RunOutcome {
    /// Returns the report, panicking with the error otherwise.
    pub fn report(self) -> RunReport {
        match self.result {
            Ok(report) => report,
            Err(e) => panic!("sync run failed: {e}"),
        }
    }
}

/// Runs a sync with a fixed conflict policy.
pub async fn run_automatic<S: TaskStore + 'static>(
    orchestrator: &SyncOrchestrator<S>,
    policy: ConflictPolicy,
) -> RunOutcome {
    run_with(orchestrator, ConflictMode::Automatic(policy), |_| {
        Resolution::PickRemote
    })
    .await
}

/// Runs a sync answering every conflict prompt with `answer`.
pub async fn run_interactive<S, F>(orchestrator: &SyncOrchestrator<S>, answer: F) -> RunOutcome
where
    S: TaskStore + 'static,
    F: FnMut(&Conflict) -> Resolution,
{
    run_with(orchestrator, ConflictMode::Interactive, answer).await
}

async fn run_with<S, F>(
    orchestrator: &SyncOrchestrator<S>,
    mode: ConflictMode,
    mut answer: F,
) -> RunOutcome
where
    S: TaskStore + 'static,
    F: FnMut(&Conflict) -> Resolution,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let handle = match orchestrator.start(mode, tx) {
        Ok(handle) => handle,
        Err(e) => {
            return RunOutcome {
                result: Err(e),
                messages: Vec::new(),
                conflicts: Vec::new(),
                errors: Vec::new(),
            }
        }
    };

    let mut messages = Vec::new();
    let mut conflicts = Vec::new();
    let mut errors = Vec::new();
    while let Some(event) = rx.recv().await {
        if let Some(message) = event.message {
            messages.push(message);
        }
        if let Some(prompt) = event.prompt {
            conflicts.push(prompt.conflict().clone());
            let resolution = answer(prompt.conflict());
            prompt.answer(resolution);
        }
        if let Some(error) = event.error {
            errors.push(error);
        }
        if event.done {
            break;
        }
    }

    RunOutcome {
        result: handle.wait().await,
        messages,
        conflicts,
        errors,
    }
}

//! A unit of background work on its own named thread

use std::fmt;
use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam_channel::{self as channel, Receiver, TryRecvError};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::octree::{CancelToken, OctreeNode};
use crate::task::model::SubtreeSwap;

/// Task kinds; at most one of each runs at a time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    Construct,
    Refine,
    Collapse,
    Export,
}

impl TaskKind {
    /// Reap order: a new baseline is installed before swaps are checked against it
    pub const ALL: [TaskKind; 4] = [TaskKind::Construct, TaskKind::Refine, TaskKind::Collapse, TaskKind::Export];

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Construct => "construct",
            TaskKind::Refine => "refine",
            TaskKind::Collapse => "collapse",
            TaskKind::Export => "export",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a finished task hands back
#[derive(Debug)]
pub enum TaskOutput {
    /// Meshed tree from a construct
    Built(OctreeNode),
    /// Replacement subtree from a refine or collapse
    Swap(SubtreeSwap),
    /// Files written by an export
    Exported(Vec<PathBuf>),
}

/// Cancellation signals seen by the work closure
#[derive(Clone, Debug)]
pub struct TaskSignals {
    /// Coarse flag, checked between major steps
    pub interrupt: CancelToken,
    /// Child of `interrupt`, threaded into construction and archive writes
    pub token: CancelToken,
}

impl TaskSignals {
    pub fn should_stop(&self) -> bool {
        self.interrupt.is_cancelled()
    }
}

type TaskResult = Result<Option<TaskOutput>>;

/// Handle to a running or finished task
pub struct Task {
    pub kind: TaskKind,
    pub generation: u64,
    signals: TaskSignals,
    result: Receiver<TaskResult>,
    thread: Option<JoinHandle<()>>,
}

impl Task {
    /// Start `work` on a new thread named after the task
    pub fn spawn<F>(kind: TaskKind, generation: u64, work: F) -> Result<Self>
    where
        F: FnOnce(&TaskSignals) -> TaskResult + Send + 'static,
    {
        let interrupt = CancelToken::new();
        let signals = TaskSignals { token: interrupt.child(), interrupt };
        let (sender, result) = channel::bounded(1);

        let thread_signals = signals.clone();
        let thread = std::thread::Builder::new()
            .name(format!("{}-task-{}", kind, generation))
            .spawn(move || {
                let outcome = work(&thread_signals);
                // Receiver gone means the scheduler shut down
                let _ = sender.send(outcome);
            })
            .map_err(|e| Error::Task(format!("failed to spawn {} task: {}", kind, e)))?;

        Ok(Self {
            kind,
            generation,
            signals,
            result,
            thread: Some(thread),
        })
    }

    /// Signal both cancellation flags without waiting
    pub fn cancel(&self) {
        self.signals.interrupt.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signals.interrupt.is_cancelled()
    }

    /// The thread has exited (never blocks)
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the thread and take its result
    pub fn join(mut self) -> TaskResult {
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| Error::Task(format!("{} task {} panicked", self.kind, self.generation)))?;
        }
        match self.result.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Err(Error::Task(format!(
                "{} task {} exited without a result",
                self.kind, self.generation
            ))),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.kind)
            .field("generation", &self.generation)
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

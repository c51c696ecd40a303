//! Single-flight background filtering.
//!
//! At most one filter task is current. Submitting a query cancels the
//! previous task before the new one is spawned on tokio's blocking pool. The
//! worker never touches foreground state: progress and the finished
//! replacement tree travel back as [`FilterEvent`]s over an unbounded
//! channel, tagged with the generation that produced them, and the
//! foreground drops anything that does not belong to its current task.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{OpFinderError, Result};
use crate::filter::{FilterEngine, FilterOutcome};
use crate::storage::LazyAutomatonIndex;
use crate::types::TreeNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }
}

/// Messages from a filter worker to the foreground.
#[derive(Debug, Clone)]
pub enum FilterEvent {
    Progress {
        generation: u64,
        percent: u8,
    },
    Finished {
        generation: u64,
        tree: Arc<TreeNode>,
        matches: usize,
        best_score: Option<u32>,
    },
    Cancelled {
        generation: u64,
    },
}

impl FilterEvent {
    pub fn generation(&self) -> u64 {
        match self {
            FilterEvent::Progress { generation, .. }
            | FilterEvent::Finished { generation, .. }
            | FilterEvent::Cancelled { generation } => *generation,
        }
    }
}

/// Everything a worker needs for one run.
#[derive(Debug, Clone)]
pub struct FilterRequest {
    pub query: String,
    pub index: Arc<LazyAutomatonIndex>,
    /// Root the ranked entries are attached to; its children are ignored.
    pub root: TreeNode,
    pub engine: FilterEngine,
}

struct InFlightFilter {
    generation: u64,
    cancel: CancellationToken,
    state: Arc<Mutex<TaskState>>,
}

pub struct FilterController {
    generation: u64,
    in_flight: Option<InFlightFilter>,
    last_state: TaskState,
    events: UnboundedSender<FilterEvent>,
}

impl FilterController {
    pub fn new(events: UnboundedSender<FilterEvent>) -> Self {
        Self {
            generation: 0,
            in_flight: None,
            last_state: TaskState::Idle,
            events,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// State of the current task, or of the last one if none is current.
    pub fn state(&self) -> TaskState {
        match &self.in_flight {
            Some(in_flight) => *in_flight.state.lock(),
            None => self.last_state,
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.is_some()
    }

    /// True when `generation` belongs to the current, uncancelled task.
    pub fn is_current(&self, generation: u64) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation && !f.cancel.is_cancelled())
    }

    /// Cancel the current task, if any. Its result will be discarded even if
    /// it still arrives.
    pub fn cancel(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!(generation = in_flight.generation, "cancelling filter task");
            in_flight.cancel.cancel();
            self.last_state = TaskState::Cancelled;
        }
    }

    /// Mark the current task terminal once its final event was handled.
    pub fn finish(&mut self, generation: u64) {
        if self.in_flight.as_ref().is_some_and(|f| f.generation == generation) {
            if let Some(in_flight) = self.in_flight.take() {
                self.last_state = *in_flight.state.lock();
            }
        }
    }

    /// Supersede any running task and start filtering `request`. Must be
    /// called from within a tokio runtime.
    pub fn submit(&mut self, request: FilterRequest) -> Result<u64> {
        let handle = current_runtime()?;

        self.cancel();
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;

        let cancel = CancellationToken::new();
        let state = Arc::new(Mutex::new(TaskState::Running));
        self.in_flight = Some(InFlightFilter {
            generation,
            cancel: cancel.clone(),
            state: Arc::clone(&state),
        });

        debug!(generation, query = %request.query, "spawning filter task");
        let events = self.events.clone();
        handle.spawn_blocking(move || run_filter(generation, request, cancel, state, events));

        Ok(generation)
    }
}

/// Handle of the runtime filter tasks are spawned on.
pub fn current_runtime() -> Result<Handle> {
    Handle::try_current().map_err(|_| OpFinderError::NoRuntime)
}

fn run_filter(
    generation: u64,
    request: FilterRequest,
    cancel: CancellationToken,
    state: Arc<Mutex<TaskState>>,
    events: UnboundedSender<FilterEvent>,
) {
    let index = request.index.get_or_build();

    let outcome = request.engine.filter(
        &request.query,
        index,
        |percent| {
            trace!(generation, percent, "filter progress");
            let _ = events.send(FilterEvent::Progress { generation, percent });
        },
        &cancel,
    );

    let result = match outcome {
        FilterOutcome::Completed(result) if !cancel.is_cancelled() => result,
        _ => {
            *state.lock() = TaskState::Cancelled;
            let _ = events.send(FilterEvent::Cancelled { generation });
            return;
        }
    };

    let mut tree = request.root.detached();
    for scored in &result.entries {
        tree.push(TreeNode::from_entry(&scored.entry));
    }

    *state.lock() = TaskState::Completed;
    let _ = events.send(FilterEvent::Finished {
        generation,
        tree: Arc::new(tree),
        matches: result.len(),
        best_score: result.best_score(),
    });
}

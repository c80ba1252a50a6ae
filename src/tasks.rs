//! Task registry - one in-flight task per kind, newest wins

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Download,
    Prepare,
}

/// Handle for a registered task
#[derive(Debug, Clone)]
pub struct TaskTicket {
    pub kind: TaskKind,
    id: u64,
    pub cancel_token: CancellationToken,
}

struct ActiveTask {
    id: u64,
    cancel_token: CancellationToken,
}

#[derive(Default)]
pub struct TaskRegistry {
    active: DashMap<TaskKind, ActiveTask>,
    next_id: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task of `kind`, cancelling the one it replaces
    pub fn begin(&self, kind: TaskKind) -> TaskTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel_token = CancellationToken::new();

        let previous = self.active.insert(
            kind,
            ActiveTask {
                id,
                cancel_token: cancel_token.clone(),
            },
        );
        if let Some(previous) = previous {
            log::info!("Cancelling superseded {:?} task", kind);
            previous.cancel_token.cancel();
        }

        TaskTicket { kind, id, cancel_token }
    }

    /// Remove the task if it is still the registered one
    pub fn finish(&self, ticket: &TaskTicket) {
        self.active.remove_if(&ticket.kind, |_, task| task.id == ticket.id);
    }

    pub fn is_active(&self, kind: TaskKind) -> bool {
        self.active.contains_key(&kind)
    }

    pub fn cancel(&self, kind: TaskKind) -> bool {
        self.active
            .remove(&kind)
            .map(|(_, task)| task.cancel_token.cancel())
            .is_some()
    }

    pub fn cancel_all(&self) {
        let kinds: Vec<TaskKind> = self.active.iter().map(|entry| *entry.key()).collect();
        for kind in kinds {
            self.cancel(kind);
        }
    }
}

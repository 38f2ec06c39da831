//! In-memory task collection for one user.
//!
//! Mutations are optimistic: the local collection changes first, then the
//! store is called. A failed store call re-synchronizes from `list` (or, if
//! that fails too, restores the pre-mutation snapshot) and reports
//! [`MutationOutcome::Reverted`].
//!
//! Change-feed events are merged idempotently so a local write and its echo
//! from the store never duplicate a task.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Task, TaskDraft, TaskPatch};
use crate::store::{ChangeEvent, ChangeFeed, ChangeKind, FeedError, TaskStore};
use crate::temporal::now_fixed_offset;

/// Result of an optimistic mutation.
#[derive(Debug)]
pub enum MutationOutcome<T> {
    /// The store accepted the write.
    Confirmed(T),
    /// The store rejected it; local state has been rolled back.
    Reverted { error: StoreError },
}

impl<T> MutationOutcome<T> {
    pub fn into_result(self) -> Result<T, StoreError> {
        match self {
            Self::Confirmed(value) => Ok(value),
            Self::Reverted { error } => Err(error),
        }
    }

    #[cfg(test)]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

#[derive(Debug, Clone)]
pub struct TaskBoard {
    user_id: String,
    tasks: Vec<Task>,
}

impl TaskBoard {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tasks: Vec::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Replace the collection with the store's authoritative list.
    pub async fn refresh<S: TaskStore>(&mut self, store: &S) -> Result<(), StoreError> {
        self.tasks = store.list(&self.user_id).await?;
        debug!(user = %self.user_id, count = self.tasks.len(), "board refreshed");
        Ok(())
    }

    /// Merge one change-feed event. Returns whether the collection changed.
    ///
    /// Inserts of known ids and updates/deletes of unknown ids are ignored.
    pub fn apply_change(&mut self, change: ChangeEvent) -> bool {
        let existing = self.position(change.task.id);
        match (change.kind, existing) {
            (ChangeKind::Insert, None) => {
                self.tasks.insert(0, change.task);
                true
            }
            (ChangeKind::Update, Some(pos)) => {
                self.tasks[pos] = change.task;
                true
            }
            (ChangeKind::Delete, Some(pos)) => {
                self.tasks.remove(pos);
                true
            }
            (ChangeKind::Insert, Some(_)) | (ChangeKind::Update | ChangeKind::Delete, None) => false,
        }
    }

    pub async fn create<S: TaskStore>(&mut self, store: &S, draft: TaskDraft) -> MutationOutcome<Task> {
        let snapshot = self.tasks.clone();
        let provisional_id = Uuid::new_v4();
        self.tasks
            .insert(0, draft.clone().into_task(provisional_id, now_fixed_offset()));

        match store.create(draft, &self.user_id).await {
            Ok(task) => {
                // The real record replaces the provisional one, unless an echo already landed.
                let echoed = self.position(task.id).is_some();
                match self.position(provisional_id) {
                    Some(pos) if !echoed => self.tasks[pos] = task.clone(),
                    Some(pos) => {
                        self.tasks.remove(pos);
                    }
                    None if !echoed => self.tasks.insert(0, task.clone()),
                    None => {}
                }
                MutationOutcome::Confirmed(task)
            }
            Err(error) => self.revert(store, snapshot, error).await,
        }
    }

    pub async fn update<S: TaskStore>(&mut self, store: &S, id: Uuid, patch: &TaskPatch) -> MutationOutcome<Task> {
        let Some(pos) = self.position(id) else {
            return MutationOutcome::Reverted {
                error: StoreError::NotFound(id),
            };
        };
        let snapshot = self.tasks.clone();
        patch.apply(&mut self.tasks[pos]);
        let updated = self.tasks[pos].clone();

        match store.update(id, patch).await {
            Ok(()) => MutationOutcome::Confirmed(updated),
            Err(error) => self.revert(store, snapshot, error).await,
        }
    }

    pub async fn delete<S: TaskStore>(&mut self, store: &S, id: Uuid) -> MutationOutcome<()> {
        let Some(pos) = self.position(id) else {
            return MutationOutcome::Reverted {
                error: StoreError::NotFound(id),
            };
        };
        let snapshot = self.tasks.clone();
        self.tasks.remove(pos);

        match store.delete(id).await {
            Ok(()) => MutationOutcome::Confirmed(()),
            Err(error) => self.revert(store, snapshot, error).await,
        }
    }

    /// Advance the status along todo -> in-progress -> done -> todo.
    pub async fn toggle_status<S: TaskStore>(&mut self, store: &S, id: Uuid) -> MutationOutcome<Task> {
        let Some(current) = self.get(id).map(|t| t.status) else {
            return MutationOutcome::Reverted {
                error: StoreError::NotFound(id),
            };
        };
        self.update(store, id, &TaskPatch::status(current.next())).await
    }

    async fn revert<S: TaskStore, T>(
        &mut self,
        store: &S,
        snapshot: Vec<Task>,
        error: StoreError,
    ) -> MutationOutcome<T> {
        error!(user = %self.user_id, error = %error, "store write failed, rolling back");
        if let Err(refresh_err) = self.refresh(store).await {
            warn!(error = %refresh_err, "re-sync failed, restoring local snapshot");
            self.tasks = snapshot;
        }
        MutationOutcome::Reverted { error }
    }
}

/// Merge store change notifications into the shared board until the feed closes.
pub async fn follow_changes<S: TaskStore>(board: Arc<Mutex<TaskBoard>>, store: Arc<S>, mut feed: ChangeFeed) {
    loop {
        match feed.next().await {
            Ok(change) => {
                let applied = board.lock().await.apply_change(change);
                debug!(applied, "change merged");
            }
            Err(FeedError::Lagged(missed)) => {
                warn!(missed, "change feed lagged, re-syncing");
                if let Err(err) = board.lock().await.refresh(store.as_ref()).await {
                    error!(error = %err, "re-sync after lag failed");
                }
            }
            Err(FeedError::Closed) => break,
        }
    }
}

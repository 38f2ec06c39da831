use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Db, Task, TaskDraft, TaskPatch, TaskRecord};
use crate::temporal::now_fixed_offset;

pub const DB_PATH: &str = "data/db.json";

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One change-feed notification, already scoped to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub task: Task,
}

#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub user_id: String,
    pub change: ChangeEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The receiver fell behind and missed `n` events; re-sync from `list`.
    #[error("change feed lagged by {0} events")]
    Lagged(u64),
    #[error("change feed closed")]
    Closed,
}

/// Change notifications for a single user.
pub struct ChangeFeed {
    user_id: String,
    receiver: broadcast::Receiver<StoreEvent>,
}

impl ChangeFeed {
    pub fn new(user_id: impl Into<String>, receiver: broadcast::Receiver<StoreEvent>) -> Self {
        Self {
            user_id: user_id.into(),
            receiver,
        }
    }

    pub async fn next(&mut self) -> Result<ChangeEvent, FeedError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.user_id == self.user_id => return Ok(event.change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => return Err(FeedError::Lagged(n)),
                Err(broadcast::error::RecvError::Closed) => return Err(FeedError::Closed),
            }
        }
    }
}

/// Authoritative task collection (CRUD + change feed).
#[allow(async_fn_in_trait)]
pub trait TaskStore: Send + Sync {
    /// Tasks owned by `user_id`, newest first.
    async fn list(&self, user_id: &str) -> Result<Vec<Task>, StoreError>;

    /// Persist a draft, assigning id and creation time.
    async fn create(&self, draft: TaskDraft, user_id: &str) -> Result<Task, StoreError>;

    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    fn subscribe(&self, user_id: &str) -> ChangeFeed;
}

/// Whole database in one JSON file, rewritten atomically on every change.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
    events: broadcast::Sender<StoreEvent>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            events,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn publish(&self, user_id: &str, kind: ChangeKind, task: &Task) {
        // No subscribers is fine.
        let _ = self.events.send(StoreEvent {
            user_id: user_id.to_string(),
            change: ChangeEvent {
                kind,
                task: task.clone(),
            },
        });
    }
}

impl TaskStore for JsonFileStore {
    async fn list(&self, user_id: &str) -> Result<Vec<Task>, StoreError> {
        let _guard = self.lock.lock().await;
        let db = load_db(&self.path)?;
        let mut tasks: Vec<Task> = db
            .tasks
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.task)
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn create(&self, draft: TaskDraft, user_id: &str) -> Result<Task, StoreError> {
        let _guard = self.lock.lock().await;
        let mut db = load_db(&self.path)?;

        let task = draft.into_task(Uuid::new_v4(), now_fixed_offset());
        db.tasks.push(TaskRecord {
            user_id: user_id.to_string(),
            task: task.clone(),
        });
        save_db(&self.path, &db)?;

        info!(task_id = %task.id, user = user_id, "task created");
        self.publish(user_id, ChangeKind::Insert, &task);
        Ok(task)
    }

    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut db = load_db(&self.path)?;

        let Some(record) = db.tasks.iter_mut().find(|r| r.task.id == id) else {
            return Err(StoreError::NotFound(id));
        };
        patch.apply(&mut record.task);
        let user_id = record.user_id.clone();
        let updated = record.task.clone();

        save_db(&self.path, &db)?;

        debug!(task_id = %id, "task updated");
        self.publish(&user_id, ChangeKind::Update, &updated);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut db = load_db(&self.path)?;

        let Some(pos) = db.tasks.iter().position(|r| r.task.id == id) else {
            return Err(StoreError::NotFound(id));
        };
        let removed = db.tasks.remove(pos);

        save_db(&self.path, &db)?;

        info!(task_id = %id, "task deleted");
        self.publish(&removed.user_id, ChangeKind::Delete, &removed.task);
        Ok(())
    }

    fn subscribe(&self, user_id: &str) -> ChangeFeed {
        ChangeFeed::new(user_id, self.events.subscribe())
    }
}

// A missing file is an empty database.
pub fn load_db(path: &Path) -> Result<Db, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Db::default()),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&text)?)
}

pub fn save_db(path: &Path, db: &Db) -> Result<(), StoreError> {
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let text = serde_json::to_string_pretty(db)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    fs::write(&tmp_path, text)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::{DEFAULT_CATEGORY, Priority, TaskStatus};

    fn store_in(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("nested").join("db.json"))
    }

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.into(),
            tags: vec!["home".into()],
            ..TaskDraft::fallback(title)
        }
    }

    fn ok<T, E: std::fmt::Display>(result: Result<T, E>, context: &str) -> T {
        result.unwrap_or_else(|err| panic!("{context}: {err}"))
    }

    #[tokio::test]
    async fn missing_file_lists_nothing() {
        let dir = ok(TempDir::new(), "tempdir");
        let store = store_in(&dir);
        assert!(ok(store.list("alice").await, "list").is_empty());
    }

    #[tokio::test]
    async fn create_resolves_placeholders_and_persists() {
        let dir = ok(TempDir::new(), "tempdir");
        let store = store_in(&dir);

        let task = ok(store.create(draft("Water plants"), "alice").await, "create");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.category, DEFAULT_CATEGORY);
        assert_eq!(task.status, TaskStatus::Todo);

        let reopened = JsonFileStore::new(store.path());
        let listed = ok(reopened.list("alice").await, "list");
        assert_eq!(listed, vec![task]);
    }

    #[tokio::test]
    async fn list_is_scoped_per_user_and_newest_first() {
        let dir = ok(TempDir::new(), "tempdir");
        let store = store_in(&dir);

        let first = ok(store.create(draft("first"), "alice").await, "create");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = ok(store.create(draft("second"), "alice").await, "create");
        ok(store.create(draft("not mine"), "bob").await, "create");

        let ids: Vec<Uuid> = ok(store.list("alice").await, "list").iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn update_and_delete_unknown_ids_are_not_found() {
        let dir = ok(TempDir::new(), "tempdir");
        let store = store_in(&dir);
        let missing = Uuid::new_v4();

        assert!(matches!(
            store.update(missing, &TaskPatch::default()).await,
            Err(StoreError::NotFound(id)) if id == missing
        ));
        assert!(matches!(store.delete(missing).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_applies_patch() {
        let dir = ok(TempDir::new(), "tempdir");
        let store = store_in(&dir);
        let task = ok(store.create(draft("Pay rent"), "alice").await, "create");

        let patch = TaskPatch {
            title: Some("Pay rent (Oct)".into()),
            ..TaskPatch::status(TaskStatus::Done)
        };
        ok(store.update(task.id, &patch).await, "update");

        let listed = ok(store.list("alice").await, "list");
        assert_eq!(listed[0].title, "Pay rent (Oct)");
        assert_eq!(listed[0].status, TaskStatus::Done);
        assert_eq!(listed[0].created_at, task.created_at);
    }

    #[tokio::test]
    async fn feed_delivers_only_subscribed_user_events() {
        let dir = ok(TempDir::new(), "tempdir");
        let store = store_in(&dir);
        let mut feed = store.subscribe("alice");

        ok(store.create(draft("bob's"), "bob").await, "create");
        let task = ok(store.create(draft("alice's"), "alice").await, "create");
        ok(store.update(task.id, &TaskPatch::status(TaskStatus::InProgress)).await, "update");
        ok(store.delete(task.id).await, "delete");

        let inserted = ok(feed.next().await, "insert event");
        assert_eq!(inserted.kind, ChangeKind::Insert);
        assert_eq!(inserted.task.id, task.id);

        let updated = ok(feed.next().await, "update event");
        assert_eq!(updated.kind, ChangeKind::Update);
        assert_eq!(updated.task.status, TaskStatus::InProgress);

        let deleted = ok(feed.next().await, "delete event");
        assert_eq!(deleted.kind, ChangeKind::Delete);
        assert!(ok(store.list("alice").await, "list").is_empty());
    }

    #[tokio::test]
    async fn slow_feed_reports_lag() {
        let (tx, rx) = broadcast::channel(1);
        let mut feed = ChangeFeed::new("alice", rx);
        let task = draft("x").into_task(Uuid::new_v4(), now_fixed_offset());
        for _ in 0..3 {
            let _ = tx.send(StoreEvent {
                user_id: "alice".into(),
                change: ChangeEvent {
                    kind: ChangeKind::Update,
                    task: task.clone(),
                },
            });
        }
        assert_eq!(feed.next().await.err(), Some(FeedError::Lagged(2)));
        drop(tx);
        assert!(feed.next().await.is_ok());
        assert_eq!(feed.next().await.err(), Some(FeedError::Closed));
    }
}

//! Task persistence on top of a [`KeyValueStore`].

use std::sync::Arc;

use super::{load_json, save_json, KeyValueStore};
use crate::error::{CoreError, StorageError};
use crate::task::Task;

/// Store key of the task list.
pub const TASKS_KEY: &str = "tasks";

/// All tasks, stored as one JSON list in creation order.
#[derive(Clone)]
pub struct TaskStore {
    store: Arc<dyn KeyValueStore>,
}

impl TaskStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load_all(&self) -> Result<Vec<Task>, StorageError> {
        Ok(load_json(self.store.as_ref(), TASKS_KEY)?.unwrap_or_default())
    }

    pub fn save_all(&self, tasks: &[Task]) -> Result<(), StorageError> {
        save_json(self.store.as_ref(), TASKS_KEY, tasks)
    }

    /// Find a task by full id or unique id prefix.
    pub fn get(&self, id: &str) -> Result<Task, CoreError> {
        let tasks = self.load_all()?;
        let idx = resolve_index(&tasks, id)?;
        Ok(tasks[idx].clone())
    }

    /// Insert or replace by id.
    pub fn upsert(&self, task: &Task) -> Result<(), StorageError> {
        let mut tasks = self.load_all()?;
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        self.save_all(&tasks)
    }

    /// Replace every task whose id matches one of `updated`.
    pub fn upsert_many(&self, updated: &[Task]) -> Result<(), StorageError> {
        let mut tasks = self.load_all()?;
        for task in updated {
            match tasks.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task.clone(),
                None => tasks.push(task.clone()),
            }
        }
        self.save_all(&tasks)
    }
}

/// Position of the task matching `id` exactly or by unique prefix.
pub fn resolve_index(tasks: &[Task], id: &str) -> Result<usize, CoreError> {
    if let Some(idx) = tasks.iter().position(|t| t.id == id) {
        return Ok(idx);
    }
    let mut matches = tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| !id.is_empty() && t.id.starts_with(id));
    match (matches.next(), matches.next()) {
        (Some((idx, _)), None) => Ok(idx),
        _ => Err(CoreError::TaskNotFound(id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn upsert_then_get_by_prefix() {
        let store = TaskStore::new(Arc::new(MemoryStore::new()));
        let mut task = Task::new("draft outline");
        store.upsert(&task).unwrap();
        task.title = "draft full outline".into();
        store.upsert(&task).unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 1);
        let found = store.get(&task.id[..8]).unwrap();
        assert_eq!(found.title, "draft full outline");
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = TaskStore::new(Arc::new(MemoryStore::new()));
        assert!(matches!(store.get("nope"), Err(CoreError::TaskNotFound(_))));
    }
}

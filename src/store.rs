use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::models::{
    FilterPatch, IdGenerator, NewTaskForm, SubTask, Task, TaskFilter, TaskPatch, TaskSort,
};

/// Authoritative task collection plus the active filter and sort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    #[serde(default, rename = "todos")]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub filter: TaskFilter,
    #[serde(default)]
    pub sort: TaskSort,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskAction {
    Add(NewTaskForm),
    Toggle(i64),
    Delete(i64),
    DeleteAll,
    Archive(i64),
    Restore(i64),
    Edit { id: i64, patch: TaskPatch },
    /// Replace the stored record with the given one, matched by id.
    Update(Task),
    AddSubTask { task_id: i64, text: String },
    ToggleSubTask { task_id: i64, sub_task_id: i64 },
    SetFilter(FilterPatch),
    SetSort(TaskSort),
    Reorder(Vec<Task>),
}

impl TaskAction {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskAction::Add(_) => "ADD_TODO",
            TaskAction::Toggle(_) => "TOGGLE_TODO",
            TaskAction::Delete(_) => "DELETE_TODO",
            TaskAction::DeleteAll => "DELETE_ALL_TODOS",
            TaskAction::Archive(_) => "ARCHIVE_TODO",
            TaskAction::Restore(_) => "RESTORE_FROM_ARCHIVE",
            TaskAction::Edit { .. } => "EDIT_TODO",
            TaskAction::Update(_) => "UPDATE_TODO",
            TaskAction::AddSubTask { .. } => "ADD_SUBTASK",
            TaskAction::ToggleSubTask { .. } => "TOGGLE_SUBTASK",
            TaskAction::SetFilter(_) => "SET_FILTER",
            TaskAction::SetSort(_) => "SET_SORT",
            TaskAction::Reorder(_) => "REORDER_TODOS",
        }
    }
}

impl TaskState {
    pub fn find(&self, id: i64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Largest id in use by any task or subtask, for seeding an [`IdGenerator`].
    pub fn max_id(&self) -> i64 {
        self.tasks
            .iter()
            .flat_map(|t| std::iter::once(t.id).chain(t.sub_tasks.iter().map(|s| s.id)))
            .max()
            .unwrap_or(0)
    }

    /// Compute the next state. Never fails; actions naming an unknown id leave
    /// the collection as it was.
    pub fn reduce(
        &self,
        action: TaskAction,
        now: DateTime<Utc>,
        ids: &mut IdGenerator,
    ) -> TaskState {
        debug!(action = action.kind(), "reducing task action");
        let mut next = self.clone();

        match action {
            TaskAction::Add(form) => {
                let id = self.fresh_id(now, ids);
                if let Some(task) = Task::from_form(form, id, now) {
                    next.tasks.insert(0, task);
                }
            }
            TaskAction::Toggle(id) => {
                next.with_task(id, |task| {
                    task.completed = !task.completed;
                    task.completed_at = task.completed.then_some(now);
                });
            }
            TaskAction::Delete(id) => {
                next.tasks.retain(|t| t.id != id);
            }
            TaskAction::DeleteAll => {
                next.tasks.clear();
            }
            TaskAction::Archive(id) => {
                next.with_task(id, |task| {
                    task.archived = true;
                    task.archived_at = Some(now);
                });
            }
            TaskAction::Restore(id) => {
                next.with_task(id, |task| {
                    task.archived = false;
                    task.archived_at = None;
                });
            }
            TaskAction::Edit { id, patch } => {
                next.with_task(id, |task| task.apply_patch(patch));
            }
            TaskAction::Update(updated) => {
                next.with_task(updated.id, |task| *task = updated);
            }
            TaskAction::AddSubTask { task_id, text } => {
                if next.find(task_id).is_some() {
                    let id = self.fresh_id(now, ids);
                    next.with_task(task_id, |task| {
                        task.sub_tasks.push(SubTask {
                            id,
                            text,
                            completed: false,
                        });
                    });
                }
            }
            TaskAction::ToggleSubTask { task_id, sub_task_id } => {
                next.with_task(task_id, |task| {
                    if let Some(sub) = task.sub_tasks.iter_mut().find(|s| s.id == sub_task_id) {
                        sub.completed = !sub.completed;
                    }
                });
            }
            TaskAction::SetFilter(patch) => {
                next.filter.merge(patch);
            }
            TaskAction::SetSort(sort) => {
                next.sort = sort;
            }
            TaskAction::Reorder(tasks) => {
                next.tasks = tasks;
            }
        }

        next
    }

    /// Generated id, or the smallest positive id not in use once the
    /// generator is exhausted.
    fn fresh_id(&self, now: DateTime<Utc>, ids: &mut IdGenerator) -> i64 {
        ids.next(now).unwrap_or_else(|| {
            let used: HashSet<i64> = self
                .tasks
                .iter()
                .flat_map(|t| std::iter::once(t.id).chain(t.sub_tasks.iter().map(|s| s.id)))
                .collect();
            let id = (1..).find(|id| !used.contains(id)).unwrap_or_default();
            warn!(id, "id sequence exhausted, reusing a free id");
            id
        })
    }

    fn with_task(&mut self, id: i64, edit: impl FnOnce(&mut Task)) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            edit(task);
        }
    }
}

/// Owns the current task state and stamps actions with time and fresh ids.
#[derive(Debug, Clone)]
pub struct TaskStore {
    state: TaskState,
    ids: IdGenerator,
}

impl TaskStore {
    pub fn new(state: TaskState) -> Self {
        let ids = IdGenerator::starting_after(state.max_id());
        Self { state, ids }
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn dispatch(&mut self, action: TaskAction) -> &TaskState {
        self.dispatch_at(action, Utc::now())
    }

    pub fn dispatch_at(&mut self, action: TaskAction, now: DateTime<Utc>) -> &TaskState {
        self.state = self.state.reduce(action, now, &mut self.ids);
        &self.state
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new(TaskState::default())
    }
}

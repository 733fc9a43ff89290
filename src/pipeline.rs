use std::cmp::Ordering;

use crate::models::{KNOWN_CATEGORIES, SortDirection, SortField, Task, TaskFilter, TaskSort};

/// Missing due/completion dates sort after every real date.
const MISSING_DATE: i64 = i64::MAX;

/// Narrow `tasks` by `filter` and order the survivors by `sort`.
///
/// The sort is stable: tasks whose keys compare equal keep their relative
/// order from the input, in both directions.
pub fn apply_filters<'a>(tasks: &'a [Task], filter: &TaskFilter, sort: &TaskSort) -> Vec<&'a Task> {
    let search = filter.search.as_str();

    let mut visible: Vec<&Task> = tasks
        .iter()
        .filter(|task| filter.show_archived || !task.archived)
        .filter(|task| filter.show_completed || !task.completed)
        .filter(|task| filter.priority.matches(task.priority))
        .filter(|task| filter.category.matches(task.category.as_deref()))
        .filter(|task| search.is_empty() || task.matches_search(search))
        .collect();

    visible.sort_by(|a, b| {
        let ordering = compare(a, b, sort.field);
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });

    visible
}

fn compare(a: &Task, b: &Task, field: SortField) -> Ordering {
    match field {
        SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        SortField::DueDate => due_key(a).cmp(&due_key(b)),
        SortField::Priority => a.priority.rank().cmp(&b.priority.rank()),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::CompletedAt => completed_key(a).cmp(&completed_key(b)),
    }
}

fn due_key(task: &Task) -> i64 {
    task.due_date
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(MISSING_DATE)
}

fn completed_key(task: &Task) -> i64 {
    task.completed_at
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(MISSING_DATE)
}

/// Suggested categories followed by any other category found on tasks, in
/// first-seen order.
pub fn available_categories(tasks: &[Task]) -> Vec<String> {
    let mut categories: Vec<String> = KNOWN_CATEGORIES.iter().map(|c| c.to_string()).collect();
    for category in tasks.iter().filter_map(|t| t.category.as_deref()) {
        if !category.trim().is_empty() && !categories.iter().any(|c| c == category) {
            categories.push(category.to_string());
        }
    }
    categories
}

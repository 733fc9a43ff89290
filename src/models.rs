use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Categories offered as suggestions by input forms. Tasks may carry any other
/// category text as well.
pub const KNOWN_CATEGORIES: [&str; 6] = [
    "General",
    "Work",
    "Personal",
    "Shopping",
    "Health",
    "Education",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Ordinal used when sorting by priority.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("Unknown priority: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: i64,
    pub text: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub sub_tasks: Vec<SubTask>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: i64, title: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title,
            description: None,
            completed: false,
            created_at,
            updated_at: None,
            completed_at: None,
            due_date: None,
            priority: Priority::default(),
            tags: Vec::new(),
            category: None,
            sub_tasks: Vec::new(),
            archived: false,
            archived_at: None,
        }
    }

    /// Build a task from a submitted form. Returns `None` when the title is blank.
    pub fn from_form(form: NewTaskForm, id: i64, created_at: DateTime<Utc>) -> Option<Self> {
        let title = form.title.trim();
        if title.is_empty() {
            return None;
        }
        let mut task = Task::new(id, title.to_string(), created_at);
        task.description = form.description.filter(|d| !d.trim().is_empty());
        task.due_date = form.due_date;
        task.priority = form.priority;
        task.category = form.category.filter(|c| !c.trim().is_empty());
        task.tags = form.tags.unwrap_or_default();
        Some(task)
    }

    /// Both lifecycle timestamps agree with their flags.
    pub fn is_consistent(&self) -> bool {
        self.completed == self.completed_at.is_some() && self.archived == self.archived_at.is_some()
    }

    /// Case-insensitive substring match on title, description, category or any tag.
    pub fn matches_search(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        let contains = |text: &str| text.to_lowercase().contains(&needle);

        contains(&self.title)
            || self.description.as_deref().is_some_and(contains)
            || self.category.as_deref().is_some_and(contains)
            || self.tags.iter().any(|tag| contains(tag))
    }

    /// Apply an edit. Lifecycle flags are not editable here; use the toggle and
    /// archive actions for those.
    pub fn apply_patch(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            if !title.trim().is_empty() {
                self.title = title;
            }
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = Some(updated_at);
        }
    }
}

/// Input of the add action. Only the title is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskForm {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl NewTaskForm {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial edit of a task. `None` leaves a field untouched; for optional
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub priority: Option<Priority>,
    pub category: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityFilter {
    #[default]
    All,
    Low,
    Medium,
    High,
}

impl PriorityFilter {
    pub fn matches(self, priority: Priority) -> bool {
        match self {
            PriorityFilter::All => true,
            PriorityFilter::Low => priority == Priority::Low,
            PriorityFilter::Medium => priority == Priority::Medium,
            PriorityFilter::High => priority == Priority::High,
        }
    }
}

impl From<Priority> for PriorityFilter {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Low => PriorityFilter::Low,
            Priority::Medium => PriorityFilter::Medium,
            Priority::High => PriorityFilter::High,
        }
    }
}

impl FromStr for PriorityFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(PriorityFilter::All)
        } else {
            s.parse::<Priority>().map(PriorityFilter::from)
        }
    }
}

/// Category selector. Stored as a plain string where `"all"` means no filter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(String),
}

impl CategoryFilter {
    pub fn matches(&self, category: Option<&str>) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => category == Some(wanted.as_str()),
        }
    }
}

impl From<String> for CategoryFilter {
    fn from(value: String) -> Self {
        if value == "all" {
            CategoryFilter::All
        } else {
            CategoryFilter::Only(value)
        }
    }
}

impl From<CategoryFilter> for String {
    fn from(value: CategoryFilter) -> Self {
        match value {
            CategoryFilter::All => "all".to_string(),
            CategoryFilter::Only(category) => category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub priority: PriorityFilter,
    #[serde(default)]
    pub category: CategoryFilter,
    #[serde(default = "default_true")]
    pub show_completed: bool,
    #[serde(default)]
    pub show_archived: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            search: String::new(),
            priority: PriorityFilter::All,
            category: CategoryFilter::All,
            show_completed: true,
            show_archived: false,
        }
    }
}

impl TaskFilter {
    pub fn merge(&mut self, patch: FilterPatch) {
        if let Some(search) = patch.search {
            self.search = search;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(show_completed) = patch.show_completed {
            self.show_completed = show_completed;
        }
        if let Some(show_archived) = patch.show_archived {
            self.show_archived = show_archived;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPatch {
    pub search: Option<String>,
    pub priority: Option<PriorityFilter>,
    pub category: Option<CategoryFilter>,
    pub show_completed: Option<bool>,
    pub show_archived: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Title,
    DueDate,
    Priority,
    CreatedAt,
    CompletedAt,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "title" => Ok(SortField::Title),
            "duedate" | "due" => Ok(SortField::DueDate),
            "priority" => Ok(SortField::Priority),
            "createdat" | "created" => Ok(SortField::CreatedAt),
            "completedat" | "completed" => Ok(SortField::CompletedAt),
            other => Err(format!("Unknown sort field: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            other => Err(format!("Unknown sort direction: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for TaskSort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

/// Hands out collision-free ids derived from the creation timestamp.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    last: i64,
}

impl IdGenerator {
    /// Start after `floor` so ids already in use are never reissued.
    pub fn starting_after(floor: i64) -> Self {
        Self { last: floor }
    }

    /// Next id, or `None` once the sequence has reached `i64::MAX`.
    pub fn next(&mut self, now: DateTime<Utc>) -> Option<i64> {
        let floor = self.last.checked_add(1)?;
        let id = now.timestamp_millis().max(floor);
        self.last = id;
        Some(id)
    }
}

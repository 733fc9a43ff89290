use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;
use thiserror::Error;

use crate::app::App;
use crate::models::{
    CategoryFilter, FilterPatch, NewTaskForm, Priority, PriorityFilter, SortDirection, SortField,
    Task, TaskPatch, TaskSort,
};
use crate::pomodoro::{PomodoroAction, PomodoroMode, SettingsPatch};
use crate::sound::SoundPlayer;
use crate::storage::{KeyValueStore, StorageError};
use crate::store::TaskAction;
use crate::utils::{due_label, is_overdue, parse_date, parse_tags, today};
use crate::widget::{FocusWidget, WidgetAction, WidgetEvent};

#[derive(Parser)]
#[command(name = "tasktimer")]
#[command(about = "Tasks with a built-in focus timer")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    /// Keep everything in memory; nothing is written to disk
    #[arg(long)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new task
    Add {
        /// Task title
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
        /// low, medium or high
        #[arg(long, default_value = "medium")]
        priority: Priority,
        #[arg(long)]
        category: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// List tasks through the saved filter and sort (default if no subcommand).
    /// Any option given here updates the saved filter or sort first.
    List {
        #[arg(long)]
        search: Option<String>,
        /// all, low, medium or high
        #[arg(long)]
        priority: Option<PriorityFilter>,
        /// Category name, or "all"
        #[arg(long)]
        category: Option<String>,
        /// Show completed tasks (true/false)
        #[arg(long)]
        completed: Option<bool>,
        /// Show archived tasks (true/false)
        #[arg(long)]
        archived: Option<bool>,
        /// title, dueDate, priority, createdAt or completedAt
        #[arg(long)]
        sort: Option<SortField>,
        /// asc or desc
        #[arg(long)]
        direction: Option<SortDirection>,
    },
    /// Flip a task between open and completed
    Toggle { id: i64 },
    /// Move a task to the archive
    Archive { id: i64 },
    /// Bring a task back from the archive
    Restore { id: i64 },
    /// Change fields of a task
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Due date (YYYY-MM-DD), or "none" to clear it
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        priority: Option<Priority>,
        /// Category name, or "none" to clear it
        #[arg(long)]
        category: Option<String>,
        /// Comma-separated tags, replacing the current ones
        #[arg(long)]
        tags: Option<String>,
    },
    /// Delete a task
    Delete { id: i64 },
    /// Delete every task
    Clear,
    /// Manage subtasks
    #[command(subcommand)]
    Subtask(SubtaskCommand),
    /// List the categories available for filtering
    Categories,
    /// Per-task focus timer
    #[command(subcommand)]
    Timer(TimerCommand),
    /// Standalone focus stopwatch, driven from the keyboard
    Widget,
    /// Show the completed focus period count
    Pomodoros {
        /// Clear the count
        #[arg(long)]
        reset: bool,
    },
    /// Turn sound cues on or off
    Sound,
    /// Switch between the dark and light theme
    Theme,
}

#[derive(Subcommand)]
pub enum SubtaskCommand {
    /// Add a subtask to a task
    Add { task_id: i64, text: String },
    /// Flip a subtask between open and completed
    Toggle { task_id: i64, subtask_id: i64 },
}

#[derive(Subcommand)]
pub enum TimerCommand {
    /// Show the timer
    Status,
    /// Focus on a task; resets the timer to a fresh focus period
    Select { id: i64 },
    /// Detach the timer from its task and stop it
    Close,
    /// Restart the current period
    Reset,
    /// Switch to focus, short or long
    Mode { mode: PomodoroMode },
    /// Change period lengths (minutes)
    Settings {
        #[arg(long)]
        focus: Option<u32>,
        #[arg(long)]
        short_break: Option<u32>,
        #[arg(long)]
        long_break: Option<u32>,
        /// Focus periods per long break
        #[arg(long)]
        interval: Option<u32>,
    },
    /// Count the current period down in the foreground
    Run,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("No task with ID {0}")]
    UnknownTask(i64),
    #[error("No subtask with ID {1} on task {0}")]
    UnknownSubTask(i64, i64),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

fn parse_due(raw: &str) -> Result<NaiveDate, CliError> {
    parse_date(raw)
        .map_err(|e| CliError::DateParseError(format!("Invalid date format '{}': {}", raw, e)))
}

fn require_task<S: KeyValueStore, P: SoundPlayer>(
    app: &App<S, P>,
    id: i64,
) -> Result<(), CliError> {
    app.find(id).map(|_| ()).ok_or(CliError::UnknownTask(id))
}

/// Handle the add command
pub fn handle_add<S: KeyValueStore, P: SoundPlayer>(
    app: &mut App<S, P>,
    mut form: NewTaskForm,
    due: Option<String>,
    tags: Option<String>,
) -> Result<(), CliError> {
    if form.title.trim().is_empty() {
        return Err(CliError::InvalidInput("Task title cannot be empty".to_string()));
    }
    form.due_date = due.as_deref().map(parse_due).transpose()?;
    form.tags = tags.as_deref().map(parse_tags);

    let state = app.dispatch(TaskAction::Add(form));
    if let Some(task) = state.tasks.first() {
        println!("Task created successfully (ID: {})", task.id);
    }
    Ok(())
}

/// Handle the list command
#[allow(clippy::too_many_arguments)]
pub fn handle_list<S: KeyValueStore, P: SoundPlayer>(
    app: &mut App<S, P>,
    search: Option<String>,
    priority: Option<PriorityFilter>,
    category: Option<String>,
    completed: Option<bool>,
    archived: Option<bool>,
    sort: Option<SortField>,
    direction: Option<SortDirection>,
) -> Result<(), CliError> {
    let patch = FilterPatch {
        search,
        priority,
        category: category.map(CategoryFilter::from),
        show_completed: completed,
        show_archived: archived,
    };
    if patch != FilterPatch::default() {
        app.dispatch(TaskAction::SetFilter(patch));
    }
    if sort.is_some() || direction.is_some() {
        let current = app.state().sort;
        app.dispatch(TaskAction::SetSort(TaskSort {
            field: sort.unwrap_or(current.field),
            direction: direction.unwrap_or(current.direction),
        }));
    }

    let visible = app.visible();
    if visible.is_empty() {
        println!("No tasks to show");
        return Ok(());
    }
    let today = today();
    for task in visible {
        println!("{}", format_task(task, today));
        for sub in &task.sub_tasks {
            let mark = if sub.completed { "x" } else { " " };
            println!("      [{}] {} {}", mark, sub.id, sub.text);
        }
    }
    Ok(())
}

/// One-line summary of a task for listings.
pub fn format_task(task: &Task, today: NaiveDate) -> String {
    let mark = if task.completed { "x" } else { " " };
    let mut line = format!("[{}] {}  {}", mark, task.id, task.title);

    let mut details = vec![task.priority.to_string()];
    if let Some(category) = &task.category {
        details.push(category.clone());
    }
    if let Some(due) = task.due_date {
        let overdue = !task.completed && is_overdue(due, today);
        details.push(format!(
            "due {}{}",
            due_label(due, today),
            if overdue { " (overdue)" } else { "" }
        ));
    }
    if task.archived {
        details.push("archived".to_string());
    }
    line.push_str(&format!("  ({})", details.join(", ")));

    if !task.tags.is_empty() {
        let tags: Vec<String> = task.tags.iter().map(|t| format!("#{}", t)).collect();
        line.push_str(&format!("  {}", tags.join(" ")));
    }
    line
}

/// Handle toggle, archive, restore and delete, which all name one task
pub fn handle_task_action<S: KeyValueStore, P: SoundPlayer>(
    app: &mut App<S, P>,
    action: TaskAction,
) -> Result<(), CliError> {
    let id = match &action {
        TaskAction::Toggle(id)
        | TaskAction::Archive(id)
        | TaskAction::Restore(id)
        | TaskAction::Delete(id) => *id,
        other => {
            return Err(CliError::InvalidInput(format!(
                "{} does not name a single task",
                other.kind()
            )));
        }
    };
    require_task(app, id)?;

    let verb = match action {
        TaskAction::Toggle(_) => "toggled",
        TaskAction::Archive(_) => "archived",
        TaskAction::Restore(_) => "restored",
        _ => "deleted",
    };
    app.dispatch(action);
    match app.find(id) {
        Some(task) if verb == "toggled" => {
            let status = if task.completed { "completed" } else { "open" };
            println!("Task {} is now {}", id, status);
        }
        _ => println!("Task {} {}", id, verb),
    }
    Ok(())
}

/// Handle the edit command
#[allow(clippy::too_many_arguments)]
pub fn handle_edit<S: KeyValueStore, P: SoundPlayer>(
    app: &mut App<S, P>,
    id: i64,
    title: Option<String>,
    description: Option<String>,
    due: Option<String>,
    priority: Option<Priority>,
    category: Option<String>,
    tags: Option<String>,
) -> Result<(), CliError> {
    require_task(app, id)?;
    if title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(CliError::InvalidInput("Task title cannot be empty".to_string()));
    }

    let due_date = match due.as_deref() {
        None => None,
        Some("none") => Some(None),
        Some(raw) => Some(Some(parse_due(raw)?)),
    };
    let patch = TaskPatch {
        title,
        description: description.map(|d| Some(d).filter(|d| !d.trim().is_empty())),
        due_date,
        priority,
        category: category.map(|c| Some(c).filter(|c| c != "none")),
        tags: tags.as_deref().map(parse_tags),
        updated_at: None,
    };
    if patch.is_empty() {
        return Err(CliError::InvalidInput("Nothing to change".to_string()));
    }

    app.dispatch(TaskAction::Edit {
        id,
        patch: TaskPatch {
            updated_at: Some(chrono::Utc::now()),
            ..patch
        },
    });
    println!("Task {} updated", id);
    Ok(())
}

/// Handle the clear command
pub fn handle_clear<S: KeyValueStore, P: SoundPlayer>(
    app: &mut App<S, P>,
) -> Result<(), CliError> {
    let count = app.state().tasks.len();
    app.dispatch(TaskAction::DeleteAll);
    println!("Deleted {} task(s)", count);
    Ok(())
}

/// Handle the subtask commands
pub fn handle_subtask<S: KeyValueStore, P: SoundPlayer>(
    app: &mut App<S, P>,
    command: SubtaskCommand,
) -> Result<(), CliError> {
    match command {
        SubtaskCommand::Add { task_id, text } => {
            require_task(app, task_id)?;
            if text.trim().is_empty() {
                return Err(CliError::InvalidInput("Subtask text cannot be empty".to_string()));
            }
            let state = app.dispatch(TaskAction::AddSubTask { task_id, text });
            let sub_id = state
                .find(task_id)
                .and_then(|t| t.sub_tasks.last())
                .map(|s| s.id)
                .ok_or(CliError::UnknownTask(task_id))?;
            println!("Subtask created successfully (ID: {})", sub_id);
        }
        SubtaskCommand::Toggle { task_id, subtask_id } => {
            let exists = app
                .find(task_id)
                .ok_or(CliError::UnknownTask(task_id))?
                .sub_tasks
                .iter()
                .any(|s| s.id == subtask_id);
            if !exists {
                return Err(CliError::UnknownSubTask(task_id, subtask_id));
            }
            app.dispatch(TaskAction::ToggleSubTask {
                task_id,
                sub_task_id: subtask_id,
            });
            println!("Subtask {} toggled", subtask_id);
        }
    }
    Ok(())
}

/// Handle the categories command
pub fn handle_categories<S: KeyValueStore, P: SoundPlayer>(
    app: &App<S, P>,
) -> Result<(), CliError> {
    for category in app.categories() {
        println!("{}", category);
    }
    Ok(())
}

/// Handle the timer commands
pub fn handle_timer<S: KeyValueStore, P: SoundPlayer>(
    app: &mut App<S, P>,
    command: TimerCommand,
) -> Result<(), CliError> {
    match command {
        TimerCommand::Status => {}
        TimerCommand::Select { id } => {
            require_task(app, id)?;
            app.dispatch_timer(PomodoroAction::SelectTodo(id));
        }
        TimerCommand::Close => {
            app.dispatch_timer(PomodoroAction::ClosePomodoro);
        }
        TimerCommand::Reset => {
            app.dispatch_timer(PomodoroAction::Reset);
        }
        TimerCommand::Mode { mode } => {
            app.dispatch_timer(PomodoroAction::SwitchMode(mode));
        }
        TimerCommand::Settings {
            focus,
            short_break,
            long_break,
            interval,
        } => {
            let patch = SettingsPatch {
                focus,
                short_break,
                long_break,
                long_break_interval: interval,
            };
            if patch == SettingsPatch::default() {
                return Err(CliError::InvalidInput("Nothing to change".to_string()));
            }
            app.dispatch_timer(PomodoroAction::UpdateSettings(patch));
        }
        TimerCommand::Run => {
            let mut stdout = io::stdout();
            let finished = app.run_timer(|state| {
                let _ = write!(stdout, "\r{}  {}   ", state.mode, state.display());
                let _ = stdout.flush();
            });
            println!();
            println!("Period over. Up next: {} ({})", finished.mode, finished.display());
            return Ok(());
        }
    }
    print_timer(app);
    Ok(())
}

fn print_timer<S: KeyValueStore, P: SoundPlayer>(app: &App<S, P>) {
    let timer = app.timer();
    let status = if timer.is_active { "running" } else { "paused" };
    println!("{}  {}  ({})", timer.mode, timer.display(), status);
    match timer.selected_todo_id.and_then(|id| app.find(id)) {
        Some(task) => println!("Task: {} {}", task.id, task.title),
        None => println!("Task: none"),
    }
    println!(
        "Cycles: {}  |  focus {}m, short {}m, long {}m every {}",
        timer.cycles,
        timer.settings.focus,
        timer.settings.short_break,
        timer.settings.long_break,
        timer.settings.long_break_interval
    );
}

/// Map one line of keyboard input to a widget action. `None` means quit.
pub fn widget_action(line: &str) -> Option<Option<WidgetAction>> {
    match line.trim().to_lowercase().as_str() {
        "" | "a" => Some(Some(WidgetAction::Acknowledge)),
        "p" => Some(Some(WidgetAction::Toggle)),
        "r" => Some(Some(WidgetAction::Reset)),
        "f" => Some(Some(WidgetAction::ChangeMode(PomodoroMode::Focus))),
        "s" => Some(Some(WidgetAction::ChangeMode(PomodoroMode::ShortBreak))),
        "l" => Some(Some(WidgetAction::ChangeMode(PomodoroMode::LongBreak))),
        "c" => Some(Some(WidgetAction::ResetCount)),
        "q" => None,
        _ => Some(None),
    }
}

fn render_widget(widget: &FocusWidget, event: Option<WidgetEvent>) {
    if let Some(WidgetEvent::Completed { finished, next }) = event {
        println!();
        println!("{} finished. Press Enter to move on to {}.", finished, next);
        return;
    }
    let status = if widget.timer_completed {
        "done"
    } else if widget.is_running {
        "running"
    } else {
        "paused"
    };
    print!(
        "\r{}  {}  {:>5.1}%  {}  focus #{}   ",
        widget.mode,
        widget.display(),
        widget.progress_percent(),
        status,
        widget.focus_count
    );
    let _ = io::stdout().flush();
}

/// Handle the widget command
pub fn handle_widget<S: KeyValueStore, P: SoundPlayer>(
    app: &mut App<S, P>,
) -> Result<(), CliError> {
    println!("p: start/pause  r: reset  f/s/l: mode  c: clear count  Enter: acknowledge  q: quit");

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match widget_action(&line) {
                Some(Some(action)) => {
                    if tx.send(action).is_err() {
                        break;
                    }
                }
                Some(None) => {}
                None => break,
            }
        }
    });

    let widget = app.run_widget(&rx, render_widget);
    println!();
    println!("Completed focus periods: {}", widget.focus_count);
    Ok(())
}

/// Handle the pomodoros command
pub fn handle_pomodoros<S: KeyValueStore, P: SoundPlayer>(
    app: &mut App<S, P>,
    reset: bool,
) -> Result<(), CliError> {
    if reset {
        app.clear_completed_pomodoros();
    }
    println!("Completed focus periods: {}", app.completed_pomodoros());
    Ok(())
}

/// Handle the sound command
pub fn handle_sound<S: KeyValueStore, P: SoundPlayer>(
    app: &mut App<S, P>,
) -> Result<(), CliError> {
    let enabled = app.toggle_sound();
    println!("Sound {}", if enabled { "on" } else { "off" });
    Ok(())
}

/// Handle the theme command
pub fn handle_theme<S: KeyValueStore, P: SoundPlayer>(
    app: &mut App<S, P>,
) -> Result<(), CliError> {
    let theme = app.toggle_theme();
    println!("Theme set to {}", theme);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sound::testing::RecordingPlayer;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn app() -> App<MemoryStore, RecordingPlayer> {
        App::new(Config::default(), MemoryStore::new(), RecordingPlayer::default())
    }

    #[test]
    fn cli_parses_nested_commands() {
        let cli = Cli::try_parse_from(["tasktimer", "--ephemeral", "timer", "mode", "short-break"])
            .unwrap();
        assert!(cli.ephemeral);
        assert!(matches!(
            cli.command,
            Some(Commands::Timer(TimerCommand::Mode {
                mode: PomodoroMode::ShortBreak
            }))
        ));

        let cli = Cli::try_parse_from([
            "tasktimer", "list", "--sort", "dueDate", "--direction", "asc",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::List {
                sort: Some(SortField::DueDate),
                direction: Some(SortDirection::Asc),
                ..
            })
        ));
    }

    #[test]
    fn add_rejects_bad_dates_and_blank_titles() {
        let mut app = app();
        let err = handle_add(&mut app, NewTaskForm::new("x"), Some("31/12/2025".into()), None);
        assert!(matches!(err, Err(CliError::DateParseError(_))));
        let err = handle_add(&mut app, NewTaskForm::new("  "), None, None);
        assert!(matches!(err, Err(CliError::InvalidInput(_))));
        assert!(app.state().tasks.is_empty());
    }

    #[test]
    fn add_then_edit() {
        let mut app = app();
        handle_add(
            &mut app,
            NewTaskForm::new("Write report"),
            Some("2025-06-01".into()),
            Some("work, q2".into()),
        )
        .unwrap();
        let id = app.state().tasks[0].id;
        assert_eq!(app.state().tasks[0].tags, ["work", "q2"]);

        handle_edit(&mut app, id, None, None, Some("none".into()), Some(Priority::High), None, None)
            .unwrap();
        let task = app.find(id).unwrap();
        assert_eq!(task.due_date, None);
        assert_eq!(task.priority, Priority::High);
        assert!(task.updated_at.is_some());

        let err = handle_edit(&mut app, id, None, None, None, None, None, None);
        assert!(matches!(err, Err(CliError::InvalidInput(_))));
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut app = app();
        assert!(matches!(
            handle_task_action(&mut app, TaskAction::Toggle(7)),
            Err(CliError::UnknownTask(7))
        ));
        assert!(matches!(
            handle_timer(&mut app, TimerCommand::Select { id: 7 }),
            Err(CliError::UnknownTask(7))
        ));
    }

    #[test]
    fn list_options_update_saved_filter() {
        let mut app = app();
        handle_list(
            &mut app,
            None,
            Some(PriorityFilter::High),
            Some("all".into()),
            Some(false),
            None,
            Some(SortField::Title),
            None,
        )
        .unwrap();
        let state = app.state();
        assert_eq!(state.filter.priority, PriorityFilter::High);
        assert_eq!(state.filter.category, CategoryFilter::All);
        assert!(!state.filter.show_completed);
        assert_eq!(state.sort.field, SortField::Title);
        assert_eq!(state.sort.direction, SortDirection::Desc);
    }

    #[test]
    fn task_lines_show_details() {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let mut task = Task::new(5, "Pay rent".into(), created);
        task.priority = Priority::High;
        task.category = Some("Personal".into());
        task.due_date = NaiveDate::from_ymd_opt(2025, 3, 11);
        task.tags = vec!["home".into()];

        let today = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        assert_eq!(
            format_task(&task, today),
            "[ ] 5  Pay rent  (high, Personal, due Yesterday (overdue))  #home"
        );
    }

    #[test]
    fn widget_keys() {
        assert_eq!(widget_action(""), Some(Some(WidgetAction::Acknowledge)));
        assert_eq!(widget_action("P"), Some(Some(WidgetAction::Toggle)));
        assert_eq!(widget_action(" \n"), Some(Some(WidgetAction::Acknowledge)));
        assert_eq!(
            widget_action("l"),
            Some(Some(WidgetAction::ChangeMode(PomodoroMode::LongBreak)))
        );
        assert_eq!(widget_action("zzz"), Some(None));
        assert_eq!(widget_action("q"), None);
    }
}

use tasktimer::models::NewTaskForm;
use tasktimer::persistence::{self, TASK_STATE_KEY};
use tasktimer::pomodoro::{PomodoroAction, SettingsPatch};
use tasktimer::sound::{NullBackend, SoundBoard};
use tasktimer::{App, Config, KeyValueStore, PomodoroMode, SqliteStore, TaskAction, TaskState};

fn open(path: &str) -> App<SqliteStore, SoundBoard<NullBackend>> {
    let store = SqliteStore::open(path).unwrap();
    App::new(Config::default(), store, SoundBoard::new(NullBackend, true, 2))
}

#[test]
fn tasks_and_timer_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("store.db");
    let path = path.to_str().unwrap();

    let (tasks, timer) = {
        let mut app = open(path);
        let mut form = NewTaskForm::new("Water plants");
        form.category = Some("Garden".into());
        app.dispatch(TaskAction::Add(form));
        let id = app.state().tasks[0].id;
        app.dispatch(TaskAction::AddSubTask { task_id: id, text: "ferns".into() });
        app.dispatch(TaskAction::Archive(id));
        app.dispatch_timer(PomodoroAction::SelectTodo(id));
        app.dispatch_timer(PomodoroAction::UpdateSettings(SettingsPatch {
            short_break: Some(7),
            ..SettingsPatch::default()
        }));
        app.dispatch_timer(PomodoroAction::SwitchMode(PomodoroMode::ShortBreak));
        app.save_completed_pomodoros(2);
        app.toggle_theme();
        (app.state().clone(), *app.timer())
    };

    let app = open(path);
    assert_eq!(app.state(), &tasks);
    assert_eq!(app.timer(), &timer);
    assert_eq!(app.timer().display(), "07:00");
    assert_eq!(app.completed_pomodoros(), 2);
    assert_eq!(app.preferences().theme.as_str(), "light");
    assert!(app.visible().is_empty());
    assert!(app.categories().contains(&"Garden".to_string()));
}

#[test]
fn malformed_blob_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let path = path.to_str().unwrap();

    {
        let mut store = SqliteStore::open(path).unwrap();
        store.set(TASK_STATE_KEY, "{\"todos\": 42").unwrap();
    }

    let mut app = open(path);
    assert_eq!(app.state(), &TaskState::default());

    app.dispatch(TaskAction::Add(NewTaskForm::new("Fresh start")));
    let stored: TaskState = persistence::load_or_default(app.store(), TASK_STATE_KEY);
    assert_eq!(stored.tasks.len(), 1);
}

#[test]
fn stored_json_uses_the_documented_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let path = path.to_str().unwrap();

    let mut app = open(path);
    app.dispatch(TaskAction::Add(NewTaskForm::new("Shape check")));

    let raw = app.store().get(TASK_STATE_KEY).unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let task = &json["todos"][0];
    assert_eq!(task["title"], "Shape check");
    assert_eq!(task["priority"], "medium");
    assert!(task["createdAt"].is_string());
    assert_eq!(task["subTasks"], serde_json::json!([]));
    assert_eq!(json["filter"]["category"], "all");
    assert_eq!(json["sort"]["field"], "createdAt");
}

pub mod app;
pub mod cli;
pub mod config;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod pomodoro;
pub mod sound;
pub mod storage;
pub mod store;
pub mod ticker;
pub mod utils;
pub mod widget;

pub use app::App;
pub use config::Config;
pub use models::{Priority, SubTask, Task};
pub use pomodoro::{PomodoroMode, PomodoroState};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use store::{TaskAction, TaskState, TaskStore};
pub use utils::Profile;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tasktimer::cli::{self, Cli, Commands};
use tasktimer::models::NewTaskForm;
use tasktimer::persistence::Preferences;
use tasktimer::sound::{BellBackend, SoundBoard};
use tasktimer::store::TaskAction;
use tasktimer::{App, Config, KeyValueStore, MemoryStore, Profile, SqliteStore};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    // Logs go to stderr so they never mix with command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    let config = match &cli.config {
        Some(path) => Config::load_from(&PathBuf::from(path))?,
        None => Config::load_with_profile(profile)?,
    };

    let store: Box<dyn KeyValueStore> = if cli.ephemeral {
        Box::new(MemoryStore::new())
    } else {
        let db_path = config.get_database_path();
        Box::new(SqliteStore::open(db_path.to_str().ok_or_else(|| {
            color_eyre::eyre::eyre!("Database path contains invalid UTF-8")
        })?)?)
    };

    let sound = SoundBoard::new(
        BellBackend,
        Preferences::load(&store).sound_enabled,
        config.alarm.plays_per_alert,
    );
    let mut app = App::new(config, store, sound);

    // Dispatch to appropriate command handler
    match cli.command {
        None => cli::handle_list(&mut app, None, None, None, None, None, None, None)?,
        Some(Commands::Add {
            title,
            description,
            due,
            priority,
            category,
            tags,
        }) => {
            let form = NewTaskForm {
                description,
                priority,
                category,
                ..NewTaskForm::new(title)
            };
            cli::handle_add(&mut app, form, due, tags)?;
        }
        Some(Commands::List {
            search,
            priority,
            category,
            completed,
            archived,
            sort,
            direction,
        }) => cli::handle_list(
            &mut app, search, priority, category, completed, archived, sort, direction,
        )?,
        Some(Commands::Toggle { id }) => cli::handle_task_action(&mut app, TaskAction::Toggle(id))?,
        Some(Commands::Archive { id }) => {
            cli::handle_task_action(&mut app, TaskAction::Archive(id))?
        }
        Some(Commands::Restore { id }) => {
            cli::handle_task_action(&mut app, TaskAction::Restore(id))?
        }
        Some(Commands::Delete { id }) => cli::handle_task_action(&mut app, TaskAction::Delete(id))?,
        Some(Commands::Edit {
            id,
            title,
            description,
            due,
            priority,
            category,
            tags,
        }) => cli::handle_edit(&mut app, id, title, description, due, priority, category, tags)?,
        Some(Commands::Clear) => cli::handle_clear(&mut app)?,
        Some(Commands::Subtask(command)) => cli::handle_subtask(&mut app, command)?,
        Some(Commands::Categories) => cli::handle_categories(&app)?,
        Some(Commands::Timer(command)) => cli::handle_timer(&mut app, command)?,
        Some(Commands::Widget) => cli::handle_widget(&mut app)?,
        Some(Commands::Pomodoros { reset }) => cli::handle_pomodoros(&mut app, reset)?,
        Some(Commands::Sound) => cli::handle_sound(&mut app)?,
        Some(Commands::Theme) => cli::handle_theme(&mut app)?,
    }

    Ok(())
}

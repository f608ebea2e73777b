use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use notia::cli::{self, Cli, Commands};
use notia::{Config, Database, Profile};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Log to a file so output never lands in the middle of watch mode.
/// `RUST_LOG` overrides the configured level.
fn init_logging(config: &Config, profile: Profile) -> Result<WorkerGuard> {
    let log_path = config.get_log_path(profile);
    let dir = log_path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = log_path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("notia.log");

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .unwrap_or_else(|_| EnvFilter::new("notia=info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    tracing::info!(log_file = %log_path.display(), ?profile, "logging initialized");
    Ok(guard)
}

fn open_database(config: &Config) -> Result<Database> {
    let db_path = config.get_database_path();
    let db = Database::new(
        db_path
            .to_str()
            .ok_or_else(|| eyre!("Database path contains invalid UTF-8"))?,
    )?;
    Ok(db)
}

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    let args = Cli::parse();

    // --dev flag enables dev mode, otherwise use prod
    let profile = if args.dev { Profile::Dev } else { Profile::Prod };

    let config = match args.config.as_deref() {
        Some(path) => Config::load_from_path(&notia::utils::expand_path(path), profile)?,
        None => Config::load_with_profile(profile)?,
    };

    // Held until exit so buffered log lines are flushed
    let _log_guard = init_logging(&config, profile)?;

    match args.command.unwrap_or(Commands::Watch) {
        Commands::Watch => cli::handle_watch(&config, open_database(&config)?)?,
        // Parsing is pure and never opens the database
        Commands::Parse { text, base, json } => cli::handle_parse(text, base, json)?,
        Commands::AddNote { title, content } => {
            cli::handle_add_note(title, content, &open_database(&config)?)?
        }
        Commands::EditNote { id, content, title } => {
            cli::handle_edit_note(id, content, title, &open_database(&config)?)?
        }
        Commands::Notes => cli::handle_notes(&open_database(&config)?)?,
        Commands::Reminders { note, json } => {
            cli::handle_reminders(note, json, &open_database(&config)?)?
        }
        Commands::Complete { id, undo } => {
            cli::handle_complete(id, undo, &open_database(&config)?)?
        }
        Commands::Enable { id } => cli::handle_set_enabled(id, true, &open_database(&config)?)?,
        Commands::Disable { id } => {
            cli::handle_set_enabled(id, false, &open_database(&config)?)?
        }
    }

    Ok(())
}

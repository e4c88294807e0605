mod analysis;
mod app;
mod auth;
mod cancel;
mod config;
mod controllers;
mod domain;
mod error;
mod input;
mod notifications;
mod persistence;
mod store;
mod ticker;
mod ui;

use analysis::{apply_batch, AnalysisClient, BatchPlan};
use anyhow::{Context, Result};
use app::{AppState, Services};
use auth::{AuthBackend, AuthStore, GoTrueBackend, LocalAuthBackend, SessionFile};
use cancel::CancelToken;
use clap::{Parser, Subcommand};
use config::Config;
use controllers::ProjectsController;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use persistence::{config_file, ensure_data_dir, init_local_dir, load_metadata, log_dir, meta_file, session_file};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use store::{probe_schema, Capability, MemoryStore, RestStore, RowStore, Schema};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dayflow")]
#[command(about = "Turn spoken thoughts into projects, steps and a focus queue", long_about = None)]
struct Cli {
    /// Use an in-memory store and local sign-in instead of the hosted backend
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a local .dayflow directory in the current directory
    Init,
    /// Sign in (password from DAYFLOW_PASSWORD or stdin)
    Login {
        #[arg(short, long)]
        email: String,
    },
    /// Create an account (password from DAYFLOW_PASSWORD or stdin)
    Signup {
        #[arg(short, long)]
        email: String,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Analyse a transcript and save the projects and tasks found in it
    Capture {
        /// Transcript text
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,
        /// Read the transcript from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Print the analysis as JSON without saving anything
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Init) = cli.command {
        let dir = init_local_dir()?;
        println!("Initialized dayflow directory: {}", dir.display());
        println!();
        println!("Dayflow will now keep its config, session and logs here.");
        return Ok(());
    }

    let _guard = init_logging()?;
    let config = Config::load(config_file()?)?;
    info!(offline = cli.offline, "dayflow starting");

    let result = match cli.command {
        Some(Commands::Init) => Ok(()),
        Some(Commands::Login { email }) => login(&config, cli.offline, &email, false),
        Some(Commands::Signup { email }) => login(&config, cli.offline, &email, true),
        Some(Commands::Logout) => logout(&config, cli.offline),
        Some(Commands::Whoami) => whoami(&config, cli.offline),
        Some(Commands::Capture { text, file, dry_run }) => {
            capture(&config, cli.offline, text, file, dry_run)
        }
        None => run_tui(&config, cli.offline),
    };
    if let Err(e) = &result {
        error!(error = %e, "command failed");
    }
    result
}

/// Log to a daily file; the TUI owns stdout
fn init_logging() -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(log_dir()?, "dayflow.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_env("DAYFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(guard)
}

fn build_services(config: &Config, offline: bool) -> Result<Services> {
    let analysis = Arc::new(AnalysisClient::from_config(config));

    if offline {
        let sessions = SessionFile::new(ensure_data_dir()?.join("offline-session.json"));
        return Ok(Services {
            store: Arc::new(MemoryStore::new()),
            schema: Arc::new(Schema::new(Capability::Positioned)),
            auth: Arc::new(LocalAuthBackend::new(sessions)),
            analysis,
        });
    }

    let (url, anon_key) = config.store_credentials();
    let store = Arc::new(RestStore::new(&url, &anon_key));
    let auth: Arc<dyn AuthBackend> = Arc::new(GoTrueBackend::new(&url, &anon_key, SessionFile::new(session_file()?)));
    let schema = Arc::new(Schema::new(probe_schema(store.as_ref())));
    Ok(Services {
        store,
        schema,
        auth,
        analysis,
    })
}

/// Auth holder with the saved session restored
fn restored_auth(services: &Services, config: &Config) -> AuthStore {
    let mut auth = AuthStore::new(Arc::clone(&services.auth));
    auth.initialize(config.session_wait());
    services
        .store
        .set_access_token(auth.session().map(|s| s.access_token.clone()));
    auth
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var("DAYFLOW_PASSWORD") {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn login(config: &Config, offline: bool, email: &str, sign_up: bool) -> Result<()> {
    let services = build_services(config, offline)?;
    let mut auth = AuthStore::new(Arc::clone(&services.auth));
    let password = read_password()?;

    if sign_up {
        match auth.sign_up(email, &password)? {
            Some(user) => println!("Account created, signed in as {}", user.email.unwrap_or(user.id)),
            None => println!("Account created. Confirm your email, then run `dayflow login`."),
        }
    } else {
        let user = auth.sign_in(email, &password)?;
        println!("Signed in as {}", user.email.unwrap_or(user.id));
    }
    Ok(())
}

fn logout(config: &Config, offline: bool) -> Result<()> {
    let services = build_services(config, offline)?;
    let mut auth = restored_auth(&services, config);
    if auth.user().is_none() {
        println!("Not signed in");
        return Ok(());
    }
    if let Err(e) = auth.sign_out() {
        warn!(error = %e, "remote sign-out failed");
        println!("Signed out locally (remote sign-out failed: {})", e);
    } else {
        println!("Signed out");
    }
    Ok(())
}

fn whoami(config: &Config, offline: bool) -> Result<()> {
    let services = build_services(config, offline)?;
    let auth = restored_auth(&services, config);
    match auth.user() {
        Some(user) => println!("{} ({})", user.email.as_deref().unwrap_or("no email"), user.id),
        None => println!("Not signed in"),
    }
    Ok(())
}

fn capture(
    config: &Config,
    offline: bool,
    text: Option<String>,
    file: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let transcript = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read transcript: {}", path.display()))?,
        (None, None) => io::read_to_string(io::stdin()).context("Failed to read transcript from stdin")?,
    };

    let services = build_services(config, offline)?;

    if dry_run {
        let result = match services.analysis.analyze_detailed(&transcript) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Analysis fell back: {}", e);
                domain::AnalysisResult::fallback()
            }
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let auth = restored_auth(&services, config);
    let user_id = auth
        .user()
        .map(|u| u.id.clone())
        .context("Not signed in. Run `dayflow login --email <EMAIL>` first")?;

    let mut projects = ProjectsController::new(Arc::clone(&services.store), Arc::clone(&services.schema));
    projects.set_user(Some(user_id.clone()));
    projects.load().context("Failed to load projects")?;

    let result = services.analysis.analyze(&transcript);
    let plan = BatchPlan::from_result(&result);
    let summary = apply_batch(
        services.store.as_ref(),
        &user_id,
        transcript.trim(),
        &plan,
        &services.schema,
        projects.next_position(),
        &CancelToken::new(),
    )
    .context("Failed to save the analysis")?;

    println!(
        "Saved {} projects and {} tasks",
        summary.project_ids.len(),
        summary.task_ids.len()
    );
    if summary.unresolved > 0 {
        println!("{} tasks had no matching project and were skipped", summary.unresolved);
    }
    Ok(())
}

fn run_tui(config: &Config, offline: bool) -> Result<()> {
    let services = build_services(config, offline)?;

    let meta_path = meta_file()?;
    let metadata = load_metadata(&meta_path).unwrap_or_else(|e| {
        warn!(error = %e, "could not read metadata, using defaults");
        Default::default()
    });

    let mut app = AppState::new(services, metadata, Some(meta_path));
    app.offline = offline;
    app.start(config.session_wait());

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run app
    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    // Save on exit
    if let Err(e) = app.save() {
        eprintln!("Error saving state: {}", e);
    }

    if let Err(err) = &result {
        eprintln!("Error: {}", err);
    }
    info!("dayflow exiting");
    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut AppState) -> Result<()> {
    loop {
        terminal.draw(|f| ui::render(f, app))?;

        // Handle events with timeout for ticking
        let timeout = ticker::poll_timeout(app.projects.undo.remaining(Instant::now()));
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                // Only process key press events (ignore key release)
                if key.kind == KeyEventKind::Press {
                    let should_quit = if input::opens_external_editor(app, key) {
                        // The editor needs the normal terminal back
                        disable_raw_mode()?;
                        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

                        let should_quit = input::handle_key(app, key)?;

                        enable_raw_mode()?;
                        execute!(io::stdout(), EnterAlternateScreen)?;
                        terminal.clear()?;
                        should_quit
                    } else {
                        input::handle_key(app, key)?
                    };

                    if should_quit {
                        return Ok(());
                    }
                }
            }
        }

        app.tick();

        if app.needs_save {
            if let Err(e) = app.save() {
                warn!(error = %e, "autosave failed");
                app.set_error(format!("Could not save: {}", e));
            }
        }
    }
}

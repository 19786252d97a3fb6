//! Course catalog graph CLI.
//!
//! Provides the `coursegraph` binary, the batch driver around
//! `coursegraph_sync`:
//!
//! - `sync`: reconcile the graph against a catalog JSON file
//! - `import-certifications`: import passed exams as completed enrolments
//! - `update-user`: edit a user's profile fields
//! - `stats`: print node and relationship totals
//!
//! Configuration comes from flags, each backed by an environment variable:
//! - `COURSEGRAPH_DB_PATH`: SQLite database file path (default: "coursegraph.db")
//! - `COURSEGRAPH_RETRIES`: whole-batch retries on retryable failures (default: 3)
//! - `COURSEGRAPH_BUSY_TIMEOUT_MS`: SQLite busy timeout (default: 5000)
//! - `RUST_LOG`: log filter (default: "coursegraph=info")
//!
//! Results are printed as JSON on stdout; logs go to stderr.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coursegraph_core::{CourseStatus, CourseTree};
use coursegraph_storage::{GraphStore, SqliteConfig, SqliteStore};
use coursegraph_sync::{
    import_certifications, profile, ImportOptions, JsonCertificationSource, ProfileUpdates,
    SyncError, SyncOptions, Synchronizer,
};

/// Course catalog graph tools.
#[derive(Parser)]
#[command(name = "coursegraph", about = "Course catalog graph tools")]
struct Cli {
    /// Path to the graph database file.
    #[arg(long, global = true, env = "COURSEGRAPH_DB_PATH", default_value = "coursegraph.db")]
    db: String,

    /// How many times a retryable failure re-runs the whole batch.
    #[arg(long, global = true, env = "COURSEGRAPH_RETRIES", default_value_t = 3)]
    retries: u32,

    /// How long a writer waits on a locked database, in milliseconds.
    #[arg(long, global = true, env = "COURSEGRAPH_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    busy_timeout_ms: u64,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Synchronize the graph with a catalog.
    Sync {
        /// JSON array of courses produced by the content loader.
        #[arg(short, long)]
        catalog: PathBuf,

        /// Status for courses that do not declare one.
        #[arg(long, value_enum, default_value = "active")]
        default_status: StatusArg,
    },

    /// Import passed certification exams as completed enrolments.
    ImportCertifications {
        /// JSON array of exam rows.
        #[arg(short, long)]
        rows: PathBuf,

        /// Maximum rows imported per run.
        #[arg(long, default_value_t = coursegraph_sync::certification::DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Update a user's profile. Blank values clear a field.
    UpdateUser {
        /// Identity-provider subject of the user.
        #[arg(long)]
        sub: String,
        #[arg(long)]
        nickname: Option<String>,
        #[arg(long)]
        given_name: Option<String>,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        country: Option<String>,
    },

    /// Print node and relationship totals.
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Active,
    Disabled,
}

impl From<StatusArg> for CourseStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Active => CourseStatus::Active,
            StatusArg::Disabled => CourseStatus::Disabled,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut store = match open_store(&cli.db, cli.busy_timeout_ms) {
        Ok(store) => store,
        Err(code) => process::exit(code),
    };
    let exit_code = run(cli, &mut store);
    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("coursegraph=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coursegraph=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(db_path: &str, busy_timeout_ms: u64) -> Result<SqliteStore, i32> {
    let config = SqliteConfig {
        busy_timeout: Duration::from_millis(busy_timeout_ms),
    };
    SqliteStore::with_config(db_path, config).map_err(|e| {
        eprintln!("Error: failed to open database '{}': {}", db_path, e);
        3
    })
}

/// Execute a subcommand against `store`.
///
/// Returns exit code: 0 = success, 1 = invalid input or not found,
/// 2 = sync failure after retries, 3 = store unavailable or I/O error.
fn run<S: GraphStore + ?Sized>(cli: Cli, store: &mut S) -> i32 {
    let retries = cli.retries;
    match cli.command {
        Commands::Sync {
            catalog,
            default_status,
        } => {
            let courses = match read_catalog(&catalog) {
                Ok(courses) => courses,
                Err(code) => return code,
            };
            let synchronizer = Synchronizer::new(SyncOptions {
                default_status: default_status.into(),
                now: None,
            });
            info!(courses = courses.len(), catalog = %catalog.display(), "starting sync");
            finish(with_retries(retries, || synchronizer.run(store, &courses)))
        }
        Commands::ImportCertifications { rows, limit } => {
            let source = JsonCertificationSource::new(rows);
            let options = ImportOptions { limit, now: None };
            finish(with_retries(retries, || {
                import_certifications(store, &source, &options)
            }))
        }
        Commands::UpdateUser {
            sub,
            nickname,
            given_name,
            position,
            company,
            country,
        } => {
            let updates = ProfileUpdates {
                nickname,
                given_name,
                position,
                company,
                country,
            };
            finish(with_retries(retries, || {
                profile::update_user(store, &sub, updates.clone())
            }))
        }
        Commands::Stats => finish(store.stats().map_err(SyncError::from)),
    }
}

/// Reads the loader's catalog: 3 if the file cannot be read, 1 if it is not
/// a valid catalog.
fn read_catalog(path: &Path) -> Result<Vec<CourseTree>, i32> {
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: cannot read catalog '{}': {}", path.display(), e);
        3
    })?;
    serde_json::from_str(&text).map_err(|e| {
        eprintln!("Error: malformed catalog '{}': {}", path.display(), e);
        1
    })
}

/// Runs `op`, re-running it while it fails with a retryable error and
/// retries remain.
fn with_retries<T>(
    retries: u32,
    mut op: impl FnMut() -> Result<T, SyncError>,
) -> Result<T, SyncError> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < retries => {
                attempt += 1;
                warn!(attempt, retries, error = %err, "retrying batch");
                thread::sleep(Duration::from_millis(100 * u64::from(attempt)));
            }
            result => return result,
        }
    }
}

/// Prints the result as JSON and maps it to an exit code.
fn finish<T: Serialize>(result: Result<T, SyncError>) -> i32 {
    match result {
        Ok(value) => {
            let json = serde_json::to_string_pretty(&value).unwrap_or_else(|e| {
                format!("{{\"error\": \"failed to serialize result: {}\"}}", e)
            });
            println!("{}", json);
            0
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            exit_code(&err)
        }
    }
}

fn exit_code(err: &SyncError) -> i32 {
    match err {
        SyncError::InvalidContentTree(_) | SyncError::NotFound(_) => 1,
        SyncError::SyncFailure { .. } => 2,
        SyncError::StoreUnavailable(_) | SyncError::Source(_) => 3,
    }
}

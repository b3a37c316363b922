// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pacshadow::config::{self, Config};
use pacshadow::engine::{ArchDbEngine, LogLevel, Observer, Package, Question, SyncOutcome};
use pacshadow::mirror::MirrorStore;
use pacshadow::repository::client::HttpFetcher;
use pacshadow::resolver::{PackageChange, UpgradeMode};
use pacshadow::session::Session;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "pacshadow")]
#[command(author, version, about = "Check for package upgrades without root privileges", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a database mirror and list available upgrades
    Check {
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Fixed mirror directory, reused between runs (default: a new temp dir)
        #[arg(short, long)]
        mirror_path: Option<PathBuf>,
        /// Keep the mirror after the check
        #[arg(long)]
        keep: bool,
        /// Watch list (JSON array of {name, version})
        #[arg(short, long)]
        watched: Option<PathBuf>,
        /// List installed packages no repository carries
        #[arg(long)]
        foreign: bool,
        /// Package not to report as foreign (repeatable)
        #[arg(long = "foreign-ignore", value_name = "NAME")]
        foreign_ignore: Vec<String>,
        /// Also list packages the upgrade would remove
        #[arg(long)]
        preview: bool,
        /// Skip the full upgrade check
        #[arg(long)]
        no_upgrades: bool,
    },
    /// Create or refresh a database mirror without syncing
    Mirror {
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Fixed mirror directory (default: a new temp dir)
        #[arg(short, long)]
        mirror_path: Option<PathBuf>,
    },
    /// Remove a database mirror
    Clean {
        /// Mirror directory to remove
        mirror_path: PathBuf,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

/// Progress and engine messages on the console
struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn on_sync_dbs(&mut self, count: usize) {
        info!("Synchronizing {} package databases", count);
    }

    fn on_sync_db_start(&mut self, repository: &str) {
        info!("Synchronizing {}", repository);
    }

    fn on_sync_db_end(&mut self, outcome: SyncOutcome) {
        debug!("sync result: {:?}", outcome);
    }

    fn on_download_progress(&mut self, filename: &str, transferred: u64, total: u64) {
        debug!("{}: {}/{} bytes", filename, transferred, total);
    }

    fn on_question(&mut self, question: &Question) -> bool {
        match question {
            Question::Replace {
                old,
                new,
                repository,
            } => {
                info!("Replacing {} with {}/{}", old, repository, new);
                true
            }
        }
    }

    fn on_log(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => error!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Debug => debug!("{}", message),
        }
    }
}

struct CheckOptions {
    watched: Option<PathBuf>,
    foreign: bool,
    foreign_ignore: Vec<String>,
    preview: bool,
    no_upgrades: bool,
}

fn mirror_store(mirror_path: Option<PathBuf>) -> MirrorStore {
    match mirror_path {
        Some(path) => MirrorStore::with_fixed_path(path),
        None => MirrorStore::new(),
    }
}

fn open_engine(root: &Path, mirror: &Path) -> pacshadow::Result<ArchDbEngine> {
    ArchDbEngine::new(root, mirror, Box::new(HttpFetcher::new()?))
}

/// Format a byte count the way package lists show it
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

fn print_changes(title: &str, changes: &[PackageChange], verbose: bool) {
    if changes.is_empty() {
        println!("No {}.", title);
        return;
    }

    println!("{} ({}):", title, changes.len());
    for change in changes {
        if verbose {
            println!(
                "  {}  [{} -> {}, download {}]",
                change,
                format_size(change.old_size()),
                format_size(change.new_size()),
                format_size(change.download_size())
            );
        } else {
            println!("  {}", change);
        }
    }

    let download: u64 = changes.iter().map(PackageChange::download_size).sum();
    println!("Total download size: {}", format_size(download));
}

fn print_foreign(packages: &[Package]) {
    if packages.is_empty() {
        println!("No foreign packages.");
        return;
    }

    println!("Foreign packages ({}):", packages.len());
    for pkg in packages {
        println!("  {} {}", pkg.name, pkg.version);
    }
}

/// Remove a mirror directory, refusing anything that does not look like one
fn clean_mirror(path: &Path) -> Result<()> {
    if !path.join("local").is_symlink() {
        return Err(anyhow::anyhow!("{} is not a database mirror", path.display()));
    }
    fs::remove_dir_all(path)?;
    Ok(())
}

fn run_check(store: &mut MirrorStore, config: &Config, options: &CheckOptions) -> Result<()> {
    let watched = match &options.watched {
        Some(path) => config::load_watched(path)?,
        None => Vec::new(),
    };

    let mode = if options.preview {
        UpgradeMode::Preview
    } else {
        UpgradeMode::Real
    };

    let mut session =
        Session::open(store, config, mode, open_engine)?.with_observer(Box::new(ConsoleObserver));
    info!(
        "{} database mirror {}",
        if session.reused() { "Reusing" } else { "Using new" },
        session.mirror_path().display()
    );

    let needs_sync = !options.no_upgrades || !watched.is_empty();
    if needs_sync {
        session.sync_all()?;
    }

    let verbose = session.verbose_pkg_lists();

    if !options.no_upgrades {
        match session.compute_upgrade() {
            Ok(changes) => print_changes("upgrades", &changes, verbose),
            Err(e) if e.is_dependency_issue() => {
                // Updates exist, the engine just cannot say which
                eprintln!("Upgrades are available but could not be listed:\n{}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    if !watched.is_empty() {
        let changes = session.watched(&watched)?;
        print_changes("watched package updates", &changes, verbose);
    }

    if options.foreign {
        let foreign = session.foreign(&options.foreign_ignore)?;
        print_foreign(&foreign);
    }

    session.close();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Check {
            config,
            mirror_path,
            keep,
            watched,
            foreign,
            foreign_ignore,
            preview,
            no_upgrades,
        } => {
            let config = Config::load(&config)?;
            let keep = keep || mirror_path.is_some();
            let mut store = mirror_store(mirror_path);

            let options = CheckOptions {
                watched,
                foreign,
                foreign_ignore,
                preview,
                no_upgrades,
            };
            let result = run_check(&mut store, &config, &options);

            if keep && let Some(path) = store.path() {
                println!("Mirror kept at {}", path.display());
            }
            if let Err(e) = store.remove(keep) {
                warn!("{}", e);
            }
            result
        }
        Commands::Mirror {
            config,
            mirror_path,
        } => {
            let config = Config::load(&config)?;
            let mut store = mirror_store(mirror_path);
            let established = store.establish(&config.db_path)?;

            println!("{}", established.path.display());
            if established.reused {
                println!("Existing mirror reused ({} databases refreshed)", store.synced().len());
            } else {
                println!("New mirror created");
            }
            // The mirror outlives this command
            store.remove(true)?;
            Ok(())
        }
        Commands::Clean { mirror_path } => {
            clean_mirror(&mirror_path)?;
            println!("Removed {}", mirror_path.display());
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pacshadow", &mut io::stdout());
            Ok(())
        }
    }
}

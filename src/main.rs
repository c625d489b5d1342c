//! Command line front-end: drives the cache engine against a remote folder
//! that is mounted (or mirrored) locally.

use clap::{Parser, Subcommand};
use shelf_config::Config;
use shelf_library::warmup::WarmUp;
use shelf_library::{LibraryId, Options, Shelf};
use shelf_storage::backend::LocalBackend;
use shelf_storage::{AlwaysAvailable, RemoteRoot};
use std::fmt::{Debug, Display};
use std::ops::Deref;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage configured libraries.
    #[command(subcommand)]
    Library(LibraryCommand),
    /// Make sure the current library's catalog is ready, then warm its covers.
    Sync {
        /// Download the catalog again even if the local copy looks fresh.
        #[arg(long)]
        force: bool,
    },
    /// Download a content file of the current library and print its local path.
    Open { item: i64, format: String },
    /// Delete expired downloads.
    Sweep,
    /// Keep deleting expired downloads every `janitor.interval` until interrupted.
    Janitor,
    /// Drop cached catalogs and covers of one library, or of all of them.
    Clear { id: Option<String> },
}

#[derive(Debug, Subcommand)]
enum LibraryCommand {
    List,
    /// Register a library by folder path, browser URL or shared link.
    Add {
        root: String,
        #[arg(long)]
        name: Option<String>,
    },
    Remove { id: String },
    /// Make a library the current one.
    Use { id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return fail(err),
    };
    let result = match open(&config) {
        Ok(shelf) => run(&shelf, cli.command).await,
        Err(code) => Err(code),
    };
    result.err().unwrap_or(ExitCode::SUCCESS)
}

/// Print the top-level error kind; the full error tree goes to the debug log.
fn fail<E>(err: E) -> ExitCode
where
    E: Deref + Debug,
    E::Target: Display,
{
    tracing::debug!(error = ?err, "Command failed");
    eprintln!("error: {}", &*err);
    ExitCode::FAILURE
}

fn open(config: &Config) -> Result<Shelf, ExitCode> {
    let storage_root = config.storage_root().map_err(fail)?;
    let Some(remote_root) = &config.remote.root else {
        eprintln!("error: no remote folder configured (set remote.root or SHELF_REMOTE__ROOT)");
        return Err(ExitCode::FAILURE);
    };
    let mut backend = LocalBackend::new("local", remote_root).map_err(fail)?;
    for (link, folder) in &config.remote.links {
        backend = backend.with_shared_link(link.clone(), folder.clone());
    }
    let options = Options {
        root: storage_root,
        concurrency: config.warm_up.concurrency,
        expiration: config.janitor.expiration(),
        interval: config.janitor.interval(),
    };
    tracing::debug!(root = %options.root.display(), remote = %remote_root.display(), "Opening shelf");
    Shelf::open(options, Arc::new(backend), Arc::new(AlwaysAvailable)).map_err(fail)
}

async fn run(shelf: &Shelf, command: Command) -> Result<(), ExitCode> {
    match command {
        Command::Library(command) => library(shelf, command).await?,
        Command::Sync { force } => {
            let Some((items, warm_up)) = shelf.load_current(force).await.map_err(fail)? else {
                println!("No library configured; add one with `shelf library add`.");
                return Ok(());
            };
            println!("{} items", items.len());
            match warm_up {
                WarmUp::Spawned(handle) => match handle.await {
                    Ok(summary) => println!(
                        "Covers: {} fetched, {} already cached, {} skipped",
                        summary.fetched, summary.cached, summary.skipped
                    ),
                    Err(err) => tracing::warn!(error = %err, "Warm-up task failed"),
                },
                WarmUp::AlreadyRunning => println!("Covers: a warm-up pass is already running"),
                WarmUp::CredentialsUnavailable => println!("Covers: remote credentials unavailable"),
                WarmUp::NothingToDo => {},
            }
        },
        Command::Open { item, format } => {
            let Some(library) = shelf.current() else {
                println!("No library configured; add one with `shelf library add`.");
                return Ok(());
            };
            let path = shelf.open_file(&library.id, item, &format).await.map_err(fail)?;
            println!("{}", path.display());
        },
        Command::Sweep => {
            let sweep = shelf.sweep().await.map_err(fail)?;
            println!("Deleted {}, kept {}, failed {}", sweep.deleted, sweep.retained, sweep.failed);
        },
        Command::Janitor => {
            let cancel = CancellationToken::new();
            let handle = shelf.spawn_janitor(cancel.clone());
            tracing::info!("Janitor running; press Ctrl-C to stop");
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "Could not listen for Ctrl-C");
            }
            cancel.cancel();
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "Janitor task failed");
            }
        },
        Command::Clear { id: Some(id) } => {
            let library = shelf.library(&LibraryId::from(id.as_str())).map_err(fail)?;
            shelf.clear(Some(&library.id)).await.map_err(fail)?;
            println!("Cleared {}", library.name);
        },
        Command::Clear { id: None } => {
            shelf.clear_all().await.map_err(fail)?;
            println!("Cleared all libraries");
        },
    }
    Ok(())
}

async fn library(shelf: &Shelf, command: LibraryCommand) -> Result<(), ExitCode> {
    match command {
        LibraryCommand::List => {
            let current = shelf.current().map(|library| library.id);
            for library in shelf.registry().list() {
                let marker = if current.as_ref() == Some(&library.id) { "*" } else { " " };
                let location = match &library.shared_link {
                    Some(link) => link.clone(),
                    None => library.remote_root.display().to_string(),
                };
                let state = shelf.sync_state(&library.id);
                println!("{marker} {}  {}  {location}  [{state}]", library.id, library.name);
            }
        },
        LibraryCommand::Add { root, name } => {
            let root = root.parse::<RemoteRoot>().map_err(fail)?;
            match shelf.add_library(root, name).map_err(fail)? {
                Some(library) => println!("Added {} ({})", library.name, library.id),
                None => println!("A library at that location already exists"),
            }
        },
        LibraryCommand::Remove { id } => match shelf.remove_library(&LibraryId::from(id.as_str())).await.map_err(fail)? {
            true => println!("Removed {id}"),
            false => println!("No library with id {id}"),
        },
        LibraryCommand::Use { id } => match shelf.switch_to(&LibraryId::from(id.as_str())).map_err(fail)? {
            true => println!("Now using {id}"),
            false => println!("No library with id {id}"),
        },
    }
    Ok(())
}

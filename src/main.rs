//! ferry - cancellable file operations with undo/redo.
//!
//! Usage:
//!   ferry copy SRC... DEST      Copy into a folder
//!   ferry move SRC... DEST      Move into a folder
//!   ferry trash PATH...         Move to the trash
//!   ferry restore PATH...       Put trashed items back
//!   ferry scan PATH...          Count what an operation would touch
//!   ferry session               Interactive shell with undo/redo
//!   ferry --help                Show help

mod terminal;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail, eyre};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ferry_core::{AutoInteraction, EngineConfig, LocalFileSystem, Location, UserInteraction};
use ferry_ops::{Engine, JobEnv, JobHandle, JobOutcome, JobReport, PermissionChange, TransferAction};
use ferry_scan::{OpKind, SourceScanner};

use terminal::{LogNotifier, TerminalInteraction, TerminalProgress};

#[derive(Parser)]
#[command(
    name = "ferry",
    version,
    about = "Cancellable file operations with conflict resolution and undo/redo",
    long_about = "ferry copies, moves, links, trashes and deletes files, asking what to do \
                  about conflicts and errors as it goes.\n\n\
                  Run `ferry session` for an interactive shell where every operation can be \
                  undone and redone."
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use a directory-backed trash at this path
    #[arg(long, global = true)]
    trash_dir: Option<PathBuf>,

    /// Answer yes to deletions and replace conflicting files
    #[arg(short, long, global = true, conflicts_with = "skip")]
    yes: bool,

    /// Skip failing and conflicting files without asking
    #[arg(long, global = true)]
    skip: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Op(Op),

    /// Interactive shell with undo and redo
    Session,
}

#[derive(Subcommand)]
enum Op {
    /// Copy files into a folder
    Copy {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<PathBuf>,
    },

    /// Move files into a folder
    Move {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<PathBuf>,
    },

    /// Create symbolic links in a folder
    Link {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<PathBuf>,
    },

    /// Copy files next to themselves under a new name
    Duplicate {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Move files to the trash
    Trash {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Delete files permanently
    Delete {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Restore trashed files to where they came from
    Restore {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List the trash
    TrashList,

    /// Permanently delete everything in the trash
    EmptyTrash,

    /// Create a folder
    Mkdir {
        /// Folder to create it in
        parent: PathBuf,

        /// Name (defaults to "untitled folder")
        name: Option<String>,
    },

    /// Create an empty file, or a copy of a template
    Touch {
        /// Folder to create it in
        parent: PathBuf,

        /// Name (defaults to "new file" or the template's name)
        name: Option<String>,

        /// File to copy contents from
        #[arg(short, long)]
        template: Option<PathBuf>,
    },

    /// Rename a file in place
    Rename { path: PathBuf, new_name: String },

    /// Set permissions (octal)
    Chmod {
        mode: String,
        path: PathBuf,

        /// Apply to everything below the folder too
        #[arg(short = 'R', long)]
        recursive: bool,
    },

    /// Change the owner (name or uid)
    Chown { owner: String, path: PathBuf },

    /// Change the group (name or gid)
    Chgrp { group: String, path: PathBuf },

    /// Count the entries and bytes an operation would touch
    Scan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

/// One line typed into a session.
#[derive(Parser)]
#[command(name = "", no_binary_name = true, disable_help_flag = true)]
enum SessionLine {
    #[command(flatten)]
    Op(Op),

    /// Undo the last operation
    Undo,

    /// Redo the last undone operation
    Redo,

    /// Show the undo history
    History,

    /// Leave the session
    #[command(alias = "exit")]
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from(path).wrap_err("Invalid configuration")?,
        None => EngineConfig::load().wrap_err("Invalid configuration")?,
    };
    if cli.trash_dir.is_some() {
        config.trash_dir = cli.trash_dir.clone();
    }

    let interaction: Arc<dyn UserInteraction> = if cli.yes {
        Arc::new(AutoInteraction::assume_yes())
    } else if cli.skip {
        Arc::new(AutoInteraction::skipping())
    } else {
        Arc::new(TerminalInteraction::new())
    };
    let env = JobEnv::new(
        Arc::new(LocalFileSystem::from_config(&config)),
        interaction,
        Arc::new(TerminalProgress::default()),
        config,
    );
    let engine = Engine::new(env);

    match cli.command {
        Command::Op(op) => {
            let report = run_op(&engine, op).await?;
            if let Some(JobOutcome::Failed(message)) = report.map(|report| report.outcome) {
                bail!(message);
            }
        }
        Command::Session => run_session(&engine).await?,
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn locations(paths: &[PathBuf]) -> Vec<Location> {
    paths.iter().map(Location::local).collect()
}

/// Split the trailing destination off a `SRC... DEST` list.
fn sources_and_dest(paths: &[PathBuf]) -> Result<(Vec<Location>, Location)> {
    match paths.split_last() {
        Some((dest, sources)) if !sources.is_empty() => Ok((locations(sources), Location::local(dest))),
        _ => bail!("Expected at least one source and a destination"),
    }
}

/// Run one operation. Returns the report of the job it started, if any.
async fn run_op(engine: &Engine, op: Op) -> Result<Option<JobReport>> {
    let handle = match op {
        Op::Copy { paths } => {
            let (sources, dest) = sources_and_dest(&paths)?;
            engine.copy_move_link(sources, Some(dest), TransferAction::Copy)?
        }
        Op::Move { paths } => {
            let (sources, dest) = sources_and_dest(&paths)?;
            engine.copy_move_link(sources, Some(dest), TransferAction::Move)?
        }
        Op::Link { paths } => {
            let (sources, dest) = sources_and_dest(&paths)?;
            engine.copy_move_link(sources, Some(dest), TransferAction::Link)?
        }
        Op::Duplicate { paths } => engine.duplicate(locations(&paths)),
        Op::Trash { paths } => engine.trash(locations(&paths)),
        Op::Delete { paths } => engine.delete(locations(&paths)),
        Op::Restore { paths } => engine.restore_from_trash(trashed_items(engine, &paths)?),
        Op::TrashList => {
            print_trash(engine)?;
            return Ok(None);
        }
        Op::EmptyTrash => engine.empty_trash(),
        Op::Mkdir { parent, name } => engine.create_folder(Location::local(parent), name),
        Op::Touch { parent, name, template } => {
            engine.create_file(Location::local(parent), name, template.map(Location::local))
        }
        Op::Rename { path, new_name } => engine.rename(Location::local(path), new_name),
        Op::Chmod { mode, path, recursive } => {
            let mode = u32::from_str_radix(&mode, 8).map_err(|_| eyre!("Invalid octal mode: {mode}"))?;
            let location = Location::local(path);
            if recursive {
                let change = PermissionChange {
                    file_value: mode,
                    file_mask: 0o7777,
                    dir_value: mode,
                    dir_mask: 0o7777,
                };
                engine.set_permissions_recursive(location, change)
            } else {
                engine.set_permissions(location, mode)
            }
        }
        Op::Chown { owner, path } => engine.change_owner(Location::local(path), owner),
        Op::Chgrp { group, path } => engine.change_group(Location::local(path), group),
        Op::Scan { paths, json } => {
            run_scan(engine, &paths, json)?;
            return Ok(None);
        }
    };

    let cancel = handle.cancellation_token();
    let wait = handle.wait();
    tokio::pin!(wait);
    let finished = tokio::select! {
        report = &mut wait => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    let report = match finished {
        Some(report) => report,
        None => {
            eprintln!("\nCancelling...");
            cancel.cancel();
            wait.await
        }
    };
    engine.changes().flush(true, &LogNotifier);
    print_report(&report);
    Ok(Some(report))
}

fn print_report(report: &JobReport) {
    eprintln!();
    match &report.outcome {
        JobOutcome::Completed => {
            let files = if report.files_done == 1 { "file" } else { "files" };
            let mut line = format!("{}: {} {files}", report.kind, report.files_done);
            if report.bytes_done > 0 {
                line.push_str(&format!(
                    " ({})",
                    humansize::format_size(report.bytes_done, humansize::DECIMAL)
                ));
            }
            if report.skipped > 0 {
                line.push_str(&format!(", {} skipped", report.skipped));
            }
            println!("{line}");
        }
        JobOutcome::Cancelled => println!("{}: cancelled", report.kind),
        JobOutcome::Failed(message) => println!("{}: failed: {message}", report.kind),
    }
}

/// Map paths to the newest trash entry that came from each of them.
fn trashed_items(engine: &Engine, paths: &[PathBuf]) -> Result<IndexMap<String, u64>> {
    let entries = engine.env().fs.list_trash().wrap_err("Cannot read the trash")?;
    let mut items = IndexMap::new();
    for location in locations(paths) {
        let newest = entries
            .iter()
            .filter(|entry| entry.original == location)
            .max_by_key(|entry| entry.deleted_at);
        match newest.and_then(|entry| entry.modified) {
            Some(mtime) => {
                items.insert(location.uri(), mtime);
            }
            None => eprintln!("Nothing from {location} is in the trash"),
        }
    }
    Ok(items)
}

fn print_trash(engine: &Engine) -> Result<()> {
    let entries = engine.env().fs.list_trash().wrap_err("Cannot read the trash")?;
    if entries.is_empty() {
        println!("The trash is empty.");
    }
    for entry in entries {
        println!("{:<30} {}", entry.name, entry.original);
    }
    Ok(())
}

fn run_scan(engine: &Engine, paths: &[PathBuf], json: bool) -> Result<()> {
    let env = engine.env();
    let cancel = CancellationToken::new();
    let mut skip_all = false;
    let info = SourceScanner::new(env.fs.as_ref(), env.interaction.as_ref(), &cancel)
        .report_interval(env.config.scan_report_interval)
        .scan(&locations(paths), OpKind::Copy, &mut skip_all);

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!(
            "{} entries, {}",
            info.num_files,
            humansize::format_size(info.num_bytes, humansize::DECIMAL)
        );
    }
    Ok(())
}

async fn run_session(engine: &Engine) -> Result<()> {
    eprintln!("ferry session. Type `help` for commands, `quit` to leave.");
    let stdin = std::io::stdin();
    loop {
        eprint!("ferry> ");
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        if words == ["help"] {
            eprintln!("{}", SessionLine::command().render_help());
            continue;
        }

        let parsed = match SessionLine::try_parse_from(&words) {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        let result = match parsed {
            SessionLine::Op(op) => run_op(engine, op).await.map(|_| ()),
            SessionLine::Undo => replay(engine, engine.undo().map_err(Into::into)).await,
            SessionLine::Redo => replay(engine, engine.redo().map_err(Into::into)).await,
            SessionLine::History => {
                print_history(engine);
                Ok(())
            }
            SessionLine::Quit => break,
        };
        if let Err(e) = result {
            eprintln!("{e}");
        }
        print_menu(engine);
    }
    Ok(())
}

async fn replay(engine: &Engine, handle: Result<JobHandle>) -> Result<()> {
    let report = handle?.wait().await;
    engine.changes().flush(true, &LogNotifier);
    print_report(&report);
    Ok(())
}

fn print_menu(engine: &Engine) {
    let menu = engine.menu_state();
    if let Some(description) = menu.undo_description {
        eprintln!("  undo: {description}");
    }
    if let Some(description) = menu.redo_description {
        eprintln!("  redo: {description}");
    }
}

fn print_history(engine: &Engine) {
    let history = engine.stack().history();
    if history.is_empty() {
        println!("No history.");
    }
    for entry in history {
        let marker = if entry.undone { "(undone)" } else { "" };
        println!("{:<40} {} {marker}", entry.label, entry.description);
    }
}

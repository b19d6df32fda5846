//! `taskexec` command-line interface.
//!
//! Thin wrapper over the library: loads `.taskexec/config.toml`, resolves the
//! completion provider, wires SIGINT to cancellation and prints results.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use taskexec::cancel::CancelToken;
use taskexec::core::types::LoopCheckpoint;
use taskexec::errors::Interrupted;
use taskexec::exit_codes;
use taskexec::io::cache::ResponseCache;
use taskexec::io::checkpoint::CheckpointStore;
use taskexec::io::config::{ExecutorConfig, load_config, write_config};
use taskexec::io::context::FileContextBuilder;
use taskexec::io::paths::{LOOP_STATE_KEY, WorkspacePaths};
use taskexec::io::provider::{CompletionProvider, ProviderRegistry};
use taskexec::logging;
use taskexec::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "taskexec",
    version,
    about = "Local task executor with response caching and an edit-test loop"
)]
struct Cli {
    /// Workspace root (holds `.taskexec/`).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `.taskexec/config.toml`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run a task and print its output.
    Run {
        task: String,
        /// Target file (repeatable).
        #[arg(short = 'f', long = "file")]
        files: Vec<String>,
    },
    /// Inspect or control the edit loop.
    Loop {
        #[command(subcommand)]
        command: LoopCommand,
    },
    /// Inspect or clear the response cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// List or prune task records.
    Tasks {
        #[command(subcommand)]
        command: TasksCommand,
    },
}

#[derive(Subcommand)]
enum LoopCommand {
    /// Print the loop checkpoint as JSON.
    Status,
    /// Continue a running loop.
    Resume,
    /// Delete the loop checkpoint.
    Reset,
}

#[derive(Subcommand)]
enum CacheCommand {
    Stats,
    Clear {
        /// Only remove entries older than this many hours.
        #[arg(long)]
        older_than_hours: Option<u64>,
    },
}

#[derive(Subcommand)]
enum TasksCommand {
    /// Tasks that are pending, running or paused.
    List,
    Cleanup {
        #[arg(long)]
        max_age_days: Option<u64>,
        #[arg(long)]
        max_count: Option<usize>,
    },
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => exit_code(code),
        Err(err) if err.downcast_ref::<Interrupted>().is_some() => {
            eprintln!("{err}; progress saved, resume with `taskexec loop resume` or rerun the task");
            exit_code(exit_codes::INTERRUPTED)
        }
        Err(err) => {
            eprintln!("{err:#}");
            exit_code(exit_codes::ERROR)
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn run(cli: Cli) -> Result<i32> {
    let paths = WorkspacePaths::new(&cli.root);
    match cli.command {
        Command::Init { force } => cmd_init(&paths, force),
        Command::Run { task, files } => cmd_run(&paths, &task, &files),
        Command::Loop { command } => cmd_loop(&paths, command),
        Command::Cache { command } => cmd_cache(&paths, command),
        Command::Tasks { command } => cmd_tasks(&paths, command),
    }
}

fn cmd_init(paths: &WorkspacePaths, force: bool) -> Result<i32> {
    if paths.config_path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", paths.config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(&paths.config_path, &ExecutorConfig::default())?;
    println!("wrote {}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(paths: &WorkspacePaths, task: &str, files: &[String]) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    let provider = resolve_provider(paths, &config)?;
    let context = file_context(paths, &config);
    let cancel = CancelToken::new();
    cancel.register_sigint()?;

    let orchestrator = Orchestrator::new(paths.clone(), config, &provider, &context, cancel);
    let result = orchestrator.run(task, files)?;
    println!("{}", result.output);
    Ok(exit_codes::for_result(&result))
}

fn cmd_loop(paths: &WorkspacePaths, command: LoopCommand) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    match command {
        LoopCommand::Status => {
            let store = CheckpointStore::new(paths.loop_dir.clone());
            match store.load::<LoopCheckpoint>(LOOP_STATE_KEY) {
                Some(checkpoint) => print_json(&checkpoint)?,
                None => println!("no edit loop checkpoint"),
            }
            Ok(exit_codes::OK)
        }
        LoopCommand::Resume => {
            let provider = resolve_provider(paths, &config)?;
            let context = file_context(paths, &config);
            let cancel = CancelToken::new();
            cancel.register_sigint()?;
            let orchestrator = Orchestrator::new(paths.clone(), config, &provider, &context, cancel);
            let result = orchestrator.resume_loop()?;
            println!("{}", result.output);
            Ok(exit_codes::for_result(&result))
        }
        LoopCommand::Reset => {
            let removed = CheckpointStore::new(paths.loop_dir.clone())
                .delete(LOOP_STATE_KEY)?;
            println!("{}", if removed { "edit loop reset" } else { "no edit loop checkpoint" });
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_cache(paths: &WorkspacePaths, command: CacheCommand) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    let cache = ResponseCache::new(paths, config.cache_ttl(), config.tokens_saved_per_hit);
    match command {
        CacheCommand::Stats => print_json(&cache.stats())?,
        CacheCommand::Clear { older_than_hours } => {
            let removed = cache.clear(older_than_hours.map(|hours| Duration::from_secs(hours * 60 * 60)));
            println!("removed {removed} cache entr{}", if removed == 1 { "y" } else { "ies" });
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_tasks(paths: &WorkspacePaths, command: TasksCommand) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    let store = CheckpointStore::new(paths.tasks_dir.clone());
    match command {
        TasksCommand::List => {
            let tasks = store.list_resumable()?;
            if tasks.is_empty() {
                println!("no resumable tasks");
            }
            for task in tasks {
                println!(
                    "{}  {:<8} {}  {}",
                    task.task_id,
                    task.status.as_str(),
                    task.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    task.description
                );
            }
        }
        TasksCommand::Cleanup {
            max_age_days,
            max_count,
        } => {
            let max_age = max_age_days
                .map(|days| Duration::from_secs(days * 24 * 60 * 60))
                .unwrap_or_else(|| config.cleanup_max_age());
            let removed = store.cleanup(max_age, max_count.unwrap_or(config.cleanup_max_count))?;
            println!("removed {removed} task record(s)");
        }
    }
    Ok(exit_codes::OK)
}

fn resolve_provider(paths: &WorkspacePaths, config: &ExecutorConfig) -> Result<Box<dyn CompletionProvider>> {
    ProviderRegistry::with_builtins()
        .resolve(&config.provider, &paths.root)
        .context("resolve completion provider")
}

fn file_context(paths: &WorkspacePaths, config: &ExecutorConfig) -> FileContextBuilder {
    let cache = ResponseCache::new(paths, config.cache_ttl(), config.tokens_saved_per_hit);
    FileContextBuilder::new(paths.clone(), cache, config.file_content_limit)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serialize json")?);
    Ok(())
}

//! Command-line interface for the trigger engine.
//!
//! `check` validates a rules file and compiles every pattern; `replay` runs a
//! captured output file through the engine without performing any action.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aiterm_config::{MatchMode, TriggersConfig};
use clap::{Parser, Subcommand};

use crate::replay::{ReplayOptions, ReplaySummary, replay};
use crate::triggers::pattern::{self, CompiledPattern};

/// aiterm-triggers - output trigger automation for aiTerm sessions
#[derive(Parser)]
#[command(name = "aiterm-triggers")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set debug log level (overrides DEBUG_LEVEL)
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,
}

/// Log level argument for CLI
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogLevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevelArg {
    /// Convert to `log::LevelFilter`
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevelArg::Off => log::LevelFilter::Off,
            LogLevelArg::Error => log::LevelFilter::Error,
            LogLevelArg::Warn => log::LevelFilter::Warn,
            LogLevelArg::Info => log::LevelFilter::Info,
            LogLevelArg::Debug => log::LevelFilter::Debug,
            LogLevelArg::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the rules file and compile every pattern
    Check {
        /// Rules file (default: ~/.config/aiterm/triggers.yaml)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Feed a captured output file through the engine and print what would fire
    Replay {
        /// Raw PTY capture (e.g. from `script` or a session log)
        file: PathBuf,

        /// Rules file (default: ~/.config/aiterm/triggers.yaml)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Session id to replay as
        #[arg(long, default_value = "replay")]
        session: String,

        /// Workspace the session belongs to (for scoped triggers)
        #[arg(long)]
        workspace: Option<String>,

        /// Bytes per simulated read
        #[arg(long, default_value_t = 1024)]
        chunk_size: usize,

        /// Simulated milliseconds between reads
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,

        /// Suppress actions (as when restoring scrollback)
        #[arg(long)]
        suppress: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run a parsed command and return the process exit code.
pub fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Check { config } => {
            let config = load_config(config.as_deref())?;
            Ok(check(&config))
        }
        Commands::Replay {
            file,
            config,
            session,
            workspace,
            chunk_size,
            interval_ms,
            suppress,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            let file = expand_tilde(&file);
            let data = std::fs::read(&file)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
            let options = ReplayOptions {
                session_id: session,
                workspace_id: workspace,
                chunk_size,
                chunk_interval: Duration::from_millis(interval_ms),
                suppress,
            };
            let summary = replay(&config, &data, &options);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            Ok(0)
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TriggersConfig> {
    match path {
        Some(path) => Ok(TriggersConfig::load_from(&expand_tilde(path))?),
        None => TriggersConfig::load(),
    }
}

/// Print one line per rule; exit code 1 when any pattern does not compile.
fn check(config: &TriggersConfig) -> i32 {
    let mut invalid = 0;
    for trigger in &config.triggers {
        let state = if trigger.enabled { "" } else { " (disabled)" };
        match pattern::build(&trigger.pattern, trigger.mode) {
            Ok(CompiledPattern::Condition(condition)) => {
                let vars: Vec<&str> = condition.variables().into_iter().collect();
                println!(
                    "ok    {} [{}]{} reads: {}",
                    trigger.id,
                    trigger.mode.display_name(),
                    state,
                    vars.join(", ")
                );
            }
            Ok(_) => {
                let extra = if trigger.mode == MatchMode::PlainText {
                    format!(" -> /{}/", pattern::plain_text_to_regex(&trigger.pattern))
                } else {
                    String::new()
                };
                println!(
                    "ok    {} [{}]{}{}",
                    trigger.id,
                    trigger.mode.display_name(),
                    state,
                    extra
                );
            }
            Err(e) => {
                invalid += 1;
                println!(
                    "FAIL  {} [{}]{}: {}",
                    trigger.id,
                    trigger.mode.display_name(),
                    state,
                    e
                );
            }
        }
    }
    println!();
    println!(
        "{} trigger(s), {} invalid",
        config.triggers.len(),
        invalid
    );
    if invalid > 0 { 1 } else { 0 }
}

fn print_summary(summary: &ReplaySummary) {
    for event in &summary.events {
        for fired in &event.report.fired {
            match &fired.matched {
                Some(text) => println!(
                    "chunk {:>5} @{:<8} fired {} on {:?}",
                    event.chunk, event.offset, fired.trigger_id, text
                ),
                None => println!(
                    "chunk {:>5} @{:<8} fired {} (condition)",
                    event.chunk, event.offset, fired.trigger_id
                ),
            }
        }
        for held in &event.report.held {
            println!(
                "chunk {:>5} @{:<8} held  {} ({:?})",
                event.chunk, event.offset, held.trigger_id, held.reason
            );
        }
    }

    if !summary.actions.is_empty() {
        println!();
        println!("Actions:");
        for line in &summary.actions {
            println!("  {line}");
        }
    }

    if !summary.variables.is_empty() {
        println!();
        println!("Variables:");
        for (name, value) in &summary.variables {
            println!("  {name} = {value:?}");
        }
    }

    println!();
    println!(
        "{} chunk(s), {} fired, {} held back",
        summary.chunks,
        summary.fired_count(),
        summary.held_count()
    );
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

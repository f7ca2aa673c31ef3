//! Everyday CLI - daily habit tracking from the terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use everyday_core::{Routine, RoutineId, RoutineState, ScoreTier, SortedRoutines, PROGRESS_FULL};
use everyday_engine::{EverydayConfig, RoutineService, SystemClock};
use everyday_storage::JsonStorage;
use tracing::info;
use tracing_subscriber::EnvFilter;

const ROUTINES_FILE: &str = "routines.txt";
const SCORES_FILE: &str = "scores.txt";

#[derive(Parser)]
#[command(name = "everyday")]
#[command(about = "Build habits one day at a time", long_about = None)]
struct Cli {
    /// Data directory
    #[arg(long, global = true, default_value = ".everyday")]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new routine to the backlog
    Add {
        /// Routine label
        label: String,
    },
    /// List routines with today's weights
    List,
    /// Mark a current routine as done today
    Done {
        /// Routine ID
        id: String,
    },
    /// Take back today's completion
    Undo {
        /// Routine ID
        id: String,
    },
    /// Change a routine's label
    Rename {
        /// Routine ID
        id: String,
        /// New label
        label: String,
    },
    /// Delete a routine
    Delete {
        /// Routine ID
        id: String,
    },
    /// Pause a routine
    Pause {
        /// Routine ID
        id: String,
    },
    /// Resume a paused routine
    #[command(name = "continue")]
    Continue {
        /// Routine ID
        id: String,
    },
    /// Advance days starting now, ignoring the calendar
    Advance {
        /// Number of days to advance
        #[arg(long, default_value = "1")]
        days: u32,
    },
    /// Advance every day missed since the last run
    CatchUp,
    /// Show today's score so far
    Score,
    /// Show the score history by day
    Scores,
    /// Export routines and scores into a directory
    Export {
        /// Target directory
        dir: PathBuf,
    },
    /// Import routines and scores from a directory
    Import {
        /// Source directory
        dir: PathBuf,
    },
    /// Print a reminder if today's routines are still open
    Remind,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Open storage and configuration
    let storage = JsonStorage::new(&cli.data).await?;
    let config = EverydayConfig::load_or_init(&cli.data).await?;
    let service = RoutineService::new(storage, Arc::new(SystemClock), &config)?;

    match cli.command {
        Commands::Add { label } => {
            let routine = service.add_routine(&label).await?;
            println!("Added routine: {} - {} ({})", routine.id, routine.label, routine.state);
        }
        Commands::List => {
            let sorted = SortedRoutines::from_routines(service.list_routines().await?);
            for (state, routines) in [
                (RoutineState::Current, &sorted.current),
                (RoutineState::Backlog, &sorted.backlog),
                (RoutineState::Learned, &sorted.learned),
                (RoutineState::Paused, &sorted.paused),
            ] {
                if routines.is_empty() {
                    continue;
                }
                println!("{} ({})", state, routines.len());
                for routine in routines {
                    print_routine(routine);
                }
            }
        }
        Commands::Done { id } => {
            let routine = service.complete_routine(parse_id(&id)?).await?;
            println!("Done: {}", routine.label);
        }
        Commands::Undo { id } => {
            let routine = service.undo_routine(parse_id(&id)?).await?;
            println!("Undone: {}", routine.label);
        }
        Commands::Rename { id, label } => {
            let routine = service.rename_routine(parse_id(&id)?, &label).await?;
            println!("Renamed: {} - {}", routine.id, routine.label);
        }
        Commands::Delete { id } => {
            let id = parse_id(&id)?;
            service.delete_routine(id).await?;
            println!("Deleted routine {}", id);
        }
        Commands::Pause { id } => {
            let routine = service.pause_routine(parse_id(&id)?).await?;
            println!("Paused: {}", routine.label);
        }
        Commands::Continue { id } => {
            let routine = service.continue_routine(parse_id(&id)?).await?;
            println!("Continued: {} ({})", routine.label, routine.state);
        }
        Commands::Advance { days } => {
            let outcomes = service.advance(days, chrono::Utc::now()).await?;
            for outcome in &outcomes {
                println!(
                    "{}: score {:.1} ({})",
                    outcome.score.timestamp.format("%Y-%m-%d"),
                    outcome.score.score,
                    outcome.score.tier()
                );
            }
        }
        Commands::CatchUp => {
            let outcomes = service.catch_up().await?;
            info!("Caught up {} day(s)", outcomes.len());
            println!("Advanced {} day(s)", outcomes.len());
        }
        Commands::Score => {
            let score = service.current_score().await?;
            println!("Today: {:.1} ({})", score, ScoreTier::from_score(score));
        }
        Commands::Scores => {
            for (date, score) in service.daily_scores().await? {
                println!("  {} | {:>4.1} | {}", date, score, ScoreTier::from_score(score));
            }
        }
        Commands::Export { dir } => {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
            write_file(&dir.join(ROUTINES_FILE), &service.export_routines().await?).await?;
            write_file(&dir.join(SCORES_FILE), &service.export_scores().await?).await?;
            println!("Exported to {}", dir.display());
        }
        Commands::Import { dir } => {
            let routines = read_file(&dir.join(ROUTINES_FILE)).await?;
            let scores_path = dir.join(SCORES_FILE);
            let scores = if scores_path.exists() {
                Some(read_file(&scores_path).await?)
            } else {
                None
            };
            let (routines, scores) = service.import_all(&routines, scores.as_deref()).await?;
            println!("Imported {} routine(s) and {} score record(s)", routines, scores);
        }
        Commands::Remind => {
            if service.reminder_due().await {
                println!("Your routines are waiting for you today.");
            }
        }
    }

    Ok(())
}

fn parse_id(id: &str) -> Result<RoutineId> {
    id.parse().map_err(|_| anyhow::anyhow!("Invalid routine ID: {}", id))
}

fn print_routine(routine: &Routine) {
    println!(
        "  {} | {:>2}/{} | {:>4.1} | {}{}",
        routine.id,
        routine.full_progress(),
        PROGRESS_FULL,
        routine.current_score,
        routine.label,
        if routine.finished_today { " ✓" } else { "" }
    );
}

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn write_file(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

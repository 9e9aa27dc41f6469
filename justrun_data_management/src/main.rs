use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use justrun_data_management::{default_data_dir, DataManager};
use justrun_lib::tracking_session::{format_duration, format_pace, pace_min_per_km};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Manual operations on the stored jog data
#[derive(Parser)]
struct Cli {
    /// Data directory, defaults to data/ under the project root
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List jogs, newest first
    Jogs,
    /// Show daily stats for the last days
    Stats {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Show the current streak
    Streak,
    /// Export a jog as GPX
    Export {
        jog_id: i64,
        out: PathBuf,
    },
    /// Delete a jog
    Delete {
        jog_id: i64,
    },
}

// CLI for manual data operations
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let data_manager = DataManager::open(&data_dir).await?;
    let today = Utc::now().date_naive();

    match cli.command {
        Command::Jogs => {
            for jog in data_manager.get_jogs(&cli.user).await? {
                println!(
                    "#{:<5} {}  {:>7.2} km  {:>8}  {:>6} steps  {} min/km",
                    jog.jog_id,
                    jog.created_at.format("%Y-%m-%d %H:%M"),
                    jog.distance_km,
                    format_duration(jog.duration_seconds),
                    jog.steps,
                    format_pace(pace_min_per_km(jog.duration_seconds, jog.distance_km)),
                );
            }

            let totals = data_manager.jog_totals(&cli.user).await?;
            println!("{} jogs, {:.2} km, {} steps", totals.total_jogs, totals.total_distance_km, totals.total_steps);
        }
        Command::Stats { days } => {
            for stat in data_manager.get_daily_stats(&cli.user, days, today).await? {
                println!("{}  {:>7.2} km  {:>6} steps  {} jogs", stat.date, stat.distance_km, stat.steps, stat.jogs_count);
            }
        }
        Command::Streak => {
            println!("{} day streak", data_manager.current_streak(&cli.user, today).await?);
        }
        Command::Export { jog_id, out } => {
            data_manager.export_jog_gpx(jog_id, &out).await?;
        }
        Command::Delete { jog_id } => {
            if data_manager.delete_jog(jog_id).await? {
                tracing::info!("Deleted jog {}", jog_id);
            } else {
                tracing::warn!("No jog with id {}", jog_id);
            }
        }
    }

    Ok(())
}

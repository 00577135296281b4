//! run_log - inspect and verify the append-only run log
//!
//! Each completed run appends one hash-chained row (date, time, total vehicles,
//! signal time). `verify` recomputes the chain without trusting the daemon.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;

use signal_kernel::{RunLogStore, SqliteRunLogStore};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "run_log", about = "List and verify signal run-log entries")]
struct Args {
    /// Path to the run-log SQLite DB
    #[arg(long, env = "SIGNAL_DB_PATH", default_value = "signal.db")]
    db: String,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the most recent runs, oldest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Verify the hash chain over every entry
    Verify {
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let store = {
        let _stage = ui.stage("Open run log");
        SqliteRunLogStore::open(&args.db)?
    };

    match args.command {
        Command::List { limit, json } => {
            let entries = store.entries(limit)?;
            if json {
                for entry in &entries {
                    println!("{}", serde_json::to_string(&entry.row)?);
                }
                return Ok(());
            }
            println!(
                "{:>5}  {:<10}  {:<8}  {:<20}  {:>14}  {:>13}",
                "id", "date", "time", "approach", "total_vehicles", "signal_time_s"
            );
            for entry in &entries {
                let row = &entry.row;
                println!(
                    "{:>5}  {:<10}  {:<8}  {:<20}  {:>14}  {:>13}",
                    entry.id, row.date, row.time, row.approach_id, row.total_vehicles, row.signal_time_s
                );
            }
            if entries.is_empty() {
                println!("(no runs recorded in {})", args.db);
            }
        }
        Command::Verify { verbose } => {
            let count = {
                let _stage = ui.stage("Verify run log chain");
                store.verify()?
            };
            if verbose {
                for entry in store.entries(usize::MAX)? {
                    println!(
                        "  run {}: hash={} OK",
                        entry.id,
                        &hex::encode(entry.entry_hash)[..16]
                    );
                }
            }
            println!("verified {} run-log entries", count);
            println!("OK: chain verified.");
        }
    }
    Ok(())
}

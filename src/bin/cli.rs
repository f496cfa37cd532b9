//! lendkeeper CLI
//!
//! Command-line front end for the lending engine.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use lendkeeper::storage::format_timestamp;
use lendkeeper::{Config, Item, LendError, LendingEngine, LoanRecord, SyncStrategy};

/// lendkeeper CLI
#[derive(Parser, Debug)]
#[command(name = "lendkeeper")]
#[command(about = "Track lendable items and who currently holds them")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./lendkeeper_data")]
    data_dir: String,

    /// Skip fsync after each save
    #[arg(long)]
    no_fsync: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a new item
    Add {
        /// Unique identifier
        id: String,

        /// Title
        title: String,

        /// Author or other attribution
        attribution: String,
    },

    /// Remove an item (drops its active loan, keeps returned loans)
    Remove {
        /// Identifier of the item
        id: String,
    },

    /// Change title and/or attribution
    Update {
        /// Identifier of the item
        id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// New attribution
        #[arg(short, long)]
        attribution: Option<String>,
    },

    /// Show one item
    Show {
        /// Identifier of the item
        id: String,
    },

    /// Search titles and attributions (case-insensitive)
    Search {
        /// Text to look for
        query: String,
    },

    /// Lend an item
    Borrow {
        /// Identifier of the item
        id: String,

        /// Name of the borrower
        holder: String,
    },

    /// Take back a lent item
    Return {
        /// Identifier of the item
        id: String,
    },

    /// List items
    List {
        /// Only items that can be borrowed
        #[arg(long, conflicts_with = "on_loan")]
        available: bool,

        /// Only items currently lent out
        #[arg(long)]
        on_loan: bool,
    },

    /// Show loan records, oldest first
    History {
        /// Only records for this item
        #[arg(short, long)]
        item: Option<String>,
    },
}

fn main() -> ExitCode {
    // Initialize tracing/logging (stderr, so stdout carries only results)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lendkeeper=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let sync_strategy = if args.no_fsync {
        SyncStrategy::OsBuffered
    } else {
        SyncStrategy::EveryWrite
    };

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .sync_strategy(sync_strategy)
        .build();

    let mut engine = match LendingEngine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open lending data: {}", e);
            return ExitCode::from(2);
        }
    };

    let outcome = run(&mut engine, args.command, args.json);

    if let Err(e) = engine.close() {
        tracing::error!("Failed to save on shutdown: {}", e);
        return ExitCode::from(2);
    }

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_rejection() => {
            eprintln!("{}", e);
            ExitCode::from(1)
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(2)
        }
    }
}

fn run(engine: &mut LendingEngine, command: Commands, json: bool) -> Result<(), LendError> {
    match command {
        Commands::Add {
            id,
            title,
            attribution,
        } => {
            engine.add_item(&id, &title, &attribution)?;
            println!("Added {}", id);
        }
        Commands::Remove { id } => {
            let dropped = engine.remove_item(&id)?;
            println!("Removed {}", id);
            if dropped > 0 {
                println!("Discarded {} active loan record(s)", dropped);
            }
        }
        Commands::Update {
            id,
            title,
            attribution,
        } => {
            engine.update_item(&id, title.as_deref(), attribution.as_deref())?;
            println!("Updated {}", id);
        }
        Commands::Show { id } => {
            let item = engine.find(&id)?;
            print_items(std::slice::from_ref(&item), json);
        }
        Commands::Search { query } => {
            print_items(&engine.search(&query), json);
        }
        Commands::Borrow { id, holder } => {
            let record = engine.borrow(&id, &holder)?;
            println!(
                "{} lent to {} at {}",
                id,
                holder,
                format_timestamp(record.borrowed_at())
            );
        }
        Commands::Return { id } => {
            match engine.return_item(&id)? {
                Some(record) => println!("{} returned by {}", id, record.holder()),
                None => println!("{} returned", id),
            }
        }
        Commands::List { available, on_loan } => {
            let items = if available {
                engine.list_available()
            } else if on_loan {
                engine.list_on_loan()
            } else {
                engine.list_all()
            };
            print_items(&items, json);
        }
        Commands::History { item } => {
            let records = match item {
                Some(id) => engine.history_for(&id),
                None => engine.history(),
            };
            print_records(&records, json);
        }
    }
    Ok(())
}

// =============================================================================
// Output
// =============================================================================

fn print_items(items: &[Item], json: bool) {
    if json {
        print_json(items);
        return;
    }
    if items.is_empty() {
        println!("No items");
        return;
    }
    for item in items {
        match item.holder() {
            Some(holder) => println!(
                "{}  {}  by {}  [on loan to {}]",
                item.id(),
                item.title(),
                item.attribution(),
                holder
            ),
            None => println!(
                "{}  {}  by {}  [available]",
                item.id(),
                item.title(),
                item.attribution()
            ),
        }
    }
}

fn print_records(records: &[LoanRecord], json: bool) {
    if json {
        print_json(records);
        return;
    }
    if records.is_empty() {
        println!("No loan records");
        return;
    }
    for record in records {
        let returned = record
            .returned_at()
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {}  borrowed {}  returned {}",
            record.record_id(),
            record.item_id(),
            record.holder(),
            format_timestamp(record.borrowed_at()),
            returned
        );
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => tracing::error!("Failed to encode JSON: {}", e),
    }
}

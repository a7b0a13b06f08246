mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use crate::commands::{
    AddArgs, UpdateArgs, cmd_backup_export, cmd_backup_import, cmd_expiring, cmd_food_type_add,
    cmd_food_type_delete, cmd_food_type_list, cmd_item_add, cmd_item_consume, cmd_item_delete,
    cmd_item_list, cmd_item_open, cmd_item_show, cmd_item_update, cmd_profile_add,
    cmd_profile_delete, cmd_profile_list, cmd_settings_set, cmd_settings_show,
};
use crate::config::Config;
use larder_core::service::LarderService;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "Keep track of what is in the fridge, freezer and pantry, and when it goes off"
)]
struct Cli {
    /// Print debug logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add, list and edit tracked items
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },
    /// List items that are expired or expire soon
    Expiring {
        /// Look this many days ahead (default: the notify-days-before setting)
        #[arg(short, long)]
        days: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Manage household profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Manage custom food types
    FoodType {
        #[command(subcommand)]
        command: FoodTypeCommands,
    },
    /// Export the whole store to a snapshot, or import one back
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
}

#[derive(Subcommand)]
enum ItemCommands {
    /// Add an item
    Add(AddArgs),
    /// List items, soonest to expire first
    List {
        /// Only items in this place: fridge, freezer, pantry
        #[arg(short, long)]
        category: Option<String>,
        /// Include consumed items
        #[arg(short, long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one item in detail
    Show {
        /// Item ID or unique prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change fields of an item
    Update(UpdateArgs),
    /// Mark an item as opened (starts the opened shelf life)
    Open {
        /// Item ID or unique prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an item as used up
    Consume {
        /// Item ID or unique prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an item and its image
    Delete {
        /// Item ID or unique prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change one setting (e.g. `notify-days-before 3`, `appearance dark`)
    Set {
        /// Setting name
        key: String,
        /// New value
        value: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Add a profile
    Add {
        /// Display name
        name: String,
        /// Number of people in the household
        #[arg(long, default_value = "1")]
        household: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List profiles
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a profile by ID
    Delete {
        /// Profile ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FoodTypeCommands {
    /// Add a custom food type
    Add {
        /// Food type name
        name: String,
        /// Emoji shown next to the name
        #[arg(long)]
        emoji: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List custom food types
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a custom food type by ID
    Delete {
        /// Food type ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Write a snapshot of every item, setting and profile
    Export {
        /// Snapshot file to write (default: print to stdout)
        file: Option<PathBuf>,
        /// Output a JSON summary instead of text (when writing to a file)
        #[arg(long)]
        json: bool,
    },
    /// Reconcile a snapshot file into the local store
    Import {
        /// Snapshot file to read
        file: PathBuf,
        /// merge (keep local items, take newer edits) or replace (wipe first)
        #[arg(short, long, default_value = "merge")]
        strategy: String,
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("larder={level},larder_core={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    tracing::debug!(db = %config.db_path.display(), "opening store");
    let svc = LarderService::new(&config.db_path.to_string_lossy())?;

    match cli.command {
        Commands::Item { command } => match command {
            ItemCommands::Add(args) => cmd_item_add(&svc, &args),
            ItemCommands::List {
                category,
                all,
                json,
            } => cmd_item_list(&svc, category.as_deref(), all, json),
            ItemCommands::Show { id, json } => cmd_item_show(&svc, &id, json),
            ItemCommands::Update(args) => cmd_item_update(&svc, &args),
            ItemCommands::Open { id, json } => cmd_item_open(&svc, &id, json),
            ItemCommands::Consume { id, json } => cmd_item_consume(&svc, &id, json),
            ItemCommands::Delete { id, json } => cmd_item_delete(&svc, &id, json),
        },
        Commands::Expiring { days, json } => cmd_expiring(&svc, days, json),
        Commands::Settings { command } => match command {
            SettingsCommands::Show { json } => cmd_settings_show(&svc, json),
            SettingsCommands::Set { key, value, json } => {
                cmd_settings_set(&svc, &key, &value, json)
            }
        },
        Commands::Profile { command } => match command {
            ProfileCommands::Add {
                name,
                household,
                json,
            } => cmd_profile_add(&svc, &name, household, json),
            ProfileCommands::List { json } => cmd_profile_list(&svc, json),
            ProfileCommands::Delete { id, json } => cmd_profile_delete(&svc, &id, json),
        },
        Commands::FoodType { command } => match command {
            FoodTypeCommands::Add { name, emoji, json } => {
                cmd_food_type_add(&svc, &name, emoji.as_deref(), json)
            }
            FoodTypeCommands::List { json } => cmd_food_type_list(&svc, json),
            FoodTypeCommands::Delete { id, json } => cmd_food_type_delete(&svc, &id, json),
        },
        Commands::Backup { command } => match command {
            BackupCommands::Export { file, json } => {
                cmd_backup_export(&svc, file.as_deref(), json)
            }
            BackupCommands::Import {
                file,
                strategy,
                dry_run,
                json,
            } => cmd_backup_import(&svc, &file, &strategy, dry_run, json),
        },
    }
}

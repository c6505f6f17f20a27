//! Corner Shop CLI - Store inspection and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Show which backend is in use and how many records each collection holds
//! cs-cli status
//!
//! # Dump a collection
//! cs-cli list orders
//!
//! # Report settings that are invalid and fall back to defaults
//! cs-cli settings check
//!
//! # Change a setting (value is JSON)
//! cs-cli settings set free_delivery_threshold '"50000"'
//!
//! # Move an order along; unusual changes need --yes
//! cs-cli orders set-status ORD-1A2B3C shipped
//! cs-cli orders set-status ORD-1A2B3C pending --yes
//!
//! # Drop expired verification codes
//! cs-cli codes prune
//! ```
//!
//! Configuration is read from the environment (and `.env`), see
//! `corner_shop_store::config`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use corner_shop_core::{OrderId, OrderStatus};
use corner_shop_store::Collection;

mod commands;

#[derive(Parser)]
#[command(name = "cs-cli")]
#[command(author, version, about = "Corner Shop CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the selected backend and collection sizes
    Status,
    /// Print every record of a collection as JSON
    List {
        /// Collection name (products, orders, subscribers, messages, users, codes, settings)
        collection: Collection,
    },
    /// Inspect or change store settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Manage orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
    /// Manage verification codes
    Codes {
        #[command(subcommand)]
        action: CodesAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Report settings that fail validation
    Check,
    /// Set one setting to a JSON value
    Set {
        /// Setting key
        key: String,
        /// JSON value, e.g. '"Corner Shop"' or '[]'
        value: String,
    },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List orders, newest first
    List {
        /// Only orders with this status
        #[arg(short, long)]
        status: Option<OrderStatus>,
    },
    /// Change the status of an order
    SetStatus {
        /// Order id
        id: String,
        /// New status (pending, processing, shipped, delivered, cancelled)
        status: OrderStatus,
        /// Confirm a reopen, cancellation or override
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CodesAction {
    /// Delete expired verification codes
    Prune,
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    let state = commands::connect().await?;

    match cli.command {
        Commands::Status => commands::store::status(&state).await,
        Commands::List { collection } => commands::store::list(&state, collection).await?,
        Commands::Settings { action } => match action {
            SettingsAction::Check => commands::settings::check(&state).await,
            SettingsAction::Set { key, value } => {
                commands::settings::set(&state, &key, &value).await?;
            }
        },
        Commands::Orders { action } => match action {
            OrdersAction::List { status } => commands::orders::list(&state, status).await,
            OrdersAction::SetStatus { id, status, yes } => {
                commands::orders::set_status(&state, &OrderId::new(id), status, yes).await?;
            }
        },
        Commands::Codes { action } => match action {
            CodesAction::Prune => commands::codes::prune(&state).await?,
        },
    }
    Ok(())
}

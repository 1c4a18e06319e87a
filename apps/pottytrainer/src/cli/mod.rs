//! # Potty Trainer CLI Module
//!
//! This module implements the CLI interface for Potty Trainer.
//!
//! ## Available Commands
//!
//! - `serve` - Start the HTTP server
//! - `init` - Provision every table and print its physical name
//! - `status` - Show per-table row counts
//! - `user create` - Create a user
//! - `token issue|revoke|list` - Manage API tokens
//! - `resolve` - Print the effective foods of one food

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand};
use pottytrainer_core::PottyError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Potty Trainer - food and bowel journal
///
/// Records what you ate and how it came out, and resolves every food into
/// the ingredients it is made of.
#[derive(Parser, Debug)]
#[command(name = "pottytrainer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the journal database (overrides config and POTTY_DATABASE)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Table namespace prefix (overrides config and POTTY_TABLE_PREFIX)
    #[arg(long, global = true)]
    pub table_prefix: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Provision every table and print its physical name
    Init,

    /// Show per-table row counts
    Status,

    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage API tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Print every food effectively eaten when a food is eaten
    Resolve {
        /// Owning user id
        #[arg(short, long)]
        user: String,

        /// Food id to resolve
        #[arg(short, long)]
        food: String,
    },
}

/// `user` subcommands.
#[derive(Subcommand, Debug)]
pub enum UserAction {
    /// Create a user with no tokens
    Create,
}

/// `token` subcommands.
#[derive(Subcommand, Debug)]
pub enum TokenAction {
    /// Issue a new token for a user
    Issue {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Token lifetime in days (0 = never expires; default from config)
        #[arg(long)]
        ttl_days: Option<u32>,
    },

    /// Revoke a token by its row id
    Revoke {
        /// Token row id (not the credential)
        #[arg(long)]
        id: String,
    },

    /// List a user's tokens
    List {
        /// User id
        #[arg(short, long)]
        user: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

impl Cli {
    /// Resolve the layered configuration: file, environment, then flags.
    pub fn config(&self) -> Result<Config, PottyError> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(database) = &self.database {
            config.database.clone_from(database);
        }
        if let Some(prefix) = &self.table_prefix {
            config.table_prefix.clone_from(prefix);
        }
        Ok(config)
    }
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), PottyError> {
    let config = cli.config()?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Serve { host, port }) => cmd_serve(&config, &host, port).await,
        Some(Commands::Init) => cmd_init(&config, json_mode),
        Some(Commands::User {
            action: UserAction::Create,
        }) => cmd_user_create(&config, json_mode),
        Some(Commands::Token { action }) => match action {
            TokenAction::Issue { user, ttl_days } => {
                cmd_token_issue(&config, json_mode, &user, ttl_days)
            }
            TokenAction::Revoke { id } => cmd_token_revoke(&config, json_mode, &id),
            TokenAction::List { user } => cmd_token_list(&config, json_mode, &user),
        },
        Some(Commands::Resolve { user, food }) => cmd_resolve(&config, json_mode, &user, &food),
        Some(Commands::Status) | None => {
            // No subcommand - show status by default
            cmd_status(&config, json_mode)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

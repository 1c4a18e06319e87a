//! # Potty Trainer - Food and Bowel Journal Server
//!
//! The main binary for Potty Trainer.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for provisioning, tokens and graph inspection
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                apps/pottytrainer (THE BINARY)            │
//! │                                                          │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐   │
//! │  │   CLI       │    │   HTTP API  │    │   Config    │   │
//! │  │  (clap)     │    │   (axum)    │    │ (toml/env)  │   │
//! │  └──────┬──────┘    └──────┬──────┘    └──────┬──────┘   │
//! │         │                  │                  │          │
//! │         └──────────────────┼──────────────────┘          │
//! │                            ▼                             │
//! │                 ┌────────────────────┐                   │
//! │                 │ pottytrainer-core  │                   │
//! │                 │   (THE JOURNAL)    │                   │
//! │                 └────────────────────┘                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! pottytrainer serve --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! pottytrainer init
//! pottytrainer user create
//! pottytrainer token issue --user <user id>
//! pottytrainer resolve --user <user id> --food <food id>
//! ```

use clap::Parser;
use pottytrainer::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // POTTY_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("POTTY_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "pottytrainer=info,pottytrainer_core=info,tower_http=debug".into()
    });

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  ___      _   _          _____         _
 | _ \___ | |_| |_ _  _  |_   _| _ __ _(_)_ _  ___ _ _
 |  _/ _ \|  _|  _| || |   | || '_/ _` | | ' \/ -_) '_|
 |_| \___/ \__|\__|\_, |   |_||_| \__,_|_|_||_\___|_|
                   |__/

  Food and Bowel Journal v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}

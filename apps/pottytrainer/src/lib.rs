//! # pottytrainer
//!
//! The Potty Trainer binary as a library: HTTP API, CLI, and configuration.
//! `main.rs` is a thin entry point over [`cli::execute`]; the integration
//! tests drive [`api::create_router`] directly.

pub mod api;
pub mod cli;
pub mod config;

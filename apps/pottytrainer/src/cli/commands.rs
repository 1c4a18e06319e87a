//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//! Every command opens the backend itself; there is no deadline on CLI work.

use crate::api::{self, AppState};
use crate::config::{Config, ttl_from_days};
use pottytrainer_core::{
    ApiToken, Backend, Eat, ExternalIdentity, Food, FoodId, FoodName, Ingredient, OpContext, Poop,
    PottyError, Record, TokenId, User, UserId,
};
use std::sync::Arc;

fn open_backend(config: &Config, ctx: &OpContext) -> Result<Backend, PottyError> {
    Backend::open(&config.database, &config.namespace()?, ctx)
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn token_json(token: &ApiToken) -> serde_json::Value {
    serde_json::json!({
        "id": token.id,
        "user_id": token.user_id,
        "token": token.token,
        "expires_at": token.expires_at,
        "revoked_at": token.revoked_at,
        "created_at": token.created_at,
    })
}

// =============================================================================
// SERVE COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_serve(config: &Config, host: &str, port: u16) -> Result<(), PottyError> {
    let backend = open_backend(config, &OpContext::background())?;

    println!("Potty Trainer Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:      {}", host);
    println!("  Port:      {}", port);
    println!("  Database:  {:?}", config.database);
    println!("  Namespace: {}", config.namespace()?.as_str());
    println!("  Timeout:   {} ms", config.request_timeout_ms);
    println!();
    println!("Endpoints:");
    println!("  GET  /health              - Health check");
    println!("  POST /signin/external     - Exchange an identity token for an API token");
    println!("  POST /api/v1/eat          - Log an eat");
    println!("  POST /api/v1/poop         - Log a poop");
    println!("  GET  /api/v1/eats|poops   - List events");
    println!("  POST /api/v1/foods        - Create or find a food");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let state = AppState::new(Arc::new(backend), config);
    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, state).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Provision every table and report what was created.
pub fn cmd_init(config: &Config, json_mode: bool) -> Result<(), PottyError> {
    let backend = open_backend(config, &OpContext::background())?;
    let tables: Vec<_> = backend.repository().tables().collect();

    if json_mode {
        let output: Vec<serde_json::Value> = tables
            .iter()
            .map(|table| {
                let indexes: Vec<&str> = table
                    .schema()
                    .indexes
                    .iter()
                    .filter_map(|index| table.index_table_name(index))
                    .collect();
                serde_json::json!({
                    "table": table.physical_name(),
                    "indexes": indexes,
                    "created": table.created(),
                })
            })
            .collect();
        print_json(&serde_json::Value::Array(output));
        return Ok(());
    }

    println!("Initialized {:?}", config.database);
    for table in tables {
        let state = if table.created() { "created" } else { "exists" };
        println!("  {:<40} {}", table.physical_name(), state);
        for index in table.schema().indexes {
            if let Some(name) = table.index_table_name(index) {
                println!("    {}", name);
            }
        }
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show row counts for every table.
pub fn cmd_status(config: &Config, json_mode: bool) -> Result<(), PottyError> {
    let ctx = OpContext::background();
    let backend = open_backend(config, &ctx)?;
    let repo = backend.repository();

    let counts = [
        (User::KIND, repo.count::<User>(&ctx)?),
        (ApiToken::KIND, repo.count::<ApiToken>(&ctx)?),
        (Eat::KIND, repo.count::<Eat>(&ctx)?),
        (Poop::KIND, repo.count::<Poop>(&ctx)?),
        (Food::KIND, repo.count::<Food>(&ctx)?),
        (FoodName::KIND, repo.count::<FoodName>(&ctx)?),
        (Ingredient::KIND, repo.count::<Ingredient>(&ctx)?),
        (ExternalIdentity::KIND, repo.count::<ExternalIdentity>(&ctx)?),
    ];

    if json_mode {
        let rows: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(kind, count)| ((*kind).to_string(), serde_json::Value::from(*count)))
            .collect();
        print_json(&serde_json::json!({
            "database": config.database.to_string_lossy(),
            "namespace": config.namespace()?.as_str(),
            "counts": rows,
        }));
        return Ok(());
    }

    println!("Potty Trainer Status");
    println!("====================");
    println!("Database:  {:?}", config.database);
    println!("Namespace: {}", config.namespace()?.as_str());
    println!();
    for (kind, count) in counts {
        println!("{:<18} {}", format!("{kind}:"), count);
    }
    Ok(())
}

// =============================================================================
// USER / TOKEN COMMANDS
// =============================================================================

/// Create a user.
pub fn cmd_user_create(config: &Config, json_mode: bool) -> Result<(), PottyError> {
    let ctx = OpContext::background();
    let backend = open_backend(config, &ctx)?;
    let user = backend.identity().create_user(&ctx)?;

    if json_mode {
        print_json(&serde_json::json!({ "user_id": user.id }));
    } else {
        println!("Created user {}", user.id);
    }
    Ok(())
}

/// Issue a token. `ttl_days` overrides the configured lifetime.
pub fn cmd_token_issue(
    config: &Config,
    json_mode: bool,
    user: &str,
    ttl_days: Option<u32>,
) -> Result<(), PottyError> {
    let ctx = OpContext::background();
    let backend = open_backend(config, &ctx)?;
    let ttl = ttl_days.map_or_else(|| config.token_ttl(), ttl_from_days);
    let token = backend
        .identity()
        .issue_token(&ctx, &UserId::new(user), ttl)?;

    if json_mode {
        print_json(&token_json(&token));
        return Ok(());
    }

    println!("Issued token {} for user {}", token.id, token.user_id);
    println!("  Credential: {}", token.token);
    match token.expires_at {
        Some(at) => println!("  Expires:    {}", at.to_rfc3339()),
        None => println!("  Expires:    never"),
    }
    Ok(())
}

/// Revoke a token by row id.
pub fn cmd_token_revoke(config: &Config, json_mode: bool, id: &str) -> Result<(), PottyError> {
    let ctx = OpContext::background();
    let backend = open_backend(config, &ctx)?;
    let token = backend.identity().revoke_token(&ctx, &TokenId::new(id))?;

    if json_mode {
        print_json(&token_json(&token));
    } else {
        println!("Revoked token {}", token.id);
    }
    Ok(())
}

/// List a user's tokens, revoked ones included.
pub fn cmd_token_list(config: &Config, json_mode: bool, user: &str) -> Result<(), PottyError> {
    let ctx = OpContext::background();
    let backend = open_backend(config, &ctx)?;
    let mut tokens = backend
        .identity()
        .tokens_for_user(&ctx, &UserId::new(user))?;
    tokens.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    if json_mode {
        print_json(&serde_json::Value::Array(
            tokens.iter().map(token_json).collect(),
        ));
        return Ok(());
    }

    if tokens.is_empty() {
        println!("No tokens for user {}", user);
    }
    for token in tokens {
        let state = if token.revoked_at.is_some() {
            "revoked".to_string()
        } else {
            token
                .expires_at
                .map(|at| format!("expires {}", at.to_rfc3339()))
                .unwrap_or_else(|| "never expires".to_string())
        };
        println!("  {}  {}", token.id, state);
    }
    Ok(())
}

// =============================================================================
// RESOLVE COMMAND
// =============================================================================

/// Print the effective foods of one food with their names.
pub fn cmd_resolve(
    config: &Config,
    json_mode: bool,
    user: &str,
    food: &str,
) -> Result<(), PottyError> {
    let ctx = OpContext::background();
    let backend = open_backend(config, &ctx)?;
    let user = UserId::new(user);
    let resolved = backend
        .graph()
        .resolve(&ctx, &user, &FoodId::new(food))?;

    let mut rows = Vec::with_capacity(resolved.len());
    for food_id in resolved {
        let names: Vec<String> = backend
            .cupboard()
            .names(&ctx, &user, &food_id)?
            .into_iter()
            .map(|name| name.name)
            .collect();
        rows.push((food_id, names));
    }

    if json_mode {
        let output: Vec<serde_json::Value> = rows
            .iter()
            .map(|(id, names)| serde_json::json!({ "food_id": id, "names": names }))
            .collect();
        print_json(&serde_json::Value::Array(output));
        return Ok(());
    }

    println!("Effective foods of {} ({}):", food, rows.len());
    for (id, names) in rows {
        println!("  {}  {}", id, names.join(", "));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API and the mapping
//! from core errors to HTTP statuses.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use pottytrainer_core::{
    Eat, EatEntry, EatId, ErrorKind, FoodId, FoodName, Ingredient, Poop, PoopEntry, PoopId,
    PottyError, SignIn,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// SIGN-IN
// =============================================================================

/// Assertion from a third-party identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSignInRequest {
    pub identity_token: String,
}

/// A freshly issued API token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInResponse {
    pub user_id: String,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub new_user: bool,
}

impl From<SignIn> for SignInResponse {
    fn from(sign_in: SignIn) -> Self {
        Self {
            user_id: sign_in.user.id.to_string(),
            token: sign_in.token.token,
            expires_at: sign_in.token.expires_at,
            new_user: sign_in.new_user,
        }
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Eat submission. `ate_at` defaults to the time of the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EatRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub food_id: Option<String>,
    #[serde(default)]
    pub food_text: Option<String>,
    #[serde(default)]
    pub ate_at: Option<DateTime<Utc>>,
}

impl EatRequest {
    /// Convert to a journal entry, stamping a missing `ate_at` with `now`.
    pub fn into_entry(self, now: DateTime<Utc>) -> EatEntry {
        EatEntry {
            id: self.id.map(EatId::new),
            food_id: self.food_id.map(FoodId::new),
            food_text: self.food_text,
            ate_at: self.ate_at.unwrap_or(now),
        }
    }
}

/// Poop submission. `pooped_at` defaults to the time of the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoopRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub pooped_at: Option<DateTime<Utc>>,
    pub quality: i64,
}

impl PoopRequest {
    /// Convert to a journal entry, stamping a missing `pooped_at` with `now`.
    pub fn into_entry(self, now: DateTime<Utc>) -> PoopEntry {
        PoopEntry {
            id: self.id.map(PoopId::new),
            pooped_at: self.pooped_at.unwrap_or(now),
            quality: self.quality,
        }
    }
}

/// A stored eat event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EatJson {
    pub id: String,
    pub food_id: String,
    pub food_text: String,
    pub ate_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Eat> for EatJson {
    fn from(eat: Eat) -> Self {
        Self {
            id: eat.id.to_string(),
            food_id: eat.food_id.to_string(),
            food_text: eat.food_text,
            ate_at: eat.ate_at,
            created_at: eat.created_at,
            updated_at: eat.updated_at,
        }
    }
}

/// A stored poop event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoopJson {
    pub id: String,
    pub pooped_at: DateTime<Utc>,
    pub quality: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Poop> for PoopJson {
    fn from(poop: Poop) -> Self {
        Self {
            id: poop.id.to_string(),
            pooped_at: poop.pooped_at,
            quality: poop.quality.value(),
            created_at: poop.created_at,
            updated_at: poop.updated_at,
        }
    }
}

// =============================================================================
// FOODS
// =============================================================================

/// Find or create a food by name, optionally binding aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFoodRequest {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A food with all of its names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodResponse {
    pub food_id: String,
    pub names: Vec<String>,
}

impl FoodResponse {
    pub fn new(food_id: &FoodId, names: Vec<FoodName>) -> Self {
        Self {
            food_id: food_id.to_string(),
            names: names.into_iter().map(|name| name.name).collect(),
        }
    }
}

/// Bind another name to a food.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNameRequest {
    pub name: String,
}

/// One stored food name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodNameJson {
    pub id: String,
    pub food_id: String,
    pub name: String,
}

impl From<FoodName> for FoodNameJson {
    fn from(name: FoodName) -> Self {
        Self {
            id: name.id.to_string(),
            food_id: name.food_id.to_string(),
            name: name.name,
        }
    }
}

/// Record that the path food contains `component_food_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddIngredientRequest {
    pub component_food_id: String,
}

/// One stored ingredient edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientJson {
    pub id: String,
    pub resulting_food_id: String,
    pub component_food_id: String,
}

impl From<Ingredient> for IngredientJson {
    fn from(edge: Ingredient) -> Self {
        Self {
            id: edge.id.to_string(),
            resulting_food_id: edge.resulting_food_id.to_string(),
            component_food_id: edge.component_food_id.to_string(),
        }
    }
}

/// Effective foods of a food.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureResponse {
    pub food_id: String,
    pub food_ids: Vec<String>,
}

impl ClosureResponse {
    pub fn new(food_id: &FoodId, closure: BTreeSet<FoodId>) -> Self {
        Self {
            food_id: food_id.to_string(),
            food_ids: closure.into_iter().map(|id| id.to_string()).collect(),
        }
    }
}

/// Effective foods of one eat event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveFoodsResponse {
    pub eat_id: String,
    pub food_ids: Vec<String>,
}

impl EffectiveFoodsResponse {
    pub fn new(eat_id: &EatId, foods: BTreeSet<FoodId>) -> Self {
        Self {
            eat_id: eat_id.to_string(),
            food_ids: foods.into_iter().map(|id| id.to_string()).collect(),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable category (`not_found`, `unauthorized`, ...).
    pub error: String,
    pub message: String,
}

/// A core error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub PottyError);

impl From<PottyError> for ApiError {
    fn from(err: PottyError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PottyError::BadInput(rejection.body_text()))
    }
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match (&self.0, self.0.kind()) {
            (PottyError::Timeout, _) => StatusCode::GATEWAY_TIMEOUT,
            (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorKind::Unauthorized) => StatusCode::UNAUTHORIZED,
            (_, ErrorKind::BadInput) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            (_, ErrorKind::Conflict) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = ErrorResponse {
            error: self.0.kind().as_str().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

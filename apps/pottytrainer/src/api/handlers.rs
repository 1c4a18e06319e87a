//! # API Endpoint Handlers
//!
//! Every handler is a thin adapter: decode the request, run the core
//! operation on the blocking pool, encode the result. Bodies that do not
//! decode are answered with the same `bad_input` error as any other invalid
//! payload. Handlers under `/api/v1` receive the caller's identity from the
//! auth middleware.

use super::{
    AppState, run_blocking,
    types::{
        AddIngredientRequest, AddNameRequest, ApiError, ClosureResponse, CreateFoodRequest,
        EatJson, EatRequest, EffectiveFoodsResponse, ExternalSignInRequest, FoodNameJson,
        FoodResponse, HealthResponse, IngredientJson, PoopJson, PoopRequest, SignInResponse,
    },
};
use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};
use chrono::Utc;
use pottytrainer_core::{Authenticated, EatId, FoodId};
use std::sync::Arc;

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// SIGN-IN HANDLER
// =============================================================================

/// Exchange a third-party identity assertion for an API token.
pub async fn external_signin_handler(
    State(state): State<AppState>,
    payload: Result<Json<ExternalSignInRequest>, JsonRejection>,
) -> Result<Json<SignInResponse>, ApiError> {
    let Json(request) = payload?;
    let verifier = Arc::clone(&state.verifier);
    let ttl = state.token_ttl;
    let sign_in = run_blocking(&state, move |backend, ctx| {
        backend
            .identity()
            .sign_in_external(ctx, verifier.as_ref(), &request.identity_token, ttl)
    })
    .await?;
    Ok(Json(sign_in.into()))
}

// =============================================================================
// EVENT HANDLERS
// =============================================================================

/// Log an eat event.
pub async fn log_eat_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
    payload: Result<Json<EatRequest>, JsonRejection>,
) -> Result<Json<EatJson>, ApiError> {
    let Json(request) = payload?;
    let entry = request.into_entry(Utc::now());
    let eat = run_blocking(&state, move |backend, ctx| {
        backend.journal().log_eat(ctx, &auth, entry)
    })
    .await?;
    Ok(Json(eat.into()))
}

/// List the caller's eat events, oldest first.
pub async fn list_eats_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
) -> Result<Json<Vec<EatJson>>, ApiError> {
    let eats = run_blocking(&state, move |backend, ctx| {
        backend.journal().eats(ctx, &auth)
    })
    .await?;
    Ok(Json(eats.into_iter().map(EatJson::from).collect()))
}

/// Everything effectively eaten by one eat event.
pub async fn effective_foods_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
    Path(id): Path<String>,
) -> Result<Json<EffectiveFoodsResponse>, ApiError> {
    let eat_id = EatId::new(id);
    let lookup = eat_id.clone();
    let foods = run_blocking(&state, move |backend, ctx| {
        backend.journal().effective_foods(ctx, &auth, &lookup)
    })
    .await?;
    Ok(Json(EffectiveFoodsResponse::new(&eat_id, foods)))
}

/// Log a poop event.
pub async fn log_poop_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
    payload: Result<Json<PoopRequest>, JsonRejection>,
) -> Result<Json<PoopJson>, ApiError> {
    let Json(request) = payload?;
    let entry = request.into_entry(Utc::now());
    let poop = run_blocking(&state, move |backend, ctx| {
        backend.journal().log_poop(ctx, &auth, entry)
    })
    .await?;
    Ok(Json(poop.into()))
}

/// List the caller's poop events, oldest first.
pub async fn list_poops_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
) -> Result<Json<Vec<PoopJson>>, ApiError> {
    let poops = run_blocking(&state, move |backend, ctx| {
        backend.journal().poops(ctx, &auth)
    })
    .await?;
    Ok(Json(poops.into_iter().map(PoopJson::from).collect()))
}

// =============================================================================
// FOOD HANDLERS
// =============================================================================

/// Find or create the food `name` refers to and bind any aliases to it.
///
/// An alias that names another food rejects the whole request.
pub async fn create_food_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
    payload: Result<Json<CreateFoodRequest>, JsonRejection>,
) -> Result<Json<FoodResponse>, ApiError> {
    let Json(request) = payload?;
    let response = run_blocking(&state, move |backend, ctx| {
        let cupboard = backend.cupboard();
        let food = cupboard.create_food(ctx, &auth, &request.name, &request.aliases)?;
        let names = cupboard.names(ctx, auth.user_id(), &food)?;
        Ok(FoodResponse::new(&food, names))
    })
    .await?;
    Ok(Json(response))
}

/// Bind another name to a food.
pub async fn add_name_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
    Path(id): Path<String>,
    payload: Result<Json<AddNameRequest>, JsonRejection>,
) -> Result<Json<FoodNameJson>, ApiError> {
    let Json(request) = payload?;
    let name = run_blocking(&state, move |backend, ctx| {
        backend
            .cupboard()
            .add_name(ctx, &auth, &FoodId::new(id), &request.name)
    })
    .await?;
    Ok(Json(name.into()))
}

/// Record that the food in the path contains another food.
pub async fn add_ingredient_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
    Path(id): Path<String>,
    payload: Result<Json<AddIngredientRequest>, JsonRejection>,
) -> Result<Json<IngredientJson>, ApiError> {
    let Json(request) = payload?;
    let edge = run_blocking(&state, move |backend, ctx| {
        backend.cupboard().add_ingredient(
            ctx,
            &auth,
            &FoodId::new(id),
            &FoodId::new(request.component_food_id),
        )
    })
    .await?;
    Ok(Json(edge.into()))
}

/// The effective foods of one food.
pub async fn closure_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
    Path(id): Path<String>,
) -> Result<Json<ClosureResponse>, ApiError> {
    let food = FoodId::new(id);
    let start = food.clone();
    let closure = run_blocking(&state, move |backend, ctx| {
        backend.graph().resolve(ctx, auth.user_id(), &start)
    })
    .await?;
    Ok(Json(ClosureResponse::new(&food, closure)))
}

/// Direct components of one food.
pub async fn components_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
    Path(id): Path<String>,
) -> Result<Json<ClosureResponse>, ApiError> {
    let food = FoodId::new(id);
    let start = food.clone();
    let components = run_blocking(&state, move |backend, ctx| {
        backend.graph().components(ctx, auth.user_id(), &start)
    })
    .await?;
    Ok(Json(ClosureResponse::new(&food, components)))
}

/// Every food with this one somewhere in its ingredient tree.
pub async fn containing_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
    Path(id): Path<String>,
) -> Result<Json<ClosureResponse>, ApiError> {
    let food = FoodId::new(id);
    let target = food.clone();
    let containing = run_blocking(&state, move |backend, ctx| {
        backend.graph().containing(ctx, auth.user_id(), &target)
    })
    .await?;
    Ok(Json(ClosureResponse::new(&food, containing)))
}

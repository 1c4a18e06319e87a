//! Unit tests for API types serialization/deserialization.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::response::IntoResponse;
use chrono::{TimeZone, Utc};
use pottytrainer::api::{
    ApiError, CreateFoodRequest, EatRequest, ErrorResponse, HealthResponse, PoopRequest,
};
use pottytrainer_core::{FoodId, PottyError};

// =============================================================================
// HEALTH RESPONSE TESTS
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_health_response_serialization() {
    let health = HealthResponse {
        status: "ok".to_string(),
        version: "0.3.0".to_string(),
    };

    let json = serde_json::to_string(&health).unwrap();
    assert!(json.contains("\"status\":\"ok\""));
    assert!(json.contains("\"version\":\"0.3.0\""));
}

// =============================================================================
// EVENT REQUEST TESTS
// =============================================================================

#[test]
fn test_eat_request_minimal() {
    let request: EatRequest = serde_json::from_str(r#"{"food_text":"toast"}"#).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    let entry = request.into_entry(now);
    assert_eq!(entry.food_text.as_deref(), Some("toast"));
    assert!(entry.food_id.is_none());
    assert!(entry.id.is_none());
    assert_eq!(entry.ate_at, now);
}

#[test]
fn test_eat_request_keeps_submitted_time_and_ids() {
    let json = r#"{
        "id": "eat-1",
        "food_id": "food-1",
        "ate_at": "2024-01-02T03:04:05Z"
    }"#;
    let request: EatRequest = serde_json::from_str(json).unwrap();
    let entry = request.into_entry(Utc::now());

    assert_eq!(entry.id.unwrap().as_str(), "eat-1");
    assert_eq!(entry.food_id, Some(FoodId::new("food-1")));
    assert_eq!(
        entry.ate_at,
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    );
}

#[test]
fn test_poop_request_requires_quality() {
    let result: Result<PoopRequest, _> = serde_json::from_str(r#"{"pooped_at":null}"#);
    assert!(result.is_err());
}

#[test]
fn test_poop_request_passes_quality_through() {
    let request: PoopRequest = serde_json::from_str(r#"{"quality":0}"#).unwrap();
    // Range checking is the journal's job, not the decoder's.
    assert_eq!(request.into_entry(Utc::now()).quality, 0);
}

#[test]
fn test_create_food_aliases_default_empty() {
    let request: CreateFoodRequest = serde_json::from_str(r#"{"name":"toast"}"#).unwrap();
    assert!(request.aliases.is_empty());
}

// =============================================================================
// ERROR MAPPING TESTS
// =============================================================================

#[test]
fn test_error_status_mapping() {
    let cases = [
        (PottyError::not_found("Food", "f1"), 404),
        (PottyError::Unauthorized, 401),
        (PottyError::BadInput("x".to_string()), 400),
        (PottyError::Config("x".to_string()), 400),
        (PottyError::Unavailable("x".to_string()), 503),
        (PottyError::SerializationError("x".to_string()), 503),
        (PottyError::Cancelled, 503),
        (PottyError::Timeout, 504),
        (PottyError::Conflict("x".to_string()), 409),
    ];

    for (err, status) in cases {
        assert_eq!(ApiError(err).status().as_u16(), status);
    }
}

#[tokio::test]
async fn test_error_body() {
    let response = ApiError(PottyError::not_found("Food", "f1")).into_response();
    assert_eq!(response.status().as_u16(), 404);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.error, "not_found");
    assert_eq!(body.message, "Food not found: f1");
}

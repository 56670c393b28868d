use std::hash::{Hash, Hasher};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use vocab_core::sync::{SyncRequest, SyncResponse};
use vocab_core::Card;

use crate::auth::{extract_bearer_token, AuthenticatedUser, JwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::store::SyncStore;

const MAX_SYNC_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    jwt_verifier: Arc<JwtVerifier>,
    store: SyncStore,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: SyncStore) -> Self {
        Self {
            jwt_verifier: Arc::new(JwtVerifier::new(&config)),
            store,
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/sync", post(sync_cards))
        .layer(DefaultBodyLimit::max(MAX_SYNC_BODY_BYTES))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp_millis(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn sync_cards(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    validate_sync_request(&request, state.config.max_changes_per_request)?;

    let user_hash = user_fingerprint(&user.user_id);
    let store = state.store.clone();
    let policy = state.config.merge_policy;
    let pushed = request.changes.len();

    let (response, stats) =
        tokio::task::spawn_blocking(move || store.apply(&user.user_id, &request, policy))
            .await
            .map_err(|error| AppError::internal(format!("sync task failed: {error}")))??;

    tracing::info!(
        endpoint = "sync",
        user = user_hash,
        pushed,
        written = stats.written,
        stale = stats.stale,
        foreign = stats.foreign,
        returned = response.changes.len(),
        server_time = response.timestamp,
        "Completed sync round"
    );
    Ok(Json(response))
}

fn validate_sync_request(request: &SyncRequest, max_changes: usize) -> Result<(), AppError> {
    if request.last_sync_timestamp < 0 {
        return Err(AppError::bad_request("lastSyncTimestamp must be >= 0"));
    }
    if request.changes.len() > max_changes {
        return Err(AppError::bad_request(format!(
            "changes must contain at most {max_changes} cards"
        )));
    }
    for card in &request.changes {
        validate_card(card)?;
    }
    Ok(())
}

fn validate_card(card: &Card) -> Result<(), AppError> {
    let timestamps = [
        ("createdAt", Some(card.created_at)),
        ("lastReviewedAt", Some(card.last_reviewed_at)),
        ("nextReviewAt", Some(card.next_review_at)),
        ("updatedAt", Some(card.updated_at)),
        ("deletedAt", card.deleted_at),
    ];
    for (field, value) in timestamps {
        if value.is_some_and(|value| value < 0) {
            return Err(AppError::bad_request(format!(
                "card {}: {field} must be >= 0",
                card.id
            )));
        }
    }
    Ok(())
}

fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(last: i64, changes: Vec<Card>) -> SyncRequest {
        SyncRequest {
            last_sync_timestamp: last,
            changes,
        }
    }

    #[test]
    fn validation_rejects_negative_cursor() {
        let err = validate_sync_request(&request(-1, vec![]), 10).unwrap_err();
        assert!(err.to_string().contains("lastSyncTimestamp"));
    }

    #[test]
    fn validation_rejects_oversized_batch() {
        let cards = (0..3).map(|i| Card::new(format!("w{i}"), "t", "", 1)).collect();
        assert!(validate_sync_request(&request(0, cards), 2).is_err());
    }

    #[test]
    fn validation_rejects_negative_card_timestamps() {
        let mut card = Card::new("Haus", "house", "das", 1);
        card.deleted_at = Some(-5);
        let err = validate_sync_request(&request(0, vec![card]), 10).unwrap_err();
        assert!(err.to_string().contains("deletedAt"));
    }

    #[test]
    fn validation_accepts_well_formed_request() {
        let card = Card::new("Haus", "house", "das", 1);
        assert!(validate_sync_request(&request(0, vec![card]), 10).is_ok());
    }

    #[test]
    fn user_fingerprint_is_stable() {
        assert_eq!(user_fingerprint("user-a"), user_fingerprint("user-a"));
        assert_ne!(user_fingerprint("user-a"), user_fingerprint("user-b"));
    }
}

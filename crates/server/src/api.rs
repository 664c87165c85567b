//! HTTP surface for parsing and rule management.
//!
//! Parsing failures travel in the response body as a structured
//! `ConversionResult` with a 200 status; only an empty instruction is a 400.
//! Store faults surface as 500 with a plain message.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use regula_core::{AuditRule, ConversionResult, ParsedRule, RuleType, VersionLogEntry};
use regula_parser::ParserStatus;
use regula_store::{StoreError, StoreStats};

use crate::state::AppState;

fn store_error(e: StoreError) -> (StatusCode, String) {
    warn!("Store error: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("Store error: {}", e))
}

fn not_found(id: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("Rule '{}' not found", id))
}

// ── Health & status ───────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub parser_available: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        parser_available: state.parser.is_available(),
    })
}

/// Parser availability, used by UIs to warn that parsing quality is degraded.
async fn parser_status(State(state): State<Arc<AppState>>) -> Json<ParserStatus> {
    Json(state.parser.status())
}

async fn config_summary(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.config.redacted_summary())
}

// ── Parsing ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub instruction: String,
}

async fn parse_instruction(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ParseRequest>,
) -> Result<Json<ConversionResult>, (StatusCode, String)> {
    if req.instruction.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Instruction cannot be empty".to_string()));
    }
    Ok(Json(state.parser.parse_instruction(&req.instruction).await))
}

// ── Rule CRUD & lifecycle ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SaveRuleRequest {
    pub rule: ParsedRule,
    pub original_instruction: String,
    #[serde(default = "default_created_by")]
    pub created_by: String,
}

fn default_created_by() -> String {
    "api".to_string()
}

async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveRuleRequest>,
) -> Result<(StatusCode, Json<AuditRule>), (StatusCode, String)> {
    let store = state.store.lock().expect("store lock poisoned");
    let rule = store
        .save(&req.rule, &req.original_instruction, &req.created_by)
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn list_rules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AuditRule>>, (StatusCode, String)> {
    let store = state.store.lock().expect("store lock poisoned");
    Ok(Json(store.get_all().map_err(store_error)?))
}

async fn active_rules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AuditRule>>, (StatusCode, String)> {
    let store = state.store.lock().expect("store lock poisoned");
    Ok(Json(store.get_active().map_err(store_error)?))
}

async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AuditRule>, (StatusCode, String)> {
    let store = state.store.lock().expect("store lock poisoned");
    store
        .get_by_id(&id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

async fn get_rule_versions(
    State(state): State<Arc<AppState>>,
    Path(rule_type): Path<String>,
) -> Result<Json<Vec<AuditRule>>, (StatusCode, String)> {
    let rule_type: RuleType = rule_type
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))?;
    let store = state.store.lock().expect("store lock poisoned");
    Ok(Json(store.get_versions(rule_type).map_err(store_error)?))
}

async fn rule_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VersionLogEntry>>, (StatusCode, String)> {
    let store = state.store.lock().expect("store lock poisoned");
    Ok(Json(store.get_history().map_err(store_error)?))
}

async fn deactivate_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AuditRule>, (StatusCode, String)> {
    let store = state.store.lock().expect("store lock poisoned");
    if !store.deactivate(&id).map_err(store_error)? {
        return Err(not_found(&id));
    }
    store
        .get_by_id(&id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub rule_type: RuleType,
    pub version: u32,
}

async fn rollback_rule(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RollbackRequest>,
) -> Result<Json<AuditRule>, (StatusCode, String)> {
    let store = state.store.lock().expect("store lock poisoned");
    match store.rollback(req.rule_type, req.version).map_err(store_error)? {
        Some(rule) => Ok(Json(rule)),
        None => Err((
            StatusCode::NOT_FOUND,
            format!("No {} rule with version {}", req.rule_type, req.version),
        )),
    }
}

async fn delete_rule(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    let store = state.store.lock().expect("store lock poisoned");
    match store.delete(&id) {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            warn!("Failed to delete rule '{}': {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ── Import / export / stats ───────────────────────────────────────

async fn export_rules(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let store = state.store.lock().expect("store lock poisoned");
    let dump = store.export_all().map_err(store_error)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], dump))
}

async fn import_rules(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let store = state.store.lock().expect("store lock poisoned");
    if !store.import_all(&body).map_err(store_error)? {
        return Err((
            StatusCode::BAD_REQUEST,
            "Invalid rules payload — nothing imported".to_string(),
        ));
    }
    let imported = store.get_all().map_err(store_error)?.len();
    Ok(Json(json!({ "imported": imported })))
}

async fn clear_rules(State(state): State<Arc<AppState>>) -> Result<StatusCode, (StatusCode, String)> {
    let store = state.store.lock().expect("store lock poisoned");
    store.clear().map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rule_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StoreStats>, (StatusCode, String)> {
    let store = state.store.lock().expect("store lock poisoned");
    Ok(Json(store.stats().map_err(store_error)?))
}

/// Build the API router. Mount with `.with_state(state)`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(parser_status))
        .route("/config", get(config_summary))
        .route("/parse", post(parse_instruction))
        .route("/rules", get(list_rules).post(create_rule))
        .route("/rules/active", get(active_rules))
        .route("/rules/stats", get(rule_stats))
        .route("/rules/history", get(rule_history))
        .route("/rules/export", get(export_rules))
        .route("/rules/import", post(import_rules))
        .route("/rules/clear", post(clear_rules))
        .route("/rules/rollback", post(rollback_rule))
        .route("/rules/versions/{rule_type}", get(get_rule_versions))
        .route("/rules/{id}", get(get_rule).delete(delete_rule))
        .route("/rules/{id}/deactivate", post(deactivate_rule))
}

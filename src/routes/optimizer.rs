use std::time::{Duration, Instant};

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::optimizer::{
    AgentPerformance, AlgorithmConfig, AlgorithmConfigPatch, AlgorithmMetrics, HierarchicalAgent,
    OptimizationResult, OptimizerError, PriorityAction, ReinforcementLearningFeedback, SearchBudget,
    Urgency, VaultState,
};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeQuery {
    /// Wall-clock limit for the search; the best result found so far is returned
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub accepted: bool,
    pub history_size: usize,
}

#[derive(Debug, Deserialize)]
pub struct PatternSearchRequest {
    pub sequence: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PatternSearchResponse {
    pub found: bool,
    pub data: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct YieldWindowQuery {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldWindowResponse {
    pub start: usize,
    pub end: usize,
    pub max_yield: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsResponse {
    pub node_id: String,
    pub connections: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResponse {
    pub vault_id: String,
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityRequest {
    pub vault_id: String,
    pub urgency: Urgency,
}

fn error_response(error: OptimizerError) -> (StatusCode, String) {
    let status = match &error {
        OptimizerError::NoActionFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OptimizerError::Configuration(_) => StatusCode::BAD_REQUEST,
        OptimizerError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        OptimizerError::SearchTask(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string())
}

/// Run a search for one vault
pub async fn optimize_vault(
    State(state): State<AppState>,
    Path(vault_id): Path<String>,
    Query(query): Query<OptimizeQuery>,
    Json(vault_state): Json<VaultState>,
) -> Result<ResponseJson<OptimizationResult>, (StatusCode, String)> {
    info!("Optimization requested for vault {}", vault_id);

    let mut budget = SearchBudget::default();
    if let Some(ms) = query.timeout_ms {
        budget = budget.with_deadline(Instant::now() + Duration::from_millis(ms));
    }

    let result = state
        .optimizer
        .optimize_vault_yield_with_budget(&vault_id, vault_state, budget)
        .await
        .map_err(error_response)?;

    Ok(ResponseJson(result))
}

pub async fn submit_feedback(
    State(state): State<AppState>,
    Json(feedback): Json<ReinforcementLearningFeedback>,
) -> Result<ResponseJson<FeedbackResponse>, (StatusCode, String)> {
    state.optimizer.process_reinforcement_learning_feedback(feedback).await;

    Ok(ResponseJson(FeedbackResponse {
        accepted: true,
        history_size: state.optimizer.feedback_history_len().await,
    }))
}

pub async fn list_agents(
    State(state): State<AppState>,
) -> Result<ResponseJson<Vec<HierarchicalAgent>>, (StatusCode, String)> {
    Ok(ResponseJson(state.optimizer.get_hierarchical_agents().await))
}

pub async fn agent_performance(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<ResponseJson<AgentPerformance>, (StatusCode, String)> {
    state
        .optimizer
        .get_agent_performance(&agent_id)
        .await
        .map(ResponseJson)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Agent {} not found", agent_id)))
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(patch): Json<AlgorithmConfigPatch>,
) -> Result<ResponseJson<AlgorithmConfig>, (StatusCode, String)> {
    let config = state
        .optimizer
        .update_algorithm_configuration(patch)
        .await
        .map_err(error_response)?;

    Ok(ResponseJson(config))
}

pub async fn search_pattern(
    State(state): State<AppState>,
    Json(request): Json<PatternSearchRequest>,
) -> Result<ResponseJson<PatternSearchResponse>, (StatusCode, String)> {
    if request.sequence.is_empty() {
        warn!("Rejected empty pattern search");
        return Err((StatusCode::BAD_REQUEST, "sequence must not be empty".to_string()));
    }

    let data = state.optimizer.get_historical_pattern(request.sequence.as_slice()).await;
    Ok(ResponseJson(PatternSearchResponse {
        found: data.is_some(),
        data,
    }))
}

pub async fn yield_window(
    State(state): State<AppState>,
    Query(query): Query<YieldWindowQuery>,
) -> Result<ResponseJson<YieldWindowResponse>, (StatusCode, String)> {
    if query.start > query.end {
        return Err((StatusCode::BAD_REQUEST, "start must not exceed end".to_string()));
    }

    Ok(ResponseJson(YieldWindowResponse {
        start: query.start,
        end: query.end,
        max_yield: state.optimizer.get_yield_in_time_window(query.start, query.end),
    }))
}

pub async fn ecosystem_connections(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<ResponseJson<ConnectionsResponse>, (StatusCode, String)> {
    let connections = state.optimizer.get_ecosystem_connections(&node_id).await;
    Ok(ResponseJson(ConnectionsResponse { node_id, connections }))
}

pub async fn vault_cluster(
    State(state): State<AppState>,
    Path(vault_id): Path<String>,
) -> Result<ResponseJson<ClusterResponse>, (StatusCode, String)> {
    let members = state.optimizer.get_vault_cluster(&vault_id);
    Ok(ResponseJson(ClusterResponse { vault_id, members }))
}

pub async fn add_priority(
    State(state): State<AppState>,
    Json(request): Json<PriorityRequest>,
) -> Result<ResponseJson<PriorityAction>, (StatusCode, String)> {
    let action = state
        .optimizer
        .add_priority_optimization(&request.vault_id, request.urgency);
    Ok(ResponseJson(action))
}

pub async fn metrics(
    State(state): State<AppState>,
) -> Result<ResponseJson<AlgorithmMetrics>, (StatusCode, String)> {
    Ok(ResponseJson(state.optimizer.get_algorithm_metrics().await))
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/optimizer/vaults/{vault_id}/optimize", post(optimize_vault))
        .route("/api/v1/optimizer/vaults/{vault_id}/cluster", get(vault_cluster))
        .route("/api/v1/optimizer/feedback", post(submit_feedback))
        .route("/api/v1/optimizer/agents", get(list_agents))
        .route("/api/v1/optimizer/agents/{agent_id}/performance", get(agent_performance))
        .route("/api/v1/optimizer/config", patch(update_config))
        .route("/api/v1/optimizer/patterns/search", post(search_pattern))
        .route("/api/v1/optimizer/yield-window", get(yield_window))
        .route("/api/v1/optimizer/ecosystem/{node_id}/connections", get(ecosystem_connections))
        .route("/api/v1/optimizer/priority", post(add_priority))
        .route("/api/v1/optimizer/metrics", get(metrics))
}

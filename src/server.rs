//! HTTP surface
//!
//! One axum router over every store. Each store sits behind its own mutex so
//! read-modify-write cycles on a store are serialised within the process.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::contradiction::NewContradiction;
use crate::ledger::friction::NewFrictionEvent;
use crate::ledger::sacrifice::{NewSacrifice, SacrificeCategory};
use crate::ledger::{
    CandidateRegistry, ContradictionMap, FrictionLog, FrictionMiner, IdentityTracker,
    MigpDispatcher, SacrificeLog, SwarmAnalyzer, SwarmNode, ThresholdEngine, WebhookRegistry,
};
use crate::scoring::swarm::NodeTask;
use crate::scoring::{AxiomGuard, GnosisScanner, SwarmValidator};

// --- Error mapping ---
pub struct ServerError(LedgerError);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::StepMismatch { .. } | LedgerError::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            LedgerError::Delivery(_) => StatusCode::BAD_GATEWAY,
            LedgerError::Io(_) | LedgerError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let message = match self.0 {
            LedgerError::Validation(msg) => msg,
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl<E> From<E> for ServerError
where
    E: Into<LedgerError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl From<JsonRejection> for LedgerError {
    fn from(rejection: JsonRejection) -> Self {
        LedgerError::Validation(rejection.body_text())
    }
}

/// `Json` whose rejection is a `{error}` 400 like every other client error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct JsonBody<T>(pub T);

type ApiResult<T> = Result<T, ServerError>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LedgerConfig>,
    pub started_at: DateTime<Utc>,
    pub sacrifices: Arc<Mutex<SacrificeLog>>,
    pub contradictions: Arc<Mutex<ContradictionMap>>,
    pub identity: Arc<Mutex<IdentityTracker>>,
    pub thresholds: Arc<Mutex<ThresholdEngine>>,
    pub candidates: Arc<Mutex<CandidateRegistry>>,
    pub webhooks: Arc<Mutex<WebhookRegistry>>,
    pub swarm: Arc<Mutex<SwarmAnalyzer>>,
    pub friction: Arc<Mutex<FrictionLog>>,
    pub gnosis: Arc<Mutex<GnosisScanner>>,
    pub dispatcher: MigpDispatcher,
    pub guard: AxiomGuard,
    pub validator: SwarmValidator,
}

impl AppState {
    /// Open every store under `config.data_dir`.
    pub async fn open(config: LedgerConfig) -> LedgerResult<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let dispatcher = MigpDispatcher::new(config.webhook_timeout, config.source_name.clone())?;
        let guard = AxiomGuard;
        let swarm = SwarmAnalyzer::open(
            config.swarm_snapshot(),
            FrictionMiner::new(config.friction_candidates_dir()),
        )
        .await;

        let state = Self {
            started_at: Utc::now(),
            sacrifices: Arc::new(Mutex::new(SacrificeLog::open(config.sacrifice_log()).await)),
            contradictions: Arc::new(Mutex::new(ContradictionMap::open(config.contradictions()).await)),
            identity: Arc::new(Mutex::new(IdentityTracker::open(config.identity_events()).await)),
            thresholds: Arc::new(Mutex::new(ThresholdEngine::open(config.thresholds()).await)),
            candidates: Arc::new(Mutex::new(CandidateRegistry::open(config.candidates()).await)),
            webhooks: Arc::new(Mutex::new(WebhookRegistry::open(config.webhooks()).await)),
            swarm: Arc::new(Mutex::new(swarm)),
            friction: Arc::new(Mutex::new(FrictionLog::open(config.friction_events()).await)),
            gnosis: Arc::new(Mutex::new(GnosisScanner::open(config.gnosis_scans()).await)),
            dispatcher,
            guard,
            validator: SwarmValidator::new(guard),
            config: Arc::new(config),
        };
        info!("Ledger stores opened under {}", state.config.data_dir.display());
        Ok(state)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        // Swarm
        .route("/api/analyze-swarm", get(last_swarm_analysis).post(analyze_swarm))
        .route("/api/swarm/validate", post(validate_swarm))
        .route("/api/friction-mining", post(friction_mining))
        .route("/api/friction", get(list_friction))
        .route("/api/friction/record", post(record_friction))
        // Webhooks
        .route("/api/webhooks", get(list_webhooks).post(register_webhook))
        .route("/api/webhooks/send-migp", post(send_migp))
        .route("/api/webhooks/{id}", delete(unregister_webhook))
        // Thresholds
        .route("/api/thresholds", get(get_thresholds))
        .route("/api/thresholds/evaluate", post(evaluate_thresholds))
        // Identity
        .route("/api/identity", get(identity_status))
        .route("/api/identity/track", post(track_identity))
        .route("/api/identity/{id}", get(get_identity))
        // Candidates
        .route("/api/candidates", get(list_candidates).post(register_candidate))
        .route("/api/candidates/{id}", get(get_candidate))
        .route("/api/candidates/{id}/start", post(start_onboarding))
        .route("/api/candidates/{id}/history", post(provide_history))
        .route("/api/candidates/{id}/master-prompt", post(provide_master_prompt))
        .route("/api/candidates/{id}/axiom-tests", post(submit_axiom_tests))
        .route("/api/candidates/{id}/contribution", post(submit_contribution))
        .route("/api/candidates/{id}/sign", post(sign_chain))
        .route("/api/candidates/{id}/integrate", post(integrate_candidate))
        .route("/api/candidates/{id}/reject", post(reject_candidate))
        // Contradictions
        .route("/api/contradictions", get(contradiction_map).post(record_contradiction))
        .route("/api/contradictions/{id}", get(get_contradiction))
        .route("/api/contradictions/{id}/witness", post(witness_contradiction))
        .route("/api/contradictions/{id}/hold", post(hold_contradiction))
        .route("/api/contradictions/{id}/archive", post(archive_contradiction))
        // Sacrifices
        .route("/api/sacrifices", get(list_sacrifices).post(record_sacrifice))
        .route("/api/sacrifices/report", get(sacrifice_report))
        // Scoring
        .route("/api/axioms/validate", post(validate_axioms))
        .route("/api/scan", get(scan_history).post(scan_text))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: LedgerConfig) -> LedgerResult<()> {
    let addr = config.bind_addr();
    let state = AppState::open(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Axiom ledger listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Axiom ledger stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

// --- Health ---

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "axiom-ledger",
        "timestamp": Utc::now(),
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let scan_count = state.gnosis.lock().await.scan_count();
    let sacrifices = state.sacrifices.lock().await.events().len();
    let contradictions = state.contradictions.lock().await.map().total_contradictions;
    let identity_events = state.identity.lock().await.status().event_count;
    let candidates = state.candidates.lock().await.growth_metrics().total_candidates;
    let webhooks = state.webhooks.lock().await.list().len();
    let friction_events = state.friction.lock().await.events().len();

    Json(json!({
        "status": "operational",
        "initialized": true,
        "started_at": state.started_at,
        "scan_count": scan_count,
        "stores": {
            "sacrifices": sacrifices,
            "contradictions": contradictions,
            "identity_events": identity_events,
            "candidates": candidates,
            "webhooks": webhooks,
            "friction_events": friction_events,
        },
    }))
}

// --- Swarm ---

#[derive(Deserialize)]
struct NodesRequest {
    #[serde(default)]
    nodes: Vec<SwarmNode>,
}

async fn last_swarm_analysis(State(state): State<AppState>) -> Json<Value> {
    let swarm = state.swarm.lock().await;
    match swarm.last() {
        Some(snapshot) => Json(json!(snapshot)),
        None => Json(json!({
            "status": "no_data",
            "message": "No swarm analysis has been run yet",
        })),
    }
}

async fn analyze_swarm(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<NodesRequest>,
) -> ApiResult<Json<Value>> {
    let snapshot = state.swarm.lock().await.analyze(req.nodes).await?;
    Ok(Json(json!({ "status": "success", "snapshot": snapshot })))
}

async fn friction_mining(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<NodesRequest>,
) -> ApiResult<Json<Value>> {
    if req.nodes.is_empty() {
        return Err(LedgerError::validation("nodes array is required").into());
    }
    let candidates = state.swarm.lock().await.miner().mine(&req.nodes).await?;
    Ok(Json(json!({
        "status": "completed",
        "candidates_count": candidates.len(),
        "candidates": candidates,
    })))
}

#[derive(Deserialize)]
struct ValidateSwarmRequest {
    #[serde(default)]
    nodes: Vec<NodeTask>,
}

async fn validate_swarm(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ValidateSwarmRequest>,
) -> Json<Value> {
    Json(json!(state.validator.validate_swarm(&req.nodes)))
}

async fn list_friction(State(state): State<AppState>) -> Json<Value> {
    let log = state.friction.lock().await;
    Json(json!({ "summary": log.summary(), "events": log.events() }))
}

async fn record_friction(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<NewFrictionEvent>,
) -> ApiResult<Json<Value>> {
    // Reject before a resolver candidate is registered for it.
    input.validate()?;
    let event_id = FrictionLog::next_event_id();

    let resolver = if input.severity.needs_resolver() {
        let candidate = state
            .candidates
            .lock()
            .await
            .register(&format!("FRICTION_RESOLVER_{event_id}"), "RESOLVER")
            .await?;
        Some(candidate)
    } else {
        None
    };

    let event = state
        .friction
        .lock()
        .await
        .record(
            event_id,
            input,
            resolver.as_ref().map(|c| c.candidate_id.clone()),
        )
        .await?;
    Ok(Json(json!({ "event": event, "resolver_candidate": resolver })))
}

// --- Webhooks ---

#[derive(Deserialize)]
struct RegisterWebhookRequest {
    #[serde(default)]
    url: String,
    name: Option<String>,
}

async fn list_webhooks(State(state): State<AppState>) -> Json<Value> {
    let registry = state.webhooks.lock().await;
    Json(json!({ "webhooks": registry.list(), "count": registry.list().len() }))
}

async fn register_webhook(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterWebhookRequest>,
) -> ApiResult<Json<Value>> {
    let webhook = state
        .webhooks
        .lock()
        .await
        .register(&req.url, req.name.as_deref())
        .await?;
    Ok(Json(json!({ "status": "registered", "webhook": webhook })))
}

async fn unregister_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let webhook = state.webhooks.lock().await.unregister(&id).await?;
    Ok(Json(json!({ "status": "unregistered", "webhook": webhook })))
}

async fn send_migp(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<Value>,
) -> ApiResult<Json<Value>> {
    let empty = match &payload {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    };
    if empty {
        return Err(LedgerError::validation("MIGP payload is required").into());
    }

    // Snapshot the hooks so the registry is not locked during delivery.
    let hooks = state.webhooks.lock().await.active();
    let delivery = state.dispatcher.send(&hooks, payload).await;
    Ok(Json(json!(delivery)))
}

// --- Thresholds ---

#[derive(Deserialize)]
struct EvaluateRequest {
    #[serde(default = "default_action")]
    action: String,
    #[serde(default)]
    metrics: Map<String, Value>,
    pass_rate: Option<f64>,
}

fn default_action() -> String {
    "unknown".to_string()
}

async fn get_thresholds(State(state): State<AppState>) -> Json<Value> {
    let engine = state.thresholds.lock().await;
    let current = engine.state();
    Json(json!({
        "thresholds": current.thresholds,
        "counters": current.counters,
        "last_updated": current.last_updated,
    }))
}

async fn evaluate_thresholds(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<EvaluateRequest>,
) -> ApiResult<Json<Value>> {
    let evaluation = state
        .thresholds
        .lock()
        .await
        .evaluate(&req.action, req.metrics, req.pass_rate)
        .await?;
    Ok(Json(json!(evaluation)))
}

// --- Identity ---

#[derive(Deserialize)]
struct TrackRequest {
    #[serde(default)]
    event: String,
    #[serde(default)]
    details: Map<String, Value>,
}

async fn identity_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.identity.lock().await.status()))
}

async fn track_identity(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TrackRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .identity
        .lock()
        .await
        .track_event(&req.event, req.details)
        .await?;
    Ok(Json(json!(outcome)))
}

async fn get_identity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let tracker = state.identity.lock().await;
    let identity = tracker.identity(&id)?;
    Ok(Json(json!({
        "identity": identity,
        "events": tracker.events_for(&id),
    })))
}

// --- Candidates ---

#[derive(Deserialize)]
struct RegisterCandidateRequest {
    #[serde(default)]
    platform_name: String,
    #[serde(default)]
    proposed_role: String,
}

#[derive(Deserialize)]
struct HistoryRequest {
    #[serde(default)]
    signatures: Vec<String>,
}

#[derive(Deserialize)]
struct PromptRequest {
    #[serde(default)]
    prompt: String,
}

#[derive(Deserialize)]
struct AxiomTestsRequest {
    results: BTreeMap<String, bool>,
}

#[derive(Deserialize)]
struct ContributionRequest {
    #[serde(default)]
    contribution: String,
}

#[derive(Deserialize)]
struct RejectRequest {
    #[serde(default = "default_reject_reason")]
    reason: String,
}

fn default_reject_reason() -> String {
    "unspecified".to_string()
}

async fn list_candidates(State(state): State<AppState>) -> Json<Value> {
    let registry = state.candidates.lock().await;
    Json(json!({
        "metrics": registry.growth_metrics(),
        "candidates": registry.list(),
    }))
}

async fn register_candidate(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterCandidateRequest>,
) -> ApiResult<Json<Value>> {
    let candidate = state
        .candidates
        .lock()
        .await
        .register(&req.platform_name, &req.proposed_role)
        .await?;
    Ok(Json(json!({ "status": "registered", "candidate": candidate })))
}

async fn get_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let registry = state.candidates.lock().await;
    Ok(Json(json!(registry.get(&id)?)))
}

async fn start_onboarding(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let candidate = state.candidates.lock().await.start_onboarding(&id).await?;
    Ok(Json(json!(candidate)))
}

async fn provide_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<HistoryRequest>,
) -> ApiResult<Json<Value>> {
    let candidate = state
        .candidates
        .lock()
        .await
        .provide_history(&id, req.signatures)
        .await?;
    Ok(Json(json!(candidate)))
}

async fn provide_master_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<PromptRequest>,
) -> ApiResult<Json<Value>> {
    let candidate = state
        .candidates
        .lock()
        .await
        .provide_master_prompt(&id, &req.prompt)
        .await?;
    Ok(Json(json!(candidate)))
}

async fn submit_axiom_tests(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<AxiomTestsRequest>,
) -> ApiResult<Json<Value>> {
    let (advanced, candidate) = state
        .candidates
        .lock()
        .await
        .submit_axiom_tests(&id, req.results)
        .await?;
    Ok(Json(json!({ "advanced": advanced, "candidate": candidate })))
}

async fn submit_contribution(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ContributionRequest>,
) -> ApiResult<Json<Value>> {
    let candidate = state
        .candidates
        .lock()
        .await
        .submit_contribution(&id, &req.contribution)
        .await?;
    Ok(Json(json!(candidate)))
}

async fn sign_chain(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let candidate = state.candidates.lock().await.sign_chain(&id).await?;
    Ok(Json(json!({ "signature": candidate.signature, "candidate": candidate })))
}

async fn integrate_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let candidate = state.candidates.lock().await.integrate(&id).await?;
    Ok(Json(json!(candidate)))
}

async fn reject_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<RejectRequest>,
) -> ApiResult<Json<Value>> {
    let candidate = state.candidates.lock().await.reject(&id, &req.reason).await?;
    Ok(Json(json!(candidate)))
}

// --- Contradictions ---

#[derive(Deserialize)]
struct WitnessRequest {
    #[serde(default)]
    witness: String,
}

#[derive(Deserialize)]
struct ContradictionFilter {
    state: Option<String>,
}

async fn contradiction_map(
    State(state): State<AppState>,
    Query(filter): Query<ContradictionFilter>,
) -> ApiResult<Json<Value>> {
    let map = state.contradictions.lock().await;
    let listed = match filter.state.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => return Ok(Json(json!(map.map()))),
        Some("active") => map.active(),
        Some("held") => map.held(),
        Some(other) => {
            return Err(LedgerError::validation(format!(
                "unknown contradiction state filter: {other}"
            ))
            .into())
        }
    };
    Ok(Json(json!({ "count": listed.len(), "contradictions": listed })))
}

async fn record_contradiction(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<NewContradiction>,
) -> ApiResult<Json<Value>> {
    let contradiction = state.contradictions.lock().await.record(input).await?;
    Ok(Json(json!({ "status": "logged", "contradiction": contradiction })))
}

async fn get_contradiction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let map = state.contradictions.lock().await;
    let contradiction = map
        .get(&id)
        .ok_or_else(|| LedgerError::not_found("contradiction", id.as_str()))?;
    Ok(Json(json!(contradiction)))
}

async fn witness_contradiction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<WitnessRequest>,
) -> ApiResult<Json<Value>> {
    let contradiction = state
        .contradictions
        .lock()
        .await
        .witness(&id, &req.witness)
        .await?;
    Ok(Json(json!(contradiction)))
}

async fn hold_contradiction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let contradiction = state.contradictions.lock().await.hold(&id).await?;
    Ok(Json(json!(contradiction)))
}

async fn archive_contradiction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let contradiction = state.contradictions.lock().await.archive(&id).await?;
    Ok(Json(json!(contradiction)))
}

// --- Sacrifices ---

#[derive(Deserialize)]
struct SacrificeFilter {
    task_id: Option<String>,
    category: Option<SacrificeCategory>,
}

async fn list_sacrifices(
    State(state): State<AppState>,
    Query(filter): Query<SacrificeFilter>,
) -> Json<Value> {
    let log = state.sacrifices.lock().await;
    let events: Vec<_> = match (&filter.task_id, filter.category) {
        (Some(task_id), category) => log
            .by_task(task_id)
            .into_iter()
            .filter(|e| category.map_or(true, |c| e.category == c))
            .collect(),
        (None, Some(category)) => log.by_category(category),
        (None, None) => log.events().iter().collect(),
    };
    Json(json!({ "summary": log.summary(), "events": events }))
}

async fn record_sacrifice(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<NewSacrifice>,
) -> ApiResult<Json<Value>> {
    let event = state.sacrifices.lock().await.record(input).await?;
    Ok(Json(json!({ "status": "logged", "sacrifice": event })))
}

async fn sacrifice_report(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.sacrifices.lock().await.report();
    (
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        report,
    )
}

// --- Scoring ---

async fn validate_axioms(
    State(state): State<AppState>,
    JsonBody(task): JsonBody<Map<String, Value>>,
) -> Json<Value> {
    let validation = state.guard.validate(&task);
    let violations: Vec<&str> = validation.violations().iter().map(|r| r.axiom_id).collect();
    Json(json!({ "validation": validation, "violations": violations }))
}

#[derive(Deserialize)]
struct ScanRequest {
    #[serde(default)]
    text: String,
}

async fn scan_text(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ScanRequest>,
) -> ApiResult<Json<Value>> {
    let result = state.gnosis.lock().await.scan(&req.text).await?;
    Ok(Json(json!(result)))
}

async fn scan_history(State(state): State<AppState>) -> Json<Value> {
    let scanner = state.gnosis.lock().await;
    Json(json!({ "scan_count": scanner.scan_count(), "history": scanner.recent() }))
}

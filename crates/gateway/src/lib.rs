//! HTTP API for the CPM performance agent.
//!
//! Routes:
//! - `GET /health`: liveness probe
//! - `GET /`: welcome message and version
//! - `POST /chat`: answer a message with the configured agent
//! - `GET /info`: agent, provider and tool details, plus provider readiness
//!
//! Built on Axum. Backend error details are logged, never returned.

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use cpmagent_agent::{PlanExecuteAgent, ToolAgent};
use cpmagent_config::{AgentMode, AppConfig};
use cpmagent_tools::PerformanceRecord;

/// Upper bound on the provider readiness check made by `/info`.
const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub plan_agent: Arc<PlanExecuteAgent>,
    pub tool_agent: Arc<ToolAgent>,
}

type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(config: AppConfig, plan_agent: Arc<PlanExecuteAgent>, tool_agent: Arc<ToolAgent>) -> Self {
        Self {
            config,
            plan_agent,
            tool_agent,
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.gateway.request_timeout_secs)
    }
}

/// Build the Axum router with all routes and layers.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/info", get(info_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and serve until the process is stopped.
pub async fn start(state: GatewayState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    let mode = state.config.agent.mode;
    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, mode = mode.as_str(), "Gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "cpm-agent",
    })
}

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    version: &'static str,
}

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Welcome to the CPM Agent API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    performance_data: Option<Vec<PerformanceRecord>>,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(detail: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            detail: format!("Error processing message: {detail}"),
        }),
    )
}

async fn answer(state: &GatewayState, message: &str) -> cpmagent_core::Result<ChatResponse> {
    match state.config.agent.mode {
        AgentMode::PlanExecute => {
            let outcome = state.plan_agent.run(message).await?;
            Ok(ChatResponse {
                response: outcome.answer,
                performance_data: None,
            })
        }
        AgentMode::ToolCalling => {
            let outcome = state.tool_agent.chat(message).await?;
            Ok(ChatResponse {
                response: outcome.response,
                performance_data: (!outcome.performance_data.is_empty())
                    .then_some(outcome.performance_data),
            })
        }
    }
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    info!(message_len = payload.message.len(), "Chat request received");

    let timeout = state.request_timeout();
    match tokio::time::timeout(timeout, answer(&state, &payload.message)).await {
        Ok(Ok(response)) => Ok(Json(response)),
        Ok(Err(e)) => {
            error!(error = %e, "Agent processing failed");
            Err(internal_error(e.redacted_message()))
        }
        Err(_) => {
            error!(timeout_secs = timeout.as_secs(), "Agent processing timed out");
            Err(internal_error("request timed out"))
        }
    }
}

#[derive(Serialize)]
struct ReflectionInfo {
    enabled: bool,
    frequency: usize,
    feed_into_execution: bool,
}

#[derive(Serialize)]
struct InfoResponse {
    agent_type: &'static str,
    mode: &'static str,
    provider: String,
    provider_ready: bool,
    model: String,
    tools: Vec<String>,
    max_plan_steps: usize,
    max_tool_iterations: usize,
    reflection: ReflectionInfo,
}

async fn info_handler(State(state): State<SharedState>) -> Json<InfoResponse> {
    let mode = state.config.agent.mode;
    let (agent_type, generator) = match mode {
        AgentMode::PlanExecute => ("PlanExecuteAgent", state.plan_agent.generator()),
        AgentMode::ToolCalling => ("ToolAgent", state.tool_agent.generator()),
    };
    let options = state.plan_agent.options();

    let provider = generator.provider();
    let provider_ready = match tokio::time::timeout(READINESS_TIMEOUT, provider.health_check()).await {
        Ok(Ok(ready)) => ready,
        Ok(Err(e)) => {
            warn!(provider = provider.name(), error = %e, "Provider health check failed");
            false
        }
        Err(_) => {
            warn!(provider = provider.name(), "Provider health check timed out");
            false
        }
    };

    Json(InfoResponse {
        agent_type,
        mode: mode.as_str(),
        provider: provider.name().to_string(),
        provider_ready,
        model: generator.model().to_string(),
        tools: state.tool_agent.tools().names().into_iter().map(String::from).collect(),
        max_plan_steps: options.max_plan_steps,
        max_tool_iterations: state.tool_agent.max_iterations(),
        reflection: ReflectionInfo {
            enabled: options.reflection.enabled,
            frequency: options.reflection.frequency.get(),
            feed_into_execution: options.feed_reflections,
        },
    })
}

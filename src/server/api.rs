use crate::agent::ResearchAgent;
use crate::models::chat::{ ConversationMessage, Notice, SearchResult };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    extract::State,
    response::IntoResponse,
    http::StatusCode,
    Json,
};
use serde::{ Deserialize, Serialize };
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error };

#[derive(Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub history: Vec<ConversationMessage>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SearchResult>,
    pub notices: Vec<Notice>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
struct AppState {
    agent: Arc<ResearchAgent>,
}

pub fn router(agent: Arc<ResearchAgent>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/ask", post(ask_handler))
        .layer(cors)
        .with_state(AppState { agent })
}

pub async fn start_http_server(
    http_port: u16,
    agent: Arc<ResearchAgent>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(agent);

    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    error!("HTTP server error: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            }
        }
    });

    info!("HTTP server started");
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Sessionless, so it is closed whenever logins are required.
async fn ask_handler(State(state): State<AppState>, Json(req): Json<AskRequest>) -> impl IntoResponse {
    if state.agent.requires_login() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: state.agent.prompt_config().login_required.clone(),
            }),
        ).into_response();
    }

    let query = req.query.trim();
    if query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: state.agent.prompt_config().empty_query.clone(),
            }),
        ).into_response();
    }

    let reply = state.agent.ask(query, &req.history, None).await;
    Json(AskResponse {
        answer: reply.answer,
        sources: reply.sources,
        notices: reply.notices,
    }).into_response()
}

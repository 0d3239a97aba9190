//! HTTP retrieval service.
//!
//! `index serve` builds the corpus in the background and answers queries
//! over a small JSON API while the build runs (queries wait for the first
//! index) and after it completes.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Service state, version and section count |
//! | `POST` | `/query` | Budgeted retrieval: `{query, max_tokens}` |
//! | `POST` | `/rank` | Ranked sections without text: `{query, limit?}` |
//! | `POST` | `/reload` | Rebuild the corpus in the background (202) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "budget_too_small", "message": "...", "minimum_budget": 42 } }
//! ```
//!
//! Error codes: `bad_request` (400, unreadable JSON body), `empty_query`
//! (400), `budget_too_small` (400), `not_ready` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use refdex_core::Error as CoreError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::query::{QueryResponse, RankResponse};
use crate::service::{RetrievalService, ServiceError, ServiceState};

/// Start the service: kick off the initial build and serve until the
/// process is terminated.
pub async fn run_server(config: &Config, source: &Path, bind: Option<String>) -> anyhow::Result<()> {
    let bind_addr = bind.unwrap_or_else(|| config.server.bind.clone());

    let service = Arc::new(RetrievalService::new(config.clone(), source));
    service.spawn_rebuild();

    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    println!("refdex listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, source = %source.display(), "server started");

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(service: Arc<RetrievalService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/query", post(handle_query))
        .route("/rank", post(handle_rank))
        .route("/reload", post(handle_reload))
        .layer(cors)
        .with_state(service)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_budget: Option<usize>,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    minimum_budget: Option<usize>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
                minimum_budget: self.minimum_budget,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            ServiceError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
            ServiceError::Query(CoreError::EmptyQuery) => (StatusCode::BAD_REQUEST, "empty_query"),
            ServiceError::Query(CoreError::BudgetTooSmall { .. }) => {
                (StatusCode::BAD_REQUEST, "budget_too_small")
            }
            ServiceError::Query(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let minimum_budget = match &err {
            ServiceError::Query(core) => core.minimum_budget(),
            ServiceError::NotReady => None,
        };
        AppError {
            status,
            code,
            message,
            minimum_budget,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: rejection.body_text(),
            minimum_budget: None,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// `"building"` until the first index is published, then `"ready"`.
    status: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sections: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    build_id: Option<String>,
}

async fn handle_health(State(service): State<Arc<RetrievalService>>) -> Json<HealthResponse> {
    let response = match service.state() {
        ServiceState::Building => HealthResponse {
            status: "building",
            version: env!("CARGO_PKG_VERSION"),
            sections: None,
            build_id: None,
        },
        ServiceState::Ready(snapshot) => HealthResponse {
            status: "ready",
            version: env!("CARGO_PKG_VERSION"),
            sections: Some(snapshot.index.section_count()),
            build_id: Some(snapshot.build_id.clone()),
        },
    };
    Json(response)
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryBody {
    query: String,
    /// Defaults to `[retrieval].default_budget`.
    max_tokens: Option<usize>,
}

async fn handle_query(
    State(service): State<Arc<RetrievalService>>,
    payload: Result<Json<QueryBody>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(body) = payload?;
    let max_tokens = body
        .max_tokens
        .unwrap_or(service.config().retrieval.default_budget);
    let response = service.query(&body.query, max_tokens).await?;
    Ok(Json(response))
}

// ============ POST /rank ============

#[derive(Deserialize)]
struct RankBody {
    query: String,
    limit: Option<usize>,
}

async fn handle_rank(
    State(service): State<Arc<RetrievalService>>,
    payload: Result<Json<RankBody>, JsonRejection>,
) -> Result<Json<RankResponse>, AppError> {
    let Json(body) = payload?;
    let response = service.rank(&body.query, body.limit).await?;
    Ok(Json(response))
}

// ============ POST /reload ============

#[derive(Serialize)]
struct ReloadResponse {
    /// False when a build was already running; the running build wins.
    started: bool,
}

async fn handle_reload(State(service): State<Arc<RetrievalService>>) -> (StatusCode, Json<ReloadResponse>) {
    let started = !service.is_building();
    if started {
        service.spawn_rebuild();
    }
    (StatusCode::ACCEPTED, Json(ReloadResponse { started }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use refdex_core::{build_index, Snapshot};
    use tower::ServiceExt;

    fn service(ready: bool) -> Arc<RetrievalService> {
        let mut config = Config::default();
        config.server.ready_timeout_secs = 0;
        let service = RetrievalService::new(config, "./docs");
        if ready {
            let index = build_index([(
                "istio/security.md",
                "# Security\n\n## Certificate Rotation\n\nIstio rotates mtls certificates.",
            )])
            .index;
            service.publish(Snapshot::new("./docs", index, Vec::new()));
        }
        Arc::new(service)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_state() {
        let Json(building) = handle_health(State(service(false))).await;
        assert_eq!(building.status, "building");
        assert!(building.sections.is_none());

        let Json(ready) = handle_health(State(service(true))).await;
        assert_eq!(ready.status, "ready");
        assert_eq!(ready.sections, Some(1));
    }

    #[tokio::test]
    async fn test_query_ok() {
        let body = QueryBody {
            query: "rotation".to_string(),
            max_tokens: Some(100),
        };
        let Json(response) = handle_query(State(service(true)), Ok(Json(body))).await.ok().unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(
            response.results[0].heading_path,
            vec!["Security", "Certificate Rotation"]
        );
    }

    #[tokio::test]
    async fn test_query_errors_map_to_codes() {
        let body = QueryBody {
            query: "  ".to_string(),
            max_tokens: Some(100),
        };
        let response = handle_query(State(service(true)), Ok(Json(body)))
            .await
            .err()
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "empty_query");

        let body = QueryBody {
            query: "mtls".to_string(),
            max_tokens: Some(1),
        };
        let response = handle_query(State(service(true)), Ok(Json(body)))
            .await
            .err()
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "budget_too_small");
        assert_eq!(json["error"]["minimum_budget"], 4);
    }

    #[tokio::test]
    async fn test_not_ready_is_503() {
        let body = RankBody {
            query: "mtls".to_string(),
            limit: None,
        };
        let response = handle_rank(State(service(false)), Ok(Json(body)))
            .await
            .err()
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["error"]["code"], "not_ready");
    }

    #[tokio::test]
    async fn test_rank_ok() {
        let body = RankBody {
            query: "mtls".to_string(),
            limit: Some(3),
        };
        let Json(response) = handle_rank(State(service(true)), Ok(Json(body))).await.ok().unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].document, "istio/security.md");
    }

    async fn post_json(uri: &str, body: &'static str) -> Response {
        router(service(true))
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_body_is_bad_request() {
        for (uri, body) in [
            ("/query", r#"{"query":"mtls","max_tokens":-5}"#),
            ("/query", r#"{"max_tokens":100}"#),
            ("/rank", "not json"),
        ] {
            let response = post_json(uri, body).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} {}", uri, body);
            let json = body_json(response).await;
            assert_eq!(json["error"]["code"], "bad_request");
            assert!(!json["error"]["message"].as_str().unwrap().is_empty());
            assert!(json["error"].get("minimum_budget").is_none());
        }
    }

    #[tokio::test]
    async fn test_router_serves_valid_query() {
        let response = post_json("/query", r#"{"query":"mtls","max_tokens":100}"#).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["results"][0]["document"], "istio/security.md");
    }

    #[tokio::test]
    async fn test_reload_accepted() {
        let (status, Json(body)) = handle_reload(State(service(true))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.started);
    }
}

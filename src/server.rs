//! HTTP surface: `GET /health` and `POST /recommend`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::pipeline::{Recommender, DEFAULT_MAX_RESULTS};
use crate::retriever::RetrievedItem;

/// Duration reported when the catalog does not state one.
pub const DEFAULT_DURATION_MINUTES: u32 = 60;

/// Origins of the bundled web frontend's dev server.
pub const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:5173", "http://127.0.0.1:5173"];

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    recommender: Arc<Recommender>,
    max_results: usize,
}

impl AppState {
    /// Wraps a recommender; responses are capped at [`DEFAULT_MAX_RESULTS`].
    pub fn new(recommender: Recommender) -> Self {
        Self {
            recommender: Arc::new(recommender),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// Errors returned to HTTP clients as `{"message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body was missing, malformed or unusable.
    #[error("{0}")]
    BadRequest(String),
    /// The pipeline failed (embedding or index).
    #[error("recommendation failed: {0:#}")]
    Pipeline(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Pipeline(err) => {
                error!(error = %format!("{err:#}"), "recommend request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// `POST /recommend` body.
#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    /// Free-text hiring need or job description.
    pub query: String,
}

/// `POST /recommend` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendResponse {
    /// Up to ten assessments, best first.
    pub recommended_assessments: Vec<AssessmentView>,
}

/// One recommended assessment as exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentView {
    /// Product page URL.
    pub url: String,
    /// Assessment name.
    pub name: String,
    /// `"Yes"` or `"No"`.
    pub adaptive_support: String,
    /// Catalog description.
    pub description: String,
    /// Minutes.
    pub duration: u32,
    /// `"Yes"` or `"No"`.
    pub remote_support: String,
    /// Category labels, empty for uncategorized assessments.
    pub test_type: Vec<String>,
}

impl From<&RetrievedItem> for AssessmentView {
    fn from(item: &RetrievedItem) -> Self {
        let record = &item.record;
        Self {
            url: record.url.clone(),
            name: record.assessment_name.clone(),
            adaptive_support: yes_no(record.adaptive_irt),
            description: record.description.clone(),
            duration: record.duration.unwrap_or(DEFAULT_DURATION_MINUTES),
            remote_support: yes_no(record.remote_testing),
            test_type: record
                .test_type
                .label()
                .map(|label| vec![label.to_string()])
                .unwrap_or_default(),
        }
    }
}

fn yes_no(flag: bool) -> String {
    if flag { "Yes" } else { "No" }.to_string()
}

/// Builds the application router with CORS for `cors_origins`.
pub fn router(state: AppState, cors_origins: &[String]) -> anyhow::Result<Router> {
    let origins = cors_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| anyhow::anyhow!("invalid CORS origin {origin:?}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);
    Ok(Router::new()
        .route("/health", get(health))
        .route("/recommend", post(recommend))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn recommend(
    State(state): State<AppState>,
    request: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let Json(request) = request.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest(
            "query text must not be empty".to_string(),
        ));
    }
    let recommendation = state.recommender.recommend(query, state.max_results).await?;
    Ok(Json(RecommendResponse {
        recommended_assessments: recommendation
            .items
            .iter()
            .take(state.max_results)
            .map(AssessmentView::from)
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::recommender;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    fn app() -> Router {
        let origins: Vec<String> = DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect();
        router(AppState::new(recommender(None)), &origins).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/recommend")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let (status, body) = send(app(), post_json(r#"{"query":"   "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "query text must not be empty");
    }

    #[tokio::test]
    async fn malformed_body_gets_json_error() {
        for body in [r#"{"text":"Java"}"#, "not json"] {
            let (status, body) = send(app(), post_json(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
        }
    }

    #[tokio::test]
    async fn recommend_returns_extended_shape() {
        let (status, body) = send(app(), post_json(r#"{"query":"Java developer"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let response: RecommendResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.recommended_assessments.len(), 10);
        let first = &response.recommended_assessments[0];
        assert!(first.name.starts_with("Java"));
        assert_eq!(first.test_type, vec!["Knowledge & Skills"]);
        assert_eq!(first.remote_support, "Yes");
        assert_eq!(first.adaptive_support, "No");
        assert_eq!(first.duration, 20);
    }

    #[tokio::test]
    async fn cors_allows_frontend_origin() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/recommend")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
    }

    #[test]
    fn unknown_test_type_maps_to_empty_labels_and_default_duration() {
        use crate::catalog::TestType;
        use crate::index::tests::entry;

        let mut record = entry("X", TestType::Unknown, vec![1.0]).record;
        record.duration = None;
        let view = AssessmentView::from(&RetrievedItem { record, score: 0.5 });
        assert!(view.test_type.is_empty());
        assert_eq!(view.duration, DEFAULT_DURATION_MINUTES);
    }
}

pub mod protocol;
pub mod rest;
pub mod state;

use crate::config::Config;
use crate::error::ApiError;
use axum::{
    extract::DefaultBodyLimit,
    http::{header::{ACCEPT, CONTENT_TYPE}, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use rest::*;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Builds the complete application router: API routes, CORS for the browser
/// client, the upload size limit and the Swagger UI.
pub fn router(app_state: Arc<AppState>, config: &Config) -> Result<Router, ApiError> {
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    let api_router = Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(get_state_handler))
        .route("/view", put(set_view_handler))
        .route("/selection", put(set_selection_handler))
        .route("/cases", get(list_cases_handler).post(create_case_handler))
        .route("/cases/analyze", post(analyze_expediente_handler))
        .route("/cases/import", post(import_expediente_handler))
        .route("/cases/{id}", get(get_case_handler).delete(delete_case_handler))
        .route("/cases/{id}/open", post(open_case_handler))
        .route("/cases/{id}/files", post(upload_case_file_handler))
        .route("/cases/{id}/timeline", post(regenerate_timeline_handler))
        .route("/norms", get(list_norms_handler).post(upload_norm_handler))
        .route("/norms/{id}", axum::routing::delete(delete_norm_handler))
        .route("/assistant", post(assistant_handler))
        .route("/assistant/greeting", get(greeting_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())))
}

//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Handlers only translate HTTP into synchronizer and workflow calls; storage
//! failures never reach the client.

use crate::web::protocol::{
    AnalyzeResponse, AssistantRequest, CaseSummary, CreateCaseRequest, NormSummary, SetSelectionRequest,
    SetViewRequest, StateSummary, UploadForm,
};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use lexchile_core::domain::ViewState;
use lexchile_core::ports::PortError;
use lexchile_core::workflows::{self, AssistantQuery, NewCase, Upload};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::OpenApi;

/// A handler error: status code and a message the client can show as is.
type HandlerError = (StatusCode, String);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        get_state_handler,
        set_view_handler,
        set_selection_handler,
        list_cases_handler,
        create_case_handler,
        analyze_expediente_handler,
        import_expediente_handler,
        get_case_handler,
        delete_case_handler,
        open_case_handler,
        upload_case_file_handler,
        regenerate_timeline_handler,
        list_norms_handler,
        upload_norm_handler,
        delete_norm_handler,
        greeting_handler,
        assistant_handler,
    ),
    components(
        schemas(
            StateSummary, CaseSummary, NormSummary, SetViewRequest, SetSelectionRequest,
            CreateCaseRequest, AssistantRequest, AnalyzeResponse, UploadForm
        )
    ),
    tags(
        (name = "LexChile API", description = "Case, expediente, normative and assistant endpoints for the LexChile desk.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps a core error onto a status code and a message in the client's language.
fn port_error(e: PortError) -> HandlerError {
    match e {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::ExtractionFailed(_) => (
            StatusCode::BAD_GATEWAY,
            "No se pudo analizar el archivo. Intente ingresando los datos manualmente.".to_string(),
        ),
        PortError::TimelineGenerationFailed(_) => (
            StatusCode::BAD_GATEWAY,
            "Error al generar línea de tiempo.".to_string(),
        ),
        PortError::AssistantUnavailable(_) => (
            StatusCode::BAD_GATEWAY,
            workflows::ASSISTANT_FALLBACK.to_string(),
        ),
        other => {
            error!("Unexpected error while handling request: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error interno del servidor.".to_string(),
            )
        }
    }
}

fn case_not_found(case_id: &str) -> HandlerError {
    (StatusCode::NOT_FOUND, format!("Case {} not found", case_id))
}

/// Reads the first file part of a multipart form.
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, HandlerError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {}", e),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Multipart form must include a file".to_string(),
            )
        })?;

    let name = field
        .file_name()
        .or_else(|| field.name())
        .unwrap_or("documento")
        .to_string();
    let mime_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(|e| {
        warn!("Upload of '{}' was interrupted: {}", name, e);
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read file bytes: {}", e),
        )
    })?;

    Ok(Upload {
        name,
        mime_type,
        bytes: bytes.to_vec(),
    })
}

//=========================================================================================
// Navigation Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(get, path = "/health", responses((status = 200, description = "Server is up")))]
pub async fn health_handler() -> &'static str {
    "ok"
}

/// The current view, selection and collection summaries.
#[utoipa::path(
    get,
    path = "/state",
    responses((status = 200, description = "Current application state", body = StateSummary))
)]
pub async fn get_state_handler(State(app_state): State<Arc<AppState>>) -> Json<StateSummary> {
    Json(StateSummary::from(&app_state.sync.snapshot()))
}

/// Switches the screen the client should show.
#[utoipa::path(
    put,
    path = "/view",
    request_body = SetViewRequest,
    responses((status = 200, description = "View changed", body = StateSummary))
)]
pub async fn set_view_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<SetViewRequest>,
) -> Json<StateSummary> {
    match request.view {
        ViewState::Dashboard => workflows::show_dashboard(&app_state.sync),
        ViewState::Settings => workflows::show_settings(&app_state.sync),
        ViewState::CaseDetail => app_state.sync.set_view_state(ViewState::CaseDetail),
    }
    Json(StateSummary::from(&app_state.sync.snapshot()))
}

/// Selects a case, or clears the selection with `caseId: null`.
#[utoipa::path(
    put,
    path = "/selection",
    request_body = SetSelectionRequest,
    responses(
        (status = 200, description = "Selection changed", body = StateSummary),
        (status = 404, description = "Unknown case")
    )
)]
pub async fn set_selection_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<SetSelectionRequest>,
) -> Result<Json<StateSummary>, HandlerError> {
    if let Some(case_id) = request.case_id.as_deref() {
        if app_state.sync.case(case_id).is_none() {
            return Err(case_not_found(case_id));
        }
    }
    app_state.sync.set_current_case_id(request.case_id);
    Ok(Json(StateSummary::from(&app_state.sync.snapshot())))
}

//=========================================================================================
// Case Handlers
//=========================================================================================

/// Dashboard cards, in display order.
#[utoipa::path(
    get,
    path = "/cases",
    responses((status = 200, description = "All cases", body = [CaseSummary]))
)]
pub async fn list_cases_handler(State(app_state): State<Arc<AppState>>) -> Json<Vec<CaseSummary>> {
    let state = app_state.sync.snapshot();
    Json(state.cases.iter().map(CaseSummary::from).collect())
}

/// Creates a case from the new-case form.
#[utoipa::path(
    post,
    path = "/cases",
    request_body = CreateCaseRequest,
    responses(
        (status = 201, description = "Case created"),
        (status = 400, description = "Rol or carátula missing")
    )
)]
pub async fn create_case_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<CreateCaseRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let case = workflows::create_case(
        &app_state.sync,
        NewCase {
            rol: request.rol,
            caratula: request.caratula,
            court: request.court,
            initial_file: request.initial_file,
        },
    )
    .map_err(port_error)?;
    Ok((StatusCode::CREATED, Json(case)))
}

/// Pre-fills the new-case form from an uploaded expediente. Stores nothing.
#[utoipa::path(
    post,
    path = "/cases/analyze",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Suggested form fields and the prepared file", body = AnalyzeResponse),
        (status = 502, description = "The assistant could not analyze the file")
    )
)]
pub async fn analyze_expediente_handler(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, HandlerError> {
    let upload = read_upload(&mut multipart).await?;
    let draft = workflows::analyze_expediente(app_state.assistant.as_ref(), upload)
        .await
        .map_err(port_error)?;
    Ok(Json(AnalyzeResponse {
        metadata: draft.metadata,
        file: draft.file,
    }))
}

/// Analyzes an uploaded expediente and creates the case from the extracted
/// fields, with the file attached.
#[utoipa::path(
    post,
    path = "/cases/import",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Case created from the expediente"),
        (status = 400, description = "Extracted rol or carátula was empty"),
        (status = 502, description = "The assistant could not analyze the file")
    )
)]
pub async fn import_expediente_handler(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let upload = read_upload(&mut multipart).await?;
    let case = workflows::create_case_from_expediente(&app_state.sync, app_state.assistant.as_ref(), upload)
        .await
        .map_err(port_error)?;
    Ok((StatusCode::CREATED, Json(case)))
}

#[utoipa::path(
    get,
    path = "/cases/{id}",
    params(("id" = String, Path, description = "Case identifier")),
    responses(
        (status = 200, description = "The full case with files and timeline"),
        (status = 404, description = "Unknown case")
    )
)]
pub async fn get_case_handler(
    State(app_state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    app_state
        .sync
        .case(&case_id)
        .map(Json)
        .ok_or_else(|| case_not_found(&case_id))
}

/// Deletes a case and its expediente. Deleting an unknown id succeeds.
#[utoipa::path(
    delete,
    path = "/cases/{id}",
    params(("id" = String, Path, description = "Case identifier")),
    responses((status = 204, description = "Case removed"))
)]
pub async fn delete_case_handler(
    State(app_state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> StatusCode {
    app_state.sync.delete_case(&case_id);
    StatusCode::NO_CONTENT
}

/// Selects the case and switches to its detail screen.
#[utoipa::path(
    post,
    path = "/cases/{id}/open",
    params(("id" = String, Path, description = "Case identifier")),
    responses(
        (status = 200, description = "Case opened"),
        (status = 404, description = "Unknown case")
    )
)]
pub async fn open_case_handler(
    State(app_state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let case = workflows::open_case(&app_state.sync, &case_id).map_err(port_error)?;
    Ok(Json(case))
}

/// Appends an uploaded file to the case's expediente.
#[utoipa::path(
    post,
    path = "/cases/{id}/files",
    params(("id" = String, Path, description = "Case identifier")),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File attached"),
        (status = 404, description = "Unknown case")
    )
)]
pub async fn upload_case_file_handler(
    State(app_state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    if app_state.sync.case(&case_id).is_none() {
        return Err(case_not_found(&case_id));
    }
    let upload = read_upload(&mut multipart).await?;
    let file = workflows::attach_file(&app_state.sync, &case_id, upload)
        .ok_or_else(|| case_not_found(&case_id))?;
    Ok((StatusCode::CREATED, Json(file)))
}

/// Rebuilds the timeline from every file of the expediente.
#[utoipa::path(
    post,
    path = "/cases/{id}/timeline",
    params(("id" = String, Path, description = "Case identifier")),
    responses(
        (status = 200, description = "The new timeline"),
        (status = 400, description = "The expediente has no files"),
        (status = 404, description = "Unknown case"),
        (status = 502, description = "The assistant failed")
    )
)]
pub async fn regenerate_timeline_handler(
    State(app_state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let timeline = workflows::regenerate_timeline(&app_state.sync, app_state.assistant.as_ref(), &case_id)
        .await
        .map_err(|e| match e {
            PortError::InvalidInput(_) => (
                StatusCode::BAD_REQUEST,
                "Sube archivos al expediente electrónico (E-Book) primero.".to_string(),
            ),
            other => port_error(other),
        })?;
    Ok(Json(timeline))
}

//=========================================================================================
// Normative Document Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/norms",
    responses((status = 200, description = "Uploaded normative documents", body = [NormSummary]))
)]
pub async fn list_norms_handler(State(app_state): State<Arc<AppState>>) -> Json<Vec<NormSummary>> {
    Json(app_state.sync.normative_docs().iter().map(NormSummary::from).collect())
}

#[utoipa::path(
    post,
    path = "/norms",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses((status = 201, description = "Document stored", body = NormSummary))
)]
pub async fn upload_norm_handler(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let upload = read_upload(&mut multipart).await?;
    let doc = workflows::upload_normative_doc(&app_state.sync, upload);
    Ok((StatusCode::CREATED, Json(NormSummary::from(&doc))))
}

#[utoipa::path(
    delete,
    path = "/norms/{id}",
    params(("id" = String, Path, description = "Normative document identifier")),
    responses((status = 204, description = "Document removed"))
)]
pub async fn delete_norm_handler(
    State(app_state): State<Arc<AppState>>,
    Path(doc_id): Path<String>,
) -> StatusCode {
    app_state.sync.remove_normative_doc(&doc_id);
    StatusCode::NO_CONTENT
}

//=========================================================================================
// Assistant Handlers
//=========================================================================================

#[utoipa::path(get, path = "/assistant/greeting", responses((status = 200, description = "Opening message")))]
pub async fn greeting_handler() -> impl IntoResponse {
    Json(workflows::greeting())
}

/// One assistant turn. An unreachable assistant still answers 200 with the
/// fallback message.
#[utoipa::path(
    post,
    path = "/assistant",
    request_body = AssistantRequest,
    responses(
        (status = 200, description = "The assistant's reply"),
        (status = 400, description = "Empty query")
    )
)]
pub async fn assistant_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<AssistantRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let reply = workflows::ask_assistant(
        &app_state.sync,
        app_state.assistant.as_ref(),
        AssistantQuery {
            query: request.query,
            history: request.history,
            use_web_search: request.use_web_search,
            include_case_context: request.include_case_context,
            case_id: request.case_id,
        },
    )
    .await
    .map_err(port_error)?;
    Ok(Json(reply))
}

//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the browser client and the API server.

use lexchile_core::domain::{Case, CaseFile, CaseMetadata, ChatMessage, NormativeDoc, ViewState};
use lexchile_core::state::AppState;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

//=========================================================================================
// Payloads Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// NOTE: documents are uploaded as multipart/form-data, not as part of these structs.
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetViewRequest {
    /// One of `DASHBOARD`, `CASE_DETAIL`, `SETTINGS`.
    #[schema(value_type = String)]
    pub view: ViewState,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetSelectionRequest {
    pub case_id: Option<String>,
}

/// The new-case form. `initialFile` is the file returned by `/cases/analyze`.
#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCaseRequest {
    pub rol: String,
    pub caratula: String,
    #[serde(default)]
    pub court: String,
    #[schema(value_type = Option<Object>)]
    pub initial_file: Option<CaseFile>,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRequest {
    pub query: String,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub use_web_search: bool,
    #[serde(default)]
    pub include_case_context: bool,
    pub case_id: Option<String>,
}

/// The multipart form every upload route accepts. Only the first file part
/// is read; its file name and content type are kept.
#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(content_media_type = "application/octet-stream")]
    pub file: Vec<u8>,
}

//=========================================================================================
// Payloads Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// A dashboard card.
#[derive(Serialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaseSummary {
    pub id: String,
    pub rol: String,
    pub caratula: String,
    pub court: String,
    pub created_at: String,
    pub file_count: usize,
    pub timeline_count: usize,
}

impl From<&Case> for CaseSummary {
    fn from(case: &Case) -> Self {
        Self {
            id: case.id.clone(),
            rol: case.rol.clone(),
            caratula: case.caratula.clone(),
            court: case.court.clone(),
            created_at: case.created_at.clone(),
            file_count: case.files.len(),
            timeline_count: case.timeline.len(),
        }
    }
}

/// A normative document without its payload.
#[derive(Serialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NormSummary {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

impl From<&NormativeDoc> for NormSummary {
    fn from(doc: &NormativeDoc) -> Self {
        Self {
            id: doc.id.clone(),
            name: doc.name.clone(),
            mime_type: doc.mime_type.clone(),
        }
    }
}

/// What the client needs to render the current screen.
#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StateSummary {
    #[schema(value_type = String)]
    pub view_state: ViewState,
    pub current_case_id: Option<String>,
    pub cases: Vec<CaseSummary>,
    pub normative_docs: Vec<NormSummary>,
}

impl From<&AppState> for StateSummary {
    fn from(state: &AppState) -> Self {
        Self {
            view_state: state.view_state,
            current_case_id: state.current_case_id.clone(),
            cases: state.cases.iter().map(CaseSummary::from).collect(),
            normative_docs: state.normative_docs.iter().map(NormSummary::from).collect(),
        }
    }
}

/// Suggested form fields plus the prepared file, from `/cases/analyze`.
#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    #[schema(value_type = Object)]
    pub metadata: CaseMetadata,
    #[schema(value_type = Object)]
    pub file: CaseFile,
}

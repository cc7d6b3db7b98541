//! crates/lexchile_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! Records are persisted whole, so they carry their own serde shape
//! (camelCase, the same layout the browser client sends and receives).

use serde::{Deserialize, Serialize};

/// A legal matter ("causa") tracked by the application.
///
/// Files and timeline are embedded by value: a case is always read and
/// written as one self-contained record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    /// Docket number, e.g. `C-123-2024`.
    pub rol: String,
    /// Caption naming the parties, `DEMANDANTE / DEMANDADO`.
    pub caratula: String,
    pub court: String,
    pub created_at: String,
    #[serde(default)]
    pub files: Vec<CaseFile>,
    #[serde(default)]
    pub timeline: Vec<CaseEvent>,
}

/// A document of the case's expediente (E-Book).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseFile {
    pub id: String,
    pub name: String,
    pub upload_date: String,
    pub mime_type: String,
    /// Base64 encoded payload.
    pub content: String,
}

/// A procedural milestone. Identity is its position in the owning timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseEvent {
    pub date: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: CaseEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseEventKind {
    #[serde(rename = "resolucion")]
    Resolution,
    #[serde(rename = "escrito")]
    Filing,
    #[serde(rename = "otro")]
    Other,
}

/// A reference legal document (statute, court rule) given to the assistant as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormativeDoc {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Base64 encoded payload.
    pub content: String,
}

/// The screen the client should be showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewState {
    #[default]
    Dashboard,
    CaseDetail,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One turn of an assistant conversation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

/// Fields extracted from an uploaded expediente. Any of them may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseMetadata {
    #[serde(default)]
    pub rol: String,
    #[serde(default)]
    pub caratula: String,
    #[serde(default)]
    pub court: String,
}

/// The assistant's answer to a single query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

//! crates/lexchile_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! core independent of the storage engine and of the generative-AI provider.

use async_trait::async_trait;
use crate::domain::{AssistantReply, Case, CaseEvent, CaseFile, CaseMetadata, ChatMessage, NormativeDoc};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The error type shared by all port operations and core workflows.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The durable layer could not be opened or read.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    /// A single durable write or delete failed.
    #[error("Persist failure: {0}")]
    PersistFailure(String),
    #[error("Metadata extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("Timeline generation failed: {0}")]
    TimelineGenerationFailed(String),
    #[error("Assistant unavailable: {0}")]
    AssistantUnavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable storage for the two independent record collections.
///
/// Every write carries a whole record; implementations upsert by id and never
/// patch. Deleting an id that is not stored succeeds.
#[async_trait]
pub trait CaseStore: Send + Sync {
    // --- Cases ---
    async fn read_all_cases(&self) -> PortResult<Vec<Case>>;

    async fn write_case(&self, case: &Case) -> PortResult<()>;

    async fn delete_case(&self, case_id: &str) -> PortResult<()>;

    // --- Normative documents ---
    async fn read_all_norms(&self) -> PortResult<Vec<NormativeDoc>>;

    async fn write_norm(&self, doc: &NormativeDoc) -> PortResult<()>;

    async fn delete_norm(&self, doc_id: &str) -> PortResult<()>;
}

/// The external generative-AI service.
#[async_trait]
pub trait LegalAssistantService: Send + Sync {
    /// Best-effort extraction of rol, carátula and court from an expediente's text.
    async fn extract_metadata(&self, raw_text: &str) -> PortResult<CaseMetadata>;

    /// Builds the procedural timeline of a case from its files.
    async fn generate_timeline(&self, files: &[CaseFile]) -> PortResult<Vec<CaseEvent>>;

    /// Answers one query. The whole prior conversation is sent every time.
    async fn ask(
        &self,
        query: &str,
        normative_docs: &[NormativeDoc],
        use_web_search: bool,
        prior_messages: &[ChatMessage],
        case_files: &[CaseFile],
    ) -> PortResult<AssistantReply>;
}

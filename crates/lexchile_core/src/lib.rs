pub mod domain;
pub mod encoding;
pub mod memory;
pub mod ports;
pub mod state;
pub mod sync;
pub mod workflows;

pub use domain::{
    AssistantReply, Case, CaseEvent, CaseEventKind, CaseFile, CaseMetadata, ChatMessage, ChatRole,
    NormativeDoc, ViewState,
};
pub use memory::MemoryStore;
pub use ports::{CaseStore, LegalAssistantService, PortError, PortResult};
pub use state::AppState;
pub use sync::Synchronizer;

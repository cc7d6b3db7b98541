//! services/api/src/web/state.rs
//!
//! Defines the application state shared by all handlers.

use lexchile_core::ports::LegalAssistantService;
use lexchile_core::sync::Synchronizer;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<Synchronizer>,
    pub assistant: Arc<dyn LegalAssistantService>,
}

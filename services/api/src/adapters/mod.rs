pub mod assistant_llm;
pub mod db;

pub use assistant_llm::OpenAiLegalAssistantAdapter;
pub use db::{open_store, SqliteStore, UnreachableStore};

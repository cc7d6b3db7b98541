//! crates/lexchile_core/src/memory.rs
//!
//! A `CaseStore` that keeps both collections in process memory. Records are
//! returned in key order, like an ordered key-value engine would.

use crate::domain::{Case, NormativeDoc};
use crate::ports::{CaseStore, PortResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    cases: Mutex<BTreeMap<String, Case>>,
    norms: Mutex<BTreeMap<String, NormativeDoc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with the given records.
    pub fn with_records(cases: Vec<Case>, norms: Vec<NormativeDoc>) -> Self {
        Self {
            cases: Mutex::new(cases.into_iter().map(|c| (c.id.clone(), c)).collect()),
            norms: Mutex::new(norms.into_iter().map(|d| (d.id.clone(), d)).collect()),
        }
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn read_all_cases(&self) -> PortResult<Vec<Case>> {
        Ok(self.cases.lock().await.values().cloned().collect())
    }

    async fn write_case(&self, case: &Case) -> PortResult<()> {
        self.cases.lock().await.insert(case.id.clone(), case.clone());
        Ok(())
    }

    async fn delete_case(&self, case_id: &str) -> PortResult<()> {
        self.cases.lock().await.remove(case_id);
        Ok(())
    }

    async fn read_all_norms(&self) -> PortResult<Vec<NormativeDoc>> {
        Ok(self.norms.lock().await.values().cloned().collect())
    }

    async fn write_norm(&self, doc: &NormativeDoc) -> PortResult<()> {
        self.norms.lock().await.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn delete_norm(&self, doc_id: &str) -> PortResult<()> {
        self.norms.lock().await.remove(doc_id);
        Ok(())
    }
}

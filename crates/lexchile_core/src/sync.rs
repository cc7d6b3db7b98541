//! crates/lexchile_core/src/sync.rs
//!
//! The state synchronizer: the single source of truth for the views during a
//! session.
//!
//! Every mutation runs in two phases. The pure transition (`state::apply`) is
//! applied to the published state immediately, so all readers see it on
//! return. The durable write it implies is then spawned as a detached task.
//! A failed write is logged and nothing else: memory stays authoritative for
//! the rest of the session and storage lags behind until the next successful
//! write of the same record. Two writes of the same record race and the last
//! one to reach the store wins.

use crate::domain::{Case, CaseEvent, CaseFile, NormativeDoc, ViewState};
use crate::ports::{CaseStore, PortResult};
use crate::state::{apply, Action, AppState, Effect};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

pub struct Synchronizer {
    store: Arc<dyn CaseStore>,
    state: watch::Sender<AppState>,
    persists: TaskTracker,
    flush_lock: Mutex<()>,
}

impl Synchronizer {
    /// Hydrates the in-memory state from `store`.
    ///
    /// This is the only way to obtain a `Synchronizer`, so loading happens
    /// once per session and before any mutation. A collection that cannot be
    /// read starts out empty.
    pub async fn initialize(store: Arc<dyn CaseStore>) -> Self {
        let cases = store.read_all_cases().await.unwrap_or_else(|e| {
            error!("Error reading cases from the durable store: {}", e);
            Vec::new()
        });
        let norms = store.read_all_norms().await.unwrap_or_else(|e| {
            error!("Error reading normative documents from the durable store: {}", e);
            Vec::new()
        });
        info!(
            cases = cases.len(),
            normative_docs = norms.len(),
            "In-memory state hydrated."
        );

        let (state, _) = watch::channel(AppState::hydrated(cases, norms));
        Self {
            store,
            state,
            persists: TaskTracker::new(),
            flush_lock: Mutex::new(()),
        }
    }

    // --- Mutations ---

    pub fn add_case(&self, case: Case) {
        self.dispatch(Action::AddCase(case));
    }

    /// Removes a case. If it was selected, the selection is cleared and the
    /// view goes back to the dashboard.
    pub fn delete_case(&self, case_id: &str) {
        self.dispatch(Action::DeleteCase(case_id.to_string()));
    }

    /// Appends a file to a case. Unknown case ids are ignored.
    pub fn add_case_file(&self, case_id: &str, file: CaseFile) {
        self.dispatch(Action::AddCaseFile {
            case_id: case_id.to_string(),
            file,
        });
    }

    /// Replaces a case's whole timeline. Unknown case ids are ignored.
    pub fn update_case_timeline(&self, case_id: &str, timeline: Vec<CaseEvent>) {
        self.dispatch(Action::UpdateCaseTimeline {
            case_id: case_id.to_string(),
            timeline,
        });
    }

    pub fn add_normative_doc(&self, doc: NormativeDoc) {
        self.dispatch(Action::AddNormativeDoc(doc));
    }

    pub fn remove_normative_doc(&self, doc_id: &str) {
        self.dispatch(Action::RemoveNormativeDoc(doc_id.to_string()));
    }

    pub fn set_current_case_id(&self, case_id: Option<String>) {
        self.dispatch(Action::SetCurrentCase(case_id));
    }

    pub fn set_view_state(&self, view: ViewState) {
        self.dispatch(Action::SetView(view));
    }

    // --- Readers ---

    pub fn snapshot(&self) -> AppState {
        self.state.borrow().clone()
    }

    pub fn cases(&self) -> Vec<Case> {
        self.state.borrow().cases.clone()
    }

    pub fn case(&self, case_id: &str) -> Option<Case> {
        self.state.borrow().case(case_id).cloned()
    }

    pub fn current_case(&self) -> Option<Case> {
        self.state.borrow().current_case().cloned()
    }

    pub fn current_case_id(&self) -> Option<String> {
        self.state.borrow().current_case_id.clone()
    }

    pub fn view_state(&self) -> ViewState {
        self.state.borrow().view_state
    }

    pub fn normative_docs(&self) -> Vec<NormativeDoc> {
        self.state.borrow().normative_docs.clone()
    }

    /// A receiver that is notified after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    /// Waits for every durable write dispatched so far to finish.
    ///
    /// Mutations never call this; it exists for shutdown and tests.
    pub async fn flush(&self) {
        let _guard = self.flush_lock.lock().await;
        self.persists.close();
        self.persists.wait().await;
        self.persists.reopen();
    }

    fn dispatch(&self, action: Action) {
        let mut effect = None;
        self.state.send_modify(|state| effect = apply(state, action));
        if let Some(effect) = effect {
            self.persist(effect);
        }
    }

    fn persist(&self, effect: Effect) {
        let store = Arc::clone(&self.store);
        self.persists.spawn(async move {
            let (what, id) = describe(&effect);
            match run_effect(store.as_ref(), &effect).await {
                Ok(()) => debug!(record = %id, "Persisted {}.", what),
                Err(e) => error!(record = %id, "Failed to persist {}: {}", what, e),
            }
        });
    }
}

async fn run_effect(store: &dyn CaseStore, effect: &Effect) -> PortResult<()> {
    match effect {
        Effect::PersistCase(case) => store.write_case(case).await,
        Effect::DeleteCase(case_id) => store.delete_case(case_id).await,
        Effect::PersistNorm(doc) => store.write_norm(doc).await,
        Effect::DeleteNorm(doc_id) => store.delete_norm(doc_id).await,
    }
}

fn describe(effect: &Effect) -> (&'static str, String) {
    match effect {
        Effect::PersistCase(case) => ("case write", case.id.clone()),
        Effect::DeleteCase(case_id) => ("case deletion", case_id.clone()),
        Effect::PersistNorm(doc) => ("normative document write", doc.id.clone()),
        Effect::DeleteNorm(doc_id) => ("normative document deletion", doc_id.clone()),
    }
}

//! crates/lexchile_core/src/state.rs
//!
//! The in-memory application state and its transition function.
//!
//! `apply` performs no I/O. It mutates the state and reports the durable
//! write the mutation implies, which the synchronizer then dispatches.

use crate::domain::{Case, CaseEvent, CaseFile, NormativeDoc, ViewState};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Everything the views read during a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub view_state: ViewState,
    pub current_case_id: Option<String>,
    /// Most recent first at load time; later insertions go to the front.
    pub cases: Vec<Case>,
    pub normative_docs: Vec<NormativeDoc>,
}

impl AppState {
    /// Builds the state published at startup from the stored collections.
    pub fn hydrated(mut cases: Vec<Case>, normative_docs: Vec<NormativeDoc>) -> Self {
        sort_by_recency(&mut cases);
        Self {
            cases,
            normative_docs,
            ..Self::default()
        }
    }

    pub fn case(&self, case_id: &str) -> Option<&Case> {
        self.cases.iter().find(|c| c.id == case_id)
    }

    pub fn current_case(&self) -> Option<&Case> {
        self.current_case_id.as_deref().and_then(|id| self.case(id))
    }
}

/// A mutation requested by a view.
#[derive(Debug, Clone)]
pub enum Action {
    AddCase(Case),
    DeleteCase(String),
    AddCaseFile { case_id: String, file: CaseFile },
    UpdateCaseTimeline { case_id: String, timeline: Vec<CaseEvent> },
    AddNormativeDoc(NormativeDoc),
    RemoveNormativeDoc(String),
    SetCurrentCase(Option<String>),
    SetView(ViewState),
}

/// The durable write implied by a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PersistCase(Case),
    DeleteCase(String),
    PersistNorm(NormativeDoc),
    DeleteNorm(String),
}

/// Applies `action` to `state`.
///
/// Returns the write to dispatch, or `None` when nothing durable changed
/// (navigation, selection, or an action aimed at an unknown case).
pub fn apply(state: &mut AppState, action: Action) -> Option<Effect> {
    match action {
        Action::AddCase(case) => {
            state.cases.insert(0, case.clone());
            Some(Effect::PersistCase(case))
        }
        Action::DeleteCase(case_id) => {
            state.cases.retain(|c| c.id != case_id);
            if state.current_case_id.as_deref() == Some(case_id.as_str()) {
                state.current_case_id = None;
                state.view_state = ViewState::Dashboard;
            }
            Some(Effect::DeleteCase(case_id))
        }
        Action::AddCaseFile { case_id, file } => {
            let case = state.cases.iter_mut().find(|c| c.id == case_id)?;
            case.files.push(file);
            Some(Effect::PersistCase(case.clone()))
        }
        Action::UpdateCaseTimeline { case_id, timeline } => {
            let case = state.cases.iter_mut().find(|c| c.id == case_id)?;
            case.timeline = timeline;
            Some(Effect::PersistCase(case.clone()))
        }
        Action::AddNormativeDoc(doc) => {
            state.normative_docs.push(doc.clone());
            Some(Effect::PersistNorm(doc))
        }
        Action::RemoveNormativeDoc(doc_id) => {
            state.normative_docs.retain(|d| d.id != doc_id);
            Some(Effect::DeleteNorm(doc_id))
        }
        Action::SetCurrentCase(case_id) => {
            state.current_case_id = case_id;
            None
        }
        Action::SetView(view) => {
            state.view_state = view;
            None
        }
    }
}

/// Sorts cases by `createdAt`, newest first. The sort is stable, and dates
/// that cannot be parsed sort after every dated case.
pub fn sort_by_recency(cases: &mut [Case]) {
    cases.sort_by(|a, b| created_at_key(&b.created_at).cmp(&created_at_key(&a.created_at)));
}

fn created_at_key(created_at: &str) -> Option<NaiveDateTime> {
    let trimmed = created_at.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.naive_utc())
        .ok()
}

//! crates/lexchile_core/src/workflows.rs
//!
//! The user flows of the case desk, composed from the synchronizer and the
//! AI gateway. Gateway failures leave the state untouched.

use crate::domain::{Case, CaseEvent, CaseFile, CaseMetadata, ChatMessage, ChatRole, NormativeDoc, ViewState};
use crate::encoding::{encode_payload, today, DEFAULT_CASE_FILE_MIME, DEFAULT_NORM_MIME};
use crate::ports::{LegalAssistantService, PortError, PortResult};
use crate::sync::Synchronizer;
use tracing::{error, info};
use uuid::Uuid;

/// The assistant's opening message in a new conversation.
pub const GREETING: &str = "Hola. Soy Lex, tu asistente legal. ¿En qué puedo ayudarte hoy?";

/// Shown in place of an answer when the assistant cannot be reached.
pub const ASSISTANT_FALLBACK: &str = "Lo siento, ha ocurrido un error en el servicio.";

/// A file as received from the client, before encoding.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn into_case_file(self) -> CaseFile {
        CaseFile {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            upload_date: today(),
            mime_type: non_blank(self.mime_type).unwrap_or_else(|| DEFAULT_CASE_FILE_MIME.to_string()),
            content: encode_payload(&self.bytes),
        }
    }

    pub fn into_normative_doc(self) -> NormativeDoc {
        NormativeDoc {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            mime_type: non_blank(self.mime_type).unwrap_or_else(|| DEFAULT_NORM_MIME.to_string()),
            content: encode_payload(&self.bytes),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

//=========================================================================================
// Case creation
//=========================================================================================

/// Fields entered on the new-case form.
#[derive(Debug, Clone, Default)]
pub struct NewCase {
    pub rol: String,
    pub caratula: String,
    pub court: String,
    pub initial_file: Option<CaseFile>,
}

/// Creates a case from the form. Rol and carátula are required.
pub fn create_case(sync: &Synchronizer, new_case: NewCase) -> PortResult<Case> {
    if new_case.rol.trim().is_empty() || new_case.caratula.trim().is_empty() {
        return Err(PortError::InvalidInput(
            "rol and caratula are required".to_string(),
        ));
    }

    let case = Case {
        id: Uuid::new_v4().to_string(),
        rol: new_case.rol,
        caratula: new_case.caratula,
        court: new_case.court,
        created_at: today(),
        files: new_case.initial_file.into_iter().collect(),
        timeline: Vec::new(),
    };
    sync.add_case(case.clone());
    info!(case_id = %case.id, rol = %case.rol, "Case created.");
    Ok(case)
}

/// The result of analyzing an uploaded expediente: suggested form fields and
/// the file that will be attached once the case is created.
#[derive(Debug, Clone)]
pub struct ExpedienteDraft {
    pub metadata: CaseMetadata,
    pub file: CaseFile,
}

/// Asks the assistant to pre-fill the new-case form from an expediente.
/// Nothing is stored.
pub async fn analyze_expediente(
    gateway: &dyn LegalAssistantService,
    upload: Upload,
) -> PortResult<ExpedienteDraft> {
    let raw_text = String::from_utf8_lossy(&upload.bytes).into_owned();
    let metadata = gateway.extract_metadata(&raw_text).await.map_err(|e| {
        error!("Error extracting metadata from '{}': {}", upload.name, e);
        e
    })?;
    Ok(ExpedienteDraft {
        metadata,
        file: upload.into_case_file(),
    })
}

/// Analyzes an expediente and creates the case in one step, attaching the file.
pub async fn create_case_from_expediente(
    sync: &Synchronizer,
    gateway: &dyn LegalAssistantService,
    upload: Upload,
) -> PortResult<Case> {
    let draft = analyze_expediente(gateway, upload).await?;
    create_case(
        sync,
        NewCase {
            rol: draft.metadata.rol,
            caratula: draft.metadata.caratula,
            court: draft.metadata.court,
            initial_file: Some(draft.file),
        },
    )
}

//=========================================================================================
// Expediente and normative documents
//=========================================================================================

/// Encodes an upload and appends it to a case. `None` if the case is unknown.
pub fn attach_file(sync: &Synchronizer, case_id: &str, upload: Upload) -> Option<CaseFile> {
    sync.case(case_id)?;
    let file = upload.into_case_file();
    sync.add_case_file(case_id, file.clone());
    Some(file)
}

pub fn upload_normative_doc(sync: &Synchronizer, upload: Upload) -> NormativeDoc {
    let doc = upload.into_normative_doc();
    sync.add_normative_doc(doc.clone());
    doc
}

/// Regenerates a case's timeline from its files and replaces the old one.
pub async fn regenerate_timeline(
    sync: &Synchronizer,
    gateway: &dyn LegalAssistantService,
    case_id: &str,
) -> PortResult<Vec<CaseEvent>> {
    let case = sync
        .case(case_id)
        .ok_or_else(|| PortError::NotFound(format!("Case {} not found", case_id)))?;
    if case.files.is_empty() {
        return Err(PortError::InvalidInput(
            "the expediente has no files to analyze".to_string(),
        ));
    }

    let timeline = gateway.generate_timeline(&case.files).await.map_err(|e| {
        error!(case_id, "Error generating timeline: {}", e);
        e
    })?;
    info!(case_id, events = timeline.len(), "Timeline regenerated.");
    sync.update_case_timeline(case_id, timeline.clone());
    Ok(timeline)
}

//=========================================================================================
// Navigation
//=========================================================================================

/// Selects a case and shows its detail screen.
pub fn open_case(sync: &Synchronizer, case_id: &str) -> PortResult<Case> {
    let case = sync
        .case(case_id)
        .ok_or_else(|| PortError::NotFound(format!("Case {} not found", case_id)))?;
    sync.set_current_case_id(Some(case.id.clone()));
    sync.set_view_state(ViewState::CaseDetail);
    Ok(case)
}

pub fn show_dashboard(sync: &Synchronizer) {
    sync.set_view_state(ViewState::Dashboard);
}

pub fn show_settings(sync: &Synchronizer) {
    sync.set_view_state(ViewState::Settings);
}

//=========================================================================================
// Assistant
//=========================================================================================

/// One question to the assistant, with the conversation so far.
#[derive(Debug, Clone, Default)]
pub struct AssistantQuery {
    pub query: String,
    pub history: Vec<ChatMessage>,
    pub use_web_search: bool,
    /// Send the files of this case (or of the selected case when `None`).
    pub include_case_context: bool,
    pub case_id: Option<String>,
}

/// Asks the assistant and returns its reply as a chat message.
///
/// Every normative document is sent as context. An unavailable assistant
/// yields [`ASSISTANT_FALLBACK`] instead of an error.
pub async fn ask_assistant(
    sync: &Synchronizer,
    gateway: &dyn LegalAssistantService,
    request: AssistantQuery,
) -> PortResult<ChatMessage> {
    if request.query.trim().is_empty() {
        return Err(PortError::InvalidInput("the query is empty".to_string()));
    }

    let case_files = if request.include_case_context {
        let case = match request.case_id.as_deref() {
            Some(id) => sync.case(id),
            None => sync.current_case(),
        };
        case.map(|c| c.files).unwrap_or_default()
    } else {
        Vec::new()
    };
    let normative_docs = sync.normative_docs();

    let reply = gateway
        .ask(
            &request.query,
            &normative_docs,
            request.use_web_search,
            &request.history,
            &case_files,
        )
        .await;

    let message = match reply {
        Ok(reply) => ChatMessage {
            id: Uuid::new_v4().to_string(),
            role: ChatRole::Model,
            text: reply.text,
            sources: reply.sources,
        },
        Err(e) => {
            error!("Error in legal assistant: {}", e);
            ChatMessage {
                id: Uuid::new_v4().to_string(),
                role: ChatRole::Model,
                text: ASSISTANT_FALLBACK.to_string(),
                sources: None,
            }
        }
    };
    Ok(message)
}

/// The first message of every conversation.
pub fn greeting() -> ChatMessage {
    ChatMessage {
        id: "init".to_string(),
        role: ChatRole::Model,
        text: GREETING.to_string(),
        sources: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssistantReply, CaseEventKind};
    use crate::encoding::payload_as_text;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// A deterministic assistant that records what it was asked.
    #[derive(Default)]
    struct FakeAssistant {
        fail: bool,
        timeline_calls: AtomicUsize,
        seen_case_files: Mutex<Vec<String>>,
        seen_norms: Mutex<Vec<String>>,
    }

    impl FakeAssistant {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl LegalAssistantService for FakeAssistant {
        async fn extract_metadata(&self, raw_text: &str) -> PortResult<CaseMetadata> {
            if self.fail {
                return Err(PortError::ExtractionFailed("service unreachable".into()));
            }
            let rol = raw_text
                .lines()
                .find_map(|l| l.strip_prefix("ROL: "))
                .unwrap_or_default()
                .to_string();
            Ok(CaseMetadata {
                rol,
                caratula: "PEREZ / GONZALEZ".to_string(),
                court: String::new(),
            })
        }

        async fn generate_timeline(&self, files: &[CaseFile]) -> PortResult<Vec<CaseEvent>> {
            self.timeline_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PortError::TimelineGenerationFailed("malformed output".into()));
            }
            Ok(files
                .iter()
                .map(|f| CaseEvent {
                    date: "2024-06-01".to_string(),
                    title: f.name.clone(),
                    description: "Ingreso de escrito".to_string(),
                    kind: CaseEventKind::Filing,
                })
                .collect())
        }

        async fn ask(
            &self,
            query: &str,
            normative_docs: &[NormativeDoc],
            _use_web_search: bool,
            prior_messages: &[ChatMessage],
            case_files: &[CaseFile],
        ) -> PortResult<AssistantReply> {
            if self.fail {
                return Err(PortError::AssistantUnavailable("network error".into()));
            }
            *self.seen_case_files.lock().unwrap() = case_files.iter().map(|f| f.name.clone()).collect();
            *self.seen_norms.lock().unwrap() = normative_docs.iter().map(|d| d.name.clone()).collect();
            Ok(AssistantReply {
                text: format!("{} ({} mensajes previos)", query, prior_messages.len()),
                sources: Some(vec!["https://www.bcn.cl/leychile".to_string()]),
            })
        }
    }

    fn upload(name: &str, text: &str) -> Upload {
        Upload {
            name: name.to_string(),
            mime_type: Some("text/markdown".to_string()),
            bytes: text.as_bytes().to_vec(),
        }
    }

    async fn empty_sync() -> Synchronizer {
        Synchronizer::initialize(Arc::new(MemoryStore::new())).await
    }

    #[tokio::test]
    async fn manual_case_requires_rol_and_caratula() {
        let sync = empty_sync().await;
        let result = create_case(
            &sync,
            NewCase {
                rol: " ".to_string(),
                caratula: "PEREZ / GONZALEZ".to_string(),
                ..NewCase::default()
            },
        );
        assert!(matches!(result, Err(PortError::InvalidInput(_))));
        assert!(sync.cases().is_empty());
    }

    #[tokio::test]
    async fn manual_case_goes_to_the_front() {
        let sync = empty_sync().await;
        let first = create_case(
            &sync,
            NewCase {
                rol: "C-1-2024".into(),
                caratula: "A / B".into(),
                ..NewCase::default()
            },
        )
        .unwrap();
        let second = create_case(
            &sync,
            NewCase {
                rol: "C-2-2024".into(),
                caratula: "C / D".into(),
                ..NewCase::default()
            },
        )
        .unwrap();

        let ids: Vec<String> = sync.cases().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(first.files.is_empty() && first.timeline.is_empty());
        assert_eq!(first.created_at, today());
    }

    #[tokio::test]
    async fn case_from_expediente_carries_metadata_and_file() {
        let sync = empty_sync().await;
        let gateway = FakeAssistant::default();

        let case = create_case_from_expediente(&sync, &gateway, upload("ebook.md", "ROL: C-99-2024\n..."))
            .await
            .unwrap();

        assert_eq!(case.rol, "C-99-2024");
        assert_eq!(case.files.len(), 1);
        assert_eq!(case.files[0].name, "ebook.md");
        assert_eq!(payload_as_text(&case.files[0].content), "ROL: C-99-2024\n...");
        assert_eq!(sync.case(&case.id), Some(case));
    }

    #[tokio::test]
    async fn failed_extraction_creates_nothing() {
        let sync = empty_sync().await;
        let result = create_case_from_expediente(&sync, &FakeAssistant::failing(), upload("ebook.md", "x")).await;
        assert!(matches!(result, Err(PortError::ExtractionFailed(_))));
        assert!(sync.cases().is_empty());
    }

    #[tokio::test]
    async fn attach_file_to_unknown_case_is_ignored() {
        let sync = empty_sync().await;
        assert!(attach_file(&sync, "missing", upload("a.md", "a")).is_none());
        assert!(sync.cases().is_empty());
    }

    #[test]
    fn uploads_without_mime_get_defaults() {
        let bare = Upload {
            name: "ley.bin".to_string(),
            mime_type: Some(String::new()),
            bytes: vec![0, 1, 2],
        };
        assert_eq!(bare.clone().into_case_file().mime_type, DEFAULT_CASE_FILE_MIME);
        assert_eq!(bare.into_normative_doc().mime_type, DEFAULT_NORM_MIME);
    }

    #[tokio::test]
    async fn timeline_needs_files_before_calling_the_gateway() {
        let sync = empty_sync().await;
        let gateway = FakeAssistant::default();
        let case = create_case(
            &sync,
            NewCase {
                rol: "C-1-2024".into(),
                caratula: "A / B".into(),
                ..NewCase::default()
            },
        )
        .unwrap();

        let result = regenerate_timeline(&sync, &gateway, &case.id).await;
        assert!(matches!(result, Err(PortError::InvalidInput(_))));
        assert_eq!(gateway.timeline_calls.load(Ordering::SeqCst), 0);

        let missing = regenerate_timeline(&sync, &gateway, "missing").await;
        assert!(matches!(missing, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn timeline_regeneration_replaces_events() {
        let sync = empty_sync().await;
        let gateway = FakeAssistant::default();
        let case = create_case(
            &sync,
            NewCase {
                rol: "C-1-2024".into(),
                caratula: "A / B".into(),
                initial_file: Some(upload("demanda.md", "Demanda").into_case_file()),
                ..NewCase::default()
            },
        )
        .unwrap();
        attach_file(&sync, &case.id, upload("contestacion.md", "Contestación")).unwrap();

        let events = regenerate_timeline(&sync, &gateway, &case.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(sync.case(&case.id).unwrap().timeline, events);
    }

    #[tokio::test]
    async fn failed_timeline_keeps_the_old_one() {
        let sync = empty_sync().await;
        let case = create_case(
            &sync,
            NewCase {
                rol: "C-1-2024".into(),
                caratula: "A / B".into(),
                initial_file: Some(upload("demanda.md", "Demanda").into_case_file()),
                ..NewCase::default()
            },
        )
        .unwrap();
        regenerate_timeline(&sync, &FakeAssistant::default(), &case.id).await.unwrap();
        let before = sync.case(&case.id).unwrap().timeline;

        let result = regenerate_timeline(&sync, &FakeAssistant::failing(), &case.id).await;
        assert!(matches!(result, Err(PortError::TimelineGenerationFailed(_))));
        assert_eq!(sync.case(&case.id).unwrap().timeline, before);
    }

    #[tokio::test]
    async fn open_case_selects_and_navigates() {
        let sync = empty_sync().await;
        let case = create_case(
            &sync,
            NewCase {
                rol: "C-1-2024".into(),
                caratula: "A / B".into(),
                ..NewCase::default()
            },
        )
        .unwrap();

        open_case(&sync, &case.id).unwrap();
        assert_eq!(sync.current_case_id(), Some(case.id.clone()));
        assert_eq!(sync.view_state(), ViewState::CaseDetail);

        show_settings(&sync);
        assert_eq!(sync.view_state(), ViewState::Settings);
        show_dashboard(&sync);
        assert_eq!(sync.view_state(), ViewState::Dashboard);
        assert!(matches!(open_case(&sync, "missing"), Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn assistant_gets_norms_and_selected_case_files() {
        let sync = empty_sync().await;
        let gateway = FakeAssistant::default();
        upload_normative_doc(&sync, upload("cpc.md", "Art. 254"));
        let case = create_case(
            &sync,
            NewCase {
                rol: "C-1-2024".into(),
                caratula: "A / B".into(),
                initial_file: Some(upload("demanda.md", "Demanda").into_case_file()),
                ..NewCase::default()
            },
        )
        .unwrap();
        open_case(&sync, &case.id).unwrap();

        let reply = ask_assistant(
            &sync,
            &gateway,
            AssistantQuery {
                query: "¿Plazo para contestar?".into(),
                history: vec![greeting()],
                include_case_context: true,
                ..AssistantQuery::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(reply.role, ChatRole::Model);
        assert_eq!(reply.text, "¿Plazo para contestar? (1 mensajes previos)");
        assert_eq!(reply.sources.as_ref().map(|s| s.len()), Some(1));
        assert_eq!(*gateway.seen_case_files.lock().unwrap(), vec!["demanda.md".to_string()]);
        assert_eq!(*gateway.seen_norms.lock().unwrap(), vec!["cpc.md".to_string()]);
    }

    #[tokio::test]
    async fn case_context_is_opt_in() {
        let sync = empty_sync().await;
        let gateway = FakeAssistant::default();
        let case = create_case(
            &sync,
            NewCase {
                rol: "C-1-2024".into(),
                caratula: "A / B".into(),
                initial_file: Some(upload("demanda.md", "Demanda").into_case_file()),
                ..NewCase::default()
            },
        )
        .unwrap();

        ask_assistant(
            &sync,
            &gateway,
            AssistantQuery {
                query: "Hola".into(),
                case_id: Some(case.id),
                include_case_context: false,
                ..AssistantQuery::default()
            },
        )
        .await
        .unwrap();
        assert!(gateway.seen_case_files.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_assistant_yields_fallback_message() {
        let sync = empty_sync().await;
        let reply = ask_assistant(
            &sync,
            &FakeAssistant::failing(),
            AssistantQuery {
                query: "¿Plazo?".into(),
                ..AssistantQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(reply.text, ASSISTANT_FALLBACK);
        assert_eq!(reply.sources, None);
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let sync = empty_sync().await;
        let result = ask_assistant(&sync, &FakeAssistant::default(), AssistantQuery::default()).await;
        assert!(matches!(result, Err(PortError::InvalidInput(_))));
    }
}

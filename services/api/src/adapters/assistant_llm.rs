//! services/api/src/adapters/assistant_llm.rs
//!
//! This module contains the adapter for the legal assistant LLM.
//! It implements the `LegalAssistantService` port from the `core` crate against
//! any OpenAI-compatible endpoint (Gemini's compatibility API by default).

const METADATA_INSTRUCTIONS: &str = r#"Analiza el expediente judicial chileno que te entregará el usuario (Markdown o texto).
Extrae:
1. "rol": el ROL o RIT de la causa (ej: C-123-2023, O-45-2024).
2. "caratula": estrictamente con el formato "DEMANDANTE / DEMANDADO", en mayúsculas.
3. "court": el tribunal o juzgado.

Si no encuentras un dato con certeza, infiérelo o déjalo como cadena vacía.
Responde SOLO con un objeto JSON con las claves "rol", "caratula" y "court"."#;

const TIMELINE_INSTRUCTIONS: &str = r#"Analiza los documentos de una causa judicial chilena que te entregará el usuario.
Genera una línea de tiempo de los hitos procesales RELEVANTES, ignorando trámites administrativos menores.

Responde SOLO con un arreglo JSON. Cada elemento tiene:
- "date": fecha en formato YYYY-MM-DD
- "title": título breve del hito
- "description": descripción en una o dos oraciones
- "type": uno de "resolucion", "escrito" u "otro"

IDIOMA DE RESPUESTA: ESPAÑOL."#;

const ASSISTANT_INSTRUCTIONS: &str = r#"Eres Lex, un asistente legal experto en Derecho Chileno.

IDIOMA: SIEMPRE ESPAÑOL.

CONTEXTO:
1. Tienes acceso a las normativas cargadas por el usuario (leyes, autos acordados).
{case_context}

OBJETIVO:
Responder consultas sobre plazos, procedimientos y detalles de la causa actual cuando se proporcione.

INSTRUCCIONES DE RESPUESTA:
1. CONCISIÓN: directo al grano.
2. FORMATO: usa **negritas** para plazos (ej: **3 días**) y para artículos o hitos clave.
3. FUENTES: cita el artículo legal o el folio del expediente según corresponda.
4. Si te preguntan por el caso, busca la respuesta en el expediente provisto."#;

const CASE_CONTEXT_LINE: &str =
    "2. Tienes acceso al EXPEDIENTE de la causa actual (resoluciones, escritos, Markdown).";

/// Returned as the answer when the model produced no text.
const EMPTY_ANSWER: &str = "No pude generar una respuesta.";

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        chat::{
            ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
            ChatCompletionRequestMessageContentPartFile, ChatCompletionRequestMessageContentPartText,
            ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
            ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs,
        },
        responses::{
            Annotation, CreateResponseArgs, InputContent, InputFileArgs, InputMessageArgs, InputRole,
            InputTextContent, OutputItem, OutputMessageContent, Response, Tool, WebSearchTool,
        },
    },
    Client,
};
use async_trait::async_trait;
use lexchile_core::domain::{
    AssistantReply, CaseEvent, CaseEventKind, CaseFile, CaseMetadata, ChatMessage, ChatRole, NormativeDoc,
};
use lexchile_core::encoding::{is_textual, payload_as_text};
use lexchile_core::ports::{LegalAssistantService, PortError, PortResult};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `LegalAssistantService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiLegalAssistantAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiLegalAssistantAdapter {
    /// Creates a new `OpenAiLegalAssistantAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Sends a chat completion and returns the text of the first choice.
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String, String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| e.to_string())?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    /// Answers through the Responses API with web search enabled. Returns the
    /// answer and the URLs the model cited.
    async fn ask_with_web_search(
        &self,
        instructions: String,
        prior_messages: &[ChatMessage],
        parts: &[ContextPart],
    ) -> PortResult<(String, Vec<String>)> {
        let unavailable = |e: OpenAIError| PortError::AssistantUnavailable(e.to_string());

        let mut content = Vec::new();
        let transcript = transcript(prior_messages);
        if !transcript.is_empty() {
            content.push(InputContent::InputText(InputTextContent {
                text: format!("CONVERSACIÓN PREVIA:\n{}", transcript),
            }));
        }
        content.extend(response_parts(parts).map_err(unavailable)?);

        let message = InputMessageArgs::default()
            .role(InputRole::User)
            .content(content)
            .build()
            .map_err(unavailable)?;
        let request = CreateResponseArgs::default()
            .model(&self.model)
            .instructions(instructions)
            .input(message)
            .tools(vec![Tool::WebSearch(WebSearchTool::default())])
            .build()
            .map_err(unavailable)?;

        let response = self.client.responses().create(request).await.map_err(unavailable)?;

        Ok((response.output_text().unwrap_or_default(), cited_urls(&response)))
    }

    async fn ask_in_chat(
        &self,
        instructions: String,
        prior_messages: &[ChatMessage],
        parts: &[ContextPart],
    ) -> PortResult<String> {
        let unavailable = |e: String| PortError::AssistantUnavailable(e);

        let mut messages: Vec<ChatCompletionRequestMessage> = vec![ChatCompletionRequestSystemMessageArgs::default()
            .content(instructions)
            .build()
            .map_err(|e| unavailable(e.to_string()))?
            .into()];
        for message in prior_messages {
            let turn: ChatCompletionRequestMessage = match message.role {
                ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.text.clone())
                    .build()
                    .map_err(|e| unavailable(e.to_string()))?
                    .into(),
                ChatRole::Model => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.text.clone())
                    .build()
                    .map_err(|e| unavailable(e.to_string()))?
                    .into(),
            };
            messages.push(turn);
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(chat_parts(parts).map_err(|e| unavailable(e.to_string()))?)
                .build()
                .map_err(|e| unavailable(e.to_string()))?
                .into(),
        );

        self.complete(messages).await.map_err(unavailable)
    }
}

//=========================================================================================
// `LegalAssistantService` Trait Implementation
//=========================================================================================

#[async_trait]
impl LegalAssistantService for OpenAiLegalAssistantAdapter {
    async fn extract_metadata(&self, raw_text: &str) -> PortResult<CaseMetadata> {
        let failed = |e: String| PortError::ExtractionFailed(e);
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(METADATA_INSTRUCTIONS)
                .build()
                .map_err(|e| failed(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(raw_text.to_string())
                .build()
                .map_err(|e| failed(e.to_string()))?
                .into(),
        ];

        let text = self.complete(messages).await.map_err(failed)?;
        parse_metadata(&text)
    }

    async fn generate_timeline(&self, files: &[CaseFile]) -> PortResult<Vec<CaseEvent>> {
        let failed = |e: String| PortError::TimelineGenerationFailed(e);
        let documents: Vec<ContextPart> = files
            .iter()
            .flat_map(|f| document_parts("--- DOCUMENTO", &f.name, &f.mime_type, &f.content))
            .collect();

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(TIMELINE_INSTRUCTIONS)
                .build()
                .map_err(|e| failed(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(chat_parts(&documents).map_err(|e| failed(e.to_string()))?)
                .build()
                .map_err(|e| failed(e.to_string()))?
                .into(),
        ];

        let text = self.complete(messages).await.map_err(failed)?;
        let events = parse_timeline(&text)?;
        info!(files = files.len(), events = events.len(), "Timeline generated.");
        Ok(events)
    }

    async fn ask(
        &self,
        query: &str,
        normative_docs: &[NormativeDoc],
        use_web_search: bool,
        prior_messages: &[ChatMessage],
        case_files: &[CaseFile],
    ) -> PortResult<AssistantReply> {
        let instructions = ASSISTANT_INSTRUCTIONS.replace(
            "{case_context}",
            if case_files.is_empty() { "" } else { CASE_CONTEXT_LINE },
        );
        let mut parts = assistant_context(normative_docs, case_files);
        parts.push(ContextPart::Text(if parts.is_empty() {
            query.to_string()
        } else {
            format!("CONSULTA:\n{}", query)
        }));
        debug!(
            normative_docs = normative_docs.len(),
            case_files = case_files.len(),
            use_web_search,
            "Querying the legal assistant."
        );

        let (raw_answer, sources) = if use_web_search {
            self.ask_with_web_search(instructions, prior_messages, &parts).await?
        } else {
            (self.ask_in_chat(instructions, prior_messages, &parts).await?, Vec::new())
        };

        let text = if raw_answer.trim().is_empty() {
            EMPTY_ANSWER.to_string()
        } else {
            raw_answer.trim().to_string()
        };
        Ok(AssistantReply {
            text,
            sources: if sources.is_empty() { None } else { Some(sources) },
        })
    }
}

//=========================================================================================
// Prompt Shaping and Response Parsing
//=========================================================================================

/// One piece of the user turn: inline text, or a stored binary document sent
/// to the model as a file.
#[derive(Debug, Clone, PartialEq)]
enum ContextPart {
    Text(String),
    File {
        name: String,
        mime_type: String,
        /// Base64 payload as stored.
        content: String,
    },
}

/// Renders one stored document. Text-like payloads are inlined under a
/// header; anything else follows its header as a file part.
fn document_parts(header: &str, name: &str, mime_type: &str, content: &str) -> Vec<ContextPart> {
    if is_textual(mime_type) {
        vec![ContextPart::Text(format!("{}: {} ---\n{}", header, name, payload_as_text(content)))]
    } else {
        vec![
            ContextPart::Text(format!("{}: {} ---", header, name)),
            ContextPart::File {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                content: content.to_string(),
            },
        ]
    }
}

/// Normative documents first, then the case files.
fn assistant_context(normative_docs: &[NormativeDoc], case_files: &[CaseFile]) -> Vec<ContextPart> {
    normative_docs
        .iter()
        .flat_map(|d| document_parts("--- NORMATIVA", &d.name, &d.mime_type, &d.content))
        .chain(
            case_files
                .iter()
                .flat_map(|f| document_parts("--- CONTEXTO EXPEDIENTE", &f.name, &f.mime_type, &f.content)),
        )
        .collect()
}

fn data_url(mime_type: &str, content: &str) -> String {
    format!("data:{};base64,{}", mime_type, content)
}

fn chat_parts(parts: &[ContextPart]) -> Result<Vec<ChatCompletionRequestUserMessageContentPart>, serde_json::Error> {
    parts
        .iter()
        .map(|part| match part {
            ContextPart::Text(text) => Ok(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText { text: text.clone() },
            )),
            // `FileObject` exposes no constructor, only its wire form.
            ContextPart::File { name, mime_type, content } => {
                serde_json::from_value::<ChatCompletionRequestMessageContentPartFile>(json!({
                    "file": { "file_data": data_url(mime_type, content), "filename": name }
                }))
                .map(ChatCompletionRequestUserMessageContentPart::File)
            }
        })
        .collect()
}

fn response_parts(parts: &[ContextPart]) -> Result<Vec<InputContent>, OpenAIError> {
    parts
        .iter()
        .map(|part| -> Result<InputContent, OpenAIError> {
            match part {
                ContextPart::Text(text) => Ok(InputContent::InputText(InputTextContent { text: text.clone() })),
                ContextPart::File { name, mime_type, content } => Ok(InputContent::InputFile(
                    InputFileArgs::default()
                        .filename(name.clone())
                        .file_data(data_url(mime_type, content))
                        .build()?,
                )),
            }
        })
        .collect()
}

fn transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| match m.role {
            ChatRole::User => format!("USUARIO: {}", m.text),
            ChatRole::Model => format!("LEX: {}", m.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn cited_urls(response: &Response) -> Vec<String> {
    let annotations = response
        .output
        .iter()
        .filter_map(|item| match item {
            OutputItem::Message(message) => Some(message.content.iter()),
            _ => None,
        })
        .flatten()
        .filter_map(|content| match content {
            OutputMessageContent::OutputText(text) => Some(text.annotations.iter()),
            _ => None,
        })
        .flatten();
    unique_citation_urls(annotations)
}

/// URL citations in order of first appearance. Other annotation kinds are
/// ignored.
fn unique_citation_urls<'a>(annotations: impl Iterator<Item = &'a Annotation>) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for annotation in annotations {
        let Annotation::UrlCitation(citation) = annotation else {
            continue;
        };
        // The citation body keeps its fields private; read the URL from its wire form.
        let url = serde_json::to_value(citation)
            .ok()
            .and_then(|value| value.get("url").and_then(|u| u.as_str()).map(str::to_string));
        if let Some(url) = url {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Cuts the JSON document out of a model answer that may wrap it in a code
/// fence or surround it with prose.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let start = trimmed.find(|c: char| c == '{' || c == '[');
    let end = trimmed.rfind(|c: char| c == '}' || c == ']');
    match (start, end) {
        (Some(start), Some(end)) if start <= end => &trimmed[start..=end],
        _ => trimmed,
    }
}

fn parse_metadata(text: &str) -> PortResult<CaseMetadata> {
    serde_json::from_str(extract_json(text))
        .map_err(|e| PortError::ExtractionFailed(format!("malformed metadata JSON: {}", e)))
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    date: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimeline {
    Events(Vec<RawEvent>),
    Wrapped {
        #[serde(alias = "timeline")]
        events: Vec<RawEvent>,
    },
}

fn parse_timeline(text: &str) -> PortResult<Vec<CaseEvent>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let raw: RawTimeline = serde_json::from_str(extract_json(text))
        .map_err(|e| PortError::TimelineGenerationFailed(format!("malformed timeline JSON: {}", e)))?;
    let events = match raw {
        RawTimeline::Events(events) | RawTimeline::Wrapped { events } => events,
    };
    Ok(events
        .into_iter()
        .map(|e| CaseEvent {
            date: e.date,
            title: e.title,
            description: e.description,
            kind: event_kind(&e.kind),
        })
        .collect())
}

/// Labels outside the three known ones become `Other`.
fn event_kind(label: &str) -> CaseEventKind {
    match label.trim().to_lowercase().as_str() {
        "resolucion" | "resolución" | "resolution" => CaseEventKind::Resolution,
        "escrito" | "filing" => CaseEventKind::Filing,
        _ => CaseEventKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexchile_core::encoding::encode_payload;

    #[test]
    fn metadata_is_read_from_fenced_json() {
        let answer = "```json\n{\"rol\": \"C-123-2024\", \"caratula\": \"PEREZ / GONZALEZ\", \"court\": \"\"}\n```";
        let metadata = parse_metadata(answer).unwrap();
        assert_eq!(metadata.rol, "C-123-2024");
        assert_eq!(metadata.caratula, "PEREZ / GONZALEZ");
        assert_eq!(metadata.court, "");
    }

    #[test]
    fn metadata_fields_may_be_missing() {
        let metadata = parse_metadata("{\"rol\": \"O-45-2024\"}").unwrap();
        assert_eq!(metadata.caratula, "");
    }

    #[test]
    fn malformed_metadata_is_an_extraction_failure() {
        assert!(matches!(parse_metadata("no encontré nada"), Err(PortError::ExtractionFailed(_))));
    }

    #[test]
    fn timeline_accepts_bare_and_wrapped_arrays() {
        let bare = r#"[{"date":"2024-04-02","title":"Demanda","description":"Se interpone","type":"escrito"}]"#;
        let wrapped = r#"{"events":[{"date":"2024-04-05","title":"Traslado","description":"Provee","type":"resolucion"}]}"#;
        let aliased = r#"{"timeline":[{"date":"2024-04-09","title":"Notificación","description":"Por cédula","type":"receptor"}]}"#;

        assert_eq!(parse_timeline(bare).unwrap()[0].kind, CaseEventKind::Filing);
        assert_eq!(parse_timeline(wrapped).unwrap()[0].kind, CaseEventKind::Resolution);
        assert_eq!(parse_timeline(aliased).unwrap()[0].kind, CaseEventKind::Other);
    }

    #[test]
    fn empty_answer_is_an_empty_timeline() {
        assert!(parse_timeline("  ").unwrap().is_empty());
        assert!(matches!(
            parse_timeline("lo siento"),
            Err(PortError::TimelineGenerationFailed(_))
        ));
    }

    #[test]
    fn text_files_are_inlined_and_binaries_sent_as_files() {
        let text = document_parts("--- DOCUMENTO", "ebook.md", "text/markdown", &encode_payload("Folio 1".as_bytes()));
        assert_eq!(text, vec![ContextPart::Text("--- DOCUMENTO: ebook.md ---\nFolio 1".to_string())]);

        let pdf = document_parts("--- DOCUMENTO", "sentencia.pdf", "application/pdf", "JVBERi0xLjQ=");
        assert_eq!(
            pdf,
            vec![
                ContextPart::Text("--- DOCUMENTO: sentencia.pdf ---".to_string()),
                ContextPart::File {
                    name: "sentencia.pdf".to_string(),
                    mime_type: "application/pdf".to_string(),
                    content: "JVBERi0xLjQ=".to_string(),
                },
            ]
        );
    }

    #[test]
    fn pdf_reaches_chat_as_a_file_part() {
        let parts = document_parts("--- NORMATIVA", "cpc.pdf", "application/pdf", "JVBERi0xLjQ=");
        let wire = serde_json::to_value(chat_parts(&parts).unwrap()).unwrap();
        assert_eq!(wire[0]["type"], "text");
        assert_eq!(wire[0]["text"], "--- NORMATIVA: cpc.pdf ---");
        assert_eq!(wire[1]["type"], "file");
        assert_eq!(wire[1]["file"]["filename"], "cpc.pdf");
        assert_eq!(wire[1]["file"]["file_data"], "data:application/pdf;base64,JVBERi0xLjQ=");
    }

    #[test]
    fn pdf_reaches_web_search_as_an_input_file() {
        let parts = document_parts("--- NORMATIVA", "cpc.pdf", "application/pdf", "JVBERi0xLjQ=");
        let wire = serde_json::to_value(response_parts(&parts).unwrap()).unwrap();
        assert_eq!(wire[0]["type"], "input_text");
        assert_eq!(wire[1]["type"], "input_file");
        assert_eq!(wire[1]["filename"], "cpc.pdf");
        assert_eq!(wire[1]["file_data"], "data:application/pdf;base64,JVBERi0xLjQ=");
    }

    #[test]
    fn context_lists_norms_before_case_files() {
        let norm = NormativeDoc {
            id: "n1".into(),
            name: "cpc.txt".into(),
            mime_type: "text/plain".into(),
            content: encode_payload("Art. 258".as_bytes()),
        };
        let file = CaseFile {
            id: "f1".into(),
            name: "ebook.md".into(),
            upload_date: "2024-06-01".into(),
            mime_type: "text/markdown".into(),
            content: encode_payload("Folio 3".as_bytes()),
        };
        let context = assistant_context(&[norm], &[file]);
        assert_eq!(context.len(), 2);
        assert!(matches!(&context[0], ContextPart::Text(t) if t.contains("Art. 258")));
        assert!(matches!(&context[1], ContextPart::Text(t) if t.contains("Folio 3")));
        assert!(assistant_context(&[], &[]).is_empty());
    }

    #[test]
    fn sources_are_unique_url_citations() {
        let annotations: Vec<Annotation> = serde_json::from_value(serde_json::json!([
            {"type": "url_citation", "start_index": 0, "end_index": 10, "title": "Ley 1552", "url": "https://www.bcn.cl/leychile/navegar?idNorma=22740"},
            {"type": "file_citation", "file_id": "file-1", "filename": "cpc.pdf", "index": 0},
            {"type": "url_citation", "start_index": 20, "end_index": 30, "title": "Ley 1552", "url": "https://www.bcn.cl/leychile/navegar?idNorma=22740"},
            {"type": "url_citation", "start_index": 40, "end_index": 50, "title": "PJUD", "url": "https://www.pjud.cl"}
        ]))
        .unwrap();
        assert_eq!(
            unique_citation_urls(annotations.iter()),
            vec![
                "https://www.bcn.cl/leychile/navegar?idNorma=22740".to_string(),
                "https://www.pjud.cl".to_string()
            ]
        );
        assert!(unique_citation_urls(std::iter::empty()).is_empty());
    }

    #[test]
    fn transcript_labels_turns() {
        let history = vec![
            ChatMessage { id: "1".into(), role: ChatRole::Model, text: "Hola".into(), sources: None },
            ChatMessage { id: "2".into(), role: ChatRole::User, text: "¿Plazo?".into(), sources: None },
        ];
        assert_eq!(transcript(&history), "LEX: Hola\nUSUARIO: ¿Plazo?");
    }
}

//! crates/lexchile_core/src/encoding.rs
//!
//! Conversion between uploaded bytes and the text-safe payloads stored in records.

use crate::ports::{PortError, PortResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Local;

/// MIME assumed for case files uploaded without one.
pub const DEFAULT_CASE_FILE_MIME: &str = "text/markdown";
/// MIME assumed for normative documents uploaded without one.
pub const DEFAULT_NORM_MIME: &str = "application/octet-stream";

/// Encodes raw bytes as standard, padded base64.
pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_payload(content: &str) -> PortResult<Vec<u8>> {
    STANDARD
        .decode(content.trim())
        .map_err(|e| PortError::InvalidInput(format!("payload is not valid base64: {}", e)))
}

/// Reads a stored payload as text.
///
/// Content that is not base64 is assumed to be plain text already and is
/// returned verbatim.
pub fn payload_as_text(content: &str) -> String {
    match decode_payload(content) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => content.to_string(),
    }
}

/// Whether a payload of this MIME type can be handed to the assistant as text.
pub fn is_textual(mime_type: &str) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    mime.starts_with("text/") || mime.contains("markdown")
}

/// Today's date as `YYYY-MM-DD`, the stamp used for `createdAt` and `uploadDate`.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

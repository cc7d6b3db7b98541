//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document of the LexChile API, for client generation.
//! Usage: `openapi [OUTPUT]` (defaults to `openapi.json`).

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn write_document(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<usize, Box<dyn std::error::Error>> {
    let documented_paths = api_doc.paths.paths.len();
    std::fs::write(path, api_doc.to_pretty_json()?)?;
    Ok(documented_paths)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    let documented_paths = write_document(ApiDoc::openapi(), &path)?;
    println!("OpenAPI document with {} paths written to {}", documented_paths, path);
    Ok(())
}

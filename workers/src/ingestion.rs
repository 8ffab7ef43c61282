//! Document ingestion worker.
//!
//! Reads uploaded files and hands the raw text to retrieval. Plain-text types
//! are read as UTF-8; PDF, DOCX and PPTX go through [`crate::extract`].
//! Parse failures go back to the coordinator as `error` envelopes under the
//! upload's correlation id.

use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use parley_core::message::{DocumentRef, ErrorReport, IngestionComplete, Metadata};
use parley_core::{names, Envelope, Handler, Message, Outbox, ParleyError, Result, Worker};

use crate::extract::extract_text;

/// File types read as plain text
pub const TEXT_TYPES: &[&str] = &["txt", "md", "markdown", "csv", "log", "json"];

/// File types whose text is extracted from a binary container
pub const BINARY_TYPES: &[&str] = &["pdf", "docx", "pptx"];

/// Every file type the ingestion worker accepts
pub const SUPPORTED_TYPES: &[&str] = &[
    "txt", "md", "markdown", "csv", "log", "json", "pdf", "docx", "pptx",
];

#[derive(Debug, Default)]
pub struct IngestionWorker;

impl IngestionWorker {
    pub fn new() -> Self {
        Self
    }

    /// Reads `doc` into a string after checking its type is supported.
    pub fn read_document(&self, doc: &DocumentRef) -> Result<String> {
        let file_type = normalize_type(doc);
        if !SUPPORTED_TYPES.contains(&file_type.as_str()) {
            return Err(ParleyError::Validation(format!(
                "Unsupported file type: '{}'. Supported types: {}",
                doc.file_type,
                SUPPORTED_TYPES.join(", ")
            )));
        }
        let text = if BINARY_TYPES.contains(&file_type.as_str()) {
            let bytes = std::fs::read(&doc.file_path)?;
            extract_text(&file_type, &bytes)?
        } else {
            std::fs::read_to_string(&doc.file_path)?
        };
        if text.trim().is_empty() {
            return Err(ParleyError::Validation(format!(
                "Document '{}' contains no text.",
                doc.file_name
            )));
        }
        Ok(text)
    }

    fn process_upload(&self, request: &Envelope, doc: &DocumentRef, outbox: &dyn Outbox) {
        info!(target: "ingestion", file = %doc.file_name, path = %doc.file_path, "Parsing document");
        match self.read_document(doc) {
            Ok(raw_text) => {
                info!(target: "ingestion", file = %doc.file_name, chars = raw_text.chars().count(), "Parsed document");
                outbox.post(request.reply(
                    names::INGESTION,
                    names::RETRIEVAL,
                    Message::IngestionComplete(IngestionComplete {
                        raw_text,
                        source_metadata: source_metadata(doc),
                    }),
                ));
            }
            Err(err) => {
                warn!(target: "ingestion", file = %doc.file_name, error = %err, "Failed to parse document");
                let error = match &err {
                    ParleyError::Validation(msg) => msg.clone(),
                    other => other.to_string(),
                };
                outbox.post(request.reply(
                    names::INGESTION,
                    names::COORDINATOR,
                    Message::Error(ErrorReport::new(
                        error,
                        format!("Failed to parse document: {}", doc.file_name),
                    )),
                ));
            }
        }
    }
}

// Lowercase type without a leading dot; falls back to the file name's extension
fn normalize_type(doc: &DocumentRef) -> String {
    let declared = doc.file_type.trim().trim_start_matches('.');
    if !declared.is_empty() {
        return declared.to_lowercase();
    }
    Path::new(&doc.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

fn source_metadata(doc: &DocumentRef) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("file_name".into(), Value::String(doc.file_name.clone()));
    meta.insert("file_type".into(), Value::String(doc.file_type.clone()));
    meta.insert("original_path".into(), Value::String(doc.file_path.clone()));
    meta
}

impl Handler for IngestionWorker {
    fn handle(&self, envelope: &Envelope, outbox: &dyn Outbox) -> Result<()> {
        match envelope.message() {
            Message::UploadDocument(doc) => self.process_upload(envelope, doc, outbox),
            _ => {
                warn!(target: "ingestion", kind = %envelope.kind(), sender = %envelope.sender(), "Unrecognized message type");
            }
        }
        Ok(())
    }
}

impl Worker for IngestionWorker {
    fn name(&self) -> &str {
        names::INGESTION
    }
}

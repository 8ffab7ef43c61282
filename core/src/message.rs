//! Typed message vocabulary carried inside an [`Envelope`](crate::Envelope).
//!
//! Each variant of [`Message`] is one protocol type tag; the payload shape is
//! fixed by the variant, so handlers match exhaustively instead of probing an
//! untyped map. On the wire the tag is the kebab-case name returned by
//! [`MessageKind::as_str`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form metadata attached to documents and chunks.
pub type Metadata = Map<String, Value>;

/// File reference carried by `upload-request` and `upload-document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
}

impl DocumentRef {
    pub fn new(
        file_path: impl Into<String>,
        file_name: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            file_name: file_name.into(),
            file_type: file_type.into(),
        }
    }

    /// Names the first blank field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.file_path.trim().is_empty() {
            Some("file_path")
        } else if self.file_name.trim().is_empty() {
            Some("file_name")
        } else if self.file_type.trim().is_empty() {
            Some("file_type")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionComplete {
    pub raw_text: String,
    #[serde(default)]
    pub source_metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIndexed {
    pub file_name: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    #[serde(default)]
    pub retrieved_context: Vec<String>,
    #[serde(default)]
    pub source_metadata: Vec<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub answer: String,
    #[serde(default)]
    pub source_chunks: Vec<String>,
    #[serde(default)]
    pub source_metadata: Vec<Metadata>,
    pub original_query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error: String,
    #[serde(default)]
    pub context: String,
}

impl ErrorReport {
    pub fn new(error: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            context: context.into(),
        }
    }
}

/// One protocol message: the type tag plus its typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Message {
    /// Boundary asks for a document to be ingested.
    UploadRequest(DocumentRef),
    /// Boundary asks a question; the coordinator forwards the same shape to retrieval.
    QueryRequest(QueryRequest),
    /// Coordinator asks the ingestion worker to parse a file.
    UploadDocument(DocumentRef),
    IngestionComplete(IngestionComplete),
    /// Retrieval finished indexing an ingested document.
    DocumentIndexed(DocumentIndexed),
    RetrievalResult(RetrievalResult),
    FinalResponse(FinalResponse),
    StatusUpdate(StatusUpdate),
    Error(ErrorReport),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::UploadRequest(_) => MessageKind::UploadRequest,
            Message::QueryRequest(_) => MessageKind::QueryRequest,
            Message::UploadDocument(_) => MessageKind::UploadDocument,
            Message::IngestionComplete(_) => MessageKind::IngestionComplete,
            Message::DocumentIndexed(_) => MessageKind::DocumentIndexed,
            Message::RetrievalResult(_) => MessageKind::RetrievalResult,
            Message::FinalResponse(_) => MessageKind::FinalResponse,
            Message::StatusUpdate(_) => MessageKind::StatusUpdate,
            Message::Error(_) => MessageKind::Error,
        }
    }
}

/// Payload-free type tag, used for logging, stats and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    UploadRequest,
    QueryRequest,
    UploadDocument,
    IngestionComplete,
    DocumentIndexed,
    RetrievalResult,
    FinalResponse,
    StatusUpdate,
    Error,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::UploadRequest => "upload-request",
            MessageKind::QueryRequest => "query-request",
            MessageKind::UploadDocument => "upload-document",
            MessageKind::IngestionComplete => "ingestion-complete",
            MessageKind::DocumentIndexed => "document-indexed",
            MessageKind::RetrievalResult => "retrieval-result",
            MessageKind::FinalResponse => "final-response",
            MessageKind::StatusUpdate => "status-update",
            MessageKind::Error => "error",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_serialized_tag() {
        let msg = Message::QueryRequest(QueryRequest {
            query: "What KPIs?".into(),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.kind().as_str());
        assert_eq!(value["payload"]["query"], "What KPIs?");
    }

    #[test]
    fn missing_field_reports_first_blank() {
        let doc = DocumentRef::new("a.pdf", "  ", "");
        assert_eq!(doc.missing_field(), Some("file_name"));
        assert_eq!(DocumentRef::new("a", "b", "c").missing_field(), None);
    }
}

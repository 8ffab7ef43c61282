//! Retrieval worker: chunk store and keyword ranking.
//!
//! `ingestion-complete` text is split with [`split_text`] and kept in memory
//! alongside the source metadata. Queries are ranked by how many distinct
//! query terms each chunk contains; ties keep insertion order.

use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, info, warn};

use parley_core::message::{
    DocumentIndexed, ErrorReport, IngestionComplete, Metadata, QueryRequest, RetrievalResult,
};
use parley_core::{names, Envelope, Handler, Message, Outbox, Result, Worker};

use crate::config::RetrievalConfig;
use crate::text::{query_terms, split_text, term_hits};

#[derive(Debug, Clone)]
struct StoredChunk {
    text: String,
    metadata: Metadata,
}

/// A ranked chunk returned by [`RetrievalWorker::search`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub text: String,
    pub metadata: Metadata,
    pub score: usize,
}

pub struct RetrievalWorker {
    config: RetrievalConfig,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl RetrievalWorker {
    pub fn new(config: RetrievalConfig) -> Self {
        Self {
            config,
            chunks: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Chunks currently held in the store
    pub fn indexed_chunks(&self) -> usize {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Splits `raw_text` and stores the pieces; returns how many were added.
    pub fn index(&self, raw_text: &str, source_metadata: &Metadata) -> usize {
        let pieces = split_text(raw_text, self.config.chunk_size, self.config.chunk_overlap);
        let added = pieces.len();
        let mut store = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        for (i, text) in pieces.into_iter().enumerate() {
            let mut metadata = source_metadata.clone();
            metadata.insert("chunk_index".into(), Value::from(i));
            store.push(StoredChunk { text, metadata });
        }
        added
    }

    /// Top `top_k` chunks containing at least one query term, best first.
    pub fn search(&self, query: &str) -> Vec<ScoredChunk> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let store = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        let mut ranked: Vec<ScoredChunk> = store
            .iter()
            .filter_map(|chunk| {
                let score = term_hits(&chunk.text, &terms);
                (score > 0).then(|| ScoredChunk {
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                    score,
                })
            })
            .collect();
        // Stable, so equal scores stay in insertion order
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked.truncate(self.config.top_k);
        ranked
    }

    fn on_ingestion_complete(&self, envelope: &Envelope, done: &IngestionComplete, outbox: &dyn Outbox) {
        let file_name = done
            .source_metadata
            .get("file_name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let chunks = self.index(&done.raw_text, &done.source_metadata);
        if chunks == 0 {
            warn!(target: "retrieval", file = %file_name, "No text to index");
            outbox.post(envelope.reply(
                names::RETRIEVAL,
                names::COORDINATOR,
                Message::Error(ErrorReport::new(
                    "No text could be indexed from the document.",
                    format!("Failed to add document '{file_name}' to the store."),
                )),
            ));
            return;
        }

        info!(
            target: "retrieval",
            file = %file_name,
            chunks,
            total = self.indexed_chunks(),
            "Indexed document"
        );
        outbox.post(envelope.reply(
            names::RETRIEVAL,
            names::COORDINATOR,
            Message::DocumentIndexed(DocumentIndexed { file_name, chunks }),
        ));
    }

    fn on_query(&self, envelope: &Envelope, request: &QueryRequest, outbox: &dyn Outbox) {
        let query = request.query.trim();
        if self.indexed_chunks() == 0 {
            warn!(target: "retrieval", query = %query, "Query before any document was indexed");
            outbox.post(envelope.reply(
                names::RETRIEVAL,
                names::COORDINATOR,
                Message::Error(ErrorReport::new(
                    "No documents have been indexed yet. Upload a document first.",
                    format!("Failed to retrieve information for query: '{query}'"),
                )),
            ));
            return;
        }

        let hits = self.search(query);
        debug!(target: "retrieval", query = %query, hits = hits.len(), "Ranked chunks");
        let (retrieved_context, source_metadata): (Vec<String>, Vec<Metadata>) = hits
            .into_iter()
            .map(|hit| (hit.text, hit.metadata))
            .unzip();
        outbox.post(envelope.reply(
            names::RETRIEVAL,
            names::RESPONDER,
            Message::RetrievalResult(RetrievalResult {
                query: query.to_string(),
                retrieved_context,
                source_metadata,
            }),
        ));
    }
}

impl Default for RetrievalWorker {
    fn default() -> Self {
        Self::new(RetrievalConfig::default())
    }
}

impl Handler for RetrievalWorker {
    fn handle(&self, envelope: &Envelope, outbox: &dyn Outbox) -> Result<()> {
        match envelope.message() {
            Message::IngestionComplete(done) => self.on_ingestion_complete(envelope, done, outbox),
            Message::QueryRequest(request) => self.on_query(envelope, request, outbox),
            _ => {
                warn!(target: "retrieval", kind = %envelope.kind(), sender = %envelope.sender(), "Unrecognized message type");
            }
        }
        Ok(())
    }
}

impl Worker for RetrievalWorker {
    fn name(&self) -> &str {
        names::RETRIEVAL
    }
}

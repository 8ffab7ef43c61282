//! Request coordinator.
//!
//! The [`Coordinator`] sits between the boundary and the workers. It validates
//! boundary requests, opens a [`RequestState`] per correlation id, routes the
//! first worker hop, and turns terminal worker replies (`final-response`,
//! `error`, `document-indexed`) back into boundary envelopes before dropping
//! the state.
//!
//! Terminal replies for correlation ids it does not know are still forwarded:
//! the boundary may be waiting on them, and a missing state entry costs
//! nothing to skip.
//!
//! Rejected requests get a boundary `error` whose `context` says why. A
//! request reusing a live correlation id is answered with
//! [`DUPLICATE_REQUEST_CONTEXT`]: that error is not terminal for the id, and
//! the original request still ends with its own `final-response`,
//! `status-update` or `error`. Every other rejection carries
//! [`REJECTED_CONTEXT`] and leaves no state behind.

mod config;
mod state;

pub use config::{CoordinatorConfig, DEFAULT_REQUEST_TTL_MS};
pub use state::{RequestContext, RequestState, RequestStatus};

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::boundary::BoundarySink;
use crate::envelope::names;
use crate::message::{
    DocumentIndexed, DocumentRef, ErrorReport, FinalResponse, Message, QueryRequest, StatusUpdate,
};
use crate::worker::{Handler, Outbox, Worker};
use crate::{Envelope, Result};

/// Error context for requests refused before any state was opened
pub const REJECTED_CONTEXT: &str = "Coordinator rejected the request.";

/// Error context for a request whose correlation id is already in flight
pub const DUPLICATE_REQUEST_CONTEXT: &str =
    "Duplicate request ignored; the original request is still in flight.";

/// Stateful orchestrator registered as [`names::COORDINATOR`].
pub struct Coordinator {
    config: CoordinatorConfig,
    // correlation_id -> in-flight request
    states: DashMap<String, RequestState>,
    boundary: Arc<dyn BoundarySink>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, boundary: Arc<dyn BoundarySink>) -> Self {
        Self {
            config,
            states: DashMap::new(),
            boundary,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Snapshot of the live state for `correlation_id`.
    pub fn state(&self, correlation_id: &str) -> Option<RequestState> {
        self.states.get(correlation_id).map(|s| s.clone())
    }

    /// Number of requests still waiting for a terminal reply.
    pub fn in_flight(&self) -> usize {
        self.states.len()
    }

    /// Drops every request idle for at least the configured TTL and tells the
    /// boundary each one timed out. Returns the evicted correlation ids.
    pub fn evict_expired(&self) -> Vec<String> {
        let ttl = self.config.request_ttl;
        let stale: Vec<String> = self
            .states
            .iter()
            .filter(|e| e.value().is_expired(ttl))
            .map(|e| e.key().clone())
            .collect();

        let mut evicted = Vec::with_capacity(stale.len());
        for id in stale {
            // A reply may have landed between the scan and here
            let Some((_, state)) = self.states.remove_if(&id, |_, s| s.is_expired(ttl)) else {
                continue;
            };
            warn!(
                target: "coordinator",
                correlation_id = %id,
                status = %state.status,
                idle_ms = state.idle_for().as_millis() as u64,
                "Evicting stale request"
            );
            let notice = Envelope::with_correlation(
                names::COORDINATOR,
                names::BOUNDARY,
                id.clone(),
                Message::Error(ErrorReport::new(
                    "Request timed out.",
                    format!(
                        "No reply within {} ms while {}.",
                        ttl.as_millis(),
                        state.status
                    ),
                )),
            );
            self.boundary.deliver(notice);
            evicted.push(id);
        }
        evicted
    }

    /// Runs [`evict_expired`](Self::evict_expired) every `every` on the tokio runtime.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        let period = every.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = self.evict_expired();
                if !evicted.is_empty() {
                    info!(target: "coordinator", count = evicted.len(), "Sweeper evicted requests");
                }
            }
        })
    }

    fn on_upload_request(&self, request: &Envelope, doc: &DocumentRef, outbox: &dyn Outbox) {
        if let Some(field) = doc.missing_field() {
            warn!(target: "coordinator", field, "Upload request missing file details");
            self.reject(request, format!("Missing {field} for upload."), REJECTED_CONTEXT);
            return;
        }

        let id = request.correlation_id();
        if !self.begin(id, RequestState::uploading(&doc.file_name)) {
            warn!(target: "coordinator", correlation_id = %id, "Duplicate correlation id rejected");
            self.reject(request, duplicate_message(id), DUPLICATE_REQUEST_CONTEXT);
            return;
        }

        info!(target: "coordinator", correlation_id = %id, file = %doc.file_name, "Routing upload to ingestion");
        self.to_boundary(
            request,
            Message::StatusUpdate(StatusUpdate {
                status: "uploading".into(),
                message: format!("Processing document '{}'...", doc.file_name),
                correlation_id: id.to_string(),
            }),
        );
        outbox.post(request.reply(
            names::COORDINATOR,
            names::INGESTION,
            Message::UploadDocument(doc.clone()),
        ));
    }

    fn on_query_request(&self, request: &Envelope, query: &QueryRequest, outbox: &dyn Outbox) {
        let text = query.query.trim();
        if text.is_empty() {
            warn!(target: "coordinator", correlation_id = %request.correlation_id(), "Empty query rejected");
            self.reject(
                request,
                "Your query is empty. Please ask a question.",
                REJECTED_CONTEXT,
            );
            return;
        }

        let id = request.correlation_id();
        if !self.begin(id, RequestState::querying(text)) {
            warn!(target: "coordinator", correlation_id = %id, "Duplicate correlation id rejected");
            self.reject(request, duplicate_message(id), DUPLICATE_REQUEST_CONTEXT);
            return;
        }

        info!(target: "coordinator", correlation_id = %id, query = %text, "Routing query to retrieval");
        self.to_boundary(
            request,
            Message::StatusUpdate(StatusUpdate {
                status: "querying".into(),
                message: "Searching for answers...".into(),
                correlation_id: id.to_string(),
            }),
        );
        outbox.post(request.reply(
            names::COORDINATOR,
            names::RETRIEVAL,
            Message::QueryRequest(QueryRequest {
                query: text.to_string(),
            }),
        ));
    }

    fn on_progress(&self, reply: &Envelope) {
        let id = reply.correlation_id();
        match self.states.get_mut(id) {
            Some(mut state) => {
                state.record_hop();
                debug!(target: "coordinator", correlation_id = %id, kind = %reply.kind(), hops = state.hops, "Recorded progress");
            }
            None => {
                debug!(target: "coordinator", correlation_id = %id, kind = %reply.kind(), "Progress for unknown request");
            }
        }
    }

    fn on_document_indexed(&self, reply: &Envelope, indexed: &DocumentIndexed) {
        let id = reply.correlation_id();
        match self.finish(id, |s| s.complete_upload()) {
            Some(state) => info!(
                target: "coordinator",
                correlation_id = %id,
                file = %indexed.file_name,
                chunks = indexed.chunks,
                elapsed_ms = state.created_at.elapsed().as_millis() as u64,
                "Upload complete"
            ),
            None => warn!(target: "coordinator", correlation_id = %id, "document-indexed for unknown request"),
        }
        self.to_boundary(
            reply,
            Message::StatusUpdate(StatusUpdate {
                status: "complete".into(),
                message: format!(
                    "Indexed {} chunks from '{}'.",
                    indexed.chunks, indexed.file_name
                ),
                correlation_id: id.to_string(),
            }),
        );
    }

    fn on_final_response(&self, reply: &Envelope, response: &FinalResponse) {
        let id = reply.correlation_id();
        match self.finish(id, |s| s.complete(response)) {
            Some(state) => info!(
                target: "coordinator",
                correlation_id = %id,
                sources = state.source_chunks.len(),
                elapsed_ms = state.created_at.elapsed().as_millis() as u64,
                "Final response ready"
            ),
            None => warn!(
                target: "coordinator",
                correlation_id = %id,
                "final-response for unknown request; forwarding anyway"
            ),
        }
        self.to_boundary(reply, Message::FinalResponse(response.clone()));
    }

    fn on_error(&self, reply: &Envelope, report: &ErrorReport) {
        let id = reply.correlation_id();
        warn!(
            target: "coordinator",
            correlation_id = %id,
            sender = %reply.sender(),
            error = %report.error,
            context = %report.context,
            "Worker reported an error"
        );
        if self.finish(id, |s| s.fail(report)).is_none() {
            warn!(target: "coordinator", correlation_id = %id, "error for unknown request; forwarding anyway");
        }
        self.to_boundary(reply, Message::Error(report.clone()));
    }

    // Opens a state entry unless the correlation id is already live
    fn begin(&self, correlation_id: &str, state: RequestState) -> bool {
        match self.states.entry(correlation_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(state);
                true
            }
        }
    }

    // Removes the entry, applying the final transition to the owned value
    fn finish<F>(&self, correlation_id: &str, transition: F) -> Option<RequestState>
    where
        F: FnOnce(&mut RequestState),
    {
        let (_, mut state) = self.states.remove(correlation_id)?;
        transition(&mut state);
        Some(state)
    }

    fn reject(&self, request: &Envelope, error: impl Into<String>, context: &str) {
        self.to_boundary(request, Message::Error(ErrorReport::new(error, context)));
    }

    fn to_boundary(&self, origin: &Envelope, message: Message) {
        self.boundary
            .deliver(origin.reply(names::COORDINATOR, names::BOUNDARY, message));
    }
}

fn duplicate_message(correlation_id: &str) -> String {
    format!("A request with correlation id {correlation_id} is already in flight.")
}

impl Handler for Coordinator {
    fn handle(&self, envelope: &Envelope, outbox: &dyn Outbox) -> Result<()> {
        info!(
            target: "coordinator",
            kind = %envelope.kind(),
            sender = %envelope.sender(),
            correlation_id = %envelope.correlation_id(),
            "Received message"
        );
        match envelope.message() {
            Message::UploadRequest(doc) => self.on_upload_request(envelope, doc, outbox),
            Message::QueryRequest(query) => self.on_query_request(envelope, query, outbox),
            Message::IngestionComplete(done) => {
                let file = done
                    .source_metadata
                    .get("file_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                info!(target: "coordinator", file, "Ingestion complete");
                self.on_progress(envelope);
            }
            Message::RetrievalResult(result) => {
                info!(
                    target: "coordinator",
                    query = %result.query,
                    chunks = result.retrieved_context.len(),
                    "Retrieval complete"
                );
                self.on_progress(envelope);
            }
            Message::DocumentIndexed(indexed) => self.on_document_indexed(envelope, indexed),
            Message::FinalResponse(response) => self.on_final_response(envelope, response),
            Message::Error(report) => self.on_error(envelope, report),
            Message::UploadDocument(_) | Message::StatusUpdate(_) => {
                warn!(target: "coordinator", kind = %envelope.kind(), "Unrecognized message type");
            }
        }
        Ok(())
    }
}

impl Worker for Coordinator {
    fn name(&self) -> &str {
        names::COORDINATOR
    }
}

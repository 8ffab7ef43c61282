use std::fmt;
use std::time::{Duration, Instant};

use crate::message::{ErrorReport, FinalResponse, Metadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Uploading,
    Querying,
    Complete,
    Failed,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Uploading => "uploading",
            RequestStatus::Querying => "querying",
            RequestStatus::Complete => "complete",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Complete | RequestStatus::Failed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the request was started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    Upload { file_name: String },
    Query { original_query: String },
}

/// Progress of one in-flight request, keyed by correlation id.
#[derive(Debug, Clone)]
pub struct RequestState {
    pub status: RequestStatus,
    pub context: RequestContext,
    pub answer: Option<String>,
    pub source_chunks: Vec<String>,
    pub source_metadata: Vec<Metadata>,
    pub error: Option<ErrorReport>,
    /// Worker replies observed so far
    pub hops: u32,
    pub created_at: Instant,
    pub last_activity: Instant,
}

impl RequestState {
    fn new(status: RequestStatus, context: RequestContext) -> Self {
        let now = Instant::now();
        Self {
            status,
            context,
            answer: None,
            source_chunks: Vec::new(),
            source_metadata: Vec::new(),
            error: None,
            hops: 0,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn uploading(file_name: impl Into<String>) -> Self {
        Self::new(
            RequestStatus::Uploading,
            RequestContext::Upload {
                file_name: file_name.into(),
            },
        )
    }

    pub fn querying(query: impl Into<String>) -> Self {
        Self::new(
            RequestStatus::Querying,
            RequestContext::Query {
                original_query: query.into(),
            },
        )
    }

    pub fn original_query(&self) -> Option<&str> {
        match &self.context {
            RequestContext::Query { original_query } => Some(original_query),
            RequestContext::Upload { .. } => None,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match &self.context {
            RequestContext::Upload { file_name } => Some(file_name),
            RequestContext::Query { .. } => None,
        }
    }

    /// Notes a non-terminal worker reply.
    pub fn record_hop(&mut self) {
        self.hops += 1;
        self.last_activity = Instant::now();
    }

    pub fn complete(&mut self, response: &FinalResponse) {
        self.record_hop();
        self.status = RequestStatus::Complete;
        self.answer = Some(response.answer.clone());
        self.source_chunks = response.source_chunks.clone();
        self.source_metadata = response.source_metadata.clone();
    }

    pub fn complete_upload(&mut self) {
        self.record_hop();
        self.status = RequestStatus::Complete;
    }

    pub fn fail(&mut self, report: &ErrorReport) {
        self.record_hop();
        self.status = RequestStatus::Failed;
        self.error = Some(report.clone());
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.idle_for() >= ttl
    }
}

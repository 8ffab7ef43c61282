use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageKind};

/// Well-known receiver names.
///
/// Workers register under these names; anything addressed to a name nobody
/// has registered yet waits in the bus's pending queue.
pub mod names {
    /// Stateful orchestrator between the boundary and the workers
    pub const COORDINATOR: &str = "agent.coordinator";
    /// Document parsing worker
    pub const INGESTION: &str = "agent.ingestion";
    /// Indexing and retrieval worker
    pub const RETRIEVAL: &str = "agent.retrieval";
    /// Answer generation worker
    pub const RESPONDER: &str = "agent.responder";
    /// The external caller (UI or CLI) that originates requests
    pub const BOUNDARY: &str = "boundary";
}

/// Generates a fresh correlation id (UUID v4).
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One hop of communication between two components.
///
/// An `Envelope` is immutable once built: fields are private and only readable
/// through accessors. To continue a request, build the next hop with
/// [`Envelope::reply`], which carries the correlation id forward unchanged.
///
/// # Examples
///
/// ```
/// use parley_core::envelope::names;
/// use parley_core::message::{Message, QueryRequest};
/// use parley_core::Envelope;
///
/// let request = Envelope::new(
///     names::BOUNDARY,
///     names::COORDINATOR,
///     Message::QueryRequest(QueryRequest { query: "What KPIs?".into() }),
/// );
/// assert!(!request.correlation_id().is_empty());
///
/// let next = request.reply(
///     names::COORDINATOR,
///     names::RETRIEVAL,
///     Message::QueryRequest(QueryRequest { query: "What KPIs?".into() }),
/// );
/// assert_eq!(next.correlation_id(), request.correlation_id());
/// assert_eq!(next.receiver(), names::RETRIEVAL);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    sender: String,
    receiver: String,
    correlation_id: String,
    timestamp_ms: i64,
    #[serde(flatten)]
    message: Message,
}

impl Envelope {
    /// Creates an envelope that starts a new correlation.
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, message: Message) -> Self {
        Self::with_correlation(sender, receiver, String::new(), message)
    }

    /// Creates an envelope under an existing correlation id.
    ///
    /// A blank `correlation_id` is replaced by a freshly generated one, so the
    /// resulting envelope always carries a non-empty id.
    pub fn with_correlation(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        correlation_id: impl Into<String>,
        message: Message,
    ) -> Self {
        let correlation_id = correlation_id.into();
        let correlation_id = if correlation_id.trim().is_empty() {
            new_correlation_id()
        } else {
            correlation_id
        };
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            correlation_id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            message,
        }
    }

    /// Builds the next hop of this request: same correlation id, new route and payload.
    pub fn reply(
        &self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message: Message,
    ) -> Self {
        Self::with_correlation(sender, receiver, self.correlation_id.clone(), message)
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

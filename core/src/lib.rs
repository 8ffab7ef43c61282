// Parley Core Library
// Typed message bus and request coordinator

pub mod boundary;
pub mod bus;
pub mod channel;
pub mod coordinator;
pub mod envelope;
pub mod message;
pub mod telemetry;
pub mod worker;

// Export core types
pub use boundary::{BoundarySink, RecordingBoundary};
pub use bus::{BusStats, Delivery, DrainReport, MessageBus};
pub use channel::{channel_transport, BusPump, ChannelOutbox};
pub use coordinator::{
    Coordinator, CoordinatorConfig, RequestState, RequestStatus, DUPLICATE_REQUEST_CONTEXT,
    REJECTED_CONTEXT,
};
pub use envelope::{names, new_correlation_id, Envelope};
pub use message::{Message, MessageKind};
pub use worker::{Handler, Outbox, Worker};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, ParleyError>;

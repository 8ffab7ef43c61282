// Parley Reference Workers
// Ingestion -> retrieval -> responder over the parley-core bus

pub mod config;
pub mod extract;
pub mod ingestion;
#[cfg(feature = "llm")]
pub mod llm;
pub mod responder;
pub mod retrieval;
pub mod text;

pub use config::RetrievalConfig;
pub use ingestion::{IngestionWorker, BINARY_TYPES, SUPPORTED_TYPES, TEXT_TYPES};
pub use responder::{AnswerGenerator, ExtractiveGenerator, ResponseWorker, NO_ANSWER};
pub use retrieval::{RetrievalWorker, ScoredChunk};

#[cfg(feature = "llm")]
pub use llm::{HttpGenerator, LlmConfig};

use std::sync::Arc;

use parley_core::MessageBus;

/// Handles to the workers registered by [`register_workers`]
pub struct Workers {
    pub ingestion: Arc<IngestionWorker>,
    pub retrieval: Arc<RetrievalWorker>,
    pub responder: Arc<ResponseWorker>,
}

/// Registers ingestion, retrieval and responder workers on `bus`.
pub fn register_workers(
    bus: &MessageBus,
    config: RetrievalConfig,
    generator: Arc<dyn AnswerGenerator>,
) -> Workers {
    let workers = Workers {
        ingestion: Arc::new(IngestionWorker::new()),
        retrieval: Arc::new(RetrievalWorker::new(config)),
        responder: Arc::new(ResponseWorker::new(generator)),
    };
    bus.register_worker(Arc::clone(&workers.ingestion));
    bus.register_worker(Arc::clone(&workers.retrieval));
    bus.register_worker(Arc::clone(&workers.responder));
    workers
}

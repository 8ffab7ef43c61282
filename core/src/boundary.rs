// Boundary callback interface
use std::sync::{Mutex, PoisonError};

use crate::message::MessageKind;
use crate::Envelope;

/// Receives boundary-facing envelopes (`status-update`, `final-response`,
/// `error`) from the coordinator.
pub trait BoundarySink: Send + Sync {
    fn deliver(&self, envelope: Envelope);
}

impl<F> BoundarySink for F
where
    F: Fn(Envelope) + Send + Sync,
{
    fn deliver(&self, envelope: Envelope) {
        self(envelope)
    }
}

/// Boundary that keeps everything it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingBoundary {
    received: Mutex<Vec<Envelope>>,
}

impl RecordingBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Envelope> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns everything received so far.
    pub fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.received.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn of_kind(&self, kind: MessageKind) -> Vec<Envelope> {
        self.snapshot()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }
}

impl BoundarySink for RecordingBoundary {
    fn deliver(&self, envelope: Envelope) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope);
    }
}

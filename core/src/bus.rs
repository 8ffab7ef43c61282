// Message bus implementation
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::worker::{Handler, Outbox, Worker};
use crate::{Envelope, Result};

/// Outcome of a single [`MessageBus::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Every registered handler was invoked; `faults` of them failed.
    Delivered { handlers: usize, faults: usize },
    /// No handler was registered; the envelope waits in the pending queue.
    Queued { depth: usize },
}

/// Summary of a [`MessageBus::drain_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    pub requeued: usize,
}

/// Per-receiver counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusStats {
    pub total_sent: u64,
    pub total_delivered: u64,
    pub handler_faults: u64,
    pub total_queued: u64,
}

/// Synchronous call-through dispatcher keyed by receiver name.
///
/// `send` looks up the envelope's receiver and invokes every handler
/// registered under it, in registration order, before returning. No lock is
/// held while a handler runs, so handlers can send further envelopes from
/// inside `handle` and the whole request chain unwinds on the caller's stack.
///
/// Envelopes for a receiver nobody has registered yet are queued, not
/// dropped, and can be re-delivered with [`MessageBus::drain_pending`] once
/// start-up registration is finished.
pub struct MessageBus {
    // Receiver -> handlers in registration order
    handlers: DashMap<String, Vec<Arc<dyn Handler>>>,

    // Envelopes with no receiver at send time, in arrival order
    pending: Mutex<VecDeque<Envelope>>,

    // Statistics
    stats: DashMap<String, BusStats>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            pending: Mutex::new(VecDeque::new()),
            stats: DashMap::new(),
        }
    }

    /// Registers `handler` for `receiver`. Later registrations for the same
    /// name run after earlier ones.
    pub fn register(&self, receiver: impl Into<String>, handler: Arc<dyn Handler>) {
        let receiver = receiver.into();
        let mut entry = self.handlers.entry(receiver.clone()).or_default();
        entry.push(handler);
        if entry.len() > 1 {
            warn!(
                target: "message_bus",
                receiver = %receiver,
                handlers = entry.len(),
                "Multiple handlers registered for one receiver"
            );
        } else {
            info!(target: "message_bus", receiver = %receiver, "Handler registered");
        }
    }

    /// Registers a closure as a handler.
    pub fn register_fn<F>(&self, receiver: impl Into<String>, handler: F)
    where
        F: Fn(&Envelope, &dyn Outbox) -> Result<()> + Send + Sync + 'static,
    {
        self.register(receiver, Arc::new(handler));
    }

    /// Registers a worker under its own name.
    pub fn register_worker<W>(&self, worker: Arc<W>)
    where
        W: Worker + 'static,
    {
        let name = worker.name().to_string();
        self.register(name, worker);
    }

    /// Delivers `envelope` to its receiver, or queues it if nobody listens yet.
    ///
    /// Handlers see this bus as their outbox. Sending never fails: handler
    /// errors and panics are logged and counted, never propagated.
    pub fn send(&self, envelope: Envelope) -> Delivery {
        self.dispatch(envelope, self)
    }

    /// Like [`send`](Self::send), but handlers emit through `outbox`.
    pub fn dispatch(&self, envelope: Envelope, outbox: &dyn Outbox) -> Delivery {
        debug!(
            target: "message_bus",
            sender = %envelope.sender(),
            receiver = %envelope.receiver(),
            kind = %envelope.kind(),
            correlation_id = %envelope.correlation_id(),
            "Sending message"
        );
        self.update_stats(envelope.receiver(), |stats| stats.total_sent += 1);

        match self.handlers_for(envelope.receiver()) {
            Some(handlers) => {
                let faults = self.deliver(&envelope, &handlers, outbox);
                Delivery::Delivered {
                    handlers: handlers.len(),
                    faults,
                }
            }
            None => {
                let receiver = envelope.receiver().to_string();
                let kind = envelope.kind();
                let depth = {
                    let mut pending = self.lock_pending();
                    pending.push_back(envelope);
                    pending.len()
                };
                self.update_stats(&receiver, |stats| stats.total_queued += 1);
                warn!(
                    target: "message_bus",
                    receiver = %receiver,
                    kind = %kind,
                    depth,
                    "No handler registered; message queued"
                );
                Delivery::Queued { depth }
            }
        }
    }

    /// Re-attempts delivery of every queued envelope in arrival order.
    ///
    /// Envelopes whose receiver is now registered leave the queue whether or
    /// not their handlers succeed. The rest keep their relative order ahead of
    /// anything queued while the drain itself was running.
    pub fn drain_pending(&self) -> DrainReport {
        let queued: Vec<Envelope> = self.lock_pending().drain(..).collect();
        let mut report = DrainReport {
            attempted: queued.len(),
            ..DrainReport::default()
        };
        if queued.is_empty() {
            return report;
        }
        info!(target: "message_bus", count = queued.len(), "Draining pending messages");

        let mut unrouted = Vec::new();
        for envelope in queued {
            match self.handlers_for(envelope.receiver()) {
                Some(handlers) => {
                    self.deliver(&envelope, &handlers, self);
                    report.delivered += 1;
                }
                None => unrouted.push(envelope),
            }
        }

        report.requeued = unrouted.len();
        if !unrouted.is_empty() {
            let mut pending = self.lock_pending();
            for envelope in unrouted.into_iter().rev() {
                pending.push_front(envelope);
            }
            warn!(
                target: "message_bus",
                remaining = pending.len(),
                "Messages remain queued after drain"
            );
        }
        report
    }

    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn is_registered(&self, receiver: &str) -> bool {
        self.handlers
            .get(receiver)
            .map(|h| !h.is_empty())
            .unwrap_or(false)
    }

    /// Names with at least one registered handler, sorted.
    pub fn receivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Get stats
    pub fn stats(&self, receiver: &str) -> Option<BusStats> {
        self.stats.get(receiver).map(|s| s.clone())
    }

    // Clone the handler list out so no map guard is held while handlers run
    fn handlers_for(&self, receiver: &str) -> Option<Vec<Arc<dyn Handler>>> {
        self.handlers
            .get(receiver)
            .map(|h| h.value().clone())
            .filter(|h| !h.is_empty())
    }

    fn deliver(
        &self,
        envelope: &Envelope,
        handlers: &[Arc<dyn Handler>],
        outbox: &dyn Outbox,
    ) -> usize {
        let mut faults = 0;
        for handler in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(envelope, outbox)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    faults += 1;
                    error!(
                        target: "message_bus",
                        receiver = %envelope.receiver(),
                        kind = %envelope.kind(),
                        correlation_id = %envelope.correlation_id(),
                        error = %err,
                        "Handler failed to process message"
                    );
                }
                Err(payload) => {
                    faults += 1;
                    error!(
                        target: "message_bus",
                        receiver = %envelope.receiver(),
                        kind = %envelope.kind(),
                        correlation_id = %envelope.correlation_id(),
                        panic = %panic_message(payload.as_ref()),
                        "Handler panicked while processing message"
                    );
                }
            }
        }

        let delivered = (handlers.len() - faults) as u64;
        self.update_stats(envelope.receiver(), |stats| {
            stats.total_delivered += delivered;
            stats.handler_faults += faults as u64;
        });
        faults
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<Envelope>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Update stats helper function
    fn update_stats<F>(&self, receiver: &str, f: F)
    where
        F: FnOnce(&mut BusStats),
    {
        let mut entry = self.stats.entry(receiver.to_string()).or_default();
        f(entry.value_mut());
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbox for MessageBus {
    fn post(&self, envelope: Envelope) {
        self.send(envelope);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

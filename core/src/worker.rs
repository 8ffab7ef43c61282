// Worker contract shared by every bus participant
use crate::{Envelope, Result};

/// Send-only view of a transport.
///
/// Handlers emit their outbound envelopes through the outbox they are handed
/// on delivery, so the same handler runs unchanged whether the outbox calls
/// straight back into the [`MessageBus`](crate::MessageBus) or queues on a
/// channel ([`ChannelOutbox`](crate::channel::ChannelOutbox)).
pub trait Outbox: Send + Sync {
    /// Hands an envelope to the transport. Never fails from the caller's side.
    fn post(&self, envelope: Envelope);
}

/// Message entry point registered on the bus.
pub trait Handler: Send + Sync {
    /// Processes one envelope.
    ///
    /// Expected failures (bad payloads, unreadable files, empty results) must be
    /// reported as `error` envelopes through `outbox`. `Err` is for faults the
    /// handler could not turn into a reply; the bus logs and isolates them.
    fn handle(&self, envelope: &Envelope, outbox: &dyn Outbox) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Envelope, &dyn Outbox) -> Result<()> + Send + Sync,
{
    fn handle(&self, envelope: &Envelope, outbox: &dyn Outbox) -> Result<()> {
        self(envelope, outbox)
    }
}

/// A named participant: the ingestion, retrieval and response workers and the
/// coordinator all implement this and register under [`Worker::name`].
pub trait Worker: Handler {
    /// Stable receiver name, usually one of [`crate::envelope::names`].
    fn name(&self) -> &str;
}

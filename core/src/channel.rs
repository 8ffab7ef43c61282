//! Channel-backed transport.
//!
//! [`ChannelOutbox`] queues envelopes on an unbounded tokio channel instead of
//! invoking the receiver on the sender's stack. A [`BusPump`] owns the other
//! end and feeds each envelope through [`MessageBus::dispatch`], handing the
//! handlers a `ChannelOutbox` so their replies are queued as well. Handler
//! code is identical under either transport.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::worker::Outbox;
use crate::{Envelope, MessageBus};

/// Creates a connected outbox/pump pair over `bus`.
pub fn channel_transport(bus: Arc<MessageBus>) -> (ChannelOutbox, BusPump) {
    let (tx, rx) = mpsc::unbounded_channel();
    let outbox = ChannelOutbox { tx };
    let pump = BusPump {
        bus,
        rx,
        outbox: outbox.clone(),
    };
    (outbox, pump)
}

#[derive(Debug, Clone)]
pub struct ChannelOutbox {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Outbox for ChannelOutbox {
    fn post(&self, envelope: Envelope) {
        if let Err(err) = self.tx.send(envelope) {
            let envelope = err.0;
            warn!(
                target: "message_bus",
                receiver = %envelope.receiver(),
                kind = %envelope.kind(),
                correlation_id = %envelope.correlation_id(),
                "Pump stopped; message discarded"
            );
        }
    }
}

/// Single consumer that delivers queued envelopes through the bus.
pub struct BusPump {
    bus: Arc<MessageBus>,
    rx: mpsc::UnboundedReceiver<Envelope>,
    // Handed to handlers so nested sends go back through the channel
    outbox: ChannelOutbox,
}

impl BusPump {
    /// Delivers everything currently queued, including envelopes queued by
    /// the handlers it runs, and returns how many were dispatched.
    pub fn drain_ready(&mut self) -> usize {
        let mut dispatched = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            self.bus.dispatch(envelope, &self.outbox);
            dispatched += 1;
        }
        if dispatched > 0 {
            debug!(target: "message_bus", dispatched, "Pump drained ready messages");
        }
        dispatched
    }

    /// Runs until the task is aborted. The pump keeps its own sender, so the
    /// channel never closes underneath it.
    pub async fn run(mut self) {
        info!(target: "message_bus", "Bus pump started");
        while let Some(envelope) = self.rx.recv().await {
            self.bus.dispatch(envelope, &self.outbox);
        }
    }
}

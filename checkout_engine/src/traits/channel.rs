use msc_common::Secret;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::order_types::PaymentId;

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("Could not connect to the payment channel: {0}")]
    Connect(String),
    #[error("Payment channel protocol error: {0}")]
    Protocol(String),
}

/// The one semantic event the payment channel carries. There is no failure or timeout counterpart; an abandoned
/// payment produces no event at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded { payment_id: PaymentId },
}

/// A live subscription to the payment room for one payment id.
///
/// The transport makes no ordering or delivery-count promise, so consumers must apply events idempotently. Closing is
/// idempotent and safe on an already-broken connection; dropping the handle closes it.
pub struct PaymentHandle {
    payment_id: PaymentId,
    events: mpsc::Receiver<PaymentEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl PaymentHandle {
    pub fn new(payment_id: PaymentId, events: mpsc::Receiver<PaymentEvent>, shutdown: oneshot::Sender<()>) -> Self {
        Self { payment_id, events, shutdown: Some(shutdown) }
    }

    pub fn payment_id(&self) -> PaymentId {
        self.payment_id
    }

    /// The next event on the channel, or `None` once the channel is closed.
    pub async fn next_event(&mut self) -> Option<PaymentEvent> {
        self.events.recv().await
    }

    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // the transport side may already be gone; that counts as closed
            let _ = shutdown.send(());
        }
        self.events.close();
    }
}

impl Drop for PaymentHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Factory for payment-room subscriptions. Implementations authenticate with the bearer token on the handshake, not
/// per message.
#[allow(async_fn_in_trait)]
pub trait PaymentChannel {
    async fn open(&self, payment_id: PaymentId, auth_token: &Secret<String>) -> Result<PaymentHandle, ChannelError>;
}

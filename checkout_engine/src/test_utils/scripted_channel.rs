use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use msc_common::Secret;
use tokio::sync::{mpsc, oneshot};

use crate::{
    order_types::PaymentId,
    traits::{ChannelError, PaymentChannel, PaymentEvent, PaymentHandle},
};

/// A payment channel that replays a fixed event script on every `open` call, then closes. Scripts may contain
/// duplicates and events for unrelated payment ids; consumers are expected to cope with both.
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    script: Arc<Vec<PaymentEvent>>,
    opened: Arc<AtomicUsize>,
}

impl ScriptedChannel {
    pub fn new(script: Vec<PaymentEvent>) -> Self {
        Self { script: Arc::new(script), opened: Arc::new(AtomicUsize::new(0)) }
    }

    /// How many subscriptions have been opened, across clones.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl PaymentChannel for ScriptedChannel {
    async fn open(&self, payment_id: PaymentId, _auth_token: &Secret<String>) -> Result<PaymentHandle, ChannelError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::channel(self.script.len().max(1));
        for event in self.script.iter() {
            let _ = sender.send(*event).await;
        }
        // dropping the sender ends the subscription after the script has been delivered
        drop(sender);
        let (shutdown, _discarded) = oneshot::channel();
        Ok(PaymentHandle::new(payment_id, receiver, shutdown))
    }
}

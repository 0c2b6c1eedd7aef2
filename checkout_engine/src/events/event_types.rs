use crate::order_types::{Order, OrderId, PaymentId};

/// Emitted once per member order when a payment-success event advances it to `PendingPickup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted when every member of a payment group has been cancelled. Partial cancellations do not produce an event;
/// they are reported to the caller through the cancel outcome instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCancelledEvent {
    pub payment_id: PaymentId,
    pub cancelled: Vec<OrderId>,
}

impl GroupCancelledEvent {
    pub fn new(payment_id: PaymentId, cancelled: Vec<OrderId>) -> Self {
        Self { payment_id, cancelled }
    }
}

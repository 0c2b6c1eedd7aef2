//! The order status state machine.
//!
//! This transition table is the single source of truth for every status change in the system. The payment group
//! tracker, buyer-initiated cancellations and admin status edits all funnel through [`apply`]; nothing mutates an
//! order's status directly.
//!
//! | From \ To       | PendingPickup | PendingDelivery | Delivered | Cancelled | Returned |
//! |-----------------|---------------|-----------------|-----------|-----------|----------|
//! | PendingPayment  | ok            | Err             | Err       | ok        | Err      |
//! | PendingPickup   | Err           | ok              | Err       | Err       | Err      |
//! | PendingDelivery | Err           | Err             | ok        | Err       | ok       |
//! | terminal        | Err           | Err             | Err       | Err       | Err      |
//!
//! `Delivered`, `Cancelled` and `Returned` are terminal. Cancellation is only reachable from `PendingPayment`; the
//! push channel has no failure event, so an abandoned payment keeps its orders in `PendingPayment` until the buyer
//! cancels them.
use chrono::Utc;
use log::warn;
use thiserror::Error;

use crate::order_types::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("An order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Orders can only be cancelled while awaiting payment; this one is {0}")]
    NotCancellable(OrderStatus),
}

/// The statuses an order in `from` may move to. Terminal statuses return an empty slice.
pub fn allowed_targets(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        PendingPayment => &[PendingPickup, Cancelled],
        PendingPickup => &[PendingDelivery],
        PendingDelivery => &[Delivered, Returned],
        Delivered | Cancelled | Returned => &[],
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_targets(from).contains(&to)
}

pub fn is_terminal(status: OrderStatus) -> bool {
    allowed_targets(status).is_empty()
}

/// Cancellation is exposed to buyers and admins only while the order awaits payment.
pub fn is_cancellable(status: OrderStatus) -> bool {
    status == OrderStatus::PendingPayment
}

/// Move `order` to `target`, returning the updated order. Fails with [`TransitionError::InvalidTransition`] when the
/// table above does not allow the move. The input is untouched on failure, so callers can validate a whole batch
/// before committing any of it.
pub fn apply(order: &Order, target: OrderStatus) -> Result<Order, TransitionError> {
    if !can_transition(order.status, target) {
        return Err(TransitionError::InvalidTransition { from: order.status, to: target });
    }
    let mut updated = order.clone();
    updated.status = target;
    updated.updated_at = Utc::now();
    Ok(updated)
}

/// Validate the transition to `target` for every order in the batch, then return the updated copies. If any member
/// fails the guard, no copies are produced at all, so a caller can never end up committing half a batch.
pub fn apply_all(orders: &[&Order], target: OrderStatus) -> Result<Vec<Order>, TransitionError> {
    for order in orders {
        if !can_transition(order.status, target) {
            return Err(TransitionError::InvalidTransition { from: order.status, to: target });
        }
    }
    orders.iter().map(|o| apply(o, target)).collect()
}

/// Guard used by the cancel paths: the order must still await payment.
pub fn check_cancellable(order: &Order) -> Result<(), TransitionError> {
    if is_cancellable(order.status) {
        Ok(())
    } else {
        Err(TransitionError::NotCancellable(order.status))
    }
}

/// True when `to` can be reached from `from` through zero or more allowed transitions.
pub fn is_reachable(from: OrderStatus, to: OrderStatus) -> bool {
    if from == to {
        return true;
    }
    allowed_targets(from).iter().any(|&next| is_reachable(next, to))
}

/// Reconcile a locally tracked status with one fetched over HTTP. A fetch and a push event may race in either order;
/// the fetched status is accepted only when it is the local status or ahead of it in the table, so a stale fetch that
/// lands after a success event cannot roll the order back. Both orderings converge on the same result.
pub fn merge_status(local: OrderStatus, fetched: OrderStatus) -> OrderStatus {
    if is_reachable(local, fetched) {
        fetched
    } else {
        if !is_reachable(fetched, local) {
            warn!("Fetched status {fetched} and tracked status {local} are not on the same path; keeping {local}");
        }
        local
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use msc_common::Vnd;

    use super::*;
    use crate::order_types::{Order, OrderId, OrderLine, PaymentId, ProductId, Receiver, ShopId, SkuId, UserId};

    const ALL: [OrderStatus; 6] = [
        OrderStatus::PendingPayment,
        OrderStatus::PendingPickup,
        OrderStatus::PendingDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
    ];

    fn order_with_status(id: i64, status: OrderStatus) -> Order {
        Order {
            id: OrderId::from(id),
            shop_id: ShopId::from(1),
            user_id: UserId::from(1),
            payment_id: PaymentId::from(999),
            status,
            receiver: Receiver::new("Lan", "0900000000", "12 Hàng Bài, Hà Nội"),
            items: vec![OrderLine {
                sku_id: SkuId::from(1),
                product_id: ProductId::from(1),
                quantity: 1,
                unit_price: Vnd::from(100_000),
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn every_pair_matches_the_table() {
        use OrderStatus::*;
        for from in ALL {
            for to in ALL {
                let allowed = matches!(
                    (from, to),
                    (PendingPayment, PendingPickup) |
                        (PendingPayment, Cancelled) |
                        (PendingPickup, PendingDelivery) |
                        (PendingDelivery, Delivered) |
                        (PendingDelivery, Returned)
                );
                let order = order_with_status(1, from);
                match apply(&order, to) {
                    Ok(updated) => {
                        assert!(allowed, "apply({from}, {to}) should have been rejected");
                        assert_eq!(updated.status, to);
                        assert_eq!(order.status, from, "input order must not change");
                    },
                    Err(TransitionError::InvalidTransition { from: f, to: t }) => {
                        assert!(!allowed, "apply({from}, {to}) should have been allowed");
                        assert_eq!((f, t), (from, to));
                    },
                    Err(e) => panic!("unexpected error {e}"),
                }
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_targets() {
        for status in [OrderStatus::Delivered, OrderStatus::Cancelled, OrderStatus::Returned] {
            assert!(is_terminal(status));
            assert!(allowed_targets(status).is_empty());
        }
        assert!(!is_terminal(OrderStatus::PendingPayment));
    }

    #[test]
    fn only_pending_payment_is_cancellable() {
        for status in ALL {
            let order = order_with_status(1, status);
            if status == OrderStatus::PendingPayment {
                assert!(check_cancellable(&order).is_ok());
            } else {
                assert_eq!(check_cancellable(&order), Err(TransitionError::NotCancellable(status)));
            }
        }
    }

    #[test]
    fn apply_all_is_all_or_none() {
        let a = order_with_status(1, OrderStatus::PendingPayment);
        let b = order_with_status(2, OrderStatus::PendingPayment);
        let c = order_with_status(3, OrderStatus::PendingDelivery);

        let updated = apply_all(&[&a, &b], OrderStatus::PendingPickup).unwrap();
        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|o| o.status == OrderStatus::PendingPickup));

        // one bad member poisons the whole batch and nothing is produced
        let err = apply_all(&[&a, &b, &c], OrderStatus::PendingPickup).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition { from: OrderStatus::PendingDelivery, to: OrderStatus::PendingPickup }
        );
    }

    #[test]
    fn merge_keeps_the_most_advanced_status() {
        use OrderStatus::*;
        // push event applied first, then a stale fetch arrives
        assert_eq!(merge_status(PendingPickup, PendingPayment), PendingPickup);
        // fetch lands after the server advanced the order further than we knew
        assert_eq!(merge_status(PendingPayment, PendingPickup), PendingPickup);
        assert_eq!(merge_status(PendingPayment, Delivered), Delivered);
        assert_eq!(merge_status(Delivered, Delivered), Delivered);
        // divergent histories keep the local view
        assert_eq!(merge_status(PendingPickup, Cancelled), PendingPickup);
    }
}

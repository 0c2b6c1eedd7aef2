//! The checkout partitioner.
//!
//! A checkout submission is one batch call carrying one [`CheckoutRequest`] per shop represented in the selection.
//! [`partition`] guarantees that the requests cover the selection exactly and are pairwise disjoint; the storefront
//! either creates one order per element, all stamped with one shared payment id, or fails the whole batch. There is
//! no partial-batch recovery.
use std::collections::HashSet;

use log::{debug, info};
use thiserror::Error;

use crate::{
    cart::CartSession,
    order_types::{CartLineId, CheckoutReceipt, CheckoutRequest, Receiver, ShopCart},
    traits::{GatewayError, StorefrontGateway},
};

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("No cart lines are selected for checkout")]
    EmptySelection,
    #[error("Storefront error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Split a selection into one request per shop: each shop's line ids are intersected with the selection and non-empty
/// intersections emit a request carrying the shop id, those line ids, and the receiver. Every selected line belongs
/// to exactly one shop, so the requests cover the selection and never overlap.
pub fn partition(
    selection: &HashSet<CartLineId>,
    shop_carts: &[ShopCart],
    receiver: &Receiver,
) -> Result<Vec<CheckoutRequest>, CheckoutError> {
    let requests: Vec<CheckoutRequest> = shop_carts
        .iter()
        .filter_map(|sc| {
            let cart_line_ids: Vec<CartLineId> = sc.line_ids().filter(|id| selection.contains(id)).collect();
            if cart_line_ids.is_empty() {
                None
            } else {
                Some(CheckoutRequest { shop_id: sc.shop_id, cart_line_ids, receiver: receiver.clone() })
            }
        })
        .collect();
    if requests.is_empty() {
        return Err(CheckoutError::EmptySelection);
    }
    debug!("🧾️ Partitioned {} selected lines into {} shop requests", selection.len(), requests.len());
    Ok(requests)
}

/// Submits checkouts built from a [`CartSession`].
pub struct CheckoutApi<B> {
    gateway: B,
}

impl<B> CheckoutApi<B>
where B: StorefrontGateway
{
    pub fn new(gateway: B) -> Self {
        Self { gateway }
    }

    /// Partition the current selection and submit it as one batch. On success the checked-out lines have left the
    /// cart server-side, so the snapshot is refreshed and the selection cleared before the receipt is returned.
    pub async fn submit(&self, session: &mut CartSession, receiver: Receiver) -> Result<CheckoutReceipt, CheckoutError> {
        let requests = partition(session.selection(), session.shop_carts(), &receiver)?;
        let receipt = self.gateway.submit_checkout(&requests).await?;
        info!(
            "🧾️ Checkout complete: {} orders created under payment {}",
            receipt.orders.len(),
            receipt.payment_id
        );
        let shop_carts = self.gateway.fetch_cart().await?;
        session.replace_snapshot(shop_carts);
        session.clear_selection();
        Ok(receipt)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        cart::CartSession,
        order_types::{OrderStatus, PaymentId, ShopId},
        test_utils::MemoryStorefront,
    };

    fn receiver() -> Receiver {
        Receiver::new("Lan", "0900000000", "12 Hàng Bài, Hà Nội")
    }

    fn seeded_store() -> MemoryStorefront {
        let store = MemoryStorefront::new();
        store.seed_line(1, 1, 10, 100, 2, 100_000, 120_000, 5);
        store.seed_line(1, 2, 11, 101, 1, 50_000, 50_000, 3);
        store.seed_line(2, 3, 12, 102, 1, 300_000, 350_000, 2);
        store
    }

    #[test]
    fn requests_cover_the_selection_and_are_disjoint() {
        let store = seeded_store();
        let mut session = CartSession::new(store.shop_carts());
        session.toggle_all_selection();

        let requests = partition(session.selection(), session.shop_carts(), &receiver()).unwrap();
        assert_eq!(requests.len(), 2);

        let mut seen = HashSet::new();
        for request in &requests {
            for id in &request.cart_line_ids {
                assert!(seen.insert(*id), "line {id} appears in more than one request");
            }
        }
        assert_eq!(seen, *session.selection());

        let shop_a = requests.iter().find(|r| r.shop_id == ShopId::from(1)).unwrap();
        assert_eq!(shop_a.cart_line_ids.len(), 2);
        let shop_b = requests.iter().find(|r| r.shop_id == ShopId::from(2)).unwrap();
        assert_eq!(shop_b.cart_line_ids, vec![CartLineId::from(3)]);
    }

    #[test]
    fn partial_selection_only_includes_matching_shops() {
        let store = seeded_store();
        let mut session = CartSession::new(store.shop_carts());
        session.toggle_line(CartLineId::from(3));

        let requests = partition(session.selection(), session.shop_carts(), &receiver()).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].shop_id, ShopId::from(2));
    }

    #[test]
    fn empty_selection_is_rejected() {
        let store = seeded_store();
        let session = CartSession::new(store.shop_carts());
        let err = partition(session.selection(), session.shop_carts(), &receiver()).unwrap_err();
        assert!(matches!(err, CheckoutError::EmptySelection));
    }

    #[tokio::test]
    async fn submit_creates_one_order_per_shop_under_one_payment() {
        let store = seeded_store();
        let api = CheckoutApi::new(store.clone());
        let mut session = CartSession::new(store.shop_carts());
        session.toggle_all_selection();

        let receipt = api.submit(&mut session, receiver()).await.unwrap();
        assert_eq!(receipt.orders.len(), 2);
        assert!(receipt.orders.iter().all(|o| o.payment_id == receipt.payment_id));
        assert!(receipt.orders.iter().all(|o| o.status == OrderStatus::PendingPayment));

        // the checked-out lines are gone and the selection is cleared
        assert!(session.is_empty());
        assert!(session.selection().is_empty());
    }

    #[tokio::test]
    async fn failed_batch_leaves_the_session_untouched() {
        let store = seeded_store();
        let api = CheckoutApi::new(store.clone());
        let mut session = CartSession::new(store.shop_carts());
        session.toggle_all_selection();

        store.fail_next("submit_checkout");
        let err = api.submit(&mut session, receiver()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Gateway(_)));
        assert_eq!(session.selection().len(), 3);
        assert_eq!(session.shop_carts().len(), 2);
        assert_eq!(store.orders().len(), 0);
    }

    #[tokio::test]
    async fn consecutive_submissions_get_distinct_payment_ids() {
        let store = seeded_store();
        let api = CheckoutApi::new(store.clone());
        let mut session = CartSession::new(store.shop_carts());
        session.toggle_line(CartLineId::from(1));
        let first = api.submit(&mut session, receiver()).await.unwrap();

        session.toggle_line(CartLineId::from(3));
        let second = api.submit(&mut session, receiver()).await.unwrap();
        assert_ne!(first.payment_id, second.payment_id);
        assert_ne!(first.payment_id, PaymentId::default());
    }
}

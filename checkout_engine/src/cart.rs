//! The cart aggregation engine.
//!
//! The cart snapshot and the checkout selection live in a [`CartSession`] owned by the caller and passed into every
//! operation; the engine never keeps ambient cart state of its own. Quantity edits are validated against the line's
//! stock before anything touches the network, and selection toggles are atomic set operations over a shop or the
//! whole cart.
use std::collections::HashSet;

use log::{debug, trace};
use msc_common::Vnd;
use thiserror::Error;

use crate::{
    order_types::{CartLine, CartLineId, ShopCart, ShopId, SkuId},
    traits::{GatewayError, StorefrontGateway},
};

#[derive(Debug, Clone, Error)]
pub enum CartError {
    #[error("Quantity must be at least 1, got {0}")]
    OutOfRange(u32),
    #[error("Requested quantity {requested} exceeds the available stock of {stock}")]
    StockExceeded { requested: u32, stock: u32 },
    #[error("Cart line {0} is not in the cart")]
    LineNotFound(CartLineId),
    #[error("Storefront error: {0}")]
    Gateway(#[from] GatewayError),
}

/// The totals over the selected lines only. An empty selection yields zeroes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CartTotals {
    pub total: Vnd,
    pub savings: Vnd,
}

//--------------------------------------     CartSession    ----------------------------------------------------------
/// The caller-owned cart state: the latest snapshot grouped by shop, plus the set of lines picked for checkout.
/// The selection is ephemeral and client-side only; it is cleared by a successful checkout and pruned whenever lines
/// leave the snapshot.
#[derive(Debug, Clone, Default)]
pub struct CartSession {
    shop_carts: Vec<ShopCart>,
    selection: HashSet<CartLineId>,
}

impl CartSession {
    pub fn new(shop_carts: Vec<ShopCart>) -> Self {
        Self { shop_carts, selection: HashSet::new() }
    }

    pub fn shop_carts(&self) -> &[ShopCart] {
        &self.shop_carts
    }

    pub fn selection(&self) -> &HashSet<CartLineId> {
        &self.selection
    }

    pub fn line(&self, id: CartLineId) -> Option<&CartLine> {
        self.shop_carts.iter().flat_map(|sc| sc.lines.iter()).find(|l| l.id == id)
    }

    fn line_mut(&mut self, id: CartLineId) -> Option<&mut CartLine> {
        self.shop_carts.iter_mut().flat_map(|sc| sc.lines.iter_mut()).find(|l| l.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.shop_carts.iter().all(|sc| sc.lines.is_empty())
    }

    pub fn selected_lines(&self) -> Vec<&CartLine> {
        self.shop_carts.iter().flat_map(|sc| sc.lines.iter()).filter(|l| self.selection.contains(&l.id)).collect()
    }

    /// Select or deselect a single line. Unknown ids are ignored.
    pub fn toggle_line(&mut self, id: CartLineId) {
        if self.line(id).is_none() {
            trace!("🛒️ Ignoring selection toggle for unknown line {id}");
            return;
        }
        if !self.selection.remove(&id) {
            self.selection.insert(id);
        }
    }

    /// A shop counts as selected only when every one of its lines is in the selection.
    pub fn is_shop_selected(&self, shop_id: ShopId) -> bool {
        self.shop_carts
            .iter()
            .find(|sc| sc.shop_id == shop_id)
            .is_some_and(|sc| !sc.lines.is_empty() && sc.lines.iter().all(|l| self.selection.contains(&l.id)))
    }

    pub fn is_all_selected(&self) -> bool {
        !self.is_empty() &&
            self.shop_carts.iter().flat_map(|sc| sc.lines.iter()).all(|l| self.selection.contains(&l.id))
    }

    /// Select every line of the shop, or deselect them all if the shop was fully selected. One atomic set operation.
    pub fn toggle_shop_selection(&mut self, shop_id: ShopId) {
        let selecting = !self.is_shop_selected(shop_id);
        let ids: Vec<CartLineId> =
            self.shop_carts.iter().filter(|sc| sc.shop_id == shop_id).flat_map(ShopCart::line_ids).collect();
        for id in ids {
            if selecting {
                self.selection.insert(id);
            } else {
                self.selection.remove(&id);
            }
        }
    }

    /// Select the whole cart, or clear the selection if everything was already selected.
    pub fn toggle_all_selection(&mut self) {
        if self.is_all_selected() {
            self.selection.clear();
        } else {
            self.selection = self.shop_carts.iter().flat_map(ShopCart::line_ids).collect();
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// `total = Σ unit_price·quantity` and `savings = Σ (original_price − unit_price)·quantity` over the selected
    /// lines. Pure; no side effects.
    pub fn compute_totals(&self) -> CartTotals {
        self.selected_lines().into_iter().fold(CartTotals::default(), |acc, line| CartTotals {
            total: acc.total + line.line_total(),
            savings: acc.savings + line.line_savings(),
        })
    }

    /// Replace the snapshot with a fresh one from the storefront. Selected ids that no longer exist are dropped from
    /// the selection.
    pub fn replace_snapshot(&mut self, shop_carts: Vec<ShopCart>) {
        self.shop_carts = shop_carts;
        let live: HashSet<CartLineId> = self.shop_carts.iter().flat_map(ShopCart::line_ids).collect();
        self.selection.retain(|id| live.contains(id));
    }
}

//--------------------------------------      CartApi       ----------------------------------------------------------
/// Cart operations that involve the storefront. Validation failures are resolved locally and never produce a network
/// call.
pub struct CartApi<B> {
    gateway: B,
}

impl<B> CartApi<B>
where B: StorefrontGateway
{
    pub fn new(gateway: B) -> Self {
        Self { gateway }
    }

    /// Fetch the cart and build a fresh session with an empty selection.
    pub async fn load(&self) -> Result<CartSession, CartError> {
        let shop_carts = self.gateway.fetch_cart().await?;
        debug!("🛒️ Loaded cart with {} shops", shop_carts.len());
        Ok(CartSession::new(shop_carts))
    }

    /// Re-fetch the snapshot, keeping whatever part of the selection survived.
    pub async fn refresh(&self, session: &mut CartSession) -> Result<(), CartError> {
        let shop_carts = self.gateway.fetch_cart().await?;
        session.replace_snapshot(shop_carts);
        Ok(())
    }

    /// Change a line's quantity. `OutOfRange` and `StockExceeded` are rejected before any network call. The new value
    /// is reflected in the session optimistically and rolled back if the storefront rejects the mutation.
    pub async fn set_quantity(
        &self,
        session: &mut CartSession,
        line_id: CartLineId,
        new_qty: u32,
    ) -> Result<(), CartError> {
        let line = session.line(line_id).ok_or(CartError::LineNotFound(line_id))?;
        if new_qty < 1 {
            return Err(CartError::OutOfRange(new_qty));
        }
        if new_qty > line.stock {
            return Err(CartError::StockExceeded { requested: new_qty, stock: line.stock });
        }
        let sku_id = line.sku_id;
        let previous = line.quantity;
        if let Some(line) = session.line_mut(line_id) {
            line.quantity = new_qty;
        }
        match self.gateway.update_cart_line(line_id, sku_id, new_qty).await {
            Ok(()) => {
                trace!("🛒️ Line {line_id} quantity {previous} -> {new_qty}");
                Ok(())
            },
            Err(e) => {
                if let Some(line) = session.line_mut(line_id) {
                    line.quantity = previous;
                }
                Err(e.into())
            },
        }
    }

    /// Add a line for a SKU and refresh the snapshot so the session sees the server-assigned line id.
    pub async fn add_line(&self, session: &mut CartSession, sku_id: SkuId, quantity: u32) -> Result<(), CartError> {
        let line = self.gateway.add_cart_line(sku_id, quantity).await?;
        debug!("🛒️ Added line {} for SKU {sku_id}", line.id);
        self.refresh(session).await
    }

    /// Delete lines from the cart. Their ids also leave the selection.
    pub async fn remove_lines(&self, session: &mut CartSession, ids: &[CartLineId]) -> Result<(), CartError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.gateway.delete_cart_lines(ids).await?;
        debug!("🛒️ Removed {} lines from the cart", ids.len());
        self.refresh(session).await
    }
}

#[cfg(test)]
mod test {
    use msc_common::Vnd;

    use super::*;
    use crate::test_utils::MemoryStorefront;

    // Shop A: line 1 (100,000 x2), line 2 (50,000 x1); Shop B: line 3 (300,000 x1)
    fn two_shop_session(store: &MemoryStorefront) -> CartSession {
        store.seed_line(1, 1, 10, 100, 2, 100_000, 120_000, 5);
        store.seed_line(1, 2, 11, 101, 1, 50_000, 50_000, 3);
        store.seed_line(2, 3, 12, 102, 1, 300_000, 350_000, 2);
        CartSession::new(store.shop_carts())
    }

    #[test]
    fn totals_cover_selected_lines_only() {
        let store = MemoryStorefront::new();
        let mut session = two_shop_session(&store);
        assert_eq!(session.compute_totals(), CartTotals::default());

        session.toggle_all_selection();
        let totals = session.compute_totals();
        assert_eq!(totals.total, Vnd::from(550_000));
        assert_eq!(totals.savings, Vnd::from(2 * 20_000 + 50_000));

        session.toggle_line(CartLineId::from(3));
        assert_eq!(session.compute_totals().total, Vnd::from(250_000));
    }

    #[test]
    fn shop_selection_is_all_of_its_lines_or_nothing() {
        let store = MemoryStorefront::new();
        let mut session = two_shop_session(&store);
        let shop_a = ShopId::from(1);

        session.toggle_line(CartLineId::from(1));
        assert!(!session.is_shop_selected(shop_a), "one of two lines is not a selected shop");

        session.toggle_shop_selection(shop_a);
        assert!(session.is_shop_selected(shop_a));
        assert_eq!(session.selection().len(), 2);

        session.toggle_shop_selection(shop_a);
        assert!(session.selection().is_empty());

        session.toggle_all_selection();
        assert!(session.is_all_selected());
        session.toggle_all_selection();
        assert!(session.selection().is_empty());
    }

    #[tokio::test]
    async fn invalid_quantities_never_reach_the_gateway() {
        let store = MemoryStorefront::new();
        let api = CartApi::new(store.clone());
        let mut session = two_shop_session(&store);
        store.clear_calls();

        let err = api.set_quantity(&mut session, CartLineId::from(1), 0).await.unwrap_err();
        assert!(matches!(err, CartError::OutOfRange(0)));
        let err = api.set_quantity(&mut session, CartLineId::from(1), 6).await.unwrap_err();
        assert!(matches!(err, CartError::StockExceeded { requested: 6, stock: 5 }));
        assert!(store.calls().is_empty(), "validation failures must stay local");

        api.set_quantity(&mut session, CartLineId::from(1), 3).await.unwrap();
        assert_eq!(session.line(CartLineId::from(1)).unwrap().quantity, 3);
        assert_eq!(store.calls(), vec!["PUT /cart/1".to_string()]);
    }

    #[tokio::test]
    async fn rejected_mutation_rolls_the_session_back() {
        let store = MemoryStorefront::new();
        let api = CartApi::new(store.clone());
        let mut session = two_shop_session(&store);

        store.fail_next("update_cart_line");
        let err = api.set_quantity(&mut session, CartLineId::from(2), 2).await.unwrap_err();
        assert!(matches!(err, CartError::Gateway(_)));
        assert_eq!(session.line(CartLineId::from(2)).unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn removing_lines_prunes_the_selection() {
        let store = MemoryStorefront::new();
        let api = CartApi::new(store.clone());
        let mut session = two_shop_session(&store);
        session.toggle_all_selection();

        api.remove_lines(&mut session, &[CartLineId::from(1), CartLineId::from(3)]).await.unwrap();
        assert!(session.line(CartLineId::from(1)).is_none());
        assert_eq!(session.selection().len(), 1);
        assert!(session.selection().contains(&CartLineId::from(2)));
    }
}

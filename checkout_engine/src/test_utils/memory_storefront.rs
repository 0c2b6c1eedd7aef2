use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use msc_common::Vnd;

use crate::{
    lifecycle,
    order_types::{
        CartLine,
        CartLineId,
        CheckoutReceipt,
        CheckoutRequest,
        Order,
        OrderId,
        OrderPage,
        OrderStatus,
        ShopCart,
        ShopId,
        SkuId,
        UserId,
    },
    traits::{GatewayError, StorefrontGateway},
};

#[derive(Default)]
struct Inner {
    shop_carts: Vec<ShopCart>,
    orders: Vec<Order>,
    calls: Vec<String>,
    fail_next: HashSet<String>,
    next_order_id: i64,
    next_payment_id: i64,
}

/// An in-memory storefront. It applies the same guards a real storefront would (stock limits, cancellability, the
/// status transition table) and logs every call it receives.
#[derive(Clone, Default)]
pub struct MemoryStorefront {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorefront {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("MemoryStorefront lock poisoned")
    }

    /// Seed one cart line. Arguments: shop, line id, sku, product, quantity, unit price, original price, stock.
    #[allow(clippy::too_many_arguments)]
    pub fn seed_line(
        &self,
        shop_id: i64,
        line_id: i64,
        sku_id: i64,
        product_id: i64,
        quantity: u32,
        unit_price: i64,
        original_price: i64,
        stock: u32,
    ) {
        let line = CartLine {
            id: CartLineId::from(line_id),
            sku_id: SkuId::from(sku_id),
            product_id: product_id.into(),
            shop_id: ShopId::from(shop_id),
            quantity,
            unit_price: Vnd::from(unit_price),
            original_price: Vnd::from(original_price),
            stock,
        };
        let mut inner = self.lock();
        match inner.shop_carts.iter_mut().find(|sc| sc.shop_id == line.shop_id) {
            Some(sc) => sc.lines.push(line),
            None => inner.shop_carts.push(ShopCart::new(line.shop_id, vec![line])),
        }
    }

    pub fn shop_carts(&self) -> Vec<ShopCart> {
        self.lock().shop_carts.clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.lock().orders.clone()
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.lock().orders.iter().find(|o| o.id == id).cloned()
    }

    /// Overwrite an order's status without going through the transition table, to stage stale or advanced
    /// server-side state for race tests.
    pub fn set_status_raw(&self, id: OrderId, status: OrderStatus) {
        let mut inner = self.lock();
        if let Some(order) = inner.orders.iter_mut().find(|o| o.id == id) {
            order.status = status;
            order.updated_at = Utc::now();
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next call to the named gateway method fail with a 500 response.
    pub fn fail_next(&self, method: &str) {
        self.lock().fail_next.insert(method.to_string());
    }

    fn check_injected_failure(inner: &mut Inner, method: &str) -> Result<(), GatewayError> {
        if inner.fail_next.remove(method) {
            Err(GatewayError::Response { status: 500, message: format!("injected failure in {method}") })
        } else {
            Ok(())
        }
    }
}

impl StorefrontGateway for MemoryStorefront {
    async fn fetch_cart(&self) -> Result<Vec<ShopCart>, GatewayError> {
        let mut inner = self.lock();
        inner.calls.push("GET /cart".to_string());
        Self::check_injected_failure(&mut inner, "fetch_cart")?;
        Ok(inner.shop_carts.clone())
    }

    async fn add_cart_line(&self, sku_id: SkuId, quantity: u32) -> Result<CartLine, GatewayError> {
        let mut inner = self.lock();
        inner.calls.push("POST /cart".to_string());
        Self::check_injected_failure(&mut inner, "add_cart_line")?;
        // adding an unknown SKU is out of scope here; tests seed lines directly and only bump quantities
        let line = inner
            .shop_carts
            .iter_mut()
            .flat_map(|sc| sc.lines.iter_mut())
            .find(|l| l.sku_id == sku_id)
            .ok_or(GatewayError::Response { status: 404, message: format!("unknown sku {sku_id}") })?;
        line.quantity += quantity;
        Ok(line.clone())
    }

    async fn update_cart_line(&self, id: CartLineId, _sku_id: SkuId, quantity: u32) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        inner.calls.push(format!("PUT /cart/{}", id.value()));
        Self::check_injected_failure(&mut inner, "update_cart_line")?;
        let line = inner
            .shop_carts
            .iter_mut()
            .flat_map(|sc| sc.lines.iter_mut())
            .find(|l| l.id == id)
            .ok_or(GatewayError::Response { status: 404, message: format!("unknown cart line {id}") })?;
        if quantity < 1 || quantity > line.stock {
            return Err(GatewayError::Response { status: 422, message: format!("invalid quantity {quantity}") });
        }
        line.quantity = quantity;
        Ok(())
    }

    async fn delete_cart_lines(&self, ids: &[CartLineId]) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        inner.calls.push("POST /cart/delete".to_string());
        Self::check_injected_failure(&mut inner, "delete_cart_lines")?;
        for sc in &mut inner.shop_carts {
            sc.lines.retain(|l| !ids.contains(&l.id));
        }
        inner.shop_carts.retain(|sc| !sc.lines.is_empty());
        Ok(())
    }

    async fn submit_checkout(&self, requests: &[CheckoutRequest]) -> Result<CheckoutReceipt, GatewayError> {
        let mut inner = self.lock();
        inner.calls.push("POST /orders".to_string());
        Self::check_injected_failure(&mut inner, "submit_checkout")?;
        if requests.is_empty() {
            return Err(GatewayError::Response { status: 400, message: "empty checkout".to_string() });
        }
        // all-or-nothing: resolve every line before creating any order
        let mut resolved: Vec<(usize, Vec<CartLine>)> = Vec::with_capacity(requests.len());
        for (idx, request) in requests.iter().enumerate() {
            let mut lines = Vec::with_capacity(request.cart_line_ids.len());
            for id in &request.cart_line_ids {
                let line = inner
                    .shop_carts
                    .iter()
                    .flat_map(|sc| sc.lines.iter())
                    .find(|l| l.id == *id && l.shop_id == request.shop_id)
                    .ok_or(GatewayError::Response {
                        status: 404,
                        message: format!("cart line {id} not found in shop {}", request.shop_id),
                    })?;
                lines.push(line.clone());
            }
            resolved.push((idx, lines));
        }
        inner.next_payment_id += 1;
        let payment_id = inner.next_payment_id.into();
        let now = Utc::now();
        let mut orders = Vec::with_capacity(requests.len());
        for (idx, lines) in resolved {
            inner.next_order_id += 1;
            let request = &requests[idx];
            orders.push(Order {
                id: OrderId::from(inner.next_order_id),
                shop_id: request.shop_id,
                user_id: UserId::from(1),
                payment_id,
                status: OrderStatus::PendingPayment,
                receiver: request.receiver.clone(),
                items: lines.iter().map(Into::into).collect(),
                created_at: now,
                updated_at: now,
            });
            for sc in &mut inner.shop_carts {
                sc.lines.retain(|l| !request.cart_line_ids.contains(&l.id));
            }
        }
        inner.shop_carts.retain(|sc| !sc.lines.is_empty());
        inner.orders.extend(orders.clone());
        Ok(CheckoutReceipt { orders, payment_id })
    }

    async fn fetch_orders(&self, page: u32, limit: u32) -> Result<OrderPage, GatewayError> {
        let mut inner = self.lock();
        inner.calls.push(format!("GET /orders/manage?page={page}&limit={limit}"));
        Self::check_injected_failure(&mut inner, "fetch_orders")?;
        let start = (page.saturating_sub(1) as usize) * limit as usize;
        let orders = inner.orders.iter().skip(start).take(limit as usize).cloned().collect();
        Ok(OrderPage { orders, total: inner.orders.len() as u64 })
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Order, GatewayError> {
        let mut inner = self.lock();
        inner.calls.push(format!("GET /orders/{}", id.value()));
        Self::check_injected_failure(&mut inner, "fetch_order")?;
        inner.orders.iter().find(|o| o.id == id).cloned().ok_or(GatewayError::OrderNotFound(id))
    }

    async fn cancel_order(&self, id: OrderId) -> Result<Order, GatewayError> {
        let mut inner = self.lock();
        inner.calls.push(format!("POST /orders/{}/cancel", id.value()));
        Self::check_injected_failure(&mut inner, "cancel_order")?;
        let order =
            inner.orders.iter_mut().find(|o| o.id == id).ok_or(GatewayError::OrderNotFound(id))?;
        let cancelled = lifecycle::apply(order, OrderStatus::Cancelled)
            .map_err(|e| GatewayError::Response { status: 409, message: e.to_string() })?;
        *order = cancelled.clone();
        Ok(cancelled)
    }

    async fn set_order_status(
        &self,
        shop_id: ShopId,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, GatewayError> {
        let mut inner = self.lock();
        inner.calls.push(format!("PATCH /shops/{}/orders/{}/status", shop_id.value(), id.value()));
        Self::check_injected_failure(&mut inner, "set_order_status")?;
        let order =
            inner.orders.iter_mut().find(|o| o.id == id).ok_or(GatewayError::OrderNotFound(id))?;
        if order.shop_id != shop_id {
            return Err(GatewayError::Response { status: 403, message: format!("order {id} belongs to another shop") });
        }
        let updated = lifecycle::apply(order, status)
            .map_err(|e| GatewayError::Response { status: 409, message: e.to_string() })?;
        *order = updated.clone();
        Ok(updated)
    }
}

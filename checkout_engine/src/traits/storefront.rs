use thiserror::Error;

use crate::order_types::{
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
};

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Request to the storefront failed: {0}")]
    Request(String),
    #[error("Storefront returned {status}: {message}")]
    Response { status: u16, message: String },
    #[error("Order {0} was not found")]
    OrderNotFound(OrderId),
}

/// The storefront HTTP API as the engine sees it. All bodies are JSON; auth is a bearer token supplied by the
/// implementation. The engine performs its own validation before calling any of these, so implementations may assume
/// well-formed input but must still surface server-side rejections as [`GatewayError::Response`].
#[allow(async_fn_in_trait)]
pub trait StorefrontGateway: Clone {
    /// `GET /cart` — the full cart, grouped by shop.
    async fn fetch_cart(&self) -> Result<Vec<ShopCart>, GatewayError>;

    /// `POST /cart` — add a line for the given SKU.
    async fn add_cart_line(&self, sku_id: SkuId, quantity: u32) -> Result<CartLine, GatewayError>;

    /// `PUT /cart/{id}` — change the quantity of an existing line.
    async fn update_cart_line(&self, id: CartLineId, sku_id: SkuId, quantity: u32) -> Result<(), GatewayError>;

    /// `POST /cart/delete` — remove the given lines.
    async fn delete_cart_lines(&self, ids: &[CartLineId]) -> Result<(), GatewayError>;

    /// `POST /orders` — submit a whole checkout as one batch. The server either creates one order per request
    /// element, all stamped with one shared payment id, or fails the entire batch.
    async fn submit_checkout(&self, requests: &[CheckoutRequest]) -> Result<CheckoutReceipt, GatewayError>;

    /// `GET /orders/manage?page&limit` — one page of the buyer's orders.
    async fn fetch_orders(&self, page: u32, limit: u32) -> Result<OrderPage, GatewayError>;

    /// `GET /orders/{id}`
    async fn fetch_order(&self, id: OrderId) -> Result<Order, GatewayError>;

    /// `POST /orders/{id}/cancel` — buyer-scoped cancel. The server applies the same cancellability guard as
    /// [`crate::lifecycle::check_cancellable`].
    async fn cancel_order(&self, id: OrderId) -> Result<Order, GatewayError>;

    /// `PATCH /shops/{shop_id}/orders/{order_id}/status` — admin-scoped status change.
    async fn set_order_status(&self, shop_id: ShopId, id: OrderId, status: OrderStatus)
        -> Result<Order, GatewayError>;
}

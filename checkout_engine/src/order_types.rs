use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use msc_common::Vnd;
use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------    Identifiers     ----------------------------------------------------------

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

id_type!(CartLineId);
id_type!(SkuId);
id_type!(ProductId);
id_type!(ShopId);
id_type!(OrderId);
id_type!(PaymentId);
id_type!(UserId);

//--------------------------------------    OrderStatus     ----------------------------------------------------------
/// The lifecycle state of an order. The wire format is the SCREAMING_SNAKE_CASE form used by the storefront, and
/// `Display`/`FromStr` round-trip through the same strings. Transitions between statuses are governed by the table in
/// [`crate::lifecycle`]; nothing else may change an order's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// The order exists but no payment confirmation has arrived.
    PendingPayment,
    /// Payment is confirmed; the shop has not yet handed the parcel to the courier.
    PendingPickup,
    /// The parcel is with the courier.
    PendingDelivery,
    /// Delivered to the receiver. Terminal.
    Delivered,
    /// Cancelled by the buyer or an admin before payment. Terminal.
    Cancelled,
    /// Sent back after delivery was attempted or completed. Terminal.
    Returned,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::PendingPickup => "PENDING_PICKUP",
            OrderStatus::PendingDelivery => "PENDING_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Returned => "RETURNED",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for OrderStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(Self::PendingPayment),
            "PENDING_PICKUP" => Ok(Self::PendingPickup),
            "PENDING_DELIVERY" => Ok(Self::PendingDelivery),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            "RETURNED" => Ok(Self::Returned),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

//--------------------------------------      CartLine      ----------------------------------------------------------
/// One SKU in the shared cart. Quantity edits must satisfy `1 <= quantity <= stock` before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: CartLineId,
    pub sku_id: SkuId,
    pub product_id: ProductId,
    pub shop_id: ShopId,
    pub quantity: u32,
    pub unit_price: Vnd,
    pub original_price: Vnd,
    pub stock: u32,
}

impl CartLine {
    pub fn line_total(&self) -> Vnd {
        self.unit_price * i64::from(self.quantity)
    }

    pub fn line_savings(&self) -> Vnd {
        (self.original_price - self.unit_price) * i64::from(self.quantity)
    }
}

//--------------------------------------      ShopCart      ----------------------------------------------------------
/// The slice of the cart belonging to one shop. Derived from the cart snapshot; read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopCart {
    pub shop_id: ShopId,
    pub lines: Vec<CartLine>,
}

impl ShopCart {
    pub fn new(shop_id: ShopId, lines: Vec<CartLine>) -> Self {
        Self { shop_id, lines }
    }

    pub fn line_ids(&self) -> impl Iterator<Item = CartLineId> + '_ {
        self.lines.iter().map(|l| l.id)
    }
}

//--------------------------------------      Receiver      ----------------------------------------------------------
/// Delivery details attached at checkout time. Immutable once an order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    pub name: String,
    pub phone: String,
    pub address: String,
}

impl Receiver {
    pub fn new<S: Into<String>>(name: S, phone: S, address: S) -> Self {
        Self { name: name.into(), phone: phone.into(), address: address.into() }
    }
}

//--------------------------------------   CheckoutRequest   ---------------------------------------------------------
/// One element of a checkout submission: every selected line belonging to one shop. The union of `cart_line_ids`
/// across a submission equals the selection, and the sets are pairwise disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub shop_id: ShopId,
    pub cart_line_ids: Vec<CartLineId>,
    pub receiver: Receiver,
}

//--------------------------------------      OrderLine      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub sku_id: SkuId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Vnd,
}

impl OrderLine {
    pub fn line_total(&self) -> Vnd {
        self.unit_price * i64::from(self.quantity)
    }
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        Self { sku_id: line.sku_id, product_id: line.product_id, quantity: line.quantity, unit_price: line.unit_price }
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
/// An order as created by the storefront from one element of a checkout submission. Orders are never deleted;
/// terminal statuses are retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub shop_id: ShopId,
    pub user_id: UserId,
    pub payment_id: PaymentId,
    pub status: OrderStatus,
    pub receiver: Receiver,
    pub items: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn total(&self) -> Vnd {
        self.items.iter().map(OrderLine::line_total).sum()
    }
}

//--------------------------------------   CheckoutReceipt   ---------------------------------------------------------
/// The storefront's response to a batch checkout: one order per submitted request, all sharing `payment_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub orders: Vec<Order>,
    pub payment_id: PaymentId,
}

//--------------------------------------      OrderPage      ---------------------------------------------------------
/// One page of the buyer's order list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
}

//--------------------------------------     PaymentGroup    ---------------------------------------------------------
/// The set of orders created by one checkout submission, unified by their shared payment id and settled together.
/// Derived, never persisted; membership is fixed at creation time and never grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentGroup {
    pub payment_id: PaymentId,
    pub orders: Vec<Order>,
    pub aggregate_total: Vnd,
}

impl PaymentGroup {
    pub fn new(payment_id: PaymentId, orders: Vec<Order>) -> Self {
        let aggregate_total = orders.iter().map(Order::total).sum();
        Self { payment_id, orders, aggregate_total }
    }

    pub fn order_ids(&self) -> Vec<OrderId> {
        self.orders.iter().map(|o| o.id).collect()
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    pub fn order_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == id)
    }

    /// True once every member has left `PendingPayment`, whether by payment confirmation or cancellation.
    pub fn is_settled(&self) -> bool {
        self.orders.iter().all(|o| o.status != OrderStatus::PendingPayment)
    }
}

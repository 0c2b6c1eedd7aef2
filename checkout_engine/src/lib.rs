//! Multi-Shop Checkout Engine
//!
//! A buyer fills one cart with lines from several shops, selects a subset, and submits a single checkout. The
//! storefront creates one order per shop, all stamped with one shared payment id, and confirms payment asynchronously
//! over a push channel. This crate contains the client-side core that keeps those orders coherent:
//!
//! 1. The cart aggregation engine ([`mod@cart`]): a caller-owned [`cart::CartSession`] holding the cart snapshot and
//!    the selection set, plus the quantity guards that reject invalid edits before they reach the network.
//! 2. The checkout partitioner ([`mod@checkout`]): splits a selection into one [`order_types::CheckoutRequest`] per
//!    shop and submits them as a single batch.
//! 3. The order status state machine ([`mod@lifecycle`]): the transition table every status change funnels through.
//! 4. The payment group tracker ([`mod@group_flow`]): groups orders by payment id, applies payment-success events
//!    idempotently, and drives cancellation across a whole group.
//!
//! The storefront HTTP API and the realtime payment channel are abstracted behind the traits in [`mod@traits`];
//! concrete implementations live in the `storefront_client` crate. The engine also emits events through a small hook
//! system ([`mod@events`]) so callers can react to a group being paid or cancelled without polling.
pub mod cart;
pub mod checkout;
pub mod events;
pub mod group_flow;
pub mod lifecycle;
pub mod order_types;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use cart::{CartApi, CartError, CartSession, CartTotals};
pub use checkout::{partition, CheckoutApi, CheckoutError};
pub use group_flow::{CancelFailure, CancelGroupOutcome, FailedCancel, GroupFlowApi, GroupFlowError};
pub use lifecycle::TransitionError;
pub use traits::{ChannelError, GatewayError, PaymentChannel, PaymentEvent, PaymentHandle, StorefrontGateway};

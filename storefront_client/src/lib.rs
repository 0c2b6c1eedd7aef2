//! Concrete clients for the two collaborators the checkout engine abstracts over: the storefront HTTP API
//! ([`StorefrontApi`], implementing `checkout_engine::StorefrontGateway`) and the realtime payment channel
//! ([`SocketPaymentChannel`], implementing `checkout_engine::PaymentChannel` over a WebSocket).
//!
//! Configuration comes from the environment via [`StorefrontConfig::from_env_or_default`]; the bearer token is
//! supplied on every HTTP request and on the channel handshake, never per message.
mod api;
mod config;
mod data_objects;
mod error;
mod ws;

pub use api::StorefrontApi;
pub use config::{PaymentInstructionsConfig, StorefrontConfig};
pub use data_objects::{AddCartLineRequest, DeleteCartLinesRequest, SetOrderStatusRequest, UpdateCartLineRequest};
pub use error::StorefrontApiError;
pub use ws::SocketPaymentChannel;

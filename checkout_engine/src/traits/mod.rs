//! Seams to the engine's two external collaborators: the storefront HTTP API and the realtime payment channel.
//! Concrete implementations live in the `storefront_client` crate; the in-memory versions used by tests live in
//! [`crate::test_utils`].
mod channel;
mod storefront;

pub use channel::{ChannelError, PaymentChannel, PaymentEvent, PaymentHandle};
pub use storefront::{GatewayError, StorefrontGateway};

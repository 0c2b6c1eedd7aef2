//! WebSocket implementation of the payment channel.
//!
//! The storefront exposes a realtime namespace; clients join a room keyed by the payment id and the server emits a
//! `payment` event with `{"status": "success"}` when the transfer for that group is confirmed. That success event is
//! the only frame this adapter turns into a [`PaymentEvent`]; everything else on the socket is ignored. The bearer
//! token travels on the handshake request, not per message.
use checkout_engine::{
    order_types::PaymentId,
    traits::{ChannelError, PaymentChannel, PaymentEvent, PaymentHandle},
};
use futures_util::{SinkExt, StreamExt};
use log::*;
use msc_common::Secret;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::header::{HeaderValue, AUTHORIZATION},
        Message,
    },
};
use url::Url;

use crate::config::StorefrontConfig;

const EVENT_BUFFER: usize = 8;

#[derive(Debug, Clone)]
pub struct SocketPaymentChannel {
    ws_url: Url,
}

impl SocketPaymentChannel {
    pub fn new(ws_url: Url) -> Self {
        Self { ws_url }
    }

    pub fn from_config(config: &StorefrontConfig) -> Self {
        Self::new(config.ws_url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Decode one text frame into the payment-success event, if that is what it carries.
fn parse_payment_frame(text: &str, payment_id: PaymentId) -> Option<PaymentEvent> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            trace!("📡️ Ignoring undecodable frame: {e}");
            return None;
        },
    };
    if envelope.event != "payment" {
        trace!("📡️ Ignoring {} event", envelope.event);
        return None;
    }
    (envelope.data["status"] == "success").then_some(PaymentEvent::Succeeded { payment_id })
}

impl PaymentChannel for SocketPaymentChannel {
    async fn open(&self, payment_id: PaymentId, auth_token: &Secret<String>) -> Result<PaymentHandle, ChannelError> {
        let mut request =
            self.ws_url.as_str().into_client_request().map_err(|e| ChannelError::Connect(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", auth_token.reveal()))
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
        let (ws, _) = connect_async(request).await.map_err(|e| ChannelError::Connect(e.to_string()))?;
        debug!("📡️ Connected to the payment namespace for {payment_id}");

        let (mut sink, mut stream) = ws.split();
        let join = json!({ "event": "join", "room": format!("payment:{}", payment_id.value()) });
        sink.send(Message::text(join.to_string())).await.map_err(|e| ChannelError::Protocol(e.to_string()))?;

        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        let (shutdown, mut closed) = oneshot::channel();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut closed => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    },
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_payment_frame(text.as_str(), payment_id) {
                                if events.send(event).await.is_err() {
                                    // the handle is gone; nobody is listening any more
                                    break;
                                }
                            }
                        },
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {},
                        Some(Ok(Message::Close(frame))) => {
                            debug!("📡️ Server closed the payment channel for {payment_id}: {frame:?}");
                            break;
                        },
                        Some(Ok(_)) => {},
                        Some(Err(e)) => {
                            warn!("📡️ Payment channel for {payment_id} failed: {e}");
                            break;
                        },
                        None => break,
                    },
                }
            }
            debug!("📡️ Reader for payment {payment_id} finished");
        });
        Ok(PaymentHandle::new(payment_id, receiver, shutdown))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn success_frames_become_events() {
        let payment_id = PaymentId::from(999);
        let event = parse_payment_frame(r#"{"event":"payment","data":{"status":"success"}}"#, payment_id);
        assert_eq!(event, Some(PaymentEvent::Succeeded { payment_id }));
    }

    #[test]
    fn other_frames_are_ignored() {
        let _ = env_logger::try_init();
        let payment_id = PaymentId::from(999);
        // wrong status, wrong event, chat traffic on the shared namespace, garbage
        assert_eq!(parse_payment_frame(r#"{"event":"payment","data":{"status":"pending"}}"#, payment_id), None);
        assert_eq!(parse_payment_frame(r#"{"event":"joined","data":{}}"#, payment_id), None);
        assert_eq!(parse_payment_frame(r#"{"event":"chat","data":{"message":"xin chào"}}"#, payment_id), None);
        assert_eq!(parse_payment_frame("not json", payment_id), None);
        assert_eq!(parse_payment_frame(r#"{"event":"payment"}"#, payment_id), None);
    }
}

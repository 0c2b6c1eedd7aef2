use checkout_engine::order_types::PaymentId;
use log::*;
use msc_common::Secret;
use url::Url;

const DEFAULT_STOREFRONT_URL: &str = "http://127.0.0.1:3000/";
const DEFAULT_WS_URL: &str = "ws://127.0.0.1:3000/ws/";

#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Base url of the storefront REST API, e.g. `https://shop.example.com/api/`.
    pub base_url: Url,
    /// Url of the realtime namespace the payment rooms live under.
    pub ws_url: Url,
    /// Bearer token presented on every request and on the channel handshake.
    pub access_token: Secret<String>,
    /// Bank transfer details shown to the buyer while a payment group awaits settlement.
    pub payment: PaymentInstructionsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentInstructionsConfig {
    pub bank_account: String,
    pub bank_name: String,
    /// Prepended to the payment id to form the transfer memo, so incoming transfers can be matched to their group.
    pub reference_prefix: String,
}

impl PaymentInstructionsConfig {
    /// The human-readable transfer memo for a payment group, `{prefix}{payment_id}`.
    pub fn reference(&self, payment_id: PaymentId) -> String {
        format!("{}{}", self.reference_prefix, payment_id.value())
    }
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_STOREFRONT_URL).expect("default storefront url is valid"),
            ws_url: Url::parse(DEFAULT_WS_URL).expect("default ws url is valid"),
            access_token: Secret::default(),
            payment: PaymentInstructionsConfig::default(),
        }
    }
}

impl StorefrontConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = url_from_env("MSC_STOREFRONT_URL", DEFAULT_STOREFRONT_URL);
        let ws_url = url_from_env("MSC_WS_URL", DEFAULT_WS_URL);
        let access_token = Secret::new(std::env::var("MSC_ACCESS_TOKEN").unwrap_or_else(|_| {
            warn!("🪛️ MSC_ACCESS_TOKEN not set; requests will be unauthenticated");
            String::new()
        }));
        let payment = PaymentInstructionsConfig {
            bank_account: std::env::var("MSC_BANK_ACCOUNT").unwrap_or_default(),
            bank_name: std::env::var("MSC_BANK_NAME").unwrap_or_default(),
            reference_prefix: std::env::var("MSC_PAYMENT_PREFIX").unwrap_or_else(|_| {
                warn!("🪛️ MSC_PAYMENT_PREFIX not set, using MSC as default");
                "MSC".to_string()
            }),
        };
        Self { base_url, ws_url, access_token, payment }
    }
}

fn url_from_env(var: &str, default: &str) -> Url {
    let value = std::env::var(var).unwrap_or_else(|_| {
        warn!("🪛️ {var} not set, using {default} as default");
        default.to_string()
    });
    Url::parse(&value).unwrap_or_else(|e| {
        warn!("🪛️ {value} is not a valid url for {var}. {e} Using the default, {default}, instead.");
        Url::parse(default).expect("default url is valid")
    })
}

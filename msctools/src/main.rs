use std::time::Duration;

use anyhow::{anyhow, Result};
use checkout_engine::{
    events::{EventHandlers, EventHooks},
    order_types::{PaymentId, Receiver},
    CartApi,
    CheckoutApi,
    GroupFlowApi,
};
use clap::{Args, Parser, Subcommand};
use log::debug;
use storefront_client::{SocketPaymentChannel, StorefrontApi, StorefrontConfig};

mod formatting;

use formatting::{format_cancel_outcome, format_cart, format_orders, format_payment_instructions};

#[derive(Parser, Debug)]
#[command(version, about = "Buyer tools for the multi-shop checkout storefront")]
pub struct Arguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the cart, grouped by shop, with the totals for a full selection
    #[clap(name = "cart")]
    Cart,
    /// Check out every line currently in the cart
    #[clap(name = "checkout")]
    Checkout(CheckoutParams),
    /// List your orders
    #[clap(name = "orders")]
    Orders {
        #[arg(short, long, default_value = "1")]
        page: u32,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Watch a payment group until the payment is confirmed or every order is cancelled
    #[clap(name = "watch")]
    Watch { payment_id: i64 },
    /// Cancel every order in a payment group that can still be cancelled
    #[clap(name = "cancel")]
    Cancel { payment_id: i64 },
    /// Print the bank transfer instructions and QR code for a payment group
    #[clap(name = "pay-info")]
    PayInfo { payment_id: i64 },
}

#[derive(Debug, Args)]
pub struct CheckoutParams {
    /// Receiver name
    #[arg(short = 'n', long = "name")]
    name: String,
    /// Receiver phone number
    #[arg(short = 'p', long = "phone")]
    phone: String,
    /// Delivery address
    #[arg(short = 'a', long = "address")]
    address: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    let config = StorefrontConfig::from_env_or_default();
    let api = StorefrontApi::new(config.clone())?;
    match args.command {
        Command::Cart => show_cart(&api).await,
        Command::Checkout(params) => checkout(&api, params).await,
        Command::Orders { page, limit } => list_orders(&api, page, limit).await,
        Command::Watch { payment_id } => watch(&api, &config, PaymentId::from(payment_id)).await,
        Command::Cancel { payment_id } => cancel(&api, PaymentId::from(payment_id)).await,
        Command::PayInfo { payment_id } => pay_info(&api, &config, PaymentId::from(payment_id)).await,
    }
}

async fn show_cart(api: &StorefrontApi) -> Result<()> {
    let cart = CartApi::new(api.clone());
    let mut session = cart.load().await?;
    session.toggle_all_selection();
    println!("{}", format_cart(&session)?);
    Ok(())
}

async fn checkout(api: &StorefrontApi, params: CheckoutParams) -> Result<()> {
    let cart = CartApi::new(api.clone());
    let mut session = cart.load().await?;
    session.toggle_all_selection();
    let receiver = Receiver::new(params.name, params.phone, params.address);
    let receipt = CheckoutApi::new(api.clone()).submit(&mut session, receiver).await?;
    println!("{}", format_orders(&receipt.orders)?);
    let total: msc_common::Vnd = receipt.orders.iter().map(|o| o.total()).sum();
    println!("Payment id: {}", receipt.payment_id);
    println!("Amount due: {total}");
    println!("Run `msctools pay-info {}` for transfer instructions.", receipt.payment_id.value());
    Ok(())
}

async fn list_orders(api: &StorefrontApi, page: u32, limit: u32) -> Result<()> {
    let orders = api.orders_page(page, limit).await?;
    println!("{}", format_orders(&orders.orders)?);
    println!("Page {page} of {} orders total", orders.total);
    Ok(())
}

async fn watch(api: &StorefrontApi, config: &StorefrontConfig, payment_id: PaymentId) -> Result<()> {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|event| {
        Box::pin(async move {
            println!("✅ Order {} is paid and awaiting pickup", event.order.id);
        })
    });
    let handlers = EventHandlers::new(8, hooks);
    let producers = handlers.producers();
    handlers.start_handlers();

    let mut tracker = GroupFlowApi::new(api.clone(), producers);
    let group = tracker.load_group(payment_id).await?;
    println!("Watching {} orders under payment {payment_id} ({})", group.orders.len(), group.aggregate_total);
    println!("Waiting for the payment confirmation. Ctrl-C to stop watching.");

    let channel = SocketPaymentChannel::from_config(config);
    tracker.watch(&channel, payment_id, &config.access_token).await?;
    loop {
        if tracker.group(payment_id).is_some_and(|g| g.is_settled()) {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    tracker.unwatch(payment_id);
    debug!("Stopped watching payment {payment_id}");

    let group = tracker.group(payment_id).ok_or_else(|| anyhow!("group {payment_id} vanished while watching"))?;
    println!("{}", format_orders(&group.orders)?);
    Ok(())
}

async fn cancel(api: &StorefrontApi, payment_id: PaymentId) -> Result<()> {
    let tracker = GroupFlowApi::new(api.clone(), Default::default());
    tracker.load_group(payment_id).await?;
    let outcome = tracker.cancel_group(payment_id).await?;
    println!("{}", format_cancel_outcome(&outcome)?);
    Ok(())
}

async fn pay_info(api: &StorefrontApi, config: &StorefrontConfig, payment_id: PaymentId) -> Result<()> {
    let tracker = GroupFlowApi::new(api.clone(), Default::default());
    tracker.load_group(payment_id).await?;
    let amount = tracker.total_for_group(payment_id)?;
    println!("{}", format_payment_instructions(&config.payment, payment_id, amount)?);
    Ok(())
}

use std::fmt::Write;

use anyhow::Result;
use checkout_engine::{
    cart::CartSession,
    group_flow::{CancelFailure, CancelGroupOutcome},
    order_types::{Order, PaymentId},
};
use msc_common::Vnd;
use prettytable::{
    format::{LinePosition, LineSeparator, TableFormat},
    row,
    Table,
};
use qrcode::{render::unicode, QrCode};
use storefront_client::PaymentInstructionsConfig;

fn markdown_format() -> TableFormat {
    prettytable::format::FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

pub fn format_cart(session: &CartSession) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "## Cart")?;
    let mut table = Table::new();
    table.set_format(markdown_format());
    table.set_titles(row!["Shop", "Line", "SKU", "Qty", "Unit price", "Line total"]);
    for shop_cart in session.shop_carts() {
        for line in &shop_cart.lines {
            table.add_row(row![
                shop_cart.shop_id,
                line.id,
                line.sku_id,
                line.quantity,
                r->line.unit_price,
                r->line.line_total()
            ]);
        }
    }
    write!(f, "{table}")?;
    let totals = session.compute_totals();
    writeln!(f, "Selected total: {:<15} You save: {}", totals.total.to_string(), totals.savings)?;
    Ok(f)
}

pub fn format_orders(orders: &[Order]) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "## Orders")?;
    let mut table = Table::new();
    table.set_format(markdown_format());
    table.set_titles(row!["Order", "Shop", "Payment", "Status", "Total", "Updated"]);
    for order in orders {
        table.add_row(row![
            order.id,
            order.shop_id,
            order.payment_id,
            order.status,
            r->order.total(),
            order.updated_at.format("%Y-%m-%d %H:%M")
        ]);
    }
    write!(f, "{table}")?;
    Ok(f)
}

pub fn format_cancel_outcome(outcome: &CancelGroupOutcome) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "## Cancellation of payment group {}", outcome.payment_id)?;
    for order_id in &outcome.cancelled {
        writeln!(f, "Cancelled: {order_id}")?;
    }
    for failure in &outcome.failed {
        match &failure.reason {
            CancelFailure::NotCancellable(status) => {
                writeln!(f, "Not cancelled: {} is already {status}", failure.order_id)?;
            },
            CancelFailure::Gateway(message) => {
                writeln!(f, "Not cancelled: {} ({message})", failure.order_id)?;
            },
        }
    }
    if outcome.is_partial() {
        writeln!(f, "Only part of the group could be cancelled. Re-run to retry the remaining orders.")?;
    }
    Ok(f)
}

/// Bank transfer instructions with a scannable QR code. The memo ties the transfer back to the payment group.
pub fn format_payment_instructions(
    payment: &PaymentInstructionsConfig,
    payment_id: PaymentId,
    amount: Vnd,
) -> Result<String> {
    let reference = payment.reference(payment_id);
    let transfer = format!("{}|{}|{}|{}", payment.bank_name, payment.bank_account, amount.value(), reference);
    let code = QrCode::new(&transfer)
        .map(|code| {
            code.render::<unicode::Dense1x2>()
                .dark_color(unicode::Dense1x2::Dark)
                .light_color(unicode::Dense1x2::Light)
                .quiet_zone(false)
                .build()
        })
        .unwrap_or_default();
    let mut f = String::new();
    writeln!(f, "## Payment instructions for group {payment_id}")?;
    writeln!(f, "Bank          : {}", payment.bank_name)?;
    writeln!(f, "Account number: {}", payment.bank_account)?;
    writeln!(f, "Amount        : {amount}")?;
    writeln!(f, "Transfer memo : {reference}")?;
    writeln!(f, "{code}")?;
    Ok(f)
}

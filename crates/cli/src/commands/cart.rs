//! Cart commands.

use cart_sync::SyncError;
use cart_sync::engine::SyncState;
use cart_sync_core::{ItemRef, Product, Quantity, format_amount};

use super::{CliError, Context};

/// Print the cart and its totals.
pub fn show(ctx: &Context) -> Result<(), CliError> {
    let currency_code = ctx.config.currency_code;
    let cart = ctx.engine.cart();

    match (ctx.engine.state(), ctx.engine.identity()) {
        (SyncState::Authenticated, Some(identity)) => {
            println!("Cart of user {} ({})", identity.user_id, identity.role);
        }
        (state, _) => println!("Cart ({state})"),
    }
    if ctx.engine.merge_pending() {
        println!("  guest cart not merged yet, run again to retry");
    }

    let items = cart.items();
    if items.is_empty() {
        println!("  (empty)");
    }
    for item in &items {
        let reference = item
            .line_item_id
            .map_or_else(|| format!("product:{}", item.product_id), |id| format!("line:{id}"));
        println!(
            "  {:>3} x {:<30} {:>10}  [{reference}]",
            item.quantity.get(),
            item.product_name,
            item.unit_price
                .times(item.quantity)
                .map_or_else(|| "overflow".to_string(), |line| format_amount(line, currency_code)),
        );
    }

    let totals = cart.totals();
    println!(
        "Items: {}  Subtotal: {}",
        totals.item_count,
        totals.subtotal_display(currency_code)
    );
    Ok(())
}

pub async fn add(ctx: &Context, product: &Product, quantity: i64) -> Result<(), CliError> {
    let quantity = Quantity::from_requested(quantity)
        .map_err(|e| SyncError::Validation(e.to_string()))?
        .ok_or_else(|| SyncError::Validation("Quantity must be at least 1".to_string()))?;
    ctx.engine.cart().add_item(product, quantity).await?;
    Ok(())
}

pub async fn remove(ctx: &Context, item: ItemRef) -> Result<(), CliError> {
    ctx.engine.cart().remove_item(item).await?;
    Ok(())
}

pub async fn set_quantity(ctx: &Context, item: ItemRef, quantity: i64) -> Result<(), CliError> {
    ctx.engine.cart().update_quantity(item, quantity).await?;
    Ok(())
}

pub async fn clear(ctx: &Context) -> Result<(), CliError> {
    ctx.engine.cart().clear_cart().await?;
    Ok(())
}

//! Favorites commands.

use cart_sync::favorites::Toggled;
use cart_sync_core::Product;

use super::{CliError, Context};

/// Print the signed-in user's favorites.
pub async fn list(ctx: &Context) -> Result<(), CliError> {
    ctx.favorites.load().await?;
    let favorites = ctx.favorites.favorites();
    if favorites.is_empty() {
        println!("No favorites");
    }
    for entry in favorites {
        println!(
            "  {:<30} {:>10}  [product:{}]",
            entry.product.name,
            entry.product.unit_price.display(),
            entry.product_id
        );
    }
    Ok(())
}

/// Flip `product` in the favorites list.
pub async fn toggle(ctx: &Context, product: &Product) -> Result<(), CliError> {
    // Membership is read from the loaded list, so load before flipping.
    ctx.favorites.load().await?;
    match ctx.favorites.toggle_favorite(product).await? {
        Toggled::Added => println!("{} is now a favorite", product.name),
        Toggled::Removed => println!("{} is no longer a favorite", product.name),
    }
    Ok(())
}

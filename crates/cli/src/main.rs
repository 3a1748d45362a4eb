//! cartctl - drive the cart sync engine from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Guest cart, kept in the guest store file
//! cartctl add --product 7 --name "Dried Mango" --price 4.50 --qty 2
//! cartctl show
//!
//! # Sign in as user 42: the guest cart is merged into the remote cart
//! cartctl --user 42 show
//!
//! # Offline: the cart stays the guest cart in the guest store file, --user
//! # only signs in to an in-process favorites service
//! cartctl --user 42 --offline favorites list
//!
//! # Favorites (signed-in customers only)
//! cartctl --user 42 favorites toggle --product 7 --name "Dried Mango" --price 4.50
//! ```
//!
//! # Commands
//!
//! - `show` - Print the cart and its totals
//! - `add` - Add a product
//! - `remove` - Remove a line (`product:<id>`, `line:<id>` or a bare product id)
//! - `set-qty` - Set a line's quantity; zero or less removes it
//! - `clear` - Empty the cart
//! - `favorites list|toggle` - Show or flip favorites

#![cfg_attr(not(test), forbid(unsafe_code))]
// Terminal output is the interface of this binary.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::{Parser, Subcommand};

use cart_sync_core::{ItemRef, Role, UserId};

mod commands;

use commands::{Context, ProductArgs, SessionArgs, parse_item_ref};

#[derive(Parser)]
#[command(name = "cartctl")]
#[command(author, version, about = "Cart and favorites sync tool")]
struct Cli {
    /// Sign in as this user id
    #[arg(long, global = true)]
    user: Option<UserId>,

    /// Role of the signed-in user (`customer`, `admin`)
    #[arg(long, global = true, default_value = "customer")]
    role: Role,

    /// Use an in-process service instead of the API. The cart stays the
    /// guest cart (never merged); `--user` only applies to favorites
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cart and its totals
    Show,
    /// Add a product to the cart
    Add {
        #[command(flatten)]
        product: ProductArgs,

        /// Quantity to add
        #[arg(long, default_value_t = 1)]
        qty: i64,
    },
    /// Remove a line from the cart
    Remove {
        /// `product:<id>`, `line:<id>` or a bare product id
        #[arg(value_parser = parse_item_ref)]
        item: ItemRef,
    },
    /// Set the quantity of a line
    SetQty {
        #[arg(value_parser = parse_item_ref)]
        item: ItemRef,

        /// New quantity; zero or less removes the line
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove every line
    Clear,
    /// Show or change favorites
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
}

#[derive(Subcommand)]
enum FavoritesAction {
    /// List favorites
    List,
    /// Add or remove a product
    Toggle {
        #[command(flatten)]
        product: ProductArgs,
    },
}

#[tokio::main]
async fn main() {
    // Defaults to info for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cart_sync=info,cartctl=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    let session = SessionArgs {
        user: cli.user,
        role: cli.role,
        offline: cli.offline,
    };
    let mut ctx = Context::open(&session).await?;

    let result = match cli.command {
        Commands::Show => commands::cart::show(&ctx),
        Commands::Add { product, qty } => {
            let product = product.into_product(ctx.config.currency_code);
            commands::cart::add(&ctx, &product, qty).await
        }
        Commands::Remove { item } => commands::cart::remove(&ctx, item).await,
        Commands::SetQty { item, quantity } => {
            commands::cart::set_quantity(&ctx, item, quantity).await
        }
        Commands::Clear => commands::cart::clear(&ctx).await,
        Commands::Favorites { action } => match action {
            FavoritesAction::List => commands::favorites::list(&ctx).await,
            FavoritesAction::Toggle { product } => {
                let product = product.into_product(ctx.config.currency_code);
                commands::favorites::toggle(&ctx, &product).await
            }
        },
    };

    ctx.flush_notifications();
    result
}

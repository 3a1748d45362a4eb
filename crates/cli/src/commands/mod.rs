//! Command implementations and the session they run in.

pub mod cart;
pub mod favorites;

use std::sync::Arc;

use clap::Args;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::info;

use cart_sync::SyncError;
use cart_sync::config::{ConfigError, SyncConfig};
use cart_sync::engine::{Session, SyncEngine};
use cart_sync::favorites::FavoritesSyncEngine;
use cart_sync::guest::{FileGuestStore, StorageError};
use cart_sync::notify::{Notification, NotificationLevel, Notifier};
use cart_sync::remote::{
    FavoritesService, HttpCartClient, InMemoryCartService, RemoteCartService, RemoteError,
};
use cart_sync_core::{
    CurrencyCode, Identity, ItemRef, LineItemId, Price, Product, ProductId, Role, UserId,
};

/// Errors that can end a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Guest store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cart service client error: {0}")]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Session flags shared by every command.
#[derive(Debug, Clone, Copy)]
pub struct SessionArgs {
    pub user: Option<UserId>,
    pub role: Role,
    pub offline: bool,
}

impl SessionArgs {
    fn identity(&self) -> Option<Identity> {
        self.user.map(|user_id| Identity {
            user_id,
            role: self.role,
        })
    }

    /// Session the cart engine starts in.
    ///
    /// Offline, the cart service lives only as long as the process, so the
    /// cart stays the guest cart in the guest store file and is never merged
    /// away.
    #[must_use]
    pub fn cart_session(&self) -> Session {
        match self.identity() {
            Some(identity) if !self.offline => Session::Authenticated(identity),
            _ => Session::Anonymous,
        }
    }
}

/// Product snapshot given on the command line.
#[derive(Debug, Args)]
pub struct ProductArgs {
    /// Product id
    #[arg(long)]
    pub product: ProductId,

    /// Display name
    #[arg(long)]
    pub name: String,

    /// Unit price, e.g. `4.50`
    #[arg(long)]
    pub price: Decimal,

    #[arg(long)]
    pub category: Option<String>,

    /// Photo reference
    #[arg(long)]
    pub photo: Option<String>,
}

impl ProductArgs {
    pub fn into_product(self, currency_code: CurrencyCode) -> Product {
        Product {
            id: self.product,
            name: self.name,
            unit_price: Price::new(self.price, currency_code),
            photo_ref: self.photo,
            category: self.category,
        }
    }
}

/// Parse `product:<id>`, `line:<id>` or a bare product id.
pub fn parse_item_ref(s: &str) -> Result<ItemRef, String> {
    let (kind, id) = s.split_once(':').unwrap_or(("product", s));
    let parsed = match kind {
        "product" => id.parse::<ProductId>().map(ItemRef::from),
        "line" => id.parse::<LineItemId>().map(ItemRef::from),
        _ => {
            return Err(format!(
                "unknown item kind `{kind}` (expected `product` or `line`)"
            ));
        }
    };
    parsed.map_err(|e| format!("invalid id `{id}`: {e}"))
}

/// Engines wired up for one command.
pub struct Context {
    pub config: SyncConfig,
    pub engine: SyncEngine,
    pub favorites: FavoritesSyncEngine,
    notifications: broadcast::Receiver<Notification>,
}

impl Context {
    /// Load configuration, open the guest store and start the session.
    ///
    /// Signing in merges the stored guest cart into the user's remote cart,
    /// except offline (see [`SessionArgs::cart_session`]).
    pub async fn open(args: &SessionArgs) -> Result<Self, CliError> {
        let config = SyncConfig::from_env()?;
        let guest_store = Arc::new(FileGuestStore::open(config.guest_store_path.clone())?);

        let (carts, favorites): (Arc<dyn RemoteCartService>, Arc<dyn FavoritesService>) =
            if args.offline || (args.user.is_none() && config.remote.is_none()) {
                let service = Arc::new(InMemoryCartService::new());
                (service.clone(), service)
            } else {
                let client = Arc::new(HttpCartClient::new(
                    config.require_remote()?,
                    config.currency_code,
                )?);
                (client.clone(), client)
            };

        let notifier = Notifier::new();
        let notifications = notifier.subscribe();
        let engine = SyncEngine::from_config(&config, guest_store, carts, notifier.clone());

        if args.offline && args.user.is_some() {
            info!("Offline: keeping the guest cart, signing in for favorites only");
        }
        if let Some(report) = engine.start(args.cart_session()).await? {
            info!(
                created = report.created,
                updated = report.updated,
                failed = report.failed.len(),
                "Merged guest cart"
            );
        }

        let favorites = FavoritesSyncEngine::new(favorites, notifier);
        favorites.set_identity(args.identity());

        Ok(Self {
            config,
            engine,
            favorites,
            notifications,
        })
    }

    /// Print notifications raised so far to stderr.
    pub fn flush_notifications(&mut self) {
        loop {
            match self.notifications.try_recv() {
                Ok(notification) => {
                    let tag = match notification.level {
                        NotificationLevel::Success => "ok",
                        NotificationLevel::Warning => "warning",
                        NotificationLevel::Error => "error",
                        NotificationLevel::AuthRequired => "sign in required",
                    };
                    eprintln!("[{tag}] {}", notification.message);
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    eprintln!("[warning] {skipped} notifications dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_item_ref() {
        assert_eq!(
            parse_item_ref("line:12").unwrap(),
            ItemRef::LineItem(LineItemId::new(12))
        );
        assert_eq!(
            parse_item_ref("product:3").unwrap(),
            ItemRef::Product(ProductId::new(3))
        );
        assert_eq!(
            parse_item_ref("3").unwrap(),
            ItemRef::Product(ProductId::new(3))
        );
        assert!(parse_item_ref("sku:3").is_err());
        assert!(parse_item_ref("line:abc").is_err());
    }

    #[test]
    fn test_offline_session_keeps_guest_cart() {
        let online = SessionArgs {
            user: Some(UserId::new(42)),
            role: Role::Customer,
            offline: false,
        };
        assert_eq!(
            online.cart_session(),
            Session::Authenticated(Identity::customer(UserId::new(42)))
        );

        let offline = SessionArgs {
            offline: true,
            ..online
        };
        assert_eq!(offline.cart_session(), Session::Anonymous);
        assert_eq!(
            offline.identity(),
            Some(Identity::customer(UserId::new(42)))
        );

        let anonymous = SessionArgs {
            user: None,
            ..online
        };
        assert_eq!(anonymous.cart_session(), Session::Anonymous);
    }

    #[test]
    fn test_product_args_into_product() {
        let product = ProductArgs {
            product: ProductId::new(7),
            name: "Dried Mango".to_string(),
            price: Decimal::new(450, 2),
            category: None,
            photo: Some("mango.jpg".to_string()),
        }
        .into_product(CurrencyCode::EUR);

        assert_eq!(product.unit_price, Price::from_minor(450, CurrencyCode::EUR));
        assert_eq!(product.photo_ref.as_deref(), Some("mango.jpg"));
    }
}

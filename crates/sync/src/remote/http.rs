//! REST client for the cart and favorites API.
//!
//! Uses `reqwest` with a shared connection pool. Every request carries an
//! `X-Request-Id` so server logs can be matched against ours. No timeouts are
//! configured here; the transport defaults apply.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument};
use url::Url;
use uuid::Uuid;

use cart_sync_core::{
    CurrencyCode, FavoriteEntry, LineItem, LineItemId, Product, ProductId, Quantity, UserId,
};

use super::types::{
    AddFavoriteRequest, CreateLineItemRequest, FavoriteDto, LineItemDto, UpdateLineItemRequest,
    convert_cart,
};
use super::{FavoritesService, NewLineItem, RemoteCartService, RemoteError};
use crate::config::RemoteConfig;

/// Maximum number of body characters kept in errors and logs.
const BODY_EXCERPT_CHARS: usize = 200;

/// Client for the cart REST API.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct HttpCartClient {
    inner: Arc<HttpCartClientInner>,
}

struct HttpCartClientInner {
    client: reqwest::Client,
    base_url: Url,
    session_token: Option<SecretString>,
    currency_code: CurrencyCode,
}

impl HttpCartClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::InvalidUrl` if the base URL cannot serve as a
    /// base for relative endpoints.
    pub fn new(config: &RemoteConfig, currency_code: CurrencyCode) -> Result<Self, RemoteError> {
        Ok(Self {
            inner: Arc::new(HttpCartClientInner {
                client: reqwest::Client::new(),
                base_url: normalize_base(&config.base_url)?,
                session_token: config.session_token.clone(),
                currency_code,
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        Ok(self.inner.base_url.join(path)?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .inner
            .client
            .request(method, url)
            .header("X-Request-Id", Uuid::new_v4().to_string());

        match &self.inner.session_token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send a request and return the body of a successful response.
    ///
    /// `404` is passed through as `Ok(None)` when `missing_ok` is set, which
    /// is how idempotent deletes are expressed.
    async fn send(
        &self,
        builder: RequestBuilder,
        missing_ok: bool,
    ) -> Result<Option<String>, RemoteError> {
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RemoteError::RateLimited(retry_after));
        }

        if missing_ok && status == StatusCode::NOT_FOUND {
            debug!("Resource already absent");
            return Ok(None);
        }

        let body = response.text().await?;

        if !status.is_success() {
            error!(
                status = %status,
                body = %excerpt(&body),
                "Cart API returned non-success status"
            );
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        Ok(Some(body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let body = self.send(builder, false).await?.unwrap_or_default();
        serde_json::from_str(&body).map_err(|e| {
            error!(error = %e, body = %excerpt(&body), "Failed to parse cart API response");
            RemoteError::Parse(e)
        })
    }

    fn into_line_item(&self, dto: LineItemDto) -> Result<LineItem, RemoteError> {
        let id = dto.id;
        dto.into_line_item(self.inner.currency_code).ok_or_else(|| {
            RemoteError::Unavailable(format!("line item {id} returned without a quantity"))
        })
    }
}

#[async_trait]
impl RemoteCartService for HttpCartClient {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn fetch_cart(&self, user_id: UserId) -> Result<Vec<LineItem>, RemoteError> {
        let url = self.endpoint(&format!("carts/{user_id}"))?;
        let lines: Vec<LineItemDto> = self.send_json(self.request(Method::GET, url)).await?;
        debug!(lines = lines.len(), "Fetched remote cart");
        Ok(convert_cart(lines, self.inner.currency_code))
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id, product_id = %input.product.id))]
    async fn create_line_item(&self, input: NewLineItem) -> Result<LineItem, RemoteError> {
        let url = self.endpoint("carts")?;
        let body = CreateLineItemRequest {
            user_id: input.user_id,
            product_id: input.product.id,
            quantity: input.quantity,
        };
        let dto: LineItemDto = self
            .send_json(self.request(Method::POST, url).json(&body))
            .await?;
        self.into_line_item(dto)
    }

    #[instrument(skip(self), fields(line_item_id = %id, quantity = %quantity))]
    async fn update_line_item(
        &self,
        id: LineItemId,
        quantity: Quantity,
    ) -> Result<LineItem, RemoteError> {
        let url = self.endpoint(&format!("carts/items/{id}"))?;
        let body = UpdateLineItemRequest { quantity };
        let dto: LineItemDto = self
            .send_json(self.request(Method::PATCH, url).json(&body))
            .await?;
        self.into_line_item(dto)
    }

    #[instrument(skip(self), fields(line_item_id = %id))]
    async fn delete_line_item(&self, id: LineItemId) -> Result<(), RemoteError> {
        let url = self.endpoint(&format!("carts/items/{id}"))?;
        self.send(self.request(Method::DELETE, url), true).await?;
        Ok(())
    }
}

#[async_trait]
impl FavoritesService for HttpCartClient {
    #[instrument(skip(self))]
    async fn fetch_favorites(&self) -> Result<Vec<FavoriteEntry>, RemoteError> {
        let url = self.endpoint("favorites")?;
        let favorites: Vec<FavoriteDto> = self.send_json(self.request(Method::GET, url)).await?;
        Ok(favorites
            .into_iter()
            .map(|f| f.into_entry(self.inner.currency_code))
            .collect())
    }

    #[instrument(skip(self, product), fields(product_id = %product.id))]
    async fn add_favorite(&self, product: &Product) -> Result<(), RemoteError> {
        let url = self.endpoint("favorites")?;
        let body = AddFavoriteRequest {
            product_id: product.id,
        };
        self.send(self.request(Method::POST, url).json(&body), false)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn remove_favorite(&self, product_id: ProductId) -> Result<(), RemoteError> {
        let url = self.endpoint(&format!("favorites/{product_id}"))?;
        self.send(self.request(Method::DELETE, url), true).await?;
        Ok(())
    }
}

impl std::fmt::Debug for HttpCartClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCartClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field(
                "session_token",
                &self.inner.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("currency_code", &self.inner.currency_code)
            .finish()
    }
}

/// Make sure relative joins append to the base path instead of replacing its
/// last segment.
fn normalize_base(base: &Url) -> Result<Url, RemoteError> {
    if base.cannot_be_a_base() {
        return Err(RemoteError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
    }
    let mut url = base.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpCartClient {
        let config = RemoteConfig {
            base_url: Url::parse(base).unwrap(),
            session_token: Some(SecretString::from("tok_live_8f3k2m9x")),
        };
        HttpCartClient::new(&config, CurrencyCode::USD).unwrap()
    }

    #[test]
    fn test_endpoints_append_to_base_path() {
        let client = client("https://api.example.test/v1");
        assert_eq!(
            client.endpoint("carts/7").unwrap().as_str(),
            "https://api.example.test/v1/carts/7"
        );

        let client = self::client("https://api.example.test/v1/");
        assert_eq!(
            client.endpoint("favorites").unwrap().as_str(),
            "https://api.example.test/v1/favorites"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", client("https://api.example.test"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("tok_live"));
    }

    #[test]
    fn test_excerpt_truncates() {
        let body = "x".repeat(500);
        assert_eq!(excerpt(&body).len(), BODY_EXCERPT_CHARS);
    }
}

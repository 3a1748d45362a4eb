//! Wire types for the cart REST API and their conversions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use cart_sync_core::{
    CurrencyCode, FavoriteEntry, LineItem, LineItemId, Price, Product, ProductId, Quantity, UserId,
};

/// A cart line as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemDto {
    pub id: LineItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl LineItemDto {
    /// Convert into a line item priced in `currency_code`.
    ///
    /// Lines with a non-positive or out-of-range quantity are dropped: the
    /// cart never stores them.
    pub fn into_line_item(self, currency_code: CurrencyCode) -> Option<LineItem> {
        let Ok(Some(quantity)) = Quantity::from_requested(self.quantity) else {
            warn!(
                line_item_id = %self.id,
                quantity = self.quantity,
                "Dropping remote line with unusable quantity"
            );
            return None;
        };

        Some(LineItem {
            line_item_id: Some(self.id),
            product_id: self.product_id,
            product_name: self.product_name,
            unit_price: Price::new(self.unit_price, currency_code),
            photo_ref: self.photo,
            category: self.category,
            quantity,
        })
    }
}

/// Convert a fetched cart, dropping lines that cannot be stored.
pub fn convert_cart(lines: Vec<LineItemDto>, currency_code: CurrencyCode) -> Vec<LineItem> {
    lines
        .into_iter()
        .filter_map(|line| line.into_line_item(currency_code))
        .collect()
}

/// A favorite as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteDto {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl FavoriteDto {
    /// Convert into a favorite entry priced in `currency_code`.
    #[must_use]
    pub fn into_entry(self, currency_code: CurrencyCode) -> FavoriteEntry {
        FavoriteEntry::new(Product {
            id: self.product_id,
            name: self.name,
            unit_price: Price::new(self.unit_price, currency_code),
            photo_ref: self.photo,
            category: self.category,
        })
    }
}

/// `POST /carts` body.
#[derive(Debug, Serialize)]
pub(super) struct CreateLineItemRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// `PATCH /carts/items/{id}` body.
#[derive(Debug, Serialize)]
pub(super) struct UpdateLineItemRequest {
    pub quantity: Quantity,
}

/// `POST /favorites` body.
#[derive(Debug, Serialize)]
pub(super) struct AddFavoriteRequest {
    pub product_id: ProductId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_line_item_dto_parses_decimal_strings() {
        let json = r#"[
            {"id": 10, "product_id": 1, "product_name": "Chips", "quantity": 2, "unit_price": "4.50"},
            {"id": 11, "product_id": 2, "product_name": "Ghost", "quantity": 0, "unit_price": "1.00"}
        ]"#;
        let lines: Vec<LineItemDto> = serde_json::from_str(json).unwrap();
        let cart = convert_cart(lines, CurrencyCode::USD);

        assert_eq!(cart.len(), 1);
        let line = &cart[0];
        assert_eq!(line.line_item_id, Some(LineItemId::new(10)));
        assert_eq!(line.quantity.get(), 2);
        assert_eq!(line.unit_price, Price::from_minor(450, CurrencyCode::USD));
        assert_eq!(line.photo_ref, None);
    }

    #[test]
    fn test_create_request_sends_ids_only() {
        let body = CreateLineItemRequest {
            user_id: UserId::new(5),
            product_id: ProductId::new(9),
            quantity: Quantity::new(3).unwrap(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"user_id": 5, "product_id": 9, "quantity": 3})
        );
    }

    #[test]
    fn test_favorite_dto_into_entry() {
        let dto: FavoriteDto = serde_json::from_str(
            r#"{"product_id": 3, "name": "Mango", "unit_price": "2.25", "category": "fruit"}"#,
        )
        .unwrap();
        let entry = dto.into_entry(CurrencyCode::EUR);
        assert_eq!(entry.product_id, ProductId::new(3));
        assert_eq!(entry.product.unit_price.currency_code, CurrencyCode::EUR);
        assert_eq!(entry.product.category.as_deref(), Some("fruit"));
    }
}

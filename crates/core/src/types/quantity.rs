//! Line item quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// Zero or negative quantities are never stored.
    #[error("quantity must be at least 1 (got {0})")]
    NotPositive(i64),
    /// The value does not fit the storage type.
    #[error("quantity {0} is too large")]
    TooLarge(i64),
}

/// A stored line item quantity. Always at least 1.
///
/// A requested quantity of zero or less is not an error in the cart API, it
/// means "remove the line". [`Quantity::from_requested`] encodes that rule by
/// returning `Ok(None)`.
///
/// ```
/// use cart_sync_core::Quantity;
///
/// assert_eq!(Quantity::from_requested(3), Ok(Quantity::new(3)));
/// assert_eq!(Quantity::from_requested(0), Ok(None));
/// assert_eq!(Quantity::from_requested(-2), Ok(None));
/// assert!(Quantity::from_requested(5_000_000_000).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(1);

    /// Create a quantity, returning `None` for zero.
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }

    /// Interpret a caller-supplied quantity.
    ///
    /// Returns `Ok(None)` when the line should be removed instead.
    ///
    /// # Errors
    ///
    /// Returns `QuantityError::TooLarge` if the value does not fit a
    /// `u32`.
    pub fn from_requested(value: i64) -> Result<Option<Self>, QuantityError> {
        if value <= 0 {
            return Ok(None);
        }
        u32::try_from(value)
            .map(|v| Some(Self(v)))
            .map_err(|_| QuantityError::TooLarge(value))
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Add two quantities, saturating at `u32::MAX`.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 {
            return Err(QuantityError::NotPositive(value));
        }
        u32::try_from(value)
            .map(Self)
            .map_err(|_| QuantityError::TooLarge(value))
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

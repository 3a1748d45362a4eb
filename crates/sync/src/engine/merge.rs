//! Additive merge of a guest cart into a remote cart.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use cart_sync_core::{LineItem, LineItemId, Product, ProductId, Quantity, UserId};

use crate::remote::{NewLineItem, RemoteCartService};

/// How a guest quantity combines with a remote quantity for the same product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Add the quantities.
    #[default]
    Sum,
    /// Keep the larger quantity. Guards against double counting when the same
    /// items were added on both sides.
    KeepMax,
}

#[derive(Debug, Error)]
#[error("unknown merge policy {0:?} (expected \"sum\" or \"max\")")]
pub struct UnknownMergePolicy(pub String);

impl FromStr for MergePolicy {
    type Err = UnknownMergePolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "max" | "keep_max" => Ok(Self::KeepMax),
            _ => Err(UnknownMergePolicy(s.to_string())),
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => f.write_str("sum"),
            Self::KeepMax => f.write_str("max"),
        }
    }
}

impl MergePolicy {
    const fn combine(self, remote: Quantity, guest: Quantity) -> Quantity {
        match self {
            Self::Sum => remote.saturating_add(guest),
            Self::KeepMax => {
                if guest.get() > remote.get() {
                    guest
                } else {
                    remote
                }
            }
        }
    }
}

/// A guest line that could not be merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFailure {
    pub product_id: ProductId,
    pub product_name: String,
    pub reason: String,
}

/// What a merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Lines created in the remote cart.
    pub created: usize,
    /// Existing remote lines whose quantity changed.
    pub updated: usize,
    /// Existing remote lines already at the merged quantity.
    pub unchanged: usize,
    pub failed: Vec<MergeFailure>,
}

impl MergeReport {
    /// Guest lines written to the remote cart.
    #[must_use]
    pub const fn merged(&self) -> usize {
        self.created + self.updated
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Collapse duplicate products, summing their quantities.
///
/// Order of first appearance is kept.
fn coalesce(guest: &[LineItem]) -> Vec<(Product, Quantity)> {
    let mut index: HashMap<ProductId, usize> = HashMap::new();
    let mut lines: Vec<(Product, Quantity)> = Vec::with_capacity(guest.len());
    for item in guest {
        match index.get(&item.product_id).and_then(|&i| lines.get_mut(i)) {
            Some((_, quantity)) => *quantity = quantity.saturating_add(item.quantity),
            None => {
                index.insert(item.product_id, lines.len());
                lines.push((item.product(), item.quantity));
            }
        }
    }
    lines
}

/// Merge `guest` into `user_id`'s remote cart, whose current content is
/// `remote`.
///
/// Products already in the remote cart get one quantity update, the rest get
/// one create. Each call is independent: a failure is recorded in the report
/// and the merge moves on to the next line.
#[instrument(skip_all, fields(user_id = %user_id, guest = guest.len(), remote = remote.len(), %policy))]
pub async fn merge_guest_cart(
    service: &dyn RemoteCartService,
    user_id: UserId,
    guest: &[LineItem],
    remote: &[LineItem],
    policy: MergePolicy,
) -> MergeReport {
    let existing: HashMap<ProductId, (LineItemId, Quantity)> = remote
        .iter()
        .filter_map(|line| {
            line.line_item_id
                .map(|id| (line.product_id, (id, line.quantity)))
        })
        .collect();

    let mut report = MergeReport::default();

    for (product, quantity) in coalesce(guest) {
        let outcome = match existing.get(&product.id) {
            Some(&(line_item_id, held)) => {
                let merged = policy.combine(held, quantity);
                if merged == held {
                    debug!(product_id = %product.id, "Remote quantity already covers guest line");
                    report.unchanged += 1;
                    continue;
                }
                service
                    .update_line_item(line_item_id, merged)
                    .await
                    .map(|_| report.updated += 1)
            }
            None => service
                .create_line_item(NewLineItem {
                    user_id,
                    product: product.clone(),
                    quantity,
                })
                .await
                .map(|_| report.created += 1),
        };

        if let Err(e) = outcome {
            warn!(product_id = %product.id, error = %e, "Failed to merge guest line");
            report.failed.push(MergeFailure {
                product_id: product.id,
                product_name: product.name,
                reason: e.to_string(),
            });
        }
    }

    debug!(
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        failed = report.failed.len(),
        "Guest cart merge finished"
    );
    report
}

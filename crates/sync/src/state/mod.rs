//! Reactive state shared with the UI.
//!
//! - [`Observable`] - a value plus change subscriptions
//! - [`CartStateStore`] - the canonical line items shown to the user and the
//!   mutation operations that keep them in step with the active backend

mod observable;
mod store;

pub use observable::Observable;
pub use store::CartStateStore;

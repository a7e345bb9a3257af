//! JSON REST API for Bahi.
//!
//! Exposes an axum [`Router`] backed by any [`bahi_core::store::InventoryStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! Decimal quantities travel as JSON strings (`"length": "120.5"`) so no
//! precision is lost on the way through.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", bahi_api::api_router(store.clone()))
//! ```

pub mod challans;
pub mod error;
pub mod ledger;
pub mod orders;
pub mod pieces;
pub mod productions;
pub mod reconcile;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use bahi_core::store::InventoryStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: InventoryStore + 'static,
{
  Router::new()
    // Production intake
    .route("/productions", post(productions::create::<S>))
    .route(
      "/productions/{id}",
      get(productions::get_one::<S>)
        .put(productions::update::<S>)
        .delete(productions::delete::<S>),
    )
    // Orders
    .route("/orders", post(orders::place::<S>))
    .route("/orders/check", post(orders::check::<S>))
    .route("/orders/{id}", get(orders::get_one::<S>))
    .route("/orders/{id}/cancel", post(orders::cancel::<S>))
    // Challans
    .route("/challans", post(challans::create::<S>))
    .route("/challans/validate", post(challans::validate::<S>))
    .route(
      "/challans/{id}",
      get(challans::get_one::<S>)
        .put(challans::update::<S>)
        .delete(challans::delete::<S>),
    )
    // Reads & administration
    .route("/ledger", get(ledger::list::<S>))
    .route("/ledger/{id}", axum::routing::delete(ledger::delete::<S>))
    .route("/pieces", get(pieces::list::<S>))
    .route("/pieces/{id}", get(pieces::get_one::<S>))
    // Reconciliation
    .route("/reconcile", post(reconcile::recompute::<S>))
    .route("/reconcile/pieces", post(reconcile::resync_pieces::<S>))
    .with_state(store)
}

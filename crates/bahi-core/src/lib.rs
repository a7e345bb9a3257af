//! Core types and engines for the Bahi stock ledger.
//!
//! This crate is deliberately free of HTTP and database dependencies. Engines
//! are plain functions over the [`tx::LedgerTx`] trait; storage backends run
//! them inside a transaction and expose the result through
//! [`store::InventoryStore`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod challan;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod order;
pub mod piece;
pub mod production;
pub mod reconcile;
pub mod reservation;
pub mod store;
pub mod tx;
pub mod validator;

pub use error::{Error, Result};

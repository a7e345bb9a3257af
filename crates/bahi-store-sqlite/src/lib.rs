//! SQLite backend for the Bahi stock ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every mutating operation runs the
//! matching `bahi-core` engine inside one `BEGIN IMMEDIATE` transaction.

mod encode;
mod ledger;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_BUSY_RETRIES, SqliteStore};

#[cfg(test)]
mod tests;

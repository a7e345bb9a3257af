//! Error type for `bahi-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

use bahi_core::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] bahi_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("decimal parse error: {0}")]
  Decimal(#[from] rust_decimal::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum discriminant this build does not know.
  #[error("unknown {what}: {value:?}")]
  UnknownVariant { what: &'static str, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// SQLite reports lock contention as BUSY (another connection) or LOCKED
/// (shared cache); both are safe to retry.
pub(crate) fn is_busy(e: &rusqlite::Error) -> bool {
  matches!(
    e.sqlite_error_code(),
    Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
  )
}

impl Error {
  /// Fold lock contention into the domain's retryable conflict.
  pub(crate) fn normalize(self) -> Self {
    match self {
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) | Self::Sqlite(e) if is_busy(&e) => {
        Self::Core(bahi_core::Error::ConcurrencyConflict(e.to_string()))
      }
      other => other,
    }
  }

  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Core(e) if e.is_retryable())
  }
}

impl StoreError for Error {
  fn core(&self) -> Option<&bahi_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }
}

/// Engines speak `bahi_core::Error`; storage failures cross that boundary as
/// either a conflict or an opaque storage error.
impl From<Error> for bahi_core::Error {
  fn from(e: Error) -> Self {
    match e.normalize() {
      Error::Core(core) => core,
      other => bahi_core::Error::Storage(Box::new(other)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn busy() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
      rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
      Some("database is locked".into()),
    )
  }

  #[test]
  fn busy_becomes_conflict() {
    let core: bahi_core::Error = Error::Sqlite(busy()).into();
    assert!(core.is_retryable());

    let wrapped = Error::Database(tokio_rusqlite::Error::Rusqlite(busy())).normalize();
    assert!(wrapped.is_retryable());
  }

  #[test]
  fn other_failures_are_opaque_storage() {
    let core: bahi_core::Error = Error::DateParse("nope".into()).into();
    assert!(matches!(core, bahi_core::Error::Storage(_)));
    assert!(!core.is_retryable());
  }
}

//! Database access for tq-catalog
//!
//! Plain async functions over the shared SQLite pool. Multi-statement units
//! (item mutation + history append, session snapshot) run in one transaction.

pub mod achievements;
pub mod catalog;
pub mod history;
pub mod leases;
pub mod sessions;

use tq_common::{Error, Result};
use uuid::Uuid;

/// Parse a TEXT guid column
pub(crate) fn parse_guid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid {} '{}': {}", column, value, e)))
}

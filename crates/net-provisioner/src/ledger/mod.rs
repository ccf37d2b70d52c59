//! Assignment ledger
//!
//! The ledger is a single keyed table per network holding:
//! - the network record at `(META, META)`
//! - one region record per region at `(META, region)`, including the
//!   region's atomic assignment counter
//! - one member record per account and region at `(account, region)`
//!
//! [`KeyValueStore`] is the raw store contract; [`MetadataRepository`] is the
//! typed access layer used by the resource handlers.

mod memory;
mod repository;

pub use memory::InMemoryStore;
pub use repository::MetadataRepository;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel used in place of an account or region for network-level records
pub const META: &str = "META";

/// Attribute names shared by every record
pub const ACCOUNT_ATTR: &str = "Account";
/// Region key attribute
pub const REGION_ATTR: &str = "Region";

/// A stored record: attribute name to value
pub type Item = serde_json::Map<String, serde_json::Value>;

/// Composite record key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    /// Account id, or [`META`]
    pub account: String,
    /// Region code, or [`META`]
    pub region: String,
}

impl LedgerKey {
    /// Key of the network record
    pub fn network() -> Self {
        Self {
            account: META.to_string(),
            region: META.to_string(),
        }
    }

    /// Key of a region record
    pub fn region(region: &str) -> Self {
        Self {
            account: META.to_string(),
            region: region.to_string(),
        }
    }

    /// Key of a member record
    pub fn member(account: &str, region: &str) -> Self {
        Self {
            account: account.to_string(),
            region: region.to_string(),
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.account, self.region)
    }
}

/// Keyed metadata store
///
/// Every operation touches exactly one record and is atomic for that record.
/// Missing records are reported as `None`, never as errors; connectivity and
/// permission failures surface as [`crate::Error::LedgerUnavailable`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a record
    async fn get_item(&self, table: &str, key: &LedgerKey) -> Result<Option<Item>>;

    /// Replace a record entirely
    async fn put_item(&self, table: &str, key: &LedgerKey, item: Item) -> Result<()>;

    /// Set a single attribute, creating the record if needed
    async fn set_attribute(
        &self,
        table: &str,
        key: &LedgerKey,
        name: &str,
        value: serde_json::Value,
    ) -> Result<()>;

    /// Atomically add `delta` to a numeric attribute and return its previous value
    ///
    /// A missing record or attribute counts as 0.
    async fn atomic_add(&self, table: &str, key: &LedgerKey, name: &str, delta: u64)
        -> Result<u64>;
}

//! In-memory ledger store
//!
//! Each record lives in a [`DashMap`] entry; all single-record operations run
//! under that entry's shard lock, so `atomic_add` is linearizable.

use super::{Item, KeyValueStore, LedgerKey};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-local [`KeyValueStore`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Records keyed by table name and record key
    items: DashMap<(String, LedgerKey), Item>,
    /// When set, every call fails as if the store were unreachable
    unavailable: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate loss of connectivity
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of records in a table
    pub fn len(&self, table: &str) -> usize {
        self.items.iter().filter(|e| e.key().0 == table).count()
    }

    /// Whether a table has no records
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::LedgerUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn entry_key(table: &str, key: &LedgerKey) -> (String, LedgerKey) {
        (table.to_string(), key.clone())
    }

    fn key_attributes(key: &LedgerKey) -> Item {
        let mut item = Item::new();
        item.insert(super::ACCOUNT_ATTR.to_string(), Value::from(key.account.clone()));
        item.insert(super::REGION_ATTR.to_string(), Value::from(key.region.clone()));
        item
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get_item(&self, table: &str, key: &LedgerKey) -> Result<Option<Item>> {
        self.check_available()?;
        Ok(self
            .items
            .get(&Self::entry_key(table, key))
            .map(|item| item.value().clone()))
    }

    async fn put_item(&self, table: &str, key: &LedgerKey, item: Item) -> Result<()> {
        self.check_available()?;
        let mut record = Self::key_attributes(key);
        record.extend(item);
        self.items.insert(Self::entry_key(table, key), record);
        Ok(())
    }

    async fn set_attribute(
        &self,
        table: &str,
        key: &LedgerKey,
        name: &str,
        value: Value,
    ) -> Result<()> {
        self.check_available()?;
        self.items
            .entry(Self::entry_key(table, key))
            .or_insert_with(|| Self::key_attributes(key))
            .insert(name.to_string(), value);
        Ok(())
    }

    async fn atomic_add(
        &self,
        table: &str,
        key: &LedgerKey,
        name: &str,
        delta: u64,
    ) -> Result<u64> {
        self.check_available()?;
        let mut record = self
            .items
            .entry(Self::entry_key(table, key))
            .or_insert_with(|| Self::key_attributes(key));

        let previous = match record.get(name) {
            None => 0,
            Some(value) => value.as_u64().ok_or_else(|| {
                Error::LedgerUnavailable(format!(
                    "Attribute {} of {} is not a counter: {}",
                    name, key, value
                ))
            })?,
        };
        record.insert(name.to_string(), Value::from(previous + delta));

        Ok(previous)
    }
}

//! Typed access to the assignment ledger

use super::{Item, KeyValueStore, LedgerKey};
use crate::models::{Member, MemberMetadata, Network, NetworkMetadata, RegionMetadata};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const REGIONAL_TGW_ID_ATTR: &str = "RegionalTgwId";
const ASSIGNMENTS_ATTR: &str = "Assignments";

/// Ledger for one network, seen from one member's account and region
#[derive(Clone)]
pub struct MetadataRepository {
    /// Network the ledger belongs to
    network: Network,
    /// Caller identity, used when no explicit account/region is given
    member: Member,
    /// Backing table
    table: String,
    store: Arc<dyn KeyValueStore>,
}

impl MetadataRepository {
    /// Create a repository over the network's table
    pub fn new(network: Network, member: Member, store: Arc<dyn KeyValueStore>) -> Self {
        let table = network.table_name();
        Self {
            network,
            member,
            table,
            store,
        }
    }

    /// The network this ledger belongs to
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// The calling member
    pub fn member(&self) -> &Member {
        &self.member
    }

    /// Backing table name
    pub fn table(&self) -> &str {
        &self.table
    }

    fn decode<T: DeserializeOwned>(key: &LedgerKey, item: Item) -> Result<T> {
        serde_json::from_value(Value::Object(item)).map_err(|e| {
            Error::LedgerUnavailable(format!("Malformed ledger record {}: {}", key, e))
        })
    }

    fn encode<T: Serialize>(record: &T) -> Result<Item> {
        match serde_json::to_value(record)? {
            Value::Object(item) => Ok(item),
            other => Err(Error::LedgerUnavailable(format!(
                "Ledger record must be an object, got {}",
                other
            ))),
        }
    }

    async fn get<T: DeserializeOwned>(&self, key: &LedgerKey) -> Result<Option<T>> {
        let item = self.store.get_item(&self.table, key).await?;
        debug!(table = %self.table, %key, ?item, "ledger get returned");
        item.map(|item| Self::decode(key, item)).transpose()
    }

    // ==================== Network ====================

    /// Fetch the network record
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn get_network(&self) -> Result<Option<NetworkMetadata>> {
        info!("Fetching network metadata");
        self.get(&LedgerKey::network()).await
    }

    /// Store the network record, replacing any previous one
    #[instrument(skip(self, meta), fields(table = %self.table, cidr = %meta.network_cidr))]
    pub async fn put_network(&self, meta: &NetworkMetadata) -> Result<()> {
        info!("Storing network metadata");
        self.store
            .put_item(&self.table, &LedgerKey::network(), Self::encode(meta)?)
            .await
    }

    // ==================== Regions ====================

    /// Fetch a region record
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn get_region(&self, region: &str) -> Result<Option<RegionMetadata>> {
        info!("Fetching regional metadata");
        self.get(&LedgerKey::region(region)).await
    }

    /// Store a region record, replacing any previous one
    #[instrument(skip(self, meta), fields(table = %self.table))]
    pub async fn put_region(&self, region: &str, meta: &RegionMetadata) -> Result<()> {
        info!("Storing regional metadata");
        let mut item = Self::encode(meta)?;
        item.insert(super::REGION_ATTR.to_string(), Value::from(region));
        self.store
            .put_item(&self.table, &LedgerKey::region(region), item)
            .await
    }

    /// Record a region's transit gateway id
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn set_regional_tgw_id(&self, region: &str, tgw_id: &str) -> Result<()> {
        info!("Updating regional transit gateway id");
        self.store
            .set_attribute(
                &self.table,
                &LedgerKey::region(region),
                REGIONAL_TGW_ID_ATTR,
                Value::from(tgw_id),
            )
            .await
    }

    /// Claim the next assignment slot of a region
    ///
    /// Returns the counter's value before the increment: the first caller gets 0.
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn next_assignment_id(&self, region: &str) -> Result<u64> {
        info!("Generating assignment id");
        let id = self
            .store
            .atomic_add(&self.table, &LedgerKey::region(region), ASSIGNMENTS_ATTR, 1)
            .await?;
        debug!(assignment_id = id, "assignment id claimed");
        Ok(id)
    }

    // ==================== Members ====================

    /// Fetch a member record
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn get_member(&self, account: &str, region: &str) -> Result<Option<MemberMetadata>> {
        info!("Fetching member metadata");
        self.get(&LedgerKey::member(account, region)).await
    }

    /// Store a member record
    #[instrument(skip(self, meta), fields(table = %self.table, cidr = %meta.member_cidr))]
    pub async fn put_member(&self, account: &str, region: &str, meta: &MemberMetadata) -> Result<()> {
        info!("Storing member metadata");
        self.store
            .put_item(
                &self.table,
                &LedgerKey::member(account, region),
                Self::encode(meta)?,
            )
            .await
    }
}

impl std::fmt::Debug for MetadataRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRepository")
            .field("network", &self.network)
            .field("member", &self.member)
            .field("table", &self.table)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryStore;

    fn repo() -> (MetadataRepository, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let network = Network::new("111122223333", "us-east-1", "corp");
        let member = Member::new("444455556666", "us-east-1");
        (MetadataRepository::new(network, member, store.clone()), store)
    }

    #[tokio::test]
    async fn test_absent_records() {
        let (repo, _) = repo();
        assert!(repo.get_network().await.unwrap().is_none());
        assert!(repo.get_region("us-east-1").await.unwrap().is_none());
        assert!(repo.get_member("444455556666", "us-east-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_network_roundtrip() {
        let (repo, store) = repo();
        let meta = NetworkMetadata {
            network_cidr: "10.0.0.0/8".parse().unwrap(),
            regional_bitmask: 9,
            member_bitmask: 16,
        };
        repo.put_network(&meta).await.unwrap();

        assert_eq!(repo.get_network().await.unwrap(), Some(meta));
        assert_eq!(store.len("Network-corp"), 1);
    }

    #[tokio::test]
    async fn test_region_record_and_tgw_update() {
        let (repo, _) = repo();
        let meta = RegionMetadata::new("eu-west-1", "10.128.0.0/9".parse().unwrap());
        repo.put_region("eu-west-1", &meta).await.unwrap();
        repo.set_regional_tgw_id("eu-west-1", "tgw-0eu").await.unwrap();

        let stored = repo.get_region("eu-west-1").await.unwrap().unwrap();
        assert_eq!(stored.regional_cidr, meta.regional_cidr);
        assert_eq!(stored.tgw_id(), Some("tgw-0eu"));
        assert_eq!(stored.assignments, 0);
    }

    #[tokio::test]
    async fn test_next_assignment_id_sequence() {
        let (repo, _) = repo();
        let meta = RegionMetadata::new("us-east-1", "10.0.0.0/9".parse().unwrap());
        repo.put_region("us-east-1", &meta).await.unwrap();

        assert_eq!(repo.next_assignment_id("us-east-1").await.unwrap(), 0);
        assert_eq!(repo.next_assignment_id("us-east-1").await.unwrap(), 1);
        assert_eq!(repo.next_assignment_id("eu-west-1").await.unwrap(), 0);

        let stored = repo.get_region("us-east-1").await.unwrap().unwrap();
        assert_eq!(stored.assignments, 2);
    }

    #[tokio::test]
    async fn test_member_roundtrip() {
        let (repo, _) = repo();
        let meta = MemberMetadata {
            assignment_id: 3,
            member_cidr: "10.3.0.0/16".parse().unwrap(),
        };
        repo.put_member("444455556666", "us-east-1", &meta).await.unwrap();
        assert_eq!(
            repo.get_member("444455556666", "us-east-1").await.unwrap(),
            Some(meta)
        );
    }

    #[tokio::test]
    async fn test_unavailable_store_propagates() {
        let (repo, store) = repo();
        store.set_unavailable(true);
        assert!(matches!(
            repo.next_assignment_id("us-east-1").await,
            Err(Error::LedgerUnavailable(_))
        ));
    }
}

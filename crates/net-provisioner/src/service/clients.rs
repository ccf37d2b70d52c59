//! Client construction

use crate::cloud::{SimulatedCloud, TransitNetworkApi};
use crate::ledger::{InMemoryStore, KeyValueStore};
use crate::models::{Member, Network};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Builds the clients a request needs
///
/// Implementations decide how credentials for other accounts and regions are
/// obtained.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Account and region the request runs as
    async fn current_member(&self) -> Result<Member>;

    /// Ledger store holding the network's table
    fn store(&self, network: &Network) -> Result<Arc<dyn KeyValueStore>>;

    /// Networking API bound to `member`'s account and region
    async fn network_api(&self, member: &Member) -> Result<Arc<dyn TransitNetworkApi>>;
}

/// In-process clients backed by one store and one simulated fabric
#[derive(Debug, Clone)]
pub struct LocalClients {
    caller: Member,
    store: Arc<InMemoryStore>,
    cloud: Arc<SimulatedCloud>,
}

impl LocalClients {
    pub fn new(caller: Member, store: Arc<InMemoryStore>, cloud: Arc<SimulatedCloud>) -> Self {
        Self {
            caller,
            store,
            cloud,
        }
    }

    /// Same backends, different caller
    pub fn as_member(&self, caller: Member) -> Self {
        Self {
            caller,
            store: self.store.clone(),
            cloud: self.cloud.clone(),
        }
    }
}

#[async_trait]
impl ClientFactory for LocalClients {
    async fn current_member(&self) -> Result<Member> {
        Ok(self.caller.clone())
    }

    fn store(&self, network: &Network) -> Result<Arc<dyn KeyValueStore>> {
        debug!(table = %network.table_name(), "using in-memory ledger store");
        Ok(self.store.clone())
    }

    async fn network_api(&self, member: &Member) -> Result<Arc<dyn TransitNetworkApi>> {
        debug!(%member, "using simulated networking API");
        Ok(self.cloud.clone())
    }
}

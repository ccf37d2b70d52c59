//! Network and member identities

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An account operating in one region
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    /// Account identifier
    pub account: String,
    /// Region code (e.g., "us-east-1")
    pub region: String,
    /// Optional display name
    pub name: Option<String>,
}

impl Member {
    /// Create a new member
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            name: None,
        }
    }

    /// Same account, different region
    pub fn in_region(&self, region: impl Into<String>) -> Self {
        Self {
            account: self.account.clone(),
            region: region.into(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.region)
    }
}

/// A provisioned network: its admin account, primary region and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Network {
    /// Administrative account owning the ledger and the primary transit gateway
    pub account: String,
    /// Primary region
    pub region: String,
    /// Network name
    pub name: String,
}

impl Network {
    /// Create a new network identity
    pub fn new(
        account: impl Into<String>,
        region: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            name: name.into(),
        }
    }

    /// The admin account in the primary region
    pub fn primary_admin_member(&self) -> Member {
        Member {
            account: self.account.clone(),
            region: self.region.clone(),
            name: Some(self.name.clone()),
        }
    }

    /// `account/region/name`
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.account, self.region, self.name)
    }

    /// Parse an id produced by [`Network::id`]; the name may itself contain `/`
    pub fn from_id(id: &str) -> Result<Self> {
        let mut parts = id.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(account), Some(region), Some(name))
                if !account.is_empty() && !region.is_empty() && !name.is_empty() =>
            {
                Ok(Self::new(account, region, name))
            }
            _ => Err(Error::InvalidConfig(format!("Malformed network id '{}'", id))),
        }
    }

    /// Name of the metadata table holding this network's ledger
    pub fn table_name(&self) -> String {
        format!("Network-{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_id_roundtrip_with_slashes() {
        let network = Network::new("111122223333", "us-east-1", "corp/prod");
        assert_eq!(network.id(), "111122223333/us-east-1/corp/prod");
        assert_eq!(Network::from_id(&network.id()).unwrap(), network);
    }

    #[test]
    fn test_network_from_malformed_id() {
        assert!(Network::from_id("111122223333/us-east-1").is_err());
        assert!(Network::from_id("//name").is_err());
    }

    #[test]
    fn test_primary_admin_member() {
        let network = Network::new("111122223333", "us-east-1", "corp");
        let admin = network.primary_admin_member();
        assert_eq!(admin.account, "111122223333");
        assert_eq!(admin.region, "us-east-1");
        assert_eq!(admin.name.as_deref(), Some("corp"));
        assert_eq!(network.table_name(), "Network-corp");
    }

    #[test]
    fn test_member_in_region() {
        let member = Member::new("444455556666", "us-east-1").in_region("eu-west-1");
        assert_eq!(member.to_string(), "444455556666/eu-west-1");
    }
}

//! Read-only view of a registered member's blocks

use super::props::number;
use super::{ResourceHandler, ResourceOutcome, ResourceRequest};
use crate::allocator::derive_sub_block;
use crate::ledger::MetadataRepository;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map};
use tracing::{debug, instrument};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberMetadataProps {
    #[serde(default, deserialize_with = "number")]
    subnets_bitmask: u8,
    #[serde(default, deserialize_with = "number")]
    subnets_number: u32,
}

/// Looks up the calling member's blocks and derives its subnet blocks
#[derive(Debug, Clone)]
pub struct MemberMetadataLookup {
    repo: MetadataRepository,
}

impl MemberMetadataLookup {
    pub fn new(repo: MetadataRepository) -> Self {
        Self { repo }
    }

    fn incomplete(&self, what: &str) -> Error {
        let member = self.repo.member();
        Error::IncompleteNetworkState(format!(
            "No {} metadata for member {}. Make sure the member was registered",
            what, member
        ))
    }
}

#[async_trait]
impl ResourceHandler for MemberMetadataLookup {
    #[instrument(skip(self, request), fields(member = %self.repo.member()))]
    async fn create(&self, request: &ResourceRequest) -> Result<ResourceOutcome> {
        let props: MemberMetadataProps = request.properties.parse()?;
        let member = self.repo.member();

        let network = self
            .repo
            .get_network()
            .await?
            .ok_or_else(|| self.incomplete("network"))?;
        let regional = self
            .repo
            .get_region(&member.region)
            .await?
            .ok_or_else(|| self.incomplete("regional"))?;
        let member_meta = self
            .repo
            .get_member(&member.account, &member.region)
            .await?
            .ok_or_else(|| self.incomplete("member"))?;
        debug!(?network, ?regional, ?member_meta, "metadata fetched");

        let mut data = Map::new();
        data.insert("NetworkCidr".to_string(), json!(network.network_cidr));
        data.insert("RegionalCidr".to_string(), json!(regional.regional_cidr));
        data.insert("RegionalTgwId".to_string(), json!(regional.regional_tgw_id));
        data.insert("MemberCidr".to_string(), json!(member_meta.member_cidr));

        for i in 0..props.subnets_number {
            let subnet = derive_sub_block(member_meta.member_cidr, u64::from(i), props.subnets_bitmask)?;
            data.insert(format!("Subnet{}", i), json!(subnet));
        }

        Ok(ResourceOutcome::with_data(data))
    }

    async fn delete(&self, _request: &ResourceRequest) -> Result<ResourceOutcome> {
        Ok(ResourceOutcome::empty())
    }
}

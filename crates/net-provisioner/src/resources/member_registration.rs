//! Member block assignment

use super::{ResourceHandler, ResourceOutcome, ResourceRequest};
use crate::allocator::derive_sub_block;
use crate::ledger::MetadataRepository;
use crate::models::MemberMetadata;
use crate::{Error, Result};
use async_trait::async_trait;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use tracing::{debug, info, instrument};

/// Block handed to a member, with what it needs for further provisioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MemberAssignment {
    pub member_cidr: Ipv4Net,
    pub assignment_id: u64,
    pub network_cidr: Ipv4Net,
    pub regional_tgw_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberRegistrationProps {
    account: Option<String>,
    region: Option<String>,
}

/// Hands out member blocks from a region's block
#[derive(Debug, Clone)]
pub struct MemberAssigner {
    repo: MetadataRepository,
}

impl MemberAssigner {
    pub fn new(repo: MetadataRepository) -> Self {
        Self { repo }
    }

    /// Claim the next slot of `region` for `account`
    ///
    /// Slots are never released; every call consumes one even if it later fails.
    #[instrument(skip(self), fields(network = %self.repo.network().name))]
    pub async fn assign(&self, account: &str, region: &str) -> Result<MemberAssignment> {
        let assignment_id = self.repo.next_assignment_id(region).await?;

        let network = self.repo.get_network().await?;
        let regional = self.repo.get_region(region).await?;
        let (network, regional_cidr, regional) =
            match (network, regional.as_ref().and_then(|r| r.regional_cidr), regional) {
                (Some(network), Some(cidr), Some(regional)) => (network, cidr, regional),
                _ => {
                    return Err(Error::IncompleteNetworkState(format!(
                        "Cannot retrieve regional information for {}. Make sure you provisioned admin account {}",
                        region,
                        self.repo.network().account
                    )))
                }
            };

        let member_cidr = derive_sub_block(regional_cidr, assignment_id, network.member_bitmask)?;
        debug!(assignment_id, %member_cidr, "member block derived");

        self.repo
            .put_member(
                account,
                region,
                &MemberMetadata {
                    assignment_id,
                    member_cidr,
                },
            )
            .await?;

        info!(%account, %region, %member_cidr, assignment_id, "Member registered");
        Ok(MemberAssignment {
            member_cidr,
            assignment_id,
            network_cidr: network.network_cidr,
            regional_tgw_id: regional.regional_tgw_id,
        })
    }
}

#[async_trait]
impl ResourceHandler for MemberAssigner {
    async fn create(&self, request: &ResourceRequest) -> Result<ResourceOutcome> {
        let props: MemberRegistrationProps = request.properties.parse()?;
        let caller = self.repo.member();
        let account = props.account.unwrap_or_else(|| caller.account.clone());
        let region = props.region.unwrap_or_else(|| caller.region.clone());

        let assignment = self.assign(&account, &region).await?;

        let mut data = Map::new();
        data.insert("MemberCidr".to_string(), json!(assignment.member_cidr));
        data.insert("AssignmentId".to_string(), json!(assignment.assignment_id));
        data.insert("NetworkCidr".to_string(), json!(assignment.network_cidr));
        data.insert("RegionalTgwId".to_string(), json!(assignment.regional_tgw_id));
        Ok(ResourceOutcome::with_data(data))
    }

    async fn delete(&self, _request: &ResourceRequest) -> Result<ResourceOutcome> {
        Ok(ResourceOutcome::empty())
    }
}

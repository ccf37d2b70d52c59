//! Network initialization
//!
//! Splits the root block into one block per region and records the bitmasks
//! used later to hand out member blocks.

use super::props::number;
use super::{ResourceHandler, ResourceOutcome, ResourceRequest};
use crate::allocator::{nth_sub_block, parse_block, rebase, split_cidr};
use crate::ledger::MetadataRepository;
use crate::models::{NetworkMetadata, RegionMetadata};
use crate::Result;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use serde::Deserialize;
use serde_json::{json, Map};
use tracing::{debug, info, instrument};

/// Narrowest member bitmask ever assigned
pub const MIN_MEMBER_BITMASK: u8 = 16;

/// Layout computed for a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub network_cidr: Ipv4Net,
    pub regional_bitmask: u8,
    pub member_bitmask: u8,
    /// Regions in request order with their blocks
    pub regions: Vec<(String, Ipv4Net)>,
}

/// Regional and member bitmasks for a root block
pub fn plan_bitmasks(root: Ipv4Net, num_regions: u32, target_members: u32) -> Result<(u8, u8)> {
    let regional_bitmask = split_cidr(root, num_regions)?;
    let first_regional = rebase(root, regional_bitmask)?;
    let member_bitmask = split_cidr(first_regional, target_members)?.max(MIN_MEMBER_BITMASK);
    debug!(regional_bitmask, member_bitmask, "bitmasks calculated");
    Ok((regional_bitmask, member_bitmask))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitMetadataProps {
    network_cidr: String,
    #[serde(default)]
    secondary_regions: Vec<String>,
    regional_tgw_id: String,
    #[serde(deserialize_with = "number")]
    num_accounts: u32,
}

/// Writes the network and region records
#[derive(Debug, Clone)]
pub struct RegionInitializer {
    repo: MetadataRepository,
}

impl RegionInitializer {
    pub fn new(repo: MetadataRepository) -> Self {
        Self { repo }
    }

    /// Partition `root` across `regions` (primary first) and persist the layout
    ///
    /// Every write overwrites, so running it twice for the same network resets
    /// the assignment counters.
    #[instrument(skip(self, regions), fields(network = %self.repo.network().name, region_count = regions.len()))]
    pub async fn initialize(
        &self,
        root: Ipv4Net,
        regions: &[String],
        target_members: u32,
        primary_tgw_id: &str,
    ) -> Result<PartitionPlan> {
        let num_regions = u32::try_from(regions.len()).unwrap_or(u32::MAX);
        let (regional_bitmask, member_bitmask) = plan_bitmasks(root, num_regions, target_members)?;
        let first_regional = rebase(root, regional_bitmask)?;

        self.repo
            .put_network(&NetworkMetadata {
                network_cidr: root,
                regional_bitmask,
                member_bitmask,
            })
            .await?;

        let mut planned = Vec::with_capacity(regions.len());
        for (idx, region) in regions.iter().enumerate() {
            let regional_cidr = nth_sub_block(first_regional, idx as u64)?;
            debug!(%region, %regional_cidr, "regional block");
            self.repo
                .put_region(region, &RegionMetadata::new(region.as_str(), regional_cidr))
                .await?;
            planned.push((region.clone(), regional_cidr));
        }

        self.repo
            .set_regional_tgw_id(&self.repo.network().region, primary_tgw_id)
            .await?;

        info!(%root, regional_bitmask, member_bitmask, "Network initialized");
        Ok(PartitionPlan {
            network_cidr: root,
            regional_bitmask,
            member_bitmask,
            regions: planned,
        })
    }
}

#[async_trait]
impl ResourceHandler for RegionInitializer {
    async fn create(&self, request: &ResourceRequest) -> Result<ResourceOutcome> {
        let props: InitMetadataProps = request.properties.parse()?;
        let root = parse_block(&props.network_cidr)?;

        let mut regions = vec![self.repo.network().region.clone()];
        regions.extend(props.secondary_regions);

        let plan = self
            .initialize(root, &regions, props.num_accounts, &props.regional_tgw_id)
            .await?;

        let mut data = Map::new();
        data.insert("RegionalBitmask".to_string(), json!(plan.regional_bitmask));
        data.insert("MemberBitmask".to_string(), json!(plan.member_bitmask));
        Ok(ResourceOutcome::with_data(data))
    }

    async fn delete(&self, _request: &ResourceRequest) -> Result<ResourceOutcome> {
        Ok(ResourceOutcome::empty())
    }
}

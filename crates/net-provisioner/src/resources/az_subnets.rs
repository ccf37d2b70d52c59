//! One subnet per availability zone inside a member block

use super::{ResourceHandler, ResourceOutcome, ResourceRequest};
use crate::allocator::{minimal_subnet_list, parse_block};
use crate::cloud::TransitNetworkApi;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Prefix length of every zone subnet
pub const SUBNET_BITMASK: u8 = 28;

const DELIM: &str = ",";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzSubnetsProps {
    member_cidr: String,
    vpc_id: String,
}

/// Creates and deletes zone subnets in the caller's VPC
pub struct AzSubnets {
    api: Arc<dyn TransitNetworkApi>,
}

impl AzSubnets {
    pub fn new(api: Arc<dyn TransitNetworkApi>) -> Self {
        Self { api }
    }

    /// Delete subnets, treating already-deleted ones as done
    async fn delete_subnets(&self, subnet_ids: &[String]) -> Result<()> {
        for subnet_id in subnet_ids {
            match self.api.delete_subnet(subnet_id).await {
                Ok(()) => debug!(%subnet_id, "subnet deleted"),
                Err(e) if e.is_not_found() => warn!(%subnet_id, "Subnet already deleted"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceHandler for AzSubnets {
    #[instrument(skip(self, request))]
    async fn create(&self, request: &ResourceRequest) -> Result<ResourceOutcome> {
        let props: AzSubnetsProps = request.properties.parse()?;
        let member_cidr = parse_block(&props.member_cidr)?;

        let zones = self.api.list_availability_zones().await?;
        debug!(?zones, "availability zones listed");
        let cidrs = minimal_subnet_list(member_cidr, zones.len(), SUBNET_BITMASK)?;

        let mut subnet_ids = Vec::with_capacity(zones.len());
        for (zone, cidr) in zones.iter().zip(cidrs) {
            match self.api.create_subnet(&props.vpc_id, cidr, zone).await {
                Ok(id) => {
                    debug!(%zone, %cidr, subnet_id = %id, "subnet created");
                    subnet_ids.push(id);
                }
                Err(e) => {
                    warn!(error = %e, created = subnet_ids.len(), "Subnet creation failed, removing created subnets");
                    if let Err(cleanup) = self.delete_subnets(&subnet_ids).await {
                        warn!(error = %cleanup, "Subnet cleanup failed");
                    }
                    return Err(e.into());
                }
            }
        }

        let route_table_id = self.api.default_vpc_route_table(&props.vpc_id).await?;
        info!(vpc_id = %props.vpc_id, subnets = subnet_ids.len(), "Zone subnets created");

        let physical_id = subnet_ids.join(DELIM);
        let mut data = Map::new();
        data.insert("VpcDefaultRouteTableId".to_string(), json!(route_table_id));
        data.insert("SubnetIds".to_string(), json!(subnet_ids));
        Ok(ResourceOutcome::with_data(data).physical_id(physical_id))
    }

    #[instrument(skip(self, request))]
    async fn delete(&self, request: &ResourceRequest) -> Result<ResourceOutcome> {
        let subnet_ids: Vec<String> = request
            .require_physical_id()?
            .split(DELIM)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        self.delete_subnets(&subnet_ids).await?;
        info!(subnets = subnet_ids.len(), "Zone subnets deleted");
        Ok(ResourceOutcome::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::SimulatedCloud;
    use crate::error::CloudError;
    use crate::resources::Properties;
    use crate::Error;
    use ipnet::Ipv4Net;

    fn request(member_cidr: &str) -> ResourceRequest {
        ResourceRequest::new(Properties::normalize(
            serde_json::from_value(json!({ "MemberCidr": member_cidr, "VpcId": "vpc-1" })).unwrap(),
        ))
    }

    fn fabric() -> Arc<SimulatedCloud> {
        let cloud = Arc::new(SimulatedCloud::new());
        cloud.add_vpc("vpc-1");
        cloud
    }

    #[tokio::test]
    async fn test_create_one_subnet_per_zone() {
        let cloud = fabric();
        let outcome = AzSubnets::new(cloud.clone())
            .create(&request("10.1.0.0/16"))
            .await
            .unwrap();

        let subnets = cloud.subnets();
        let cidrs: Vec<Ipv4Net> = subnets.iter().map(|(_, cidr, _)| *cidr).collect();
        assert_eq!(
            cidrs,
            vec![
                "10.1.0.0/28".parse::<Ipv4Net>().unwrap(),
                "10.1.0.16/28".parse().unwrap(),
                "10.1.0.32/28".parse().unwrap(),
            ]
        );
        assert_eq!(subnets[0].2, "zone-a");
        assert_eq!(subnets[2].2, "zone-c");

        assert_eq!(outcome.data["VpcDefaultRouteTableId"], json!("rtb-1"));
        assert_eq!(outcome.data["SubnetIds"].as_array().unwrap().len(), 3);
        let physical_id = outcome.physical_id.unwrap();
        assert_eq!(physical_id.split(',').count(), 3);
    }

    #[tokio::test]
    async fn test_delete_by_physical_id() {
        let cloud = fabric();
        let handler = AzSubnets::new(cloud.clone());
        let outcome = handler.create(&request("10.1.0.0/16")).await.unwrap();
        let physical_id = outcome.physical_id.unwrap();

        let delete = ResourceRequest::default().with_physical_id(physical_id.clone());
        handler.delete(&delete).await.unwrap();
        assert!(cloud.subnets().is_empty());

        // Repeated delete finds nothing and succeeds
        handler.delete(&delete).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_create_removes_created_subnets() {
        let cloud = fabric();
        let existing = cloud
            .create_subnet("vpc-1", "10.1.0.16/28".parse().unwrap(), "zone-b")
            .await
            .unwrap();

        let err = AzSubnets::new(cloud.clone())
            .create(&request("10.1.0.0/16"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cloud(ref e) if e.code == "InvalidSubnet.Conflict"));

        let subnets = cloud.subnets();
        assert_eq!(subnets.len(), 1);
        assert_eq!(subnets[0].0, existing);
    }

    #[tokio::test]
    async fn test_zone_listing_failure() {
        let cloud = fabric();
        cloud.inject_error(
            "list_availability_zones",
            CloudError::new("UnauthorizedOperation", "denied"),
        );
        let err = AzSubnets::new(cloud.clone())
            .create(&request("10.1.0.0/16"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cloud(_)));
        assert_eq!(cloud.call_count("create_subnet"), 0);
    }

    #[tokio::test]
    async fn test_member_block_too_small() {
        let cloud = fabric();
        let err = AzSubnets::new(cloud.clone())
            .create(&request("10.1.0.0/29"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAddressSpace(_)));
        assert!(cloud.subnets().is_empty());
    }
}

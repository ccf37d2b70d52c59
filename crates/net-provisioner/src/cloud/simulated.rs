//! Simulated networking fabric
//!
//! A process-local stand-in for the provider API shared by every account and
//! region. Peering attachments move through their lifecycle one step per
//! `settle_polls` state queries, which lets callers exercise polling without a
//! real provider. Individual operations can be made to fail on demand.

use super::{CloudResult, TransitNetworkApi};
use crate::error::CloudError;
use crate::models::{AttachmentState, TransitRoute};
use async_trait::async_trait;
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct SimulatedAttachment {
    state: AttachmentState,
    /// State queries left before the next automatic transition
    polls_left: u32,
}

#[derive(Debug, Default)]
struct FabricState {
    /// Transit gateway id -> default route table id
    gateways: HashMap<String, String>,
    /// Route table id -> destination -> attachment id
    route_tables: HashMap<String, BTreeMap<Ipv4Net, String>>,
    attachments: HashMap<String, SimulatedAttachment>,
    /// VPC id -> main route table id
    vpcs: HashMap<String, String>,
    /// Subnet id -> (vpc id, cidr, zone)
    subnets: HashMap<String, (String, Ipv4Net, String)>,
    zones: Vec<String>,
    /// Errors to return from the named operation, in order
    injected: HashMap<&'static str, VecDeque<CloudError>>,
    /// Operation log
    calls: Vec<String>,
}

/// Shared simulated fabric implementing [`TransitNetworkApi`]
#[derive(Debug)]
pub struct SimulatedCloud {
    state: Mutex<FabricState>,
    settle_polls: u32,
}

impl Default for SimulatedCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCloud {
    /// Fabric where attachments advance on every state query
    pub fn new() -> Self {
        Self::with_settle_polls(1)
    }

    /// Fabric where attachments advance after `settle_polls` state queries
    pub fn with_settle_polls(settle_polls: u32) -> Self {
        let state = FabricState {
            zones: vec!["zone-a".to_string(), "zone-b".to_string(), "zone-c".to_string()],
            ..FabricState::default()
        };
        Self {
            state: Mutex::new(state),
            settle_polls: settle_polls.max(1),
        }
    }

    /// Register a transit gateway; returns its default route table id
    pub fn add_transit_gateway(&self, tgw_id: &str) -> String {
        let route_table_id = format!("tgw-rtb-{}", tgw_id.trim_start_matches("tgw-"));
        let mut state = self.state.lock();
        state.gateways.insert(tgw_id.to_string(), route_table_id.clone());
        state.route_tables.entry(route_table_id.clone()).or_default();
        route_table_id
    }

    /// Register a VPC; returns its main route table id
    pub fn add_vpc(&self, vpc_id: &str) -> String {
        let route_table_id = format!("rtb-{}", vpc_id.trim_start_matches("vpc-"));
        self.state
            .lock()
            .vpcs
            .insert(vpc_id.to_string(), route_table_id.clone());
        route_table_id
    }

    /// Replace the region's availability zones
    pub fn set_zones(&self, zones: &[&str]) {
        self.state.lock().zones = zones.iter().map(|z| z.to_string()).collect();
    }

    /// Make the next call of `operation` fail with `error`
    ///
    /// Operation names match the trait method names.
    pub fn inject_error(&self, operation: &'static str, error: CloudError) {
        self.state
            .lock()
            .injected
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Current state of an attachment without advancing it
    pub fn attachment_state(&self, attachment_id: &str) -> Option<AttachmentState> {
        self.state
            .lock()
            .attachments
            .get(attachment_id)
            .map(|a| a.state)
    }

    /// Routes installed on a route table
    pub fn routes(&self, route_table_id: &str) -> Vec<TransitRoute> {
        self.state
            .lock()
            .route_tables
            .get(route_table_id)
            .map(|table| {
                table
                    .iter()
                    .map(|(destination, attachment_id)| TransitRoute {
                        destination: *destination,
                        attachment_id: attachment_id.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Subnets currently present, as `(subnet id, cidr, zone)`
    pub fn subnets(&self) -> Vec<(String, Ipv4Net, String)> {
        let mut subnets: Vec<_> = self
            .state
            .lock()
            .subnets
            .iter()
            .map(|(id, (_, cidr, zone))| (id.clone(), *cidr, zone.clone()))
            .collect();
        subnets.sort_by_key(|(_, cidr, _)| *cidr);
        subnets
    }

    /// Names of the operations called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Number of calls to one operation
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    /// Log the call and return an injected error, if any
    fn enter(state: &mut FabricState, operation: &'static str) -> CloudResult<()> {
        debug!(operation, "simulated cloud call");
        state.calls.push(operation.to_string());
        match state.injected.get_mut(operation).and_then(|q| q.pop_front()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn new_id(prefix: &str) -> String {
        let raw = Uuid::new_v4().simple().to_string();
        format!("{}-{}", prefix, &raw[..17])
    }

    fn not_found(kind: &str, id: &str) -> CloudError {
        CloudError::new(
            format!("Invalid{}ID.NotFound", kind),
            format!("The {} ID '{}' does not exist", kind, id),
        )
    }

    fn route_table<'a>(
        state: &'a mut FabricState,
        route_table_id: &str,
    ) -> CloudResult<&'a mut BTreeMap<Ipv4Net, String>> {
        state
            .route_tables
            .get_mut(route_table_id)
            .ok_or_else(|| Self::not_found("RouteTable", route_table_id))
    }
}

#[async_trait]
impl TransitNetworkApi for SimulatedCloud {
    async fn create_peering_attachment(
        &self,
        _peer_account: &str,
        _peer_region: &str,
        peer_tgw_id: &str,
        tgw_id: &str,
    ) -> CloudResult<String> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "create_peering_attachment")?;

        for gateway in [tgw_id, peer_tgw_id] {
            if !state.gateways.contains_key(gateway) {
                return Err(Self::not_found("TransitGateway", gateway));
            }
        }

        let attachment_id = Self::new_id("tgw-attach");
        state.attachments.insert(
            attachment_id.clone(),
            SimulatedAttachment {
                state: AttachmentState::InitiatingRequest,
                polls_left: self.settle_polls,
            },
        );
        Ok(attachment_id)
    }

    async fn delete_peering_attachment(&self, attachment_id: &str) -> CloudResult<()> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "delete_peering_attachment")?;

        let attachment = state
            .attachments
            .get_mut(attachment_id)
            .filter(|a| a.state != AttachmentState::Deleted)
            .ok_or_else(|| Self::not_found("TransitGatewayAttachment", attachment_id))?;
        attachment.state = AttachmentState::Deleting;
        attachment.polls_left = self.settle_polls;
        Ok(())
    }

    async fn peering_attachment_state(
        &self,
        attachment_id: &str,
    ) -> CloudResult<Option<AttachmentState>> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "peering_attachment_state")?;

        let Some(attachment) = state.attachments.get_mut(attachment_id) else {
            return Ok(None);
        };

        let next = match attachment.state {
            AttachmentState::InitiatingRequest => Some(AttachmentState::PendingAcceptance),
            AttachmentState::Pending => Some(AttachmentState::Available),
            AttachmentState::Deleting => Some(AttachmentState::Deleted),
            _ => None,
        };
        if let Some(next) = next {
            attachment.polls_left = attachment.polls_left.saturating_sub(1);
            if attachment.polls_left == 0 {
                attachment.state = next;
                attachment.polls_left = self.settle_polls;
            }
        }

        Ok(Some(attachment.state))
    }

    async fn accept_peering_attachment(&self, attachment_id: &str) -> CloudResult<()> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "accept_peering_attachment")?;

        let attachment = state
            .attachments
            .get_mut(attachment_id)
            .ok_or_else(|| Self::not_found("TransitGatewayAttachment", attachment_id))?;
        if attachment.state != AttachmentState::PendingAcceptance {
            return Err(CloudError::new(
                CloudError::INCORRECT_STATE,
                format!("Attachment {} is in state {}", attachment_id, attachment.state),
            ));
        }
        attachment.state = AttachmentState::Pending;
        attachment.polls_left = self.settle_polls;
        Ok(())
    }

    async fn tgw_route_table_id(&self, tgw_id: &str) -> CloudResult<String> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "tgw_route_table_id")?;

        state
            .gateways
            .get(tgw_id)
            .cloned()
            .ok_or_else(|| Self::not_found("TransitGateway", tgw_id))
    }

    async fn create_tgw_route(
        &self,
        route_table_id: &str,
        destination: Ipv4Net,
        attachment_id: &str,
    ) -> CloudResult<()> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "create_tgw_route")?;

        match state.attachments.get(attachment_id).map(|a| a.state) {
            Some(AttachmentState::Available) => {}
            Some(other) => {
                return Err(CloudError::new(
                    CloudError::INCORRECT_STATE,
                    format!("Attachment {} is in state {}", attachment_id, other),
                ))
            }
            None => return Err(Self::not_found("TransitGatewayAttachment", attachment_id)),
        }

        let table = Self::route_table(&mut state, route_table_id)?;
        if table.contains_key(&destination) {
            return Err(CloudError::new(
                "RouteAlreadyExists",
                format!("Route {} already exists in {}", destination, route_table_id),
            ));
        }
        table.insert(destination, attachment_id.to_string());
        Ok(())
    }

    async fn search_tgw_routes(
        &self,
        route_table_id: &str,
        attachment_id: &str,
    ) -> CloudResult<Vec<TransitRoute>> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "search_tgw_routes")?;

        let table = Self::route_table(&mut state, route_table_id)?;
        Ok(table
            .iter()
            .filter(|(_, target)| target.as_str() == attachment_id)
            .map(|(destination, target)| TransitRoute {
                destination: *destination,
                attachment_id: target.clone(),
            })
            .collect())
    }

    async fn delete_tgw_route(&self, route_table_id: &str, destination: Ipv4Net) -> CloudResult<()> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "delete_tgw_route")?;

        let table = Self::route_table(&mut state, route_table_id)?;
        table.remove(&destination).map(|_| ()).ok_or_else(|| {
            CloudError::new(
                "InvalidRoute.NotFound",
                format!("No route to {} in {}", destination, route_table_id),
            )
        })
    }

    async fn default_vpc_route_table(&self, vpc_id: &str) -> CloudResult<String> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "default_vpc_route_table")?;

        state
            .vpcs
            .get(vpc_id)
            .cloned()
            .ok_or_else(|| Self::not_found("Vpc", vpc_id))
    }

    async fn list_availability_zones(&self) -> CloudResult<Vec<String>> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "list_availability_zones")?;
        Ok(state.zones.clone())
    }

    async fn create_subnet(&self, vpc_id: &str, cidr: Ipv4Net, zone: &str) -> CloudResult<String> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "create_subnet")?;

        if !state.vpcs.contains_key(vpc_id) {
            return Err(Self::not_found("Vpc", vpc_id));
        }
        if let Some((id, _)) = state
            .subnets
            .iter()
            .find(|(_, (_, existing, _))| existing.contains(&cidr.network()) || cidr.contains(&existing.network()))
        {
            return Err(CloudError::new(
                "InvalidSubnet.Conflict",
                format!("The CIDR '{}' conflicts with subnet {}", cidr, id),
            ));
        }

        let subnet_id = Self::new_id("subnet");
        state.subnets.insert(
            subnet_id.clone(),
            (vpc_id.to_string(), cidr, zone.to_string()),
        );
        Ok(subnet_id)
    }

    async fn delete_subnet(&self, subnet_id: &str) -> CloudResult<()> {
        let mut state = self.state.lock();
        Self::enter(&mut state, "delete_subnet")?;

        state
            .subnets
            .remove(subnet_id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("Subnet", subnet_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attachment_lifecycle() {
        let cloud = SimulatedCloud::new();
        cloud.add_transit_gateway("tgw-primary");
        cloud.add_transit_gateway("tgw-secondary");

        let id = cloud
            .create_peering_attachment("111122223333", "us-east-1", "tgw-primary", "tgw-secondary")
            .await
            .unwrap();
        assert!(id.starts_with("tgw-attach-"));

        assert_eq!(
            cloud.peering_attachment_state(&id).await.unwrap(),
            Some(AttachmentState::PendingAcceptance)
        );
        cloud.accept_peering_attachment(&id).await.unwrap();
        assert_eq!(
            cloud.peering_attachment_state(&id).await.unwrap(),
            Some(AttachmentState::Available)
        );

        cloud.delete_peering_attachment(&id).await.unwrap();
        assert_eq!(
            cloud.peering_attachment_state(&id).await.unwrap(),
            Some(AttachmentState::Deleted)
        );
        assert!(cloud.delete_peering_attachment(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_settle_polls_delay_transitions() {
        let cloud = SimulatedCloud::with_settle_polls(3);
        cloud.add_transit_gateway("tgw-a");
        cloud.add_transit_gateway("tgw-b");
        let id = cloud
            .create_peering_attachment("1", "r", "tgw-a", "tgw-b")
            .await
            .unwrap();

        for _ in 0..2 {
            assert_eq!(
                cloud.peering_attachment_state(&id).await.unwrap(),
                Some(AttachmentState::InitiatingRequest)
            );
        }
        assert_eq!(
            cloud.peering_attachment_state(&id).await.unwrap(),
            Some(AttachmentState::PendingAcceptance)
        );
    }

    #[tokio::test]
    async fn test_route_requires_available_attachment() {
        let cloud = SimulatedCloud::new();
        let rtb = cloud.add_transit_gateway("tgw-a");
        cloud.add_transit_gateway("tgw-b");
        let id = cloud
            .create_peering_attachment("1", "r", "tgw-a", "tgw-b")
            .await
            .unwrap();

        let cidr: Ipv4Net = "10.128.0.0/9".parse().unwrap();
        let err = cloud.create_tgw_route(&rtb, cidr, &id).await.unwrap_err();
        assert!(err.is_incorrect_state());
        assert!(cloud.routes(&rtb).is_empty());
    }

    #[tokio::test]
    async fn test_injected_errors_are_consumed_in_order() {
        let cloud = SimulatedCloud::new();
        cloud.inject_error("list_availability_zones", CloudError::new("Throttling", "slow down"));

        let err = cloud.list_availability_zones().await.unwrap_err();
        assert_eq!(err.code, "Throttling");
        assert_eq!(cloud.list_availability_zones().await.unwrap().len(), 3);
        assert_eq!(cloud.call_count("list_availability_zones"), 2);
    }

    #[tokio::test]
    async fn test_subnet_conflicts() {
        let cloud = SimulatedCloud::new();
        cloud.add_vpc("vpc-1");

        let cidr: Ipv4Net = "10.0.0.0/28".parse().unwrap();
        let id = cloud.create_subnet("vpc-1", cidr, "zone-a").await.unwrap();
        let err = cloud.create_subnet("vpc-1", cidr, "zone-b").await.unwrap_err();
        assert_eq!(err.code, "InvalidSubnet.Conflict");

        cloud.delete_subnet(&id).await.unwrap();
        assert!(cloud.delete_subnet(&id).await.unwrap_err().is_not_found());
    }
}

//! Cloud networking API
//!
//! Defines the subset of the provider's networking API this crate drives:
//! transit gateway peering attachments, transit gateway routes, and subnets.
//! Implementations are bound to one account and region.

mod simulated;

pub use simulated::SimulatedCloud;

use crate::error::CloudError;
use crate::models::{AttachmentState, TransitRoute};
use async_trait::async_trait;
use ipnet::Ipv4Net;

/// Result of a single cloud API call
pub type CloudResult<T> = std::result::Result<T, CloudError>;

/// Networking API of one account and region
#[async_trait]
pub trait TransitNetworkApi: Send + Sync {
    /// Request a peering attachment from `tgw_id` (local) to `peer_tgw_id`
    ///
    /// Returns the attachment id.
    async fn create_peering_attachment(
        &self,
        peer_account: &str,
        peer_region: &str,
        peer_tgw_id: &str,
        tgw_id: &str,
    ) -> CloudResult<String>;

    /// Request deletion of a peering attachment
    async fn delete_peering_attachment(&self, attachment_id: &str) -> CloudResult<()>;

    /// Current state of a peering attachment
    ///
    /// Returns `None` when the provider no longer reports the attachment.
    async fn peering_attachment_state(
        &self,
        attachment_id: &str,
    ) -> CloudResult<Option<AttachmentState>>;

    /// Accept a peering attachment pending on this side
    async fn accept_peering_attachment(&self, attachment_id: &str) -> CloudResult<()>;

    /// Default association route table of a transit gateway
    async fn tgw_route_table_id(&self, tgw_id: &str) -> CloudResult<String>;

    /// Add a static route to a transit gateway route table
    async fn create_tgw_route(
        &self,
        route_table_id: &str,
        destination: Ipv4Net,
        attachment_id: &str,
    ) -> CloudResult<()>;

    /// Routes of a transit gateway route table pointing at an attachment
    async fn search_tgw_routes(
        &self,
        route_table_id: &str,
        attachment_id: &str,
    ) -> CloudResult<Vec<TransitRoute>>;

    /// Remove a static route from a transit gateway route table
    async fn delete_tgw_route(&self, route_table_id: &str, destination: Ipv4Net) -> CloudResult<()>;

    /// Main route table of a VPC
    async fn default_vpc_route_table(&self, vpc_id: &str) -> CloudResult<String>;

    /// Availability zones of the region
    async fn list_availability_zones(&self) -> CloudResult<Vec<String>>;

    /// Create a subnet in a VPC and zone; returns the subnet id
    async fn create_subnet(&self, vpc_id: &str, cidr: Ipv4Net, zone: &str) -> CloudResult<String>;

    /// Delete a subnet
    async fn delete_subnet(&self, subnet_id: &str) -> CloudResult<()>;
}

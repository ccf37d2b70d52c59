//! Resource kinds and their handlers
//!
//! Each orchestrator resource type maps to one [`ResourceKind`], and each kind
//! to one [`ResourceHandler`]. Handlers only support create and delete.

mod az_subnets;
mod init_metadata;
mod member_metadata;
mod member_registration;
mod props;
mod region_registration;

pub use az_subnets::{AzSubnets, SUBNET_BITMASK};
pub use init_metadata::{plan_bitmasks, PartitionPlan, RegionInitializer, MIN_MEMBER_BITMASK};
pub use member_metadata::MemberMetadataLookup;
pub use member_registration::{MemberAssigner, MemberAssignment};
pub use props::Properties;
pub use region_registration::SecondaryRegionRegistration;

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// Lifecycle request issued by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Create,
    Update,
    Delete,
}

/// Supported resource types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Partition the root block across regions
    InitMetadata,
    /// Assign a member block to an account
    MemberRegistration,
    /// Read back a member's blocks
    MemberMetadata,
    /// One subnet per availability zone inside a member block
    AzSubnets,
    /// Peer a secondary region with the primary region
    SecondaryRegionRegistration,
}

impl ResourceKind {
    /// All kinds
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::InitMetadata,
        ResourceKind::MemberRegistration,
        ResourceKind::MemberMetadata,
        ResourceKind::AzSubnets,
        ResourceKind::SecondaryRegionRegistration,
    ];

    /// Orchestrator type string
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::InitMetadata => "Custom::InitMetadata",
            ResourceKind::MemberRegistration => "Custom::MemberRegistration",
            ResourceKind::MemberMetadata => "Custom::MemberMetadata",
            ResourceKind::AzSubnets => "Custom::AzSubnets",
            ResourceKind::SecondaryRegionRegistration => "Custom::SecondaryRegionRegistration",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.type_name() == s)
            .ok_or_else(|| Error::UnknownResourceKind(s.to_string()))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Input of one handler invocation
#[derive(Debug, Clone, Default)]
pub struct ResourceRequest {
    /// Normalized properties
    pub properties: Properties,
    /// Physical id returned by an earlier create
    pub physical_id: Option<String>,
    /// Fires when the caller gives up on the request
    pub cancellation: CancellationToken,
}

impl ResourceRequest {
    /// Request carrying only properties
    pub fn new(properties: Properties) -> Self {
        Self {
            properties,
            ..Self::default()
        }
    }

    /// Set the prior physical id
    pub fn with_physical_id(mut self, physical_id: impl Into<String>) -> Self {
        self.physical_id = Some(physical_id.into());
        self
    }

    /// Set the cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Prior physical id, required by deletes that address a created resource
    pub fn require_physical_id(&self) -> Result<&str> {
        self.physical_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::InvalidProperties("missing physical resource id".to_string()))
    }
}

/// Result of a successful handler invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceOutcome {
    /// Attributes exposed to the orchestrator
    pub data: Map<String, Value>,
    /// New physical id; `None` keeps the prior one
    pub physical_id: Option<String>,
}

impl ResourceOutcome {
    /// Outcome with no data
    pub fn empty() -> Self {
        Self::default()
    }

    /// Outcome with data
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data,
            physical_id: None,
        }
    }

    /// Set the physical id
    pub fn physical_id(mut self, physical_id: impl Into<String>) -> Self {
        self.physical_id = Some(physical_id.into());
        self
    }
}

/// Create/delete capability shared by every resource kind
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Provision the resource
    async fn create(&self, request: &ResourceRequest) -> Result<ResourceOutcome>;

    /// Tear the resource down
    async fn delete(&self, request: &ResourceRequest) -> Result<ResourceOutcome>;

    /// Dispatch on the request kind; updates are always rejected
    async fn handle(&self, kind: RequestKind, request: &ResourceRequest) -> Result<ResourceOutcome> {
        match kind {
            RequestKind::Create => self.create(request).await,
            RequestKind::Delete => self.delete(request).await,
            RequestKind::Update => Err(Error::UnsupportedRequest),
        }
    }
}

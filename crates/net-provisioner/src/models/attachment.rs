//! Transit gateway peering attachments and routes

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a peering attachment, as reported by the cloud API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttachmentState {
    Initiating,
    InitiatingRequest,
    PendingAcceptance,
    Pending,
    Available,
    Modifying,
    RollingBack,
    Rejecting,
    Rejected,
    Failing,
    Failed,
    Deleting,
    Deleted,
}

impl AttachmentState {
    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentState::Initiating => "initiating",
            AttachmentState::InitiatingRequest => "initiatingRequest",
            AttachmentState::PendingAcceptance => "pendingAcceptance",
            AttachmentState::Pending => "pending",
            AttachmentState::Available => "available",
            AttachmentState::Modifying => "modifying",
            AttachmentState::RollingBack => "rollingBack",
            AttachmentState::Rejecting => "rejecting",
            AttachmentState::Rejected => "rejected",
            AttachmentState::Failing => "failing",
            AttachmentState::Failed => "failed",
            AttachmentState::Deleting => "deleting",
            AttachmentState::Deleted => "deleted",
        }
    }
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps of the peering reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeeringStep {
    /// Nothing requested yet
    NotStarted,
    /// Attachment requested, id known
    Initiated,
    /// Attachment waiting for the primary side to accept
    PendingAcceptance,
    /// Attachment accepted and usable
    Available,
    /// Route to the secondary region installed on the primary route table
    RouteEstablished,
    /// Route and attachment being removed
    Detaching,
    /// Attachment gone
    Deleted,
}

impl PeeringStep {
    /// Next step on the create path
    pub fn next(&self) -> Option<PeeringStep> {
        match self {
            PeeringStep::NotStarted => Some(PeeringStep::Initiated),
            PeeringStep::Initiated => Some(PeeringStep::PendingAcceptance),
            PeeringStep::PendingAcceptance => Some(PeeringStep::Available),
            PeeringStep::Available => Some(PeeringStep::RouteEstablished),
            PeeringStep::Detaching => Some(PeeringStep::Deleted),
            _ => None,
        }
    }

    /// Whether the delete path may start from this step
    pub fn can_detach(&self) -> bool {
        matches!(
            self,
            PeeringStep::Available | PeeringStep::RouteEstablished | PeeringStep::Detaching
        )
    }
}

/// A static route on a transit gateway route table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitRoute {
    /// Destination block
    pub destination: Ipv4Net,
    /// Attachment the route points at
    pub attachment_id: String,
}

//! Ledger records: network, region and member metadata
//!
//! Records are stored as attribute maps with PascalCase attribute names.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Network-wide partitioning scheme, written once at initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkMetadata {
    /// Root address block
    pub network_cidr: Ipv4Net,
    /// Prefix length used to carve regional blocks from the root
    pub regional_bitmask: u8,
    /// Prefix length used to carve member blocks from a regional block
    pub member_bitmask: u8,
}

/// Per-region metadata
///
/// Fields are optional on read: a region record may exist with only its
/// assignment counter if a member registered before initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegionMetadata {
    /// Region code
    pub region: String,
    /// This region's block of the root address space
    #[serde(default)]
    pub regional_cidr: Option<Ipv4Net>,
    /// Transit gateway id, empty until the gateway exists
    #[serde(default)]
    pub regional_tgw_id: String,
    /// Number of member slots handed out so far
    #[serde(default)]
    pub assignments: u64,
}

impl RegionMetadata {
    /// Fresh region record with no gateway and no assignments
    pub fn new(region: impl Into<String>, regional_cidr: Ipv4Net) -> Self {
        Self {
            region: region.into(),
            regional_cidr: Some(regional_cidr),
            regional_tgw_id: String::new(),
            assignments: 0,
        }
    }

    /// Transit gateway id, if one has been recorded
    pub fn tgw_id(&self) -> Option<&str> {
        if self.regional_tgw_id.is_empty() {
            None
        } else {
            Some(&self.regional_tgw_id)
        }
    }
}

/// A member's claimed slot and address block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MemberMetadata {
    /// Slot claimed from the region's counter
    pub assignment_id: u64,
    /// This member's block of the regional address space
    pub member_cidr: Ipv4Net,
}

//! Data models for network provisioning

mod attachment;
mod metadata;
mod network;

pub use attachment::{AttachmentState, PeeringStep, TransitRoute};
pub use metadata::{MemberMetadata, NetworkMetadata, RegionMetadata};
pub use network::{Member, Network};

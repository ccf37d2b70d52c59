//! Network Provisioner
//!
//! Carves a private IPv4 address space for a multi-account, multi-region
//! network and wires the regions together:
//! - deterministic partitioning of a root block into regional and member blocks
//! - a keyed ledger recording the layout and per-region assignment counters
//! - transit gateway peering between each secondary region and the primary
//! - per-zone subnets inside a member block
//!
//! Requests arrive as create/delete lifecycle calls for one of several
//! resource kinds and are answered with a success payload or a failure reason.

pub mod allocator;
pub mod cloud;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod reconciler;
pub mod resources;
pub mod service;
pub mod telemetry;

// Re-export core types
pub use config::ProvisionerConfig;
pub use error::{CloudError, Error, Result};
pub use models::{
    AttachmentState, MemberMetadata, Member, Network, NetworkMetadata, PeeringStep,
    RegionMetadata, TransitRoute,
};
pub use reconciler::{PeeringProgress, PeeringReconciler, PollPolicy, Poller};
pub use resources::{
    MemberAssigner, MemberAssignment, PartitionPlan, RegionInitializer, RequestKind,
    ResourceHandler, ResourceKind, ResourceOutcome, ResourceRequest,
};
pub use service::{ClientFactory, LocalClients, Provisioner, ReconcileRequest, ReconcileResponse};

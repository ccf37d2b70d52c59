//! Integration tests for the provisioning request flow
//!
//! Drives whole create/delete requests through the provisioner against the
//! in-memory ledger and the simulated networking fabric.

use ipnet::Ipv4Net;
use net_provisioner::cloud::SimulatedCloud;
use net_provisioner::ledger::{InMemoryStore, MetadataRepository};
use net_provisioner::{
    LocalClients, Member, Provisioner, ProvisionerConfig, ReconcileRequest, ReconcileResponse,
    RequestKind, ResourceKind,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

const ADMIN: &str = "111122223333";
const PRIMARY: &str = "us-east-1";
const SECONDARY: &str = "eu-west-1";

struct Harness {
    store: Arc<InMemoryStore>,
    cloud: Arc<SimulatedCloud>,
    clients: LocalClients,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let cloud = Arc::new(SimulatedCloud::new());
        cloud.add_transit_gateway("tgw-primary");
        cloud.add_transit_gateway("tgw-secondary");
        cloud.add_vpc("vpc-member");
        let clients = LocalClients::new(Member::new(ADMIN, PRIMARY), store.clone(), cloud.clone());
        Self {
            store,
            cloud,
            clients,
        }
    }

    fn config() -> ProvisionerConfig {
        ProvisionerConfig {
            admin_account: ADMIN.to_string(),
            primary_region: PRIMARY.to_string(),
            network_name: "corp".to_string(),
            ..ProvisionerConfig::default()
        }
    }

    /// Provisioner running as `account` in `region`
    fn as_member(&self, account: &str, region: &str) -> Provisioner {
        let clients = self.clients.as_member(Member::new(account, region));
        Provisioner::new(Self::config(), Arc::new(clients)).unwrap()
    }

    fn repo(&self) -> MetadataRepository {
        let network = Self::config().network();
        MetadataRepository::new(network, Member::new(ADMIN, PRIMARY), self.store.clone())
    }

    async fn initialize(&self, secondary_regions: Value, num_accounts: Value) -> ReconcileResponse {
        self.as_member(ADMIN, PRIMARY)
            .handle(
                ReconcileRequest::new(RequestKind::Create, ResourceKind::InitMetadata)
                    .property("NetworkCidr", "10.0.0.0/8")
                    .property("SecondaryRegions", secondary_regions)
                    .property("RegionalTgwId", "tgw-primary")
                    .property("NumAccounts", num_accounts),
            )
            .await
    }

    async fn register(&self, account: &str, region: &str) -> Map<String, Value> {
        let response = self
            .as_member(account, region)
            .handle(ReconcileRequest::new(
                RequestKind::Create,
                ResourceKind::MemberRegistration,
            ))
            .await;
        success_data(response)
    }
}

fn success_data(response: ReconcileResponse) -> Map<String, Value> {
    match response {
        ReconcileResponse::Success { data, .. } => data,
        ReconcileResponse::Failed { reason } => panic!("request failed: {}", reason),
    }
}

fn failure_reason(response: ReconcileResponse) -> String {
    match response {
        ReconcileResponse::Failed { reason } => reason,
        other => panic!("expected failure, got {:?}", other),
    }
}

fn cidr(value: &Value) -> Ipv4Net {
    value.as_str().unwrap().parse().unwrap()
}

// ============================================================================
// Initialization
// ============================================================================

#[tokio::test]
async fn test_two_region_initialization() {
    let harness = Harness::new();
    let data = success_data(harness.initialize(json!([SECONDARY, ""]), json!("20")).await);
    assert_eq!(data["RegionalBitmask"], json!(9));
    assert_eq!(data["MemberBitmask"], json!(16));

    let repo = harness.repo();
    let primary = repo.get_region(PRIMARY).await.unwrap().unwrap();
    let secondary = repo.get_region(SECONDARY).await.unwrap().unwrap();
    assert_eq!(primary.regional_cidr.unwrap().to_string(), "10.0.0.0/9");
    assert_eq!(secondary.regional_cidr.unwrap().to_string(), "10.128.0.0/9");
    assert_eq!(primary.regional_tgw_id, "tgw-primary");
}

#[tokio::test]
async fn test_single_region_initialization() {
    let harness = Harness::new();
    let data = success_data(harness.initialize(json!([]), json!(20)).await);
    assert_eq!(data["RegionalBitmask"], json!(8));
    assert_eq!(data["MemberBitmask"], json!(16));
}

#[tokio::test]
async fn test_initialization_rejects_bad_properties() {
    let harness = Harness::new();
    let reason = failure_reason(harness.initialize(json!([]), json!("many")).await);
    assert!(reason.starts_with("Invalid resource properties"));
    assert!(harness.store.is_empty("Network-corp"));
}

// ============================================================================
// Member assignment
// ============================================================================

#[tokio::test]
async fn test_members_in_two_regions_get_disjoint_blocks() {
    let harness = Harness::new();
    success_data(harness.initialize(json!([SECONDARY]), json!("20")).await);

    let east = harness.register("444455556666", PRIMARY).await;
    let west = harness.register("777788889999", SECONDARY).await;

    let east_block = cidr(&east["MemberCidr"]);
    let west_block = cidr(&west["MemberCidr"]);
    assert_eq!(east_block.to_string(), "10.0.0.0/16");
    assert_eq!(west_block.to_string(), "10.128.0.0/16");
    assert_eq!(east["AssignmentId"], json!(0));
    assert_eq!(west["AssignmentId"], json!(0));
    assert_eq!(east["RegionalTgwId"], json!("tgw-primary"));
    assert_eq!(west["RegionalTgwId"], json!(""));

    let root: Ipv4Net = "10.0.0.0/8".parse().unwrap();
    let east_region: Ipv4Net = "10.0.0.0/9".parse().unwrap();
    let west_region: Ipv4Net = "10.128.0.0/9".parse().unwrap();
    assert!(east_region.contains(&east_block) && root.contains(&east_block));
    assert!(west_region.contains(&west_block) && root.contains(&west_block));
    assert!(!east_block.contains(&west_block.network()));
    assert!(!west_block.contains(&east_block.network()));
}

#[tokio::test]
async fn test_concurrent_registrations_never_collide() {
    let harness = Arc::new(Harness::new());
    success_data(harness.initialize(json!([]), json!(64)).await);

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let harness = harness.clone();
            tokio::spawn(async move {
                let data = harness.register(&format!("acct-{:02}", i), PRIMARY).await;
                (data["AssignmentId"].as_u64().unwrap(), cidr(&data["MemberCidr"]))
            })
        })
        .collect();

    let mut ids = Vec::new();
    let mut blocks = Vec::new();
    for handle in handles {
        let (id, block) = handle.await.unwrap();
        ids.push(id);
        blocks.push(block);
    }
    ids.sort_unstable();
    assert_eq!(ids, (0..32).collect::<Vec<u64>>());
    blocks.sort();
    blocks.dedup();
    assert_eq!(blocks.len(), 32);
}

#[tokio::test]
async fn test_registration_before_initialization() {
    let harness = Harness::new();
    let reason = failure_reason(
        harness
            .as_member("444455556666", PRIMARY)
            .handle(ReconcileRequest::new(
                RequestKind::Create,
                ResourceKind::MemberRegistration,
            ))
            .await,
    );
    assert!(reason.starts_with("Incomplete network state"));
    assert!(reason.contains(ADMIN));
}

#[tokio::test]
async fn test_ledger_outage_is_reported() {
    let harness = Harness::new();
    success_data(harness.initialize(json!([]), json!(4)).await);
    harness.store.set_unavailable(true);

    let reason = failure_reason(
        harness
            .as_member("444455556666", PRIMARY)
            .handle(ReconcileRequest::new(
                RequestKind::Create,
                ResourceKind::MemberRegistration,
            ))
            .await,
    );
    assert!(reason.starts_with("Ledger unavailable"));
}

// ============================================================================
// Member metadata and zone subnets
// ============================================================================

#[tokio::test]
async fn test_member_metadata_and_zone_subnets() {
    let harness = Harness::new();
    success_data(harness.initialize(json!([SECONDARY]), json!(20)).await);
    let registered = harness.register("444455556666", PRIMARY).await;
    let member = harness.as_member("444455556666", PRIMARY);

    let metadata = success_data(
        member
            .handle(
                ReconcileRequest::new(RequestKind::Create, ResourceKind::MemberMetadata)
                    .property("SubnetsBitmask", "20")
                    .property("SubnetsNumber", "2"),
            )
            .await,
    );
    assert_eq!(metadata["MemberCidr"], registered["MemberCidr"]);
    assert_eq!(metadata["Subnet0"], json!("10.0.0.0/20"));
    assert_eq!(metadata["Subnet1"], json!("10.0.16.0/20"));

    let created = member
        .handle(
            ReconcileRequest::new(RequestKind::Create, ResourceKind::AzSubnets)
                .property("MemberCidr", registered["MemberCidr"].clone())
                .property("VpcId", "vpc-member"),
        )
        .await;
    let physical_id = match created {
        ReconcileResponse::Success { data, physical_id } => {
            assert_eq!(data["VpcDefaultRouteTableId"], json!("rtb-member"));
            physical_id.unwrap()
        }
        ReconcileResponse::Failed { reason } => panic!("request failed: {}", reason),
    };
    assert_eq!(harness.cloud.subnets().len(), 3);

    let deleted = member
        .handle(
            ReconcileRequest::new(RequestKind::Delete, ResourceKind::AzSubnets)
                .physical_id(physical_id.clone()),
        )
        .await;
    assert_eq!(
        deleted,
        ReconcileResponse::Success {
            data: Map::new(),
            physical_id: Some(physical_id),
        }
    );
    assert!(harness.cloud.subnets().is_empty());
}

#[tokio::test]
async fn test_metadata_for_unregistered_member() {
    let harness = Harness::new();
    success_data(harness.initialize(json!([]), json!(20)).await);

    let reason = failure_reason(
        harness
            .as_member("444455556666", PRIMARY)
            .handle(ReconcileRequest::new(
                RequestKind::Create,
                ResourceKind::MemberMetadata,
            ))
            .await,
    );
    assert!(reason.contains("444455556666"));
}

// ============================================================================
// Request protocol
// ============================================================================

#[tokio::test]
async fn test_update_is_rejected_for_every_kind() {
    let harness = Harness::new();
    for kind in ResourceKind::ALL {
        let reason = failure_reason(
            harness
                .as_member(ADMIN, PRIMARY)
                .handle(ReconcileRequest::new(RequestKind::Update, kind).physical_id("existing"))
                .await,
        );
        assert!(reason.contains("delete this resource and re-create it"), "{}", kind);
    }
    assert!(harness.store.is_empty("Network-corp"));
}

#[tokio::test]
async fn test_unknown_resource_type() {
    let harness = Harness::new();
    let request: ReconcileRequest = serde_json::from_value(json!({
        "RequestType": "Create",
        "ResourceType": "Custom::CallbackTrigger",
        "ResourceProperties": {},
    }))
    .unwrap();

    let reason = failure_reason(harness.as_member(ADMIN, PRIMARY).handle(request).await);
    assert_eq!(reason, "Unknown resource kind: Custom::CallbackTrigger");
}

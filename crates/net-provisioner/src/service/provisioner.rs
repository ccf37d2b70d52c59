//! Reconciliation request dispatch
//!
//! Turns one orchestrator request into a handler call and the handler's
//! result into a success or failure response. Every failure is reported, none
//! is raised to the caller.

use super::ClientFactory;
use crate::config::ProvisionerConfig;
use crate::ledger::MetadataRepository;
use crate::models::Network;
use crate::reconciler::PeeringReconciler;
use crate::resources::{
    AzSubnets, MemberAssigner, MemberMetadataLookup, Properties, RegionInitializer, RequestKind,
    ResourceHandler, ResourceKind, ResourceOutcome, ResourceRequest, SecondaryRegionRegistration,
};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// One lifecycle request from the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReconcileRequest {
    pub request_type: RequestKind,
    pub resource_type: String,
    #[serde(default)]
    pub resource_properties: Map<String, Value>,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
}

impl ReconcileRequest {
    pub fn new(request_type: RequestKind, resource_kind: ResourceKind) -> Self {
        Self {
            request_type,
            resource_type: resource_kind.type_name().to_string(),
            resource_properties: Map::new(),
            physical_resource_id: None,
        }
    }

    /// Add a property
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.resource_properties.insert(key.into(), value.into());
        self
    }

    /// Set the physical id returned by an earlier create
    pub fn physical_id(mut self, physical_id: impl Into<String>) -> Self {
        self.physical_resource_id = Some(physical_id.into());
        self
    }
}

/// Outcome reported back to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileResponse {
    Success {
        #[serde(rename = "Data")]
        data: Map<String, Value>,
        #[serde(rename = "PhysicalResourceId")]
        physical_id: Option<String>,
    },
    Failed {
        #[serde(rename = "Reason")]
        reason: String,
    },
}

impl ReconcileResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, ReconcileResponse::Success { .. })
    }
}

/// Dispatches requests for one network
pub struct Provisioner {
    config: ProvisionerConfig,
    network: Network,
    clients: Arc<dyn ClientFactory>,
}

impl Provisioner {
    /// Create a dispatcher, rejecting an invalid configuration
    pub fn new(config: ProvisionerConfig, clients: Arc<dyn ClientFactory>) -> Result<Self> {
        config.validate()?;
        let network = config.network();
        Ok(Self {
            config,
            network,
            clients,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Handle a request with no cancellation
    pub async fn handle(&self, request: ReconcileRequest) -> ReconcileResponse {
        self.handle_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Handle a request, abandoning its waits when `cancellation` fires
    #[instrument(
        skip(self, request, cancellation),
        fields(
            network = %self.network.name,
            request_type = ?request.request_type,
            resource_type = %request.resource_type,
        )
    )]
    pub async fn handle_with_cancellation(
        &self,
        request: ReconcileRequest,
        cancellation: CancellationToken,
    ) -> ReconcileResponse {
        match self.dispatch(&request, cancellation).await {
            Ok(outcome) => {
                let physical_id = outcome.physical_id.or(request.physical_resource_id);
                info!(physical_id = ?physical_id, "Request succeeded");
                ReconcileResponse::Success {
                    data: outcome.data,
                    physical_id,
                }
            }
            Err(err) => {
                error!(error = %err, "Request failed");
                if err.is_not_found() {
                    error!("Make sure all the prerequisites are in place");
                }
                ReconcileResponse::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn dispatch(
        &self,
        request: &ReconcileRequest,
        cancellation: CancellationToken,
    ) -> Result<ResourceOutcome> {
        let kind: ResourceKind = request.resource_type.parse()?;
        let handler = self.instantiate(kind).await?;

        let resource_request = ResourceRequest {
            properties: Properties::normalize(request.resource_properties.clone()),
            physical_id: request.physical_resource_id.clone(),
            cancellation,
        };
        handler.handle(request.request_type, &resource_request).await
    }

    /// Build the handler of a resource kind, bound to the calling member
    async fn instantiate(&self, kind: ResourceKind) -> Result<Box<dyn ResourceHandler>> {
        let member = self.clients.current_member().await?;
        let store = self.clients.store(&self.network)?;
        let repo = MetadataRepository::new(self.network.clone(), member.clone(), store);

        let handler: Box<dyn ResourceHandler> = match kind {
            ResourceKind::InitMetadata => Box::new(RegionInitializer::new(repo)),
            ResourceKind::MemberRegistration => Box::new(MemberAssigner::new(repo)),
            ResourceKind::MemberMetadata => Box::new(MemberMetadataLookup::new(repo)),
            ResourceKind::AzSubnets => {
                Box::new(AzSubnets::new(self.clients.network_api(&member).await?))
            }
            ResourceKind::SecondaryRegionRegistration => {
                let primary = self
                    .clients
                    .network_api(&self.network.primary_admin_member())
                    .await?;
                let secondary = self.clients.network_api(&member).await?;
                Box::new(SecondaryRegionRegistration::new(PeeringReconciler::new(
                    repo,
                    primary,
                    secondary,
                    self.config.poll_policy(),
                )))
            }
        };
        Ok(handler)
    }
}

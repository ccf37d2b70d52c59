//! Secondary region registration

use super::{ResourceHandler, ResourceOutcome, ResourceRequest};
use crate::reconciler::PeeringReconciler;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map};
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionRegistrationProps {
    region: String,
    regional_tgw_id: String,
}

/// Peers a secondary region with the primary region
///
/// The peering attachment id is the physical id; delete needs nothing else.
pub struct SecondaryRegionRegistration {
    reconciler: PeeringReconciler,
}

impl SecondaryRegionRegistration {
    pub fn new(reconciler: PeeringReconciler) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl ResourceHandler for SecondaryRegionRegistration {
    #[instrument(skip(self, request))]
    async fn create(&self, request: &ResourceRequest) -> Result<ResourceOutcome> {
        let props: RegionRegistrationProps = request.properties.parse()?;
        let outcome = self
            .reconciler
            .create(&props.region, &props.regional_tgw_id, request.cancellation.clone())
            .await?;
        debug!(progress = ?outcome.progress, "peering progress");

        let mut data = Map::new();
        data.insert("TgwRouteTableId".to_string(), json!(outcome.route_table_id));
        data.insert(
            "TgwPeeringAttachmentId".to_string(),
            json!(outcome.attachment_id),
        );
        Ok(ResourceOutcome::with_data(data).physical_id(outcome.attachment_id))
    }

    #[instrument(skip(self, request))]
    async fn delete(&self, request: &ResourceRequest) -> Result<ResourceOutcome> {
        let attachment_id = request.require_physical_id()?;
        let progress = self
            .reconciler
            .delete(attachment_id, request.cancellation.clone())
            .await?;
        debug!(?progress, "peering progress");
        Ok(ResourceOutcome::empty())
    }
}

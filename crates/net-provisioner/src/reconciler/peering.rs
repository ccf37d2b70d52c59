//! Peering attachment state machine
//!
//! Create path: `NotStarted -> Initiated -> PendingAcceptance -> Available ->
//! RouteEstablished`. Delete path: `Detaching -> Deleted`. The attachment id
//! is the only state carried between polls; everything else is re-read from
//! the ledger or the cloud API.

use super::poll::{PollPolicy, Poller};
use crate::cloud::TransitNetworkApi;
use crate::error::CloudError;
use crate::ledger::MetadataRepository;
use crate::models::{AttachmentState, PeeringStep, RegionMetadata};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Record of a finished step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedStep {
    /// The step
    pub step: PeeringStep,
    /// When the step was entered
    pub started_at: DateTime<Utc>,
    /// When the step was left
    pub completed_at: DateTime<Utc>,
}

/// Progress of one reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeeringProgress {
    /// Attachment id, once requested
    pub attachment_id: Option<String>,
    /// Current step
    pub current_step: PeeringStep,
    /// Step started at
    pub step_started_at: DateTime<Utc>,
    /// Steps left so far
    pub steps_completed: Vec<CompletedStep>,
}

impl PeeringProgress {
    fn starting_at(step: PeeringStep) -> Self {
        Self {
            attachment_id: None,
            current_step: step,
            step_started_at: Utc::now(),
            steps_completed: Vec::new(),
        }
    }

    /// Move to the step following the current one
    fn advance(&mut self) -> Result<PeeringStep> {
        let step = self.current_step.next().ok_or_else(|| {
            Error::InvalidTransition(format!("no step follows {:?}", self.current_step))
        })?;
        self.advance_to(step);
        Ok(step)
    }

    /// Enter the delete path
    fn detach(&mut self) -> Result<()> {
        if !self.current_step.can_detach() {
            return Err(Error::InvalidTransition(format!(
                "cannot detach from {:?}",
                self.current_step
            )));
        }
        self.advance_to(PeeringStep::Detaching);
        Ok(())
    }

    fn advance_to(&mut self, step: PeeringStep) {
        let now = Utc::now();
        self.steps_completed.push(CompletedStep {
            step: self.current_step,
            started_at: self.step_started_at,
            completed_at: now,
        });
        self.current_step = step;
        self.step_started_at = now;
        info!(step = ?step, attachment_id = ?self.attachment_id, "peering step reached");
    }
}

/// Result of a successful create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeeringOutcome {
    /// Default route table of the secondary region's transit gateway
    pub route_table_id: String,
    /// Peering attachment id; the durable identifier of the link
    pub attachment_id: String,
    /// Step history
    pub progress: PeeringProgress,
}

/// Establishes and removes the peering between a secondary and the primary region
pub struct PeeringReconciler {
    repo: MetadataRepository,
    /// Client of the admin account in the primary region
    primary: Arc<dyn TransitNetworkApi>,
    /// Client of the secondary region
    secondary: Arc<dyn TransitNetworkApi>,
    policy: PollPolicy,
}

impl PeeringReconciler {
    /// Create a reconciler
    pub fn new(
        repo: MetadataRepository,
        primary: Arc<dyn TransitNetworkApi>,
        secondary: Arc<dyn TransitNetworkApi>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            repo,
            primary,
            secondary,
            policy,
        }
    }

    async fn region_metadata(&self, region: &str) -> Result<RegionMetadata> {
        self.repo.get_region(region).await?.ok_or_else(|| {
            Error::IncompleteNetworkState(format!(
                "No metadata for region {}. Make sure the network was initialized",
                region
            ))
        })
    }

    /// Transit gateway of the primary region, as recorded at initialization
    async fn primary_tgw_id(&self) -> Result<String> {
        let primary_region = &self.repo.network().region;
        let meta = self.region_metadata(primary_region).await?;
        meta.tgw_id().map(str::to_string).ok_or_else(|| {
            Error::IncompleteNetworkState(format!(
                "Primary region {} has no transit gateway. Make sure you provisioned admin account {}",
                primary_region,
                self.repo.network().account
            ))
        })
    }

    async fn attachment_state(&self, attachment_id: &str) -> Result<Option<AttachmentState>> {
        let state = self.secondary.peering_attachment_state(attachment_id).await?;
        debug!(attachment_id, state = ?state, "polled attachment state");
        Ok(state)
    }

    /// Poll until the attachment reaches `target`
    ///
    /// Fails early if the attachment disappears or ends up rejected or failed.
    async fn wait_for_state(
        &self,
        poller: &Poller,
        attachment_id: &str,
        target: AttachmentState,
    ) -> Result<()> {
        poller
            .wait_until(target.as_str(), || async move {
                match self.attachment_state(attachment_id).await? {
                    Some(state) if state == target => Ok(true),
                    Some(
                        state @ (AttachmentState::Failed
                        | AttachmentState::Rejected
                        | AttachmentState::Deleted),
                    ) => Err(Error::Cloud(CloudError::new(
                        "AttachmentFailed",
                        format!(
                            "Attachment {} reached state {} while waiting for {}",
                            attachment_id, state, target
                        ),
                    ))),
                    Some(_) => Ok(false),
                    None => Err(Error::Cloud(CloudError::new(
                        "InvalidTransitGatewayAttachmentID.NotFound",
                        format!("Attachment {} no longer exists", attachment_id),
                    ))),
                }
            })
            .await
    }

    /// Peer `region`'s transit gateway with the primary region's
    ///
    /// Every call races `cancellation`. Once the attachment exists, any failure
    /// deletes it again and restores the region's recorded gateway, so a
    /// failed create leaves nothing behind and can simply be repeated.
    #[instrument(skip(self, cancellation), fields(network = %self.repo.network().name))]
    pub async fn create(
        &self,
        region: &str,
        regional_tgw_id: &str,
        cancellation: CancellationToken,
    ) -> Result<PeeringOutcome> {
        info!("Registering secondary region");
        let poller = Poller::new(self.policy, cancellation);
        let mut progress = PeeringProgress::starting_at(PeeringStep::NotStarted);

        let main_tgw_id = poller
            .guarded("primary region metadata", self.primary_tgw_id())
            .await?;
        let region_meta = poller
            .guarded("regional metadata", self.region_metadata(region))
            .await?;
        let regional_cidr: Ipv4Net = region_meta.regional_cidr.ok_or_else(|| {
            Error::IncompleteNetworkState(format!(
                "Region {} has no regional CIDR. Make sure the network was initialized with it",
                region
            ))
        })?;

        let main_route_table_id = poller
            .guarded("primary route table", async {
                self.primary.tgw_route_table_id(&main_tgw_id).await.map_err(Error::from)
            })
            .await?;
        let route_table_id = poller
            .guarded("regional route table", async {
                self.secondary.tgw_route_table_id(regional_tgw_id).await.map_err(Error::from)
            })
            .await?;

        // Not interrupted once sent, so the attachment id is never lost
        poller.ensure_active("peering attachment")?;
        let network = self.repo.network();
        let attachment_id = self
            .secondary
            .create_peering_attachment(&network.account, &network.region, &main_tgw_id, regional_tgw_id)
            .await?;
        progress.attachment_id = Some(attachment_id.clone());
        progress.advance()?;

        let established = self
            .establish(
                &poller,
                &mut progress,
                &attachment_id,
                region,
                regional_tgw_id,
                regional_cidr,
                &main_route_table_id,
            )
            .await;
        if let Err(err) = established {
            warn!(%attachment_id, error = %err, "Peering failed, removing attachment");
            self.abandon(region, &attachment_id, &region_meta.regional_tgw_id)
                .await;
            return Err(err);
        }

        info!(%attachment_id, %regional_cidr, "Secondary region registered");
        Ok(PeeringOutcome {
            route_table_id,
            attachment_id,
            progress,
        })
    }

    /// Steps after the attachment was requested
    #[allow(clippy::too_many_arguments)]
    async fn establish(
        &self,
        poller: &Poller,
        progress: &mut PeeringProgress,
        attachment: &str,
        region: &str,
        regional_tgw_id: &str,
        regional_cidr: Ipv4Net,
        main_route_table_id: &str,
    ) -> Result<()> {
        poller
            .guarded(
                "regional transit gateway record",
                self.repo.set_regional_tgw_id(region, regional_tgw_id),
            )
            .await?;

        self.wait_for_state(poller, attachment, AttachmentState::PendingAcceptance)
            .await?;
        progress.advance()?;

        poller
            .guarded("attachment acceptance", async {
                self.primary.accept_peering_attachment(attachment).await.map_err(Error::from)
            })
            .await?;

        self.wait_for_state(poller, attachment, AttachmentState::Available)
            .await?;
        progress.advance()?;

        poller
            .retry_transient(
                "route on primary transit gateway",
                |err| matches!(err, Error::Cloud(e) if e.is_incorrect_state()),
                || async move {
                    self.primary
                        .create_tgw_route(main_route_table_id, regional_cidr, attachment)
                        .await
                        .map_err(Error::from)
                },
            )
            .await?;
        progress.advance()?;
        Ok(())
    }

    /// Undo a create that failed after the attachment was requested
    ///
    /// Runs after cancellation too, so it ignores the token.
    async fn abandon(&self, region: &str, attachment_id: &str, previous_tgw_id: &str) {
        match self.secondary.delete_peering_attachment(attachment_id).await {
            Ok(()) => info!(attachment_id, "Abandoned attachment deleted"),
            Err(e) if e.is_not_found() => debug!(attachment_id, "Abandoned attachment already gone"),
            Err(e) => warn!(attachment_id, error = %e, "Failed to delete abandoned attachment"),
        }
        if let Err(e) = self.repo.set_regional_tgw_id(region, previous_tgw_id).await {
            warn!(region, error = %e, "Failed to restore regional transit gateway id");
        }
    }

    /// Remove the route and the peering attachment created by [`Self::create`]
    ///
    /// Routes or attachments that are already gone count as removed, so a
    /// failed delete can be repeated.
    #[instrument(skip(self, cancellation), fields(network = %self.repo.network().name))]
    pub async fn delete(
        &self,
        attachment_id: &str,
        cancellation: CancellationToken,
    ) -> Result<PeeringProgress> {
        info!("De-registering secondary region");
        let poller = Poller::new(self.policy, cancellation);
        let mut progress = PeeringProgress::starting_at(PeeringStep::RouteEstablished);
        progress.attachment_id = Some(attachment_id.to_string());

        let main_tgw_id = poller
            .guarded("primary region metadata", self.primary_tgw_id())
            .await?;
        let main_route_table_id = poller
            .guarded("primary route table", async {
                self.primary.tgw_route_table_id(&main_tgw_id).await.map_err(Error::from)
            })
            .await?;
        progress.detach()?;

        let routes = poller
            .guarded("route search", async {
                match self
                    .primary
                    .search_tgw_routes(&main_route_table_id, attachment_id)
                    .await
                {
                    Ok(routes) => Ok(routes),
                    Err(e) if e.is_not_found() => Ok(Vec::new()),
                    Err(e) => Err(Error::from(e)),
                }
            })
            .await?;
        if routes.is_empty() {
            warn!(attachment_id, "No route targets the attachment, skipping route removal");
        }
        for route in routes {
            let destination = route.destination;
            poller
                .guarded("route removal", async {
                    match self
                        .primary
                        .delete_tgw_route(&main_route_table_id, destination)
                        .await
                    {
                        Ok(()) => info!(%destination, "Route removed"),
                        Err(e) if e.is_not_found() => debug!(%destination, "Route already removed"),
                        Err(e) => return Err(Error::from(e)),
                    }
                    Ok(())
                })
                .await?;
        }

        poller
            .guarded("attachment removal", async {
                match self.secondary.delete_peering_attachment(attachment_id).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_not_found() => {
                        warn!(attachment_id, "Attachment already deleted");
                        Ok(())
                    }
                    Err(e) => Err(Error::from(e)),
                }
            })
            .await?;

        poller
            .wait_until(AttachmentState::Deleted.as_str(), || async move {
                Ok(matches!(
                    self.attachment_state(attachment_id).await?,
                    None | Some(AttachmentState::Deleted)
                ))
            })
            .await?;
        progress.advance()?;

        info!(attachment_id, "Secondary region de-registered");
        Ok(progress)
    }
}

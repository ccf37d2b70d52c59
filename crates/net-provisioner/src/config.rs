//! Provisioner configuration

use crate::models::Network;
use crate::reconciler::PollPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Account owning the ledger and the primary transit gateway
    pub admin_account: String,
    pub primary_region: String,
    pub network_name: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between attachment state polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Seconds before retrying a route on an unsettled attachment
    #[serde(default = "default_route_retry_delay")]
    pub route_retry_delay: u64,

    /// Overall budget of one reconciliation in seconds; unbounded when unset
    #[serde(default)]
    pub operation_deadline: Option<u64>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_route_retry_delay() -> u64 {
    10
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            admin_account: String::new(),
            primary_region: String::new(),
            network_name: String::new(),
            log_level: default_log_level(),
            poll_interval: default_poll_interval(),
            route_retry_delay: default_route_retry_delay(),
            operation_deadline: None,
        }
    }
}

impl ProvisionerConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup (environment-variable names)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::InvalidConfig(format!("{} is not set", key)))
        };
        let seconds = |key: &str| -> Result<Option<u64>> {
            lookup(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map_err(|e| Error::InvalidConfig(format!("{}={:?}: {}", key, v, e)))
                })
                .transpose()
        };

        let config = Self {
            admin_account: required("ADMIN_ACCOUNT")?,
            primary_region: required("PRIMARY_REGION")?,
            network_name: required("NETWORK_NAME")?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(default_log_level),
            poll_interval: seconds("POLL_INTERVAL_SECS")?.unwrap_or_else(default_poll_interval),
            route_retry_delay: seconds("ROUTE_RETRY_DELAY_SECS")?
                .unwrap_or_else(default_route_retry_delay),
            operation_deadline: seconds("OPERATION_DEADLINE_SECS")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the reconciler cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval == 0 {
            return Err(Error::InvalidConfig(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if self.network_name.contains('/') {
            return Err(Error::InvalidConfig(format!(
                "network name {:?} must not contain '/'",
                self.network_name
            )));
        }
        Ok(())
    }

    /// The configured network
    pub fn network(&self) -> Network {
        Network::new(
            self.admin_account.as_str(),
            self.primary_region.as_str(),
            self.network_name.as_str(),
        )
    }

    /// Polling policy for peering reconciliation
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval),
            retry_delay: Duration::from_secs(self.route_retry_delay),
            deadline: self.operation_deadline.map(Duration::from_secs),
        }
    }
}

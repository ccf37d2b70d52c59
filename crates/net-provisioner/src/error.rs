//! Error types for network provisioning

use thiserror::Error;

/// Result type for provisioning operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error reported by the cloud networking API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct CloudError {
    /// Provider error code (e.g. `IncorrectState`)
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl CloudError {
    /// Error code raised while an attachment has not settled yet
    pub const INCORRECT_STATE: &'static str = "IncorrectState";

    /// Create a new cloud error
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Transient failure of route creation against a not-yet-settled attachment
    pub fn is_incorrect_state(&self) -> bool {
        self.code == Self::INCORRECT_STATE
    }

    /// Target resource does not exist (any of the provider's `*NotFound` codes)
    pub fn is_not_found(&self) -> bool {
        self.code.ends_with("NotFound") || self.code.ends_with("NotFoundException")
    }
}

/// Provisioning errors
#[derive(Debug, Clone, Error)]
pub enum Error {
    // Address space errors
    #[error("Invalid address space: {0}")]
    InvalidAddressSpace(String),

    // Ledger errors
    #[error("Incomplete network state: {0}")]
    IncompleteNetworkState(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    // Cloud networking errors
    #[error("Cloud API error: {0}")]
    Cloud(#[from] CloudError),

    // Reconciliation protocol errors
    #[error("This resource only supports Create/Delete. If you are trying to Update, delete this resource and re-create it")]
    UnsupportedRequest,

    #[error("Unknown resource kind: {0}")]
    UnknownResourceKind(String),

    #[error("Invalid resource properties: {0}")]
    InvalidProperties(String),

    #[error("Invalid peering transition: {0}")]
    InvalidTransition(String),

    // Polling errors
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Operation cancelled while waiting for {0}")]
    Cancelled(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the failure means a prerequisite resource is missing
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Cloud(e) => e.is_not_found(),
            Error::IncompleteNetworkState(_) => true,
            _ => false,
        }
    }
}

impl From<ipnet::PrefixLenError> for Error {
    fn from(e: ipnet::PrefixLenError) -> Self {
        Error::InvalidAddressSpace(e.to_string())
    }
}

impl From<ipnet::AddrParseError> for Error {
    fn from(e: ipnet::AddrParseError) -> Self {
        Error::InvalidAddressSpace(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidProperties(e.to_string())
    }
}

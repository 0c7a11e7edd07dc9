//! Error types for Selkie
//!
//! TigerStyle: Explicit error types with context, using thiserror.
//!
//! The taxonomy has two tiers. Protocol violations indicate a kernel or peer
//! bug; continuing after one risks silent capability corruption, so they are
//! fatal and terminate the vat. Caller errors are bad local admin usage; they
//! are reported to the caller and the vat remains active.

use thiserror::Error;

/// Result type alias for Selkie operations
pub type Result<T> = std::result::Result<T, Error>;

/// Selkie error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Protocol Violations (fatal: the vat must halt)
    // =========================================================================
    #[error("meta-object {slot} not allowed in message args")]
    MetaObjectInArgs { slot: String },

    #[error("promise {promise} already resolved")]
    PromiseAlreadyResolved { promise: String },

    #[error("no pending resolution for promise {promise}")]
    UnknownPromise { promise: String },

    #[error("settlement for promise {promise} came from the wrong side: {reason}")]
    WrongDecider { promise: String, reason: String },

    #[error("remote {remote} referenced wire slot {slot} this vat never allocated")]
    UnknownWireSlot { remote: String, slot: String },

    #[error("kernel delivery targeted unknown slot {slot}")]
    UnknownTarget { slot: String },

    #[error("device slot {slot} may not cross a comms connection")]
    DeviceSlotInMessage { slot: String },

    #[error("malformed wire message: {reason}")]
    MalformedWireMessage { reason: String },

    #[error("clist mapping conflict for {slot}: {reason}")]
    ClistConflict { slot: String, reason: String },

    #[error("comms vat is terminated")]
    VatTerminated,

    // =========================================================================
    // Caller Errors (vat remains active)
    // =========================================================================
    #[error("unknown controller operation: {method}")]
    UnknownControllerOp { method: String },

    #[error("invalid arguments for controller operation {method}: {reason}")]
    InvalidControllerArgs { method: String, reason: String },

    #[error("remote not found: {name}")]
    RemoteNotFound { name: String },

    #[error("remote already exists: {name}")]
    RemoteAlreadyExists { name: String },

    #[error("invalid remote name: {name}, reason: {reason}")]
    InvalidRemoteName { name: String, reason: String },

    #[error("dropped export {slot} was not allocated by this vat")]
    DropExportNotOwned { slot: String },

    #[error("invalid slot {value}: {reason}")]
    InvalidSlot { value: String, reason: String },

    #[error("invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("too many {what}: {count} exceeds limit of {limit}")]
    LimitExceeded {
        what: String,
        count: usize,
        limit: usize,
    },
}

impl Error {
    /// Create a malformed wire message error
    pub fn malformed_wire(reason: impl Into<String>) -> Self {
        Self::MalformedWireMessage {
            reason: reason.into(),
        }
    }

    /// Create an invalid slot error
    pub fn invalid_slot(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSlot {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid controller arguments error
    pub fn invalid_controller_args(
        method: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidControllerArgs {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Create a limit exceeded error
    pub fn limit_exceeded(what: impl Into<String>, count: usize, limit: usize) -> Self {
        Self::LimitExceeded {
            what: what.into(),
            count,
            limit,
        }
    }

    /// Check if this error is a protocol violation that must terminate the vat
    ///
    /// The halt itself is the diagnostic signal; no best-effort continuation
    /// is attempted after a fatal error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MetaObjectInArgs { .. }
                | Self::PromiseAlreadyResolved { .. }
                | Self::UnknownPromise { .. }
                | Self::WrongDecider { .. }
                | Self::UnknownWireSlot { .. }
                | Self::UnknownTarget { .. }
                | Self::DeviceSlotInMessage { .. }
                | Self::MalformedWireMessage { .. }
                | Self::ClistConflict { .. }
                | Self::VatTerminated
        )
    }
}

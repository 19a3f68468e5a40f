//! Error surface of the scheduling core.
//!
//! Configuration errors are fatal at construction; everything transient is
//! retried on the next tick and only ever reaches the log.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A named marker could not be resolved to a position. Fatal when it is
    /// the base anchor of a controller under construction.
    #[error("marker '{0}' could not be resolved")]
    UnresolvedMarker(String),

    /// A lease request's anchor could not be resolved. The request is
    /// rejected, nothing is registered.
    #[error("lease anchor could not be resolved: {0}")]
    UnresolvedAnchor(String),

    /// Invalid controller configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

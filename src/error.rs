//! Error taxonomy for the provisioning engine.
//!
//! Validation errors (`InvalidField`, `TopologyOutOfRange`) are raised at the
//! input boundary and resolved there by re-prompting. Lifecycle errors carry
//! the label of the unit they belong to so a failure on one unit never hides
//! which sibling it came from.

use std::path::PathBuf;

use thiserror::Error;

use crate::profile::Profile;

/// Errors raised by the provisioning core.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A user supplied identity, SAN or node value failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    /// Requested node/server count lies outside the profile bound.
    #[error("{profile} supports 1 to {max} nodes, {requested} requested")]
    TopologyOutOfRange {
        profile: Profile,
        requested: usize,
        max: usize,
    },

    /// A crypto backend call failed for a unit.
    #[error("{unit}: {operation} failed: {message}")]
    CryptoBackendFailure {
        unit: String,
        operation: &'static str,
        message: String,
    },

    /// The placed certificate does not belong to the generated key.
    #[error("{unit}: certificate does not match the generated private key")]
    KeyCertMismatch { unit: String },

    /// An artifact expected on disk is absent.
    #[error("{unit}: expected artifact not found at {}", path.display())]
    MissingArtifact { unit: String, path: PathBuf },

    /// PKCS#12 packaging or verification failed.
    #[error("{unit}: conversion failed: {message}")]
    ConversionError { unit: String, message: String },

    /// An operation was requested from a state that does not allow it.
    #[error("{unit}: cannot {operation} while {from}")]
    InvalidTransition {
        unit: String,
        from: String,
        operation: &'static str,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    pub(crate) fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the operator can fix the problem and simply try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidField { .. }
                | Self::TopologyOutOfRange { .. }
                | Self::MissingArtifact { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

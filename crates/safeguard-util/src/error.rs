//! Error types for safeguard

use thiserror::Error;

use crate::PackageId;

/// Errors the enforcement engine reports to its caller
#[derive(Debug, Error)]
pub enum SafeguardError {
    #[error("Invalid package id: {0:?}")]
    InvalidPackage(String),

    #[error("Package is exempt from enforcement: {0}")]
    ExemptPackage(PackageId),

    #[error("Presentation failed: {0}")]
    PresentationFailed(String),
}

impl SafeguardError {
    pub fn presentation(msg: impl Into<String>) -> Self {
        Self::PresentationFailed(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SafeguardError>;

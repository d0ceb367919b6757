use rust_decimal::Decimal;

use super::configuration::ConfigViolation;
use super::domain::{CollectionStatus, DevelopmentId, Phase};
use super::repository::RepositoryError;

/// Failure taxonomy of the commission engine.
#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error("no commission configuration for development {development} and no global default")]
    ConfigNotFound { development: DevelopmentId },
    #[error("invalid commission configuration: {0}")]
    InvalidConfig(#[from] ConfigViolation),
    #[error("{phase} phase distributions sum to {actual}% but {expected}% is required")]
    DistributionImbalance {
        phase: Phase,
        expected: Decimal,
        actual: Decimal,
    },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("collection status cannot move from {from} to {to}")]
    InvalidTransition {
        from: CollectionStatus,
        to: CollectionStatus,
    },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CommissionError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

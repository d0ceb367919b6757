use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Actor, CollectionStatus, CommissionDistribution, DistributionId, PartnerCommission,
    PartnerCommissionId, Phase, PhaseCollection,
};
use super::error::CommissionError;

/// Share whose collection status is being advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CollectionTarget {
    PartnerCommission(PartnerCommissionId),
    Distribution(DistributionId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub collection_status: CollectionStatus,
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum CollectionUpdate {
    PartnerCommission(PartnerCommission),
    Distribution(CommissionDistribution),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Advance,
    Unchanged,
}

impl CollectionStatus {
    /// Forward-only: `pending_invoice → invoiced → collected`, skipping ahead allowed.
    pub fn can_transition_to(self, next: CollectionStatus) -> bool {
        next.rank() >= self.rank()
    }
}

pub fn check_transition(
    current: CollectionStatus,
    next: CollectionStatus,
) -> Result<TransitionKind, CommissionError> {
    if current == next {
        Ok(TransitionKind::Unchanged)
    } else if current.can_transition_to(next) {
        Ok(TransitionKind::Advance)
    } else {
        Err(CommissionError::InvalidTransition {
            from: current,
            to: next,
        })
    }
}

pub(crate) fn stamped(status: CollectionStatus, actor: &Actor, now: DateTime<Utc>) -> PhaseCollection {
    PhaseCollection {
        status,
        updated_by: Some(actor.user_id.clone()),
        updated_at: Some(now),
    }
}

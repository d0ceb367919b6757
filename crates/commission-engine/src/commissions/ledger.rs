use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amounts::{
    checked_ratio, is_valid_percent, percent_of, round_amount, round_percent, HUNDRED,
    PERCENT_SCALE,
};
use super::domain::{
    Actor, AdjustmentType, CommissionAdjustment, CommissionDistribution, PercentBasis, RoleType,
    UserId,
};
use super::error::CommissionError;
use super::repository::NewAdjustment;

/// Manual correction applied to one distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdjustmentChange {
    /// New percent of the phase value.
    Percent { new_percent: Decimal },
    /// Absolute amount override; the percent is re-derived from the phase value.
    Amount { new_amount: Decimal },
    Role {
        new_role: RoleType,
        #[serde(default)]
        new_recipient: Option<UserId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    #[serde(flatten)]
    pub change: AdjustmentChange,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentOutcome {
    pub adjustment: CommissionAdjustment,
    pub distribution: CommissionDistribution,
}

/// Audit entry and updated distribution computed for one adjustment, not yet written.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentPlan {
    pub entry: NewAdjustment,
    pub updated: CommissionDistribution,
}

/// Computes the before/after state of an adjustment against the distribution's phase value.
pub fn plan_adjustment(
    current: &CommissionDistribution,
    phase_value: Decimal,
    request: AdjustmentRequest,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<AdjustmentPlan, CommissionError> {
    let AdjustmentRequest {
        change,
        reason,
        notes,
    } = request;

    let reason = reason.trim().to_string();
    if reason.is_empty() {
        return Err(CommissionError::validation("adjustment reason is required"));
    }

    let mut updated = current.clone();
    updated.updated_at = now;
    updated.revision = current.revision + 1;

    let (adjustment_type, old_value, new_value, old_role_type, new_role_type) = match change {
        AdjustmentChange::Percent { new_percent } => {
            if !is_valid_percent(new_percent) {
                return Err(CommissionError::validation(format!(
                    "new_percent must be between 0 and 100 (found {new_percent})"
                )));
            }
            if new_percent.normalize().scale() > PERCENT_SCALE {
                return Err(CommissionError::validation(format!(
                    "new_percent allows at most {PERCENT_SCALE} decimal places (found {new_percent})"
                )));
            }
            let new_percent = new_percent.normalize();
            updated.percent_assigned = new_percent;
            updated.amount_calculated = round_amount(percent_of(new_percent, phase_value)?);
            updated.basis = PercentBasis::Phase;
            updated.base_percent = updated.percent_assigned;
            (
                AdjustmentType::PercentChange,
                Some(current.percent_assigned),
                Some(updated.percent_assigned),
                None,
                None,
            )
        }
        AdjustmentChange::Amount { new_amount } => {
            if new_amount.is_sign_negative() {
                return Err(CommissionError::validation(format!(
                    "new_amount must not be negative (found {new_amount})"
                )));
            }
            let new_amount = round_amount(new_amount);
            let new_percent = if phase_value.is_zero() {
                if !new_amount.is_zero() {
                    return Err(CommissionError::validation(format!(
                        "{} phase has no value to assign {new_amount} from",
                        current.phase
                    )));
                }
                Decimal::ZERO
            } else if new_amount > phase_value {
                return Err(CommissionError::validation(format!(
                    "new_amount {new_amount} exceeds the {} phase value {phase_value}",
                    current.phase
                )));
            } else {
                round_percent(checked_ratio(new_amount, phase_value)? * HUNDRED)
            };
            updated.amount_calculated = new_amount;
            updated.percent_assigned = new_percent;
            updated.basis = PercentBasis::Phase;
            updated.base_percent = new_percent;
            (
                AdjustmentType::AmountChange,
                Some(current.amount_calculated),
                Some(new_amount),
                None,
                None,
            )
        }
        AdjustmentChange::Role {
            new_role,
            new_recipient,
        } => {
            if new_role == current.role_type {
                return Err(CommissionError::validation(format!(
                    "distribution is already assigned to {new_role}"
                )));
            }
            if new_role.phase() != current.phase {
                return Err(CommissionError::validation(format!(
                    "{new_role} is not paid from the {} phase",
                    current.phase
                )));
            }
            updated.role_type = new_role;
            if new_recipient.is_some() {
                updated.recipient = new_recipient;
            }
            (
                AdjustmentType::RoleReassignment,
                None,
                None,
                Some(current.role_type),
                Some(new_role),
            )
        }
    };

    let entry = NewAdjustment {
        distribution_id: current.id,
        sale_id: current.sale_id,
        adjustment_type,
        old_value,
        new_value,
        old_role_type,
        new_role_type,
        amount_impact: updated.amount_calculated - current.amount_calculated,
        adjusted_by: actor.user_id.clone(),
        adjusted_at: now,
        reason,
        notes: notes.filter(|text| !text.trim().is_empty()),
    };

    Ok(AdjustmentPlan { entry, updated })
}

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::amounts::{is_valid_percent, percent_of, round_amount, within, HUNDRED};
use super::domain::{PartnerId, PartnerShare, PhaseValues};
use super::error::CommissionError;

/// Participations may drift this far from 100% before a warning is logged.
const PARTICIPATION_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// A partner's computed share of both phases, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerAllocation {
    pub partner_id: PartnerId,
    pub partner_name: String,
    pub participacion: Decimal,
    pub sale_phase_amount: Decimal,
    pub post_sale_phase_amount: Decimal,
    pub amount: Decimal,
}

pub struct PartnerAllocator;

impl PartnerAllocator {
    /// Allocates both phases by participation. No partners is a valid, empty allocation.
    pub fn allocate(
        phases: PhaseValues,
        partners: &[PartnerShare],
    ) -> Result<Vec<PartnerAllocation>, CommissionError> {
        validate_shares(partners)?;

        let combined = phases.total();
        let allocations = partners
            .iter()
            .map(|share| {
                let amount = round_amount(percent_of(share.participacion, combined)?);
                let sale_phase_amount =
                    round_amount(percent_of(share.participacion, phases.sale_phase)?);
                Ok(PartnerAllocation {
                    partner_id: share.partner_id.clone(),
                    partner_name: share.partner_name.clone(),
                    participacion: share.participacion,
                    sale_phase_amount,
                    post_sale_phase_amount: amount - sale_phase_amount,
                    amount,
                })
            })
            .collect::<Result<Vec<_>, CommissionError>>()?;

        Ok(allocations)
    }
}

/// Rejects malformed shares and warns when participations do not add up to roughly 100%.
pub fn validate_shares(partners: &[PartnerShare]) -> Result<(), CommissionError> {
    let mut seen = HashSet::new();
    for share in partners {
        if share.partner_id.0.trim().is_empty() {
            return Err(CommissionError::validation("partner_id must not be empty"));
        }
        if !is_valid_percent(share.participacion) {
            return Err(CommissionError::validation(format!(
                "participacion of partner {} must be between 0 and 100 (found {})",
                share.partner_id, share.participacion
            )));
        }
        if !seen.insert(&share.partner_id) {
            return Err(CommissionError::validation(format!(
                "partner {} listed more than once",
                share.partner_id
            )));
        }
    }

    if !partners.is_empty() {
        let total: Decimal = partners.iter().map(|share| share.participacion).sum();
        if !within(total, HUNDRED, PARTICIPATION_TOLERANCE) {
            warn!(%total, partners = partners.len(), "partner participations do not sum to 100%");
        }
    }
    Ok(())
}

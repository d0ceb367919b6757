use rust_decimal::Decimal;
use serde::Serialize;

use super::amounts::{
    checked_sum, percent_of, round_amount, within, AMOUNT_TOLERANCE, HUNDRED, PERCENT_TOLERANCE,
};
use super::calculator::expected_sale_phase_percent;
use super::domain::{CommissionDistribution, CommissionSale, PartnerCommission, Phase, SaleId};
use super::error::CommissionError;

/// Sums of one phase's distributions compared against what the phase should pay out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseBalance {
    pub phase: Phase,
    pub phase_value: Decimal,
    pub expected_percent: Decimal,
    pub percent_total: Decimal,
    pub expected_amount: Decimal,
    pub amount_total: Decimal,
    pub roles: usize,
    pub balanced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub sale_id: SaleId,
    pub commission_total: Decimal,
    pub phases: Vec<PhaseBalance>,
    pub partner_participation_total: Decimal,
    pub partner_amount_total: Decimal,
    pub adjustments: usize,
    /// False once adjustments or drift leave a phase outside tolerance.
    pub balanced: bool,
}

/// Compares stored distributions of a calculated sale against its snapshotted configuration.
pub fn reconcile(
    sale: &CommissionSale,
    distributions: &[CommissionDistribution],
    partner_commissions: &[PartnerCommission],
    adjustments: usize,
) -> Result<ReconciliationReport, CommissionError> {
    let (phase_values, snapshot, commission_total) = match (
        sale.phase_values(),
        sale.config_snapshot.as_ref(),
        sale.commission_total,
    ) {
        (Some(values), Some(snapshot), Some(total)) => (values, snapshot, total),
        _ => {
            return Err(CommissionError::validation(format!(
                "sale {} has not been calculated",
                sale.id
            )))
        }
    };

    // Fixed at calculation time; re-ingesting the sale with another advisor does not move it.
    let expected_sale_phase = sale
        .expected_sale_phase_percent
        .unwrap_or_else(|| expected_sale_phase_percent(sale, snapshot));

    let phases = Phase::ordered()
        .into_iter()
        .map(|phase| {
            let rows: Vec<_> = distributions
                .iter()
                .filter(|distribution| distribution.phase == phase)
                .collect();
            let expected_percent = match phase {
                Phase::Sale => expected_sale_phase,
                Phase::PostSale => HUNDRED,
            };
            let phase_value = phase_values.get(phase);
            let percent_total = checked_sum(rows.iter().map(|row| row.percent_assigned))?;
            let amount_total = checked_sum(rows.iter().map(|row| row.amount_calculated))?;
            let expected_amount = round_amount(percent_of(expected_percent, phase_value)?);
            let roles = Decimal::from(rows.len().max(1));
            Ok(PhaseBalance {
                phase,
                phase_value,
                expected_percent,
                percent_total,
                expected_amount,
                amount_total,
                roles: rows.len(),
                balanced: within(percent_total, expected_percent, PERCENT_TOLERANCE * roles)
                    && within(amount_total, expected_amount, AMOUNT_TOLERANCE * roles),
            })
        })
        .collect::<Result<Vec<_>, CommissionError>>()?;

    let balanced = phases.iter().all(|phase| phase.balanced);
    Ok(ReconciliationReport {
        sale_id: sale.id,
        commission_total,
        partner_participation_total: checked_sum(
            partner_commissions
                .iter()
                .map(|commission| commission.participacion),
        )?,
        partner_amount_total: checked_sum(
            partner_commissions
                .iter()
                .map(|commission| commission.amount),
        )?,
        phases,
        adjustments,
        balanced,
    })
}

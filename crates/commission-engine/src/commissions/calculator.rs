//! Turns a sale and its effective configuration into per-role, per-phase distributions.
//!
//! `percent_assigned` is always expressed against the distribution's phase value so that
//! `amount_calculated = percent_assigned / 100 × phase_value` holds for every row, whatever the
//! role's configured basis (pool, phase or total commission).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amounts::{
    checked_sum, percent_of, round_amount, round_percent, within, AMOUNT_TOLERANCE, HUNDRED,
    PERCENT_TOLERANCE,
};
use super::configuration::{ConfigViolation, EffectiveConfig};
use super::domain::{CommissionSale, PercentBasis, Phase, PhaseValues, RoleType, UserId};
use super::error::CommissionError;

/// Distribution computed by the calculator, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionDraft {
    pub role_type: RoleType,
    pub phase: Phase,
    pub recipient: Option<UserId>,
    pub basis: PercentBasis,
    pub base_percent: Decimal,
    pub percent_assigned: Decimal,
    pub amount_calculated: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub commission_total: Decimal,
    pub commission_sale_phase: Decimal,
    pub commission_post_sale_phase: Decimal,
    /// Percent of the sale phase the distributions are expected to cover.
    pub expected_sale_phase_percent: Decimal,
    pub distributions: Vec<DistributionDraft>,
}

impl CommissionBreakdown {
    pub fn phase_values(&self) -> PhaseValues {
        PhaseValues {
            sale_phase: self.commission_sale_phase,
            post_sale_phase: self.commission_post_sale_phase,
        }
    }

    pub fn distribution(&self, role: RoleType) -> Option<&DistributionDraft> {
        self.distributions
            .iter()
            .find(|draft| draft.role_type == role)
    }

    pub fn amount_for(&self, phase: Phase) -> Decimal {
        self.distributions
            .iter()
            .filter(|draft| draft.phase == phase)
            .map(|draft| draft.amount_calculated)
            .sum()
    }
}

/// Percent of the sale phase the distributions should cover under the advisor policy.
pub fn expected_sale_phase_percent(sale: &CommissionSale, config: &EffectiveConfig) -> Decimal {
    let settings = &config.config;
    let advisor = settings.external_advisor();
    if advisor.is_zero() || sale.has_external_advisor() || settings.redistribute_unused_pool {
        HUNDRED
    } else {
        HUNDRED - settings.sale_pool_total_percent * advisor / HUNDRED
    }
}

pub struct DistributionCalculator;

impl DistributionCalculator {
    pub fn calculate(
        sale: &CommissionSale,
        config: &EffectiveConfig,
    ) -> Result<CommissionBreakdown, CommissionError> {
        let settings = &config.config;
        let commission_total = sale.commission_total.ok_or_else(|| {
            CommissionError::validation(format!(
                "sale {} has neither commission_total nor commission_rate_percent",
                sale.external_deal_id
            ))
        })?;
        if commission_total.is_sign_negative() {
            return Err(CommissionError::validation(format!(
                "sale {} has a negative commission_total",
                sale.external_deal_id
            )));
        }
        if settings.phase_sale_percent.is_zero() {
            return Err(ConfigViolation::EmptySalePhase.into());
        }

        let commission_sale_phase =
            round_amount(percent_of(settings.phase_sale_percent, commission_total)?);
        let commission_post_sale_phase = commission_total - commission_sale_phase;

        let mut sale_rows = Vec::new();

        let advisor_percent = settings.external_advisor();
        let advisor_active = sale.has_external_advisor() && !advisor_percent.is_zero();
        let remaining = settings.sale_manager_percent + settings.deal_owner_percent;
        let pool_denominator = if advisor_active
            || advisor_percent.is_zero()
            || !settings.redistribute_unused_pool
            || remaining.is_zero()
        {
            HUNDRED
        } else {
            remaining
        };

        let mut pool_roles = vec![
            (
                RoleType::SaleManager,
                settings.sale_manager_percent,
                None::<UserId>,
            ),
            (
                RoleType::DealOwner,
                settings.deal_owner_percent,
                Some(sale.propietario_deal.clone()),
            ),
        ];
        if advisor_active {
            pool_roles.push((
                RoleType::ExternalAdvisor,
                advisor_percent,
                sale.asesor_externo.clone(),
            ));
        }

        for (role, role_percent, recipient) in pool_roles {
            let of_phase = settings.sale_pool_total_percent * role_percent / pool_denominator;
            sale_rows.push(draft(
                role,
                Phase::Sale,
                recipient,
                PercentBasis::Pool,
                role_percent,
                of_phase,
                commission_sale_phase,
            )?);
        }

        for role in [RoleType::OperationsCoordinator, RoleType::Marketing] {
            let role_percent = config.indirect_percent(role).unwrap_or(Decimal::ZERO);
            let of_phase = role_percent * HUNDRED / settings.phase_sale_percent;
            let mut row = draft(
                role,
                Phase::Sale,
                None,
                PercentBasis::Total,
                role_percent,
                of_phase,
                commission_sale_phase,
            )?;
            // Paid on the total so the amount does not inherit phase rounding.
            row.amount_calculated = round_amount(percent_of(role_percent, commission_total)?);
            sale_rows.push(row);
        }

        let mut post_rows = vec![
            draft(
                RoleType::LegalManager,
                Phase::PostSale,
                None,
                PercentBasis::Phase,
                settings.legal_manager_percent,
                settings.legal_manager_percent,
                commission_post_sale_phase,
            )?,
            draft(
                RoleType::PostSaleCoordinator,
                Phase::PostSale,
                None,
                PercentBasis::Phase,
                settings.post_sale_coordinator_percent,
                settings.post_sale_coordinator_percent,
                commission_post_sale_phase,
            )?,
        ];
        for (role, optional) in settings.optional_roles() {
            if optional.enabled {
                post_rows.push(draft(
                    role,
                    Phase::PostSale,
                    None,
                    PercentBasis::Phase,
                    optional.percent,
                    optional.percent,
                    commission_post_sale_phase,
                )?);
            }
        }

        let expected_sale_phase_percent = expected_sale_phase_percent(sale, config);
        ensure_balanced(
            Phase::Sale,
            &sale_rows,
            expected_sale_phase_percent,
            commission_sale_phase,
        )?;
        ensure_balanced(
            Phase::PostSale,
            &post_rows,
            HUNDRED,
            commission_post_sale_phase,
        )?;

        sale_rows.extend(post_rows);

        Ok(CommissionBreakdown {
            commission_total,
            commission_sale_phase,
            commission_post_sale_phase,
            expected_sale_phase_percent,
            distributions: sale_rows,
        })
    }
}

/// The amount is derived from the unrounded percent; only the stored percent is rounded.
fn draft(
    role_type: RoleType,
    phase: Phase,
    recipient: Option<UserId>,
    basis: PercentBasis,
    base_percent: Decimal,
    percent_of_phase: Decimal,
    phase_value: Decimal,
) -> Result<DistributionDraft, CommissionError> {
    Ok(DistributionDraft {
        role_type,
        phase,
        recipient,
        basis,
        base_percent,
        percent_assigned: round_percent(percent_of_phase),
        amount_calculated: round_amount(percent_of(percent_of_phase, phase_value)?),
    })
}

fn ensure_balanced(
    phase: Phase,
    rows: &[DistributionDraft],
    expected_percent: Decimal,
    phase_value: Decimal,
) -> Result<(), CommissionError> {
    let roles = Decimal::from(rows.len().max(1));
    let percent_total: Decimal = rows.iter().map(|row| row.percent_assigned).sum();
    if !within(percent_total, expected_percent, PERCENT_TOLERANCE * roles) {
        return Err(CommissionError::DistributionImbalance {
            phase,
            expected: expected_percent,
            actual: percent_total,
        });
    }

    let amount_total = checked_sum(rows.iter().map(|row| row.amount_calculated))?;
    let expected_amount = round_amount(percent_of(expected_percent, phase_value)?);
    if !within(amount_total, expected_amount, AMOUNT_TOLERANCE * roles) {
        return Err(CommissionError::DistributionImbalance {
            phase,
            expected: expected_percent,
            actual: percent_total,
        });
    }
    Ok(())
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::super::amounts::{is_valid_percent, within, HUNDRED, PERCENT_TOLERANCE};
use super::super::domain::{DevelopmentId, RoleType, UserId};

/// Optional post-sale role, counted only while enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OptionalRoleConfig {
    pub enabled: bool,
    pub percent: Decimal,
}

impl OptionalRoleConfig {
    pub fn enabled(percent: Decimal) -> Self {
        Self {
            enabled: true,
            percent,
        }
    }

    pub fn effective_percent(&self) -> Decimal {
        if self.enabled {
            self.percent
        } else {
            Decimal::ZERO
        }
    }
}

/// Commission split for one development, or the global default when `development` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionConfig {
    #[serde(default)]
    pub development: Option<DevelopmentId>,
    pub phase_sale_percent: Decimal,
    pub phase_post_sale_percent: Decimal,
    pub sale_pool_total_percent: Decimal,
    pub sale_manager_percent: Decimal,
    pub deal_owner_percent: Decimal,
    #[serde(default)]
    pub external_advisor_percent: Option<Decimal>,
    /// Renormalise sale manager and deal owner when the sale has no external advisor.
    #[serde(default)]
    pub redistribute_unused_pool: bool,
    #[serde(default)]
    pub operations_coordinator_percent: Option<Decimal>,
    #[serde(default)]
    pub marketing_percent: Option<Decimal>,
    pub legal_manager_percent: Decimal,
    pub post_sale_coordinator_percent: Decimal,
    #[serde(default)]
    pub customer_service: OptionalRoleConfig,
    #[serde(default)]
    pub deliveries: OptionalRoleConfig,
    #[serde(default)]
    pub bonds: OptionalRoleConfig,
}

impl CommissionConfig {
    pub fn external_advisor(&self) -> Decimal {
        self.external_advisor_percent.unwrap_or(Decimal::ZERO)
    }

    pub fn pool_roles_total(&self) -> Decimal {
        self.sale_manager_percent + self.deal_owner_percent + self.external_advisor()
    }

    pub fn optional_roles(&self) -> [(RoleType, OptionalRoleConfig); 3] {
        [
            (RoleType::CustomerService, self.customer_service),
            (RoleType::Deliveries, self.deliveries),
            (RoleType::Bonds, self.bonds),
        ]
    }

    pub fn post_sale_total(&self) -> Decimal {
        self.legal_manager_percent
            + self.post_sale_coordinator_percent
            + self
                .optional_roles()
                .iter()
                .map(|(_, role)| role.effective_percent())
                .sum::<Decimal>()
    }

    /// Share of the sale phase claimed by the pool plus the indirect roles.
    pub fn sale_phase_allocation(&self, operations: Decimal, marketing: Decimal) -> Decimal {
        if self.phase_sale_percent.is_zero() {
            return self.sale_pool_total_percent;
        }
        self.sale_pool_total_percent + (operations + marketing) * HUNDRED / self.phase_sale_percent
    }

    /// Checks every invariant that does not depend on layered indirect percentages. When the
    /// config sets both indirect roles itself, the sale-phase allocation is checked as well.
    pub fn validate(&self) -> Result<(), ConfigViolation> {
        let mut fields = vec![
            ("phase_sale_percent", self.phase_sale_percent),
            ("phase_post_sale_percent", self.phase_post_sale_percent),
            ("sale_pool_total_percent", self.sale_pool_total_percent),
            ("sale_manager_percent", self.sale_manager_percent),
            ("deal_owner_percent", self.deal_owner_percent),
            ("legal_manager_percent", self.legal_manager_percent),
            (
                "post_sale_coordinator_percent",
                self.post_sale_coordinator_percent,
            ),
            ("customer_service.percent", self.customer_service.percent),
            ("deliveries.percent", self.deliveries.percent),
            ("bonds.percent", self.bonds.percent),
        ];
        if let Some(value) = self.external_advisor_percent {
            fields.push(("external_advisor_percent", value));
        }
        if let Some(value) = self.operations_coordinator_percent {
            fields.push(("operations_coordinator_percent", value));
        }
        if let Some(value) = self.marketing_percent {
            fields.push(("marketing_percent", value));
        }
        for (field, value) in fields {
            if !is_valid_percent(value) {
                return Err(ConfigViolation::PercentOutOfRange { field, value });
            }
        }

        if self.phase_sale_percent + self.phase_post_sale_percent != HUNDRED {
            return Err(ConfigViolation::PhaseSplit {
                sale: self.phase_sale_percent,
                post_sale: self.phase_post_sale_percent,
            });
        }
        if self.phase_sale_percent.is_zero() {
            return Err(ConfigViolation::EmptySalePhase);
        }

        let pool_total = self.pool_roles_total();
        if !within(pool_total, HUNDRED, PERCENT_TOLERANCE) {
            return Err(ConfigViolation::PoolRoles { total: pool_total });
        }

        let post_sale_total = self.post_sale_total();
        if !within(post_sale_total, HUNDRED, PERCENT_TOLERANCE) {
            return Err(ConfigViolation::PostSaleRoles {
                total: post_sale_total,
            });
        }

        if let (Some(operations), Some(marketing)) =
            (self.operations_coordinator_percent, self.marketing_percent)
        {
            self.validate_sale_phase(operations, marketing)?;
        }

        Ok(())
    }

    pub(crate) fn validate_sale_phase(
        &self,
        operations: Decimal,
        marketing: Decimal,
    ) -> Result<(), ConfigViolation> {
        let allocation = self.sale_phase_allocation(operations, marketing);
        if within(allocation, HUNDRED, PERCENT_TOLERANCE * Decimal::TWO) {
            Ok(())
        } else {
            Err(ConfigViolation::SalePhaseAllocation { total: allocation })
        }
    }
}

/// Global percentage override for an indirect role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionGlobalConfig {
    pub role: RoleType,
    pub percent: Decimal,
    #[serde(default)]
    pub updated_by: Option<UserId>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CommissionGlobalConfig {
    pub fn validate(&self) -> Result<(), ConfigViolation> {
        if !self.role.is_indirect() {
            return Err(ConfigViolation::NotAnIndirectRole(self.role));
        }
        if !is_valid_percent(self.percent) {
            return Err(ConfigViolation::PercentOutOfRange {
                field: self.role.label(),
                value: self.percent,
            });
        }
        Ok(())
    }
}

/// Configuration invariant breaches. These are configuration errors, never per-sale errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigViolation {
    #[error("{field} must be between 0 and 100 (found {value})")]
    PercentOutOfRange { field: &'static str, value: Decimal },
    #[error("phase percentages must sum to 100 (sale {sale}, post-sale {post_sale})")]
    PhaseSplit { sale: Decimal, post_sale: Decimal },
    #[error("sale phase percentage must be greater than zero")]
    EmptySalePhase,
    #[error("sale manager, deal owner and external advisor must sum to 100 (found {total})")]
    PoolRoles { total: Decimal },
    #[error("pool and indirect roles must cover 100% of the sale phase (found {total})")]
    SalePhaseAllocation { total: Decimal },
    #[error("enabled post-sale roles must sum to 100 (found {total})")]
    PostSaleRoles { total: Decimal },
    #[error("{0} cannot be overridden globally")]
    NotAnIndirectRole(RoleType),
}

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::configuration::EffectiveConfig;

macro_rules! display_id {
    ($($name:ident),+ $(,)?) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )+
    };
}

/// Store-assigned identifier of a commission sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistributionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartnerCommissionId(pub u64);

/// Real-estate project (desarrollo) that scopes commission configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevelopmentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartnerId(pub String);

/// Identity resolved by the surrounding auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

display_id!(
    SaleId,
    DistributionId,
    AdjustmentId,
    PartnerCommissionId,
    DevelopmentId,
    ProductId,
    PartnerId,
    UserId,
);

/// Payout stage of a sale's commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[serde(alias = "sale_phase")]
    Sale,
    #[serde(alias = "post_sale_phase")]
    PostSale,
}

impl Phase {
    pub const fn ordered() -> [Self; 2] {
        [Self::Sale, Self::PostSale]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::PostSale => "post_sale",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Internal stakeholder roles that receive a share of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    SaleManager,
    DealOwner,
    ExternalAdvisor,
    OperationsCoordinator,
    Marketing,
    LegalManager,
    PostSaleCoordinator,
    CustomerService,
    Deliveries,
    Bonds,
}

impl RoleType {
    pub const fn ordered() -> [Self; 10] {
        [
            Self::SaleManager,
            Self::DealOwner,
            Self::ExternalAdvisor,
            Self::OperationsCoordinator,
            Self::Marketing,
            Self::LegalManager,
            Self::PostSaleCoordinator,
            Self::CustomerService,
            Self::Deliveries,
            Self::Bonds,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::SaleManager => "sale_manager",
            Self::DealOwner => "deal_owner",
            Self::ExternalAdvisor => "external_advisor",
            Self::OperationsCoordinator => "operations_coordinator",
            Self::Marketing => "marketing",
            Self::LegalManager => "legal_manager",
            Self::PostSaleCoordinator => "post_sale_coordinator",
            Self::CustomerService => "customer_service",
            Self::Deliveries => "deliveries",
            Self::Bonds => "bonds",
        }
    }

    /// Phase whose value the role is paid from.
    pub const fn phase(self) -> Phase {
        match self {
            Self::SaleManager
            | Self::DealOwner
            | Self::ExternalAdvisor
            | Self::OperationsCoordinator
            | Self::Marketing => Phase::Sale,
            Self::LegalManager
            | Self::PostSaleCoordinator
            | Self::CustomerService
            | Self::Deliveries
            | Self::Bonds => Phase::PostSale,
        }
    }

    /// Indirect roles are configured against the total commission, not the pool.
    pub const fn is_indirect(self) -> bool {
        matches!(self, Self::OperationsCoordinator | Self::Marketing)
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a role's configured percentage was expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentBasis {
    Pool,
    Phase,
    Total,
}

/// Invoicing lifecycle of a commission share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    PendingInvoice,
    Invoiced,
    Collected,
}

impl CollectionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PendingInvoice => "pending_invoice",
            Self::Invoiced => "invoiced",
            Self::Collected => "collected",
        }
    }

    pub(crate) const fn rank(self) -> u8 {
        match self {
            Self::PendingInvoice => 0,
            Self::Invoiced => 1,
            Self::Collected => 2,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Collected)
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Collection state of one phase of one share, stamped with its last editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCollection {
    pub status: CollectionStatus,
    pub updated_by: Option<UserId>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for PhaseCollection {
    fn default() -> Self {
        Self {
            status: CollectionStatus::PendingInvoice,
            updated_by: None,
            updated_at: None,
        }
    }
}

/// Acting user for mutating calls. Authorization happens before the engine is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    #[serde(default)]
    pub role: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role: None,
        }
    }
}

/// Values of both phases for a calculated sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseValues {
    pub sale_phase: Decimal,
    pub post_sale_phase: Decimal,
}

impl PhaseValues {
    pub fn get(&self, phase: Phase) -> Decimal {
        match phase {
            Phase::Sale => self.sale_phase,
            Phase::PostSale => self.post_sale_phase,
        }
    }

    pub fn total(&self) -> Decimal {
        self.sale_phase + self.post_sale_phase
    }
}

/// Closed-won sale as delivered by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleInput {
    pub external_deal_id: String,
    pub desarrollo: DevelopmentId,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub valor_total: Decimal,
    #[serde(default)]
    pub metros_cuadrados: Option<Decimal>,
    #[serde(default)]
    pub precio_por_m2: Option<Decimal>,
    pub fecha_firma: NaiveDate,
    pub propietario_deal: UserId,
    #[serde(default)]
    pub asesor_externo: Option<UserId>,
    #[serde(default)]
    pub commission_total: Option<Decimal>,
    #[serde(default)]
    pub commission_rate_percent: Option<Decimal>,
}

/// Validated sale facts ready for an upsert keyed by `external_deal_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleFacts {
    pub external_deal_id: String,
    pub desarrollo: DevelopmentId,
    pub product_id: Option<ProductId>,
    pub valor_total: Decimal,
    pub metros_cuadrados: Option<Decimal>,
    pub precio_por_m2: Option<Decimal>,
    pub fecha_firma: NaiveDate,
    pub propietario_deal: UserId,
    pub asesor_externo: Option<UserId>,
    pub commission_total: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionSale {
    pub id: SaleId,
    pub external_deal_id: String,
    pub desarrollo: DevelopmentId,
    pub product_id: Option<ProductId>,
    pub valor_total: Decimal,
    pub metros_cuadrados: Option<Decimal>,
    pub precio_por_m2: Option<Decimal>,
    pub fecha_firma: NaiveDate,
    pub propietario_deal: UserId,
    pub asesor_externo: Option<UserId>,
    pub commission_total: Option<Decimal>,
    pub commission_sale_phase: Option<Decimal>,
    pub commission_post_sale_phase: Option<Decimal>,
    pub commission_calculated: bool,
    /// Configuration in force when the sale was calculated.
    pub config_snapshot: Option<EffectiveConfig>,
    /// Sale-phase percent owed under the advisor policy at calculation time.
    #[serde(default)]
    pub expected_sale_phase_percent: Option<Decimal>,
    pub calculated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommissionSale {
    pub fn from_facts(id: SaleId, facts: SaleFacts, now: DateTime<Utc>) -> Self {
        Self {
            id,
            external_deal_id: facts.external_deal_id,
            desarrollo: facts.desarrollo,
            product_id: facts.product_id,
            valor_total: facts.valor_total,
            metros_cuadrados: facts.metros_cuadrados,
            precio_por_m2: facts.precio_por_m2,
            fecha_firma: facts.fecha_firma,
            propietario_deal: facts.propietario_deal,
            asesor_externo: facts.asesor_externo,
            commission_total: facts.commission_total,
            commission_sale_phase: None,
            commission_post_sale_phase: None,
            commission_calculated: false,
            config_snapshot: None,
            expected_sale_phase_percent: None,
            calculated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the ingested facts, leaving calculation results untouched.
    pub fn apply_facts(&mut self, facts: SaleFacts, now: DateTime<Utc>) {
        self.desarrollo = facts.desarrollo;
        self.product_id = facts.product_id;
        self.valor_total = facts.valor_total;
        self.metros_cuadrados = facts.metros_cuadrados;
        self.precio_por_m2 = facts.precio_por_m2;
        self.fecha_firma = facts.fecha_firma;
        self.propietario_deal = facts.propietario_deal;
        self.asesor_externo = facts.asesor_externo;
        if !self.commission_calculated {
            self.commission_total = facts.commission_total;
        }
        self.updated_at = now;
    }

    pub fn has_external_advisor(&self) -> bool {
        self.asesor_externo
            .as_ref()
            .map(|advisor| !advisor.0.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn phase_values(&self) -> Option<PhaseValues> {
        Some(PhaseValues {
            sale_phase: self.commission_sale_phase?,
            post_sale_phase: self.commission_post_sale_phase?,
        })
    }

    pub fn year(&self) -> i32 {
        self.fecha_firma.year()
    }
}

/// One role's share of one phase of one sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionDistribution {
    pub id: DistributionId,
    pub sale_id: SaleId,
    pub role_type: RoleType,
    pub phase: Phase,
    pub recipient: Option<UserId>,
    pub basis: PercentBasis,
    /// Configured percent relative to `basis`.
    pub base_percent: Decimal,
    /// Percent of the phase value; `amount_calculated` derives from it.
    pub percent_assigned: Decimal,
    pub amount_calculated: Decimal,
    pub collection: PhaseCollection,
    pub revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    PercentChange,
    AmountChange,
    RoleReassignment,
}

/// Append-only audit entry for a manual correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionAdjustment {
    pub id: AdjustmentId,
    pub distribution_id: DistributionId,
    pub sale_id: SaleId,
    pub adjustment_type: AdjustmentType,
    pub old_value: Option<Decimal>,
    pub new_value: Option<Decimal>,
    pub old_role_type: Option<RoleType>,
    pub new_role_type: Option<RoleType>,
    pub amount_impact: Decimal,
    pub adjusted_by: UserId,
    pub adjusted_at: DateTime<Utc>,
    pub reason: String,
    pub notes: Option<String>,
}

/// Partner participation as reported by the partner source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerShare {
    pub partner_id: PartnerId,
    pub partner_name: String,
    pub participacion: Decimal,
}

/// A partner's share of both phases of one sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerCommission {
    pub id: PartnerCommissionId,
    pub sale_id: SaleId,
    pub partner_id: PartnerId,
    pub partner_name: String,
    pub participacion: Decimal,
    pub sale_phase_amount: Decimal,
    pub post_sale_phase_amount: Decimal,
    pub amount: Decimal,
    pub sale_phase: PhaseCollection,
    pub post_sale_phase: PhaseCollection,
    pub created_at: DateTime<Utc>,
}

impl PartnerCommission {
    pub fn collection(&self, phase: Phase) -> &PhaseCollection {
        match phase {
            Phase::Sale => &self.sale_phase,
            Phase::PostSale => &self.post_sale_phase,
        }
    }

    pub fn collection_mut(&mut self, phase: Phase) -> &mut PhaseCollection {
        match phase {
            Phase::Sale => &mut self.sale_phase,
            Phase::PostSale => &mut self.post_sale_phase,
        }
    }

    pub fn amount_for(&self, phase: Phase) -> Decimal {
        match phase {
            Phase::Sale => self.sale_phase_amount,
            Phase::PostSale => self.post_sale_phase_amount,
        }
    }
}

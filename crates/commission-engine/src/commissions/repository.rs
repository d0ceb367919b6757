use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::allocator::PartnerAllocation;
use super::calculator::CommissionBreakdown;
use super::configuration::{CommissionConfig, CommissionGlobalConfig, EffectiveConfig};
use super::domain::{
    AdjustmentType, CollectionStatus, CommissionAdjustment, CommissionDistribution,
    CommissionSale, DevelopmentId, DistributionId, PartnerCommission, PartnerCommissionId,
    PartnerShare, Phase, PhaseCollection, ProductId, RoleType, SaleFacts, SaleId, UserId,
};

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists or was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Filters accepted by sale listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleFilter {
    #[serde(default)]
    pub desarrollo: Option<DevelopmentId>,
    #[serde(default)]
    pub propietario_deal: Option<UserId>,
    #[serde(default)]
    pub fecha_firma_from: Option<NaiveDate>,
    #[serde(default)]
    pub fecha_firma_to: Option<NaiveDate>,
    #[serde(default)]
    pub commission_calculated: Option<bool>,
}

impl SaleFilter {
    pub fn matches(&self, sale: &CommissionSale) -> bool {
        self.desarrollo
            .as_ref()
            .map_or(true, |desarrollo| &sale.desarrollo == desarrollo)
            && self
                .propietario_deal
                .as_ref()
                .map_or(true, |owner| &sale.propietario_deal == owner)
            && self
                .fecha_firma_from
                .map_or(true, |from| sale.fecha_firma >= from)
            && self.fecha_firma_to.map_or(true, |to| sale.fecha_firma <= to)
            && self
                .commission_calculated
                .map_or(true, |calculated| sale.commission_calculated == calculated)
    }
}

/// Offset pagination, already clamped by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

/// Filters accepted by partner commission listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerCommissionFilter {
    #[serde(default)]
    pub desarrollo: Option<DevelopmentId>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub collection_status: Option<CollectionStatus>,
    #[serde(default)]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub sale_id: Option<SaleId>,
}

impl PartnerCommissionFilter {
    /// A status without a phase matches when either phase is in that status.
    pub fn matches(&self, commission: &PartnerCommission, sale: &CommissionSale) -> bool {
        let status_matches = match (self.collection_status, self.phase) {
            (Some(status), Some(phase)) => commission.collection(phase).status == status,
            (Some(status), None) => Phase::ordered()
                .iter()
                .any(|phase| commission.collection(*phase).status == status),
            (None, _) => true,
        };

        status_matches
            && self.sale_id.map_or(true, |id| commission.sale_id == id)
            && self
                .desarrollo
                .as_ref()
                .map_or(true, |desarrollo| &sale.desarrollo == desarrollo)
            && self.year.map_or(true, |year| sale.year() == year)
    }
}

/// Everything one sale's calculation writes, persisted as a single unit.
#[derive(Debug, Clone)]
pub struct CalculationWrite {
    pub sale_id: SaleId,
    pub breakdown: CommissionBreakdown,
    pub snapshot: EffectiveConfig,
    pub partners: Vec<PartnerAllocation>,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum PersistOutcome {
    Persisted {
        sale: CommissionSale,
        distributions: Vec<CommissionDistribution>,
        partner_commissions: Vec<PartnerCommission>,
    },
    /// Another writer already stored distributions for the sale; nothing was written.
    AlreadyCalculated,
}

/// Adjustment entry before the store assigns its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAdjustment {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Inserted,
    Updated { base_changed: bool },
}

/// Storage of commission configuration and global overrides.
pub trait ConfigStore: Send + Sync {
    fn development_config(
        &self,
        development: &DevelopmentId,
    ) -> Result<Option<CommissionConfig>, RepositoryError>;
    fn default_config(&self) -> Result<Option<CommissionConfig>, RepositoryError>;
    fn upsert_config(&self, config: CommissionConfig) -> Result<CommissionConfig, RepositoryError>;
    fn global_overrides(&self) -> Result<Vec<CommissionGlobalConfig>, RepositoryError>;
    fn upsert_global_override(
        &self,
        entry: CommissionGlobalConfig,
    ) -> Result<CommissionGlobalConfig, RepositoryError>;
}

/// Storage abstraction for sales, distributions, adjustments and partner commissions.
///
/// Every method is one transaction. `persist_calculation` enforces uniqueness of
/// (sale, role, phase) and degrades to [`PersistOutcome::AlreadyCalculated`] instead of
/// double-booking; `apply_adjustment` writes the audit entry and the distribution together.
pub trait CommissionRepository: ConfigStore {
    fn upsert_sale(
        &self,
        facts: SaleFacts,
        now: DateTime<Utc>,
    ) -> Result<(CommissionSale, UpsertKind), RepositoryError>;
    fn sale(&self, id: SaleId) -> Result<Option<CommissionSale>, RepositoryError>;
    fn sales(&self, filter: &SaleFilter, page: Page) -> Result<Vec<CommissionSale>, RepositoryError>;
    fn distributions_for_sale(
        &self,
        id: SaleId,
    ) -> Result<Vec<CommissionDistribution>, RepositoryError>;
    fn distribution(
        &self,
        id: DistributionId,
    ) -> Result<Option<CommissionDistribution>, RepositoryError>;
    fn persist_calculation(&self, write: CalculationWrite)
        -> Result<PersistOutcome, RepositoryError>;
    /// Fails with `Conflict` when the stored revision differs from `expected_revision` or the
    /// update would duplicate (sale, role, phase). Only the adjusted fields of `updated` are
    /// written; the stored collection state is kept. Returns the entry and the stored row.
    fn apply_adjustment(
        &self,
        expected_revision: u32,
        adjustment: NewAdjustment,
        updated: CommissionDistribution,
    ) -> Result<(CommissionAdjustment, CommissionDistribution), RepositoryError>;
    fn adjustments_for(
        &self,
        id: DistributionId,
    ) -> Result<Vec<CommissionAdjustment>, RepositoryError>;
    fn partner_commissions(
        &self,
        filter: &PartnerCommissionFilter,
    ) -> Result<Vec<PartnerCommission>, RepositoryError>;
    fn partner_commission(
        &self,
        id: PartnerCommissionId,
    ) -> Result<Option<PartnerCommission>, RepositoryError>;
    /// Fails with `Conflict` when the phase is no longer in status `from`.
    fn transition_partner_collection(
        &self,
        id: PartnerCommissionId,
        phase: Phase,
        from: CollectionStatus,
        to: PhaseCollection,
    ) -> Result<PartnerCommission, RepositoryError>;
    /// Fails with `Conflict` when the distribution is no longer in status `from`.
    fn transition_distribution_collection(
        &self,
        id: DistributionId,
        from: CollectionStatus,
        to: PhaseCollection,
    ) -> Result<CommissionDistribution, RepositoryError>;
}

/// Outbound partner source: participation of each partner in a product.
pub trait PartnerDirectory: Send + Sync {
    fn partners_for_product(&self, product: &ProductId)
        -> Result<Vec<PartnerShare>, RepositoryError>;
    /// Replaces the shares held for a product with a fresh snapshot from the partner source.
    fn load_partners(
        &self,
        product: &ProductId,
        shares: Vec<PartnerShare>,
    ) -> Result<(), RepositoryError>;
}

//! In-process implementations of the storage traits.
//!
//! Every trait method takes the single state lock once, so each call is one atomic unit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::configuration::{CommissionConfig, CommissionGlobalConfig};
use super::domain::{
    AdjustmentId, CollectionStatus, CommissionAdjustment, CommissionDistribution,
    CommissionSale, DevelopmentId, DistributionId, PartnerCommission, PartnerCommissionId,
    PartnerShare, Phase, PhaseCollection, ProductId, RoleType, SaleFacts, SaleId,
};
use super::repository::{
    CalculationWrite, CommissionRepository, ConfigStore, NewAdjustment, Page,
    PartnerCommissionFilter, PartnerDirectory, PersistOutcome, RepositoryError, SaleFilter,
    UpsertKind,
};

#[derive(Debug, Default)]
struct StoreState {
    last_sale: u64,
    last_distribution: u64,
    last_adjustment: u64,
    last_partner_commission: u64,
    sales: BTreeMap<SaleId, CommissionSale>,
    deals: HashMap<String, SaleId>,
    distributions: BTreeMap<DistributionId, CommissionDistribution>,
    adjustments: Vec<CommissionAdjustment>,
    partner_commissions: BTreeMap<PartnerCommissionId, PartnerCommission>,
    development_configs: HashMap<DevelopmentId, CommissionConfig>,
    default_config: Option<CommissionConfig>,
    overrides: BTreeMap<RoleType, CommissionGlobalConfig>,
}

impl StoreState {
    fn role_taken(&self, sale: SaleId, role: RoleType, phase: Phase, except: DistributionId) -> bool {
        self.distributions.values().any(|existing| {
            existing.id != except
                && existing.sale_id == sale
                && existing.role_type == role
                && existing.phase == phase
        })
    }
}

/// Commission store backed by process memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCommissionStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryCommissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("commission store mutex poisoned")
    }
}

impl ConfigStore for InMemoryCommissionStore {
    fn development_config(
        &self,
        development: &DevelopmentId,
    ) -> Result<Option<CommissionConfig>, RepositoryError> {
        Ok(self.state().development_configs.get(development).cloned())
    }

    fn default_config(&self) -> Result<Option<CommissionConfig>, RepositoryError> {
        Ok(self.state().default_config.clone())
    }

    fn upsert_config(&self, config: CommissionConfig) -> Result<CommissionConfig, RepositoryError> {
        let mut state = self.state();
        match &config.development {
            Some(development) => {
                state
                    .development_configs
                    .insert(development.clone(), config.clone());
            }
            None => state.default_config = Some(config.clone()),
        }
        Ok(config)
    }

    fn global_overrides(&self) -> Result<Vec<CommissionGlobalConfig>, RepositoryError> {
        Ok(self.state().overrides.values().cloned().collect())
    }

    fn upsert_global_override(
        &self,
        entry: CommissionGlobalConfig,
    ) -> Result<CommissionGlobalConfig, RepositoryError> {
        self.state().overrides.insert(entry.role, entry.clone());
        Ok(entry)
    }
}

impl CommissionRepository for InMemoryCommissionStore {
    fn upsert_sale(
        &self,
        facts: SaleFacts,
        now: DateTime<Utc>,
    ) -> Result<(CommissionSale, UpsertKind), RepositoryError> {
        let mut state = self.state();
        if let Some(id) = state.deals.get(&facts.external_deal_id).copied() {
            let sale = state.sales.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            let base_changed = sale.valor_total != facts.valor_total
                || (facts.commission_total.is_some()
                    && sale.commission_total != facts.commission_total);
            sale.apply_facts(facts, now);
            return Ok((sale.clone(), UpsertKind::Updated { base_changed }));
        }

        state.last_sale += 1;
        let id = SaleId(state.last_sale);
        let sale = CommissionSale::from_facts(id, facts, now);
        state.deals.insert(sale.external_deal_id.clone(), id);
        state.sales.insert(id, sale.clone());
        Ok((sale, UpsertKind::Inserted))
    }

    fn sale(&self, id: SaleId) -> Result<Option<CommissionSale>, RepositoryError> {
        Ok(self.state().sales.get(&id).cloned())
    }

    fn sales(&self, filter: &SaleFilter, page: Page) -> Result<Vec<CommissionSale>, RepositoryError> {
        Ok(self
            .state()
            .sales
            .values()
            .filter(|sale| filter.matches(sale))
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    fn distributions_for_sale(
        &self,
        id: SaleId,
    ) -> Result<Vec<CommissionDistribution>, RepositoryError> {
        Ok(self
            .state()
            .distributions
            .values()
            .filter(|distribution| distribution.sale_id == id)
            .cloned()
            .collect())
    }

    fn distribution(
        &self,
        id: DistributionId,
    ) -> Result<Option<CommissionDistribution>, RepositoryError> {
        Ok(self.state().distributions.get(&id).cloned())
    }

    fn persist_calculation(
        &self,
        write: CalculationWrite,
    ) -> Result<PersistOutcome, RepositoryError> {
        let mut state = self.state();
        let CalculationWrite {
            sale_id,
            breakdown,
            snapshot,
            partners,
            calculated_at,
        } = write;

        let already = state
            .sales
            .get(&sale_id)
            .ok_or(RepositoryError::NotFound)?
            .commission_calculated
            || state
                .distributions
                .values()
                .any(|distribution| distribution.sale_id == sale_id);
        if already {
            return Ok(PersistOutcome::AlreadyCalculated);
        }

        let mut distributions = Vec::with_capacity(breakdown.distributions.len());
        for draft in &breakdown.distributions {
            state.last_distribution += 1;
            let distribution = CommissionDistribution {
                id: DistributionId(state.last_distribution),
                sale_id,
                role_type: draft.role_type,
                phase: draft.phase,
                recipient: draft.recipient.clone(),
                basis: draft.basis,
                base_percent: draft.base_percent,
                percent_assigned: draft.percent_assigned,
                amount_calculated: draft.amount_calculated,
                collection: PhaseCollection::default(),
                revision: 0,
                created_at: calculated_at,
                updated_at: calculated_at,
            };
            state
                .distributions
                .insert(distribution.id, distribution.clone());
            distributions.push(distribution);
        }

        let mut partner_commissions = Vec::with_capacity(partners.len());
        for allocation in partners {
            state.last_partner_commission += 1;
            let commission = PartnerCommission {
                id: PartnerCommissionId(state.last_partner_commission),
                sale_id,
                partner_id: allocation.partner_id,
                partner_name: allocation.partner_name,
                participacion: allocation.participacion,
                sale_phase_amount: allocation.sale_phase_amount,
                post_sale_phase_amount: allocation.post_sale_phase_amount,
                amount: allocation.amount,
                sale_phase: PhaseCollection::default(),
                post_sale_phase: PhaseCollection::default(),
                created_at: calculated_at,
            };
            state
                .partner_commissions
                .insert(commission.id, commission.clone());
            partner_commissions.push(commission);
        }

        let sale = state
            .sales
            .get_mut(&sale_id)
            .ok_or(RepositoryError::NotFound)?;
        sale.commission_total = Some(breakdown.commission_total);
        sale.commission_sale_phase = Some(breakdown.commission_sale_phase);
        sale.commission_post_sale_phase = Some(breakdown.commission_post_sale_phase);
        sale.expected_sale_phase_percent = Some(breakdown.expected_sale_phase_percent);
        sale.commission_calculated = true;
        sale.config_snapshot = Some(snapshot);
        sale.calculated_at = Some(calculated_at);
        sale.updated_at = calculated_at;

        Ok(PersistOutcome::Persisted {
            sale: sale.clone(),
            distributions,
            partner_commissions,
        })
    }

    fn apply_adjustment(
        &self,
        expected_revision: u32,
        adjustment: NewAdjustment,
        updated: CommissionDistribution,
    ) -> Result<(CommissionAdjustment, CommissionDistribution), RepositoryError> {
        let mut state = self.state();
        let stored = state
            .distributions
            .get(&updated.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.revision != expected_revision {
            return Err(RepositoryError::Conflict);
        }
        if state.role_taken(updated.sale_id, updated.role_type, updated.phase, updated.id) {
            return Err(RepositoryError::Conflict);
        }

        state.last_adjustment += 1;
        let entry = CommissionAdjustment {
            id: AdjustmentId(state.last_adjustment),
            distribution_id: adjustment.distribution_id,
            sale_id: adjustment.sale_id,
            adjustment_type: adjustment.adjustment_type,
            old_value: adjustment.old_value,
            new_value: adjustment.new_value,
            old_role_type: adjustment.old_role_type,
            new_role_type: adjustment.new_role_type,
            amount_impact: adjustment.amount_impact,
            adjusted_by: adjustment.adjusted_by,
            adjusted_at: adjustment.adjusted_at,
            reason: adjustment.reason,
            notes: adjustment.notes,
        };
        state.adjustments.push(entry.clone());
        let stored = state
            .distributions
            .get_mut(&updated.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.role_type = updated.role_type;
        stored.recipient = updated.recipient;
        stored.basis = updated.basis;
        stored.base_percent = updated.base_percent;
        stored.percent_assigned = updated.percent_assigned;
        stored.amount_calculated = updated.amount_calculated;
        stored.revision = updated.revision;
        stored.updated_at = updated.updated_at;
        Ok((entry, stored.clone()))
    }

    fn adjustments_for(
        &self,
        id: DistributionId,
    ) -> Result<Vec<CommissionAdjustment>, RepositoryError> {
        Ok(self
            .state()
            .adjustments
            .iter()
            .filter(|entry| entry.distribution_id == id)
            .cloned()
            .collect())
    }

    fn partner_commissions(
        &self,
        filter: &PartnerCommissionFilter,
    ) -> Result<Vec<PartnerCommission>, RepositoryError> {
        let state = self.state();
        Ok(state
            .partner_commissions
            .values()
            .filter(|commission| {
                state
                    .sales
                    .get(&commission.sale_id)
                    .map_or(false, |sale| filter.matches(commission, sale))
            })
            .cloned()
            .collect())
    }

    fn partner_commission(
        &self,
        id: PartnerCommissionId,
    ) -> Result<Option<PartnerCommission>, RepositoryError> {
        Ok(self.state().partner_commissions.get(&id).cloned())
    }

    fn transition_partner_collection(
        &self,
        id: PartnerCommissionId,
        phase: Phase,
        from: CollectionStatus,
        to: PhaseCollection,
    ) -> Result<PartnerCommission, RepositoryError> {
        let mut state = self.state();
        let commission = state
            .partner_commissions
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        let collection = commission.collection_mut(phase);
        if collection.status != from {
            return Err(RepositoryError::Conflict);
        }
        *collection = to;
        Ok(commission.clone())
    }

    fn transition_distribution_collection(
        &self,
        id: DistributionId,
        from: CollectionStatus,
        to: PhaseCollection,
    ) -> Result<CommissionDistribution, RepositoryError> {
        let mut state = self.state();
        let distribution = state
            .distributions
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        if distribution.collection.status != from {
            return Err(RepositoryError::Conflict);
        }
        if let Some(at) = to.updated_at {
            distribution.updated_at = at;
        }
        distribution.collection = to;
        Ok(distribution.clone())
    }
}

/// Partner shares per product, loaded from the partner source.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPartnerDirectory {
    products: Arc<Mutex<HashMap<ProductId, Vec<PartnerShare>>>>,
}

impl InMemoryPartnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PartnerDirectory for InMemoryPartnerDirectory {
    fn partners_for_product(
        &self,
        product: &ProductId,
    ) -> Result<Vec<PartnerShare>, RepositoryError> {
        Ok(self
            .products
            .lock()
            .expect("partner directory mutex poisoned")
            .get(product)
            .cloned()
            .unwrap_or_default())
    }

    fn load_partners(
        &self,
        product: &ProductId,
        shares: Vec<PartnerShare>,
    ) -> Result<(), RepositoryError> {
        self.products
            .lock()
            .expect("partner directory mutex poisoned")
            .insert(product.clone(), shares);
        Ok(())
    }
}

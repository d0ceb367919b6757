use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::allocator::validate_shares;
use super::amounts::{checked_ratio, is_valid_percent, percent_of, round_amount};
use super::collection::{
    check_transition, stamped, CollectionTarget, CollectionUpdate, StatusChange, TransitionKind,
};
use super::configuration::{
    CommissionConfig, CommissionGlobalConfig, ConfigResolver, EffectiveConfig,
};
use super::domain::{
    Actor, CommissionAdjustment, CommissionDistribution, CommissionSale, DevelopmentId,
    DistributionId, PartnerCommission, PartnerId, PartnerShare, ProductId, RoleType, SaleFacts,
    SaleId, SaleInput,
};
use super::error::CommissionError;
use super::ledger::{plan_adjustment, AdjustmentOutcome, AdjustmentRequest};
use super::orchestrator::CalculationOutcome;
use super::reconciliation::{reconcile, ReconciliationReport};
use super::repository::{
    CommissionRepository, PartnerCommissionFilter, PartnerDirectory, RepositoryError, SaleFilter,
    UpsertKind,
};
use crate::config::CommissionSettings;

/// Service composing the commission store, the partner source and the engine components.
pub struct CommissionService<R, P> {
    pub(super) repository: Arc<R>,
    pub(super) partners: Arc<P>,
    pub(super) settings: CommissionSettings,
}

/// Sale together with everything calculated for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleDetail {
    pub sale: CommissionSale,
    pub distributions: Vec<CommissionDistribution>,
    pub partner_commissions: Vec<PartnerCommission>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpsertCalculation {
    Calculated {
        distributions: usize,
        partner_commissions: usize,
    },
    AlreadyCalculated,
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleUpsertOutcome {
    pub sale: CommissionSale,
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation: Option<UpsertCalculation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartnerShareView {
    pub partner_id: PartnerId,
    pub partner_name: String,
    pub participacion: Decimal,
    /// Share of both phases, present once the sale is calculated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_amount: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalePartnerShares {
    pub sale_id: SaleId,
    pub product_id: Option<ProductId>,
    pub partners: Vec<PartnerShareView>,
}

impl<R, P> CommissionService<R, P>
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    pub fn new(repository: Arc<R>, partners: Arc<P>, settings: CommissionSettings) -> Self {
        Self {
            repository,
            partners,
            settings,
        }
    }

    pub fn settings(&self) -> &CommissionSettings {
        &self.settings
    }

    /// Upsert a closed-won sale keyed by its external deal id.
    pub fn upsert_sale(&self, input: SaleInput) -> Result<SaleUpsertOutcome, CommissionError> {
        let facts = validate_sale_input(input)?;
        let (sale, kind) = self.repository.upsert_sale(facts, Utc::now())?;

        match kind {
            UpsertKind::Inserted => {
                info!(sale_id = %sale.id, external_deal_id = %sale.external_deal_id, "sale ingested")
            }
            UpsertKind::Updated { base_changed: true } if sale.commission_calculated => warn!(
                sale_id = %sale.id,
                external_deal_id = %sale.external_deal_id,
                "monetary base changed on a calculated sale; distributions are kept, use adjustments"
            ),
            UpsertKind::Updated { .. } => {
                info!(sale_id = %sale.id, external_deal_id = %sale.external_deal_id, "sale updated")
            }
        }

        let calculation = if self.settings.calculate_on_upsert {
            Some(match self.ensure_calculated(sale.id) {
                Ok(CalculationOutcome::Calculated(summary)) => UpsertCalculation::Calculated {
                    distributions: summary.distributions.len(),
                    partner_commissions: summary.partner_commissions.len(),
                },
                Ok(CalculationOutcome::AlreadyCalculated { .. }) => {
                    UpsertCalculation::AlreadyCalculated
                }
                Err(err) => {
                    warn!(sale_id = %sale.id, error = %err, "calculation after upsert failed");
                    UpsertCalculation::Failed {
                        error: err.to_string(),
                    }
                }
            })
        } else {
            None
        };

        let sale = self.repository.sale(sale.id)?.unwrap_or(sale);
        Ok(SaleUpsertOutcome {
            sale,
            created: kind == UpsertKind::Inserted,
            calculation,
        })
    }

    pub fn list_sales(
        &self,
        filter: &SaleFilter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<CommissionSale>, CommissionError> {
        let page = self.settings.page(limit, offset);
        Ok(self.repository.sales(filter, page)?)
    }

    pub fn sale(&self, id: SaleId) -> Result<CommissionSale, CommissionError> {
        self.repository
            .sale(id)?
            .ok_or_else(|| CommissionError::not_found("sale", id))
    }

    pub fn sale_detail(&self, id: SaleId) -> Result<SaleDetail, CommissionError> {
        let sale = self.sale(id)?;
        let distributions = self.repository.distributions_for_sale(id)?;
        let partner_commissions =
            self.repository
                .partner_commissions(&PartnerCommissionFilter {
                    sale_id: Some(id),
                    ..PartnerCommissionFilter::default()
                })?;
        Ok(SaleDetail {
            sale,
            distributions,
            partner_commissions,
        })
    }

    /// Pure read: never triggers calculation.
    pub fn partner_commissions(
        &self,
        filter: &PartnerCommissionFilter,
    ) -> Result<Vec<PartnerCommission>, CommissionError> {
        Ok(self.repository.partner_commissions(filter)?)
    }

    pub fn product_partners(
        &self,
        sale_ids: &[SaleId],
    ) -> Result<Vec<SalePartnerShares>, CommissionError> {
        if sale_ids.is_empty() {
            return Err(CommissionError::validation(
                "at least one sale_id is required",
            ));
        }
        if sale_ids.len() > self.settings.max_limit {
            return Err(CommissionError::validation(format!(
                "at most {} sale ids per request",
                self.settings.max_limit
            )));
        }

        sale_ids
            .iter()
            .map(|id| {
                let sale = self.sale(*id)?;
                let shares = match &sale.product_id {
                    Some(product) => self.partners.partners_for_product(product)?,
                    None => Vec::new(),
                };
                let combined = sale.phase_values().map(|values| values.total());
                let partners = shares
                    .into_iter()
                    .map(|share| {
                        let projected_amount = combined
                            .map(|total| percent_of(share.participacion, total).map(round_amount))
                            .transpose()?;
                        Ok(PartnerShareView {
                            projected_amount,
                            partner_id: share.partner_id,
                            partner_name: share.partner_name,
                            participacion: share.participacion,
                        })
                    })
                    .collect::<Result<Vec<_>, CommissionError>>()?;
                Ok(SalePartnerShares {
                    sale_id: sale.id,
                    product_id: sale.product_id,
                    partners,
                })
            })
            .collect()
    }

    /// Replace a product's partner shares with a snapshot from the partner source.
    pub fn load_product_partners(
        &self,
        product: &ProductId,
        shares: Vec<PartnerShare>,
    ) -> Result<Vec<PartnerShare>, CommissionError> {
        validate_shares(&shares)?;
        self.partners.load_partners(product, shares.clone())?;
        info!(%product, partners = shares.len(), "product partners loaded");
        Ok(shares)
    }

    /// Apply a manual correction, recording the before/after state in the same write.
    pub fn adjust(
        &self,
        id: DistributionId,
        request: AdjustmentRequest,
        actor: &Actor,
    ) -> Result<AdjustmentOutcome, CommissionError> {
        let current = self
            .repository
            .distribution(id)?
            .ok_or_else(|| CommissionError::not_found("distribution", id))?;
        let sale = self.sale(current.sale_id)?;
        let phase_values = sale.phase_values().ok_or_else(|| {
            CommissionError::validation(format!("sale {} has not been calculated", sale.id))
        })?;

        let plan = plan_adjustment(
            &current,
            phase_values.get(current.phase),
            request,
            actor,
            Utc::now(),
        )?;

        if plan.updated.role_type != current.role_type {
            self.ensure_role_free(&current, plan.updated.role_type)?;
        }

        let (adjustment, distribution) = self
            .repository
            .apply_adjustment(current.revision, plan.entry, plan.updated)
            .map_err(|err| match err {
                RepositoryError::Conflict => CommissionError::Conflict(format!(
                    "distribution {id} was modified concurrently"
                )),
                RepositoryError::NotFound => CommissionError::not_found("distribution", id),
                other => other.into(),
            })?;

        info!(
            distribution_id = %id,
            sale_id = %distribution.sale_id,
            adjustment_type = ?adjustment.adjustment_type,
            amount_impact = %adjustment.amount_impact,
            adjusted_by = %adjustment.adjusted_by,
            "distribution adjusted"
        );

        Ok(AdjustmentOutcome {
            adjustment,
            distribution,
        })
    }

    fn ensure_role_free(
        &self,
        current: &CommissionDistribution,
        role: RoleType,
    ) -> Result<(), CommissionError> {
        let taken = self
            .repository
            .distributions_for_sale(current.sale_id)?
            .iter()
            .any(|existing| existing.role_type == role && existing.phase == current.phase);
        if taken {
            return Err(CommissionError::Conflict(format!(
                "sale {} already has a {role} distribution in the {} phase",
                current.sale_id, current.phase
            )));
        }
        Ok(())
    }

    pub fn adjustments(
        &self,
        id: DistributionId,
    ) -> Result<Vec<CommissionAdjustment>, CommissionError> {
        if self.repository.distribution(id)?.is_none() {
            return Err(CommissionError::not_found("distribution", id));
        }
        Ok(self.repository.adjustments_for(id)?)
    }

    /// Advance the collection status of one phase of a partner commission or distribution.
    pub fn set_collection_status(
        &self,
        target: CollectionTarget,
        change: StatusChange,
        actor: &Actor,
    ) -> Result<CollectionUpdate, CommissionError> {
        let now = Utc::now();
        let StatusChange {
            collection_status,
            phase,
        } = change;

        match target {
            CollectionTarget::PartnerCommission(id) => {
                let current = self
                    .repository
                    .partner_commission(id)?
                    .ok_or_else(|| CommissionError::not_found("partner commission", id))?;
                let from = current.collection(phase).status;
                if check_transition(from, collection_status)? == TransitionKind::Unchanged {
                    return Ok(CollectionUpdate::PartnerCommission(current));
                }

                let updated = self
                    .repository
                    .transition_partner_collection(
                        id,
                        phase,
                        from,
                        stamped(collection_status, actor, now),
                    )
                    .map_err(|err| transition_error(err, "partner commission", id))?;
                info!(
                    partner_commission_id = %id,
                    %phase,
                    %from,
                    to = %collection_status,
                    updated_by = %actor.user_id,
                    "partner commission collection status changed"
                );
                Ok(CollectionUpdate::PartnerCommission(updated))
            }
            CollectionTarget::Distribution(id) => {
                let current = self
                    .repository
                    .distribution(id)?
                    .ok_or_else(|| CommissionError::not_found("distribution", id))?;
                if current.phase != phase {
                    return Err(CommissionError::validation(format!(
                        "distribution {id} belongs to the {} phase, not {phase}",
                        current.phase
                    )));
                }
                let from = current.collection.status;
                if check_transition(from, collection_status)? == TransitionKind::Unchanged {
                    return Ok(CollectionUpdate::Distribution(current));
                }

                let updated = self
                    .repository
                    .transition_distribution_collection(
                        id,
                        from,
                        stamped(collection_status, actor, now),
                    )
                    .map_err(|err| transition_error(err, "distribution", id))?;
                info!(
                    distribution_id = %id,
                    %phase,
                    %from,
                    to = %collection_status,
                    updated_by = %actor.user_id,
                    "distribution collection status changed"
                );
                Ok(CollectionUpdate::Distribution(updated))
            }
        }
    }

    pub fn reconciliation(&self, id: SaleId) -> Result<ReconciliationReport, CommissionError> {
        let detail = self.sale_detail(id)?;
        let adjustments = detail
            .distributions
            .iter()
            .map(|distribution| self.repository.adjustments_for(distribution.id))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|entries| entries.len())
            .sum();
        reconcile(
            &detail.sale,
            &detail.distributions,
            &detail.partner_commissions,
            adjustments,
        )
    }

    pub fn development_config(
        &self,
        development: &DevelopmentId,
    ) -> Result<CommissionConfig, CommissionError> {
        self.repository
            .development_config(development)?
            .ok_or_else(|| CommissionError::not_found("commission config", development))
    }

    pub fn default_config(&self) -> Result<CommissionConfig, CommissionError> {
        self.repository
            .default_config()?
            .ok_or_else(|| CommissionError::not_found("commission config", "default"))
    }

    /// Store a development (or default) configuration. Applies prospectively only.
    pub fn upsert_config(
        &self,
        config: CommissionConfig,
        actor: &Actor,
    ) -> Result<CommissionConfig, CommissionError> {
        config.validate()?;
        let stored = self.repository.upsert_config(config)?;
        info!(
            development = ?stored.development,
            updated_by = %actor.user_id,
            "commission configuration stored"
        );
        Ok(stored)
    }

    pub fn global_overrides(&self) -> Result<Vec<CommissionGlobalConfig>, CommissionError> {
        Ok(self.repository.global_overrides()?)
    }

    pub fn global_override(&self, role: RoleType) -> Result<CommissionGlobalConfig, CommissionError> {
        self.global_overrides()?
            .into_iter()
            .find(|entry| entry.role == role)
            .ok_or_else(|| CommissionError::not_found("global override", role))
    }

    pub fn set_global_override(
        &self,
        role: RoleType,
        percent: Decimal,
        actor: &Actor,
    ) -> Result<CommissionGlobalConfig, CommissionError> {
        self.set_global_overrides(vec![(role, percent)], actor)?
            .into_iter()
            .next()
            .ok_or_else(|| CommissionError::not_found("global override", role))
    }

    /// Every entry is validated before any is written.
    pub fn set_global_overrides(
        &self,
        entries: Vec<(RoleType, Decimal)>,
        actor: &Actor,
    ) -> Result<Vec<CommissionGlobalConfig>, CommissionError> {
        if entries.is_empty() {
            return Err(CommissionError::validation("at least one override is required"));
        }
        let now = Utc::now();
        let entries = entries
            .into_iter()
            .map(|(role, percent)| {
                let entry = CommissionGlobalConfig {
                    role,
                    percent,
                    updated_by: Some(actor.user_id.clone()),
                    updated_at: Some(now),
                };
                entry.validate().map(|_| entry)
            })
            .collect::<Result<Vec<_>, _>>()?;

        entries
            .into_iter()
            .map(|entry| {
                let stored = self.repository.upsert_global_override(entry)?;
                info!(
                    role = %stored.role,
                    percent = %stored.percent,
                    updated_by = %actor.user_id,
                    "global role override stored"
                );
                Ok(stored)
            })
            .collect()
    }

    pub fn effective_config(
        &self,
        development: &DevelopmentId,
    ) -> Result<EffectiveConfig, CommissionError> {
        ConfigResolver::new(self.repository.as_ref()).resolve(development)
    }
}

fn transition_error(err: RepositoryError, entity: &'static str, id: impl ToString) -> CommissionError {
    match err {
        RepositoryError::Conflict => CommissionError::Conflict(format!(
            "{entity} {} collection status changed concurrently",
            id.to_string()
        )),
        RepositoryError::NotFound => CommissionError::not_found(entity, id),
        other => other.into(),
    }
}

/// Validates the ingestion payload and derives `precio_por_m2` and `commission_total`.
pub fn validate_sale_input(input: SaleInput) -> Result<SaleFacts, CommissionError> {
    let SaleInput {
        external_deal_id,
        desarrollo,
        product_id,
        valor_total,
        metros_cuadrados,
        precio_por_m2,
        fecha_firma,
        propietario_deal,
        asesor_externo,
        commission_total,
        commission_rate_percent,
    } = input;

    let external_deal_id = external_deal_id.trim().to_string();
    if external_deal_id.is_empty() {
        return Err(CommissionError::validation("external_deal_id is required"));
    }
    if desarrollo.0.trim().is_empty() {
        return Err(CommissionError::validation("desarrollo is required"));
    }
    if propietario_deal.0.trim().is_empty() {
        return Err(CommissionError::validation("propietario_deal is required"));
    }
    if valor_total <= Decimal::ZERO {
        return Err(CommissionError::validation(format!(
            "valor_total must be positive (found {valor_total})"
        )));
    }
    if let Some(area) = metros_cuadrados {
        if area.is_sign_negative() {
            return Err(CommissionError::validation(format!(
                "metros_cuadrados must not be negative (found {area})"
            )));
        }
    }
    if let Some(price) = precio_por_m2 {
        if price.is_sign_negative() {
            return Err(CommissionError::validation(format!(
                "precio_por_m2 must not be negative (found {price})"
            )));
        }
    }
    if let Some(total) = commission_total {
        if total.is_sign_negative() {
            return Err(CommissionError::validation(format!(
                "commission_total must not be negative (found {total})"
            )));
        }
    }
    if let Some(rate) = commission_rate_percent {
        if !is_valid_percent(rate) {
            return Err(CommissionError::validation(format!(
                "commission_rate_percent must be between 0 and 100 (found {rate})"
            )));
        }
    }

    let precio_por_m2 = match (precio_por_m2, metros_cuadrados) {
        (Some(price), _) => Some(price),
        (None, Some(area)) if area > Decimal::ZERO => {
            Some(round_amount(checked_ratio(valor_total, area)?))
        }
        (None, _) => None,
    };
    let commission_total = match (commission_total, commission_rate_percent) {
        (Some(total), _) => Some(total),
        (None, Some(rate)) => Some(round_amount(percent_of(rate, valor_total)?)),
        (None, None) => None,
    };

    Ok(SaleFacts {
        external_deal_id,
        desarrollo,
        product_id: product_id.filter(|product| !product.0.trim().is_empty()),
        valor_total,
        metros_cuadrados,
        precio_por_m2,
        fecha_firma,
        propietario_deal,
        asesor_externo: asesor_externo.filter(|advisor| !advisor.0.trim().is_empty()),
        commission_total,
    })
}

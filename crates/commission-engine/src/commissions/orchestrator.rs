//! Explicit calculation entry points: one sale, or a page of sales.
//!
//! Reads never calculate. A sale is calculated either right after ingestion or through
//! [`CommissionService::ensure_calculated`] / [`CommissionService::calculate_batch`].

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use super::allocator::PartnerAllocator;
use super::calculator::DistributionCalculator;
use super::configuration::ConfigResolver;
use super::domain::{CommissionDistribution, PartnerCommission, SaleId};
use super::error::CommissionError;
use super::repository::{
    CalculationWrite, CommissionRepository, PartnerDirectory, PersistOutcome, SaleFilter,
};
use super::service::CommissionService;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationSummary {
    pub sale_id: SaleId,
    pub commission_total: Decimal,
    pub commission_sale_phase: Decimal,
    pub commission_post_sale_phase: Decimal,
    pub distributions: Vec<CommissionDistribution>,
    pub partner_commissions: Vec<PartnerCommission>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CalculationOutcome {
    Calculated(CalculationSummary),
    /// Distributions already existed; nothing was written.
    AlreadyCalculated { sale_id: SaleId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleIssue {
    pub sale_id: SaleId,
    pub external_deal_id: String,
    pub kind: IssueKind,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub succeeded: usize,
    /// Already calculated, or no configuration applies.
    pub skipped: usize,
    pub failed: usize,
    pub issues: Vec<SaleIssue>,
}

impl<R, P> CommissionService<R, P>
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    /// Calculates and persists a sale's distributions and partner commissions unless they
    /// already exist. Safe to call repeatedly and concurrently.
    pub fn ensure_calculated(&self, id: SaleId) -> Result<CalculationOutcome, CommissionError> {
        let sale = self.sale(id)?;
        if sale.commission_calculated {
            return Ok(CalculationOutcome::AlreadyCalculated { sale_id: id });
        }

        let config = ConfigResolver::new(self.repository.as_ref()).resolve(&sale.desarrollo)?;
        let breakdown = DistributionCalculator::calculate(&sale, &config)?;
        let shares = match &sale.product_id {
            Some(product) => self.partners.partners_for_product(product)?,
            None => Vec::new(),
        };
        let partners = PartnerAllocator::allocate(breakdown.phase_values(), &shares)?;

        let outcome = self.repository.persist_calculation(CalculationWrite {
            sale_id: id,
            breakdown,
            snapshot: config,
            partners,
            calculated_at: Utc::now(),
        })?;

        match outcome {
            PersistOutcome::Persisted {
                sale,
                distributions,
                partner_commissions,
            } => {
                info!(
                    sale_id = %id,
                    external_deal_id = %sale.external_deal_id,
                    distributions = distributions.len(),
                    partner_commissions = partner_commissions.len(),
                    "commission calculated"
                );
                Ok(CalculationOutcome::Calculated(CalculationSummary {
                    sale_id: id,
                    commission_total: sale.commission_total.unwrap_or_default(),
                    commission_sale_phase: sale.commission_sale_phase.unwrap_or_default(),
                    commission_post_sale_phase: sale
                        .commission_post_sale_phase
                        .unwrap_or_default(),
                    distributions,
                    partner_commissions,
                }))
            }
            PersistOutcome::AlreadyCalculated => {
                info!(sale_id = %id, "sale calculated by a concurrent writer");
                Ok(CalculationOutcome::AlreadyCalculated { sale_id: id })
            }
        }
    }

    /// Runs [`Self::ensure_calculated`] over a page of sales. Failures are reported per sale
    /// and never abort the batch.
    pub fn calculate_batch(
        &self,
        filter: &SaleFilter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<BatchReport, CommissionError> {
        let sales = self.list_sales(filter, limit, offset)?;
        let mut report = BatchReport::default();

        for sale in sales {
            report.processed += 1;
            match self.ensure_calculated(sale.id) {
                Ok(CalculationOutcome::Calculated(_)) => report.succeeded += 1,
                Ok(CalculationOutcome::AlreadyCalculated { .. }) => report.skipped += 1,
                Err(err @ CommissionError::ConfigNotFound { .. }) => {
                    warn!(sale_id = %sale.id, error = %err, "skipping sale without configuration");
                    report.skipped += 1;
                    report.issues.push(SaleIssue {
                        sale_id: sale.id,
                        external_deal_id: sale.external_deal_id,
                        kind: IssueKind::Skipped,
                        error: err.to_string(),
                    });
                }
                Err(err) => {
                    error!(sale_id = %sale.id, error = %err, "commission calculation failed");
                    report.failed += 1;
                    report.issues.push(SaleIssue {
                        sale_id: sale.id,
                        external_deal_id: sale.external_deal_id,
                        kind: IssueKind::Failed,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "commission batch finished"
        );
        Ok(report)
    }
}

//! Commission calculation and distribution for closed real-estate sales.
//!
//! A sale's commission is split into a sale phase and a post-sale phase. Each phase is
//! shared among internal roles according to the development's configuration, layered over
//! global overrides and the global default. Partner commissions split both phases again
//! by each partner's participation in the product. Manual corrections go through the
//! adjustment ledger; invoicing progress goes through the collection lifecycle.

pub mod allocator;
pub mod amounts;
pub mod calculator;
pub mod collection;
pub mod configuration;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod orchestrator;
pub mod reconciliation;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use allocator::{validate_shares, PartnerAllocation, PartnerAllocator};
pub use calculator::{CommissionBreakdown, DistributionCalculator, DistributionDraft};
pub use collection::{
    check_transition, CollectionTarget, CollectionUpdate, StatusChange, TransitionKind,
};
pub use configuration::{
    CommissionConfig, CommissionGlobalConfig, ConfigOrigin, ConfigResolver, ConfigViolation,
    EffectiveConfig, OptionalRoleConfig, PercentSource, ResolvedPercent,
};
pub use domain::{
    Actor, AdjustmentType, CollectionStatus, CommissionAdjustment, CommissionDistribution,
    CommissionSale, DevelopmentId, DistributionId, PartnerCommission, PartnerCommissionId,
    PartnerId, PartnerShare, PercentBasis, Phase, PhaseValues, ProductId, RoleType, SaleId,
    SaleInput, UserId,
};
pub use error::CommissionError;
pub use ledger::{AdjustmentChange, AdjustmentOutcome, AdjustmentRequest};
pub use memory::{InMemoryCommissionStore, InMemoryPartnerDirectory};
pub use orchestrator::{BatchReport, CalculationOutcome, CalculationSummary, IssueKind, SaleIssue};
pub use reconciliation::{PhaseBalance, ReconciliationReport};
pub use repository::{
    CommissionRepository, ConfigStore, PartnerCommissionFilter, PartnerDirectory,
    RepositoryError, SaleFilter,
};
pub use router::commission_router;
pub use service::{
    CommissionService, PartnerShareView, SaleDetail, SalePartnerShares, SaleUpsertOutcome,
    UpsertCalculation,
};

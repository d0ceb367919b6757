use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::commissions::configuration::{
    layer, CommissionConfig, CommissionGlobalConfig, EffectiveConfig, OptionalRoleConfig,
};
use crate::commissions::domain::{
    Actor, CollectionStatus, CommissionAdjustment, CommissionDistribution, CommissionSale,
    DevelopmentId, DistributionId, PartnerCommission, PartnerCommissionId, PartnerId,
    PartnerShare, Phase, PhaseCollection, ProductId, SaleFacts, SaleId, SaleInput, UserId,
};
use crate::commissions::memory::{InMemoryCommissionStore, InMemoryPartnerDirectory};
use crate::commissions::repository::{
    CalculationWrite, CommissionRepository, ConfigStore, NewAdjustment, Page,
    PartnerCommissionFilter, PartnerDirectory, PersistOutcome, RepositoryError, SaleFilter,
    UpsertKind,
};
use crate::commissions::service::CommissionService;
use crate::config::CommissionSettings;

pub(super) type MemoryService = CommissionService<InMemoryCommissionStore, InMemoryPartnerDirectory>;

pub(super) fn development() -> DevelopmentId {
    DevelopmentId("torre-norte".to_string())
}

pub(super) fn product() -> ProductId {
    ProductId("lote-12".to_string())
}

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn signing_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date")
}

/// 60/40 phases, pool 70 (40/30/30), operations 10 and marketing 8 of the total.
pub(super) fn scenario_config() -> CommissionConfig {
    CommissionConfig {
        development: Some(development()),
        phase_sale_percent: dec!(60),
        phase_post_sale_percent: dec!(40),
        sale_pool_total_percent: dec!(70),
        sale_manager_percent: dec!(40),
        deal_owner_percent: dec!(30),
        external_advisor_percent: Some(dec!(30)),
        redistribute_unused_pool: true,
        operations_coordinator_percent: Some(dec!(10)),
        marketing_percent: Some(dec!(8)),
        legal_manager_percent: dec!(50),
        post_sale_coordinator_percent: dec!(30),
        customer_service: OptionalRoleConfig::enabled(dec!(20)),
        deliveries: OptionalRoleConfig::default(),
        bonds: OptionalRoleConfig::default(),
    }
}

pub(super) fn effective(config: CommissionConfig) -> EffectiveConfig {
    layer(&development(), Some(config), None, &[], now()).expect("valid configuration")
}

pub(super) fn sale_input(deal: &str, advisor: Option<&str>) -> SaleInput {
    SaleInput {
        external_deal_id: deal.to_string(),
        desarrollo: development(),
        product_id: Some(product()),
        valor_total: dec!(3000000),
        metros_cuadrados: Some(dec!(120)),
        precio_por_m2: None,
        fecha_firma: signing_date(),
        propietario_deal: UserId("owner-1".to_string()),
        asesor_externo: advisor.map(|id| UserId(id.to_string())),
        commission_total: Some(dec!(90000)),
        commission_rate_percent: None,
    }
}

pub(super) fn sale(advisor: Option<&str>) -> CommissionSale {
    let input = sale_input("deal-1", advisor);
    CommissionSale::from_facts(
        SaleId(1),
        SaleFacts {
            external_deal_id: input.external_deal_id,
            desarrollo: input.desarrollo,
            product_id: input.product_id,
            valor_total: input.valor_total,
            metros_cuadrados: input.metros_cuadrados,
            precio_por_m2: Some(dec!(25000)),
            fecha_firma: input.fecha_firma,
            propietario_deal: input.propietario_deal,
            asesor_externo: input.asesor_externo,
            commission_total: input.commission_total,
        },
        now(),
    )
}

pub(super) fn partner_shares() -> Vec<PartnerShare> {
    vec![
        PartnerShare {
            partner_id: PartnerId("socio-a".to_string()),
            partner_name: "Socio A".to_string(),
            participacion: dec!(60),
        },
        PartnerShare {
            partner_id: PartnerId("socio-b".to_string()),
            partner_name: "Socio B".to_string(),
            participacion: dec!(40),
        },
    ]
}

pub(super) fn actor() -> Actor {
    Actor::new("finance-1")
}

pub(super) fn settings() -> CommissionSettings {
    CommissionSettings {
        calculate_on_upsert: false,
        ..CommissionSettings::default()
    }
}

pub(super) fn build_service_with(
    settings: CommissionSettings,
) -> (
    MemoryService,
    Arc<InMemoryCommissionStore>,
    Arc<InMemoryPartnerDirectory>,
) {
    let store = Arc::new(InMemoryCommissionStore::new());
    let partners = Arc::new(InMemoryPartnerDirectory::new());
    let service = CommissionService::new(store.clone(), partners.clone(), settings);
    (service, store, partners)
}

/// Service with the scenario configuration stored and partners loaded for the product.
pub(super) fn seeded_service() -> (
    MemoryService,
    Arc<InMemoryCommissionStore>,
    Arc<InMemoryPartnerDirectory>,
) {
    let (service, store, partners) = build_service_with(settings());
    store
        .upsert_config(scenario_config())
        .expect("config stored");
    partners
        .load_partners(&product(), partner_shares())
        .expect("partners loaded");
    (service, store, partners)
}

/// Seeds, ingests one sale without an advisor and calculates it.
pub(super) fn calculated_sale() -> (MemoryService, Arc<InMemoryCommissionStore>, SaleId) {
    let (service, store, _) = seeded_service();
    let outcome = service
        .upsert_sale(sale_input("deal-1", None))
        .expect("sale ingested");
    service
        .ensure_calculated(outcome.sale.id)
        .expect("sale calculated");
    (service, store, outcome.sale.id)
}

pub(super) fn distribution_for(
    store: &InMemoryCommissionStore,
    sale_id: SaleId,
    role: crate::commissions::domain::RoleType,
) -> CommissionDistribution {
    store
        .distributions_for_sale(sale_id)
        .expect("distributions readable")
        .into_iter()
        .find(|distribution| distribution.role_type == role)
        .expect("role distributed")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}

pub(super) struct UnavailableRepository;

impl ConfigStore for UnavailableRepository {
    fn development_config(
        &self,
        _development: &DevelopmentId,
    ) -> Result<Option<CommissionConfig>, RepositoryError> {
        Err(offline())
    }

    fn default_config(&self) -> Result<Option<CommissionConfig>, RepositoryError> {
        Err(offline())
    }

    fn upsert_config(&self, _config: CommissionConfig) -> Result<CommissionConfig, RepositoryError> {
        Err(offline())
    }

    fn global_overrides(&self) -> Result<Vec<CommissionGlobalConfig>, RepositoryError> {
        Err(offline())
    }

    fn upsert_global_override(
        &self,
        _entry: CommissionGlobalConfig,
    ) -> Result<CommissionGlobalConfig, RepositoryError> {
        Err(offline())
    }
}

impl CommissionRepository for UnavailableRepository {
    fn upsert_sale(
        &self,
        _facts: SaleFacts,
        _now: DateTime<Utc>,
    ) -> Result<(CommissionSale, UpsertKind), RepositoryError> {
        Err(offline())
    }

    fn sale(&self, _id: SaleId) -> Result<Option<CommissionSale>, RepositoryError> {
        Err(offline())
    }

    fn sales(&self, _filter: &SaleFilter, _page: Page) -> Result<Vec<CommissionSale>, RepositoryError> {
        Err(offline())
    }

    fn distributions_for_sale(
        &self,
        _id: SaleId,
    ) -> Result<Vec<CommissionDistribution>, RepositoryError> {
        Err(offline())
    }

    fn distribution(
        &self,
        _id: DistributionId,
    ) -> Result<Option<CommissionDistribution>, RepositoryError> {
        Err(offline())
    }

    fn persist_calculation(
        &self,
        _write: CalculationWrite,
    ) -> Result<PersistOutcome, RepositoryError> {
        Err(offline())
    }

    fn apply_adjustment(
        &self,
        _expected_revision: u32,
        _adjustment: NewAdjustment,
        _updated: CommissionDistribution,
    ) -> Result<(CommissionAdjustment, CommissionDistribution), RepositoryError> {
        Err(offline())
    }

    fn adjustments_for(
        &self,
        _id: DistributionId,
    ) -> Result<Vec<CommissionAdjustment>, RepositoryError> {
        Err(offline())
    }

    fn partner_commissions(
        &self,
        _filter: &PartnerCommissionFilter,
    ) -> Result<Vec<PartnerCommission>, RepositoryError> {
        Err(offline())
    }

    fn partner_commission(
        &self,
        _id: PartnerCommissionId,
    ) -> Result<Option<PartnerCommission>, RepositoryError> {
        Err(offline())
    }

    fn transition_partner_collection(
        &self,
        _id: PartnerCommissionId,
        _phase: Phase,
        _from: CollectionStatus,
        _to: PhaseCollection,
    ) -> Result<PartnerCommission, RepositoryError> {
        Err(offline())
    }

    fn transition_distribution_collection(
        &self,
        _id: DistributionId,
        _from: CollectionStatus,
        _to: PhaseCollection,
    ) -> Result<CommissionDistribution, RepositoryError> {
        Err(offline())
    }
}

pub(super) fn override_entry(
    role: crate::commissions::domain::RoleType,
    percent: rust_decimal::Decimal,
) -> CommissionGlobalConfig {
    CommissionGlobalConfig {
        role,
        percent,
        updated_by: None,
        updated_at: None,
    }
}

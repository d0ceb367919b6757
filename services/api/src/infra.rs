use chrono::NaiveDate;
use commission_engine::commissions::{
    Actor, CommissionConfig, CommissionError, CommissionRepository, CommissionService,
    DevelopmentId, OptionalRoleConfig, PartnerDirectory, PartnerId, PartnerShare, ProductId,
    SaleInput, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) const DEMO_DEVELOPMENT: &str = "torre-norte";
pub(crate) const DEMO_PRODUCT: &str = "lote-12";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// 60/40 phase split with a 70% advisor pool, used by the demo and local seeding.
pub(crate) fn demo_config(
    development: Option<DevelopmentId>,
    forfeit_unused_pool: bool,
) -> CommissionConfig {
    CommissionConfig {
        development,
        phase_sale_percent: Decimal::from(60),
        phase_post_sale_percent: Decimal::from(40),
        sale_pool_total_percent: Decimal::from(70),
        sale_manager_percent: Decimal::from(40),
        deal_owner_percent: Decimal::from(30),
        external_advisor_percent: Some(Decimal::from(30)),
        redistribute_unused_pool: !forfeit_unused_pool,
        operations_coordinator_percent: Some(Decimal::from(10)),
        marketing_percent: Some(Decimal::from(8)),
        legal_manager_percent: Decimal::from(50),
        post_sale_coordinator_percent: Decimal::from(30),
        customer_service: OptionalRoleConfig::enabled(Decimal::from(20)),
        deliveries: OptionalRoleConfig::default(),
        bonds: OptionalRoleConfig::default(),
    }
}

pub(crate) fn demo_partners() -> Vec<PartnerShare> {
    vec![
        PartnerShare {
            partner_id: PartnerId("socio-a".to_string()),
            partner_name: "Socio A".to_string(),
            participacion: Decimal::from(60),
        },
        PartnerShare {
            partner_id: PartnerId("socio-b".to_string()),
            partner_name: "Socio B".to_string(),
            participacion: Decimal::from(40),
        },
    ]
}

pub(crate) fn demo_sale(
    deal: &str,
    valor_total: Decimal,
    commission_rate: Decimal,
    with_advisor: bool,
) -> SaleInput {
    SaleInput {
        external_deal_id: deal.to_string(),
        desarrollo: DevelopmentId(DEMO_DEVELOPMENT.to_string()),
        product_id: Some(ProductId(DEMO_PRODUCT.to_string())),
        valor_total,
        metros_cuadrados: Some(Decimal::from(120)),
        precio_por_m2: None,
        fecha_firma: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap_or_default(),
        propietario_deal: UserId("asesor-interno".to_string()),
        asesor_externo: with_advisor.then(|| UserId("asesor-externo".to_string())),
        commission_total: None,
        commission_rate_percent: Some(commission_rate),
    }
}

/// Loads the demo configuration, partners and one sale so a fresh server has data to show.
pub(crate) fn seed_demo_data<R, P>(service: &CommissionService<R, P>) -> Result<(), CommissionError>
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    let actor = Actor::new("seed");
    service.upsert_config(demo_config(None, false), &actor)?;
    service.upsert_config(
        demo_config(Some(DevelopmentId(DEMO_DEVELOPMENT.to_string())), false),
        &actor,
    )?;
    service.load_product_partners(&ProductId(DEMO_PRODUCT.to_string()), demo_partners())?;
    let outcome = service.upsert_sale(demo_sale(
        "demo-001",
        Decimal::from(3_000_000),
        Decimal::from(3),
        false,
    ))?;
    info!(sale_id = %outcome.sale.id, "seeded demo commission data");
    Ok(())
}

pub(crate) fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|err| format!("failed to parse '{raw}' as a decimal ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use commission_engine::commissions::{
        InMemoryCommissionStore, InMemoryPartnerDirectory, SaleFilter,
    };
    use commission_engine::config::CommissionSettings;

    #[test]
    fn demo_config_is_balanced_either_way() {
        assert!(demo_config(None, false).validate().is_ok());
        assert!(demo_config(None, true).validate().is_ok());
    }

    #[test]
    fn seeding_loads_a_calculable_sale() {
        let service = CommissionService::new(
            Arc::new(InMemoryCommissionStore::new()),
            Arc::new(InMemoryPartnerDirectory::new()),
            CommissionSettings::default(),
        );
        seed_demo_data(&service).expect("seeded");

        let sales = service
            .list_sales(&SaleFilter::default(), None, None)
            .expect("lists");
        assert_eq!(sales.len(), 1);
        assert!(service.ensure_calculated(sales[0].id).is_ok());
    }

    #[test]
    fn parse_decimal_reports_bad_input() {
        assert_eq!(parse_decimal(" 2.5 "), Ok("2.5".parse().unwrap()));
        assert!(parse_decimal("tres").is_err());
    }
}

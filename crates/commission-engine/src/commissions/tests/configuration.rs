use super::common::*;
use rust_decimal_macros::dec;

use crate::commissions::configuration::{
    layer, ConfigOrigin, ConfigResolver, ConfigViolation, OptionalRoleConfig, PercentSource,
};
use crate::commissions::domain::RoleType;
use crate::commissions::error::CommissionError;
use crate::commissions::memory::InMemoryCommissionStore;
use crate::commissions::repository::ConfigStore;

#[test]
fn scenario_configuration_is_valid() {
    let config = scenario_config();
    assert_eq!(
        config.phase_sale_percent + config.phase_post_sale_percent,
        dec!(100)
    );
    assert!(config.validate().is_ok());
}

#[test]
fn rejects_phase_split_not_summing_to_hundred() {
    let mut config = scenario_config();
    config.phase_post_sale_percent = dec!(30);
    assert!(matches!(
        config.validate(),
        Err(ConfigViolation::PhaseSplit { .. })
    ));
}

#[test]
fn rejects_pool_roles_not_summing_to_hundred() {
    let mut config = scenario_config();
    config.sale_manager_percent = dec!(50);
    assert_eq!(
        config.validate(),
        Err(ConfigViolation::PoolRoles { total: dec!(110) })
    );
}

#[test]
fn disabled_optional_roles_do_not_count_towards_post_sale() {
    let mut config = scenario_config();
    config.customer_service = OptionalRoleConfig {
        enabled: false,
        percent: dec!(20),
    };
    assert_eq!(
        config.validate(),
        Err(ConfigViolation::PostSaleRoles { total: dec!(80) })
    );

    config.deliveries = OptionalRoleConfig::enabled(dec!(20));
    assert!(config.validate().is_ok());
}

#[test]
fn rejects_indirect_roles_overflowing_the_sale_phase() {
    let mut config = scenario_config();
    config.marketing_percent = Some(dec!(20));
    assert!(matches!(
        config.validate(),
        Err(ConfigViolation::SalePhaseAllocation { .. })
    ));
}

#[test]
fn rejects_percentages_out_of_range() {
    let mut config = scenario_config();
    config.legal_manager_percent = dec!(-5);
    assert!(matches!(
        config.validate(),
        Err(ConfigViolation::PercentOutOfRange {
            field: "legal_manager_percent",
            ..
        })
    ));
}

#[test]
fn global_overrides_only_apply_to_indirect_roles() {
    assert_eq!(
        override_entry(RoleType::SaleManager, dec!(10)).validate(),
        Err(ConfigViolation::NotAnIndirectRole(RoleType::SaleManager))
    );
    assert!(override_entry(RoleType::Marketing, dec!(8)).validate().is_ok());
}

#[test]
fn development_values_win_over_global_override() {
    let overrides = [override_entry(RoleType::Marketing, dec!(12))];
    let resolved = layer(
        &development(),
        Some(scenario_config()),
        None,
        &overrides,
        now(),
    )
    .expect("resolves");

    assert_eq!(resolved.origin, ConfigOrigin::Development(development()));
    assert_eq!(resolved.marketing.percent, dec!(8));
    assert_eq!(resolved.marketing.source, PercentSource::Development);
    assert_eq!(resolved.config.marketing_percent, Some(dec!(8)));
}

#[test]
fn global_override_fills_unset_development_value() {
    let mut config = scenario_config();
    config.marketing_percent = None;
    let mut default = scenario_config();
    default.development = None;
    default.marketing_percent = Some(dec!(5));
    default.operations_coordinator_percent = Some(dec!(13));

    let overrides = [override_entry(RoleType::Marketing, dec!(8))];
    let resolved =
        layer(&development(), Some(config), Some(default), &overrides, now()).expect("resolves");

    assert_eq!(resolved.marketing.percent, dec!(8));
    assert_eq!(resolved.marketing.source, PercentSource::GlobalOverride);
    assert_eq!(
        resolved.operations_coordinator.source,
        PercentSource::Development
    );
}

#[test]
fn global_default_fills_when_no_override_exists() {
    let mut config = scenario_config();
    config.marketing_percent = None;
    let mut default = scenario_config();
    default.development = None;

    let resolved =
        layer(&development(), Some(config), Some(default), &[], now()).expect("resolves");

    assert_eq!(resolved.marketing.percent, dec!(8));
    assert_eq!(resolved.marketing.source, PercentSource::GlobalDefault);
}

#[test]
fn built_in_zero_applies_when_nothing_is_configured() {
    let mut config = scenario_config();
    config.sale_pool_total_percent = dec!(100);
    config.operations_coordinator_percent = None;
    config.marketing_percent = None;

    let resolved = layer(&development(), Some(config), None, &[], now()).expect("resolves");

    assert_eq!(resolved.operations_coordinator.percent, dec!(0));
    assert_eq!(resolved.operations_coordinator.source, PercentSource::BuiltIn);
    assert_eq!(resolved.marketing.source, PercentSource::BuiltIn);
}

#[test]
fn falls_back_to_global_default_configuration() {
    let mut default = scenario_config();
    default.development = None;

    let resolved = layer(&development(), None, Some(default), &[], now()).expect("resolves");

    assert_eq!(resolved.origin, ConfigOrigin::GlobalDefault);
    assert_eq!(resolved.operations_coordinator.source, PercentSource::GlobalDefault);
}

#[test]
fn missing_configuration_is_reported() {
    match layer(&development(), None, None, &[], now()) {
        Err(CommissionError::ConfigNotFound { development: id }) => {
            assert_eq!(id, development())
        }
        other => panic!("expected config not found, got {other:?}"),
    }
}

#[test]
fn override_breaking_the_sale_phase_is_rejected() {
    let mut config = scenario_config();
    config.marketing_percent = None;
    let overrides = [override_entry(RoleType::Marketing, dec!(20))];

    assert!(matches!(
        layer(&development(), Some(config), None, &overrides, now()),
        Err(CommissionError::InvalidConfig(
            ConfigViolation::SalePhaseAllocation { .. }
        ))
    ));
}

#[test]
fn resolver_reads_layers_from_the_store() {
    let store = InMemoryCommissionStore::new();
    let mut config = scenario_config();
    config.operations_coordinator_percent = None;
    store.upsert_config(config).expect("stored");
    store
        .upsert_global_override(override_entry(RoleType::OperationsCoordinator, dec!(10)))
        .expect("stored");

    let resolved = ConfigResolver::new(&store)
        .resolve(&development())
        .expect("resolves");

    assert_eq!(resolved.operations_coordinator_percent(), dec!(10));
    assert_eq!(
        resolved.operations_coordinator.source,
        PercentSource::GlobalOverride
    );
    assert_eq!(resolved.marketing_percent(), dec!(8));
}

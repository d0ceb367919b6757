use super::common::*;
use rust_decimal_macros::dec;
use std::sync::Arc;

use crate::commissions::calculator::DistributionCalculator;
use crate::commissions::configuration::ConfigResolver;
use crate::commissions::domain::{DevelopmentId, RoleType, SaleId};
use crate::commissions::error::CommissionError;
use crate::commissions::orchestrator::{CalculationOutcome, IssueKind};
use crate::commissions::repository::{
    CalculationWrite, CommissionRepository, PersistOutcome, SaleFilter,
};

#[test]
fn calculates_distributions_and_partner_commissions() {
    let (service, store, _) = seeded_service();
    let sale = service
        .upsert_sale(sale_input("deal-1", None))
        .expect("ingested")
        .sale;

    let summary = match service.ensure_calculated(sale.id).expect("calculated") {
        CalculationOutcome::Calculated(summary) => summary,
        other => panic!("expected calculation, got {other:?}"),
    };

    assert_eq!(summary.commission_sale_phase, dec!(54000));
    assert_eq!(summary.commission_post_sale_phase, dec!(36000));
    assert_eq!(summary.distributions.len(), 7);
    assert_eq!(summary.partner_commissions.len(), 2);
    assert_eq!(summary.partner_commissions[0].amount, dec!(54000));
    assert_eq!(summary.partner_commissions[1].amount, dec!(36000));

    let stored = store.sale(sale.id).expect("readable").expect("exists");
    assert!(stored.commission_calculated);
    assert!(stored.calculated_at.is_some());
    let snapshot = stored.config_snapshot.expect("snapshotted");
    assert_eq!(snapshot.marketing_percent(), dec!(8));
}

#[test]
fn calculating_twice_is_a_no_op() {
    let (service, store, sale_id) = calculated_sale();
    let before = store.distributions_for_sale(sale_id).expect("readable");

    let outcome = service.ensure_calculated(sale_id).expect("idempotent");

    assert_eq!(outcome, CalculationOutcome::AlreadyCalculated { sale_id });
    assert_eq!(store.distributions_for_sale(sale_id).expect("readable"), before);
}

#[test]
fn duplicate_persist_degrades_to_already_calculated() {
    let (service, store, _) = seeded_service();
    let sale = service
        .upsert_sale(sale_input("deal-1", None))
        .expect("ingested")
        .sale;
    let config = ConfigResolver::new(store.as_ref())
        .resolve(&sale.desarrollo)
        .expect("resolves");
    let breakdown = DistributionCalculator::calculate(&sale, &config).expect("balanced");
    let write = CalculationWrite {
        sale_id: sale.id,
        breakdown,
        snapshot: config,
        partners: Vec::new(),
        calculated_at: now(),
    };

    assert!(matches!(
        store.persist_calculation(write.clone()).expect("first write"),
        PersistOutcome::Persisted { .. }
    ));
    assert!(matches!(
        store.persist_calculation(write).expect("second write"),
        PersistOutcome::AlreadyCalculated
    ));
    assert_eq!(store.distributions_for_sale(sale.id).expect("readable").len(), 7);
}

#[test]
fn concurrent_calculations_book_once() {
    let (service, store, _) = seeded_service();
    let sale_id = service
        .upsert_sale(sale_input("deal-1", None))
        .expect("ingested")
        .sale
        .id;
    let service = Arc::new(service);

    let outcomes: Vec<CalculationOutcome> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                scope.spawn(move || service.ensure_calculated(sale_id).expect("calculates"))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread completes"))
            .collect()
    });

    let calculated = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, CalculationOutcome::Calculated(_)))
        .count();
    assert_eq!(calculated, 1);
    assert_eq!(store.distributions_for_sale(sale_id).expect("readable").len(), 7);
}

#[test]
fn missing_configuration_persists_nothing() {
    let (service, store, _) = seeded_service();
    let mut input = sale_input("deal-9", None);
    input.desarrollo = DevelopmentId("sin-config".to_string());
    let sale_id = service.upsert_sale(input).expect("ingested").sale.id;

    assert!(matches!(
        service.ensure_calculated(sale_id),
        Err(CommissionError::ConfigNotFound { .. })
    ));
    assert!(store.distributions_for_sale(sale_id).expect("readable").is_empty());
    assert!(!store.sale(sale_id).expect("readable").expect("exists").commission_calculated);
}

#[test]
fn unknown_sale_is_not_found() {
    let (service, _, _) = seeded_service();
    assert!(matches!(
        service.ensure_calculated(SaleId(404)),
        Err(CommissionError::NotFound { entity: "sale", .. })
    ));
}

#[test]
fn batch_isolates_per_sale_failures() {
    let (service, _, _) = seeded_service();
    service
        .upsert_sale(sale_input("deal-1", Some("ext-7")))
        .expect("ingested");

    let mut unconfigured = sale_input("deal-2", None);
    unconfigured.desarrollo = DevelopmentId("sin-config".to_string());
    service.upsert_sale(unconfigured).expect("ingested");

    let mut without_base = sale_input("deal-3", None);
    without_base.commission_total = None;
    service.upsert_sale(without_base).expect("ingested");

    let calculated = service
        .upsert_sale(sale_input("deal-4", None))
        .expect("ingested")
        .sale
        .id;
    service.ensure_calculated(calculated).expect("calculated");

    let report = service
        .calculate_batch(&SaleFilter::default(), None, None)
        .expect("batch runs");

    assert_eq!(report.processed, 4);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.issues.len(), 2);
    assert_eq!(report.issues[0].external_deal_id, "deal-2");
    assert_eq!(report.issues[0].kind, IssueKind::Skipped);
    assert_eq!(report.issues[1].external_deal_id, "deal-3");
    assert_eq!(report.issues[1].kind, IssueKind::Failed);
}

#[test]
fn batch_respects_pagination() {
    let (service, _, _) = seeded_service();
    for deal in ["deal-1", "deal-2", "deal-3"] {
        service.upsert_sale(sale_input(deal, None)).expect("ingested");
    }

    let report = service
        .calculate_batch(
            &SaleFilter {
                commission_calculated: Some(false),
                ..SaleFilter::default()
            },
            Some(2),
            None,
        )
        .expect("batch runs");

    assert_eq!(report.processed, 2);
    assert_eq!(report.succeeded, 2);
    let remaining = service
        .list_sales(
            &SaleFilter {
                commission_calculated: Some(false),
                ..SaleFilter::default()
            },
            None,
            None,
        )
        .expect("lists");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].external_deal_id, "deal-3");
}

#[test]
fn advisor_sales_pay_the_advisor() {
    let (service, store, _) = seeded_service();
    let sale_id = service
        .upsert_sale(sale_input("deal-1", Some("ext-7")))
        .expect("ingested")
        .sale
        .id;
    service.ensure_calculated(sale_id).expect("calculated");

    let advisor = distribution_for(&store, sale_id, RoleType::ExternalAdvisor);
    assert_eq!(advisor.amount_calculated, dec!(11340));
}

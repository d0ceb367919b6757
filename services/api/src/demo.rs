use crate::infra::{
    demo_config, demo_partners, demo_sale, parse_decimal, DEMO_DEVELOPMENT, DEMO_PRODUCT,
};
use clap::Args;
use commission_engine::commissions::{
    Actor, AdjustmentChange, AdjustmentRequest, CalculationOutcome, CommissionService,
    DevelopmentId, InMemoryCommissionStore, InMemoryPartnerDirectory, Phase, ProductId, RoleType,
};
use commission_engine::config::CommissionSettings;
use commission_engine::error::AppError;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Sale value used for the sample deal. Defaults to 3,000,000.
    #[arg(long, value_parser = parse_decimal)]
    pub(crate) valor_total: Option<Decimal>,
    /// Commission rate as a percent of the sale value. Defaults to 3.
    #[arg(long, value_parser = parse_decimal)]
    pub(crate) commission_rate: Option<Decimal>,
    /// Attach an external advisor to the sale.
    #[arg(long)]
    pub(crate) with_advisor: bool,
    /// Forfeit the advisor share instead of redistributing it when there is no advisor.
    #[arg(long)]
    pub(crate) forfeit_unused_pool: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        valor_total,
        commission_rate,
        with_advisor,
        forfeit_unused_pool,
    } = args;
    let valor_total = valor_total.unwrap_or_else(|| Decimal::from(3_000_000));
    let commission_rate = commission_rate.unwrap_or_else(|| Decimal::from(3));

    let settings = CommissionSettings {
        calculate_on_upsert: false,
        ..CommissionSettings::default()
    };
    let service = CommissionService::new(
        Arc::new(InMemoryCommissionStore::new()),
        Arc::new(InMemoryPartnerDirectory::new()),
        settings,
    );
    let actor = Actor::new("demo");
    service.upsert_config(
        demo_config(
            Some(DevelopmentId(DEMO_DEVELOPMENT.to_string())),
            forfeit_unused_pool,
        ),
        &actor,
    )?;
    service.load_product_partners(&ProductId(DEMO_PRODUCT.to_string()), demo_partners())?;

    println!("Commission engine demo");
    let ingested = service.upsert_sale(demo_sale(
        "demo-001",
        valor_total,
        commission_rate,
        with_advisor,
    ))?;
    let sale = ingested.sale;
    println!(
        "- Sale {} ({}) in {}: value {} at {}% -> commission {}",
        sale.id,
        sale.external_deal_id,
        sale.desarrollo,
        sale.valor_total,
        commission_rate,
        sale.commission_total.unwrap_or_default()
    );
    println!(
        "  External advisor: {} | unused pool {}",
        if with_advisor { "yes" } else { "no" },
        if forfeit_unused_pool {
            "forfeited"
        } else {
            "redistributed"
        }
    );

    let summary = match service.ensure_calculated(sale.id)? {
        CalculationOutcome::Calculated(summary) => summary,
        CalculationOutcome::AlreadyCalculated { sale_id } => {
            println!("  Sale {sale_id} was already calculated");
            return Ok(());
        }
    };

    println!(
        "\nBreakdown: sale phase {} | post-sale phase {}",
        summary.commission_sale_phase, summary.commission_post_sale_phase
    );
    for phase in [Phase::Sale, Phase::PostSale] {
        println!("{}:", phase.label());
        for row in summary.distributions.iter().filter(|row| row.phase == phase) {
            println!(
                "  - {:<24} {:>10}% {:>12}",
                row.role_type.label(),
                row.percent_assigned,
                row.amount_calculated
            );
        }
    }

    println!("\nPartner shares");
    for partner in &summary.partner_commissions {
        println!(
            "  - {} ({}%): sale {} | post-sale {} | total {}",
            partner.partner_name,
            partner.participacion,
            partner.sale_phase_amount,
            partner.post_sale_phase_amount,
            partner.amount
        );
    }

    let Some(manager) = summary
        .distributions
        .iter()
        .find(|row| row.role_type == RoleType::SaleManager)
    else {
        return Ok(());
    };
    let new_percent = (manager.percent_assigned - Decimal::from(5)).max(Decimal::ZERO);
    match service.adjust(
        manager.id,
        AdjustmentRequest {
            change: AdjustmentChange::Percent { new_percent },
            reason: "demo correction".to_string(),
            notes: None,
        },
        &actor,
    ) {
        Ok(outcome) => println!(
            "\nAdjustment: {} {}% -> {}% ({} -> {}, impact {})",
            outcome.distribution.role_type.label(),
            manager.percent_assigned,
            outcome.distribution.percent_assigned,
            manager.amount_calculated,
            outcome.distribution.amount_calculated,
            outcome.adjustment.amount_impact
        ),
        Err(err) => println!("\nAdjustment rejected: {err}"),
    }

    let report = service.reconciliation(sale.id)?;
    for phase in &report.phases {
        println!(
            "  {} balanced: {} ({} of {} expected)",
            phase.phase.label(),
            phase.balanced,
            phase.amount_total,
            phase.expected_amount
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_with_every_flag_combination() {
        for (with_advisor, forfeit_unused_pool) in [(false, false), (true, false), (false, true)] {
            let args = DemoArgs {
                valor_total: None,
                commission_rate: None,
                with_advisor,
                forfeit_unused_pool,
            };
            assert!(run_demo(args).is_ok());
        }
    }

    #[test]
    fn demo_surfaces_invalid_sales() {
        let args = DemoArgs {
            valor_total: Some(Decimal::ZERO),
            ..DemoArgs::default()
        };
        assert!(matches!(run_demo(args), Err(AppError::Commission(_))));
    }
}

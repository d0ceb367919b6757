use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{CommissionConfig, CommissionGlobalConfig, ConfigViolation};
use super::super::domain::{DevelopmentId, RoleType};
use super::super::error::CommissionError;
use super::super::repository::ConfigStore;

/// Which stored configuration an effective configuration was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "development", rename_all = "snake_case")]
pub enum ConfigOrigin {
    Development(DevelopmentId),
    GlobalDefault,
}

/// Layer that supplied an indirect role percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentSource {
    Development,
    GlobalOverride,
    GlobalDefault,
    BuiltIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPercent {
    pub percent: Decimal,
    pub source: PercentSource,
}

/// Configuration used for one calculation, snapshotted onto the calculated sale so later
/// global edits never reinterpret historical payouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub origin: ConfigOrigin,
    pub config: CommissionConfig,
    pub operations_coordinator: ResolvedPercent,
    pub marketing: ResolvedPercent,
    pub resolved_at: DateTime<Utc>,
}

impl EffectiveConfig {
    pub fn operations_coordinator_percent(&self) -> Decimal {
        self.operations_coordinator.percent
    }

    pub fn marketing_percent(&self) -> Decimal {
        self.marketing.percent
    }

    pub fn indirect_percent(&self, role: RoleType) -> Option<Decimal> {
        match role {
            RoleType::OperationsCoordinator => Some(self.operations_coordinator.percent),
            RoleType::Marketing => Some(self.marketing.percent),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigViolation> {
        self.config.validate()?;
        self.config
            .validate_sale_phase(self.operations_coordinator.percent, self.marketing.percent)
    }
}

/// Layers development config, global overrides, the global default and a built-in zero.
pub fn layer(
    development_id: &DevelopmentId,
    development: Option<CommissionConfig>,
    default: Option<CommissionConfig>,
    overrides: &[CommissionGlobalConfig],
    now: DateTime<Utc>,
) -> Result<EffectiveConfig, CommissionError> {
    let (origin, base, from_development) = match (development, default.as_ref()) {
        (Some(config), _) => (
            ConfigOrigin::Development(development_id.clone()),
            config,
            true,
        ),
        (None, Some(config)) => (ConfigOrigin::GlobalDefault, config.clone(), false),
        (None, None) => {
            return Err(CommissionError::ConfigNotFound {
                development: development_id.clone(),
            })
        }
    };

    let resolve = |role: RoleType, explicit: Option<Decimal>| -> ResolvedPercent {
        let default_value = default
            .as_ref()
            .and_then(|config| indirect_field(config, role));
        let override_value = overrides
            .iter()
            .find(|entry| entry.role == role)
            .map(|entry| entry.percent);

        match (from_development.then_some(explicit).flatten(), override_value, default_value) {
            (Some(percent), _, _) => ResolvedPercent {
                percent,
                source: PercentSource::Development,
            },
            (None, Some(percent), _) => ResolvedPercent {
                percent,
                source: PercentSource::GlobalOverride,
            },
            (None, None, Some(percent)) => ResolvedPercent {
                percent,
                source: PercentSource::GlobalDefault,
            },
            (None, None, None) => ResolvedPercent {
                percent: Decimal::ZERO,
                source: PercentSource::BuiltIn,
            },
        }
    };

    let operations_coordinator = resolve(
        RoleType::OperationsCoordinator,
        base.operations_coordinator_percent,
    );
    let marketing = resolve(RoleType::Marketing, base.marketing_percent);

    let mut config = base;
    config.operations_coordinator_percent = Some(operations_coordinator.percent);
    config.marketing_percent = Some(marketing.percent);

    let effective = EffectiveConfig {
        origin,
        config,
        operations_coordinator,
        marketing,
        resolved_at: now,
    };
    effective.validate()?;
    Ok(effective)
}

fn indirect_field(config: &CommissionConfig, role: RoleType) -> Option<Decimal> {
    match role {
        RoleType::OperationsCoordinator => config.operations_coordinator_percent,
        RoleType::Marketing => config.marketing_percent,
        _ => None,
    }
}

/// Resolves the effective configuration for a development from a [`ConfigStore`].
pub struct ConfigResolver<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> ConfigResolver<'a, S>
where
    S: ConfigStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn resolve(&self, development: &DevelopmentId) -> Result<EffectiveConfig, CommissionError> {
        let development_config = self.store.development_config(development)?;
        let default_config = self.store.default_config()?;
        let overrides = self.store.global_overrides()?;

        let effective = layer(
            development,
            development_config,
            default_config,
            &overrides,
            Utc::now(),
        )?;

        debug!(
            %development,
            origin = ?effective.origin,
            operations_coordinator = %effective.operations_coordinator.percent,
            marketing = %effective.marketing.percent,
            "resolved commission configuration"
        );
        Ok(effective)
    }
}

mod model;
mod resolver;

pub use model::{CommissionConfig, CommissionGlobalConfig, ConfigViolation, OptionalRoleConfig};
pub use resolver::{
    layer, ConfigOrigin, ConfigResolver, EffectiveConfig, PercentSource, ResolvedPercent,
};

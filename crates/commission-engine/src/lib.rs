pub mod commissions;
pub mod config;
pub mod error;
pub mod telemetry;

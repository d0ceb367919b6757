mod common;
mod configuration;
mod orchestrator;

pub mod config;
pub mod errors;
pub mod metrics;
pub mod ssp_status;
pub mod status;
pub mod telemetry;

// =====================================================================================
// MONITORING CELL - LIVENESS AND STORE HEALTH
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{HealthCheck, HealthReport, HealthStatus};
pub use router::monitoring_routes;
pub use services::HealthMonitorService;

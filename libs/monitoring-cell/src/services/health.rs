// =====================================================================================
// HEALTH MONITORING SERVICE
// =====================================================================================

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use chrono::Utc;
use tracing::{error, instrument};

use shared_database::Store;
use shared_utils::AppState;

use crate::models::{HealthCheck, HealthReport, HealthStatus};

static STARTED_AT: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Pins the uptime origin; called when the routes are built.
pub fn mark_started() {
    LazyLock::force(&STARTED_AT);
}

pub struct HealthMonitorService {
    store: Arc<dyn Store>,
}

impl HealthMonitorService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }

    #[instrument(skip(self))]
    pub async fn check(&self) -> HealthReport {
        let database = self.check_database().await;
        let connected = database.status == HealthStatus::Healthy;

        HealthReport {
            success: connected,
            message: if connected {
                "Server is healthy".to_string()
            } else {
                "Database connection failed".to_string()
            },
            timestamp: Utc::now(),
            database: if connected { "connected" } else { "disconnected" },
            uptime_seconds: STARTED_AT.elapsed().as_secs(),
            components: vec![database],
        }
    }

    async fn check_database(&self) -> HealthCheck {
        let start = Instant::now();
        let component = "database".to_string();

        match self.store.ping().await {
            Ok(()) => HealthCheck {
                component,
                status: HealthStatus::Healthy,
                response_time_ms: start.elapsed().as_millis() as u64,
                error_message: None,
            },
            Err(err) => {
                error!("Database health check failed: {}", err);
                HealthCheck {
                    component,
                    status: HealthStatus::Unhealthy,
                    response_time_ms: start.elapsed().as_millis() as u64,
                    error_message: Some(err.to_string()),
                }
            }
        }
    }
}

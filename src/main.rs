//! Headless host: runs the alert engine against the mock alert source and
//! logs notifications instead of showing them.

use std::sync::Arc;

use health_alerts::alerts::{MockAlertSource, SystemClock, TracingDelivery};
use health_alerts::config::{self, EngineConfig};
use health_alerts::db::SqliteKvStore;
use health_alerts::HealthAlerts;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    health_alerts::init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let data_dir = config::app_data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let db_path = config::database_path();
    tracing::info!(path = %db_path.display(), "Opening alert database");

    let kv = Arc::new(SqliteKvStore::open(&db_path)?);
    let engine = HealthAlerts::new(
        kv,
        Arc::new(MockAlertSource::new()),
        Arc::new(TracingDelivery::new()),
        Arc::new(SystemClock),
        EngineConfig::from_env(),
    );

    if !engine.initialize_health_alerts() {
        tracing::warn!("Initialisation incomplete, running in degraded mode");
    }

    let counts = engine.alert_counts();
    tracing::info!(
        unread = counts.unread,
        total = counts.total(),
        "Alert engine running, press Enter to stop"
    );

    // Enter stops the engine. Without a terminal, run until killed.
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) => {
            tracing::info!("No stdin attached, running until terminated");
            loop {
                std::thread::park();
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "stdin unavailable, stopping"),
    }

    engine.shutdown();
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}

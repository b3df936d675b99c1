//! `HealthAlerts`: the in-process API the UI and host call into.
//!
//! Every entry point is infallible from the caller's side: errors are logged
//! here and reported as `false`, an empty collection or a default value.

use std::sync::{Arc, Mutex};

use crate::alerts::background::{start_background_scheduler, BackgroundSchedulerHandle};
use crate::alerts::{
    AlertError, AlertPipeline, AlertSource, AlertStore, Clock, DeliveryChannel,
    DismissConfirmation, LifecycleManager, NotificationDelivery, Notifier, PermissionStatus,
    SettingsStore,
};
use crate::config::EngineConfig;
use crate::db::SqliteKvStore;
use crate::models::{
    ActionTarget, Alert, AlertCounts, AlertStatus, NotificationSettings, SettingsPatch,
};

pub const PERMISSION_KEY: &str = "notification_permission";

pub struct HealthAlerts {
    kv: Arc<SqliteKvStore>,
    settings: SettingsStore,
    store: AlertStore,
    lifecycle: LifecycleManager,
    notifier: Arc<Notifier>,
    pipeline: Arc<AlertPipeline>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    scheduler: Mutex<Option<BackgroundSchedulerHandle>>,
}

impl HealthAlerts {
    pub fn new(
        kv: Arc<SqliteKvStore>,
        source: Arc<dyn AlertSource>,
        delivery: Arc<dyn NotificationDelivery>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let store = AlertStore::new(kv.clone());
        let notifier = Arc::new(Notifier::new(
            delivery,
            DeliveryChannel::health_alerts(&config.channel_id),
        ));

        match kv.get_json::<PermissionStatus>(PERMISSION_KEY) {
            Ok(Some(status)) => notifier.set_permission(status),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to load notification permission"),
        }

        let pipeline = Arc::new(AlertPipeline::new(
            kv.clone(),
            store.clone(),
            source,
            notifier.clone(),
            clock.clone(),
            config.lease_ttl,
        ));

        Self {
            settings: SettingsStore::new(kv.clone()),
            lifecycle: LifecycleManager::new(store.clone()),
            kv,
            store,
            notifier,
            pipeline,
            clock,
            config,
            scheduler: Mutex::new(None),
        }
    }

    /// One-time setup, repeated on every launch: request notification
    /// permission, configure the delivery channel, register the background
    /// scheduler and run an initial fetch.
    ///
    /// Returns false when permission was denied or a step failed. The engine
    /// keeps running either way.
    pub fn initialize_health_alerts(&self) -> bool {
        let permission = self.request_permission();
        let mut ok = permission == PermissionStatus::Granted;

        if let Err(e) = self.notifier.configure_channel() {
            tracing::error!(error = %e, "Failed to configure notification channel");
            ok = false;
        }

        if let Err(e) = self.register_scheduler() {
            tracing::error!(error = %e, "Failed to register background scheduler");
            ok = false;
        }

        if let Err(e) = self.lifecycle.prune_expired(self.clock.now()) {
            tracing::warn!(error = %e, "Failed to prune expired alerts");
        }

        let new_alerts = self.pipeline.check_for_new_alerts();
        tracing::info!(
            permission = ?permission,
            new_alerts,
            poll_secs = self.config.poll_interval.as_secs(),
            "Health alerts initialised"
        );
        ok
    }

    fn request_permission(&self) -> PermissionStatus {
        let status = self.notifier.request_permission();
        if status == PermissionStatus::Denied {
            tracing::warn!("Notification permission denied, alerts will be stored without notifying");
        }
        if let Err(e) = self.kv.put_json(PERMISSION_KEY, &status) {
            tracing::warn!(error = %e, "Failed to persist notification permission");
        }
        status
    }

    fn register_scheduler(&self) -> Result<(), AlertError> {
        let mut slot = self.scheduler.lock().map_err(|_| AlertError::LockFailed)?;
        // Dropping a previous handle stops and joins its thread
        slot.take();
        *slot = Some(start_background_scheduler(
            self.pipeline.clone(),
            self.config.poll_interval,
            |result| tracing::info!(result = ?result, "Background alert fetch"),
        ));
        Ok(())
    }

    /// Stop the background scheduler. Idempotent.
    pub fn shutdown(&self) {
        match self.scheduler.lock() {
            Ok(mut slot) => {
                if slot.take().is_some() {
                    tracing::info!("Health alerts shut down");
                }
            }
            Err(_) => tracing::error!("Scheduler lock poisoned during shutdown"),
        }
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| h.is_running()))
            .unwrap_or(false)
    }

    // ── Alerts ───────────────────────────────────────────────

    /// All stored alerts, newest first.
    pub fn get_alerts(&self) -> Vec<Alert> {
        self.store.get_alerts().unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to load alerts");
            Vec::new()
        })
    }

    /// Alerts neither expired nor in a terminal state.
    pub fn get_active_alerts(&self) -> Vec<Alert> {
        self.lifecycle
            .active_alerts(self.clock.now())
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to load active alerts");
                Vec::new()
            })
    }

    /// Move an alert forward in its lifecycle.
    ///
    /// DISMISSED is refused here; it needs [`HealthAlerts::dismiss_alert`].
    pub fn update_alert_status(&self, id: &str, status: AlertStatus) -> bool {
        report("update_alert_status", id, self.lifecycle.transition(id, status))
    }

    pub fn mark_alert_read(&self, id: &str) -> bool {
        report("mark_alert_read", id, self.lifecycle.mark_read(id))
    }

    /// Act on an alert. Returns where the UI should navigate, if anywhere.
    pub fn act_upon_alert(&self, id: &str) -> Option<ActionTarget> {
        match self.lifecycle.act_upon(id) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(alert_id = id, error = %e, "act_upon_alert failed");
                None
            }
        }
    }

    pub fn dismiss_alert(&self, id: &str, confirmation: DismissConfirmation) -> bool {
        report("dismiss_alert", id, self.lifecycle.dismiss(id, confirmation))
    }

    pub fn delete_alert(&self, id: &str) -> bool {
        report("delete_alert", id, self.store.delete_alert(id))
    }

    pub fn clear_all_alerts(&self) -> bool {
        report("clear_all_alerts", "*", self.store.clear_all_alerts())
    }

    pub fn unread_count(&self) -> usize {
        self.lifecycle.unread_count().unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to count unread alerts");
            0
        })
    }

    pub fn alert_counts(&self) -> AlertCounts {
        self.lifecycle.counts().unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to count alerts");
            AlertCounts::default()
        })
    }

    /// Foreground refresh: one pipeline cycle.
    pub fn check_for_new_alerts(&self) -> bool {
        self.pipeline.check_for_new_alerts()
    }

    // ── Settings & permission ───────────────────────────────

    pub fn get_notification_settings(&self) -> NotificationSettings {
        self.settings.load().unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to load notification settings, using defaults");
            NotificationSettings::default()
        })
    }

    pub fn update_notification_settings(&self, patch: &SettingsPatch) -> bool {
        match self.settings.update(patch) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Notification settings update rejected");
                false
            }
        }
    }

    pub fn notification_permission(&self) -> PermissionStatus {
        self.notifier.permission()
    }
}

fn report(op: &str, id: &str, result: Result<bool, AlertError>) -> bool {
    match result {
        Ok(done) => {
            if !done {
                tracing::debug!(op, alert_id = id, "No alert with this id");
            }
            done
        }
        Err(e) => {
            tracing::warn!(op, alert_id = id, error = %e, "Alert operation failed");
            false
        }
    }
}

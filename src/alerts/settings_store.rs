//! Settings Store: the persisted `NotificationSettings` singleton.

use std::sync::{Arc, Mutex};

use crate::db::SqliteKvStore;
use crate::models::{NotificationSettings, SettingsPatch};

use super::error::AlertError;
use super::quiet_hours::parse_hh_mm;

pub const SETTINGS_KEY: &str = "notification_settings";

/// Clones share one write lock, so read-modify-write updates made through
/// them never interleave.
#[derive(Clone)]
pub struct SettingsStore {
    kv: Arc<SqliteKvStore>,
    write_lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    pub fn new(kv: Arc<SqliteKvStore>) -> Self {
        Self {
            kv,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load settings, creating the default record on first access.
    ///
    /// The default is only written if the key is still unset, so a reader
    /// can never clobber a concurrent update.
    pub fn load(&self) -> Result<NotificationSettings, AlertError> {
        if let Some(settings) = self.kv.get_json::<NotificationSettings>(SETTINGS_KEY)? {
            return Ok(settings);
        }

        let defaults = NotificationSettings::default();
        if self.kv.insert_json_if_absent(SETTINGS_KEY, &defaults)? {
            tracing::info!("Created default notification settings");
            return Ok(defaults);
        }
        Ok(self
            .kv
            .get_json::<NotificationSettings>(SETTINGS_KEY)?
            .unwrap_or(defaults))
    }

    /// Apply a partial update and persist the result.
    ///
    /// Rejects a quiet-hours window that is not valid `HH:MM` so a bad value
    /// never reaches the evaluator.
    pub fn update(&self, patch: &SettingsPatch) -> Result<NotificationSettings, AlertError> {
        let _guard = self.write_lock.lock().map_err(|_| AlertError::LockFailed)?;

        let mut settings = self.load()?;
        patch.apply_to(&mut settings);

        for (field, value) in [
            ("quietHoursStart", &settings.quiet_hours_start),
            ("quietHoursEnd", &settings.quiet_hours_end),
        ] {
            if parse_hh_mm(value).is_none() {
                return Err(AlertError::InvalidSettings(format!(
                    "{field} must be HH:MM, got {value:?}"
                )));
            }
        }

        self.kv.put_json(SETTINGS_KEY, &settings)?;
        tracing::info!(
            enabled = settings.enabled,
            quiet_hours = settings.quiet_hours_enabled,
            "Notification settings updated"
        );
        Ok(settings)
    }
}

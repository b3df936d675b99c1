//! Alert Store: the deduplicated, recency-ordered alert collection.
//!
//! The whole collection is one KV record. Every mutation is a
//! read-modify-write of that record, serialized through `write_lock` so the
//! background pipeline and foreground lifecycle calls cannot interleave.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::db::SqliteKvStore;
use crate::models::{Alert, AlertStatus};

use super::error::AlertError;
use super::lifecycle::DismissConfirmation;

pub const ALERTS_KEY: &str = "health_alerts";

#[derive(Clone)]
pub struct AlertStore {
    kv: Arc<SqliteKvStore>,
    write_lock: Arc<Mutex<()>>,
}

impl AlertStore {
    pub fn new(kv: Arc<SqliteKvStore>) -> Self {
        Self {
            kv,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, AlertError> {
        self.write_lock.lock().map_err(|_| AlertError::LockFailed)
    }

    /// All stored alerts, newest first.
    pub fn get_alerts(&self) -> Result<Vec<Alert>, AlertError> {
        Ok(self.kv.get_json::<Vec<Alert>>(ALERTS_KEY)?.unwrap_or_default())
    }

    pub fn get_alert(&self, id: &str) -> Result<Option<Alert>, AlertError> {
        Ok(self.get_alerts()?.into_iter().find(|a| a.id == id))
    }

    fn persist(&self, mut alerts: Vec<Alert>) -> Result<(), AlertError> {
        // Newest first; id breaks ties so equal timestamps keep a fixed order
        alerts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        self.kv.put_json(ALERTS_KEY, &alerts)?;
        Ok(())
    }

    /// Merge incoming alerts by id; incoming wins on conflict.
    ///
    /// Status is the exception: see [`merged_status`]. A re-fetch never
    /// reopens an alert the user has engaged with, and never commits a
    /// terminal state the user did not choose on this device.
    ///
    /// Returns the ids that were not present before this call.
    pub fn save_alerts(&self, incoming: &[Alert]) -> Result<Vec<String>, AlertError> {
        let _guard = self.lock()?;

        let mut by_id: HashMap<String, Alert> = self
            .get_alerts()?
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();

        let mut inserted = Vec::new();
        let mut seen = HashSet::new();
        for alert in incoming {
            let stored = by_id.get(&alert.id).map(|a| a.status);
            if stored.is_none() && seen.insert(alert.id.clone()) {
                inserted.push(alert.id.clone());
            }

            let mut merged = alert.clone();
            merged.status = merged_status(stored, alert.status);
            by_id.insert(alert.id.clone(), merged);
        }

        self.persist(by_id.into_values().collect())?;
        Ok(inserted)
    }

    /// Move an alert to `status`.
    ///
    /// Returns `Ok(false)` when no alert has this id. Regressive transitions
    /// are rejected; DISMISSED goes through [`AlertStore::dismiss_alert`].
    pub fn update_alert_status(&self, id: &str, status: AlertStatus) -> Result<bool, AlertError> {
        if status == AlertStatus::Dismissed {
            if self.get_alert(id)?.is_none() {
                return Ok(false);
            }
            return Err(AlertError::ConfirmationRequired(id.to_string()));
        }
        self.apply_status(id, status)
    }

    /// Commit the terminal DISMISSED transition. The confirmation token can
    /// only be produced by the caller's explicit confirmation step.
    pub fn dismiss_alert(
        &self,
        id: &str,
        _confirmation: &DismissConfirmation,
    ) -> Result<bool, AlertError> {
        self.apply_status(id, AlertStatus::Dismissed)
    }

    fn apply_status(&self, id: &str, status: AlertStatus) -> Result<bool, AlertError> {
        let _guard = self.lock()?;

        let mut alerts = self.get_alerts()?;
        let Some(alert) = alerts.iter_mut().find(|a| a.id == id) else {
            return Ok(false);
        };

        if alert.status == status {
            return Ok(true);
        }
        if !alert.status.can_transition_to(status) {
            return Err(AlertError::InvalidTransition {
                id: id.to_string(),
                from: alert.status,
                to: status,
            });
        }

        alert.status = status;
        self.persist(alerts)?;
        Ok(true)
    }

    /// Remove one alert. Returns false if it was not stored.
    pub fn delete_alert(&self, id: &str) -> Result<bool, AlertError> {
        let _guard = self.lock()?;

        let mut alerts = self.get_alerts()?;
        let before = alerts.len();
        alerts.retain(|a| a.id != id);
        if alerts.len() == before {
            return Ok(false);
        }
        self.persist(alerts)?;
        Ok(true)
    }

    /// Drop every stored alert.
    pub fn clear_all_alerts(&self) -> Result<bool, AlertError> {
        let _guard = self.lock()?;
        self.kv.delete(ALERTS_KEY)?;
        Ok(true)
    }

    /// Keep only alerts matching `keep`; returns how many were removed.
    pub fn retain<F>(&self, keep: F) -> Result<usize, AlertError>
    where
        F: Fn(&Alert) -> bool,
    {
        let _guard = self.lock()?;

        let mut alerts = self.get_alerts()?;
        let before = alerts.len();
        alerts.retain(|a| keep(a));
        let removed = before - alerts.len();
        if removed > 0 {
            self.persist(alerts)?;
        }
        Ok(removed)
    }
}

/// Status an ingested record ends up with.
///
/// A new alert enters as UNREAD (or READ if the source says so). A known
/// alert only moves one legal step forward, and never to DISMISSED, which
/// needs the user's confirmation.
fn merged_status(stored: Option<AlertStatus>, incoming: AlertStatus) -> AlertStatus {
    match stored {
        None => match incoming {
            AlertStatus::Read => AlertStatus::Read,
            _ => AlertStatus::Unread,
        },
        Some(current) => {
            if incoming != AlertStatus::Dismissed && current.can_transition_to(incoming) {
                incoming
            } else {
                current
            }
        }
    }
}

//! Alert Lifecycle Manager.
//!
//! ```text
//! UNREAD ──mark_read──▶ READ ──act_upon──▶ ACTED_UPON
//!                         └────dismiss───▶ DISMISSED
//! ```
//!
//! ACTED_UPON and DISMISSED are terminal. `act_upon` and `dismiss` step an
//! UNREAD alert through READ first, so the unread count only ever drops as
//! the user engages.

use chrono::{DateTime, Utc};

use crate::models::{ActionTarget, Alert, AlertCounts, AlertStatus};

use super::error::AlertError;
use super::store::AlertStore;

/// Proof that the user confirmed a destructive dismiss.
///
/// Constructed only by the UI collaborator after its confirmation prompt
/// returns positively.
#[derive(Debug)]
pub struct DismissConfirmation {
    _private: (),
}

impl DismissConfirmation {
    pub fn confirmed_by_user() -> Self {
        Self { _private: () }
    }
}

#[derive(Clone)]
pub struct LifecycleManager {
    store: AlertStore,
}

impl LifecycleManager {
    pub fn new(store: AlertStore) -> Self {
        Self { store }
    }

    /// UNREAD → READ. Already-read alerts are left as they are.
    pub fn mark_read(&self, id: &str) -> Result<bool, AlertError> {
        let Some(alert) = self.store.get_alert(id)? else {
            return Ok(false);
        };
        if alert.status != AlertStatus::Unread {
            return Ok(true);
        }
        let updated = self.store.update_alert_status(id, AlertStatus::Read)?;
        if updated {
            tracing::info!(alert_id = id, "Alert marked read");
        }
        Ok(updated)
    }

    /// Mark read, then ACTED_UPON. Returns the navigation target for
    /// actionable alerts.
    pub fn act_upon(&self, id: &str) -> Result<Option<ActionTarget>, AlertError> {
        let Some(alert) = self.store.get_alert(id)? else {
            return Err(AlertError::NotFound(id.to_string()));
        };

        self.mark_read(id)?;
        self.store.update_alert_status(id, AlertStatus::ActedUpon)?;
        tracing::info!(alert_id = id, actionable = alert.actionable, "Alert acted upon");
        Ok(alert.action_target())
    }

    /// Mark read, then commit DISMISSED.
    pub fn dismiss(&self, id: &str, confirmation: DismissConfirmation) -> Result<bool, AlertError> {
        if !self.mark_read(id)? {
            return Ok(false);
        }
        let dismissed = self.store.dismiss_alert(id, &confirmation)?;
        tracing::info!(alert_id = id, "Alert dismissed");
        Ok(dismissed)
    }

    /// Move towards `target`, passing through READ where needed.
    ///
    /// DISMISSED is not reachable here; use [`LifecycleManager::dismiss`].
    pub fn transition(&self, id: &str, target: AlertStatus) -> Result<bool, AlertError> {
        match target {
            // Refused by the store unless the id is unknown
            AlertStatus::Dismissed => self.store.update_alert_status(id, target),
            AlertStatus::ActedUpon => {
                let Some(current) = self.store.get_alert(id)? else {
                    return Ok(false);
                };
                if current.status == AlertStatus::Unread {
                    self.mark_read(id)?;
                }
                self.store.update_alert_status(id, AlertStatus::ActedUpon)
            }
            status => self.store.update_alert_status(id, status),
        }
    }

    pub fn unread_count(&self) -> Result<usize, AlertError> {
        Ok(self
            .store
            .get_alerts()?
            .iter()
            .filter(|a| a.status == AlertStatus::Unread)
            .count())
    }

    pub fn counts(&self) -> Result<AlertCounts, AlertError> {
        Ok(AlertCounts::from_alerts(&self.store.get_alerts()?))
    }

    /// Alerts still worth showing: not expired, not terminal.
    pub fn active_alerts(&self, now: DateTime<Utc>) -> Result<Vec<Alert>, AlertError> {
        Ok(self
            .store
            .get_alerts()?
            .into_iter()
            .filter(|a| !a.is_expired(now) && !a.status.is_terminal())
            .collect())
    }

    /// Delete alerts whose `expires_at` has passed.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, AlertError> {
        let removed = self.store.retain(|a| !a.is_expired(now))?;
        if removed > 0 {
            tracing::info!(removed, "Pruned expired alerts");
        }
        Ok(removed)
    }
}

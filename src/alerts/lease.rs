//! Persisted check lease: at most one alert check runs at a time, across
//! the foreground, the background scheduler and separate processes sharing
//! the same database.
//!
//! The lease is a single KV record claimed by compare-and-swap. It carries
//! an expiry so a holder that crashed mid-check cannot block checks forever.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::SqliteKvStore;

use super::error::AlertError;

pub const LEASE_KEY: &str = "alert_check_lease";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaseRecord {
    owner: Uuid,
    expires_at: DateTime<Utc>,
}

/// Try to claim the check lease.
///
/// Returns `None` while another holder owns an unexpired lease. An expired
/// lease is taken over.
pub fn try_acquire(
    kv: &SqliteKvStore,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<Option<CheckLease<'_>>, AlertError> {
    let record = LeaseRecord {
        owner: Uuid::new_v4(),
        expires_at: now + ttl,
    };
    let value = serde_json::to_string(&record).map_err(crate::db::DatabaseError::from)?;

    let current = kv.get(LEASE_KEY)?;
    let expected = match current.as_deref() {
        None => None,
        Some(raw) => match serde_json::from_str::<LeaseRecord>(raw) {
            Ok(held) if held.expires_at > now => {
                tracing::debug!(owner = %held.owner, expires_at = %held.expires_at, "Check lease busy");
                return Ok(None);
            }
            Ok(held) => {
                tracing::warn!(owner = %held.owner, expires_at = %held.expires_at, "Taking over expired check lease");
                Some(raw)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable check lease, replacing it");
                Some(raw)
            }
        },
    };

    if !kv.compare_and_swap(LEASE_KEY, expected, &value)? {
        // Lost the race to another claimant
        return Ok(None);
    }

    Ok(Some(CheckLease {
        kv,
        value,
        owner: record.owner,
    }))
}

/// RAII check lease. Dropping it releases the record, unless someone has
/// already taken it over after expiry.
pub struct CheckLease<'a> {
    kv: &'a SqliteKvStore,
    value: String,
    owner: Uuid,
}

impl CheckLease<'_> {
    pub fn owner(&self) -> Uuid {
        self.owner
    }
}

impl Drop for CheckLease<'_> {
    fn drop(&mut self) {
        match self.kv.delete_if(LEASE_KEY, &self.value) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(owner = %self.owner, "Check lease was taken over before release");
            }
            Err(e) => {
                tracing::error!(owner = %self.owner, error = %e, "Failed to release check lease");
            }
        }
    }
}

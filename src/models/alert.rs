use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{AlertCategory, AlertStatus, AlertType};

/// A single health notification record.
///
/// `id` is the dedup key: the alert source must keep it stable across
/// re-fetches of the same underlying risk event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub category: AlertCategory,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actionable: bool,
    #[serde(default)]
    pub action_route: Option<String>,
    #[serde(default)]
    pub action_params: Option<serde_json::Value>,
    #[serde(default)]
    pub risk_factor_id: Option<String>,
}

impl Alert {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// Navigation target for an actionable alert.
    pub fn action_target(&self) -> Option<ActionTarget> {
        if !self.actionable {
            return None;
        }
        self.action_route.as_ref().map(|route| ActionTarget {
            alert_id: self.id.clone(),
            route: route.clone(),
            params: self.action_params.clone(),
        })
    }
}

/// Where the consuming UI should navigate after acting on an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTarget {
    pub alert_id: String,
    pub route: String,
    pub params: Option<serde_json::Value>,
}

/// Per-status tallies over the stored alerts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertCounts {
    pub unread: usize,
    pub read: usize,
    pub acted_upon: usize,
    pub dismissed: usize,
}

impl AlertCounts {
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        alerts.iter().fold(Self::default(), |mut counts, alert| {
            match alert.status {
                AlertStatus::Unread => counts.unread += 1,
                AlertStatus::Read => counts.read += 1,
                AlertStatus::ActedUpon => counts.acted_upon += 1,
                AlertStatus::Dismissed => counts.dismissed += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.unread + self.read + self.acted_upon + self.dismissed
    }
}

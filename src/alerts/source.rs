//! Alert sources: where candidate alerts come from.
//!
//! The real risk-alert server is an external collaborator. The only
//! contract is "alerts created after T". `MockAlertSource` stands in for it
//! in the headless host.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::models::{Alert, AlertCategory, AlertStatus, AlertType};

use super::error::AlertError;

pub trait AlertSource: Send + Sync {
    /// Alerts created after `since` (all known alerts when `None`).
    fn fetch_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Alert>, AlertError>;
}

struct AlertTemplate {
    title: &'static str,
    body: &'static str,
    alert_type: AlertType,
    category: AlertCategory,
    action_route: Option<&'static str>,
    risk_factor_id: Option<&'static str>,
    ttl_hours: Option<i64>,
}

const TEMPLATES: &[AlertTemplate] = &[
    AlertTemplate {
        title: "Blood pressure critically high",
        body: "Your latest reading of 182/121 mmHg is in the hypertensive crisis range. Seek medical care now.",
        alert_type: AlertType::Critical,
        category: AlertCategory::BloodPressure,
        action_route: Some("/emergency"),
        risk_factor_id: Some("rf-hypertension"),
        ttl_hours: None,
    },
    AlertTemplate {
        title: "Blood pressure trending up",
        body: "Your average systolic pressure rose 12 mmHg over the last week.",
        alert_type: AlertType::Warning,
        category: AlertCategory::BloodPressure,
        action_route: Some("/log-reading"),
        risk_factor_id: Some("rf-hypertension"),
        ttl_hours: Some(72),
    },
    AlertTemplate {
        title: "LDL cholesterol above target",
        body: "Your latest LDL result is above the target your clinician set.",
        alert_type: AlertType::Warning,
        category: AlertCategory::Cholesterol,
        action_route: Some("/results/cholesterol"),
        risk_factor_id: Some("rf-cholesterol"),
        ttl_hours: Some(168),
    },
    AlertTemplate {
        title: "Evening medication due",
        body: "Time to take your evening dose.",
        alert_type: AlertType::Reminder,
        category: AlertCategory::Medications,
        action_route: Some("/medications"),
        risk_factor_id: None,
        ttl_hours: Some(4),
    },
    AlertTemplate {
        title: "Upcoming appointment",
        body: "You have a cardiology follow-up tomorrow.",
        alert_type: AlertType::Reminder,
        category: AlertCategory::Appointment,
        action_route: Some("/appointments"),
        risk_factor_id: None,
        ttl_hours: Some(24),
    },
    AlertTemplate {
        title: "Activity goal",
        body: "A 20 minute walk today keeps you on track for your weekly activity goal.",
        alert_type: AlertType::Info,
        category: AlertCategory::Exercise,
        action_route: None,
        risk_factor_id: Some("rf-inactivity"),
        ttl_hours: Some(24),
    },
    AlertTemplate {
        title: "Sodium intake",
        body: "Your logged meals this week were high in sodium.",
        alert_type: AlertType::Info,
        category: AlertCategory::Diet,
        action_route: Some("/nutrition"),
        risk_factor_id: Some("rf-diet"),
        ttl_hours: Some(48),
    },
];

/// Randomised stand-in for the alert-generation server.
///
/// Each fetch yields zero, one or two alerts built from realistic
/// cardiovascular-risk templates, timestamped at fetch time.
pub struct MockAlertSource {
    rng: Mutex<StdRng>,
    /// Probability that a fetch produces anything at all.
    hit_rate: f64,
}

impl MockAlertSource {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy(), 0.3)
    }

    /// Deterministic source for reproducible runs.
    pub fn seeded(seed: u64, hit_rate: f64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), hit_rate)
    }

    fn with_rng(rng: StdRng, hit_rate: f64) -> Self {
        Self {
            rng: Mutex::new(rng),
            hit_rate: hit_rate.clamp(0.0, 1.0),
        }
    }

    fn build(template: &AlertTemplate, created_at: DateTime<Utc>) -> Alert {
        Alert {
            id: Uuid::new_v4().to_string(),
            title: template.title.to_string(),
            body: template.body.to_string(),
            alert_type: template.alert_type,
            category: template.category,
            status: AlertStatus::Unread,
            created_at,
            expires_at: template.ttl_hours.map(|h| created_at + Duration::hours(h)),
            actionable: template.action_route.is_some(),
            action_route: template.action_route.map(str::to_string),
            action_params: template
                .risk_factor_id
                .map(|rf| serde_json::json!({ "riskFactorId": rf })),
            risk_factor_id: template.risk_factor_id.map(str::to_string),
        }
    }
}

impl Default for MockAlertSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSource for MockAlertSource {
    fn fetch_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Alert>, AlertError> {
        let mut rng = self.rng.lock().map_err(|_| AlertError::LockFailed)?;

        if !rng.gen_bool(self.hit_rate) {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let count = rng.gen_range(1..=2);
        let alerts: Vec<Alert> = (0..count)
            .map(|_| Self::build(&TEMPLATES[rng.gen_range(0..TEMPLATES.len())], now))
            .filter(|a| since.map_or(true, |t| a.created_at > t))
            .collect();

        tracing::debug!(count = alerts.len(), "Mock alert source produced alerts");
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_hit_source_returns_alerts() {
        let source = MockAlertSource::seeded(7, 1.0);
        let alerts = source.fetch_since(None).unwrap();
        assert!(!alerts.is_empty() && alerts.len() <= 2);
        for alert in &alerts {
            assert_eq!(alert.status, AlertStatus::Unread);
            assert_eq!(alert.actionable, alert.action_route.is_some());
        }
    }

    #[test]
    fn never_hit_source_returns_nothing() {
        let source = MockAlertSource::seeded(7, 0.0);
        assert!(source.fetch_since(None).unwrap().is_empty());
    }

    #[test]
    fn future_cutoff_filters_everything() {
        let source = MockAlertSource::seeded(3, 1.0);
        let future = Utc::now() + Duration::hours(1);
        assert!(source.fetch_since(Some(future)).unwrap().is_empty());
    }

    #[test]
    fn generated_ids_are_unique() {
        let source = MockAlertSource::seeded(11, 1.0);
        let mut ids = std::collections::HashSet::new();
        for _ in 0..20 {
            for alert in source.fetch_since(None).unwrap() {
                assert!(ids.insert(alert.id));
            }
        }
    }
}

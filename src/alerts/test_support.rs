//! Shared fixtures for alert-engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};

use crate::models::{Alert, AlertCategory, AlertStatus, AlertType};

use super::error::AlertError;
use super::notifier::{DeliveryChannel, NotificationDelivery, NotificationRequest, PermissionStatus};
use super::source::AlertSource;

pub fn fixed_created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn make_alert(id: &str, alert_type: AlertType, category: AlertCategory) -> Alert {
    Alert {
        id: id.to_string(),
        title: format!("{} alert {id}", alert_type.as_str()),
        body: "Test alert body".to_string(),
        alert_type,
        category,
        status: AlertStatus::Unread,
        created_at: fixed_created_at(),
        expires_at: None,
        actionable: true,
        action_route: Some(format!("/alerts/{id}")),
        action_params: None,
        risk_factor_id: None,
    }
}

/// Delivery backend that records everything it is asked to do.
pub struct RecordingDelivery {
    permission: PermissionStatus,
    delivered: Mutex<Vec<NotificationRequest>>,
    channels: Mutex<Vec<DeliveryChannel>>,
    fail_delivery: bool,
    counter: AtomicUsize,
}

impl RecordingDelivery {
    fn with(permission: PermissionStatus, fail_delivery: bool) -> Self {
        Self {
            permission,
            delivered: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            fail_delivery,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::with(PermissionStatus::Granted, false)
    }

    pub fn denied() -> Self {
        Self::with(PermissionStatus::Denied, false)
    }

    /// Permission granted, but every `deliver` call fails.
    pub fn failing() -> Self {
        Self::with(PermissionStatus::Granted, true)
    }

    pub fn delivered(&self) -> Vec<NotificationRequest> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn channels(&self) -> Vec<DeliveryChannel> {
        self.channels.lock().unwrap().clone()
    }
}

impl NotificationDelivery for RecordingDelivery {
    fn request_permission(&self) -> Result<PermissionStatus, AlertError> {
        Ok(self.permission)
    }

    fn configure_channel(&self, channel: &DeliveryChannel) -> Result<(), AlertError> {
        self.channels.lock().unwrap().push(channel.clone());
        Ok(())
    }

    fn deliver(&self, request: &NotificationRequest) -> Result<String, AlertError> {
        if self.fail_delivery {
            return Err(AlertError::Delivery("device rejected notification".into()));
        }
        self.delivered.lock().unwrap().push(request.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("notification-{n}"))
    }
}

/// Source returning a fixed batch on every fetch, recording the cutoffs
/// it was called with.
pub struct StaticAlertSource {
    alerts: Mutex<Vec<Alert>>,
    calls: Mutex<Vec<Option<DateTime<Utc>>>>,
}

impl StaticAlertSource {
    pub fn new(alerts: Vec<Alert>) -> Self {
        Self {
            alerts: Mutex::new(alerts),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn set_alerts(&self, alerts: Vec<Alert>) {
        *self.alerts.lock().unwrap() = alerts;
    }

    pub fn calls(&self) -> Vec<Option<DateTime<Utc>>> {
        self.calls.lock().unwrap().clone()
    }
}

impl AlertSource for StaticAlertSource {
    fn fetch_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Alert>, AlertError> {
        self.calls.lock().unwrap().push(since);
        Ok(self.alerts.lock().unwrap().clone())
    }
}

/// Source whose every fetch fails.
pub struct FailingSource;

impl AlertSource for FailingSource {
    fn fetch_since(&self, _since: Option<DateTime<Utc>>) -> Result<Vec<Alert>, AlertError> {
        Err(AlertError::Source("network unreachable".into()))
    }
}

//! Notifier: turns an accepted alert into an immediate device notification.
//!
//! The device API sits behind `NotificationDelivery`. A `Notifier` is built
//! explicitly with its channel configuration; nothing here touches global
//! state.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Alert, AlertType};

use super::error::AlertError;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Max,
    High,
    Default,
    Low,
}

/// Priority and accent colour for one severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationStyle {
    pub priority: NotificationPriority,
    pub accent_color: &'static str,
}

pub fn style_for(alert_type: AlertType) -> NotificationStyle {
    let (priority, accent_color) = match alert_type {
        AlertType::Critical => (NotificationPriority::Max, "#FF0000"),
        AlertType::Warning => (NotificationPriority::High, "#FFA500"),
        AlertType::Reminder => (NotificationPriority::Default, "#00BCD4"),
        AlertType::Info => (NotificationPriority::Low, "#2196F3"),
    };
    NotificationStyle {
        priority,
        accent_color,
    }
}

/// Data attached to the notification so a tap can resume the in-app action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub alert_id: String,
    pub actionable: bool,
    pub action_route: Option<String>,
    pub action_params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTrigger {
    /// Deliver now. Timing was already decided by the pipeline.
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub channel_id: String,
    pub title: String,
    pub body: String,
    pub priority: NotificationPriority,
    pub accent_color: String,
    pub sound: bool,
    pub data: NotificationPayload,
    pub trigger: NotificationTrigger,
}

/// Delivery channel registered with the device at initialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryChannel {
    pub id: String,
    pub name: String,
    pub importance: NotificationPriority,
    pub vibration_pattern: Vec<u64>,
    pub light_color: String,
}

impl DeliveryChannel {
    pub const DEFAULT_ID: &'static str = "health-alerts";

    pub fn health_alerts(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "Health Alerts".to_string(),
            importance: NotificationPriority::Max,
            vibration_pattern: vec![0, 250, 250, 250],
            light_color: "#FF231F7C".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// Host device notification API.
pub trait NotificationDelivery: Send + Sync {
    fn request_permission(&self) -> Result<PermissionStatus, AlertError>;

    fn configure_channel(&self, channel: &DeliveryChannel) -> Result<(), AlertError>;

    /// Hand a notification to the device; returns its opaque handle.
    fn deliver(&self, request: &NotificationRequest) -> Result<String, AlertError>;
}

// ═══════════════════════════════════════════════════════════
// Notifier
// ═══════════════════════════════════════════════════════════

pub struct Notifier {
    delivery: Arc<dyn NotificationDelivery>,
    channel: DeliveryChannel,
    permission: RwLock<PermissionStatus>,
}

impl Notifier {
    pub fn new(delivery: Arc<dyn NotificationDelivery>, channel: DeliveryChannel) -> Self {
        Self {
            delivery,
            channel,
            permission: RwLock::new(PermissionStatus::Undetermined),
        }
    }

    /// Register the delivery channel with the device.
    pub fn configure_channel(&self) -> Result<(), AlertError> {
        self.delivery.configure_channel(&self.channel)?;
        tracing::info!(channel = %self.channel.id, "Notification channel configured");
        Ok(())
    }

    /// Ask the device for permission and remember the answer.
    ///
    /// A failing permission API counts as a denial.
    pub fn request_permission(&self) -> PermissionStatus {
        let status = self.delivery.request_permission().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Permission request failed, treating as denied");
            PermissionStatus::Denied
        });
        self.set_permission(status);
        status
    }

    pub fn permission(&self) -> PermissionStatus {
        self.permission
            .read()
            .map(|p| *p)
            .unwrap_or(PermissionStatus::Undetermined)
    }

    pub fn set_permission(&self, status: PermissionStatus) {
        if let Ok(mut current) = self.permission.write() {
            *current = status;
        }
    }

    pub fn channel(&self) -> &DeliveryChannel {
        &self.channel
    }

    pub fn build_request(&self, alert: &Alert) -> NotificationRequest {
        let style = style_for(alert.alert_type);
        NotificationRequest {
            channel_id: self.channel.id.clone(),
            title: alert.title.clone(),
            body: alert.body.clone(),
            priority: style.priority,
            accent_color: style.accent_color.to_string(),
            sound: true,
            data: NotificationPayload {
                alert_id: alert.id.clone(),
                actionable: alert.actionable,
                action_route: alert.action_route.clone(),
                action_params: alert.action_params.clone(),
            },
            trigger: NotificationTrigger::Immediate,
        }
    }

    /// Schedule an immediate notification for `alert`.
    ///
    /// With permission denied the engine runs without visible notifications
    /// and this returns `PermissionDenied`.
    pub fn schedule_alert_notification(&self, alert: &Alert) -> Result<String, AlertError> {
        if self.permission() == PermissionStatus::Denied {
            return Err(AlertError::PermissionDenied);
        }

        let request = self.build_request(alert);
        let handle = self.delivery.deliver(&request)?;
        tracing::info!(
            alert_id = %alert.id,
            alert_type = alert.alert_type.as_str(),
            priority = ?request.priority,
            notification_id = %handle,
            "Alert notification scheduled"
        );
        Ok(handle)
    }
}

// ═══════════════════════════════════════════════════════════
// TracingDelivery: headless delivery backend
// ═══════════════════════════════════════════════════════════

/// Delivery backend for headless hosts: every notification becomes a log
/// line. Permission is always granted.
#[derive(Debug, Default)]
pub struct TracingDelivery;

impl TracingDelivery {
    pub fn new() -> Self {
        Self
    }
}

impl NotificationDelivery for TracingDelivery {
    fn request_permission(&self) -> Result<PermissionStatus, AlertError> {
        Ok(PermissionStatus::Granted)
    }

    fn configure_channel(&self, channel: &DeliveryChannel) -> Result<(), AlertError> {
        tracing::debug!(channel = %channel.id, importance = ?channel.importance, "Channel registered");
        Ok(())
    }

    fn deliver(&self, request: &NotificationRequest) -> Result<String, AlertError> {
        let handle = Uuid::new_v4().to_string();
        tracing::info!(
            target: "notifications",
            priority = ?request.priority,
            accent = %request.accent_color,
            alert_id = %request.data.alert_id,
            "{}: {}",
            request.title,
            request.body
        );
        Ok(handle)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

//! Error type for the alert engine.
//!
//! Internal layers propagate `AlertError` with `?`; the public entry points
//! on `HealthAlerts` log it and collapse it into a success flag.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::AlertStatus;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Alert not found: {0}")]
    NotFound(String),

    #[error("Alert source error: {0}")]
    Source(String),

    #[error("Notification delivery error: {0}")]
    Delivery(String),

    #[error("Notification permission denied")]
    PermissionDenied,

    #[error("Invalid notification settings: {0}")]
    InvalidSettings(String),

    #[error("Alert {id}: transition {from} -> {to} not allowed")]
    InvalidTransition {
        id: String,
        from: AlertStatus,
        to: AlertStatus,
    },

    #[error("Dismissing alert {0} requires user confirmation")]
    ConfirmationRequired(String),

    #[error("Internal lock failed")]
    LockFailed,
}

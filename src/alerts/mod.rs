pub mod background;
pub mod clock;
pub mod error;
pub mod lease;
pub mod lifecycle;
pub mod notifier;
pub mod pipeline;
pub mod quiet_hours;
pub mod settings_store;
pub mod source;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use background::{
    run_background_fetch, start_background_scheduler, BackgroundFetchResult,
    BackgroundSchedulerHandle, MIN_POLL_INTERVAL,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::AlertError;
pub use lifecycle::{DismissConfirmation, LifecycleManager};
pub use notifier::{
    DeliveryChannel, NotificationDelivery, NotificationPriority, NotificationRequest, Notifier,
    PermissionStatus, TracingDelivery,
};
pub use pipeline::{AlertPipeline, CheckOutcome, CycleStats, SkipReason};
pub use quiet_hours::is_in_quiet_hours;
pub use settings_store::SettingsStore;
pub use source::{AlertSource, MockAlertSource};
pub use store::AlertStore;

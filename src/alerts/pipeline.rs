//! Alert fetch & filter pipeline: one check cycle.
//!
//! Flow per cycle:
//! 1. Load settings; stop if notifications are disabled
//! 2. Claim the check lease; stop if another run holds it
//! 3. Evaluate quiet hours against local time
//! 4. Fetch candidates created since the last check
//! 5. Filter by category, severity and quiet hours
//! 6. Merge survivors into the store, notify the ones not seen before
//! 7. Advance the last-check timestamp to the cycle start time
//!
//! The timestamp only moves after the merge, so a cycle cut short refetches
//! its window next time. Notifying only newly inserted ids keeps that from
//! producing duplicate notifications.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::db::SqliteKvStore;
use crate::models::{Alert, NotificationSettings};

use super::clock::Clock;
use super::error::AlertError;
use super::lease;
use super::notifier::{Notifier, PermissionStatus};
use super::quiet_hours::is_in_quiet_hours;
use super::settings_store::SettingsStore;
use super::source::AlertSource;
use super::store::AlertStore;

pub const LAST_CHECK_KEY: &str = "last_alert_check";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Master notification switch is off.
    Disabled,
    /// Another check holds the lease.
    RunInProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Skipped(SkipReason),
    Completed(CycleStats),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub fetched: usize,
    pub accepted: usize,
    pub inserted: usize,
    pub notified: usize,
    pub quiet_hours: bool,
}

impl CheckOutcome {
    /// True when at least one candidate survived filtering.
    pub fn has_new_alerts(&self) -> bool {
        matches!(self, CheckOutcome::Completed(stats) if stats.accepted > 0)
    }
}

/// Keep candidates whose category and severity are both enabled. During
/// quiet hours only severities that bypass them survive.
pub fn filter_candidates(
    candidates: Vec<Alert>,
    settings: &NotificationSettings,
    quiet: bool,
) -> Vec<Alert> {
    candidates
        .into_iter()
        .filter(|alert| {
            let category_ok = settings.category_enabled(alert.category);
            let severity_ok = settings.severity_enabled(alert.alert_type);
            let timing_ok = !quiet || alert.alert_type.bypasses_quiet_hours();
            let keep = category_ok && severity_ok && timing_ok;
            if !keep {
                tracing::debug!(
                    alert_id = %alert.id,
                    alert_type = alert.alert_type.as_str(),
                    category = alert.category.as_str(),
                    category_ok,
                    severity_ok,
                    timing_ok,
                    "Alert filtered out"
                );
            }
            keep
        })
        .collect()
}

pub struct AlertPipeline {
    kv: Arc<SqliteKvStore>,
    settings: SettingsStore,
    store: AlertStore,
    source: Arc<dyn AlertSource>,
    notifier: Arc<Notifier>,
    clock: Arc<dyn Clock>,
    lease_ttl: Duration,
}

impl AlertPipeline {
    pub fn new(
        kv: Arc<SqliteKvStore>,
        store: AlertStore,
        source: Arc<dyn AlertSource>,
        notifier: Arc<Notifier>,
        clock: Arc<dyn Clock>,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            settings: SettingsStore::new(kv.clone()),
            kv,
            store,
            source,
            notifier,
            clock,
            lease_ttl,
        }
    }

    pub fn last_check(&self) -> Result<Option<DateTime<Utc>>, AlertError> {
        Ok(self.kv.get_json::<DateTime<Utc>>(LAST_CHECK_KEY)?)
    }

    fn set_last_check(&self, at: DateTime<Utc>) -> Result<(), AlertError> {
        self.kv.put_json(LAST_CHECK_KEY, &at)?;
        Ok(())
    }

    /// Run one cycle, propagating failures.
    pub fn run_check(&self) -> Result<CheckOutcome, AlertError> {
        let settings = self.settings.load()?;
        if !settings.enabled {
            tracing::debug!("Notifications disabled, skipping alert check");
            return Ok(CheckOutcome::Skipped(SkipReason::Disabled));
        }

        let started_at = self.clock.now();
        let Some(_lease) = lease::try_acquire(&self.kv, started_at, self.lease_ttl)? else {
            tracing::info!("Alert check already running, skipping");
            return Ok(CheckOutcome::Skipped(SkipReason::RunInProgress));
        };

        let quiet = is_in_quiet_hours(&settings, self.clock.local_time());
        let since = self.last_check()?;
        let candidates = self.source.fetch_since(since)?;

        let mut stats = CycleStats {
            fetched: candidates.len(),
            quiet_hours: quiet,
            ..Default::default()
        };

        if candidates.is_empty() {
            self.set_last_check(started_at)?;
            tracing::debug!(since = ?since, "No alert candidates");
            return Ok(CheckOutcome::Completed(stats));
        }

        let survivors = filter_candidates(candidates, &settings, quiet);
        stats.accepted = survivors.len();

        if !survivors.is_empty() {
            let inserted: HashSet<String> = self.store.save_alerts(&survivors)?.into_iter().collect();
            stats.inserted = inserted.len();
            stats.notified = self.notify_new(&survivors, &inserted);
        }

        self.set_last_check(started_at)?;

        tracing::info!(
            fetched = stats.fetched,
            accepted = stats.accepted,
            inserted = stats.inserted,
            notified = stats.notified,
            quiet_hours = quiet,
            "Alert check complete"
        );
        Ok(CheckOutcome::Completed(stats))
    }

    fn notify_new(&self, survivors: &[Alert], inserted: &HashSet<String>) -> usize {
        if self.notifier.permission() == PermissionStatus::Denied {
            tracing::warn!(
                count = inserted.len(),
                "Notification permission denied, alerts stored without notifying"
            );
            return 0;
        }

        let mut notified = 0;
        for alert in survivors.iter().filter(|a| inserted.contains(&a.id)) {
            match self.notifier.schedule_alert_notification(alert) {
                Ok(_) => notified += 1,
                Err(e) => {
                    tracing::warn!(alert_id = %alert.id, error = %e, "Failed to schedule notification");
                }
            }
        }
        notified
    }

    /// Run one cycle. Never fails: errors are logged and reported as
    /// "no new alerts".
    pub fn check_for_new_alerts(&self) -> bool {
        match self.run_check() {
            Ok(outcome) => outcome.has_new_alerts(),
            Err(e) => {
                tracing::error!(error = %e, "Alert check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::clock::FixedClock;
    use crate::alerts::notifier::DeliveryChannel;
    use crate::alerts::test_support::{make_alert, FailingSource, RecordingDelivery, StaticAlertSource};
    use crate::models::{AlertCategory, AlertStatus, AlertType, SettingsPatch};
    use std::collections::BTreeMap;

    struct Harness {
        kv: Arc<SqliteKvStore>,
        store: AlertStore,
        settings: SettingsStore,
        delivery: Arc<RecordingDelivery>,
        clock: Arc<FixedClock>,
        pipeline: AlertPipeline,
    }

    fn harness_with(source: Arc<dyn AlertSource>, delivery: RecordingDelivery) -> Harness {
        let kv = Arc::new(SqliteKvStore::open_in_memory().unwrap());
        let store = AlertStore::new(kv.clone());
        let delivery = Arc::new(delivery);
        let notifier = Arc::new(Notifier::new(
            delivery.clone(),
            DeliveryChannel::health_alerts(DeliveryChannel::DEFAULT_ID),
        ));
        notifier.request_permission();
        let clock = Arc::new(FixedClock::parse("2026-03-01T12:00:00+00:00").unwrap());
        let pipeline = AlertPipeline::new(
            kv.clone(),
            store.clone(),
            source,
            notifier,
            clock.clone(),
            Duration::minutes(5),
        );
        Harness {
            settings: SettingsStore::new(kv.clone()),
            kv,
            store,
            delivery,
            clock,
            pipeline,
        }
    }

    fn harness(alerts: Vec<Alert>) -> Harness {
        harness_with(Arc::new(StaticAlertSource::new(alerts)), RecordingDelivery::granted())
    }

    #[test]
    fn single_warning_is_stored_and_notified_once() {
        let h = harness(vec![make_alert("bp-1", AlertType::Warning, AlertCategory::BloodPressure)]);

        assert!(h.pipeline.check_for_new_alerts());

        let stored = h.store.get_alerts().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, AlertStatus::Unread);
        assert_eq!(h.delivery.delivered().len(), 1);
        assert_eq!(h.delivery.delivered()[0].data.alert_id, "bp-1");
    }

    #[test]
    fn category_and_severity_gates_both_apply() {
        let diet_warning = vec![make_alert("d-1", AlertType::Warning, AlertCategory::Diet)];
        let mut settings = NotificationSettings::default();

        settings.categories.insert(AlertCategory::Diet, false);
        assert!(filter_candidates(diet_warning.clone(), &settings, false).is_empty());

        settings.categories.insert(AlertCategory::Diet, true);
        settings.warnings_enabled = false;
        assert!(filter_candidates(diet_warning.clone(), &settings, false).is_empty());

        settings.warnings_enabled = true;
        assert_eq!(filter_candidates(diet_warning, &settings, false).len(), 1);
    }

    #[test]
    fn disabled_category_suppresses_end_to_end() {
        let h = harness(vec![make_alert("d-1", AlertType::Warning, AlertCategory::Diet)]);
        h.settings
            .update(&SettingsPatch {
                categories: BTreeMap::from([(AlertCategory::Diet, false)]),
                ..Default::default()
            })
            .unwrap();

        assert!(!h.pipeline.check_for_new_alerts());
        assert!(h.store.get_alerts().unwrap().is_empty());
        assert!(h.delivery.delivered().is_empty());
    }

    #[test]
    fn critical_bypasses_quiet_hours_but_warning_does_not() {
        let h = harness(vec![
            make_alert("crit", AlertType::Critical, AlertCategory::BloodPressure),
            make_alert("warn", AlertType::Warning, AlertCategory::BloodPressure),
        ]);
        h.settings
            .update(&SettingsPatch {
                quiet_hours_enabled: Some(true),
                quiet_hours_start: Some("22:00".into()),
                quiet_hours_end: Some("08:00".into()),
                ..Default::default()
            })
            .unwrap();
        h.clock
            .set(chrono::DateTime::parse_from_rfc3339("2026-03-01T23:00:00+00:00").unwrap());

        let CheckOutcome::Completed(stats) = h.pipeline.run_check().unwrap() else {
            panic!("expected completed cycle");
        };
        assert!(stats.quiet_hours);
        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.accepted, 1);

        let delivered = h.delivery.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].data.alert_id, "crit");
        assert!(h.store.get_alert("warn").unwrap().is_none());
    }

    #[test]
    fn disabled_master_switch_has_no_side_effects() {
        let source = Arc::new(StaticAlertSource::new(vec![make_alert(
            "bp-1",
            AlertType::Critical,
            AlertCategory::BloodPressure,
        )]));
        let h = harness_with(source.clone(), RecordingDelivery::granted());
        h.settings
            .update(&SettingsPatch {
                enabled: Some(false),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            h.pipeline.run_check().unwrap(),
            CheckOutcome::Skipped(SkipReason::Disabled)
        );
        assert!(source.calls().is_empty());
        assert!(h.pipeline.last_check().unwrap().is_none());
        assert!(h.store.get_alerts().unwrap().is_empty());
    }

    #[test]
    fn source_failure_reports_no_new_alerts() {
        let h = harness_with(Arc::new(FailingSource), RecordingDelivery::granted());
        assert!(!h.pipeline.check_for_new_alerts());
        assert!(matches!(h.pipeline.run_check(), Err(AlertError::Source(_))));
        // Window is retried next time
        assert!(h.pipeline.last_check().unwrap().is_none());
        // Lease was released despite the failure
        assert!(h.kv.get(lease::LEASE_KEY).unwrap().is_none());
    }

    #[test]
    fn timestamp_advances_on_empty_fetch() {
        let source = Arc::new(StaticAlertSource::empty());
        let h = harness_with(source.clone(), RecordingDelivery::granted());

        assert!(!h.pipeline.check_for_new_alerts());
        let first = h.pipeline.last_check().unwrap().unwrap();
        assert_eq!(first, h.clock.now());

        h.clock.advance(Duration::minutes(15));
        h.pipeline.check_for_new_alerts();

        assert_eq!(source.calls(), vec![None, Some(first)]);
        assert_eq!(h.pipeline.last_check().unwrap(), Some(h.clock.now()));
    }

    #[test]
    fn held_lease_skips_the_run() {
        let source = Arc::new(StaticAlertSource::new(vec![make_alert(
            "bp-1",
            AlertType::Warning,
            AlertCategory::BloodPressure,
        )]));
        let h = harness_with(source.clone(), RecordingDelivery::granted());

        let _held = lease::try_acquire(&h.kv, h.clock.now(), Duration::minutes(5))
            .unwrap()
            .unwrap();

        assert_eq!(
            h.pipeline.run_check().unwrap(),
            CheckOutcome::Skipped(SkipReason::RunInProgress)
        );
        assert!(!h.pipeline.check_for_new_alerts());
        assert!(source.calls().is_empty());
    }

    #[test]
    fn refetched_alert_is_not_notified_twice() {
        let h = harness(vec![make_alert("bp-1", AlertType::Warning, AlertCategory::BloodPressure)]);

        h.pipeline.check_for_new_alerts();
        h.clock.advance(Duration::minutes(15));
        h.pipeline.check_for_new_alerts();

        assert_eq!(h.delivery.delivered().len(), 1);
        assert_eq!(h.store.get_alerts().unwrap().len(), 1);
    }

    #[test]
    fn later_cycle_notifies_only_the_newly_fetched_alert() {
        let source = Arc::new(StaticAlertSource::new(vec![make_alert(
            "bp-1",
            AlertType::Warning,
            AlertCategory::BloodPressure,
        )]));
        let h = harness_with(source.clone(), RecordingDelivery::granted());

        assert!(h.pipeline.check_for_new_alerts());

        source.set_alerts(vec![
            make_alert("bp-1", AlertType::Warning, AlertCategory::BloodPressure),
            make_alert("med-1", AlertType::Critical, AlertCategory::Medications),
        ]);
        h.clock.advance(Duration::minutes(15));
        assert!(h.pipeline.check_for_new_alerts());

        let delivered = h.delivery.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].data.alert_id, "bp-1");
        assert_eq!(delivered[1].data.alert_id, "med-1");
        assert_eq!(h.store.get_alerts().unwrap().len(), 2);

        let calls = source.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].is_none());
        assert!(calls[1].is_some());
    }

    #[test]
    fn denied_permission_still_stores_alerts() {
        let h = harness_with(
            Arc::new(StaticAlertSource::new(vec![make_alert(
                "bp-1",
                AlertType::Critical,
                AlertCategory::BloodPressure,
            )])),
            RecordingDelivery::denied(),
        );

        assert!(h.pipeline.check_for_new_alerts());
        assert_eq!(h.store.get_alerts().unwrap().len(), 1);
        assert!(h.delivery.delivered().is_empty());
    }

    #[test]
    fn delivery_failure_does_not_fail_the_cycle() {
        let h = harness_with(
            Arc::new(StaticAlertSource::new(vec![make_alert(
                "bp-1",
                AlertType::Warning,
                AlertCategory::BloodPressure,
            )])),
            RecordingDelivery::failing(),
        );

        let CheckOutcome::Completed(stats) = h.pipeline.run_check().unwrap() else {
            panic!("expected completed cycle");
        };
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.notified, 0);
        assert!(h.pipeline.last_check().unwrap().is_some());
    }
}

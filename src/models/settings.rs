use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::enums::{AlertCategory, AlertType};

/// Default quiet-hours window, used until the user picks one.
pub const DEFAULT_QUIET_HOURS_START: &str = "22:00";
pub const DEFAULT_QUIET_HOURS_END: &str = "07:00";

/// User notification preferences (singleton per installation).
///
/// `#[serde(default)]` lets records written before a field existed load
/// with that field at its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub critical_alerts_enabled: bool,
    pub warnings_enabled: bool,
    pub reminders_enabled: bool,
    pub info_enabled: bool,
    pub quiet_hours_enabled: bool,
    pub quiet_hours_start: String,
    pub quiet_hours_end: String,
    pub categories: BTreeMap<AlertCategory, bool>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            critical_alerts_enabled: true,
            warnings_enabled: true,
            reminders_enabled: true,
            info_enabled: true,
            quiet_hours_enabled: false,
            quiet_hours_start: DEFAULT_QUIET_HOURS_START.to_string(),
            quiet_hours_end: DEFAULT_QUIET_HOURS_END.to_string(),
            categories: AlertCategory::all().iter().map(|c| (*c, true)).collect(),
        }
    }
}

type SeverityFlag = fn(&NotificationSettings) -> bool;

fn critical_flag(s: &NotificationSettings) -> bool {
    s.critical_alerts_enabled
}

fn warning_flag(s: &NotificationSettings) -> bool {
    s.warnings_enabled
}

fn reminder_flag(s: &NotificationSettings) -> bool {
    s.reminders_enabled
}

fn info_flag(s: &NotificationSettings) -> bool {
    s.info_enabled
}

/// Severity → settings toggle. New severities get a row here.
const SEVERITY_FLAGS: &[(AlertType, SeverityFlag)] = &[
    (AlertType::Critical, critical_flag),
    (AlertType::Warning, warning_flag),
    (AlertType::Reminder, reminder_flag),
    (AlertType::Info, info_flag),
];

impl NotificationSettings {
    /// Whether the toggle for this severity is on. Unmapped severities are off.
    pub fn severity_enabled(&self, alert_type: AlertType) -> bool {
        SEVERITY_FLAGS
            .iter()
            .find(|(t, _)| *t == alert_type)
            .is_some_and(|(_, flag)| flag(self))
    }

    /// Categories missing from the map (added after the record was saved)
    /// count as enabled.
    pub fn category_enabled(&self, category: AlertCategory) -> bool {
        self.categories.get(&category).copied().unwrap_or(true)
    }
}

/// Partial settings update. `None` leaves the field untouched; category
/// entries are merged key by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub enabled: Option<bool>,
    pub critical_alerts_enabled: Option<bool>,
    pub warnings_enabled: Option<bool>,
    pub reminders_enabled: Option<bool>,
    pub info_enabled: Option<bool>,
    pub quiet_hours_enabled: Option<bool>,
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
    pub categories: BTreeMap<AlertCategory, bool>,
}

impl SettingsPatch {
    pub fn apply_to(&self, settings: &mut NotificationSettings) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut settings.enabled, &self.enabled);
        set(&mut settings.critical_alerts_enabled, &self.critical_alerts_enabled);
        set(&mut settings.warnings_enabled, &self.warnings_enabled);
        set(&mut settings.reminders_enabled, &self.reminders_enabled);
        set(&mut settings.info_enabled, &self.info_enabled);
        set(&mut settings.quiet_hours_enabled, &self.quiet_hours_enabled);
        set(&mut settings.quiet_hours_start, &self.quiet_hours_start);
        set(&mut settings.quiet_hours_end, &self.quiet_hours_end);

        for (category, enabled) in &self.categories {
            settings.categories.insert(*category, *enabled);
        }
    }
}

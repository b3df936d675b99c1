use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn all() -> &'static [$name] {
                &[$(Self::$variant),+]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(AlertType {
    Critical => "CRITICAL",
    Warning => "WARNING",
    Reminder => "REMINDER",
    Info => "INFO",
});

str_enum!(AlertCategory {
    BloodPressure => "BLOOD_PRESSURE",
    Cholesterol => "CHOLESTEROL",
    Medications => "MEDICATIONS",
    Exercise => "EXERCISE",
    Diet => "DIET",
    Appointment => "APPOINTMENT",
    General => "GENERAL",
});

str_enum!(AlertStatus {
    Unread => "UNREAD",
    Read => "READ",
    ActedUpon => "ACTED_UPON",
    Dismissed => "DISMISSED",
});

impl AlertType {
    /// Life-safety alerts are never silenced by quiet hours.
    pub fn bypasses_quiet_hours(&self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl AlertStatus {
    /// Position along UNREAD → READ → {ACTED_UPON, DISMISSED}.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Unread => 0,
            Self::Read => 1,
            Self::ActedUpon | Self::Dismissed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Whether `self → next` is a single legal step.
    ///
    /// Re-applying the current status is accepted as a no-op.
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Self::Unread, Self::Read) | (Self::Read, Self::ActedUpon) | (Self::Read, Self::Dismissed)
        )
    }
}

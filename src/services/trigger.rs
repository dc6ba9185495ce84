use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Five-field cron trigger (minute, hour, day of month, month, any weekday)
/// derived from a fire time in a civil timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CronTrigger {
    pub minute: u32,
    pub hour: u32,
    pub day: u32,
    pub month: u32,
}

impl CronTrigger {
    pub fn from_instant(at: DateTime<Utc>, tz: Tz) -> Self {
        let local = at.with_timezone(&tz);
        Self {
            minute: local.minute(),
            hour: local.hour(),
            day: local.day(),
            month: local.month(),
        }
    }

    /// Whether the wall clock in `tz` matches this trigger at `at`.
    pub fn matches(&self, at: DateTime<Utc>, tz: Tz) -> bool {
        *self == Self::from_instant(at, tz)
    }
}

impl std::fmt::Display for CronTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} {} *", self.minute, self.hour, self.day, self.month)
    }
}

/// The instant a trigger for `at` goes off: the start of its minute in `tz`.
/// Unlike the bare five fields this keeps the year, so a date a year out
/// never fires early.
pub fn fire_instant(at: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = at.with_timezone(&tz);
    tz.with_ymd_and_hms(
        local.year(),
        local.month(),
        local.day(),
        local.hour(),
        local.minute(),
        0,
    )
    .earliest()
    .map(|t| t.with_timezone(&Utc))
    .unwrap_or(at)
}

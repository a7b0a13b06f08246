//! Effective expiration rules.
//!
//! An item's printed date is only the fallback. Fresh produce, opened
//! packages and items tracked with advanced (long-life) expiry each override
//! it, in that priority order. All "N days later" arithmetic is calendar
//! arithmetic in the user's time zone, so a DST change never shifts an
//! expiry by an hour.

use chrono::{DateTime, Days, Duration, Local, LocalResult, NaiveDate, Offset, TimeZone, Utc};
use serde::Serialize;

use crate::models::PerishableItem;

pub const FRESH_SHELF_LIFE_DAYS: u64 = 3;
pub const OPENED_SHELF_LIFE_DAYS: u64 = 3;
pub const ADVANCED_SHELF_LIFE_DAYS: u64 = 120;

/// The rule that decides an item's effective expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryRule {
    Fresh,
    Opened { opened_at: DateTime<Utc> },
    AdvancedUnopened,
    Nominal,
}

/// First matching rule wins: fresh, then opened (only with an opening
/// timestamp), then advanced expiry while unopened, then the printed date.
#[must_use]
pub fn governing_rule(item: &PerishableItem) -> ExpiryRule {
    if item.is_fresh {
        return ExpiryRule::Fresh;
    }
    if item.is_opened {
        if let Some(opened_at) = item.opened_at {
            return ExpiryRule::Opened { opened_at };
        }
    }
    if item.use_advanced_expiry && !item.is_opened {
        return ExpiryRule::AdvancedUnopened;
    }
    ExpiryRule::Nominal
}

/// Effective expiration using the system time zone.
#[must_use]
pub fn effective_expiration(item: &PerishableItem) -> DateTime<Utc> {
    effective_expiration_in(item, &Local)
}

#[must_use]
pub fn effective_expiration_in<Tz: TimeZone>(item: &PerishableItem, tz: &Tz) -> DateTime<Utc> {
    match governing_rule(item) {
        ExpiryRule::Fresh => add_calendar_days(item.created_at, FRESH_SHELF_LIFE_DAYS, tz),
        ExpiryRule::Opened { opened_at } => {
            add_calendar_days(opened_at, OPENED_SHELF_LIFE_DAYS, tz)
        }
        ExpiryRule::AdvancedUnopened => {
            add_calendar_days(item.created_at, ADVANCED_SHELF_LIFE_DAYS, tz)
        }
        ExpiryRule::Nominal => item.expiration_date,
    }
}

/// Add `days` calendar days to `instant`, keeping the local wall-clock time
/// in `tz`.
///
/// An ambiguous wall-clock result (clocks fell back) resolves to the earlier
/// instant. A wall-clock result skipped by a spring-forward transition is
/// read with the offset in force before the transition, which lands the
/// same distance past the gap.
#[must_use]
pub fn add_calendar_days<Tz: TimeZone>(instant: DateTime<Utc>, days: u64, tz: &Tz) -> DateTime<Utc> {
    let local = instant.with_timezone(tz).naive_local();
    let Some(shifted) = local.checked_add_days(Days::new(days)) else {
        return DateTime::<Utc>::MAX_UTC;
    };
    match tz.from_local_datetime(&shifted) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let before_gap = tz
                .offset_from_utc_datetime(&(shifted - Duration::days(1)))
                .fix();
            (shifted - Duration::seconds(i64::from(before_gap.local_minus_utc()))).and_utc()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    Expired,
    ExpiresToday,
    ExpiringSoon,
    Fresh,
}

impl ExpiryStatus {
    #[must_use]
    pub fn from_days_left(days_left: i64, warn_days: i64) -> Self {
        match days_left {
            d if d < 0 => Self::Expired,
            0 => Self::ExpiresToday,
            d if d <= warn_days => Self::ExpiringSoon,
            _ => Self::Fresh,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::ExpiresToday => "today",
            Self::ExpiringSoon => "soon",
            Self::Fresh => "fresh",
        }
    }
}

/// Whole local calendar days from `today` until the item's effective
/// expiration day. Negative once expired.
#[must_use]
pub fn days_until_expiry_in<Tz: TimeZone>(item: &PerishableItem, today: NaiveDate, tz: &Tz) -> i64 {
    let expiry_day = effective_expiration_in(item, tz)
        .with_timezone(tz)
        .date_naive();
    (expiry_day - today).num_days()
}

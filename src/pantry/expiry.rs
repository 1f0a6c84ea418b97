//! Expiry classification. Dates are calendar days; an expiry date counts
//! as midnight UTC at the start of that day.

use serde::Serialize;
use strum::{AsRefStr, Display};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

pub const DEFAULT_SOON_WITHIN_DAYS: u32 = 7;

const NANOS_PER_DAY: i128 = 86_400 * 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExpiryStatus {
    Expired,
    Soon,
    Ok,
}

impl ExpiryStatus {
    pub fn badge(self) -> &'static str {
        match self {
            ExpiryStatus::Expired => "EXPIRED",
            ExpiryStatus::Soon => "SOON",
            ExpiryStatus::Ok => "OK",
        }
    }
}

pub fn parse_expiry(text: &str) -> Option<Date> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Date::parse(text, format_description!("[year]-[month]-[day]")).ok()
}

/// Whole days from `now` until the expiry date, rounded up.
pub fn days_until(expiry: Date, now: OffsetDateTime) -> i64 {
    let remaining = expiry.midnight().assume_utc() - now;
    let nanos = remaining.whole_nanoseconds();
    let whole = nanos / NANOS_PER_DAY;
    let days = if nanos % NANOS_PER_DAY > 0 {
        whole + 1
    } else {
        whole
    };
    days as i64
}

pub fn classify_days(days: i64, soon_within_days: u32) -> ExpiryStatus {
    if days <= 0 {
        ExpiryStatus::Expired
    } else if days <= i64::from(soon_within_days) {
        ExpiryStatus::Soon
    } else {
        ExpiryStatus::Ok
    }
}

pub fn classify(expiry: Date, now: OffsetDateTime, soon_within_days: u32) -> ExpiryStatus {
    classify_days(days_until(expiry, now), soon_within_days)
}

/// Status of a stored expiry text. `None` when the text is empty or not a
/// `YYYY-MM-DD` date.
pub fn status_of(text: &str, now: OffsetDateTime, soon_within_days: u32) -> Option<ExpiryStatus> {
    parse_expiry(text).map(|date| classify(date, now, soon_within_days))
}

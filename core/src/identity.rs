//! Content-derived identity keys.
//!
//! Two items are "the same purchase" when their normalized name, storage
//! category and effective expiration day agree. The opaque item id plays no
//! part: independently created duplicates must collapse on merge.

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::expiry::effective_expiration_in;
use crate::models::{PerishableItem, StorageCategory};

/// ASCII unit separator. Cannot be typed into a name field, so key parts
/// never run into each other.
pub const KEY_SEPARATOR: char = '\u{1f}';

#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Identity key using the system time zone for the calendar day.
#[must_use]
pub fn identity_key(name: &str, category: StorageCategory, effective: DateTime<Utc>) -> String {
    identity_key_in(name, category, effective, &Local)
}

#[must_use]
pub fn identity_key_in<Tz: TimeZone>(
    name: &str,
    category: StorageCategory,
    effective: DateTime<Utc>,
    tz: &Tz,
) -> String {
    let day = effective.with_timezone(tz).date_naive();
    format!(
        "{name}{sep}{category}{sep}{day}",
        name = normalize_name(name),
        sep = KEY_SEPARATOR,
        category = category.as_str(),
        day = day.format("%Y-%m-%d"),
    )
}

/// Key for an item, derived from its own flags and timestamps.
#[must_use]
pub fn item_identity_key_in<Tz: TimeZone>(item: &PerishableItem, tz: &Tz) -> String {
    identity_key_in(
        &item.name,
        item.category,
        effective_expiration_in(item, tz),
        tz,
    )
}

#[must_use]
pub fn item_identity_key(item: &PerishableItem) -> String {
    item_identity_key_in(item, &Local)
}

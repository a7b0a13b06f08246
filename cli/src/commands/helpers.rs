use anyhow::{Context, Result, bail};
use chrono::{DateTime, Days, Local, NaiveDate, TimeZone, Utc};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};
use uuid::Uuid;

use larder_core::models::DietaryTags;
use larder_core::service::InventoryEntry;

/// Parse a calendar day: YYYY-MM-DD, today/tomorrow/yesterday, or an offset
/// like `+5d` / `+2w` from today.
pub(crate) fn parse_day(s: &str, today: NaiveDate) -> Result<NaiveDate> {
    let s = s.trim();
    match s.to_lowercase().as_str() {
        "today" => return Ok(today),
        "tomorrow" => return Ok(today + chrono::Duration::days(1)),
        "yesterday" => return Ok(today - chrono::Duration::days(1)),
        _ => {}
    }

    if let Some(offset) = s.strip_prefix('+') {
        let Some(unit) = offset.chars().last() else {
            bail!("Invalid offset '{s}'. Use e.g. +5d or +2w");
        };
        let count: u64 = offset[..offset.len() - unit.len_utf8()]
            .parse()
            .with_context(|| format!("Invalid offset '{s}'. Use e.g. +5d or +2w"))?;
        let days = match unit {
            'd' | 'D' => count,
            'w' | 'W' => count.saturating_mul(7),
            _ => bail!("Invalid offset '{s}'. Use e.g. +5d or +2w"),
        };
        return today
            .checked_add_days(Days::new(days))
            .with_context(|| format!("Offset '{s}' is too far in the future"));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| {
        format!("Invalid date '{s}'. Use YYYY-MM-DD, today/tomorrow, or +Nd")
    })
}

/// Expiry dates are entered as days and stored as local noon of that day.
pub(crate) fn parse_expiry(s: &str) -> Result<DateTime<Utc>> {
    let day = parse_day(s, Local::now().date_naive())?;
    local_noon(day)
}

fn local_noon(day: NaiveDate) -> Result<DateTime<Utc>> {
    let noon = day
        .and_hms_opt(12, 0, 0)
        .context("Invalid time of day")?;
    Local
        .from_local_datetime(&noon)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("{day} 12:00 does not exist in the local time zone"))
}

/// Parse dietary tags given as `--tag vegan --tag gluten-free`.
pub(crate) fn parse_tags(values: &[String]) -> Result<DietaryTags> {
    let mut tags = DietaryTags::default();
    for value in values {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "vegetarian" => tags.vegetarian = true,
            "vegan" => tags.vegan = true,
            "gluten-free" => tags.gluten_free = true,
            "lactose-free" => tags.lactose_free = true,
            "organic" => tags.organic = true,
            "ready-to-eat" => tags.ready_to_eat = true,
            _ => bail!(
                "Unknown tag '{value}'. Use: vegetarian, vegan, gluten-free, lactose-free, organic, ready-to-eat"
            ),
        }
    }
    Ok(tags)
}

pub(crate) fn parse_switch(s: &str) -> Result<bool> {
    match s.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => bail!("Invalid value '{s}'. Use on/off"),
    }
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).with_context(|| format!("Invalid ID '{s}'"))
}

pub(crate) fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

pub(crate) fn local_day(instant: DateTime<Utc>) -> String {
    instant
        .with_timezone(&Local)
        .format("%Y-%m-%d")
        .to_string()
}

pub(crate) fn print_inventory_table(entries: &[InventoryEntry]) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Where")]
        category: String,
        #[tabled(rename = "Qty")]
        quantity: i64,
        #[tabled(rename = "Expires")]
        expires: String,
        #[tabled(rename = "Days")]
        days: i64,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Tags")]
        tags: String,
    }

    let rows: Vec<ItemRow> = entries
        .iter()
        .map(|e| ItemRow {
            id: short_id(e.item.id),
            name: truncate(&e.item.name, 30),
            category: e.item.category.to_string(),
            quantity: e.item.quantity,
            expires: local_day(e.effective_expiration),
            days: e.days_until_expiry,
            status: if e.item.is_consumed {
                "consumed".to_string()
            } else {
                e.status.label().to_string()
            },
            tags: e.item.tags.labels().join(", "),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .with(Modify::new(Columns::new(5..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

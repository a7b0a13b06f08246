use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use larder_core::expiry::{ExpiryRule, governing_rule};
use larder_core::models::{ItemFilter, NewItem, StorageCategory, UpdateItem};
use larder_core::service::{InventoryEntry, LarderService};

use super::helpers::{local_day, parse_expiry, parse_tags, print_inventory_table, short_id};

#[derive(clap::Args)]
pub(crate) struct AddArgs {
    /// Item name
    pub name: String,
    /// Where it is kept: fridge, freezer, pantry (default: fridge)
    #[arg(short, long)]
    pub category: Option<String>,
    /// Printed expiration date (YYYY-MM-DD, today, tomorrow, +5d, +2w)
    #[arg(short, long)]
    pub expires: Option<String>,
    /// How many
    #[arg(short, long, default_value = "1")]
    pub quantity: i64,
    /// Free-form note
    #[arg(long)]
    pub note: Option<String>,
    /// Product barcode
    #[arg(long)]
    pub barcode: Option<String>,
    /// Food type (built-in or custom)
    #[arg(long)]
    pub food_type: Option<String>,
    /// Fresh produce: expires a few days after it was added
    #[arg(long)]
    pub fresh: bool,
    /// Long-life tracking: ignore the printed date until opened
    #[arg(long, conflicts_with = "fresh")]
    pub advanced: bool,
    /// Don't include this item in expiry reminders
    #[arg(long)]
    pub no_notify: bool,
    /// Dietary tag, repeatable: vegetarian, vegan, gluten-free, lactose-free, organic, ready-to-eat
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Photo of the item
    #[arg(long)]
    pub image: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub(crate) struct UpdateArgs {
    /// Item ID or unique prefix
    pub id: String,
    /// New name
    #[arg(long)]
    pub name: Option<String>,
    /// New place: fridge, freezer, pantry
    #[arg(short, long)]
    pub category: Option<String>,
    /// New printed expiration date
    #[arg(short, long)]
    pub expires: Option<String>,
    /// New quantity
    #[arg(short, long)]
    pub quantity: Option<i64>,
    /// New note (empty string clears it)
    #[arg(long)]
    pub note: Option<String>,
    /// New barcode (empty string clears it)
    #[arg(long)]
    pub barcode: Option<String>,
    /// New food type (empty string clears it)
    #[arg(long)]
    pub food_type: Option<String>,
    /// Replace all dietary tags, repeatable
    #[arg(long = "tag")]
    pub tags: Option<Vec<String>>,
    /// Mark as fresh produce or not
    #[arg(long)]
    pub fresh: Option<bool>,
    /// Use long-life tracking or not
    #[arg(long)]
    pub advanced: Option<bool>,
    /// Include in expiry reminders or not
    #[arg(long)]
    pub notify: Option<bool>,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub(crate) fn cmd_item_add(svc: &LarderService, args: &AddArgs) -> Result<()> {
    let category = args
        .category
        .as_deref()
        .map(str::parse::<StorageCategory>)
        .transpose()?;
    let expiration_date = args.expires.as_deref().map(parse_expiry).transpose()?;
    let image = match &args.image {
        Some(path) => Some(
            std::fs::read(path)
                .with_context(|| format!("Failed to read image {}", path.display()))?,
        ),
        None => None,
    };

    let item = svc.add_item(&NewItem {
        name: args.name.clone(),
        category,
        expiration_date,
        quantity: args.quantity,
        note: args.note.clone(),
        barcode: args.barcode.clone(),
        notify: !args.no_notify,
        image,
        food_type: args.food_type.clone(),
        tags: parse_tags(&args.tags)?,
        is_fresh: args.fresh,
        use_advanced_expiry: args.advanced,
    })?;
    let entry = svc.inventory_entry(item)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "Added {} x{} to the {} [{}], use by {}",
            entry.item.name,
            entry.item.quantity,
            entry.item.category,
            short_id(entry.item.id),
            local_day(entry.effective_expiration)
        );
    }

    Ok(())
}

pub(crate) fn cmd_item_list(
    svc: &LarderService,
    category: Option<&str>,
    all: bool,
    json: bool,
) -> Result<()> {
    let category = category.map(str::parse::<StorageCategory>).transpose()?;
    let show_consumed = all || svc.current_settings()?.show_consumed;
    let entries = svc.list_inventory(&ItemFilter {
        category,
        include_consumed: show_consumed,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!("No items found. Use `larder item add` to track something.");
    } else {
        print_inventory_table(&entries);
    }

    Ok(())
}

pub(crate) fn cmd_item_show(svc: &LarderService, id: &str, json: bool) -> Result<()> {
    let item = svc.resolve_item(id)?;
    let entry = svc.inventory_entry(item)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        print_item_details(&entry);
    }

    Ok(())
}

fn print_item_details(entry: &InventoryEntry) {
    let item = &entry.item;
    println!("{} ({})", item.name, item.id);
    println!("  Where:     {}", item.category);
    println!("  Quantity:  {}", item.quantity);
    println!("  Printed:   {}", local_day(item.expiration_date));
    println!(
        "  Use by:    {} ({}, {} days, {})",
        local_day(entry.effective_expiration),
        rule_description(governing_rule(item)),
        entry.days_until_expiry,
        entry.status.label()
    );
    if let Some(food_type) = &item.food_type {
        println!("  Type:      {food_type}");
    }
    let tags = item.tags.labels();
    if !tags.is_empty() {
        println!("  Tags:      {}", tags.join(", "));
    }
    if let Some(barcode) = &item.barcode {
        println!("  Barcode:   {barcode}");
    }
    if let Some(note) = &item.note {
        println!("  Note:      {note}");
    }
    if let Some(image) = &item.image {
        println!("  Image:     {} bytes", image.len());
    }
    if !item.notify {
        println!("  Reminders: off");
    }
    if let Some(consumed_at) = item.consumed_at.filter(|_| item.is_consumed) {
        println!("  Consumed:  {}", local_day(consumed_at));
    }
    println!("  Added:     {}", local_day(item.created_at));
}

fn rule_description(rule: ExpiryRule) -> String {
    match rule {
        ExpiryRule::Fresh => "fresh produce".to_string(),
        ExpiryRule::Opened { opened_at } => format!("opened {}", local_day(opened_at)),
        ExpiryRule::AdvancedUnopened => "long-life, unopened".to_string(),
        ExpiryRule::Nominal => "printed date".to_string(),
    }
}

pub(crate) fn cmd_item_update(svc: &LarderService, args: &UpdateArgs) -> Result<()> {
    let item = svc.resolve_item(&args.id)?;

    let update = UpdateItem {
        name: args.name.clone(),
        category: args
            .category
            .as_deref()
            .map(str::parse::<StorageCategory>)
            .transpose()?,
        expiration_date: args.expires.as_deref().map(parse_expiry).transpose()?,
        quantity: args.quantity,
        note: args.note.clone(),
        barcode: args.barcode.clone(),
        notify: args.notify,
        food_type: args.food_type.clone(),
        tags: args.tags.as_deref().map(parse_tags).transpose()?,
        is_fresh: args.fresh,
        use_advanced_expiry: args.advanced,
    };

    let has_changes = update.name.is_some()
        || update.category.is_some()
        || update.expiration_date.is_some()
        || update.quantity.is_some()
        || update.note.is_some()
        || update.barcode.is_some()
        || update.notify.is_some()
        || update.food_type.is_some()
        || update.tags.is_some()
        || update.is_fresh.is_some()
        || update.use_advanced_expiry.is_some();
    if !has_changes {
        bail!("Nothing to update. Pass at least one field, e.g. --quantity 2");
    }

    let updated = svc.update_item(item.id, &update)?;
    let entry = svc.inventory_entry(updated)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "Updated {} [{}], use by {}",
            entry.item.name,
            short_id(entry.item.id),
            local_day(entry.effective_expiration)
        );
    }

    Ok(())
}

pub(crate) fn cmd_item_open(svc: &LarderService, id: &str, json: bool) -> Result<()> {
    let item = svc.resolve_item(id)?;
    let was_opened = item.is_opened;
    let entry = svc.inventory_entry(svc.open_item(item.id)?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else if was_opened {
        println!(
            "{} was already opened, use by {}",
            entry.item.name,
            local_day(entry.effective_expiration)
        );
    } else {
        println!(
            "Opened {}, use by {}",
            entry.item.name,
            local_day(entry.effective_expiration)
        );
    }

    Ok(())
}

pub(crate) fn cmd_item_consume(svc: &LarderService, id: &str, json: bool) -> Result<()> {
    let item = svc.resolve_item(id)?;
    let consumed = svc.consume_item(item.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&consumed)?);
    } else {
        println!("Marked {} as consumed", consumed.name);
    }

    Ok(())
}

pub(crate) fn cmd_item_delete(svc: &LarderService, id: &str, json: bool) -> Result<()> {
    let item = svc.resolve_item(id)?;
    if !svc.delete_item(item.id)? {
        bail!("Item {} not found", item.id);
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": item.id }));
    } else {
        println!("Deleted {} [{}]", item.name, short_id(item.id));
    }

    Ok(())
}

pub(crate) fn cmd_expiring(svc: &LarderService, days: Option<i64>, json: bool) -> Result<()> {
    if days.is_some_and(|d| d < 0) {
        bail!("--days must not be negative");
    }
    let entries = svc.expiring_items(days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("Nothing expires soon.");
    } else {
        print_inventory_table(&entries);
    }

    Ok(())
}

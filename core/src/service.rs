use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::ReconcileError;
use crate::expiry::{ExpiryStatus, add_calendar_days, days_until_expiry_in, effective_expiration_in};
use crate::models::{
    AppSettings, CustomFoodType, ItemFilter, NewItem, PerishableItem, ProductInfo,
    ReconciliationResult, Strategy, UpdateItem, UserProfile, validate_settings,
};
use crate::reconcile;
use crate::snapshot::Snapshot;

/// Host-provided product lookup.
///
/// The crate ships no network client; the surrounding application (or a
/// test) supplies one. Called synchronously, so hosts with a UI should call
/// `LarderService` from a background thread.
pub trait ProductLookupProvider: Send + Sync {
    fn lookup_barcode(&self, barcode: &str) -> Result<Option<ProductInfo>>;
}

/// An item together with its computed expiry state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    #[serde(flatten)]
    pub item: PerishableItem,
    pub effective_expiration: DateTime<Utc>,
    pub days_until_expiry: i64,
    pub status: ExpiryStatus,
}

impl InventoryEntry {
    fn new<Tz: TimeZone>(item: PerishableItem, today: NaiveDate, tz: &Tz, warn_days: i64) -> Self {
        let days_until_expiry = days_until_expiry_in(&item, today, tz);
        Self {
            effective_expiration: effective_expiration_in(&item, tz),
            days_until_expiry,
            status: ExpiryStatus::from_days_left(days_until_expiry, warn_days),
            item,
        }
    }
}

pub struct LarderService {
    db: Database,
}

impl LarderService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Items ---

    pub fn add_item(&self, item: &NewItem) -> Result<PerishableItem> {
        self.db.insert_item(item)
    }

    pub fn get_item(&self, id: Uuid) -> Result<PerishableItem> {
        self.db.get_item(id)
    }

    /// Find an item by full id or by an unambiguous id prefix.
    pub fn resolve_item(&self, id_or_prefix: &str) -> Result<PerishableItem> {
        if let Ok(id) = Uuid::parse_str(id_or_prefix.trim()) {
            return self.db.get_item(id);
        }
        let mut matches = self.db.find_items_by_id_prefix(id_or_prefix)?;
        match matches.len() {
            0 => bail!("No item matches id '{id_or_prefix}'"),
            1 => Ok(matches.remove(0)),
            n => bail!("Id prefix '{id_or_prefix}' is ambiguous ({n} items); use more characters"),
        }
    }

    /// One item with its expiry state as of today in the local time zone.
    pub fn inventory_entry(&self, item: PerishableItem) -> Result<InventoryEntry> {
        let warn_days = self.current_settings()?.notify_days_before;
        Ok(InventoryEntry::new(
            item,
            Local::now().date_naive(),
            &Local,
            warn_days,
        ))
    }

    pub fn update_item(&self, id: Uuid, update: &UpdateItem) -> Result<PerishableItem> {
        self.db.update_item(id, update)
    }

    pub fn open_item(&self, id: Uuid) -> Result<PerishableItem> {
        self.db.mark_opened(id, Utc::now())
    }

    pub fn consume_item(&self, id: Uuid) -> Result<PerishableItem> {
        self.db.mark_consumed(id, Utc::now())
    }

    pub fn delete_item(&self, id: Uuid) -> Result<bool> {
        self.db.delete_item(id)
    }

    /// Items sorted by effective expiration, soonest first.
    pub fn list_inventory(&self, filter: &ItemFilter) -> Result<Vec<InventoryEntry>> {
        self.list_inventory_in(filter, Local::now().date_naive(), &Local)
    }

    pub fn list_inventory_in<Tz: TimeZone>(
        &self,
        filter: &ItemFilter,
        today: NaiveDate,
        tz: &Tz,
    ) -> Result<Vec<InventoryEntry>> {
        let warn_days = self.current_settings()?.notify_days_before;
        let mut entries: Vec<InventoryEntry> = self
            .db
            .list_items(filter)?
            .into_iter()
            .map(|item| InventoryEntry::new(item, today, tz, warn_days))
            .collect();
        entries.sort_by(|a, b| {
            a.effective_expiration
                .cmp(&b.effective_expiration)
                .then_with(|| a.item.name.to_lowercase().cmp(&b.item.name.to_lowercase()))
        });
        Ok(entries)
    }

    /// Unconsumed items that are expired or expire within `within_days`
    /// (the settings' notice period when `None`).
    pub fn expiring_items(&self, within_days: Option<i64>) -> Result<Vec<InventoryEntry>> {
        self.expiring_items_in(within_days, Local::now().date_naive(), &Local)
    }

    pub fn expiring_items_in<Tz: TimeZone>(
        &self,
        within_days: Option<i64>,
        today: NaiveDate,
        tz: &Tz,
    ) -> Result<Vec<InventoryEntry>> {
        let horizon = match within_days {
            Some(days) => days,
            None => self.current_settings()?.notify_days_before,
        };
        let mut entries = self.list_inventory_in(&ItemFilter::default(), today, tz)?;
        entries.retain(|entry| entry.days_until_expiry <= horizon);
        Ok(entries)
    }

    // --- Barcode lookup ---

    /// Add an item for a scanned barcode. Details come from the newest local
    /// item with the same barcode when there is one, otherwise from the
    /// provider. Returns `None` when neither knows the code.
    ///
    /// The expiration date falls back to the product's typical shelf life
    /// counted from today.
    pub fn add_item_from_barcode(
        &self,
        provider: &dyn ProductLookupProvider,
        barcode: &str,
        expiration_date: Option<DateTime<Utc>>,
    ) -> Result<Option<PerishableItem>> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            bail!("Barcode must not be empty");
        }

        let product = match self.db.find_latest_by_barcode(barcode)? {
            Some(known) => Some(ProductInfo {
                name: known.name,
                category: Some(known.category),
                food_type: known.food_type,
                shelf_life_days: None,
                tags: known.tags,
            }),
            None => provider
                .lookup_barcode(barcode)
                .with_context(|| format!("Product lookup failed for barcode {barcode}"))?,
        };
        let Some(product) = product else {
            return Ok(None);
        };

        let expiration_date = match (expiration_date, product.shelf_life_days) {
            (Some(date), _) => date,
            (None, Some(days)) => add_calendar_days(Utc::now(), days, &Local),
            (None, None) => bail!(
                "No shelf life known for '{}'; pass an expiration date",
                product.name
            ),
        };

        let item = self.db.insert_item(&NewItem {
            name: product.name,
            category: product.category,
            expiration_date: Some(expiration_date),
            barcode: Some(barcode.to_string()),
            food_type: product.food_type,
            tags: product.tags,
            ..NewItem::default()
        })?;
        Ok(Some(item))
    }

    // --- Settings ---

    /// The settings record, created with defaults on first access.
    pub fn get_settings(&self) -> Result<AppSettings> {
        self.db.get_settings()
    }

    /// The stored settings, or the defaults when there is no record yet.
    /// Never writes, so a later merge can still seed settings from a
    /// snapshot.
    pub fn current_settings(&self) -> Result<AppSettings> {
        Ok(self.db.find_settings()?.unwrap_or_default())
    }

    /// Validate and store `settings`, stamping `updated_at`.
    pub fn save_settings(&self, mut settings: AppSettings) -> Result<AppSettings> {
        validate_settings(&settings)?;
        settings.updated_at = Utc::now();
        self.db.put_settings(&settings)?;
        Ok(settings)
    }

    // --- Profiles and custom food types ---

    pub fn add_profile(&self, name: &str, household_size: i64) -> Result<UserProfile> {
        self.db.insert_profile(name, household_size)
    }

    pub fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        Ok(self.db.list_profiles()?)
    }

    pub fn delete_profile(&self, id: Uuid) -> Result<bool> {
        self.db.delete_profile(id)
    }

    pub fn add_food_type(&self, name: &str, emoji: Option<&str>) -> Result<CustomFoodType> {
        self.db.insert_food_type(name, emoji)
    }

    pub fn list_food_types(&self) -> Result<Vec<CustomFoodType>> {
        Ok(self.db.list_food_types()?)
    }

    pub fn delete_food_type(&self, id: Uuid) -> Result<bool> {
        self.db.delete_food_type(id)
    }

    // --- Export / Import ---

    pub fn export(&self) -> Result<Snapshot> {
        let dataset = self.db.load_dataset()?;
        Ok(Snapshot::encode(&dataset))
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(self.export()?.to_json()?)
    }

    pub fn import(
        &self,
        snapshot: &Snapshot,
        strategy: Strategy,
    ) -> Result<ReconciliationResult, ReconcileError> {
        reconcile::reconcile(&self.db, snapshot, strategy)
    }

    pub fn import_json(
        &self,
        json: &str,
        strategy: Strategy,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let snapshot = Snapshot::from_json(json)?;
        self.import(&snapshot, strategy)
    }

    /// Report what `import` would do without changing anything.
    pub fn preview_import(
        &self,
        snapshot: &Snapshot,
        strategy: Strategy,
    ) -> Result<ReconciliationResult, ReconcileError> {
        reconcile::preview(&self.db, snapshot, strategy)
    }
}

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an item is kept. Closed set; the lowercase name is the canonical
/// string used in the database, the snapshot document, and identity keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageCategory {
    Fridge,
    Freezer,
    Pantry,
}

impl StorageCategory {
    pub const ALL: [StorageCategory; 3] = [Self::Fridge, Self::Freezer, Self::Pantry];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fridge => "fridge",
            Self::Freezer => "freezer",
            Self::Pantry => "pantry",
        }
    }
}

impl fmt::Display for StorageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fridge" | "refrigerated" | "refrigerator" => Ok(Self::Fridge),
            "freezer" | "frozen" => Ok(Self::Freezer),
            "pantry" | "shelf" | "cupboard" => Ok(Self::Pantry),
            _ => Err(anyhow!(
                "Invalid storage category '{s}'. Must be one of: fridge, freezer, pantry"
            )),
        }
    }
}

/// Dietary and preparation tags. A fixed set; absent tags read as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DietaryTags {
    #[serde(rename = "isVegetarian")]
    pub vegetarian: bool,
    #[serde(rename = "isVegan")]
    pub vegan: bool,
    #[serde(rename = "isGlutenFree")]
    pub gluten_free: bool,
    #[serde(rename = "isLactoseFree")]
    pub lactose_free: bool,
    #[serde(rename = "isOrganic")]
    pub organic: bool,
    #[serde(rename = "isReadyToEat")]
    pub ready_to_eat: bool,
}

impl DietaryTags {
    /// Short labels for the tags that are set, in declaration order.
    #[must_use]
    pub fn labels(&self) -> Vec<&'static str> {
        [
            (self.vegetarian, "vegetarian"),
            (self.vegan, "vegan"),
            (self.gluten_free, "gluten-free"),
            (self.lactose_free, "lactose-free"),
            (self.organic, "organic"),
            (self.ready_to_eat, "ready-to-eat"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect()
    }
}

fn default_true() -> bool {
    true
}

/// A tracked perishable item.
///
/// The serde shape doubles as the snapshot item record: `id`, `name`,
/// `category`, `expirationDate`, `quantity`, `createdAt` and `updatedAt` are
/// required, everything else falls back to its default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerishableItem {
    pub id: Uuid,
    pub name: String,
    pub category: StorageCategory,
    /// Nominal (printed) expiration date.
    pub expiration_date: DateTime<Utc>,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub notify: bool,
    #[serde(default)]
    pub is_consumed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::snapshot::base64_image"
    )]
    pub image: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_type: Option<String>,
    #[serde(flatten)]
    pub tags: DietaryTags,
    #[serde(default)]
    pub is_fresh: bool,
    #[serde(default)]
    pub is_opened: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub use_advanced_expiry: bool,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub category: Option<StorageCategory>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub quantity: i64,
    pub note: Option<String>,
    pub barcode: Option<String>,
    pub notify: bool,
    pub image: Option<Vec<u8>>,
    pub food_type: Option<String>,
    pub tags: DietaryTags,
    pub is_fresh: bool,
    pub use_advanced_expiry: bool,
}

impl Default for NewItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            category: None,
            expiration_date: None,
            quantity: 1,
            note: None,
            barcode: None,
            notify: true,
            image: None,
            food_type: None,
            tags: DietaryTags::default(),
            is_fresh: false,
            use_advanced_expiry: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateItem {
    pub name: Option<String>,
    pub category: Option<StorageCategory>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub quantity: Option<i64>,
    pub note: Option<String>,
    pub barcode: Option<String>,
    pub notify: Option<bool>,
    pub food_type: Option<String>,
    pub tags: Option<DietaryTags>,
    pub is_fresh: Option<bool>,
    pub use_advanced_expiry: Option<bool>,
}

impl UpdateItem {
    /// Apply the set fields to `item`. Returns whether anything changed.
    pub fn apply_to(&self, item: &mut PerishableItem) -> bool {
        let before = item.clone();
        if let Some(name) = &self.name {
            item.name.clone_from(name);
        }
        if let Some(category) = self.category {
            item.category = category;
        }
        if let Some(date) = self.expiration_date {
            item.expiration_date = date;
        }
        if let Some(quantity) = self.quantity {
            item.quantity = quantity;
        }
        if let Some(note) = &self.note {
            item.note = Some(note.clone()).filter(|n| !n.trim().is_empty());
        }
        if let Some(barcode) = &self.barcode {
            item.barcode = Some(barcode.clone()).filter(|b| !b.trim().is_empty());
        }
        if let Some(notify) = self.notify {
            item.notify = notify;
        }
        if let Some(food_type) = &self.food_type {
            item.food_type = Some(food_type.clone()).filter(|t| !t.trim().is_empty());
        }
        if let Some(tags) = self.tags {
            item.tags = tags;
        }
        if let Some(is_fresh) = self.is_fresh {
            item.is_fresh = is_fresh;
        }
        if let Some(advanced) = self.use_advanced_expiry {
            item.use_advanced_expiry = advanced;
        }
        *item != before
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ItemFilter {
    pub category: Option<StorageCategory>,
    pub include_consumed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Appearance {
    #[default]
    System,
    Light,
    Dark,
}

impl Appearance {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl FromStr for Appearance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "system" | "auto" => Ok(Self::System),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(anyhow!(
                "Invalid appearance '{s}'. Must be one of: system, light, dark"
            )),
        }
    }
}

/// The single application settings record.
///
/// There is at most one of these per store. It is loaded and passed around
/// explicitly; nothing caches it process-wide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub id: Uuid,
    pub notifications_enabled: bool,
    /// How many days ahead of expiry an item counts as "expiring soon".
    pub notify_days_before: i64,
    pub notify_hour: i64,
    pub notify_minute: i64,
    pub cloud_sync_enabled: bool,
    pub cloud_sync_prompted: bool,
    pub appearance: Appearance,
    pub show_consumed: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            notifications_enabled: true,
            notify_days_before: 2,
            notify_hour: 9,
            notify_minute: 0,
            cloud_sync_enabled: false,
            cloud_sync_prompted: false,
            appearance: Appearance::System,
            show_consumed: false,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    #[serde(default = "default_household_size")]
    pub household_size: i64,
    pub created_at: DateTime<Utc>,
}

fn default_household_size() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFoodType {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Every entity the store holds, in one value. This is what export reads and
/// what a snapshot decodes to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub items: Vec<PerishableItem>,
    pub settings: Option<AppSettings>,
    pub profiles: Vec<UserProfile>,
    pub custom_food_types: Vec<CustomFoodType>,
}

/// Product details returned by a barcode lookup provider.
#[derive(Debug, Clone, Default)]
pub struct ProductInfo {
    pub name: String,
    pub category: Option<StorageCategory>,
    pub food_type: Option<String>,
    /// Typical shelf life from purchase, used as the nominal expiration.
    pub shelf_life_days: Option<u64>,
    pub tags: DietaryTags,
}

// --- Reconciliation types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Wipe the live store and recreate it from the snapshot.
    Replace,
    /// Insert new items and overwrite older ones; never delete.
    Merge,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Replace => "replace",
            Self::Merge => "merge",
        })
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            _ => Err(anyhow!("Invalid strategy '{s}'. Use 'merge' or 'replace'")),
        }
    }
}

/// A snapshot item that failed field validation during a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRejection {
    pub index: usize,
    pub id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub imported: usize,
    pub updated: usize,
    /// Includes rejected items.
    pub skipped: usize,
    pub total_in_snapshot: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<ItemRejection>,
}

impl ReconciliationResult {
    #[must_use]
    pub fn accounted(&self) -> usize {
        self.imported + self.updated + self.skipped
    }
}

// --- Validation ---

/// Field invariants every stored item must satisfy.
pub fn validate_item_fields(name: &str, quantity: i64) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Item name must not be empty");
    }
    if quantity < 1 {
        bail!("Item quantity must be at least 1 (got {quantity})");
    }
    Ok(())
}

pub fn validate_settings(settings: &AppSettings) -> Result<()> {
    if !(0..=30).contains(&settings.notify_days_before) {
        bail!("notify_days_before must be between 0 and 30");
    }
    if !(0..=23).contains(&settings.notify_hour) {
        bail!("notify_hour must be between 0 and 23");
    }
    if !(0..=59).contains(&settings.notify_minute) {
        bail!("notify_minute must be between 0 and 59");
    }
    Ok(())
}

pub fn validate_profile(name: &str, household_size: i64) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Profile name must not be empty");
    }
    if household_size < 1 {
        bail!("Household size must be at least 1");
    }
    Ok(())
}

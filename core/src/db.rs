use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use uuid::Uuid;

use crate::expiry::effective_expiration;
use crate::models::{
    AppSettings, Appearance, CustomFoodType, Dataset, DietaryTags, ItemFilter, NewItem,
    PerishableItem, StorageCategory, UpdateItem, UserProfile, validate_item_fields,
    validate_profile,
};

/// Tables in the order a full wipe must visit them: owned children before
/// their owners.
pub const WIPE_ORDER: [&str; 5] = [
    "item_images",
    "items",
    "app_settings",
    "user_profiles",
    "custom_food_types",
];

const ITEM_SELECT: &str = "SELECT i.id, i.name, i.category, i.expiration_date, i.quantity,
        i.note, i.barcode, i.created_at, i.updated_at, i.notify, i.is_consumed,
        i.consumed_at, img.data, i.food_type, i.is_vegetarian, i.is_vegan,
        i.is_gluten_free, i.is_lactose_free, i.is_organic, i.is_ready_to_eat,
        i.is_fresh, i.is_opened, i.opened_at, i.use_advanced_expiry
    FROM items i
    LEFT JOIN item_images img ON img.item_id = i.id";

const SETTINGS_SELECT: &str = "SELECT id, notifications_enabled, notify_days_before,
        notify_hour, notify_minute, cloud_sync_enabled, cloud_sync_prompted,
        appearance, show_consumed, updated_at
    FROM app_settings WHERE singleton = 1";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS items (
                    id TEXT PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
                    category TEXT NOT NULL CHECK (category IN ('fridge', 'freezer', 'pantry')),
                    expiration_date TEXT NOT NULL,
                    quantity INTEGER NOT NULL CHECK (quantity >= 1),
                    note TEXT,
                    barcode TEXT,
                    notify INTEGER NOT NULL DEFAULT 1,
                    is_consumed INTEGER NOT NULL DEFAULT 0,
                    consumed_at TEXT,
                    food_type TEXT,
                    is_vegetarian INTEGER NOT NULL DEFAULT 0,
                    is_vegan INTEGER NOT NULL DEFAULT 0,
                    is_gluten_free INTEGER NOT NULL DEFAULT 0,
                    is_lactose_free INTEGER NOT NULL DEFAULT 0,
                    is_organic INTEGER NOT NULL DEFAULT 0,
                    is_ready_to_eat INTEGER NOT NULL DEFAULT 0,
                    is_fresh INTEGER NOT NULL DEFAULT 0,
                    is_opened INTEGER NOT NULL DEFAULT 0,
                    opened_at TEXT,
                    use_advanced_expiry INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS item_images (
                    item_id TEXT PRIMARY KEY NOT NULL REFERENCES items(id),
                    data BLOB NOT NULL
                );

                CREATE TABLE IF NOT EXISTS app_settings (
                    singleton INTEGER PRIMARY KEY CHECK (singleton = 1),
                    id TEXT NOT NULL,
                    notifications_enabled INTEGER NOT NULL,
                    notify_days_before INTEGER NOT NULL,
                    notify_hour INTEGER NOT NULL CHECK (notify_hour BETWEEN 0 AND 23),
                    notify_minute INTEGER NOT NULL CHECK (notify_minute BETWEEN 0 AND 59),
                    cloud_sync_enabled INTEGER NOT NULL,
                    cloud_sync_prompted INTEGER NOT NULL,
                    appearance TEXT NOT NULL,
                    show_consumed INTEGER NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_profiles (
                    id TEXT PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL,
                    household_size INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS custom_food_types (
                    id TEXT PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL,
                    emoji TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_items_category ON items(category);
                CREATE INDEX IF NOT EXISTS idx_items_barcode ON items(barcode);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Begin a transaction on the shared connection. Every `&self` method
    /// called while it is alive runs inside it; dropping it without
    /// `commit()` rolls back.
    pub fn transaction(&self) -> rusqlite::Result<Transaction<'_>> {
        self.conn.unchecked_transaction()
    }

    // --- Row mapping helpers ---

    fn uuid_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
        let text: String = row.get(idx)?;
        Uuid::parse_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn item_from_row(row: &rusqlite::Row) -> rusqlite::Result<PerishableItem> {
        let category: String = row.get(2)?;
        let category = category
            .parse::<StorageCategory>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;
        Ok(PerishableItem {
            id: Self::uuid_column(row, 0)?,
            name: row.get(1)?,
            category,
            expiration_date: row.get(3)?,
            quantity: row.get(4)?,
            note: row.get(5)?,
            barcode: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            notify: row.get(9)?,
            is_consumed: row.get(10)?,
            consumed_at: row.get(11)?,
            image: row.get(12)?,
            food_type: row.get(13)?,
            tags: DietaryTags {
                vegetarian: row.get(14)?,
                vegan: row.get(15)?,
                gluten_free: row.get(16)?,
                lactose_free: row.get(17)?,
                organic: row.get(18)?,
                ready_to_eat: row.get(19)?,
            },
            is_fresh: row.get(20)?,
            is_opened: row.get(21)?,
            opened_at: row.get(22)?,
            use_advanced_expiry: row.get(23)?,
        })
    }

    fn settings_from_row(row: &rusqlite::Row) -> rusqlite::Result<AppSettings> {
        let appearance: String = row.get(7)?;
        let appearance = appearance
            .parse::<Appearance>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, e.into()))?;
        Ok(AppSettings {
            id: Self::uuid_column(row, 0)?,
            notifications_enabled: row.get(1)?,
            notify_days_before: row.get(2)?,
            notify_hour: row.get(3)?,
            notify_minute: row.get(4)?,
            cloud_sync_enabled: row.get(5)?,
            cloud_sync_prompted: row.get(6)?,
            appearance,
            show_consumed: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn profile_from_row(row: &rusqlite::Row) -> rusqlite::Result<UserProfile> {
        Ok(UserProfile {
            id: Self::uuid_column(row, 0)?,
            name: row.get(1)?,
            household_size: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn food_type_from_row(row: &rusqlite::Row) -> rusqlite::Result<CustomFoodType> {
        Ok(CustomFoodType {
            id: Self::uuid_column(row, 0)?,
            name: row.get(1)?,
            emoji: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn count_rows(&self, table: &str) -> rusqlite::Result<usize> {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| usize::try_from(n).unwrap_or(0))
    }

    // --- Items ---

    pub fn insert_item(&self, new: &NewItem) -> Result<PerishableItem> {
        let name = new.name.trim();
        validate_item_fields(name, new.quantity)?;

        let now = Utc::now();
        let mut item = PerishableItem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: new.category.unwrap_or(StorageCategory::Fridge),
            expiration_date: now,
            quantity: new.quantity,
            note: new.note.clone().filter(|n| !n.trim().is_empty()),
            barcode: new.barcode.clone().filter(|b| !b.trim().is_empty()),
            created_at: now,
            updated_at: now,
            notify: new.notify,
            is_consumed: false,
            consumed_at: None,
            image: new.image.clone(),
            food_type: new.food_type.clone().filter(|t| !t.trim().is_empty()),
            tags: new.tags,
            is_fresh: new.is_fresh,
            is_opened: false,
            opened_at: None,
            use_advanced_expiry: new.use_advanced_expiry,
        };
        item.expiration_date = match new.expiration_date {
            Some(date) => date,
            // Rule-driven items carry their computed date as the printed one
            None if new.is_fresh || new.use_advanced_expiry => effective_expiration(&item),
            None => bail!("An expiration date is required unless the item is fresh or uses advanced expiry"),
        };

        let tx = self.transaction()?;
        self.insert_item_record(&item)?;
        tx.commit()?;
        Ok(item)
    }

    /// Insert a fully formed item, id and timestamps included, plus its
    /// image row when it has one.
    pub fn insert_item_record(&self, item: &PerishableItem) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO items (id, name, category, expiration_date, quantity, note, barcode,
                notify, is_consumed, consumed_at, food_type, is_vegetarian, is_vegan,
                is_gluten_free, is_lactose_free, is_organic, is_ready_to_eat, is_fresh,
                is_opened, opened_at, use_advanced_expiry, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                item.id.to_string(),
                item.name,
                item.category.as_str(),
                item.expiration_date,
                item.quantity,
                item.note,
                item.barcode,
                item.notify,
                item.is_consumed,
                item.consumed_at,
                item.food_type,
                item.tags.vegetarian,
                item.tags.vegan,
                item.tags.gluten_free,
                item.tags.lactose_free,
                item.tags.organic,
                item.tags.ready_to_eat,
                item.is_fresh,
                item.is_opened,
                item.opened_at,
                item.use_advanced_expiry,
                item.created_at,
                item.updated_at,
            ],
        )?;
        if let Some(image) = &item.image {
            self.conn.execute(
                "INSERT INTO item_images (item_id, data) VALUES (?1, ?2)",
                params![item.id.to_string(), image],
            )?;
        }
        Ok(())
    }

    /// Overwrite every stored column of the item with `item.id`, image
    /// included. Returns whether a row was found.
    pub fn write_item(&self, item: &PerishableItem) -> rusqlite::Result<bool> {
        let id = item.id.to_string();
        let rows = self.conn.execute(
            "UPDATE items SET name = ?1, category = ?2, expiration_date = ?3, quantity = ?4,
                note = ?5, barcode = ?6, notify = ?7, is_consumed = ?8, consumed_at = ?9,
                food_type = ?10, is_vegetarian = ?11, is_vegan = ?12, is_gluten_free = ?13,
                is_lactose_free = ?14, is_organic = ?15, is_ready_to_eat = ?16, is_fresh = ?17,
                is_opened = ?18, opened_at = ?19, use_advanced_expiry = ?20, created_at = ?21,
                updated_at = ?22
             WHERE id = ?23",
            params![
                item.name,
                item.category.as_str(),
                item.expiration_date,
                item.quantity,
                item.note,
                item.barcode,
                item.notify,
                item.is_consumed,
                item.consumed_at,
                item.food_type,
                item.tags.vegetarian,
                item.tags.vegan,
                item.tags.gluten_free,
                item.tags.lactose_free,
                item.tags.organic,
                item.tags.ready_to_eat,
                item.is_fresh,
                item.is_opened,
                item.opened_at,
                item.use_advanced_expiry,
                item.created_at,
                item.updated_at,
                id,
            ],
        )?;
        if rows == 0 {
            return Ok(false);
        }
        self.conn
            .execute("DELETE FROM item_images WHERE item_id = ?1", params![id])?;
        if let Some(image) = &item.image {
            self.conn.execute(
                "INSERT INTO item_images (item_id, data) VALUES (?1, ?2)",
                params![id, image],
            )?;
        }
        Ok(true)
    }

    pub fn get_item(&self, id: Uuid) -> Result<PerishableItem> {
        self.find_item(id)?.context("Item not found")
    }

    pub fn find_item(&self, id: Uuid) -> rusqlite::Result<Option<PerishableItem>> {
        self.conn
            .query_row(
                &format!("{ITEM_SELECT} WHERE i.id = ?1"),
                params![id.to_string()],
                Self::item_from_row,
            )
            .optional()
    }

    /// Items whose id starts with `prefix` (case-insensitive), for short ids
    /// typed at the command line.
    pub fn find_items_by_id_prefix(&self, prefix: &str) -> Result<Vec<PerishableItem>> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Ok(Vec::new());
        }
        let pattern = format!("{prefix}%");
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT} WHERE i.id LIKE ?1 ORDER BY i.created_at"))?;
        let items = stmt
            .query_map(params![pattern], Self::item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Most recently created item carrying `barcode`.
    pub fn find_latest_by_barcode(&self, barcode: &str) -> Result<Option<PerishableItem>> {
        let item = self
            .conn
            .query_row(
                &format!(
                    "{ITEM_SELECT} WHERE i.barcode = ?1 ORDER BY i.created_at DESC LIMIT 1"
                ),
                params![barcode],
                Self::item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    pub fn list_items(&self, filter: &ItemFilter) -> Result<Vec<PerishableItem>> {
        let mut sql = format!("{ITEM_SELECT} WHERE 1 = 1");
        if !filter.include_consumed {
            sql.push_str(" AND i.is_consumed = 0");
        }
        if filter.category.is_some() {
            sql.push_str(" AND i.category = ?1");
        }
        sql.push_str(" ORDER BY i.expiration_date, i.name COLLATE NOCASE");

        let mut stmt = self.conn.prepare(&sql)?;
        let items = match filter.category {
            Some(category) => stmt
                .query_map(params![category.as_str()], Self::item_from_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], Self::item_from_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(items)
    }

    /// Every item, oldest first. Ties on `created_at` break by id so the
    /// order is total.
    pub fn all_items(&self) -> rusqlite::Result<Vec<PerishableItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT} ORDER BY i.created_at, i.id"))?;
        stmt.query_map([], Self::item_from_row)?
            .collect::<Result<Vec<_>, _>>()
    }

    pub fn item_count(&self) -> rusqlite::Result<usize> {
        self.count_rows("items")
    }

    pub fn update_item(&self, id: Uuid, update: &UpdateItem) -> Result<PerishableItem> {
        let mut item = self.get_item(id)?;
        if !update.apply_to(&mut item) {
            return Ok(item);
        }
        item.name = item.name.trim().to_string();
        validate_item_fields(&item.name, item.quantity)?;
        item.updated_at = Utc::now();
        self.save_item(&item)?;
        Ok(item)
    }

    fn save_item(&self, item: &PerishableItem) -> Result<()> {
        let tx = self.transaction()?;
        if !self.write_item(item)? {
            bail!("Item not found");
        }
        tx.commit()?;
        Ok(())
    }

    /// Mark an item opened. An item that is already opened keeps its
    /// original opening time.
    pub fn mark_opened(&self, id: Uuid, at: DateTime<Utc>) -> Result<PerishableItem> {
        let mut item = self.get_item(id)?;
        if item.is_opened && item.opened_at.is_some() {
            return Ok(item);
        }
        item.is_opened = true;
        item.opened_at = Some(at);
        item.updated_at = Utc::now();
        self.save_item(&item)?;
        Ok(item)
    }

    pub fn mark_consumed(&self, id: Uuid, at: DateTime<Utc>) -> Result<PerishableItem> {
        let mut item = self.get_item(id)?;
        if item.is_consumed {
            return Ok(item);
        }
        item.is_consumed = true;
        item.consumed_at = Some(at);
        item.updated_at = Utc::now();
        self.save_item(&item)?;
        Ok(item)
    }

    /// Delete an item and the image it owns.
    pub fn delete_item(&self, id: Uuid) -> Result<bool> {
        let id = id.to_string();
        let tx = self.transaction()?;
        self.conn
            .execute("DELETE FROM item_images WHERE item_id = ?1", params![id])?;
        let rows = self
            .conn
            .execute("DELETE FROM items WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    /// Remove every row of every table, walking `WIPE_ORDER`.
    pub fn wipe_all(&self) -> rusqlite::Result<()> {
        for table in WIPE_ORDER {
            self.conn.execute(&format!("DELETE FROM {table}"), [])?;
        }
        Ok(())
    }

    // --- Settings ---

    pub fn find_settings(&self) -> rusqlite::Result<Option<AppSettings>> {
        self.conn
            .query_row(SETTINGS_SELECT, [], Self::settings_from_row)
            .optional()
    }

    /// The settings record, created with defaults on first access.
    pub fn get_settings(&self) -> Result<AppSettings> {
        if let Some(settings) = self.find_settings()? {
            return Ok(settings);
        }
        let settings = AppSettings::default();
        self.put_settings(&settings)?;
        Ok(settings)
    }

    /// Insert or overwrite the single settings row.
    pub fn put_settings(&self, settings: &AppSettings) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO app_settings (singleton, id, notifications_enabled, notify_days_before,
                notify_hour, notify_minute, cloud_sync_enabled, cloud_sync_prompted,
                appearance, show_consumed, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(singleton) DO UPDATE SET
                id = excluded.id,
                notifications_enabled = excluded.notifications_enabled,
                notify_days_before = excluded.notify_days_before,
                notify_hour = excluded.notify_hour,
                notify_minute = excluded.notify_minute,
                cloud_sync_enabled = excluded.cloud_sync_enabled,
                cloud_sync_prompted = excluded.cloud_sync_prompted,
                appearance = excluded.appearance,
                show_consumed = excluded.show_consumed,
                updated_at = excluded.updated_at",
            params![
                settings.id.to_string(),
                settings.notifications_enabled,
                settings.notify_days_before,
                settings.notify_hour,
                settings.notify_minute,
                settings.cloud_sync_enabled,
                settings.cloud_sync_prompted,
                settings.appearance.as_str(),
                settings.show_consumed,
                settings.updated_at,
            ],
        )?;
        Ok(())
    }

    // --- Profiles ---

    pub fn insert_profile(&self, name: &str, household_size: i64) -> Result<UserProfile> {
        let name = name.trim();
        validate_profile(name, household_size)?;
        let profile = UserProfile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            household_size,
            created_at: Utc::now(),
        };
        self.insert_profile_record(&profile)?;
        Ok(profile)
    }

    pub fn insert_profile_record(&self, profile: &UserProfile) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO user_profiles (id, name, household_size, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                profile.id.to_string(),
                profile.name,
                profile.household_size,
                profile.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_profiles(&self) -> rusqlite::Result<Vec<UserProfile>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, household_size, created_at FROM user_profiles
             ORDER BY created_at, id",
        )?;
        stmt.query_map([], Self::profile_from_row)?
            .collect::<Result<Vec<_>, _>>()
    }

    pub fn delete_profile(&self, id: Uuid) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM user_profiles WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(rows > 0)
    }

    pub fn profile_count(&self) -> rusqlite::Result<usize> {
        self.count_rows("user_profiles")
    }

    // --- Custom food types ---

    pub fn insert_food_type(&self, name: &str, emoji: Option<&str>) -> Result<CustomFoodType> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Food type name must not be empty");
        }
        let food_type = CustomFoodType {
            id: Uuid::new_v4(),
            name: name.to_string(),
            emoji: emoji
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            created_at: Utc::now(),
        };
        self.insert_food_type_record(&food_type)?;
        Ok(food_type)
    }

    pub fn insert_food_type_record(&self, food_type: &CustomFoodType) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO custom_food_types (id, name, emoji, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                food_type.id.to_string(),
                food_type.name,
                food_type.emoji,
                food_type.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_food_types(&self) -> rusqlite::Result<Vec<CustomFoodType>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, emoji, created_at FROM custom_food_types
             ORDER BY created_at, id",
        )?;
        stmt.query_map([], Self::food_type_from_row)?
            .collect::<Result<Vec<_>, _>>()
    }

    pub fn delete_food_type(&self, id: Uuid) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM custom_food_types WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(rows > 0)
    }

    pub fn food_type_count(&self) -> rusqlite::Result<usize> {
        self.count_rows("custom_food_types")
    }

    // --- Export ---

    /// Read every entity in the store. Settings are reported as stored and
    /// not created on demand.
    pub fn load_dataset(&self) -> rusqlite::Result<Dataset> {
        Ok(Dataset {
            items: self.all_items()?,
            settings: self.find_settings()?,
            profiles: self.list_profiles()?,
            custom_food_types: self.list_food_types()?,
        })
    }
}

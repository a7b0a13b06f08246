//! Reconciliation of a snapshot against the live store.
//!
//! Replace wipes everything and recreates the store from the snapshot.
//! Merge matches snapshot items to live items by identity key and applies
//! last-writer-wins on `updated_at`; it inserts and overwrites but never
//! deletes. Either way the whole batch runs in one transaction.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::error::ReconcileError;
use crate::expiry::{ExpiryRule, governing_rule};
use crate::identity::item_identity_key_in;
use crate::models::{
    Dataset, ItemRejection, PerishableItem, ReconciliationResult, Strategy, validate_item_fields,
    validate_settings,
};
use crate::snapshot::Snapshot;

/// Reconcile `snapshot` into `db`, using the system time zone for identity
/// keys.
pub fn reconcile(
    db: &Database,
    snapshot: &Snapshot,
    strategy: Strategy,
) -> Result<ReconciliationResult, ReconcileError> {
    reconcile_in(db, snapshot, strategy, &Local)
}

pub fn reconcile_in<Tz: TimeZone>(
    db: &Database,
    snapshot: &Snapshot,
    strategy: Strategy,
    tz: &Tz,
) -> Result<ReconciliationResult, ReconcileError> {
    let dataset = prepare(snapshot, strategy)?;

    let tx = db.transaction()?;
    let result = apply(db, &dataset, strategy, tz)?;
    tx.commit()?;

    info!(
        %strategy,
        imported = result.imported,
        updated = result.updated,
        skipped = result.skipped,
        "snapshot reconciled"
    );
    Ok(result)
}

/// Run a reconciliation and roll it back. Reports exactly the counts the
/// real run would produce against the current store.
pub fn preview(
    db: &Database,
    snapshot: &Snapshot,
    strategy: Strategy,
) -> Result<ReconciliationResult, ReconcileError> {
    preview_in(db, snapshot, strategy, &Local)
}

pub fn preview_in<Tz: TimeZone>(
    db: &Database,
    snapshot: &Snapshot,
    strategy: Strategy,
    tz: &Tz,
) -> Result<ReconciliationResult, ReconcileError> {
    let dataset = prepare(snapshot, strategy)?;

    let tx = db.transaction()?;
    let result = apply(db, &dataset, strategy, tz)?;
    tx.rollback()?;

    debug!(%strategy, imported = result.imported, "dry run rolled back");
    Ok(result)
}

/// Decode and run every check that must pass before anything is touched.
fn prepare(snapshot: &Snapshot, strategy: Strategy) -> Result<Dataset, ReconcileError> {
    let dataset = snapshot.decode()?;
    info!(
        %strategy,
        items = dataset.items.len(),
        exported_at = %snapshot.exported_at,
        "reconciling snapshot"
    );

    if let Some(settings) = &dataset.settings {
        validate_settings(settings)
            .map_err(|e| ReconcileError::malformed(format!("settings: {e}")))?;
    }

    if strategy == Strategy::Replace {
        for (index, item) in dataset.items.iter().enumerate() {
            if let Err(rejection) = check_item(index, item) {
                return Err(ReconcileError::ValidationFailure {
                    index: rejection.index,
                    id: rejection.id,
                    reason: rejection.reason,
                });
            }
        }
    }
    Ok(dataset)
}

fn apply<Tz: TimeZone>(
    db: &Database,
    dataset: &Dataset,
    strategy: Strategy,
    tz: &Tz,
) -> Result<ReconciliationResult, ReconcileError> {
    match strategy {
        Strategy::Replace => replace(db, dataset),
        Strategy::Merge => merge(db, dataset, tz),
    }
}

fn check_item(index: usize, item: &PerishableItem) -> Result<(), ItemRejection> {
    validate_item_fields(&item.name, item.quantity).map_err(|e| ItemRejection {
        index,
        id: item.id,
        reason: e.to_string(),
    })
}

fn replace(db: &Database, dataset: &Dataset) -> Result<ReconciliationResult, ReconcileError> {
    db.wipe_all()?;

    for item in &dataset.items {
        db.insert_item_record(item)?;
    }
    db.put_settings(&dataset.settings.clone().unwrap_or_default())?;
    for profile in &dataset.profiles {
        db.insert_profile_record(profile)?;
    }
    for food_type in &dataset.custom_food_types {
        db.insert_food_type_record(food_type)?;
    }

    Ok(ReconciliationResult {
        imported: dataset.items.len(),
        updated: 0,
        skipped: 0,
        total_in_snapshot: dataset.items.len(),
        rejected: Vec::new(),
    })
}

fn merge<Tz: TimeZone>(
    db: &Database,
    dataset: &Dataset,
    tz: &Tz,
) -> Result<ReconciliationResult, ReconcileError> {
    let mut result = ReconciliationResult {
        total_in_snapshot: dataset.items.len(),
        ..ReconciliationResult::default()
    };

    let live = db.all_items()?;
    let mut taken_ids: HashSet<Uuid> = live.iter().map(|item| item.id).collect();
    let mut index: HashMap<String, PerishableItem> = HashMap::with_capacity(live.len());
    for item in live {
        // Oldest first, so the earliest-created item keeps a shared key
        index.entry(item_identity_key_in(&item, tz)).or_insert(item);
    }

    for (position, incoming) in dataset.items.iter().enumerate() {
        if let Err(rejection) = check_item(position, incoming) {
            warn!(
                index = position,
                id = %incoming.id,
                reason = %rejection.reason,
                "skipping invalid snapshot item"
            );
            result.skipped += 1;
            result.rejected.push(rejection);
            continue;
        }

        match index.entry(item_identity_key_in(incoming, tz)) {
            Entry::Vacant(slot) => {
                let mut item = incoming.clone();
                if !taken_ids.insert(item.id) {
                    // Same id, different content: keep both
                    item.id = Uuid::new_v4();
                    taken_ids.insert(item.id);
                    debug!(original = %incoming.id, assigned = %item.id, "reassigned colliding id");
                }
                db.insert_item_record(&item)?;
                slot.insert(item);
                result.imported += 1;
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if incoming.updated_at > existing.updated_at {
                    let merged = PerishableItem {
                        id: existing.id,
                        created_at: merged_created_at(existing, incoming),
                        ..incoming.clone()
                    };
                    db.write_item(&merged)?;
                    *existing = merged;
                    result.updated += 1;
                } else {
                    result.skipped += 1;
                }
            }
        }
    }

    merge_records(db, dataset)?;
    Ok(result)
}

/// The live item keeps its creation time, except when the incoming copy's
/// expiry is counted from creation. Then the incoming time is taken so the
/// stored item resolves to the same effective day as the snapshot.
fn merged_created_at(live: &PerishableItem, incoming: &PerishableItem) -> DateTime<Utc> {
    match governing_rule(incoming) {
        ExpiryRule::Fresh | ExpiryRule::AdvancedUnopened => incoming.created_at,
        ExpiryRule::Opened { .. } | ExpiryRule::Nominal => live.created_at,
    }
}

/// Settings, profiles and custom food types are only seeded into a store
/// that has none of that kind.
fn merge_records(db: &Database, dataset: &Dataset) -> Result<(), ReconcileError> {
    if let Some(settings) = &dataset.settings {
        if db.find_settings()?.is_none() {
            db.put_settings(settings)?;
            debug!("seeded settings from snapshot");
        }
    }
    if !dataset.profiles.is_empty() && db.profile_count()? == 0 {
        for profile in &dataset.profiles {
            db.insert_profile_record(profile)?;
        }
        debug!(count = dataset.profiles.len(), "seeded profiles from snapshot");
    }
    if !dataset.custom_food_types.is_empty() && db.food_type_count()? == 0 {
        for food_type in &dataset.custom_food_types {
            db.insert_food_type_record(food_type)?;
        }
        debug!(
            count = dataset.custom_food_types.len(),
            "seeded custom food types from snapshot"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AppSettings, Appearance, CustomFoodType, DietaryTags, StorageCategory, UserProfile,
    };
    use chrono::Duration;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn item(
        name: &str,
        category: StorageCategory,
        expires: DateTime<Utc>,
        updated: DateTime<Utc>,
    ) -> PerishableItem {
        PerishableItem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category,
            expiration_date: expires,
            quantity: 1,
            note: None,
            barcode: None,
            created_at: updated,
            updated_at: updated,
            notify: true,
            is_consumed: false,
            consumed_at: None,
            image: None,
            food_type: None,
            tags: DietaryTags::default(),
            is_fresh: false,
            is_opened: false,
            opened_at: None,
            use_advanced_expiry: false,
        }
    }

    fn milk(updated: DateTime<Utc>) -> PerishableItem {
        item("Milk", StorageCategory::Fridge, at(2024, 5, 10), updated)
    }

    fn snapshot_of(items: Vec<PerishableItem>) -> Snapshot {
        Snapshot::encode(&Dataset {
            items,
            ..Dataset::default()
        })
    }

    fn seed(db: &Database, items: &[PerishableItem]) {
        for item in items {
            db.insert_item_record(item).unwrap();
        }
    }

    fn merge_utc(db: &Database, snapshot: &Snapshot) -> ReconciliationResult {
        reconcile_in(db, snapshot, Strategy::Merge, &Utc).unwrap()
    }

    #[test]
    fn test_merge_into_empty_store() {
        let db = Database::open_in_memory().unwrap();
        let snapshot = snapshot_of(vec![
            milk(at(2024, 5, 1)),
            item("Peas", StorageCategory::Freezer, at(2024, 9, 1), at(2024, 5, 2)),
            item("Rice", StorageCategory::Pantry, at(2025, 1, 1), at(2024, 5, 3)),
        ]);

        let result = merge_utc(&db, &snapshot);
        assert_eq!(
            result,
            ReconciliationResult {
                imported: 3,
                updated: 0,
                skipped: 0,
                total_in_snapshot: 3,
                rejected: vec![],
            }
        );
        assert_eq!(db.all_items().unwrap(), snapshot.items);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, &[item("Eggs", StorageCategory::Fridge, at(2024, 6, 1), at(2024, 5, 1))]);
        let snapshot = snapshot_of(vec![
            milk(at(2024, 5, 1)),
            item("Eggs", StorageCategory::Fridge, at(2024, 6, 1), at(2024, 5, 1)),
        ]);

        let first = merge_utc(&db, &snapshot);
        assert_eq!((first.imported, first.updated, first.skipped), (1, 0, 1));
        let after_first = db.all_items().unwrap();

        let second = merge_utc(&db, &snapshot);
        assert_eq!(second.imported, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(db.all_items().unwrap(), after_first);
    }

    #[test]
    fn test_merge_matches_normalized_name_and_keeps_live_id() {
        let db = Database::open_in_memory().unwrap();
        let mut live = milk(at(2024, 5, 1));
        live.name = " milk ".to_string();
        seed(&db, &[live.clone()]);

        let mut incoming = milk(at(2024, 5, 5));
        incoming.created_at = at(2024, 4, 30);
        incoming.quantity = 3;
        incoming.note = Some("opened bottle in door".to_string());
        let result = merge_utc(&db, &snapshot_of(vec![incoming.clone()]));

        assert_eq!(result.updated, 1);
        assert_eq!(result.imported, 0);
        let stored = db.all_items().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, live.id);
        assert_eq!(stored[0].created_at, live.created_at);
        assert_eq!(stored[0].name, "Milk");
        assert_eq!(stored[0].quantity, 3);
        assert_eq!(stored[0].updated_at, incoming.updated_at);
        assert_eq!(stored[0].note, incoming.note);
    }

    #[test]
    fn test_merge_overwrite_with_creation_anchored_rule_stays_idempotent() {
        // Fresh counts 3 days from creation, advanced 120; both land on May 10
        let marks: [fn(&mut PerishableItem); 2] = [
            |item| {
                item.is_fresh = true;
                item.created_at = at(2024, 5, 7);
            },
            |item| {
                item.use_advanced_expiry = true;
                item.created_at = at(2024, 1, 11);
            },
        ];

        for mark in marks {
            let db = Database::open_in_memory().unwrap();
            let live = item("Basil", StorageCategory::Fridge, at(2024, 5, 10), at(2024, 5, 1));
            seed(&db, &[live.clone()]);

            let mut incoming =
                item("Basil", StorageCategory::Fridge, at(2024, 5, 10), at(2024, 5, 8));
            mark(&mut incoming);
            let snapshot = snapshot_of(vec![incoming.clone()]);

            let first = merge_utc(&db, &snapshot);
            assert_eq!((first.imported, first.updated), (0, 1));
            let stored = db.all_items().unwrap();
            assert_eq!(stored.len(), 1);
            assert_eq!(stored[0].id, live.id);
            assert_eq!(stored[0].created_at, incoming.created_at);
            assert_eq!(
                item_identity_key_in(&stored[0], &Utc),
                item_identity_key_in(&incoming, &Utc)
            );

            let second = merge_utc(&db, &snapshot);
            assert_eq!((second.imported, second.updated, second.skipped), (0, 0, 1));
            assert_eq!(db.item_count().unwrap(), 1);
        }
    }

    #[test]
    fn test_merge_overwrite_with_opened_rule_keeps_live_created_at() {
        let db = Database::open_in_memory().unwrap();
        let live = milk(at(2024, 5, 1));
        seed(&db, &[live.clone()]);

        // Opened May 7 resolves to May 10, the same day as the printed date
        let mut incoming = milk(at(2024, 5, 8));
        incoming.created_at = at(2024, 4, 20);
        incoming.is_opened = true;
        incoming.opened_at = Some(at(2024, 5, 7));
        let snapshot = snapshot_of(vec![incoming]);

        assert_eq!(merge_utc(&db, &snapshot).updated, 1);
        assert_eq!(db.all_items().unwrap()[0].created_at, live.created_at);
        assert_eq!(merge_utc(&db, &snapshot).imported, 0);
    }

    #[test]
    fn test_merge_equal_timestamp_keeps_local() {
        let db = Database::open_in_memory().unwrap();
        let live = milk(at(2024, 5, 1));
        seed(&db, &[live.clone()]);

        let mut incoming = milk(at(2024, 5, 1));
        incoming.quantity = 9;
        let result = merge_utc(&db, &snapshot_of(vec![incoming]));

        assert_eq!((result.imported, result.updated, result.skipped), (0, 0, 1));
        assert_eq!(db.all_items().unwrap(), vec![live]);
    }

    #[test]
    fn test_merge_older_snapshot_item_skipped() {
        let db = Database::open_in_memory().unwrap();
        let live = milk(at(2024, 5, 3));
        seed(&db, &[live.clone()]);

        let result = merge_utc(&db, &snapshot_of(vec![milk(at(2024, 5, 2))]));
        assert_eq!(result.skipped, 1);
        assert_eq!(db.all_items().unwrap(), vec![live]);
    }

    #[test]
    fn test_merge_never_deletes() {
        let db = Database::open_in_memory().unwrap();
        seed(
            &db,
            &[
                item("Butter", StorageCategory::Fridge, at(2024, 7, 1), at(2024, 5, 1)),
                item("Bread", StorageCategory::Pantry, at(2024, 5, 8), at(2024, 5, 1)),
            ],
        );
        let before = db.item_count().unwrap();

        merge_utc(&db, &snapshot_of(vec![milk(at(2024, 5, 1))]));
        assert_eq!(db.item_count().unwrap(), before + 1);

        merge_utc(&db, &snapshot_of(vec![]));
        assert_eq!(db.item_count().unwrap(), before + 1);
    }

    #[test]
    fn test_merge_same_name_other_day_or_category_is_distinct() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, &[milk(at(2024, 5, 1))]);

        let other_day = item("Milk", StorageCategory::Fridge, at(2024, 5, 11), at(2024, 5, 2));
        let other_place = item("Milk", StorageCategory::Freezer, at(2024, 5, 10), at(2024, 5, 2));
        let result = merge_utc(&db, &snapshot_of(vec![other_day, other_place]));
        assert_eq!(result.imported, 2);
        assert_eq!(db.item_count().unwrap(), 3);
    }

    #[test]
    fn test_merge_matches_on_effective_date() {
        // A fresh item created May 7 and a plain item printed May 10 share a key
        let db = Database::open_in_memory().unwrap();
        let mut live = item("Basil", StorageCategory::Fridge, at(2024, 6, 30), at(2024, 5, 7));
        live.is_fresh = true;
        seed(&db, &[live.clone()]);

        let incoming = item("basil", StorageCategory::Fridge, at(2024, 5, 10), at(2024, 5, 8));
        let result = merge_utc(&db, &snapshot_of(vec![incoming]));
        assert_eq!(result.updated, 1);
        assert_eq!(db.all_items().unwrap()[0].id, live.id);
    }

    #[test]
    fn test_merge_rejects_invalid_items() {
        let db = Database::open_in_memory().unwrap();
        let mut blank = milk(at(2024, 5, 1));
        blank.name = "   ".to_string();
        let mut empty = item("Jam", StorageCategory::Pantry, at(2025, 1, 1), at(2024, 5, 1));
        empty.quantity = 0;
        let good = item("Tofu", StorageCategory::Fridge, at(2024, 5, 20), at(2024, 5, 1));
        let snapshot = snapshot_of(vec![blank.clone(), good, empty.clone()]);

        let result = merge_utc(&db, &snapshot);
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.accounted(), result.total_in_snapshot);
        let rejected: Vec<(usize, Uuid)> = result.rejected.iter().map(|r| (r.index, r.id)).collect();
        assert_eq!(rejected, [(0, blank.id), (2, empty.id)]);
        assert_eq!(db.item_count().unwrap(), 1);
    }

    #[test]
    fn test_merge_collapses_duplicates_within_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let first = milk(at(2024, 5, 1));
        let mut newer = milk(at(2024, 5, 4));
        newer.name = "MILK".to_string();
        newer.quantity = 2;
        let older = milk(at(2024, 4, 1));

        let result = merge_utc(&db, &snapshot_of(vec![first.clone(), newer, older]));
        assert_eq!((result.imported, result.updated, result.skipped), (1, 1, 1));
        let stored = db.all_items().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, first.id);
        assert_eq!(stored[0].quantity, 2);
    }

    #[test]
    fn test_merge_live_collision_updates_earliest_created() {
        let db = Database::open_in_memory().unwrap();
        let mut older = milk(at(2024, 5, 2));
        older.created_at = at(2024, 5, 1);
        let younger = milk(at(2024, 5, 2));
        seed(&db, &[younger.clone(), older.clone()]);

        let mut incoming = milk(at(2024, 5, 6));
        incoming.quantity = 4;
        let result = merge_utc(&db, &snapshot_of(vec![incoming]));
        assert_eq!(result.updated, 1);

        let stored = db.all_items().unwrap();
        let updated = stored.iter().find(|i| i.id == older.id).unwrap();
        let untouched = stored.iter().find(|i| i.id == younger.id).unwrap();
        assert_eq!(updated.quantity, 4);
        assert_eq!(untouched, &younger);
    }

    #[test]
    fn test_merge_reassigns_colliding_id() {
        let db = Database::open_in_memory().unwrap();
        let live = item("Ham", StorageCategory::Fridge, at(2024, 5, 12), at(2024, 5, 1));
        seed(&db, &[live.clone()]);

        let mut incoming = item("Cheese", StorageCategory::Fridge, at(2024, 6, 1), at(2024, 5, 1));
        incoming.id = live.id;
        let result = merge_utc(&db, &snapshot_of(vec![incoming]));
        assert_eq!(result.imported, 1);

        let stored = db.all_items().unwrap();
        assert_eq!(stored.len(), 2);
        let cheese = stored.iter().find(|i| i.name == "Cheese").unwrap();
        assert_ne!(cheese.id, live.id);
        assert_eq!(db.get_item(live.id).unwrap(), live);
    }

    #[test]
    fn test_merge_seeds_records_only_when_absent() {
        let db = Database::open_in_memory().unwrap();
        let snapshot_settings = AppSettings {
            appearance: Appearance::Dark,
            ..AppSettings::default()
        };
        let snapshot = Snapshot::encode(&Dataset {
            items: vec![],
            settings: Some(snapshot_settings.clone()),
            profiles: vec![UserProfile {
                id: Uuid::new_v4(),
                name: "Sam".to_string(),
                household_size: 2,
                created_at: at(2024, 1, 1),
            }],
            custom_food_types: vec![CustomFoodType {
                id: Uuid::new_v4(),
                name: "Sauces".to_string(),
                emoji: None,
                created_at: at(2024, 1, 1),
            }],
        });

        merge_utc(&db, &snapshot);
        assert_eq!(db.find_settings().unwrap(), Some(snapshot_settings));
        assert_eq!(db.profile_count().unwrap(), 1);
        assert_eq!(db.food_type_count().unwrap(), 1);

        // A store that already has records keeps them
        let other = Database::open_in_memory().unwrap();
        let local = other.get_settings().unwrap();
        other.insert_profile("Kai", 1).unwrap();
        merge_utc(&other, &snapshot);
        assert_eq!(other.find_settings().unwrap(), Some(local));
        let profiles = other.list_profiles().unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name, "Kai");
        assert_eq!(other.food_type_count().unwrap(), 1);
    }

    #[test]
    fn test_replace_leaves_exactly_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let mut pictured = milk(at(2024, 5, 1));
        pictured.image = Some(vec![1, 2, 3]);
        seed(&db, &[pictured, item("Ham", StorageCategory::Fridge, at(2024, 5, 12), at(2024, 5, 1))]);
        db.get_settings().unwrap();
        db.insert_profile("Kai", 1).unwrap();
        db.insert_food_type("Leftovers", None).unwrap();

        let mut kept = item("Peas", StorageCategory::Freezer, at(2024, 9, 1), at(2024, 2, 1));
        kept.image = Some(vec![4, 5]);
        let dataset = Dataset {
            items: vec![
                kept,
                item("Rice", StorageCategory::Pantry, at(2025, 1, 1), at(2024, 3, 1)),
            ],
            settings: Some(AppSettings {
                notify_days_before: 5,
                ..AppSettings::default()
            }),
            profiles: vec![UserProfile {
                id: Uuid::new_v4(),
                name: "Sam".to_string(),
                household_size: 4,
                created_at: at(2024, 1, 1),
            }],
            custom_food_types: vec![],
        };

        let result =
            reconcile_in(&db, &Snapshot::encode(&dataset), Strategy::Replace, &Utc).unwrap();
        assert_eq!(result.imported, 2);
        assert_eq!(result.total_in_snapshot, 2);
        assert_eq!(db.load_dataset().unwrap(), dataset);
    }

    #[test]
    fn test_replace_without_settings_installs_defaults() {
        let db = Database::open_in_memory().unwrap();
        let mut settings = db.get_settings().unwrap();
        settings.notify_hour = 20;
        db.put_settings(&settings).unwrap();

        reconcile_in(&db, &snapshot_of(vec![milk(at(2024, 5, 1))]), Strategy::Replace, &Utc)
            .unwrap();
        let installed = db.find_settings().unwrap().unwrap();
        assert_ne!(installed.id, settings.id);
        assert_eq!(installed.notify_hour, 9);
    }

    #[test]
    fn test_replace_with_empty_snapshot_clears_items() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, &[milk(at(2024, 5, 1))]);
        let result = reconcile_in(&db, &snapshot_of(vec![]), Strategy::Replace, &Utc).unwrap();
        assert_eq!(result.imported, 0);
        assert_eq!(db.item_count().unwrap(), 0);
    }

    #[test]
    fn test_replace_invalid_item_aborts_before_wipe() {
        let db = Database::open_in_memory().unwrap();
        let live = milk(at(2024, 5, 1));
        seed(&db, &[live.clone()]);

        let mut bad = item("Jam", StorageCategory::Pantry, at(2025, 1, 1), at(2024, 5, 1));
        bad.quantity = -1;
        let err = reconcile_in(
            &db,
            &snapshot_of(vec![milk(at(2024, 6, 1)), bad.clone()]),
            Strategy::Replace,
            &Utc,
        )
        .unwrap_err();

        match err {
            ReconcileError::ValidationFailure { index, id, .. } => {
                assert_eq!(index, 1);
                assert_eq!(id, bad.id);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(db.all_items().unwrap(), vec![live]);
    }

    #[test]
    fn test_replace_store_failure_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let live = milk(at(2024, 5, 1));
        seed(&db, &[live.clone()]);

        let first = item("Ham", StorageCategory::Fridge, at(2024, 5, 12), at(2024, 5, 1));
        let mut twin = item("Jam", StorageCategory::Pantry, at(2025, 1, 1), at(2024, 5, 1));
        twin.id = first.id;
        let err = reconcile_in(&db, &snapshot_of(vec![first, twin]), Strategy::Replace, &Utc)
            .unwrap_err();

        assert!(matches!(err, ReconcileError::PersistenceFailure(_)));
        assert_eq!(err.code(), "ERR_PERSISTENCE_FAILURE");
        assert_eq!(db.all_items().unwrap(), vec![live]);
    }

    #[test]
    fn test_unsupported_version_leaves_store_unchanged() {
        let db = Database::open_in_memory().unwrap();
        let live = milk(at(2024, 5, 1));
        seed(&db, &[live.clone()]);

        let mut snapshot = snapshot_of(vec![]);
        snapshot.format_version = "2.0".to_string();
        for strategy in [Strategy::Replace, Strategy::Merge] {
            let err = reconcile_in(&db, &snapshot, strategy, &Utc).unwrap_err();
            assert!(matches!(err, ReconcileError::MalformedSnapshot(_)));
        }
        assert_eq!(db.all_items().unwrap(), vec![live]);
    }

    #[test]
    fn test_out_of_range_settings_rejected() {
        let db = Database::open_in_memory().unwrap();
        let snapshot = Snapshot::encode(&Dataset {
            settings: Some(AppSettings {
                notify_hour: 31,
                ..AppSettings::default()
            }),
            ..Dataset::default()
        });
        let err = reconcile_in(&db, &snapshot, Strategy::Merge, &Utc).unwrap_err();
        assert_eq!(err.code(), "ERR_MALFORMED_SNAPSHOT");
        assert!(db.find_settings().unwrap().is_none());
    }

    #[test]
    fn test_preview_reports_counts_without_writing() {
        let db = Database::open_in_memory().unwrap();
        let live = milk(at(2024, 5, 1));
        seed(&db, &[live.clone()]);
        let snapshot = snapshot_of(vec![
            milk(at(2024, 5, 3)),
            item("Kale", StorageCategory::Fridge, at(2024, 5, 9), at(2024, 5, 1)),
        ]);

        let dry = preview_in(&db, &snapshot, Strategy::Merge, &Utc).unwrap();
        assert_eq!((dry.imported, dry.updated, dry.skipped), (1, 1, 0));
        assert_eq!(db.all_items().unwrap(), vec![live]);

        let real = reconcile_in(&db, &snapshot, Strategy::Merge, &Utc).unwrap();
        assert_eq!(real, dry);

        let replace = preview_in(&db, &snapshot, Strategy::Replace, &Utc).unwrap();
        assert_eq!(replace.imported, 2);
        assert_eq!(db.item_count().unwrap(), 2);
    }

    #[test]
    fn test_merge_after_export_roundtrip_is_noop() {
        let db = Database::open_in_memory().unwrap();
        seed(
            &db,
            &[
                milk(at(2024, 5, 1)),
                item("Peas", StorageCategory::Freezer, at(2024, 9, 1), at(2024, 5, 1)),
            ],
        );
        let exported = Snapshot::encode(&db.load_dataset().unwrap());
        let json = exported.to_json().unwrap();
        let reread = Snapshot::from_json(&json).unwrap();

        let result = merge_utc(&db, &reread);
        assert_eq!(result.skipped, 2);
        assert_eq!(db.item_count().unwrap(), 2);

        // Bump one item on the "other device" and merge again
        let mut edited = reread.clone();
        edited.items[0].quantity = 6;
        edited.items[0].updated_at += Duration::minutes(5);
        let result = merge_utc(&db, &edited);
        assert_eq!(result.updated, 1);
        assert_eq!(db.get_item(edited.items[0].id).unwrap().quantity, 6);
    }
}

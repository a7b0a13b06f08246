//! The snapshot document: a versioned, self-describing JSON rendition of the
//! whole store.
//!
//! ```json
//! {
//!   "formatVersion": "1.0",
//!   "exportedAt": "2024-05-10T08:00:00Z",
//!   "items": [ ... ],
//!   "settings": { ... },
//!   "profiles": [ ... ],
//!   "customFoodTypes": [ ... ]
//! }
//! ```
//!
//! Unknown fields are ignored so newer minor versions stay readable. A major
//! version other than 1 is rejected outright.

use std::io::Read;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReconcileError;
use crate::models::{AppSettings, CustomFoodType, Dataset, PerishableItem, UserProfile};

pub const FORMAT_VERSION: &str = "1.0";
const SUPPORTED_MAJOR: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub format_version: String,
    pub exported_at: DateTime<Utc>,
    pub items: Vec<PerishableItem>,
    #[serde(default)]
    pub settings: Option<AppSettings>,
    #[serde(default)]
    pub profiles: Vec<UserProfile>,
    #[serde(default)]
    pub custom_food_types: Vec<CustomFoodType>,
}

impl Snapshot {
    #[must_use]
    pub fn encode(dataset: &Dataset) -> Self {
        Self::encode_at(dataset, Utc::now())
    }

    #[must_use]
    pub fn encode_at(dataset: &Dataset, exported_at: DateTime<Utc>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            exported_at,
            items: dataset.items.clone(),
            settings: dataset.settings.clone(),
            profiles: dataset.profiles.clone(),
            custom_food_types: dataset.custom_food_types.clone(),
        }
    }

    /// Check the version tag and hand back the entity graph.
    pub fn decode(&self) -> Result<Dataset, ReconcileError> {
        check_format_version(&self.format_version)?;
        Ok(Dataset {
            items: self.items.clone(),
            settings: self.settings.clone(),
            profiles: self.profiles.clone(),
            custom_food_types: self.custom_food_types.clone(),
        })
    }

    pub fn into_dataset(self) -> Result<Dataset, ReconcileError> {
        check_format_version(&self.format_version)?;
        Ok(Dataset {
            items: self.items,
            settings: self.settings,
            profiles: self.profiles,
            custom_food_types: self.custom_food_types,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, ReconcileError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ReconcileError::malformed(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ReconcileError> {
        let value: Value = serde_json::from_reader(reader)
            .map_err(|e| ReconcileError::malformed(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Validate and deserialize a parsed document. The version is checked
    /// before anything else so a future layout fails with a version error
    /// rather than a confusing field error.
    pub fn from_value(value: Value) -> Result<Self, ReconcileError> {
        let Value::Object(mut map) = value else {
            return Err(ReconcileError::malformed("document must be a JSON object"));
        };

        let version = map
            .get("formatVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| ReconcileError::malformed("missing required field `formatVersion`"))?;
        check_format_version(version)?;

        let raw_items = match map.remove("items") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ReconcileError::malformed("`items` must be an array")),
            None => return Err(ReconcileError::malformed("missing required field `items`")),
        };
        let items = raw_items
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let item = serde_json::from_value::<PerishableItem>(raw)
                    .map_err(|e| ReconcileError::malformed(format!("item {index}: {e}")))?;
                if i32::try_from(item.quantity).is_err() {
                    return Err(ReconcileError::malformed(format!(
                        "item {index}: quantity {} out of range",
                        item.quantity
                    )));
                }
                Ok(item)
            })
            .collect::<Result<Vec<_>, _>>()?;

        map.insert("items".to_string(), Value::Array(Vec::new()));
        let mut snapshot: Snapshot = serde_json::from_value(Value::Object(map))
            .map_err(|e| ReconcileError::malformed(format!("invalid document: {e}")))?;
        snapshot.items = items;
        Ok(snapshot)
    }
}

fn check_format_version(version: &str) -> Result<(), ReconcileError> {
    let major = version
        .split('.')
        .next()
        .and_then(|m| m.trim().parse::<u64>().ok());
    match major {
        Some(SUPPORTED_MAJOR) => Ok(()),
        Some(other) => Err(ReconcileError::malformed(format!(
            "unsupported format version '{version}' (major {other}, expected {SUPPORTED_MAJOR})"
        ))),
        None => Err(ReconcileError::malformed(format!(
            "unreadable format version '{version}'"
        ))),
    }
}

/// Optional image bytes as standard base64 text.
pub(crate) mod base64_image {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| {
                STANDARD
                    .decode(text.as_bytes())
                    .map_err(|e| serde::de::Error::custom(format!("invalid base64 image: {e}")))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Appearance, DietaryTags, StorageCategory};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 15, 0).unwrap()
    }

    fn full_dataset() -> Dataset {
        let plain = PerishableItem {
            id: Uuid::new_v4(),
            name: "Cheddar".to_string(),
            category: StorageCategory::Fridge,
            expiration_date: ts(2024, 7, 1),
            quantity: 1,
            note: None,
            barcode: None,
            created_at: ts(2024, 5, 1),
            updated_at: ts(2024, 5, 1),
            notify: false,
            is_consumed: false,
            consumed_at: None,
            image: None,
            food_type: None,
            tags: DietaryTags::default(),
            is_fresh: false,
            is_opened: false,
            opened_at: None,
            use_advanced_expiry: false,
        };
        let mut loaded = plain.clone();
        loaded.id = Uuid::new_v4();
        loaded.name = "Frozen Peas".to_string();
        loaded.category = StorageCategory::Freezer;
        loaded.quantity = 3;
        loaded.note = Some("bottom drawer".to_string());
        loaded.barcode = Some("4006381333931".to_string());
        loaded.updated_at = Utc.timestamp_opt(1_715_000_000, 123_456_789).unwrap();
        loaded.notify = true;
        loaded.is_consumed = true;
        loaded.consumed_at = Some(ts(2024, 5, 9));
        loaded.image = Some(vec![0x89, b'P', b'N', b'G', 0, 255, 17]);
        loaded.food_type = Some("vegetables".to_string());
        loaded.tags = DietaryTags {
            vegan: true,
            vegetarian: true,
            gluten_free: true,
            ..DietaryTags::default()
        };
        loaded.is_fresh = true;
        loaded.is_opened = true;
        loaded.opened_at = Some(ts(2024, 5, 3));
        loaded.use_advanced_expiry = true;

        Dataset {
            items: vec![plain, loaded],
            settings: Some(AppSettings {
                appearance: Appearance::Dark,
                notify_days_before: 4,
                cloud_sync_prompted: true,
                updated_at: ts(2024, 4, 1),
                ..AppSettings::default()
            }),
            profiles: vec![UserProfile {
                id: Uuid::new_v4(),
                name: "Sam".to_string(),
                household_size: 3,
                created_at: ts(2024, 1, 1),
            }],
            custom_food_types: vec![
                CustomFoodType {
                    id: Uuid::new_v4(),
                    name: "Sauces".to_string(),
                    emoji: Some("🥫".to_string()),
                    created_at: ts(2024, 2, 1),
                },
                CustomFoodType {
                    id: Uuid::new_v4(),
                    name: "Leftovers".to_string(),
                    emoji: None,
                    created_at: ts(2024, 2, 2),
                },
            ],
        }
    }

    #[test]
    fn test_roundtrip_every_field() {
        let dataset = full_dataset();
        let json = Snapshot::encode(&dataset).to_json().unwrap();
        let decoded = Snapshot::from_json(&json).unwrap().decode().unwrap();
        assert_eq!(decoded, dataset);
    }

    #[test]
    fn test_roundtrip_without_settings() {
        let mut dataset = full_dataset();
        dataset.settings = None;
        let json = Snapshot::encode(&dataset).to_json().unwrap();
        let decoded = Snapshot::from_json(&json).unwrap().into_dataset().unwrap();
        assert_eq!(decoded, dataset);
    }

    #[test]
    fn test_document_shape() {
        let snapshot = Snapshot::encode_at(&full_dataset(), ts(2024, 5, 10));
        let value: Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(value["formatVersion"], "1.0");
        assert_eq!(value["exportedAt"], "2024-05-10T09:15:00Z");
        assert_eq!(value["items"].as_array().unwrap().len(), 2);
        assert_eq!(value["customFoodTypes"].as_array().unwrap().len(), 2);
        assert_eq!(value["items"][1]["image"], "iVBORwD/EQ==");
        assert_eq!(value["items"][1]["isVegan"], true);
        assert!(value["items"][0].get("image").is_none());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{
            "formatVersion": "1.4",
            "exportedAt": "2024-05-10T08:00:00Z",
            "deviceName": "kitchen-ipad",
            "items": [{
                "id": "7f1c0a52-9a43-4b1e-8d4c-0e7c5f2b9a11",
                "name": "Milk",
                "category": "fridge",
                "expirationDate": "2024-05-10T00:00:00+02:00",
                "quantity": 1,
                "createdAt": "2024-05-01T00:00:00Z",
                "updatedAt": "2024-05-01T00:00:00Z",
                "shelfPosition": 3
            }]
        }"#;
        let snapshot = Snapshot::from_json(json).unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert!(snapshot.settings.is_none());
        assert!(snapshot.profiles.is_empty());
        let item = &snapshot.items[0];
        assert_eq!(
            item.expiration_date,
            Utc.with_ymd_and_hms(2024, 5, 9, 22, 0, 0).unwrap()
        );
        assert!(item.notify);
        assert!(!item.is_fresh);
        assert_eq!(item.tags, DietaryTags::default());
    }

    #[test]
    fn test_newer_major_version_rejected() {
        let json = r#"{"formatVersion": "2.0", "exportedAt": "2024-05-10T08:00:00Z", "items": []}"#;
        let err = Snapshot::from_json(json).unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedSnapshot(_)));
        assert!(err.to_string().contains("unsupported format version"));
    }

    #[test]
    fn test_garbage_version_rejected() {
        let json = r#"{"formatVersion": "latest", "exportedAt": "2024-05-10T08:00:00Z", "items": []}"#;
        assert!(matches!(
            Snapshot::from_json(json),
            Err(ReconcileError::MalformedSnapshot(_))
        ));
        let json = r#"{"exportedAt": "2024-05-10T08:00:00Z", "items": []}"#;
        assert!(matches!(
            Snapshot::from_json(json),
            Err(ReconcileError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_decode_checks_version_of_built_snapshot() {
        let mut snapshot = Snapshot::encode(&Dataset::default());
        snapshot.format_version = "3.1".to_string();
        assert!(snapshot.decode().is_err());
    }

    #[test]
    fn test_missing_items_rejected() {
        let json = r#"{"formatVersion": "1.0", "exportedAt": "2024-05-10T08:00:00Z"}"#;
        let err = Snapshot::from_json(json).unwrap_err();
        assert!(err.to_string().contains("items"));
    }

    #[test]
    fn test_item_missing_name_rejected_with_index() {
        let json = r#"{
            "formatVersion": "1.0",
            "exportedAt": "2024-05-10T08:00:00Z",
            "items": [{
                "id": "7f1c0a52-9a43-4b1e-8d4c-0e7c5f2b9a11",
                "category": "fridge",
                "expirationDate": "2024-05-10T00:00:00Z",
                "quantity": 1,
                "createdAt": "2024-05-01T00:00:00Z",
                "updatedAt": "2024-05-01T00:00:00Z"
            }]
        }"#;
        let err = Snapshot::from_json(json).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("item 0"), "{message}");
        assert!(message.contains("name"), "{message}");
    }

    #[test]
    fn test_bad_item_values_rejected() {
        let item = |category: &str, quantity: &str, image: &str| {
            format!(
                r#"{{
                "formatVersion": "1.0",
                "exportedAt": "2024-05-10T08:00:00Z",
                "items": [{{
                    "id": "7f1c0a52-9a43-4b1e-8d4c-0e7c5f2b9a11",
                    "name": "Milk",
                    "category": {category},
                    "expirationDate": "2024-05-10T00:00:00Z",
                    "quantity": {quantity},
                    "image": {image},
                    "createdAt": "2024-05-01T00:00:00Z",
                    "updatedAt": "2024-05-01T00:00:00Z"
                }}]
            }}"#
            )
        };
        assert!(Snapshot::from_json(&item("\"fridge\"", "1", "null")).is_ok());
        assert!(Snapshot::from_json(&item("\"garage\"", "1", "null")).is_err());
        assert!(Snapshot::from_json(&item("\"fridge\"", "1.5", "null")).is_err());
        assert!(Snapshot::from_json(&item("\"fridge\"", "\"two\"", "null")).is_err());
        assert!(Snapshot::from_json(&item("\"fridge\"", "4294967296", "null")).is_err());
        // Range is checked at decode; zero is a value error for reconcile
        assert!(Snapshot::from_json(&item("\"fridge\"", "0", "null")).is_ok());
        assert!(Snapshot::from_json(&item("\"fridge\"", "1", "\"***\"")).is_err());
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(matches!(
            Snapshot::from_json("{not json"),
            Err(ReconcileError::MalformedSnapshot(_))
        ));
        assert!(matches!(
            Snapshot::from_json("[]"),
            Err(ReconcileError::MalformedSnapshot(_))
        ));
    }
}

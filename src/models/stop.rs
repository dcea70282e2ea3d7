use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::photo::Photo;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    #[default]
    Active,
    Repair,
    Dismantled,
    Inactive,
    Other,
}

impl std::fmt::Display for StopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopStatus::Active => "active",
            StopStatus::Repair => "repair",
            StopStatus::Dismantled => "dismantled",
            StopStatus::Inactive => "inactive",
            StopStatus::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StopStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StopStatus::Active),
            "repair" => Ok(StopStatus::Repair),
            "dismantled" => Ok(StopStatus::Dismantled),
            "inactive" => Ok(StopStatus::Inactive),
            "other" => Ok(StopStatus::Other),
            _ => Err(anyhow::anyhow!("Unknown status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Excellent,
    #[default]
    Satisfactory,
    NeedsRepair,
    Critical,
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Condition::Excellent => "excellent",
            Condition::Satisfactory => "satisfactory",
            Condition::NeedsRepair => "needs_repair",
            Condition::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Condition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "excellent" => Ok(Condition::Excellent),
            "satisfactory" => Ok(Condition::Satisfactory),
            "needs_repair" => Ok(Condition::NeedsRepair),
            "critical" => Ok(Condition::Critical),
            _ => Err(anyhow::anyhow!("Unknown condition: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StopType {
    #[default]
    #[serde(rename = "4m")]
    FourMetre,
    #[serde(rename = "7m")]
    SevenMetre,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoofType {
    #[default]
    Flat,
    Arched,
    Peaked,
}

/// Audit trail row. Immutable once written by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub user_name: String,
    pub field_name: String,
    #[serde(default)]
    pub old_value: Option<String>,
    #[serde(default)]
    pub new_value: Option<String>,
    pub changed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomFieldValue {
    pub field_id: i64,
    pub field_name: String,
    pub field_type: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFieldUpdate {
    pub field_id: i64,
    pub value: Option<String>,
}

/// Physical bus stop as returned by `/stops`.
///
/// Missing fields decode to their defaults so an older or newer backend
/// does not break the whole collection load.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusStop {
    pub id: i64,
    /// Human-facing code, e.g. "BS-001".
    pub stop_id: String,
    pub passport_number: Option<String>,
    pub qr_code: Option<String>,

    pub address: String,
    pub landmark: Option<String>,
    pub district: String,
    pub routes: Option<String>,

    pub latitude: f64,
    pub longitude: f64,

    pub status: StopStatus,
    pub condition: Condition,
    pub meets_standards: bool,

    pub stop_type: StopType,
    pub legs_count: i32,
    pub year_built: Option<i32>,
    pub paint_color: Option<String>,

    pub seats_condition: Condition,

    pub roof_type: RoofType,
    pub roof_color: Option<String>,
    pub roof_condition: Condition,
    pub has_roof_slif: bool,

    pub glass_condition: Condition,
    pub glass_mount_condition: Condition,
    pub glass_replacement_count: i32,

    pub has_electricity: bool,
    pub has_bin: bool,
    pub bin_condition: Option<Condition>,
    pub hanging_elements: Option<String>,
    pub fasteners: Option<String>,

    pub last_inspection_date: Option<NaiveDateTime>,
    pub inspector_name: Option<String>,
    pub next_inspection_date: Option<NaiveDateTime>,

    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,

    pub photos: Vec<Photo>,
    pub change_logs: Vec<ChangeLogEntry>,
    pub custom_field_values: Vec<CustomFieldValue>,
}

impl BusStop {
    /// A stop is addressed either by its numeric id or its code.
    pub fn matches_key(&self, key: &str) -> bool {
        self.stop_id == key || self.id.to_string() == key
    }

    pub fn main_photo(&self) -> Option<&Photo> {
        self.photos.iter().find(|p| p.is_main)
    }

    /// Flag `photo_id` as the main photo and clear the flag everywhere else.
    /// Returns false if the photo does not belong to this stop.
    pub fn mark_main_photo(&mut self, photo_id: i64) -> bool {
        if !self.photos.iter().any(|p| p.id == photo_id) {
            return false;
        }
        for photo in &mut self.photos {
            photo.is_main = photo.id == photo_id;
        }
        true
    }

    /// Shallow-merge every `Some` field of `patch` into this record.
    pub fn apply_patch(&mut self, patch: &StopPatch) {
        macro_rules! merge {
            ($target:ident, $patch:ident; $($field:ident),* $(,)?) => {
                $(if let Some(v) = &$patch.$field { $target.$field = v.clone(); })*
            };
        }
        macro_rules! merge_opt {
            ($target:ident, $patch:ident; $($field:ident),* $(,)?) => {
                $(if let Some(v) = &$patch.$field { $target.$field = Some(v.clone()); })*
            };
        }

        let target = self;
        merge!(
            target, patch;
            address, district, latitude, longitude, status, condition, meets_standards,
            stop_type, legs_count, seats_condition, roof_type, roof_condition, has_roof_slif,
            glass_condition, glass_mount_condition, glass_replacement_count, has_electricity,
            has_bin,
        );
        merge_opt!(
            target, patch;
            landmark, routes, year_built, paint_color, roof_color, bin_condition,
            hanging_elements, fasteners, last_inspection_date, inspector_name,
            next_inspection_date,
        );
    }
}

/// Body of `POST /stops`. Defaults mirror the backend's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStop {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
    pub district: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub status: StopStatus,
    pub condition: Condition,
    pub meets_standards: bool,
    pub stop_type: StopType,
    pub legs_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paint_color: Option<String>,
    pub seats_condition: Condition,
    pub roof_type: RoofType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roof_color: Option<String>,
    pub roof_condition: Condition,
    pub has_roof_slif: bool,
    pub glass_condition: Condition,
    pub glass_mount_condition: Condition,
    pub glass_replacement_count: i32,
    pub has_electricity: bool,
    pub has_bin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_condition: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hanging_elements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fasteners: Option<String>,
}

impl Default for NewStop {
    fn default() -> Self {
        Self {
            address: String::new(),
            landmark: None,
            district: String::new(),
            routes: None,
            latitude: 0.0,
            longitude: 0.0,
            status: StopStatus::Active,
            condition: Condition::Satisfactory,
            meets_standards: true,
            stop_type: StopType::FourMetre,
            legs_count: 2,
            year_built: None,
            paint_color: None,
            seats_condition: Condition::Satisfactory,
            roof_type: RoofType::Flat,
            roof_color: None,
            roof_condition: Condition::Satisfactory,
            has_roof_slif: false,
            glass_condition: Condition::Satisfactory,
            glass_mount_condition: Condition::Satisfactory,
            glass_replacement_count: 0,
            has_electricity: false,
            has_bin: false,
            bin_condition: None,
            hanging_elements: None,
            fasteners: None,
        }
    }
}

/// Body of `PUT /stops/{id}`; only `Some` fields are sent and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StopPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StopStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meets_standards: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_type: Option<StopType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legs_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paint_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seats_condition: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roof_type: Option<RoofType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roof_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roof_condition: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_roof_slif: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glass_condition: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glass_mount_condition: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glass_replacement_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_electricity: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_bin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_condition: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hanging_elements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fasteners: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_inspection_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspector_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_inspection_date: Option<NaiveDateTime>,
}

/// Server-side filter + pagination for `GET /stops`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StopStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopsPage {
    pub stops: Vec<BusStop>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub pages: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StopStats {
    pub total_stops: u64,
    pub active_stops: u64,
    pub repair_stops: u64,
    pub dismantled_stops: u64,
    pub inactive_stops: u64,
    pub excellent_condition: u64,
    pub satisfactory_condition: u64,
    pub needs_repair_condition: u64,
    pub critical_condition: u64,
    pub inspected_this_month: u64,
    pub by_district: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictsResponse {
    pub districts: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectionResult {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stop_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(id: i64, is_main: bool) -> Photo {
        Photo {
            id,
            is_main,
            ..Default::default()
        }
    }

    #[test]
    fn test_matches_key_by_code_or_id() {
        let stop = BusStop {
            id: 42,
            stop_id: "BS-042".into(),
            ..Default::default()
        };
        assert!(stop.matches_key("42"));
        assert!(stop.matches_key("BS-042"));
        assert!(!stop.matches_key("BS-42"));
    }

    #[test]
    fn test_mark_main_photo_keeps_single_main() {
        let mut stop = BusStop {
            photos: vec![photo(1, true), photo(2, false), photo(3, true)],
            ..Default::default()
        };
        assert!(stop.mark_main_photo(2));
        let mains: Vec<i64> = stop.photos.iter().filter(|p| p.is_main).map(|p| p.id).collect();
        assert_eq!(mains, vec![2]);
        assert_eq!(stop.main_photo().map(|p| p.id), Some(2));
    }

    #[test]
    fn test_mark_main_photo_unknown_photo_is_noop() {
        let mut stop = BusStop {
            photos: vec![photo(1, true)],
            ..Default::default()
        };
        assert!(!stop.mark_main_photo(9));
        assert!(stop.photos[0].is_main);
    }

    #[test]
    fn test_apply_patch_merges_only_set_fields() {
        let mut stop = BusStop {
            address: "Old street".into(),
            district: "North".into(),
            landmark: Some("Market".into()),
            status: StopStatus::Active,
            ..Default::default()
        };
        let patch = StopPatch {
            status: Some(StopStatus::Repair),
            landmark: Some("Park".into()),
            ..Default::default()
        };
        stop.apply_patch(&patch);
        assert_eq!(stop.status, StopStatus::Repair);
        assert_eq!(stop.landmark.as_deref(), Some("Park"));
        assert_eq!(stop.address, "Old street");
        assert_eq!(stop.district, "North");
    }

    #[test]
    fn test_decode_partial_stop_uses_defaults() {
        let stop: BusStop = serde_json::from_str(
            r#"{"id":7,"stop_id":"BS-007","address":"Main 1","district":"Center","status":"repair","condition":"needs_repair","stop_type":"7m"}"#,
        )
        .unwrap();
        assert_eq!(stop.status, StopStatus::Repair);
        assert_eq!(stop.condition, Condition::NeedsRepair);
        assert_eq!(stop.stop_type, StopType::SevenMetre);
        assert!(stop.photos.is_empty());
    }
}

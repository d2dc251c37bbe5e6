//! Data bag: the accumulated record of every answer collected so far.
//!
//! The bag is never mutated in place. Each merge returns a new snapshot, and
//! a merge only writes keys owned by the submitting step, so a later step can
//! never clobber an earlier step's answers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::step::StepDefinition;

/// Field names shared by the catalog, restore chain, and completion pipeline.
pub mod fields {
    pub const AGE: &str = "age";
    pub const WEIGHT_KG: &str = "weight_kg";
    pub const HEIGHT_CM: &str = "height_cm";
    pub const SEX: &str = "sex";

    pub const PRIMARY_GOAL: &str = "primary_goal";
    pub const EXPERIENCE_LEVEL: &str = "experience_level";
    pub const TRAINING_DAYS_PER_WEEK: &str = "training_days_per_week";
    pub const SPORT_TYPE: &str = "sport_type";
    pub const WANTS_NUTRITION: &str = "wants_nutrition";

    pub const ACTIVITY_LEVEL: &str = "activity_level";
    pub const SLEEP_HOURS: &str = "sleep_hours";
    pub const STRESS_LEVEL: &str = "stress_level";
    pub const HAS_INJURY: &str = "has_injury";

    pub const DIET_TYPE: &str = "diet_type";
    pub const MEALS_PER_DAY: &str = "meals_per_day";
    pub const CALORIE_TARGET: &str = "calorie_target";

    pub const LIKED_FOODS: &str = "liked_foods";
    pub const DISLIKED_FOODS: &str = "disliked_foods";
    pub const ALLERGIES: &str = "allergies";

    pub const CHAT_SUMMARY: &str = "chat_summary";
    pub const INJURY_DETECTED: &str = "injury_detected";

    pub const INJURY_AREA: &str = "injury_area";
    pub const INJURY_SEVERITY: &str = "injury_severity";
    pub const INJURY_NOTES: &str = "injury_notes";

    pub const SQUAT_KG: &str = "squat_kg";
    pub const BENCH_KG: &str = "bench_kg";
    pub const DEADLIFT_KG: &str = "deadlift_kg";

    pub const CONFIRMED: &str = "confirmed";
}

/// Immutable snapshot of collected answers, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataBag {
    fields: BTreeMap<String, Value>,
}

impl DataBag {
    /// An empty bag, as at wizard start.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new bag with `output` merged in on behalf of `step`.
    ///
    /// Keys the step does not own are dropped. Keys the step does own
    /// overwrite any earlier value for the same key.
    pub fn merged(&self, step: &StepDefinition, output: &Map<String, Value>) -> DataBag {
        let mut fields = self.fields.clone();
        for (key, value) in output {
            if step.owns(key) {
                fields.insert(key.clone(), value.clone());
            } else {
                warn!(
                    step = %step.id,
                    key = %key,
                    "Dropping key not owned by submitting step"
                );
            }
        }
        DataBag { fields }
    }

    /// Look up a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Whether `key` is present with a non-null value.
    pub fn has_value(&self, key: &str) -> bool {
        matches!(self.fields.get(key), Some(v) if !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    /// Read a list of strings, skipping non-string entries.
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Iterate over field names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every key in `other` is present here.
    pub fn contains_keys_of(&self, other: &DataBag) -> bool {
        other.fields.keys().all(|k| self.fields.contains_key(k))
    }

    /// Copy out the subset of fields named in `keys` that are present.
    pub fn subset(&self, keys: &[&str]) -> Map<String, Value> {
        keys.iter()
            .filter_map(|k| self.fields.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }

    /// The whole bag as a JSON object.
    pub fn to_json_map(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::step::{StepCatalog, StepId};
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_returns_new_snapshot() {
        let catalog = StepCatalog::standard();
        let biometrics = catalog.get(StepId::Biometrics).unwrap();
        let empty = DataBag::new();

        let bag = empty.merged(biometrics, &object(json!({"age": 30, "weight_kg": 70})));

        assert!(empty.is_empty(), "original snapshot must be untouched");
        assert_eq!(bag.get_f64("age"), Some(30.0));
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn merge_drops_foreign_keys() {
        let catalog = StepCatalog::standard();
        let biometrics = catalog.get(StepId::Biometrics).unwrap();
        let goals = catalog.get(StepId::TrainingGoals).unwrap();

        let bag = DataBag::new().merged(biometrics, &object(json!({"age": 30})));
        let bag = bag.merged(goals, &object(json!({"primary_goal": "fat_loss", "age": 99})));

        assert_eq!(bag.get_f64("age"), Some(30.0));
        assert_eq!(bag.get_str("primary_goal"), Some("fat_loss"));
    }

    #[test]
    fn owner_may_overwrite_its_own_keys() {
        let catalog = StepCatalog::standard();
        let goals = catalog.get(StepId::TrainingGoals).unwrap();

        let bag = DataBag::new().merged(goals, &object(json!({"primary_goal": "fat_loss"})));
        let bag = bag.merged(goals, &object(json!({"primary_goal": "muscle_gain"})));

        assert_eq!(bag.get_str("primary_goal"), Some("muscle_gain"));
    }

    #[test]
    fn has_value_ignores_null() {
        let catalog = StepCatalog::standard();
        let lifestyle = catalog.get(StepId::Lifestyle).unwrap();
        let bag = DataBag::new().merged(
            lifestyle,
            &object(json!({"sleep_hours": null, "activity_level": "moderate"})),
        );

        assert!(bag.get("sleep_hours").is_some());
        assert!(!bag.has_value("sleep_hours"));
        assert!(bag.has_value("activity_level"));
        assert!(!bag.has_value("stress_level"));
    }

    #[test]
    fn str_list_skips_non_strings() {
        let catalog = StepCatalog::standard();
        let prefs = catalog.get(StepId::FoodPrefs).unwrap();
        let bag = DataBag::new().merged(
            prefs,
            &object(json!({"liked_foods": ["rice", 3, "eggs"]})),
        );

        assert_eq!(bag.get_str_list("liked_foods"), vec!["rice", "eggs"]);
        assert!(bag.get_str_list("disliked_foods").is_empty());
    }

    #[test]
    fn bag_serializes_as_plain_object() {
        let catalog = StepCatalog::standard();
        let biometrics = catalog.get(StepId::Biometrics).unwrap();
        let bag = DataBag::new().merged(biometrics, &object(json!({"sex": "f"})));

        let json = serde_json::to_value(&bag).unwrap();
        assert_eq!(json, json!({"sex": "f"}));
    }
}

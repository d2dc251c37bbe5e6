//! Persistence gateway: the remote profile service the wizard drives.
//!
//! Calls are fire-once; the gateway makes no idempotency promise. The wizard
//! keeps identifiers stable across retries so a correct backend can treat a
//! repeated write as an update.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::GatewayError;

pub use memory::InMemoryGateway;

/// Profile keys written by the completion pipeline.
pub mod profile_keys {
    pub const ONBOARDING_COMPLETED: &str = "onboarding_completed";
    pub const ONBOARDING_COMPLETED_AT: &str = "onboarding_completed_at";
    pub const ONBOARDING_RUN_ID: &str = "onboarding_run_id";
}

/// The user's profile as stored remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default)]
    pub onboarding_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_completed_at: Option<DateTime<Utc>>,
    /// Every other profile field, keyed by the same names the bag uses.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ProfileRecord {
    /// Build a record from loose fields, as a backend would hold them.
    pub fn from_fields(fields: Value) -> Self {
        let mut record = Self::default();
        if let Value::Object(map) = fields {
            record.apply(&map);
        }
        record
    }

    /// Apply a partial update. Later values win.
    pub fn apply(&mut self, partial: &Map<String, Value>) {
        for (key, value) in partial {
            match key.as_str() {
                profile_keys::ONBOARDING_COMPLETED => {
                    self.onboarding_completed = value.as_bool().unwrap_or(false);
                }
                profile_keys::ONBOARDING_COMPLETED_AT => {
                    self.onboarding_completed_at = serde_json::from_value(value.clone()).ok();
                }
                _ => {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Whether `key` is present with a non-null value.
    pub fn has_value(&self, key: &str) -> bool {
        matches!(self.fields.get(key), Some(v) if !v.is_null())
    }
}

/// Initial measurement entry seeded from the biometrics answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricsEntry {
    /// Stable per wizard run, so a retried seed is recognisably the same entry.
    pub entry_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
}

/// Liked and disliked items collected by the food preferences step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodPreferences {
    #[serde(default)]
    pub liked: Vec<String>,
    #[serde(default)]
    pub disliked: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allergies: Vec<String>,
}

impl FoodPreferences {
    /// Allergies alone do not count; they are part of the profile itself.
    pub fn is_empty(&self) -> bool {
        self.liked.is_empty() && self.disliked.is_empty()
    }
}

/// Downstream plan generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Coach,
    Medical,
    Nutrition,
}

impl std::fmt::Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coach => write!(f, "coach"),
            Self::Medical => write!(f, "medical"),
            Self::Nutrition => write!(f, "nutrition"),
        }
    }
}

/// Handle for an accepted generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanJob {
    pub job_id: Uuid,
    pub kind: PlanKind,
}

/// Remote profile service consumed by the wizard.
#[async_trait]
pub trait ProfileGateway: Send + Sync {
    /// Read the current user's profile.
    async fn get_profile(&self) -> Result<ProfileRecord, GatewayError>;

    /// Merge `partial` into the profile and return the result.
    async fn update_profile(
        &self,
        partial: Map<String, Value>,
    ) -> Result<ProfileRecord, GatewayError>;

    /// Create (or, for a known `entry_id`, replace) a measurement entry.
    async fn create_biometrics_entry(
        &self,
        entry: &BiometricsEntry,
    ) -> Result<BiometricsEntry, GatewayError>;

    /// Store food preferences.
    async fn save_preferences(&self, preferences: &FoodPreferences) -> Result<(), GatewayError>;

    /// Kick off plan generation. The job runs remotely.
    async fn generate_plan(&self, kind: PlanKind, params: Value) -> Result<PlanJob, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_apply_splits_known_keys() {
        let mut record = ProfileRecord::default();
        let partial = json!({
            "age": 30,
            "onboarding_completed": true,
            "onboarding_completed_at": "2026-01-02T03:04:05Z",
        });
        record.apply(partial.as_object().unwrap());

        assert!(record.onboarding_completed);
        assert!(record.onboarding_completed_at.is_some());
        assert_eq!(record.fields.get("age"), Some(&json!(30)));
        assert!(!record.fields.contains_key("onboarding_completed"));
    }

    #[test]
    fn profile_flattens_fields_on_the_wire() {
        let record = ProfileRecord::from_fields(json!({"age": 30, "sex": "m"}));
        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["age"], 30);
        assert_eq!(wire["onboarding_completed"], false);

        let parsed: ProfileRecord = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn null_field_is_not_a_value() {
        let record = ProfileRecord::from_fields(json!({"age": null, "sex": "f"}));
        assert!(!record.has_value("age"));
        assert!(record.has_value("sex"));
        assert!(!record.has_value("weight_kg"));
    }

    #[test]
    fn preferences_empty_ignores_allergies() {
        let prefs = FoodPreferences {
            allergies: vec!["nuts".into()],
            ..Default::default()
        };
        assert!(prefs.is_empty());

        let prefs = FoodPreferences {
            disliked: vec!["kale".into()],
            ..Default::default()
        };
        assert!(!prefs.is_empty());
    }

    #[test]
    fn plan_kind_display_matches_serde() {
        for kind in [PlanKind::Coach, PlanKind::Medical, PlanKind::Nutrition] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(format!("\"{kind}\""), json);
        }
    }
}

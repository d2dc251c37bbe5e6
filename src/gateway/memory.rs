//! In-memory gateway: a reference backend that records every call.
//!
//! Failures can be queued per operation to exercise the wizard's recovery
//! paths. Measurement entries are keyed by `entry_id`, so a repeated seed
//! replaces rather than duplicates.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::GatewayError;

use super::{BiometricsEntry, FoodPreferences, PlanJob, PlanKind, ProfileGateway, ProfileRecord};

/// Gateway operation, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetProfile,
    UpdateProfile,
    CreateBiometricsEntry,
    SavePreferences,
    GeneratePlan,
}

/// A recorded gateway call with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    GetProfile,
    UpdateProfile(Map<String, Value>),
    CreateBiometricsEntry(BiometricsEntry),
    SavePreferences(FoodPreferences),
    GeneratePlan(PlanKind, Value),
}

impl GatewayCall {
    pub fn operation(&self) -> Operation {
        match self {
            Self::GetProfile => Operation::GetProfile,
            Self::UpdateProfile(_) => Operation::UpdateProfile,
            Self::CreateBiometricsEntry(_) => Operation::CreateBiometricsEntry,
            Self::SavePreferences(_) => Operation::SavePreferences,
            Self::GeneratePlan(..) => Operation::GeneratePlan,
        }
    }
}

#[derive(Default)]
struct Inner {
    profile: Option<ProfileRecord>,
    entries: Vec<BiometricsEntry>,
    preferences: Option<FoodPreferences>,
    calls: Vec<GatewayCall>,
    failures: HashMap<Operation, VecDeque<GatewayError>>,
}

/// Thread-safe in-memory [`ProfileGateway`].
#[derive(Default)]
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
}

impl InMemoryGateway {
    /// A gateway with no stored profile (`get_profile` fails with `NotFound`).
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that already holds `profile`.
    pub fn with_profile(profile: ProfileRecord) -> Self {
        Self {
            inner: Mutex::new(Inner {
                profile: Some(profile),
                ..Default::default()
            }),
        }
    }

    /// Make the next call to `op` fail with `error`. Queued failures are
    /// consumed in order.
    pub async fn fail_next(&self, op: Operation, error: GatewayError) {
        self.inner
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Number of calls made to `op`.
    pub async fn call_count(&self, op: Operation) -> usize {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.operation() == op)
            .count()
    }

    pub async fn profile(&self) -> Option<ProfileRecord> {
        self.inner.lock().await.profile.clone()
    }

    pub async fn biometrics_entries(&self) -> Vec<BiometricsEntry> {
        self.inner.lock().await.entries.clone()
    }

    pub async fn preferences(&self) -> Option<FoodPreferences> {
        self.inner.lock().await.preferences.clone()
    }

    /// Record the call and pop an injected failure, if any.
    async fn record(&self, call: GatewayCall) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().await;
        let op = call.operation();
        debug!(operation = ?op, "In-memory gateway call");
        inner.calls.push(call);
        match inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProfileGateway for InMemoryGateway {
    async fn get_profile(&self) -> Result<ProfileRecord, GatewayError> {
        self.record(GatewayCall::GetProfile).await?;
        self.inner
            .lock()
            .await
            .profile
            .clone()
            .ok_or(GatewayError::NotFound)
    }

    async fn update_profile(
        &self,
        partial: Map<String, Value>,
    ) -> Result<ProfileRecord, GatewayError> {
        self.record(GatewayCall::UpdateProfile(partial.clone()))
            .await?;
        let mut inner = self.inner.lock().await;
        let profile = inner.profile.get_or_insert_with(ProfileRecord::default);
        profile.apply(&partial);
        Ok(profile.clone())
    }

    async fn create_biometrics_entry(
        &self,
        entry: &BiometricsEntry,
    ) -> Result<BiometricsEntry, GatewayError> {
        self.record(GatewayCall::CreateBiometricsEntry(entry.clone()))
            .await?;
        let mut inner = self.inner.lock().await;
        match inner.entries.iter_mut().find(|e| e.entry_id == entry.entry_id) {
            Some(existing) => *existing = entry.clone(),
            None => inner.entries.push(entry.clone()),
        }
        Ok(entry.clone())
    }

    async fn save_preferences(&self, preferences: &FoodPreferences) -> Result<(), GatewayError> {
        self.record(GatewayCall::SavePreferences(preferences.clone()))
            .await?;
        self.inner.lock().await.preferences = Some(preferences.clone());
        Ok(())
    }

    async fn generate_plan(&self, kind: PlanKind, params: Value) -> Result<PlanJob, GatewayError> {
        self.record(GatewayCall::GeneratePlan(kind, params)).await?;
        Ok(PlanJob {
            job_id: Uuid::new_v4(),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let gateway = InMemoryGateway::new();
        assert_eq!(gateway.get_profile().await, Err(GatewayError::NotFound));
        assert_eq!(gateway.call_count(Operation::GetProfile).await, 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let gateway = InMemoryGateway::new();
        gateway
            .fail_next(Operation::SavePreferences, GatewayError::Network("down".into()))
            .await;

        let prefs = FoodPreferences::default();
        assert!(gateway.save_preferences(&prefs).await.is_err());
        assert!(gateway.save_preferences(&prefs).await.is_ok());
        assert_eq!(gateway.call_count(Operation::SavePreferences).await, 2);
    }

    #[tokio::test]
    async fn update_creates_and_merges_profile() {
        let gateway = InMemoryGateway::new();
        let partial = json!({"age": 30}).as_object().cloned().unwrap();
        gateway.update_profile(partial).await.unwrap();
        let partial = json!({"sex": "f"}).as_object().cloned().unwrap();
        let profile = gateway.update_profile(partial).await.unwrap();

        assert_eq!(profile.fields.len(), 2);
        assert_eq!(gateway.profile().await, Some(profile));
    }

    #[tokio::test]
    async fn repeated_entry_id_replaces_entry() {
        let gateway = InMemoryGateway::new();
        let entry = BiometricsEntry {
            entry_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            weight_kg: Some(70.0),
            height_cm: None,
            age: None,
            sex: None,
        };
        gateway.create_biometrics_entry(&entry).await.unwrap();
        gateway.create_biometrics_entry(&entry).await.unwrap();

        assert_eq!(gateway.biometrics_entries().await.len(), 1);
        assert_eq!(gateway.call_count(Operation::CreateBiometricsEntry).await, 2);
    }
}

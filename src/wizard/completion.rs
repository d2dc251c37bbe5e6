//! Completion pipeline: the terminal multi-phase commit.
//!
//! Phases run strictly in order:
//! 1. Finalize: send the whole bag and mark onboarding complete (fatal)
//! 2. Seed record: create the initial measurement entry (fatal)
//! 3. Preferences: save liked/disliked items when any exist (logged only)
//! 4. Generation: one `generate_plan` per enabled plan kind, launched
//!    concurrently on a detached task and never awaited here
//!
//! A retry replays phases from the same [`RetryPayload`], so identifiers
//! and timestamps sent to the gateway are identical on every attempt.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::gateway::{BiometricsEntry, FoodPreferences, PlanKind, ProfileGateway, profile_keys};

use super::bag::{DataBag, fields};
use super::step::Capabilities;

/// Which fatal phase failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionErrorKind {
    Finalize,
    SeedRecord,
}

impl std::fmt::Display for CompletionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finalize => write!(f, "finalize"),
            Self::SeedRecord => write!(f, "seed_record"),
        }
    }
}

/// Snapshot handed to the pipeline, kept for `retry()` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPayload {
    pub run_id: Uuid,
    pub bag: DataBag,
    pub captured_at: DateTime<Utc>,
}

impl RetryPayload {
    pub fn capture(run_id: Uuid, bag: DataBag) -> Self {
        Self {
            run_id,
            bag,
            captured_at: Utc::now(),
        }
    }

    /// Measurement entry id, derived from the run so retries reuse it.
    pub fn seed_entry_id(&self) -> Uuid {
        Uuid::new_v5(&self.run_id, b"biometrics-entry")
    }
}

/// Outcome of one pipeline attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionResult {
    pub succeeded: bool,
    pub retry_payload: Option<RetryPayload>,
    pub error: Option<CompletionErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CompletionResult {
    fn success() -> Self {
        Self {
            succeeded: true,
            retry_payload: None,
            error: None,
            message: None,
        }
    }

    fn failure(kind: CompletionErrorKind, message: String, payload: RetryPayload) -> Self {
        Self {
            succeeded: false,
            retry_payload: Some(payload),
            error: Some(kind),
            message: Some(message),
        }
    }
}

/// Best-effort tally of the generation calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: Vec<(PlanKind, String)>,
}

/// Result of [`CompletionPipeline::run`].
#[derive(Debug)]
pub struct PipelineRun {
    pub result: CompletionResult,
    /// Detached generation task, present only when phase 4 launched anything.
    pub generation: Option<JoinHandle<GenerationReport>>,
}

/// Executes the commit phases against a gateway.
pub struct CompletionPipeline {
    gateway: Arc<dyn ProfileGateway>,
    nutrition_goals: Vec<String>,
    generate_plans: bool,
}

impl CompletionPipeline {
    pub fn new(
        gateway: Arc<dyn ProfileGateway>,
        nutrition_goals: Vec<String>,
        generate_plans: bool,
    ) -> Self {
        Self {
            gateway,
            nutrition_goals,
            generate_plans,
        }
    }

    /// Run every phase for `payload`.
    pub async fn run(&self, payload: RetryPayload) -> PipelineRun {
        info!(run_id = %payload.run_id, fields = payload.bag.len(), "Completion pipeline started");

        if let Err(message) = self.finalize(&payload).await {
            error!(run_id = %payload.run_id, error = %message, "Finalize failed");
            return PipelineRun {
                result: CompletionResult::failure(CompletionErrorKind::Finalize, message, payload),
                generation: None,
            };
        }

        if let Err(message) = self.seed_record(&payload).await {
            error!(run_id = %payload.run_id, error = %message, "Seed record failed");
            return PipelineRun {
                result: CompletionResult::failure(
                    CompletionErrorKind::SeedRecord,
                    message,
                    payload,
                ),
                generation: None,
            };
        }

        self.save_preferences(&payload).await;

        let generation = if self.generate_plans {
            self.launch_generation(&payload)
        } else {
            debug!("Plan generation disabled");
            None
        };

        info!(run_id = %payload.run_id, "Completion pipeline succeeded");
        PipelineRun {
            result: CompletionResult::success(),
            generation,
        }
    }

    async fn finalize(&self, payload: &RetryPayload) -> Result<(), String> {
        let mut partial = payload.bag.to_json_map();
        partial.insert(profile_keys::ONBOARDING_COMPLETED.into(), Value::Bool(true));
        partial.insert(
            profile_keys::ONBOARDING_COMPLETED_AT.into(),
            Value::String(payload.captured_at.to_rfc3339()),
        );
        partial.insert(
            profile_keys::ONBOARDING_RUN_ID.into(),
            Value::String(payload.run_id.to_string()),
        );

        self.gateway
            .update_profile(partial)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn seed_record(&self, payload: &RetryPayload) -> Result<(), String> {
        let bag = &payload.bag;
        let entry = BiometricsEntry {
            entry_id: payload.seed_entry_id(),
            recorded_at: payload.captured_at,
            weight_kg: bag.get_f64(fields::WEIGHT_KG),
            height_cm: bag.get_f64(fields::HEIGHT_CM),
            age: bag.get_f64(fields::AGE),
            sex: bag.get_str(fields::SEX).map(String::from),
        };

        self.gateway
            .create_biometrics_entry(&entry)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Skipped entirely when there is nothing to save. Failure is logged.
    async fn save_preferences(&self, payload: &RetryPayload) {
        let bag = &payload.bag;
        let preferences = FoodPreferences {
            liked: bag.get_str_list(fields::LIKED_FOODS),
            disliked: bag.get_str_list(fields::DISLIKED_FOODS),
            allergies: bag.get_str_list(fields::ALLERGIES),
        };
        if preferences.is_empty() {
            debug!(run_id = %payload.run_id, "No food preferences, skipping save");
            return;
        }

        if let Err(e) = self.gateway.save_preferences(&preferences).await {
            warn!(
                run_id = %payload.run_id,
                error = %e,
                "Saving food preferences failed, continuing"
            );
        }
    }

    /// Spawn one generation call per enabled plan kind and settle them all.
    fn launch_generation(&self, payload: &RetryPayload) -> Option<JoinHandle<GenerationReport>> {
        let capabilities = Capabilities::derive(&payload.bag, &self.nutrition_goals);
        let requests: Vec<(PlanKind, Value)> = plan_kinds(&capabilities)
            .into_iter()
            .map(|kind| (kind, plan_params(kind, payload)))
            .collect();
        if requests.is_empty() {
            debug!(run_id = %payload.run_id, "No plan kinds enabled");
            return None;
        }

        let gateway = Arc::clone(&self.gateway);
        let run_id = payload.run_id;
        Some(tokio::spawn(async move {
            let calls = requests.into_iter().map(|(kind, params)| {
                let gateway = Arc::clone(&gateway);
                async move { (kind, gateway.generate_plan(kind, params).await) }
            });
            let outcomes = join_all(calls).await;

            let mut report = GenerationReport {
                requested: outcomes.len(),
                ..Default::default()
            };
            for (kind, outcome) in outcomes {
                match outcome {
                    Ok(job) => {
                        debug!(
                            %run_id,
                            kind = %kind,
                            job_id = %job.job_id,
                            "Plan generation accepted"
                        );
                        report.succeeded += 1;
                    }
                    Err(e) => {
                        warn!(%run_id, kind = %kind, error = %e, "Plan generation failed");
                        report.failed.push((kind, e.to_string()));
                    }
                }
            }

            info!(
                %run_id,
                requested = report.requested,
                succeeded = report.succeeded,
                failed = report.failed.len(),
                "Plan generation settled"
            );
            report
        }))
    }
}

/// Plan kinds switched on by the run's capabilities.
pub fn plan_kinds(capabilities: &Capabilities) -> Vec<PlanKind> {
    let mut kinds = Vec::new();
    if capabilities.coaching {
        kinds.push(PlanKind::Coach);
    }
    if capabilities.nutrition {
        kinds.push(PlanKind::Nutrition);
    }
    if capabilities.injury {
        kinds.push(PlanKind::Medical);
    }
    kinds
}

fn plan_params(kind: PlanKind, payload: &RetryPayload) -> Value {
    use fields::*;

    let keys: &[&str] = match kind {
        PlanKind::Coach => &[
            AGE,
            WEIGHT_KG,
            HEIGHT_CM,
            SEX,
            PRIMARY_GOAL,
            EXPERIENCE_LEVEL,
            TRAINING_DAYS_PER_WEEK,
            SPORT_TYPE,
            ACTIVITY_LEVEL,
            SQUAT_KG,
            BENCH_KG,
            DEADLIFT_KG,
        ],
        PlanKind::Nutrition => &[
            AGE,
            WEIGHT_KG,
            HEIGHT_CM,
            SEX,
            PRIMARY_GOAL,
            ACTIVITY_LEVEL,
            DIET_TYPE,
            MEALS_PER_DAY,
            CALORIE_TARGET,
            LIKED_FOODS,
            DISLIKED_FOODS,
            ALLERGIES,
        ],
        PlanKind::Medical => &[AGE, SEX, INJURY_AREA, INJURY_SEVERITY, INJURY_NOTES, CHAT_SUMMARY],
    };

    let mut params: Map<String, Value> = payload.bag.subset(keys);
    params.insert("run_id".into(), Value::String(payload.run_id.to_string()));
    Value::Object(params)
}

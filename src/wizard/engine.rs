//! OnboardingWizard: coordinates the bag, navigation, restore, and the
//! completion pipeline, and publishes phase changes to the UI.
//!
//! Operations take `&mut self`: one wizard instance serves one session and
//! callers serialize interaction with it.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WizardConfig;
use crate::error::WizardError;
use crate::gateway::ProfileGateway;

use super::bag::DataBag;
use super::completion::{CompletionPipeline, CompletionResult, GenerationReport, RetryPayload};
use super::navigation::{Navigator, Progress};
use super::resolver::resolve_steps;
use super::restore::{self, RestoredState};
use super::state::WizardPhase;
use super::step::{Capabilities, StepCatalog, StepDefinition, StepId};

/// Default broadcast channel capacity for phase changes.
const PHASE_CHANNEL_CAPACITY: usize = 64;

/// The onboarding wizard as seen by the UI collaborator.
pub struct OnboardingWizard {
    catalog: StepCatalog,
    config: WizardConfig,
    gateway: Arc<dyn ProfileGateway>,
    pipeline: CompletionPipeline,
    navigator: Navigator,
    bag: DataBag,
    phase: WizardPhase,
    run_id: Uuid,
    retry_payload: Option<RetryPayload>,
    last_result: Option<CompletionResult>,
    generation: Option<JoinHandle<GenerationReport>>,
    tx: broadcast::Sender<WizardPhase>,
}

impl OnboardingWizard {
    /// Start a fresh run at the first applicable step, without reading the
    /// profile.
    pub fn new(
        catalog: StepCatalog,
        gateway: Arc<dyn ProfileGateway>,
        config: WizardConfig,
    ) -> Result<Self, WizardError> {
        config.validate(&catalog)?;
        let restored = RestoredState::fresh(&catalog, &config)?;
        Ok(Self::from_restored(catalog, gateway, config, restored))
    }

    /// Read the stored profile and resume at the furthest step that does not
    /// re-ask anything already known.
    pub async fn restore(
        catalog: StepCatalog,
        gateway: Arc<dyn ProfileGateway>,
        config: WizardConfig,
    ) -> Result<Self, WizardError> {
        config.validate(&catalog)?;
        let restored = restore::restore(gateway.as_ref(), &catalog, &config).await?;
        Ok(Self::from_restored(catalog, gateway, config, restored))
    }

    fn from_restored(
        catalog: StepCatalog,
        gateway: Arc<dyn ProfileGateway>,
        config: WizardConfig,
        restored: RestoredState,
    ) -> Self {
        let phase = if restored.completed {
            WizardPhase::Done
        } else {
            WizardPhase::Step(restored.resume_at)
        };
        let navigator = Navigator::resume(catalog.clone(), restored.resume_at, restored.history);
        let pipeline = CompletionPipeline::new(
            Arc::clone(&gateway),
            config.nutrition_goals.clone(),
            config.generate_plans,
        );
        let (tx, _rx) = broadcast::channel(PHASE_CHANNEL_CAPACITY);
        let run_id = Uuid::new_v4();

        info!(%run_id, phase = %phase, "Onboarding wizard ready");

        Self {
            catalog,
            config,
            gateway,
            pipeline,
            navigator,
            bag: restored.bag,
            phase,
            run_id,
            retry_payload: None,
            last_result: None,
            generation: None,
            tx,
        }
    }

    /// Subscribe to phase changes.
    pub fn subscribe(&self) -> broadcast::Receiver<WizardPhase> {
        self.tx.subscribe()
    }

    pub fn phase(&self) -> &WizardPhase {
        &self.phase
    }

    /// The step pointer. Stays on the last step while completing.
    pub fn current_step(&self) -> StepId {
        self.navigator.current()
    }

    /// Live position within the resolved graph. Once no step is active the
    /// position is the full length of the graph.
    pub fn progress(&self) -> Progress {
        let capabilities = self.capabilities();
        if let WizardPhase::Step(_) = self.phase {
            return self.navigator.progress(&self.bag, &capabilities);
        }
        let total = resolve_steps(&self.catalog, &self.bag, &capabilities)
            .map(|steps| steps.len())
            .unwrap_or_else(|_| self.navigator.history().len());
        Progress {
            position: total,
            total,
        }
    }

    pub fn bag(&self) -> &DataBag {
        &self.bag
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::derive(&self.bag, &self.config.nutrition_goals)
    }

    pub fn history(&self) -> &[StepId] {
        self.navigator.history()
    }

    /// History, pointer, and the forward graph under the current answers.
    pub fn planned_steps(&self) -> Result<Vec<StepId>, WizardError> {
        Ok(self.navigator.planned_steps(&self.bag, &self.capabilities())?)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn retry_payload(&self) -> Option<&RetryPayload> {
        self.retry_payload.as_ref()
    }

    pub fn last_result(&self) -> Option<&CompletionResult> {
        self.last_result.as_ref()
    }

    /// Take the handle of the detached plan generation task, if one ran.
    pub fn take_generation(&mut self) -> Option<JoinHandle<GenerationReport>> {
        self.generation.take()
    }

    /// Submit the output of the current step.
    ///
    /// Merges the step's own keys into the bag, optionally persists them,
    /// and moves to the next resolved step. When no step remains the
    /// completion pipeline runs before this returns; its outcome is the
    /// returned phase (`Done` or `Error`).
    pub async fn advance(
        &mut self,
        step: StepId,
        output: Value,
    ) -> Result<WizardPhase, WizardError> {
        if !self.phase.accepts_input() {
            return Err(WizardError::NotAcceptingInput {
                phase: self.phase.to_string(),
            });
        }
        let definition = self.navigator.check_submission(step)?.clone();
        let Value::Object(output) = output else {
            return Err(WizardError::InvalidOutput { step });
        };

        let bag = self.bag.merged(&definition, &output);
        if self.config.persist_on_advance {
            self.persist_step(&definition, &bag).await;
        }
        self.bag = bag;

        let capabilities = self.capabilities();
        match self.navigator.advance(&self.bag, &capabilities)? {
            Some(next) => {
                info!(from = %step, to = %next, "Advanced onboarding step");
                self.transition(WizardPhase::Step(next))?;
            }
            None => {
                info!(last = %step, "Step graph exhausted, completing onboarding");
                self.transition(WizardPhase::Completing)?;
                let payload = RetryPayload::capture(self.run_id, self.bag.clone());
                self.run_pipeline(payload).await?;
            }
        }
        Ok(self.phase.clone())
    }

    /// Go back one step in traversal order. Answers are kept.
    pub fn retreat(&mut self) -> StepId {
        if !self.phase.accepts_input() {
            debug!(phase = %self.phase, "Ignoring retreat outside a step");
            return self.navigator.current();
        }
        match self.navigator.retreat() {
            Some(previous) => {
                if let Err(e) = self.transition(WizardPhase::Step(previous)) {
                    warn!(error = %e, "Unexpected phase after retreat");
                }
                previous
            }
            None => {
                debug!("Retreat with empty history");
                self.navigator.current()
            }
        }
    }

    /// Re-run the completion pipeline from the payload kept at failure.
    pub async fn retry(&mut self) -> Result<WizardPhase, WizardError> {
        let payload = match (&self.phase, &self.retry_payload) {
            (WizardPhase::Error { .. }, Some(payload)) => payload.clone(),
            _ => return Err(WizardError::NoRetryPayload),
        };
        info!(run_id = %payload.run_id, "Retrying onboarding completion");
        self.transition(WizardPhase::Completing)?;
        self.run_pipeline(payload).await?;
        Ok(self.phase.clone())
    }

    /// Leave the error state and start again from the first step. The bag
    /// is kept so every answer is pre-filled.
    pub fn return_to_start(&mut self) -> Result<StepId, WizardError> {
        if !matches!(self.phase, WizardPhase::Error { .. }) {
            return Err(WizardError::InvalidTransition {
                from: self.phase.to_string(),
                to: "first step".to_string(),
            });
        }
        let capabilities = self.capabilities();
        let first = self.navigator.reset(&self.bag, &capabilities)?;
        self.retry_payload = None;
        self.transition(WizardPhase::Step(first))?;
        Ok(first)
    }

    async fn run_pipeline(&mut self, payload: RetryPayload) -> Result<(), WizardError> {
        let run = self.pipeline.run(payload).await;
        self.generation = run.generation;

        let result = run.result;
        if result.succeeded {
            self.retry_payload = None;
            self.transition(WizardPhase::Done)?;
        } else {
            self.retry_payload = result.retry_payload.clone();
            let kind = result.error.ok_or_else(|| WizardError::InvalidTransition {
                from: self.phase.to_string(),
                to: "error without a kind".to_string(),
            })?;
            self.transition(WizardPhase::Error {
                kind,
                message: result.message.clone().unwrap_or_default(),
            })?;
        }
        self.last_result = Some(result);
        Ok(())
    }

    /// Write the step's fields to the profile. Failures are logged only;
    /// finalize re-sends the whole bag.
    async fn persist_step(&self, definition: &StepDefinition, bag: &DataBag) {
        let partial = bag.subset(definition.keys);
        if partial.is_empty() {
            return;
        }
        if let Err(e) = self.gateway.update_profile(partial).await {
            warn!(step = %definition.id, error = %e, "Failed to persist step answers");
        }
    }

    fn transition(&mut self, next: WizardPhase) -> Result<(), WizardError> {
        if !self.phase.can_transition_to(&next) {
            return Err(WizardError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %self.phase, to = %next, "Wizard phase change");
        self.phase = next.clone();
        // Ok if nobody is listening
        let _ = self.tx.send(next);
        Ok(())
    }
}

impl std::fmt::Debug for OnboardingWizard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnboardingWizard")
            .field("run_id", &self.run_id)
            .field("phase", &self.phase)
            .field("current", &self.navigator.current())
            .field("history", &self.navigator.history())
            .field("fields", &self.bag.len())
            .field("catalog_steps", &self.catalog.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::InMemoryGateway;
    use crate::gateway::memory::Operation;
    use serde_json::json;

    fn wizard(gateway: &Arc<InMemoryGateway>) -> OnboardingWizard {
        let gateway: Arc<dyn ProfileGateway> = gateway.clone();
        OnboardingWizard::new(StepCatalog::standard(), gateway, WizardConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn rejects_out_of_order_advance() {
        let gateway = Arc::new(InMemoryGateway::new());
        let mut w = wizard(&gateway);

        let err = w.advance(StepId::Chat, json!({})).await.unwrap_err();
        assert_eq!(
            err,
            WizardError::OutOfOrder {
                expected: StepId::Biometrics,
                got: StepId::Chat,
            }
        );
        assert!(w.bag().is_empty());
        assert_eq!(gateway.calls().await.len(), 0);
    }

    #[tokio::test]
    async fn rejects_non_object_output() {
        let gateway = Arc::new(InMemoryGateway::new());
        let mut w = wizard(&gateway);
        let err = w.advance(StepId::Biometrics, json!([1, 2])).await.unwrap_err();
        assert_eq!(err, WizardError::InvalidOutput { step: StepId::Biometrics });
        assert_eq!(w.current_step(), StepId::Biometrics);
    }

    #[tokio::test]
    async fn advance_persists_owned_fields() {
        let gateway = Arc::new(InMemoryGateway::new());
        let mut w = wizard(&gateway);
        w.advance(StepId::Biometrics, json!({"age": 30, "weight_kg": 70}))
            .await
            .unwrap();

        let profile = gateway.profile().await.unwrap();
        assert_eq!(profile.fields.get("age"), Some(&json!(30)));
        assert_eq!(w.current_step(), StepId::TrainingGoals);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_block_navigation() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway
            .fail_next(Operation::UpdateProfile, GatewayError::Validation("age".into()))
            .await;
        let mut w = wizard(&gateway);

        let phase = w.advance(StepId::Biometrics, json!({"age": 30})).await.unwrap();
        assert_eq!(phase, WizardPhase::Step(StepId::TrainingGoals));
        assert_eq!(w.bag().get_f64("age"), Some(30.0));
    }

    #[tokio::test]
    async fn retreat_on_first_step_is_noop() {
        let gateway = Arc::new(InMemoryGateway::new());
        let mut w = wizard(&gateway);
        assert_eq!(w.retreat(), StepId::Biometrics);
        assert_eq!(w.phase(), &WizardPhase::Step(StepId::Biometrics));
    }

    #[tokio::test]
    async fn retry_without_failure_is_rejected() {
        let gateway = Arc::new(InMemoryGateway::new());
        let mut w = wizard(&gateway);
        assert_eq!(w.retry().await.unwrap_err(), WizardError::NoRetryPayload);
        assert!(w.return_to_start().is_err());
    }

    #[tokio::test]
    async fn phase_changes_are_broadcast() {
        let gateway = Arc::new(InMemoryGateway::new());
        let mut w = wizard(&gateway);
        let mut rx = w.subscribe();

        w.advance(StepId::Biometrics, json!({"age": 30})).await.unwrap();
        w.retreat();

        assert_eq!(rx.recv().await.unwrap(), WizardPhase::Step(StepId::TrainingGoals));
        assert_eq!(rx.recv().await.unwrap(), WizardPhase::Step(StepId::Biometrics));
    }

    #[tokio::test]
    async fn completed_profile_restores_to_done() {
        let mut profile = crate::gateway::ProfileRecord::default();
        profile.onboarding_completed = true;
        let gateway: Arc<dyn ProfileGateway> = Arc::new(InMemoryGateway::with_profile(profile));

        let mut w =
            OnboardingWizard::restore(StepCatalog::standard(), gateway, WizardConfig::default())
                .await
                .unwrap();
        assert_eq!(w.phase(), &WizardPhase::Done);
        assert_eq!(w.progress(), Progress { position: 5, total: 5 });
        let err = w.advance(StepId::Biometrics, json!({})).await.unwrap_err();
        assert!(matches!(err, WizardError::NotAcceptingInput { .. }));
    }
}

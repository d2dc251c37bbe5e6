//! Restore protocol: rebuild wizard position from a stored profile.
//!
//! Walks the configured chain of groups in order. A group whose required
//! fields are all present is taken as answered and merged into the bag; the
//! first incomplete group is where the user resumes. The walk never jumps
//! over an incomplete group, even when later groups look complete.

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::WizardConfig;
use crate::error::ConfigError;
use crate::gateway::{ProfileGateway, ProfileRecord};

use super::bag::DataBag;
use super::resolver::resolve_steps;
use super::step::{Capabilities, StepCatalog, StepId};

/// Everything needed to rebuild a wizard at the right position.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredState {
    pub bag: DataBag,
    pub capabilities: Capabilities,
    pub resume_at: StepId,
    /// Resolved steps before `resume_at`, so back-navigation works at once.
    pub history: Vec<StepId>,
    /// The profile says onboarding already finished.
    pub completed: bool,
}

impl RestoredState {
    /// Starting point for a run with nothing to restore.
    pub fn fresh(catalog: &StepCatalog, config: &WizardConfig) -> Result<Self, ConfigError> {
        let bag = DataBag::new();
        let capabilities = Capabilities::derive(&bag, &config.nutrition_goals);
        let first = resolve_steps(catalog, &bag, &capabilities)?
            .first()
            .copied()
            .ok_or(ConfigError::NoApplicableSteps)?;
        Ok(Self {
            bag,
            capabilities,
            resume_at: first,
            history: Vec::new(),
            completed: false,
        })
    }
}

/// Read the profile once and reconstruct. Fetch failures start fresh.
pub async fn restore(
    gateway: &dyn ProfileGateway,
    catalog: &StepCatalog,
    config: &WizardConfig,
) -> Result<RestoredState, ConfigError> {
    match gateway.get_profile().await {
        Ok(profile) => reconstruct(&profile, catalog, config),
        Err(e) => {
            warn!(error = %e, "Profile fetch failed, starting onboarding fresh");
            RestoredState::fresh(catalog, config)
        }
    }
}

/// Pure reconstruction from an already-fetched profile.
pub fn reconstruct(
    profile: &ProfileRecord,
    catalog: &StepCatalog,
    config: &WizardConfig,
) -> Result<RestoredState, ConfigError> {
    let mut bag = DataBag::new();
    let mut resume_at = config.restore_terminus;

    for group in &config.restore_chain {
        let step = catalog
            .get(group.step)
            .ok_or(ConfigError::UnknownRestoreStep { step: group.step })?;

        let capabilities = Capabilities::derive(&bag, &config.nutrition_goals);
        if !step.is_applicable(&bag, &capabilities) {
            continue;
        }

        if let Some(missing) = group.required.iter().find(|f| !profile.has_value(f)) {
            info!(step = %group.step, missing = %missing, "Restore stopped at incomplete group");
            resume_at = group.step;
            break;
        }

        let answers: Map<String, Value> = step
            .keys
            .iter()
            .filter_map(|k| profile.fields.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect();
        bag = bag.merged(step, &answers);
    }

    let capabilities = Capabilities::derive(&bag, &config.nutrition_goals);
    let resolved = resolve_steps(catalog, &bag, &capabilities)?;

    // A gated terminus may not apply to this run; resume at the next step
    // that does.
    if !resolved.contains(&resume_at) {
        let terminus_order = catalog
            .get(resume_at)
            .map(|s| s.order)
            .ok_or(ConfigError::UnknownRestoreStep { step: resume_at })?;
        let next = resolved
            .iter()
            .copied()
            .find(|id| catalog.get(*id).is_some_and(|s| s.order > terminus_order))
            .ok_or(ConfigError::NoApplicableSteps)?;
        info!(terminus = %resume_at, resume_at = %next, "Restore terminus not applicable");
        resume_at = next;
    }

    let history: Vec<StepId> = resolved
        .into_iter()
        .take_while(|id| *id != resume_at)
        .collect();

    info!(
        resume_at = %resume_at,
        restored_fields = bag.len(),
        completed = profile.onboarding_completed,
        "Restored onboarding position"
    );

    Ok(RestoredState {
        bag,
        capabilities,
        resume_at,
        history,
        completed: profile.onboarding_completed,
    })
}

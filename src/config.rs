//! Configuration types.

use crate::error::ConfigError;
use crate::wizard::bag::fields;
use crate::wizard::step::{DEFAULT_NUTRITION_GOALS, StepCatalog, StepId};

/// One link of the restore chain: a step and the profile fields that must
/// all be present before that step counts as already answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreGroup {
    pub step: StepId,
    pub required: Vec<String>,
}

impl RestoreGroup {
    pub fn new(step: StepId, required: &[&str]) -> Self {
        Self {
            step,
            required: required.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Wizard configuration.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Write each step's fields to the profile as soon as it is completed.
    pub persist_on_advance: bool,
    /// Launch downstream plan generation after a successful commit.
    pub generate_plans: bool,
    /// Primary goals that switch on the nutrition capability.
    pub nutrition_goals: Vec<String>,
    /// Groups checked, in order, when reconstructing position from a profile.
    pub restore_chain: Vec<RestoreGroup>,
    /// Where to resume when every group in the chain is complete.
    pub restore_terminus: StepId,
}

impl Default for WizardConfig {
    fn default() -> Self {
        use fields::*;

        Self {
            persist_on_advance: true,
            generate_plans: true,
            nutrition_goals: DEFAULT_NUTRITION_GOALS.iter().map(|s| s.to_string()).collect(),
            restore_chain: vec![
                RestoreGroup::new(StepId::Biometrics, &[AGE, WEIGHT_KG, HEIGHT_CM, SEX]),
                RestoreGroup::new(
                    StepId::TrainingGoals,
                    &[PRIMARY_GOAL, EXPERIENCE_LEVEL, TRAINING_DAYS_PER_WEEK],
                ),
                RestoreGroup::new(StepId::Lifestyle, &[ACTIVITY_LEVEL, SLEEP_HOURS, HAS_INJURY]),
                RestoreGroup::new(StepId::NutritionGoals, &[DIET_TYPE, MEALS_PER_DAY]),
                RestoreGroup::new(StepId::FoodPrefs, &[LIKED_FOODS, DISLIKED_FOODS]),
            ],
            restore_terminus: StepId::Chat,
        }
    }
}

impl WizardConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let persist_on_advance: bool = std::env::var("ONBOARDING_PERSIST_ON_ADVANCE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.persist_on_advance);

        let generate_plans: bool = std::env::var("ONBOARDING_GENERATE_PLANS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.generate_plans);

        let nutrition_goals: Vec<String> = std::env::var("ONBOARDING_NUTRITION_GOALS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.nutrition_goals);

        Self {
            persist_on_advance,
            generate_plans,
            nutrition_goals,
            ..defaults
        }
    }

    /// Check the restore chain against `catalog`.
    pub fn validate(&self, catalog: &StepCatalog) -> Result<(), ConfigError> {
        if !catalog.contains(self.restore_terminus) {
            return Err(ConfigError::UnknownRestoreStep {
                step: self.restore_terminus,
            });
        }
        for group in &self.restore_chain {
            let step = catalog
                .get(group.step)
                .ok_or(ConfigError::UnknownRestoreStep { step: group.step })?;
            if group.required.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("restore_chain.{}", group.step),
                    message: "group has no required fields".to_string(),
                });
            }
            if let Some(foreign) = group.required.iter().find(|f| !step.owns(f)) {
                return Err(ConfigError::InvalidValue {
                    key: format!("restore_chain.{}", group.step),
                    message: format!("field {foreign} is not owned by the step"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_standard_catalog() {
        let config = WizardConfig::default();
        assert!(config.validate(&StepCatalog::standard()).is_ok());
        assert_eq!(config.restore_terminus, StepId::Chat);
        assert_eq!(config.restore_chain.len(), 5);
    }

    #[test]
    fn default_chain_covers_every_step_before_the_terminus() {
        let config = WizardConfig::default();
        let catalog = StepCatalog::standard();
        let terminus = catalog.get(config.restore_terminus).unwrap().order;
        for step in catalog.iter().filter(|s| s.order < terminus) {
            assert!(
                config.restore_chain.iter().any(|g| g.step == step.id),
                "{} has no restore group",
                step.id
            );
        }
    }

    #[test]
    fn rejects_field_owned_by_another_step() {
        let config = WizardConfig {
            restore_chain: vec![RestoreGroup::new(StepId::Biometrics, &["primary_goal"])],
            ..Default::default()
        };
        let err = config.validate(&StepCatalog::standard()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_empty_group() {
        let config = WizardConfig {
            restore_chain: vec![RestoreGroup::new(StepId::Lifestyle, &[])],
            ..Default::default()
        };
        assert!(config.validate(&StepCatalog::standard()).is_err());
    }
}

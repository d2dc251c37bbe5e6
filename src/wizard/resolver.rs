//! Step graph resolver: which steps apply to this run, in which order.
//!
//! Pure functions over (catalog, bag, capabilities). Re-run after every
//! completed step, since a new answer can switch a later step on or off.

use crate::error::ConfigError;

use super::bag::DataBag;
use super::step::{Capabilities, StepCatalog, StepDefinition, StepId};

/// Resolve the ordered list of applicable steps.
///
/// An empty result means the catalog itself is broken, so it is reported as
/// a configuration error. `StepCatalog::new` already requires an always
/// applicable terminal gateway, so a validated catalog never takes that path.
pub fn resolve_steps(
    catalog: &StepCatalog,
    bag: &DataBag,
    capabilities: &Capabilities,
) -> Result<Vec<StepId>, ConfigError> {
    applicable_steps(catalog.iter(), bag, capabilities)
}

/// Filter `steps` (already in ascending order) down to the applicable ones.
fn applicable_steps<'a>(
    steps: impl IntoIterator<Item = &'a StepDefinition>,
    bag: &DataBag,
    capabilities: &Capabilities,
) -> Result<Vec<StepId>, ConfigError> {
    let steps: Vec<StepId> = steps
        .into_iter()
        .filter(|s| s.is_applicable(bag, capabilities))
        .map(|s| s.id)
        .collect();

    if steps.is_empty() {
        return Err(ConfigError::NoApplicableSteps);
    }
    Ok(steps)
}

/// Applicable steps strictly after `current` in catalog order.
///
/// Only the forward part of the graph is recomputed; steps already behind
/// the pointer are never re-evaluated.
pub fn steps_after(
    catalog: &StepCatalog,
    bag: &DataBag,
    capabilities: &Capabilities,
    current: StepId,
) -> Result<Vec<StepId>, ConfigError> {
    let floor = catalog.get(current).map(|s| s.order).unwrap_or(0);
    let resolved = resolve_steps(catalog, bag, capabilities)?;
    Ok(resolved
        .into_iter()
        .filter(|id| catalog.get(*id).is_some_and(|s| s.order > floor))
        .collect())
}

/// The step that follows `current`, or `None` when the graph is exhausted.
pub fn next_step(
    catalog: &StepCatalog,
    bag: &DataBag,
    capabilities: &Capabilities,
    current: StepId,
) -> Result<Option<StepId>, ConfigError> {
    Ok(steps_after(catalog, bag, capabilities, current)?
        .into_iter()
        .next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::step::{Capability, Gate};
    use serde_json::{Value, json};

    fn merge(bag: DataBag, catalog: &StepCatalog, step: StepId, value: Value) -> DataBag {
        bag.merged(catalog.get(step).unwrap(), value.as_object().unwrap())
    }

    fn caps(bag: &DataBag) -> Capabilities {
        Capabilities::derive(bag, &["fat_loss".to_string()])
    }

    #[test]
    fn empty_bag_resolves_base_steps() {
        let catalog = StepCatalog::standard();
        let bag = DataBag::new();
        let steps = resolve_steps(&catalog, &bag, &caps(&bag)).unwrap();
        assert_eq!(
            steps,
            vec![
                StepId::Biometrics,
                StepId::TrainingGoals,
                StepId::Lifestyle,
                StepId::Chat,
                StepId::Review,
            ]
        );
    }

    #[test]
    fn fat_loss_goal_inserts_nutrition_steps_before_chat() {
        let catalog = StepCatalog::standard();
        let bag = merge(
            DataBag::new(),
            &catalog,
            StepId::Biometrics,
            json!({"age": 30, "weight_kg": 70}),
        );
        let before = resolve_steps(&catalog, &bag, &caps(&bag)).unwrap();
        assert!(!before.contains(&StepId::NutritionGoals));

        let bag = merge(
            bag,
            &catalog,
            StepId::TrainingGoals,
            json!({"primary_goal": "fat_loss"}),
        );
        let after = resolve_steps(&catalog, &bag, &caps(&bag)).unwrap();
        let chat = after.iter().position(|s| *s == StepId::Chat).unwrap();
        let nutrition = after.iter().position(|s| *s == StepId::NutritionGoals).unwrap();
        let prefs = after.iter().position(|s| *s == StepId::FoodPrefs).unwrap();
        assert!(nutrition < prefs && prefs < chat);
    }

    #[test]
    fn injury_without_sport_excludes_strength() {
        let catalog = StepCatalog::standard();
        let capabilities = Capabilities {
            injury: true,
            sport_type: None,
            ..Default::default()
        };
        let steps = resolve_steps(&catalog, &DataBag::new(), &capabilities).unwrap();
        assert!(steps.contains(&StepId::Injury));
        assert!(!steps.contains(&StepId::Strength));
    }

    #[test]
    fn resolution_is_deterministic() {
        let catalog = StepCatalog::standard();
        let bag = merge(
            DataBag::new(),
            &catalog,
            StepId::TrainingGoals,
            json!({"primary_goal": "fat_loss", "sport_type": "rowing"}),
        );
        let c = caps(&bag);
        let first = resolve_steps(&catalog, &bag, &c).unwrap();
        let second = resolve_steps(&catalog, &bag, &c).unwrap();
        assert_eq!(first, second);
        assert!(first.contains(&StepId::Strength));
    }

    #[test]
    fn next_step_only_looks_forward() {
        let catalog = StepCatalog::standard();
        let bag = DataBag::new();
        let c = Capabilities {
            nutrition: true,
            ..Default::default()
        };
        // Nutrition steps sit before chat, so from chat they are never offered.
        assert_eq!(
            next_step(&catalog, &bag, &c, StepId::Chat).unwrap(),
            Some(StepId::Review)
        );
        assert_eq!(
            next_step(&catalog, &bag, &c, StepId::Lifestyle).unwrap(),
            Some(StepId::NutritionGoals)
        );
        assert_eq!(next_step(&catalog, &bag, &c, StepId::Review).unwrap(), None);
    }

    #[test]
    fn gateway_survives_when_every_other_gate_is_closed() {
        fn never(_: &DataBag, _: &Capabilities) -> bool {
            false
        }
        let catalog = StepCatalog::new(vec![
            StepDefinition::new(StepId::Biometrics, 10, Gate::Custom(never), &[]),
            StepDefinition::new(StepId::Lifestyle, 20, Gate::Custom(never), &[]),
            StepDefinition::new(StepId::Review, 30, Gate::Always, &[]).terminal(),
        ])
        .unwrap();
        let steps = resolve_steps(&catalog, &DataBag::new(), &Capabilities::default()).unwrap();
        assert_eq!(steps, vec![StepId::Review]);
    }

    #[test]
    fn all_gates_closed_is_a_configuration_error() {
        // Bypasses catalog validation, which would reject a gated-only list.
        let steps = vec![
            StepDefinition::new(
                StepId::NutritionGoals,
                10,
                Gate::Capability(Capability::Nutrition),
                &[],
            ),
            StepDefinition::new(StepId::Injury, 20, Gate::Capability(Capability::Injury), &[]),
        ];
        let err = applicable_steps(&steps, &DataBag::new(), &Capabilities::default()).unwrap_err();
        assert_eq!(err, ConfigError::NoApplicableSteps);

        let capabilities = Capabilities {
            injury: true,
            ..Default::default()
        };
        let resolved = applicable_steps(&steps, &DataBag::new(), &capabilities).unwrap();
        assert_eq!(resolved, vec![StepId::Injury]);
    }

    #[test]
    fn catalog_rejects_a_list_that_could_resolve_empty() {
        let err = StepCatalog::new(vec![
            StepDefinition::new(StepId::Injury, 10, Gate::Capability(Capability::Injury), &[])
                .terminal(),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::GatewayNotAlwaysApplicable { .. }));
    }
}

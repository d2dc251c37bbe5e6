//! Step catalog: every step the wizard can ever show, and when it applies.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

use super::bag::{DataBag, fields};

/// Identifier of a wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Biometrics,
    TrainingGoals,
    Lifestyle,
    NutritionGoals,
    FoodPrefs,
    Chat,
    Injury,
    Strength,
    Review,
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Biometrics => "biometrics",
            Self::TrainingGoals => "training_goals",
            Self::Lifestyle => "lifestyle",
            Self::NutritionGoals => "nutrition_goals",
            Self::FoodPrefs => "food_prefs",
            Self::Chat => "chat",
            Self::Injury => "injury",
            Self::Strength => "strength",
            Self::Review => "review",
        };
        write!(f, "{s}")
    }
}

/// A derived flag that can gate optional steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Nutrition,
    Injury,
    Strength,
    Coaching,
}

/// Goals that imply the user wants nutrition guidance.
pub const DEFAULT_NUTRITION_GOALS: &[&str] = &["fat_loss", "muscle_gain", "weight_gain"];

/// Capability flags for one run, derived from answers and the chat analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub nutrition: bool,
    pub injury: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport_type: Option<String>,
    pub coaching: bool,
}

impl Capabilities {
    /// Derive capabilities from the bag. Missing fields leave a flag off.
    pub fn derive(bag: &DataBag, nutrition_goals: &[String]) -> Self {
        let goal = bag.get_str(fields::PRIMARY_GOAL);

        let nutrition = bag.get_bool(fields::WANTS_NUTRITION).unwrap_or(false)
            || goal.is_some_and(|g| nutrition_goals.iter().any(|n| n == g));

        let injury = bag.get_bool(fields::HAS_INJURY).unwrap_or(false)
            || bag.get_bool(fields::INJURY_DETECTED).unwrap_or(false);

        let sport_type = bag
            .get_str(fields::SPORT_TYPE)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        Self {
            nutrition,
            injury,
            sport_type,
            coaching: goal.is_some(),
        }
    }

    /// Whether a capability is switched on.
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Nutrition => self.nutrition,
            Capability::Injury => self.injury,
            Capability::Strength => self.sport_type.is_some(),
            Capability::Coaching => self.coaching,
        }
    }
}

/// Declarative inclusion predicate for a step.
#[derive(Clone)]
pub enum Gate {
    Always,
    Capability(Capability),
    /// Applies when the bag holds exactly `value` under `key`.
    FieldEquals { key: &'static str, value: Value },
    Custom(fn(&DataBag, &Capabilities) -> bool),
}

impl Gate {
    pub fn evaluate(&self, bag: &DataBag, capabilities: &Capabilities) -> bool {
        match self {
            Self::Always => true,
            Self::Capability(c) => capabilities.has(*c),
            Self::FieldEquals { key, value } => bag.get(key) == Some(value),
            Self::Custom(f) => f(bag, capabilities),
        }
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Capability(c) => write!(f, "Capability({c:?})"),
            Self::FieldEquals { key, value } => write!(f, "FieldEquals({key} == {value})"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// One entry in the catalog.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub id: StepId,
    pub gate: Gate,
    pub order: u32,
    pub is_terminal_gateway: bool,
    /// Bag keys this step is allowed to write.
    pub keys: &'static [&'static str],
}

impl StepDefinition {
    pub fn new(id: StepId, order: u32, gate: Gate, keys: &'static [&'static str]) -> Self {
        Self {
            id,
            gate,
            order,
            is_terminal_gateway: false,
            keys,
        }
    }

    /// Mark this step as the terminal gateway.
    pub fn terminal(mut self) -> Self {
        self.is_terminal_gateway = true;
        self
    }

    pub fn owns(&self, key: &str) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_applicable(&self, bag: &DataBag, capabilities: &Capabilities) -> bool {
        self.gate.evaluate(bag, capabilities)
    }
}

/// Immutable, validated set of step definitions sorted by `order`.
///
/// Cheap to clone; injected into the wizard rather than held as global state.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    steps: Arc<Vec<StepDefinition>>,
}

impl StepCatalog {
    /// Validate and build a catalog.
    pub fn new(mut steps: Vec<StepDefinition>) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        steps.sort_by_key(|s| s.order);

        let mut seen_ids: HashSet<StepId> = HashSet::new();
        let mut key_owner: HashMap<&str, StepId> = HashMap::new();
        let mut gateway: Option<&StepDefinition> = None;

        for (i, step) in steps.iter().enumerate() {
            if !seen_ids.insert(step.id) {
                return Err(ConfigError::DuplicateStep { step: step.id });
            }
            if i > 0 && steps[i - 1].order == step.order {
                return Err(ConfigError::DuplicateOrder {
                    order: step.order,
                    first: steps[i - 1].id,
                    second: step.id,
                });
            }
            for key in step.keys {
                if let Some(first) = key_owner.insert(*key, step.id) {
                    return Err(ConfigError::DuplicateKey {
                        key: key.to_string(),
                        first,
                        second: step.id,
                    });
                }
            }
            if step.is_terminal_gateway {
                if let Some(first) = gateway {
                    return Err(ConfigError::MultipleTerminalGateways {
                        first: first.id,
                        second: step.id,
                    });
                }
                gateway = Some(step);
            }
        }

        let gateway = gateway.ok_or(ConfigError::MissingTerminalGateway)?;
        if !matches!(gateway.gate, Gate::Always) {
            return Err(ConfigError::GatewayNotAlwaysApplicable { step: gateway.id });
        }
        if steps.last().map(|s| s.id) != Some(gateway.id) {
            return Err(ConfigError::GatewayNotLast { step: gateway.id });
        }

        Ok(Self {
            steps: Arc::new(steps),
        })
    }

    /// The standard profile-collection catalog.
    pub fn standard() -> Self {
        use fields::*;

        let steps = vec![
            StepDefinition::new(
                StepId::Biometrics,
                10,
                Gate::Always,
                &[AGE, WEIGHT_KG, HEIGHT_CM, SEX],
            ),
            StepDefinition::new(
                StepId::TrainingGoals,
                20,
                Gate::Always,
                &[
                    PRIMARY_GOAL,
                    EXPERIENCE_LEVEL,
                    TRAINING_DAYS_PER_WEEK,
                    SPORT_TYPE,
                    WANTS_NUTRITION,
                ],
            ),
            StepDefinition::new(
                StepId::Lifestyle,
                30,
                Gate::Always,
                &[ACTIVITY_LEVEL, SLEEP_HOURS, STRESS_LEVEL, HAS_INJURY],
            ),
            StepDefinition::new(
                StepId::NutritionGoals,
                40,
                Gate::Capability(Capability::Nutrition),
                &[DIET_TYPE, MEALS_PER_DAY, CALORIE_TARGET],
            ),
            StepDefinition::new(
                StepId::FoodPrefs,
                50,
                Gate::Capability(Capability::Nutrition),
                &[LIKED_FOODS, DISLIKED_FOODS, ALLERGIES],
            ),
            StepDefinition::new(
                StepId::Chat,
                60,
                Gate::Always,
                &[CHAT_SUMMARY, INJURY_DETECTED],
            ),
            StepDefinition::new(
                StepId::Injury,
                70,
                Gate::Capability(Capability::Injury),
                &[INJURY_AREA, INJURY_SEVERITY, INJURY_NOTES],
            ),
            StepDefinition::new(
                StepId::Strength,
                80,
                Gate::Capability(Capability::Strength),
                &[SQUAT_KG, BENCH_KG, DEADLIFT_KG],
            ),
            StepDefinition::new(StepId::Review, 90, Gate::Always, &[CONFIRMED]).terminal(),
        ];

        match Self::new(steps) {
            Ok(catalog) => catalog,
            Err(e) => unreachable!("standard catalog is malformed: {e}"),
        }
    }

    pub fn get(&self, id: StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.get(id).is_some()
    }

    /// All definitions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

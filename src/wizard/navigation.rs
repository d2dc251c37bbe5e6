//! Navigation controller: the current step pointer and the back-stack.

use serde::Serialize;
use tracing::debug;

use crate::error::{ConfigError, WizardError};

use super::bag::DataBag;
use super::resolver::{resolve_steps, steps_after};
use super::step::{Capabilities, StepCatalog, StepDefinition, StepId};

/// 1-based position within the currently resolved graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub position: usize,
    pub total: usize,
}

/// Pointer plus traversal history.
///
/// History records the order steps were actually completed in, which is not
/// necessarily catalog order once the graph has grown mid-run.
#[derive(Debug, Clone)]
pub struct Navigator {
    catalog: StepCatalog,
    current: StepId,
    history: Vec<StepId>,
}

impl Navigator {
    /// Start at the first step resolved for `bag`.
    pub fn start(
        catalog: StepCatalog,
        bag: &DataBag,
        capabilities: &Capabilities,
    ) -> Result<Self, ConfigError> {
        let first = first_step(&catalog, bag, capabilities)?;
        Ok(Self {
            catalog,
            current: first,
            history: Vec::new(),
        })
    }

    /// Resume at `current` with a pre-built history.
    pub fn resume(catalog: StepCatalog, current: StepId, history: Vec<StepId>) -> Self {
        Self {
            catalog,
            current,
            history,
        }
    }

    pub fn current(&self) -> StepId {
        self.current
    }

    pub fn history(&self) -> &[StepId] {
        &self.history
    }

    /// Accept a submission only for the current pointer.
    pub fn check_submission(&self, step: StepId) -> Result<&StepDefinition, WizardError> {
        if step != self.current {
            return Err(WizardError::OutOfOrder {
                expected: self.current,
                got: step,
            });
        }
        self.catalog
            .get(step)
            .ok_or(WizardError::Configuration(ConfigError::UnknownStep { step }))
    }

    /// Push the current step and move to the next applicable one.
    ///
    /// Returns `None` once the graph is exhausted; the pointer then stays on
    /// the last step.
    pub fn advance(
        &mut self,
        bag: &DataBag,
        capabilities: &Capabilities,
    ) -> Result<Option<StepId>, ConfigError> {
        let next = steps_after(&self.catalog, bag, capabilities, self.current)?
            .into_iter()
            .next();
        self.history.push(self.current);
        if let Some(next) = next {
            self.current = next;
        }
        Ok(next)
    }

    /// Step back to the most recently completed step. No-op on empty history.
    pub fn retreat(&mut self) -> Option<StepId> {
        let previous = self.history.pop()?;
        debug!(from = %self.current, to = %previous, "Retreating");
        self.current = previous;
        Some(previous)
    }

    /// Drop history and point at the first resolved step.
    pub fn reset(
        &mut self,
        bag: &DataBag,
        capabilities: &Capabilities,
    ) -> Result<StepId, ConfigError> {
        self.current = first_step(&self.catalog, bag, capabilities)?;
        self.history.clear();
        Ok(self.current)
    }

    /// Position of the pointer and size of the graph as it resolves now.
    pub fn progress(&self, bag: &DataBag, capabilities: &Capabilities) -> Progress {
        let ahead = steps_after(&self.catalog, bag, capabilities, self.current)
            .map(|s| s.len())
            .unwrap_or(0);
        let position = self.history.len() + 1;
        Progress {
            position,
            total: position + ahead,
        }
    }

    /// History, pointer, and the forward graph as one sequence.
    pub fn planned_steps(
        &self,
        bag: &DataBag,
        capabilities: &Capabilities,
    ) -> Result<Vec<StepId>, ConfigError> {
        let mut steps = self.history.clone();
        steps.push(self.current);
        steps.extend(steps_after(&self.catalog, bag, capabilities, self.current)?);
        Ok(steps)
    }
}

fn first_step(
    catalog: &StepCatalog,
    bag: &DataBag,
    capabilities: &Capabilities,
) -> Result<StepId, ConfigError> {
    resolve_steps(catalog, bag, capabilities)?
        .first()
        .copied()
        .ok_or(ConfigError::NoApplicableSteps)
}

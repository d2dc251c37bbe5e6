//! Wizard phase: the observable state the UI renders from.

use serde::{Deserialize, Serialize};

use super::completion::CompletionErrorKind;
use super::step::StepId;

/// Where the wizard is.
///
/// `Step` repeats until the resolved graph is exhausted, then `Completing`
/// ends in `Done` or `Error`. `Error` leaves via `retry` (back to
/// `Completing`) or an explicit return to the first step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "detail", rename_all = "snake_case")]
pub enum WizardPhase {
    Step(StepId),
    Completing,
    Error {
        kind: CompletionErrorKind,
        message: String,
    },
    Done,
}

impl WizardPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &WizardPhase) -> bool {
        use WizardPhase::*;
        matches!(
            (self, target),
            (Step(_), Step(_))
                | (Step(_), Completing)
                | (Completing, Done)
                | (Completing, Error { .. })
                | (Error { .. }, Completing)
                | (Error { .. }, Step(_))
        )
    }

    /// Whether the wizard has finished for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Whether `advance` / `retreat` are meaningful right now.
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::Step(_))
    }

    /// Short label, used in logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Step(_) => "step",
            Self::Completing => "completing",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for WizardPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Step(id) => write!(f, "step:{id}"),
            Self::Error { kind, message } => write!(f, "error:{kind}: {message}"),
            other => write!(f, "{}", other.label()),
        }
    }
}

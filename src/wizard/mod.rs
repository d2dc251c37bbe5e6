//! Onboarding wizard: a dynamic, resumable multi-step profile collection
//! flow.
//!
//! The sequence of steps is not fixed. It is resolved from the answers
//! collected so far, so the graph can grow as the user answers. The wizard
//! resumes mid-flow from a stored profile, walks back through actual
//! traversal history, and ends in a multi-phase commit that can be retried
//! without asking the user anything again.

pub mod bag;
pub mod completion;
pub mod engine;
pub mod navigation;
pub mod resolver;
pub mod restore;
pub mod state;
pub mod step;

pub use bag::DataBag;
pub use completion::{
    CompletionErrorKind, CompletionPipeline, CompletionResult, GenerationReport, RetryPayload,
};
pub use engine::OnboardingWizard;
pub use navigation::{Navigator, Progress};
pub use resolver::resolve_steps;
pub use restore::RestoredState;
pub use state::WizardPhase;
pub use step::{Capabilities, Capability, Gate, StepCatalog, StepDefinition, StepId};

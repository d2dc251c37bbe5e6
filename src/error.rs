//! Error types for the onboarding engine.

use crate::wizard::step::StepId;

/// Catalog and configuration defects. Never user-recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Step catalog is empty")]
    EmptyCatalog,

    #[error("Catalog resolved to zero applicable steps")]
    NoApplicableSteps,

    #[error("Steps {first} and {second} share order {order}")]
    DuplicateOrder {
        order: u32,
        first: StepId,
        second: StepId,
    },

    #[error("Step {step} is listed twice in the catalog")]
    DuplicateStep { step: StepId },

    #[error("Key {key} is owned by both {first} and {second}")]
    DuplicateKey {
        key: String,
        first: StepId,
        second: StepId,
    },

    #[error("Catalog has no terminal gateway step")]
    MissingTerminalGateway,

    #[error("Catalog has more than one terminal gateway step: {first}, {second}")]
    MultipleTerminalGateways { first: StepId, second: StepId },

    #[error("Terminal gateway {step} must be always applicable")]
    GatewayNotAlwaysApplicable { step: StepId },

    #[error("Terminal gateway {step} must have the highest order")]
    GatewayNotLast { step: StepId },

    #[error("Step {step} is not in the catalog")]
    UnknownStep { step: StepId },

    #[error("Restore references step {step} which is not in the catalog")]
    UnknownRestoreStep { step: StepId },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors surfaced by the persistence gateway collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Profile not found")]
    NotFound,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors returned to the UI collaborator by wizard operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Out-of-order submission: expected {expected}, got {got}")]
    OutOfOrder { expected: StepId, got: StepId },

    #[error("Wizard is not accepting step input in phase {phase}")]
    NotAcceptingInput { phase: String },

    #[error("Output for step {step} must be a JSON object")]
    InvalidOutput { step: StepId },

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("No retry payload is available")]
    NoRetryPayload,
}

//! Onboarding engine: dynamic, resumable profile onboarding.

pub mod config;
pub mod error;
pub mod gateway;
pub mod wizard;

pub use config::{RestoreGroup, WizardConfig};
pub use error::{ConfigError, GatewayError, WizardError};
pub use gateway::{InMemoryGateway, ProfileGateway, ProfileRecord};
pub use wizard::{OnboardingWizard, StepCatalog, StepId, WizardPhase};

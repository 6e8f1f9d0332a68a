//! mailstrap library
//!
//! Provisioning sequencer for a mail server host: precondition checks,
//! packages, database, firewall, installer checkout, settings file,
//! delegated installer run and post-installation checks.

pub mod cli;
pub mod command;
pub mod config;
pub mod config_file;
pub mod error;
pub mod preflight;
pub mod process_guard;
pub mod prompt;
pub mod runner;
pub mod sequencer;
pub mod settings_file;
pub mod stage;
pub mod steps;
pub mod summary;
pub mod verify;

// Re-export main types for convenience
pub use command::{CommandOutput, CommandSpec, StepCommand};
pub use config::{
    AdminIdentity, CertificateMode, CertificateSettings, DatabaseEngine, DatabaseSettings,
    HostLayout, ProvisioningConfig, Secret,
};
pub use error::{ProvisionError, Result};
pub use preflight::{HostProbe, PortStatus, PreflightOptions, PreflightReport, SystemHost};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use prompt::{collect_config, confirm_execution, DialoguerPrompter, Prompter};
pub use runner::{CommandRunner, SystemRunner};
pub use sequencer::{ProvisionOutcome, Provisioner, SequencerOptions};
pub use settings_file::SecretHandling;
pub use stage::{ProvisionContext, ProvisionStage, StageTransitionError};
pub use verify::{PostCheckAdvisory, ServiceState, VerificationReport, VerifyOptions};

//! Provisioning stage state machine
//!
//! [`ProvisionContext`] owns the current stage and only lets it move forward
//! one step at a time. Any non-terminal stage may fail; nothing may be
//! skipped or revisited.
//!
//! # Stage Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! Preflight
//!     ↓
//! InstallingPackages      (first mutating stage, needs confirmation)
//!     ↓
//! BootstrappingDatastore
//!     ↓
//! ConfiguringFirewall
//!     ↓
//! FetchingInstaller
//!     ↓
//! WritingSettings
//!     ↓
//! CheckingSettings
//!     ↓
//! RunningInstaller
//!     ↓
//! Verifying
//!     ↓
//! Completed
//!
//! (Any stage can transition to Failed)
//! ```

use std::fmt;
use thiserror::Error;

/// Provisioning stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProvisionStage {
    NotStarted = 0,
    Preflight = 1,
    InstallingPackages = 2,
    BootstrappingDatastore = 3,
    ConfiguringFirewall = 4,
    FetchingInstaller = 5,
    WritingSettings = 6,
    CheckingSettings = 7,
    RunningInstaller = 8,
    Verifying = 9,
    Completed = 10,
    Failed = 255,
}

impl ProvisionStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Completed or Failed
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The stage where the host starts being modified. Entering it requires
    /// the operator's confirmation.
    #[inline]
    pub const fn is_first_mutation(self) -> bool {
        matches!(self, Self::InstallingPackages)
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::Preflight),
            Self::Preflight => Some(Self::InstallingPackages),
            Self::InstallingPackages => Some(Self::BootstrappingDatastore),
            Self::BootstrappingDatastore => Some(Self::ConfiguringFirewall),
            Self::ConfiguringFirewall => Some(Self::FetchingInstaller),
            Self::FetchingInstaller => Some(Self::WritingSettings),
            Self::WritingSettings => Some(Self::CheckingSettings),
            Self::CheckingSettings => Some(Self::RunningInstaller),
            Self::RunningInstaller => Some(Self::Verifying),
            Self::Verifying => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Preflight => "Checking preconditions",
            Self::InstallingPackages => "Installing packages",
            Self::BootstrappingDatastore => "Bootstrapping database",
            Self::ConfiguringFirewall => "Configuring firewall",
            Self::FetchingInstaller => "Fetching installer",
            Self::WritingSettings => "Writing installer settings",
            Self::CheckingSettings => "Checking installer settings",
            Self::RunningInstaller => "Running installer",
            Self::Verifying => "Verifying services",
            Self::Completed => "Provisioning complete",
            Self::Failed => "Provisioning failed",
        }
    }

    /// All stages in order (excluding Failed)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::NotStarted,
            Self::Preflight,
            Self::InstallingPackages,
            Self::BootstrappingDatastore,
            Self::ConfiguringFirewall,
            Self::FetchingInstaller,
            Self::WritingSettings,
            Self::CheckingSettings,
            Self::RunningInstaller,
            Self::Verifying,
            Self::Completed,
        ]
    }
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageTransitionError {
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage {
        from: ProvisionStage,
        to: ProvisionStage,
    },

    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition {
        from: ProvisionStage,
        to: ProvisionStage,
    },

    #[error("Cannot leave terminal state {from}")]
    FromTerminalState { from: ProvisionStage },

    #[error("{stage} requires operator confirmation")]
    MissingConfirmation { stage: ProvisionStage },
}

/// Tracks progress of one provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    current: ProvisionStage,
    failed_at: Option<ProvisionStage>,
    /// (stage, unix timestamp) for every transition
    history: Vec<(ProvisionStage, i64)>,
    confirmed: bool,
}

impl Default for ProvisionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisionContext {
    pub fn new() -> Self {
        Self {
            current: ProvisionStage::NotStarted,
            failed_at: None,
            history: Vec::with_capacity(ProvisionStage::all_stages().len()),
            confirmed: false,
        }
    }

    #[inline]
    pub fn current_stage(&self) -> ProvisionStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<ProvisionStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == ProvisionStage::Completed
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.current == ProvisionStage::Failed
    }

    pub fn history(&self) -> &[(ProvisionStage, i64)] {
        &self.history
    }

    /// Stages entered so far, in order
    pub fn visited(&self) -> Vec<ProvisionStage> {
        self.history.iter().map(|(s, _)| *s).collect()
    }

    /// Record that the operator approved modifying the host. One-way.
    pub fn confirm(&mut self) {
        self.confirmed = true;
    }

    /// Advance to the next stage in sequence
    pub fn advance(&mut self) -> Result<ProvisionStage, StageTransitionError> {
        let Some(next) = self.current.next() else {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        };
        self.enter(next)
    }

    /// Transition to `target`, which must be exactly the next stage
    pub fn transition_to(&mut self, target: ProvisionStage) -> Result<ProvisionStage, StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }
        if target != ProvisionStage::Failed && target.order() <= self.current.order() {
            return Err(StageTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(StageTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        self.enter(target)
    }

    fn enter(&mut self, stage: ProvisionStage) -> Result<ProvisionStage, StageTransitionError> {
        if stage.is_first_mutation() && !self.confirmed {
            return Err(StageTransitionError::MissingConfirmation { stage });
        }
        self.record(stage);
        self.current = stage;
        Ok(stage)
    }

    /// Mark the run as failed at the current stage
    pub fn fail(&mut self) -> Result<(), StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }
        self.failed_at = Some(self.current);
        self.record(ProvisionStage::Failed);
        self.current = ProvisionStage::Failed;
        Ok(())
    }

    fn record(&mut self, stage: ProvisionStage) {
        self.history.push((stage, chrono::Utc::now().timestamp()));
    }
}

impl From<StageTransitionError> for crate::error::ProvisionError {
    fn from(err: StageTransitionError) -> Self {
        crate::error::ProvisionError::StageTransition(err.to_string())
    }
}

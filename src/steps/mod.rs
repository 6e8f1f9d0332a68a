//! Typed commands for each provisioning step.
//!
//! Each struct here implements [`crate::command::StepCommand`] and maps its
//! fields to the exact flags, environment and stdin of one external program.

pub mod checkout;
pub mod datastore;
pub mod firewall;
pub mod installer;
pub mod packages;
pub mod services;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// mailstrap - provision a mail server host
#[derive(Parser)]
#[command(name = "mailstrap")]
#[command(about = "Prepare a host and hand it to the mail server installer")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// Package, database, firewall, clone and installer commands are logged
    /// instead of run, and no files are moved or written. Read-only checks
    /// still run so the preview is realistic.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Optional post-installation checks
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct CheckFlags {
    /// Talk SMTP to localhost:25 and expect a greeting and EHLO reply
    #[arg(long)]
    pub smoke_test: bool,

    /// Print the validity window of the issued certificate
    #[arg(long)]
    pub check_cert: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision this host (the default when no command is given)
    Install {
        /// Read the configuration from this JSON file instead of prompting
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Save the collected configuration to this file (mode 0600) before running
        #[arg(long)]
        save_config: Option<PathBuf>,

        /// Do not ask for confirmation before modifying the host
        #[arg(short, long)]
        yes: bool,

        #[command(flatten)]
        checks: CheckFlags,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// Run the precondition checks only
    Preflight,
    /// Run the post-installation checks against an already provisioned host
    Verify {
        /// Configuration the host was provisioned with
        #[arg(short, long)]
        config: PathBuf,

        #[command(flatten)]
        checks: CheckFlags,
    },
    /// Print the installer settings file for a configuration, secrets redacted
    Render {
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

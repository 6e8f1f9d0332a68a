//! Package installation through `apt-get`.

use crate::command::StepCommand;
use crate::config::DatabaseSettings;

/// Packages every run needs, independent of the database engine
pub const BASE_PACKAGES: &[&str] = &[
    "git",
    "python3",
    "python3-venv",
    "python3-pip",
    "ufw",
    "curl",
    "openssl",
    "ca-certificates",
];

/// Full package list for a run. A remote database only needs its client.
pub fn required_packages(database: &DatabaseSettings) -> Vec<String> {
    BASE_PACKAGES
        .iter()
        .chain(database.packages())
        .map(|p| (*p).to_string())
        .collect()
}

fn noninteractive_env() -> Vec<(String, String)> {
    vec![("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())]
}

/// `apt-get update`
#[derive(Debug, Clone, Default)]
pub struct AptUpdate;

impl StepCommand for AptUpdate {
    fn program(&self) -> &'static str {
        "apt-get"
    }

    fn to_args(&self) -> Vec<String> {
        vec!["update".to_string()]
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        noninteractive_env()
    }
}

/// `apt-get install -y <packages>`
#[derive(Debug, Clone)]
pub struct AptInstall {
    pub packages: Vec<String>,
}

impl StepCommand for AptInstall {
    fn program(&self) -> &'static str {
        "apt-get"
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "install".to_string(),
            "-y".to_string(),
            "--no-install-recommends".to_string(),
        ];
        args.extend(self.packages.iter().cloned());
        args
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        noninteractive_env()
    }
}

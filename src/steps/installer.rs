//! Invocations of the delegated installer's entry point.

use std::path::PathBuf;

use crate::command::StepCommand;

/// Entry point script at the root of the checkout
pub const ENTRY_POINT: &str = "run.py";

/// Flag that makes the installer stop once the settings file is checked
pub const CHECK_ONLY_FLAG: &str = "--stop-after-configfile-check";

/// `python3 run.py [--stop-after-configfile-check] --configfile <file> <domain>`
#[derive(Debug, Clone)]
pub struct InstallerRun {
    pub checkout_dir: PathBuf,
    pub settings_file: PathBuf,
    pub domain: String,
    /// Validate the settings file and exit without installing anything
    pub check_only: bool,
}

impl StepCommand for InstallerRun {
    fn program(&self) -> &'static str {
        "python3"
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = vec![ENTRY_POINT.to_string()];
        if self.check_only {
            args.push(CHECK_ONLY_FLAG.to_string());
        }
        args.push("--configfile".to_string());
        args.push(self.settings_file.display().to_string());
        args.push(self.domain.clone());
        args
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        vec![("PYTHONUNBUFFERED".to_string(), "1".to_string())]
    }

    fn working_dir(&self) -> Option<PathBuf> {
        Some(self.checkout_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(check_only: bool) -> InstallerRun {
        InstallerRun {
            checkout_dir: PathBuf::from("/opt/modoboa-installer"),
            settings_file: PathBuf::from("/opt/modoboa-installer/installer.cfg"),
            domain: "example.com".to_string(),
            check_only,
        }
    }

    #[test]
    fn test_check_only_args() {
        assert_eq!(
            run(true).to_spec().command_line(),
            "python3 run.py --stop-after-configfile-check --configfile \
             /opt/modoboa-installer/installer.cfg example.com"
        );
    }

    #[test]
    fn test_full_run_args() {
        let spec = run(false).to_spec();
        assert_eq!(
            spec.command_line(),
            "python3 run.py --configfile /opt/modoboa-installer/installer.cfg example.com"
        );
        assert_eq!(spec.current_dir, Some(PathBuf::from("/opt/modoboa-installer")));
    }
}

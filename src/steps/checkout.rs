//! Acquisition of the delegated installer.
//!
//! A previous checkout is never reused, overwritten or deleted: it is moved
//! aside to `<path>.bak-<timestamp>` and a fresh shallow clone takes its place.

use chrono::{DateTime, Local};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::command::StepCommand;

/// Timestamp format shared by backups and log files
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// `git clone --depth 1 <repo> <dest>`
#[derive(Debug, Clone)]
pub struct GitClone {
    pub repository: String,
    pub destination: PathBuf,
}

impl StepCommand for GitClone {
    fn program(&self) -> &'static str {
        "git"
    }

    fn to_args(&self) -> Vec<String> {
        vec![
            "clone".to_string(),
            "--depth".to_string(),
            "1".to_string(),
            self.repository.clone(),
            self.destination.display().to_string(),
        ]
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        // Never block on a credential prompt
        vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]
    }
}

/// First free backup path for `path` at time `now`.
///
/// `<path>.bak-<timestamp>`, then `<path>.bak-<timestamp>.1`, `.2`, ...
pub fn backup_path_for(path: &Path, now: DateTime<Local>) -> PathBuf {
    let mut base = OsString::from(path.as_os_str());
    base.push(format!(".bak-{}", now.format(TIMESTAMP_FORMAT)));
    let candidate = PathBuf::from(&base);
    if !candidate.exists() {
        return candidate;
    }

    let mut n = 1u32;
    loop {
        let mut numbered = base.clone();
        numbered.push(format!(".{}", n));
        let candidate = PathBuf::from(numbered);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Move an existing checkout out of the way.
///
/// Returns the backup location, or `None` when nothing was there.
pub fn backup_existing_checkout(path: &Path, now: DateTime<Local>) -> std::io::Result<Option<PathBuf>> {
    if std::fs::symlink_metadata(path).is_err() {
        return Ok(None);
    }

    let backup = backup_path_for(path, now);
    std::fs::rename(path, &backup)?;
    info!(from = %path.display(), to = %backup.display(), "previous installer checkout moved aside");
    Ok(Some(backup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_git_clone_args() {
        let clone = GitClone {
            repository: "https://example.com/installer.git".to_string(),
            destination: PathBuf::from("/opt/installer"),
        };
        assert_eq!(
            clone.to_spec().command_line(),
            "git clone --depth 1 https://example.com/installer.git /opt/installer"
        );
    }

    #[test]
    fn test_no_checkout_means_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("installer");
        assert_eq!(backup_existing_checkout(&target, fixed_time()).unwrap(), None);
    }

    #[test]
    fn test_existing_checkout_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("installer");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("run.py"), "print('v1')").unwrap();

        let backup = backup_existing_checkout(&target, fixed_time())
            .unwrap()
            .expect("backup should be created");

        assert!(!target.exists());
        assert_eq!(backup, dir.path().join("installer.bak-20240309-140507"));
        assert_eq!(std::fs::read_to_string(backup.join("run.py")).unwrap(), "print('v1')");
    }

    #[test]
    fn test_backup_never_overwrites_previous_backup() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("installer");

        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("marker"), "first").unwrap();
        let first = backup_existing_checkout(&target, fixed_time()).unwrap().unwrap();

        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("marker"), "second").unwrap();
        let second = backup_existing_checkout(&target, fixed_time()).unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(second, dir.path().join("installer.bak-20240309-140507.1"));
        assert_eq!(std::fs::read_to_string(first.join("marker")).unwrap(), "first");
        assert_eq!(std::fs::read_to_string(second.join("marker")).unwrap(), "second");
    }
}

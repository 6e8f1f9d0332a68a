//! Configuration file handling for saving and loading provisioning configs.
//!
//! Headless runs read a JSON file instead of prompting. Because the file
//! carries passwords it is always written owner-only.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use crate::config::ProvisioningConfig;

/// Permission bits for every file that embeds credentials
pub const SECRET_FILE_MODE: u32 = 0o600;

/// Write `contents` to `path` so that only the owner can read or write it.
///
/// New files are created with mode 0600 directly; a pre-existing file is
/// truncated and has its mode reset immediately after the write.
pub fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(SECRET_FILE_MODE)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    fs::set_permissions(path, fs::Permissions::from_mode(SECRET_FILE_MODE))?;
    Ok(())
}

impl ProvisioningConfig {
    /// Save configuration to a JSON file (mode 0600)
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        write_owner_only(path.as_ref(), json.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Load and validate in one step
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::load_from_file(&path)?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {:?}", path.as_ref()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::config::{DatabaseEngine, HostLayout};

    #[test]
    fn test_save_and_load_preserves_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.json");
        let config = sample_config();

        config.save_to_file(&path).unwrap();
        let loaded = ProvisioningConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_saved_file_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.json");
        sample_config().save_to_file(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_write_owner_only_tightens_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.cfg");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write_owner_only(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_load_minimal_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minimal.json");
        fs::write(
            &path,
            r#"{
                "domain": "example.org",
                "mail_hostname": "mail.example.org",
                "admin": {"email": "root@example.org", "username": "admin", "password": "s3cretpass"},
                "database": {"name": "mail", "user": "mail", "password": "dbs3cretpass"},
                "certificate": {"contact_email": "root@example.org"}
            }"#,
        )
        .unwrap();

        let config = ProvisioningConfig::load_validated(&path).unwrap();
        assert_eq!(config.database.engine, DatabaseEngine::Mysql);
        assert_eq!(config.database.host, "127.0.0.1");
        assert_eq!(config.layout, HostLayout::default());
    }

    #[test]
    fn test_load_validated_rejects_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let mut config = sample_config();
        config.database.user = "bad-user".to_string();
        config.save_to_file(&path).unwrap();

        let err = ProvisioningConfig::load_validated(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Database user"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = ProvisioningConfig::load_from_file("/nonexistent/mail.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read configuration"));
    }
}

//! App configuration records and the apps file they are loaded from.

use crate::error::AppConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One launchable application.
///
/// Supplied by the caller and only read during a launch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub username: String,
    pub exec_path: String,
    #[serde(default)]
    pub exec_cwd: String,
    pub args: String,
    pub env_name: String,
    pub env_config_path: String,
    pub env_parent_dir: String,
}

impl AppConfig {
    /// `env_parent_dir/env_name`, substituted for `{root}` in templates.
    pub fn env_root(&self) -> PathBuf {
        Path::new(&self.env_parent_dir).join(&self.env_name)
    }

    /// Working directory for the child; falls back to the executable's folder.
    pub fn working_dir(&self) -> PathBuf {
        if !self.exec_cwd.is_empty() {
            return PathBuf::from(&self.exec_cwd);
        }
        Path::new(&self.exec_path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct AppsFile {
    apps: Vec<AppConfig>,
}

/// Read `{ "apps": [...] }` from disk.
///
/// Older files lack `exec_cwd`; those entries get the executable's parent
/// directory so the child never starts in an arbitrary location.
pub fn load_app_configs(path: &Path) -> Result<Vec<AppConfig>, AppConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| AppConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: AppsFile = serde_json::from_str(&raw).map_err(|err| AppConfigError::Invalid {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    Ok(parsed
        .apps
        .into_iter()
        .map(|mut cfg| {
            if cfg.exec_cwd.is_empty() {
                cfg.exec_cwd = cfg.working_dir().to_string_lossy().into_owned();
            }
            cfg
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn env_root_joins_parent_and_name() {
        let cfg = AppConfig {
            env_parent_dir: "/env".into(),
            env_name: "alice".into(),
            ..AppConfig::default()
        };
        assert_eq!(cfg.env_root(), PathBuf::from("/env/alice"));
    }

    #[test]
    fn missing_cwd_defaults_to_executable_folder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("apps.json");
        std::fs::write(
            &path,
            r#"{ "apps": [ {
                "name": "editor", "username": "bob",
                "exec_path": "/opt/editor/bin/editor", "args": "--safe",
                "env_name": "bob", "env_config_path": "env.json",
                "env_parent_dir": "/envs"
            } ] }"#,
        )
        .unwrap();

        let apps = load_app_configs(&path).unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].exec_cwd, "/opt/editor/bin");
        assert_eq!(apps[0].args, "--safe");
    }

    #[test]
    fn missing_required_field_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("apps.json");
        std::fs::write(&path, r#"{ "apps": [ { "name": "x" } ] }"#).unwrap();

        let err = load_app_configs(&path).unwrap_err();
        assert!(matches!(err, AppConfigError::Invalid { .. }));
    }

    #[test]
    fn unreadable_file_is_io_error() {
        let err = load_app_configs(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, AppConfigError::Io { .. }));
    }
}

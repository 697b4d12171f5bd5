//! Reusable environment templates.

use crate::error::TemplateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Directory and variable templates shared between apps.
///
/// Every string may reference `{root}` and `{username}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentTemplate {
    /// Logical name -> directory template; exported as environment entries.
    #[serde(rename = "directories")]
    pub env_directories: BTreeMap<String, String>,
    /// Directories created but not exported.
    #[serde(default)]
    pub seed_directories: Vec<String>,
    #[serde(default)]
    pub override_variables: BTreeMap<String, String>,
    /// Names copied from the parent environment when present.
    #[serde(default)]
    pub pass_through_variables: Vec<String>,
}

/// Where launches obtain their environment template from.
pub trait TemplateSource: Send + Sync {
    fn load(&self, path: &Path) -> Result<EnvironmentTemplate, TemplateError>;
}

/// Reads templates as JSON documents from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTemplateLoader;

impl TemplateSource for JsonTemplateLoader {
    fn load(&self, path: &Path) -> Result<EnvironmentTemplate, TemplateError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TemplateError::Unavailable {
            path: path.to_path_buf(),
            source,
        })?;
        parse_template(path, &raw)
    }
}

/// Parse and shape-check a template document.
pub fn parse_template(path: &Path, raw: &str) -> Result<EnvironmentTemplate, TemplateError> {
    serde_json::from_str(raw).map_err(|err| TemplateError::Invalid {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

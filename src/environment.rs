//! Environment synthesis
//!
//! Turns a reusable [`EnvironmentTemplate`] plus per-app parameters into the
//! exact key/value set handed to a child process.

use crate::app_config::AppConfig;
use crate::error::SynthesisError;
use crate::template::EnvironmentTemplate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Key/value environment of a process.
///
/// Ordered so that synthesis output (and the child's environ block) is
/// deterministic for identical inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    ///
    /// Non UTF-8 entries are converted lossily.
    pub fn capture() -> Self {
        std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Environment::new();
        for (k, v) in iter {
            env.insert(k, v);
        }
        env
    }
}

/// Values substituted into template strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisParameters {
    pub root: String,
    pub username: String,
}

impl SynthesisParameters {
    pub fn new(root: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            username: username.into(),
        }
    }

    /// root = `env_parent_dir/env_name`, username from the app.
    pub fn from_app(app: &AppConfig) -> Self {
        Self::new(
            app.env_root().to_string_lossy().into_owned(),
            app.username.clone(),
        )
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "root" => Some(&self.root),
            "username" => Some(&self.username),
            _ => None,
        }
    }
}

/// Substitute `{root}` and `{username}` in `template`.
///
/// `{{` and `}}` produce literal braces. Any other `{name}` is an error, as
/// is a brace without its partner.
pub fn render(template: &str, params: &SynthesisParameters) -> Result<String, SynthesisError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(idx) = rest.find(['{', '}']) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        let malformed = || SynthesisError::MalformedTemplate {
            template: template.to_string(),
            position: offset + idx,
        };

        let consumed = if tail.starts_with("{{") {
            out.push('{');
            2
        } else if tail.starts_with("}}") {
            out.push('}');
            2
        } else if tail.starts_with('}') {
            return Err(malformed());
        } else {
            let close = tail.find('}').ok_or_else(malformed)?;
            let name = &tail[1..close];
            if name.contains('{') {
                return Err(malformed());
            }
            let value = params
                .lookup(name)
                .ok_or_else(|| SynthesisError::UnresolvedPlaceholder {
                    template: template.to_string(),
                    placeholder: name.to_string(),
                })?;
            out.push_str(value);
            close + 1
        };

        offset += idx + consumed;
        rest = &tail[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Build the child environment for one launch.
///
/// Every template string is rendered before anything touches the disk, so a
/// failing synthesis creates no directories. Directory creation failures are
/// logged and otherwise ignored.
pub fn synthesize(
    parent_env: &Environment,
    template: &EnvironmentTemplate,
    params: &SynthesisParameters,
) -> Result<Environment, SynthesisError> {
    let mut env = Environment::new();
    let mut to_create: Vec<PathBuf> = Vec::new();

    for (key, value) in &template.env_directories {
        let dir = PathBuf::from(render(value, params)?);
        let absolute = std::path::absolute(&dir).unwrap_or_else(|_| dir.clone());
        env.insert(key.clone(), absolute.to_string_lossy().into_owned());
        to_create.push(dir);
    }

    for value in &template.seed_directories {
        to_create.push(PathBuf::from(render(value, params)?));
    }

    for (key, value) in &template.override_variables {
        env.insert(key.clone(), render(value, params)?);
    }

    for key in &template.pass_through_variables {
        let Some(value) = parent_env.get(key) else {
            continue;
        };
        env.insert(key.clone(), render(value, params)?);
    }

    for dir in &to_create {
        create_directory(dir);
    }

    debug!(
        "Synthesized environment for root={} ({} entries)",
        params.root,
        env.len()
    );
    Ok(env)
}

fn create_directory(dir: &Path) {
    if let Err(err) = std::fs::create_dir_all(dir) {
        warn!("Failed to create directory ({}): ({})", dir.display(), err);
    }
}

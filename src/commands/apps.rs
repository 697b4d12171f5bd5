//! `apw list` / `apw env` 处理

use crate::app_config::{load_app_configs, AppConfig};
use crate::environment::{synthesize, Environment, SynthesisParameters};
use crate::template::{JsonTemplateLoader, TemplateSource};
use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::Path;

/// Print one line per configured app.
pub fn list_apps<W: Write>(apps_file: &Path, out: &mut W) -> Result<()> {
    let apps = load_app_configs(apps_file)?;
    if apps.is_empty() {
        writeln!(out, "No apps configured in {}", apps_file.display())?;
        return Ok(());
    }

    let width = apps.iter().map(|a| a.name.len()).max().unwrap_or(0);
    for app in &apps {
        writeln!(
            out,
            "{:<width$}  {}  {}  (env: {})",
            app.name,
            app.exec_path,
            app.args,
            app.env_root().display(),
            width = width
        )?;
    }
    Ok(())
}

/// Print the environment `name` would be launched with, as `KEY=VALUE`.
///
/// Synthesis creates the template's directories, exactly as a launch would.
pub fn print_env<W: Write>(
    apps_file: &Path,
    name: &str,
    parent_env: &Environment,
    out: &mut W,
) -> Result<()> {
    let apps = load_app_configs(apps_file)?;
    let app = find_app(&apps, name)?;

    let template = JsonTemplateLoader
        .load(Path::new(&app.env_config_path))
        .with_context(|| format!("loading template for '{}'", app.name))?;
    let env = synthesize(parent_env, &template, &SynthesisParameters::from_app(app))
        .with_context(|| format!("synthesizing environment for '{}'", app.name))?;

    for (key, value) in env.iter() {
        writeln!(out, "{}={}", key, value)?;
    }
    Ok(())
}

pub(crate) fn find_app<'a>(apps: &'a [AppConfig], name: &str) -> Result<&'a AppConfig> {
    apps.iter()
        .find(|a| a.name == name)
        .ok_or_else(|| anyhow!("No app named '{}' in apps file", name))
}

//! The set of processes launched from one parent environment.

use crate::app_config::AppConfig;
use crate::config::SupervisorSettings;
use crate::environment::Environment;
use crate::error::{LaunchError, TerminateError};
use crate::supervisor::ProcessHandle;
use crate::template::{JsonTemplateLoader, TemplateSource};
use tracing::warn;

/// Owns every live [`ProcessHandle`].
///
/// The parent environment is captured once at construction; later changes to
/// this process's environment do not affect launches.
pub struct ProcessList {
    parent_env: Environment,
    settings: SupervisorSettings,
    templates: Box<dyn TemplateSource>,
    processes: Vec<ProcessHandle>,
}

impl ProcessList {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            parent_env: Environment::capture(),
            settings,
            templates: Box::new(JsonTemplateLoader),
            processes: Vec::new(),
        }
    }

    pub fn with_parent_env(mut self, parent_env: Environment) -> Self {
        self.parent_env = parent_env;
        self
    }

    pub fn with_template_source<T>(mut self, templates: T) -> Self
    where
        T: TemplateSource + 'static,
    {
        self.templates = Box::new(templates);
        self
    }

    pub fn parent_env(&self) -> &Environment {
        &self.parent_env
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Launch `app` and add it to the list.
    ///
    /// The list is unchanged when the launch fails.
    pub fn launch(&mut self, app: &AppConfig) -> Result<&ProcessHandle, LaunchError> {
        let handle = ProcessHandle::launch(
            app,
            &self.parent_env,
            self.templates.as_ref(),
            &self.settings,
        )
        .inspect_err(|err| warn!("Failed to launch '{}': {}", app.name, err))?;
        self.processes.push(handle);
        Ok(&self.processes[self.processes.len() - 1])
    }

    pub fn processes(&self) -> &[ProcessHandle] {
        &self.processes
    }

    /// First process with the given display name.
    pub fn get(&self, name: &str) -> Option<&ProcessHandle> {
        self.processes.iter().find(|p| p.name() == name)
    }

    /// Kill every process; returns the failures.
    pub fn terminate_all(&self) -> Vec<TerminateError> {
        self.processes
            .iter()
            .filter_map(|p| p.terminate().err())
            .collect()
    }

    /// Drop handles whose process has terminated; returns how many.
    pub fn remove_terminated(&mut self) -> usize {
        let before = self.processes.len();
        self.processes.retain(|p| !p.state().is_terminated());
        before - self.processes.len()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

impl Default for ProcessList {
    fn default() -> Self {
        Self::new(SupervisorSettings::default())
    }
}

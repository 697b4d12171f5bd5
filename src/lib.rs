//! App-Warden Library
//!
//! Launches configured applications with a synthesized environment and
//! captures their stdout/stderr into per-process mirrored ring buffers.

pub mod app_config;
pub mod buffer;
pub mod commands;
pub mod config;
pub mod display;
mod drain;
pub mod environment;
pub mod error;
pub mod platform;
pub mod process_list;
pub mod supervisor;
pub mod template;
pub mod utils;

// Re-export commonly used types for convenience
pub use app_config::{load_app_configs, AppConfig};
pub use buffer::{OutputBuffer, OutputWriter};
pub use config::SupervisorSettings;
pub use display::{OutputCursor, ScrollingDisplay};
pub use environment::{synthesize, Environment, SynthesisParameters};
pub use error::{
    AppConfigError, BufferError, LaunchError, SynthesisError, TemplateError, TerminateError,
};
pub use process_list::ProcessList;
pub use supervisor::{ProcessHandle, ProcessState};
pub use template::{EnvironmentTemplate, JsonTemplateLoader, TemplateSource};

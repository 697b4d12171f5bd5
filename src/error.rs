//! Error types for app-warden
//!
//! Construction-time failures are returned as typed errors to the caller.
//! Runtime stream failures never surface here: they only show up as a
//! `Terminated` state on the process handle.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while rendering `{root}` / `{username}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("unresolved placeholder {{{placeholder}}} in template '{template}'")]
    UnresolvedPlaceholder {
        template: String,
        placeholder: String,
    },
    #[error("unbalanced brace at byte {position} in template '{template}'")]
    MalformedTemplate { template: String, position: usize },
}

/// Failure while loading an environment template from disk.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("environment template unavailable ({path}): {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("environment template invalid ({path}): {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Failure while loading the apps file.
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to read apps file ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to validate apps file ({path}): {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Failure while mapping the mirrored output buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer capacity must be non-zero")]
    ZeroCapacity,
    #[error("buffer capacity {capacity} is not a multiple of the allocation granularity {granularity}")]
    UnalignedCapacity { capacity: usize, granularity: usize },
    #[error("buffer mapping failed during {step}: {source}")]
    Map {
        step: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Errors returned by [`crate::supervisor::ProcessHandle::launch`].
///
/// Every variant is fatal to one launch attempt only; no process, buffer or
/// drain thread outlives a failed launch.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to retrieve environment template: {0}")]
    TemplateUnavailable(#[source] TemplateError),
    #[error("Failed to validate environment template: {0}")]
    TemplateInvalid(#[source] TemplateError),
    #[error("Failed to synthesize environment: {0}")]
    SynthesisFailed(#[from] SynthesisError),
    #[error("Failed to allocate output buffer: {0}")]
    BufferAllocation(#[from] BufferError),
    #[error("Failed to create child output channels: {0}")]
    ChannelSetupFailed(#[source] io::Error),
    #[error("Failed to parse argument string: {message}")]
    InvalidCommandLine { message: String },
    #[error("Failed to start application ({path}): {source}")]
    SpawnFailed {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to start output drain thread: {0}")]
    DrainStartFailed(#[source] io::Error),
}

impl From<TemplateError> for LaunchError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::Unavailable { .. } => LaunchError::TemplateUnavailable(err),
            TemplateError::Invalid { .. } => LaunchError::TemplateInvalid(err),
        }
    }
}

impl LaunchError {
    /// Configuration problems (template or placeholder) as opposed to OS
    /// resource or spawn failures.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            LaunchError::TemplateUnavailable(_)
                | LaunchError::TemplateInvalid(_)
                | LaunchError::SynthesisFailed(_)
                | LaunchError::InvalidCommandLine { .. }
        )
    }
}

/// Forced kill failed. The handle stays `Terminating` until the drain loop
/// sees the output streams close.
#[derive(Debug, Error)]
pub enum TerminateError {
    #[error("Failed to terminate '{name}': {source}")]
    Kill {
        name: String,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_errors_map_to_matching_launch_variants() {
        let unavailable = TemplateError::Unavailable {
            path: PathBuf::from("/missing.json"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(matches!(
            LaunchError::from(unavailable),
            LaunchError::TemplateUnavailable(_)
        ));

        let invalid = TemplateError::Invalid {
            path: PathBuf::from("/bad.json"),
            message: "missing field `directories`".into(),
        };
        let err = LaunchError::from(invalid);
        assert!(matches!(err, LaunchError::TemplateInvalid(_)));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn synthesis_error_message_names_placeholder() {
        let err = SynthesisError::UnresolvedPlaceholder {
            template: "{home}/x".into(),
            placeholder: "home".into(),
        };
        assert_eq!(
            err.to_string(),
            "unresolved placeholder {home} in template '{home}/x'"
        );
    }

    #[test]
    fn spawn_failure_is_not_configuration_error() {
        let err = LaunchError::SpawnFailed {
            path: "/nope".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(!err.is_configuration_error());
    }
}

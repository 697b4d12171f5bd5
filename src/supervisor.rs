use crate::app_config::AppConfig;
use crate::buffer::OutputBuffer;
use crate::config::SupervisorSettings;
use crate::drain::DrainTask;
use crate::environment::{synthesize, Environment, SynthesisParameters};
use crate::error::{LaunchError, TerminateError};
use crate::platform;
use crate::template::TemplateSource;
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle of a supervised process.
///
/// `Running -> Terminating` only through [`ProcessHandle::terminate`];
/// `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProcessState {
    Running = 0,
    Terminating = 1,
    Terminated = 2,
}

impl ProcessState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ProcessState::Running,
            1 => ProcessState::Terminating,
            _ => ProcessState::Terminated,
        }
    }

    pub fn is_terminated(self) -> bool {
        self == ProcessState::Terminated
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Running => "running",
            ProcessState::Terminating => "terminating",
            ProcessState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared between a handle and its drain thread.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    fn running() -> Self {
        Self(AtomicU8::new(ProcessState::Running as u8))
    }

    pub(crate) fn load(&self) -> ProcessState {
        ProcessState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Running -> Terminating. A handle already terminating may retry the
    /// kill; a terminated one may not.
    fn begin_terminate(&self) -> Result<(), ProcessState> {
        match self.0.compare_exchange(
            ProcessState::Running as u8,
            ProcessState::Terminating as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(raw) => match ProcessState::from_u8(raw) {
                ProcessState::Terminated => Err(ProcessState::Terminated),
                _ => Ok(()),
            },
        }
    }

    /// Returns true if this call performed the transition.
    pub(crate) fn mark_terminated(&self) -> bool {
        self.0.swap(ProcessState::Terminated as u8, Ordering::AcqRel)
            != ProcessState::Terminated as u8
    }
}

/// One launched application: the OS process, its output buffer and the
/// drain thread feeding it.
///
/// Dropping the handle stops the drain thread (bounded by the configured
/// shutdown timeout, after which it is detached) and releases the pipes. The
/// child itself is left running; once it exits a background reaper collects
/// its status so no zombie is left behind.
pub struct ProcessHandle {
    name: String,
    pid: u32,
    command_line: String,
    state: Arc<StateCell>,
    buffer: Arc<OutputBuffer>,
    /// `None` only after teardown handed the child to a reaper.
    child: Mutex<Option<Child>>,
    stop: Arc<AtomicBool>,
    drain: Option<JoinHandle<()>>,
    drain_done: Receiver<()>,
    shutdown_timeout: Duration,
}

impl ProcessHandle {
    /// Synthesize the environment for `app`, spawn it with piped output and
    /// start draining that output.
    ///
    /// Nothing survives a failed launch: no process, no buffer, no thread.
    pub fn launch(
        app: &AppConfig,
        parent_env: &Environment,
        templates: &dyn TemplateSource,
        settings: &SupervisorSettings,
    ) -> Result<Self, LaunchError> {
        let params = SynthesisParameters::from_app(app);
        let template = templates.load(Path::new(&app.env_config_path))?;
        let env = synthesize(parent_env, &template, &params)?;

        let args = shell_words::split(&app.args).map_err(|err| LaunchError::InvalidCommandLine {
            message: err.to_string(),
        })?;

        let buffer = OutputBuffer::acquire(settings.buffer_capacity)?;
        let writer = buffer.writer().ok_or_else(|| {
            LaunchError::BufferAllocation(crate::error::BufferError::Map {
                step: "take writer",
                source: io::Error::other("output writer already taken"),
            })
        })?;

        let (stdout_read, stdout_write) =
            platform::create_output_pipe().map_err(LaunchError::ChannelSetupFailed)?;
        let (stderr_read, stderr_write) =
            platform::create_output_pipe().map_err(LaunchError::ChannelSetupFailed)?;

        let mut child = {
            let mut command = Command::new(&app.exec_path);
            command.args(&args);
            let cwd = app.working_dir();
            if !cwd.as_os_str().is_empty() {
                command.current_dir(cwd);
            }
            // the child sees only the synthesized environment
            command.env_clear();
            command.envs(env.iter());
            command.stdin(Stdio::null());
            command.stdout(Stdio::from(stdout_write));
            command.stderr(Stdio::from(stderr_write));
            // own process group: terminal signals go to us, not the child
            command.process_group(0);

            command.spawn().map_err(|source| LaunchError::SpawnFailed {
                path: app.exec_path.clone(),
                source,
            })?
            // dropping `command` closes our copies of the write ends
        };
        let pid = child.id();

        let state = Arc::new(StateCell::running());
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = channel::bounded(1);

        let task = DrainTask {
            name: app.name.clone(),
            stdout: File::from(stdout_read),
            stderr: File::from(stderr_read),
            writer,
            state: Arc::clone(&state),
            stop: Arc::clone(&stop),
            poll_interval: settings.poll_interval,
            done: done_tx,
        };
        let drain = match task.spawn() {
            Ok(handle) => handle,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(LaunchError::DrainStartFailed(err));
            }
        };

        let command_line = format!("\"{}\" {}", app.exec_path, app.args)
            .trim_end()
            .to_string();
        debug!(
            "Started '{}' pid={} cmd={} env_entries={}",
            app.name,
            pid,
            command_line,
            env.len()
        );

        Ok(Self {
            name: app.name.clone(),
            pid,
            command_line,
            state,
            buffer,
            child: Mutex::new(Some(child)),
            stop,
            drain: Some(drain),
            drain_done: done_rx,
            shutdown_timeout: settings.shutdown_timeout,
        })
    }

    /// Display label.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Quoted executable followed by the argument string.
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn state(&self) -> ProcessState {
        self.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Read-only access to captured output.
    pub fn output_buffer(&self) -> &OutputBuffer {
        &self.buffer
    }

    /// Shared handle to the output buffer, for readers on other threads.
    pub fn output_handle(&self) -> Arc<OutputBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Exit status if the child has exited; never blocks.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.child.lock().as_mut()?.try_wait().ok().flatten()
    }

    /// Force-kill the process.
    ///
    /// A no-op for an already terminated handle. On failure the handle stays
    /// `Terminating`; the drain loop still resolves it once the output
    /// streams close.
    pub fn terminate(&self) -> Result<(), TerminateError> {
        if self.state.begin_terminate().is_err() {
            return Ok(());
        }

        let mut guard = self.child.lock();
        let Some(child) = guard.as_mut() else {
            return Ok(());
        };
        match child.kill() {
            Ok(()) => {
                let _ = child.wait();
                self.state.mark_terminated();
                info!("Terminated '{}' pid={}", self.name, self.pid);
                Ok(())
            }
            Err(source) => {
                warn!("Failed to terminate '{}' pid={}: {}", self.name, self.pid, source);
                Err(TerminateError::Kill {
                    name: self.name.clone(),
                    source,
                })
            }
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("state", &self.state())
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);

        if let Some(handle) = self.drain.take() {
            match self.drain_done.recv_timeout(self.shutdown_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = handle.join();
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "Drain thread for '{}' did not stop within {:?}; detaching",
                        self.name, self.shutdown_timeout
                    );
                }
            }
        }

        let Some(mut child) = self.child.get_mut().take() else {
            return;
        };
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        // still running (or its exit is not yet visible): wait on a detached
        // thread so the status is collected exactly once
        let reaper = thread::Builder::new()
            .name(format!("apw-reap-{}", self.name))
            .spawn(move || {
                let _ = child.wait();
            });
        if let Err(err) = reaper {
            warn!("Failed to start reaper for '{}' pid={}: {}", self.name, self.pid, err);
        }
    }
}

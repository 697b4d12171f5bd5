//! `apw run` 处理
//!
//! Launches the selected apps, forwards their captured output line by line
//! and returns once every process has terminated or Ctrl-C was received.

use crate::app_config::{load_app_configs, AppConfig};
use crate::commands::apps::find_app;
use crate::config::SupervisorSettings;
use crate::display::{OutputCursor, ScrollingDisplay};
use crate::process_list::ProcessList;
use crate::supervisor::ProcessHandle;
use anyhow::Result;
use std::path::Path;
use std::process::ExitCode;
use tracing::{info, warn};

/// Options of one `apw run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub names: Vec<String>,
    pub tail: bool,
    pub max_lines: usize,
}

/// Per-process consumer state.
struct Follower {
    cursor: OutputCursor,
    display: ScrollingDisplay,
}

impl Follower {
    fn new(max_lines: usize) -> Self {
        Self {
            cursor: OutputCursor::new(),
            display: ScrollingDisplay::new(max_lines),
        }
    }

    fn pump(&mut self, handle: &ProcessHandle, live: bool) {
        let fresh = self.cursor.poll(handle.output_buffer());
        if fresh.is_empty() {
            return;
        }
        for line in self.display.process(&fresh) {
            if live {
                println!("[{}] {}", handle.name(), line);
            }
        }
    }
}

pub async fn run_apps(apps_file: &Path, options: RunOptions) -> Result<ExitCode> {
    let apps = load_app_configs(apps_file)?;
    let selected = select_apps(&apps, &options.names)?;

    let settings = SupervisorSettings::from_env();
    let mut list = ProcessList::new(settings);
    let mut launch_failures = 0usize;
    for app in selected {
        match list.launch(app) {
            Ok(handle) => info!("Launched '{}' (pid {})", handle.name(), handle.pid()),
            Err(err) => {
                eprintln!("❌ {}: {}", app.name, err);
                launch_failures += 1;
            }
        }
    }

    if list.is_empty() {
        eprintln!("No application was started");
        return Ok(ExitCode::from(1));
    }

    let mut followers: Vec<Follower> = list
        .processes()
        .iter()
        .map(|_| Follower::new(options.max_lines))
        .collect();
    let live = !options.tail;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        for (handle, follower) in list.processes().iter().zip(followers.iter_mut()) {
            follower.pump(handle, live);
        }

        if list.processes().iter().all(|p| p.state().is_terminated()) {
            break;
        }

        tokio::select! {
            res = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(err) = res {
                    warn!("Failed to listen for Ctrl-C: {}", err);
                }
                eprintln!("Interrupted, terminating {} app(s)", list.len());
                for err in list.terminate_all() {
                    eprintln!("❌ {}", err);
                }
            }
            _ = tokio::time::sleep(settings.poll_interval) => {}
        }
    }

    // catch bytes committed between the last poll and termination
    for (handle, follower) in list.processes().iter().zip(followers.iter_mut()) {
        follower.pump(handle, live);
        if let Some(rest) = follower.display.flush_remaining() {
            if live {
                println!("[{}] {}", handle.name(), rest);
            }
        }
    }

    print_summary(&list, &followers, options.tail);

    if interrupted {
        return Ok(ExitCode::from(130));
    }
    Ok(if launch_failures > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn select_apps<'a>(apps: &'a [AppConfig], names: &[String]) -> Result<Vec<&'a AppConfig>> {
    if names.is_empty() {
        return Ok(apps.iter().collect());
    }
    names.iter().map(|name| find_app(apps, name)).collect()
}

fn print_summary(list: &ProcessList, followers: &[Follower], tail: bool) {
    for (handle, follower) in list.processes().iter().zip(followers) {
        if tail {
            print!("{}", follower.display.render(&format!("[{}] ", handle.name())));
        }

        let status = handle
            .exit_status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| handle.state().to_string());
        let dropped = follower.cursor.dropped();
        if dropped > 0 {
            eprintln!(
                "• {} (pid {}): {}, {} bytes captured, {} bytes dropped",
                handle.name(),
                handle.pid(),
                status,
                handle.output_buffer().total_written(),
                dropped
            );
        } else {
            eprintln!(
                "• {} (pid {}): {}, {} bytes captured",
                handle.name(),
                handle.pid(),
                status,
                handle.output_buffer().total_written()
            );
        }
    }
}

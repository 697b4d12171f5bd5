//! Output drain loop
//!
//! One background thread per supervised process moves bytes from the
//! child's stdout/stderr pipes into its [`OutputWriter`]. The read ends are
//! non-blocking, so a tick never parks on an idle pipe; the only wait is
//! the fixed poll sleep.

use crate::buffer::OutputWriter;
use crate::supervisor::StateCell;
use crossbeam::channel::Sender;
use std::fs::File;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Everything the drain thread owns. The pipe read ends are closed when the
/// thread returns.
pub(crate) struct DrainTask {
    pub name: String,
    pub stdout: File,
    pub stderr: File,
    pub writer: OutputWriter,
    pub state: Arc<StateCell>,
    pub stop: Arc<AtomicBool>,
    pub poll_interval: Duration,
    pub done: Sender<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelStatus {
    Open,
    Broken,
}

impl DrainTask {
    pub(crate) fn spawn(self) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("apw-drain-{}", self.name))
            .spawn(move || self.run())
    }

    fn run(mut self) {
        debug!("Drain loop started for '{}'", self.name);
        let mut stopped = false;

        while !self.state.load().is_terminated() {
            if self.stop.load(Ordering::Acquire) {
                stopped = true;
                break;
            }

            // stdout first, then stderr: interleaving is per tick, not per write
            let out = drain_channel(&mut self.stdout, &mut self.writer);
            let err = drain_channel(&mut self.stderr, &mut self.writer);

            if out == ChannelStatus::Broken || err == ChannelStatus::Broken {
                if self.state.mark_terminated() {
                    info!("Process '{}' closed its output streams", self.name);
                }
                break;
            }

            thread::sleep(self.poll_interval);
        }

        debug!(
            "Drain loop for '{}' finished{}",
            self.name,
            if stopped { " (stop requested)" } else { "" }
        );
        let _ = self.done.send(());
    }
}

/// Read whatever is pending on one channel, at most one buffer's worth.
fn drain_channel<R: Read>(reader: &mut R, writer: &mut OutputWriter) -> ChannelStatus {
    let budget = writer.buffer().capacity();
    let mut drained = 0;

    while drained < budget {
        let view = writer.write_view();
        let want = (budget - drained).min(view.len());
        match reader.read(&mut view[..want]) {
            Ok(0) => return ChannelStatus::Broken,
            Ok(n) => {
                writer.advance(n);
                drained += n;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ChannelStatus::Open,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Output channel read failed: {}", e);
                return ChannelStatus::Broken;
            }
        }
    }

    ChannelStatus::Open
}

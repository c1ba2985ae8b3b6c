//! Background dispatcher for deferred reports.
//!
//! Drains the [`DeferredReportQueue`] one report at a time. A report only
//! runs while a peer is connected; otherwise it is dropped and the loop
//! backs off for [`DISCONNECTED_BACKOFF`]. After each delivered report the
//! loop sleeps for the configured send interval.
//!
//! The loop ends when the queue is closed.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::DISCONNECTED_BACKOFF;
use crate::task::{Core, TaskSpec, spawn_on_core};

use super::connection::ConnectionStatus;
use super::queue::DeferredReportQueue;

/// Default task parameters of the dispatcher thread.
pub const DISPATCHER_TASK: TaskSpec = TaskSpec {
    name: "hid-send\0",
    core: Core::App,
    priority: 5,
    stack_kb: 4,
};

/// Handle to the running dispatcher thread.
pub struct Dispatcher {
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn the dispatcher loop as `task`. `interval` of `None` means
    /// unthrottled.
    pub fn spawn(
        task: TaskSpec,
        queue: Arc<DeferredReportQueue>,
        connection: Arc<ConnectionStatus>,
        interval: Option<Duration>,
    ) -> io::Result<Self> {
        let handle = spawn_on_core(task, move || {
            run(&queue, &connection, interval);
        })?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the loop to exit. The queue must already be closed.
    pub fn join(mut self) {
        self.join_inner();
    }

    fn join_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Dispatcher: thread panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.join_inner();
    }
}

fn run(queue: &DeferredReportQueue, connection: &ConnectionStatus, interval: Option<Duration>) {
    info!(
        "Dispatcher: running (interval={})",
        interval.map_or_else(|| "none".into(), |d| format!("{}ms", d.as_millis()))
    );
    while let Some(report) = queue.pop_blocking() {
        if connection.is_connected() {
            report();
            if let Some(delay) = interval {
                std::thread::sleep(delay);
            }
        } else {
            debug!("Dispatcher: no peer, report dropped");
            drop(report);
            std::thread::sleep(DISCONNECTED_BACKOFF);
        }
    }
    info!("Dispatcher: queue closed, exiting");
}

/// Run every pending report immediately, without pacing.
///
/// Stops early as soon as the peer is gone; remaining reports stay queued.
/// Returns the number of reports run.
pub fn flush(queue: &DeferredReportQueue, connection: &ConnectionStatus) -> usize {
    let mut sent = 0;
    while connection.is_connected() {
        let Some(report) = queue.try_pop() else {
            break;
        };
        report();
        sent += 1;
    }
    if sent > 0 {
        debug!("Dispatcher: flushed {sent} report(s)");
    }
    sent
}

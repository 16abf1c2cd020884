//! Diagnostic Scheduler
//!
//! Starts every diagnostic as its own long-lived task and owns the shared
//! cancellation token and the task handles. Shutdown cancels the token and
//! joins every task; each loop finishes or abandons its current pass and
//! exits.

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::diagnostics::Diagnostic;

/// Owner of the diagnostic tasks.
pub struct Scheduler {
    cancel: CancellationToken,
    pending: Vec<Arc<dyn Diagnostic>>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            pending: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Queue a diagnostic; it runs once [`Scheduler::start`] is called.
    pub fn add(&mut self, diagnostic: Arc<dyn Diagnostic>) -> &mut Self {
        self.pending.push(diagnostic);
        self
    }

    /// Spawn every queued diagnostic.
    pub fn start(&mut self) {
        for diagnostic in self.pending.drain(..) {
            let name = diagnostic.name();
            let cancel = self.cancel.clone();

            let handle = tokio::spawn(async move {
                diagnostic.run(cancel).await;
            });

            debug!(diagnostic = name, "Diagnostic task spawned");
            self.tasks.push((name, handle));
        }

        info!("Scheduler started {} diagnostics", self.tasks.len());
    }

    /// Tasks spawned and not yet finished.
    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Token shared by every diagnostic.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every diagnostic and wait for all of them to exit.
    ///
    /// A task that panicked is logged; the remaining tasks are still joined.
    pub async fn shutdown(self) {
        info!("Stopping {} diagnostics", self.tasks.len());
        self.cancel.cancel();

        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(()) => debug!(diagnostic = name, "Diagnostic stopped"),
                Err(e) if e.is_panic() => error!(diagnostic = name, "Diagnostic panicked: {}", e),
                Err(e) => warn!(diagnostic = name, "Diagnostic task aborted: {}", e),
            }
        }

        info!("All diagnostics stopped");
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending.len())
            .field("tasks", &self.tasks.iter().map(|(n, _)| *n).collect::<Vec<_>>())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

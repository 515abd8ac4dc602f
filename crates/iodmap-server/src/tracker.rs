//! Per-operation resource tracking
//!
//! A handler registers a release action at the moment it acquires a handle
//! or buffer. When the operation ends, everything still registered is
//! released in reverse acquisition order. Entries registered with
//! [`ResourceTracker::on_failure`] survive a successful operation: they
//! guard resources that are handed to the client.
//!
//! Release errors during the final unwind never change the operation's
//! outcome. They are logged and counted, and the remaining entries are
//! still released.

use crate::metrics::HandlerMetrics;
use iodmap_common::Result;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

type ReleaseFn = Box<dyn FnOnce() -> Result<()> + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope {
    Always,
    OnFailure,
}

struct Entry {
    ticket: u64,
    label: &'static str,
    scope: Scope,
    release: ReleaseFn,
}

/// Claim on one registered entry, redeemable with
/// [`ResourceTracker::release`]
#[derive(Debug, PartialEq, Eq)]
pub struct Ticket(u64);

pub struct ResourceTracker {
    op: &'static str,
    entries: Vec<Entry>,
    next_ticket: u64,
    metrics: Option<Arc<HandlerMetrics>>,
    finished: bool,
}

impl ResourceTracker {
    #[must_use]
    pub const fn new(op: &'static str) -> Self {
        Self {
            op,
            entries: Vec::new(),
            next_ticket: 0,
            metrics: None,
            finished: false,
        }
    }

    /// Count delayed release errors in `metrics`
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<HandlerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Release on every exit path
    pub fn defer(
        &mut self,
        label: &'static str,
        release: impl FnOnce() -> Result<()> + Send + 'static,
    ) -> Ticket {
        self.push(label, Scope::Always, Box::new(release))
    }

    /// Release only if the operation fails
    pub fn on_failure(
        &mut self,
        label: &'static str,
        release: impl FnOnce() -> Result<()> + Send + 'static,
    ) -> Ticket {
        self.push(label, Scope::OnFailure, Box::new(release))
    }

    /// Release one entry now. Its error is the caller's to handle.
    pub fn release(&mut self, ticket: Ticket) -> Result<()> {
        match self.entries.iter().position(|e| e.ticket == ticket.0) {
            Some(pos) => (self.entries.remove(pos).release)(),
            None => Ok(()),
        }
    }

    /// Number of entries still registered
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Release what the outcome calls for; returns the number of releases
    /// that failed
    pub fn finish(mut self, succeeded: bool) -> usize {
        self.unwind(succeeded)
    }

    fn push(&mut self, label: &'static str, scope: Scope, release: ReleaseFn) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.entries.push(Entry {
            ticket,
            label,
            scope,
            release,
        });
        Ticket(ticket)
    }

    fn unwind(&mut self, succeeded: bool) -> usize {
        self.finished = true;
        let mut failures = 0;
        while let Some(entry) = self.entries.pop() {
            if succeeded && entry.scope == Scope::OnFailure {
                continue;
            }
            if let Err(e) = (entry.release)() {
                failures += 1;
                warn!("{}: failed to release {}: {}", self.op, entry.label, e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_release_error();
                }
            }
        }
        failures
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        if !self.finished {
            self.unwind(false);
        }
    }
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<_> = self.entries.iter().map(|e| e.label).collect();
        f.debug_struct("ResourceTracker")
            .field("op", &self.op)
            .field("pending", &labels)
            .finish()
    }
}

//! Shared state of a provisioning run: status, progress, log and statistics.
//!
//! One `RunState` is owned by the runner and handed out as `Arc` to anything
//! that wants to poll. Writers go through short lock scopes; pollers read
//! consistent snapshots at any time, including mid-run.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use time::macros::format_description;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle of a run. `Running` is the only state that advances progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::NotStarted => "not started",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// One append-only log line.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub at: OffsetDateTime,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = format_description!("[hour]:[minute]:[second]");
        let stamp = self
            .at
            .format(&clock)
            .unwrap_or_else(|_| "??:??:??".to_string());
        write!(f, "[{stamp}] [{}] {}", self.level.as_str(), self.message)
    }
}

/// Observed distances for one buyer, for the per-buyer reporting summary.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuyerDistances {
    pub routes: usize,
    pub total_km: f64,
}

impl BuyerDistances {
    pub fn record(&mut self, km: f64) {
        self.routes += 1;
        self.total_km += km;
    }

    pub fn average(&self) -> f64 {
        if self.routes == 0 {
            0.0
        } else {
            self.total_km / self.routes as f64
        }
    }
}

/// Aggregate counters for one run, reset when the run starts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunStats {
    pub total_operations: usize,
    pub total_sales: usize,
    pub total_purchases: usize,
    pub total_combinations: usize,
    /// Distances that had to be computed through the routing service.
    pub distances_calculated: usize,
    pub processed_combinations: usize,
    pub total_allocated: f64,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub total_profit: f64,
    pub total_freight: f64,
    pub total_tax_balance: f64,
    pub average_distance: f64,
    pub grain_totals: HashMap<String, f64>,
    pub buyer_distances: HashMap<String, BuyerDistances>,
}

/// Read-only view of the run state for external pollers.
#[derive(Clone, Debug)]
pub struct RunSnapshot {
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub progress: f64,
    pub logs: Vec<LogEntry>,
    pub stats: RunStats,
}

#[derive(Debug, Default)]
struct RunInner {
    run_id: Option<Uuid>,
    status: RunStatus,
    progress: f64,
    logs: Vec<LogEntry>,
    stats: RunStats,
}

/// Thread-safe run context shared between the pipeline and its observers.
#[derive(Debug, Default)]
pub struct RunState {
    inner: RwLock<RunInner>,
    running: AtomicBool,
    cancelled: AtomicBool,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the run slot and reset status, progress, log and statistics.
    ///
    /// Returns the fresh run id, or `None` if another run currently holds
    /// the slot. At most one run mutates this state at a time.
    pub fn try_begin(&self) -> Option<Uuid> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        self.cancelled.store(false, Ordering::SeqCst);
        let run_id = Uuid::new_v4();
        let mut inner = self.inner.write();
        *inner = RunInner {
            run_id: Some(run_id),
            status: RunStatus::Running,
            ..RunInner::default()
        };
        Some(run_id)
    }

    /// Mark the run completed and release the run slot.
    pub fn complete(&self) {
        self.inner.write().status = RunStatus::Completed;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Mark the run failed with a reason, logged at ERROR, and release the
    /// run slot.
    pub fn fail(&self, reason: &str) {
        self.log(LogLevel::Error, reason.to_string());
        self.inner.write().status = RunStatus::Failed;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Request cancellation; the pipeline checks this between stages and
    /// inside its long loops.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> RunStatus {
        self.inner.read().status
    }

    pub fn progress(&self) -> f64 {
        self.inner.read().progress
    }

    /// Advance progress to `value` (0-100). Progress never moves backwards;
    /// stage checkpoints may be re-reported safely.
    pub fn set_progress(&self, value: f64) {
        let value = value.clamp(0.0, 100.0);
        let mut inner = self.inner.write();
        if value > inner.progress {
            inner.progress = value;
        }
    }

    /// Append one timestamped line to the run log, mirrored to `tracing`.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        self.inner.write().logs.push(LogEntry {
            at: OffsetDateTime::now_utc(),
            level,
            message,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    /// Mutate the statistics record under the write lock.
    pub fn with_stats(&self, f: impl FnOnce(&mut RunStats)) {
        f(&mut self.inner.write().stats);
    }

    /// Consistent copy of the whole run state for pollers.
    pub fn snapshot(&self) -> RunSnapshot {
        let inner = self.inner.read();
        RunSnapshot {
            run_id: inner.run_id,
            status: inner.status,
            progress: inner.progress,
            logs: inner.logs.clone(),
            stats: inner.stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_resets_previous_run() {
        let state = RunState::new();
        let first = state.try_begin().expect("first run claims the slot");
        state.set_progress(80.0);
        state.info("some progress");
        state.complete();

        let second = state.try_begin().expect("slot free after completion");
        assert_ne!(first, second);
        let snap = state.snapshot();
        assert_eq!(snap.status, RunStatus::Running);
        assert_eq!(snap.progress, 0.0);
        assert!(snap.logs.is_empty());
        assert_eq!(snap.stats, RunStats::default());
    }

    #[test]
    fn second_trigger_is_rejected_while_running() {
        let state = RunState::new();
        assert!(state.try_begin().is_some());
        assert!(state.try_begin().is_none());
        state.fail("boom");
        assert!(state.try_begin().is_some());
    }

    #[test]
    fn progress_is_monotone() {
        let state = RunState::new();
        state.try_begin();
        state.set_progress(40.0);
        state.set_progress(10.0);
        assert_eq!(state.progress(), 40.0);
        state.set_progress(250.0);
        assert_eq!(state.progress(), 100.0);
    }

    #[test]
    fn failure_appends_an_error_line() {
        let state = RunState::new();
        state.try_begin();
        state.fail("store unreachable");
        let snap = state.snapshot();
        assert_eq!(snap.status, RunStatus::Failed);
        let last = snap.logs.last().expect("error line present");
        assert_eq!(last.level, LogLevel::Error);
        assert!(last.to_string().contains("[ERROR] store unreachable"));
    }

    #[test]
    fn cancel_flag_is_cleared_on_next_begin() {
        let state = RunState::new();
        state.try_begin();
        state.cancel();
        assert!(state.is_cancelled());
        state.fail("cancelled");
        state.try_begin();
        assert!(!state.is_cancelled());
    }

    #[test]
    fn buyer_distances_average() {
        let mut buyer = BuyerDistances::default();
        assert_eq!(buyer.average(), 0.0);
        buyer.record(10.0);
        buyer.record(20.0);
        assert_eq!(buyer.routes, 2);
        assert!((buyer.average() - 15.0).abs() < 1e-9);
    }
}

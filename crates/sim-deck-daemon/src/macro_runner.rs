//! Macro execution for timed combo sequences
//!
//! This module provides the [`MacroRunner`], which plays a [`Macro`] step by
//! step on its own tokio task: run the step's combo, wait the step's delay,
//! move on.
//!
//! Macros are best-effort: a step whose combo fails is logged and skipped, and
//! the sequence carries on. A macro models a physical procedure (e.g. a cold
//! start) where stopping halfway leaves no recovery path.
//!
//! Each invocation gets its own task with its own step cursor. Nothing is
//! shared between running macros except the keyboard itself, so the same
//! macro may run several times at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sim_deck_config::Macro;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::combo::ComboExecutor;

/// Broadcasts a stop request to every running macro.
///
/// Macros observe it between steps only; a combo that has started always
/// finishes, so no key is left held.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Ask all running macros to stop at their next step boundary
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one macro run, logged when the task ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroReport {
    pub name: String,
    /// Steps whose combo was attempted
    pub steps_run: usize,
    /// Steps whose combo returned an error
    pub steps_failed: usize,
    /// The run stopped early on a shutdown request
    pub cancelled: bool,
}

/// Runs macros through a shared [`ComboExecutor`].
///
/// `MacroRunner` is `Clone` and cheap to clone; clones share the executor,
/// clock, shutdown signal and the running-macro counter.
#[derive(Clone)]
pub struct MacroRunner {
    combos: ComboExecutor,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
    active: Arc<AtomicUsize>,
}

impl MacroRunner {
    pub fn new(
        combos: ComboExecutor,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            combos,
            clock,
            shutdown,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of macros currently running on spawned tasks
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Start `macro_def` on a detached task and return immediately.
    ///
    /// The returned handle may be dropped; the macro keeps running.
    pub fn spawn(&self, macro_def: Macro) -> JoinHandle<MacroReport> {
        let runner = self.clone();
        let guard = ActiveGuard::new(self.active.clone());

        tokio::spawn(async move {
            let _guard = guard;
            let report = runner.run(&macro_def).await;
            if report.cancelled {
                tracing::info!(
                    "Macro '{}' cancelled after {}/{} step(s)",
                    report.name,
                    report.steps_run,
                    macro_def.steps.len()
                );
            } else if report.steps_failed > 0 {
                tracing::warn!(
                    "Macro '{}' finished with {} failed step(s) out of {}",
                    report.name,
                    report.steps_failed,
                    report.steps_run
                );
            } else {
                tracing::info!("Macro '{}' finished ({} step(s))", report.name, report.steps_run);
            }
            report
        })
    }

    /// Play every step of `macro_def` in declared order on the current task.
    ///
    /// Each step's delay starts after its combo has been released. A pending
    /// delay is cut short by a shutdown request.
    pub async fn run(&self, macro_def: &Macro) -> MacroReport {
        let mut shutdown = self.shutdown.clone();
        let mut report = MacroReport {
            name: macro_def.name.clone(),
            steps_run: 0,
            steps_failed: 0,
            cancelled: false,
        };

        tracing::debug!("Macro '{}' started", macro_def.name);

        for (i, step) in macro_def.steps.iter().enumerate() {
            if *shutdown.borrow() {
                report.cancelled = true;
                break;
            }

            if let Err(e) = self.combos.execute(&step.combo).await {
                report.steps_failed += 1;
                tracing::warn!(
                    "Macro '{}' step {} ('{}') failed, continuing: {}",
                    macro_def.name,
                    i + 1,
                    step.combo,
                    e
                );
            }
            report.steps_run += 1;

            if step.delay.is_zero() {
                continue;
            }

            tokio::select! {
                _ = self.clock.sleep(step.delay) => {}
                _ = stop_requested(&mut shutdown) => {
                    report.cancelled = true;
                    break;
                }
            }
        }

        report
    }
}

/// Resolves once a stop is requested; never resolves if the sender is gone
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Keeps the running-macro count accurate even if the task panics or aborts
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

//! Two independent polling loops (full and fast cadence) on tokio intervals.
//!
//! Missed ticks are skipped rather than bursted, so a cycle that overruns its
//! interval simply delays the next one. Both loops exit when the shutdown
//! channel flips to `true`.

use crate::coordinator::{Cadence, Coordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub full_interval: Duration,
    pub fast_interval: Duration,
    pub run_on_startup: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            full_interval: Duration::from_secs(300),
            fast_interval: Duration::from_secs(120),
            run_on_startup: true,
        }
    }
}

impl SchedulerSettings {
    /// The fast cadence never runs less often than the full one.
    pub fn effective_fast_interval(&self) -> Duration {
        self.fast_interval.min(self.full_interval)
    }
}

pub struct Scheduler {
    full: JoinHandle<()>,
    fast: JoinHandle<()>,
}

impl Scheduler {
    pub fn spawn(
        coordinator: Arc<Coordinator>,
        settings: &SchedulerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        info!(
            full_secs = settings.full_interval.as_secs(),
            fast_secs = settings.effective_fast_interval().as_secs(),
            "starting polling scheduler"
        );
        let full = tokio::spawn(run_loop(
            coordinator.clone(),
            Cadence::Full,
            settings.full_interval,
            settings.run_on_startup,
            shutdown.clone(),
        ));
        let fast = tokio::spawn(run_loop(
            coordinator,
            Cadence::Fast,
            settings.effective_fast_interval(),
            settings.run_on_startup,
            shutdown,
        ));
        Scheduler { full, fast }
    }

    /// Wait for both loops to finish (after shutdown was signalled).
    pub async fn join(self) {
        for (cadence, handle) in [(Cadence::Full, self.full), (Cadence::Fast, self.fast)] {
            if let Err(e) = handle.await {
                warn!(cadence = cadence.name(), error = %e, "scheduler loop panicked");
            }
        }
    }
}

async fn run_loop(
    coordinator: Arc<Coordinator>,
    cadence: Cadence,
    period: Duration,
    run_on_startup: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    if !run_on_startup {
        // The first tick completes immediately.
        ticker.tick().await;
    }

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = coordinator.run_cycle(cadence).await {
                    warn!(cadence = cadence.name(), error = %e, "polling cycle skipped");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(cadence = cadence.name(), "polling scheduler stopped");
                    return;
                }
            }
        }
    }
}

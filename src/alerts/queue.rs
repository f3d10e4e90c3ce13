//! Per-business single-flight execution of alert cycles
//!
//! Each business under monitoring gets at most one worker task. States
//! fetched while that task is busy queue up behind it and are processed in
//! arrival order; unrelated businesses run fully concurrently.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::Instrument;

use super::checker::AlertWorker;
use super::config::AlertState;

type Backlogs = Arc<Mutex<HashMap<String, VecDeque<AlertState>>>>;

/// Dispatches fetched states to per-business worker tasks
pub struct QueueManager {
    /// Business ID -> states waiting behind its running worker.
    /// An entry exists exactly while a worker task is alive.
    backlogs: Backlogs,
    worker: Arc<AlertWorker>,
    cooldown: Duration,
}

impl QueueManager {
    pub fn new(worker: Arc<AlertWorker>) -> Self {
        let cooldown = worker.config().cooldown;
        Self {
            backlogs: Arc::new(Mutex::new(HashMap::new())),
            worker,
            cooldown,
        }
    }

    /// Hand a batch of fetched states to their businesses' workers. Returns
    /// how many new worker tasks were started.
    pub fn dispatch(&self, states: Vec<AlertState>) -> usize {
        let mut spawned = 0;
        let mut backlogs = self.backlogs.lock();

        for state in states {
            if let Some(backlog) = backlogs.get_mut(&state.business_id) {
                tracing::debug!(
                    business_id = %state.business_id,
                    queued = backlog.len() + 1,
                    "Worker busy, queueing alert state"
                );
                backlog.push_back(state);
                continue;
            }

            backlogs.insert(state.business_id.clone(), VecDeque::new());
            let span = tracing::info_span!("delay_alert_worker", business_id = %state.business_id);
            tokio::spawn(
                Self::drain(
                    Arc::clone(&self.backlogs),
                    Arc::clone(&self.worker),
                    self.cooldown,
                    state,
                )
                .instrument(span),
            );
            spawned += 1;
        }

        spawned
    }

    /// Worker task body: run cycles until the backlog is empty
    async fn drain(
        backlogs: Backlogs,
        worker: Arc<AlertWorker>,
        cooldown: Duration,
        mut state: AlertState,
    ) {
        let business_id = state.business_id.clone();

        loop {
            // Own task so a panic stays inside this cycle
            let cycle_worker = Arc::clone(&worker);
            let cycle = tokio::spawn(async move { cycle_worker.run_cycle(&state).await });

            match cycle.await {
                Ok(Ok(report)) => {
                    tracing::info!(
                        outcome = ?report.outcome,
                        notified = report.notified,
                        failed = report.failures.as_ref().map_or(0, |f| f.len()),
                        "Delay alert cycle finished"
                    );
                }
                // Next tick's window includes whatever this one missed
                Ok(Err(e)) => tracing::error!(error = %e, "Error running alert"),
                Err(e) => tracing::error!(error = %e, "Delay alert cycle aborted"),
            }

            let next = {
                let mut backlogs = backlogs.lock();
                let next = backlogs.get_mut(&business_id).and_then(VecDeque::pop_front);
                if next.is_none() {
                    backlogs.remove(&business_id);
                }
                next
            };

            match next {
                Some(next) => {
                    state = next;
                    // Push services rate-limit bursts per sender
                    tokio::time::sleep(cooldown).await;
                }
                None => return,
            }
        }
    }

    /// Whether a worker task is alive for the business
    pub fn in_flight(&self, business_id: &str) -> bool {
        self.backlogs.lock().contains_key(business_id)
    }

    /// States waiting behind the running worker, if any
    pub fn backlog_len(&self, business_id: &str) -> Option<usize> {
        self.backlogs.lock().get(business_id).map(VecDeque::len)
    }

    /// Businesses with a live worker task, sorted
    pub fn active_businesses(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.backlogs.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

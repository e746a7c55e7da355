use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chainforge_domain::JobId;
use chainforge_store::ProvisionStore;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::provisioner::Provisioner;

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        WorkerPoolConfig {
            worker_count: 20,
            poll_interval: Duration::from_secs(10),
        }
    }
}

type InFlight = Arc<Mutex<HashSet<JobId>>>;

// ── WorkerPool ────────────────────────────────────────────────────────────────

/// Concurrently drives incomplete jobs to completion.
///
/// One producer task polls the store for incomplete jobs, skipping those a
/// worker already owns, and feeds their ids through a rendezvous channel to a
/// fixed set of worker tasks. The channel's single-slot capacity makes the
/// producer block while all workers are busy.
///
/// A job id joins the in-flight set before it is published and leaves it only
/// when its worker is done, so at most one worker owns a job at any time.
/// Cancellation stops the producer between polls and workers between jobs;
/// a job that is mid-step finishes its current step first.
pub struct WorkerPool {
    worker_count: usize,
    poll_interval: Duration,
    store: Arc<dyn ProvisionStore>,
    provisioner: Arc<Provisioner>,
    in_flight: InFlight,
}

impl WorkerPool {
    pub fn new(
        config: &WorkerPoolConfig,
        store: Arc<dyn ProvisionStore>,
        provisioner: Arc<Provisioner>,
    ) -> Self {
        WorkerPool {
            worker_count: config.worker_count,
            poll_interval: config.poll_interval,
            store,
            provisioner,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run the pool until the token is cancelled and every task has wound
    /// down.
    pub async fn run(&self, cancel: CancellationToken) {
        let (job_tx, job_rx) = mpsc::channel::<JobId>(1);
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));

        let mut handles = Vec::with_capacity(self.worker_count + 1);

        handles.push(tokio::spawn(producer_loop(
            cancel.clone(),
            self.store.clone(),
            self.in_flight.clone(),
            job_tx,
            self.poll_interval,
        )));

        for _ in 0..self.worker_count {
            handles.push(tokio::spawn(worker_loop(
                cancel.clone(),
                job_rx.clone(),
                self.provisioner.clone(),
                self.in_flight.clone(),
            )));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker pool task panicked");
            }
        }
    }
}

async fn producer_loop(
    cancel: CancellationToken,
    store: Arc<dyn ProvisionStore>,
    in_flight: InFlight,
    job_tx: mpsc::Sender<JobId>,
    poll_interval: Duration,
) {
    while !cancel.is_cancelled() {
        let excluded: Vec<JobId> = lock_in_flight(&in_flight).iter().cloned().collect();

        let jobs = match store.find_incomplete_jobs(&excluded).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "failed finding incomplete jobs");
                sleep(&cancel, poll_interval).await;
                continue;
            }
        };

        if jobs.is_empty() {
            // No jobs to schedule, sleeping.
            sleep(&cancel, poll_interval).await;
            continue;
        }

        for job in jobs {
            info!(job_id = %job.id, "dispatching job");

            // Join the in-flight set before publishing, closing the race
            // with the next poll.
            lock_in_flight(&in_flight).insert(job.id.clone());

            tokio::select! {
                _ = cancel.cancelled() => return,
                sent = job_tx.send(job.id.clone()) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

async fn worker_loop(
    cancel: CancellationToken,
    job_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<JobId>>>,
    provisioner: Arc<Provisioner>,
    in_flight: InFlight,
) {
    loop {
        let job_id = {
            let mut rx = job_rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                received = rx.recv() => match received {
                    Some(job_id) => job_id,
                    None => return,
                },
            }
        };

        info!(job_id = %job_id, "starting job");

        if let Err(e) = provisioner.provision(&cancel, &job_id).await {
            error!(job_id = %job_id, error = %e, "run provision job");
        }

        lock_in_flight(&in_flight).remove(&job_id);
        info!(job_id = %job_id, "finished job");
    }
}

fn lock_in_flight(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashSet<JobId>> {
    in_flight.lock().expect("in-flight set lock poisoned")
}

async fn sleep(cancel: &CancellationToken, duration: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.worker_count, 20);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
    }
}

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error};

/// One unit of work for the pool; the name is diagnostic only.
pub struct Job {
    pub name: String,
    work: Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>,
}

impl Job {
    pub fn new<N, F>(name: N, work: F) -> Job
    where
        N: Into<String>,
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Job {
            name: name.into(),
            work: Box::new(work),
        }
    }
}

/// What a job failure does to the rest of the run.
///
/// Partial output already written by a failed or abandoned job stays on
/// disk; nothing is rolled back.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorMode {
    /// Log the failure and keep going; `process` returns `Ok`.
    None,
    /// Stop admitting new jobs, let running jobs finish, then return the
    /// first failure.
    Wait,
    /// Return the first failure immediately; running jobs are no longer
    /// awaited and finish in the background.
    Terminate,
}

impl Default for ErrorMode {
    fn default() -> Self {
        ErrorMode::Wait
    }
}

/// Runs a list of independent jobs on a fixed number of worker threads.
///
/// Jobs travel over a bounded channel drained by long-lived workers;
/// `None` pills terminate the workers and `pool.join()` is the wait group.
/// At most `num_workers` jobs ever run concurrently.
pub struct JobPool {
    num_workers: usize,
    error_mode: ErrorMode,
}

impl JobPool {
    pub fn new(num_workers: usize, error_mode: ErrorMode) -> JobPool {
        JobPool {
            num_workers,
            error_mode,
        }
    }

    /// Run all jobs, blocking until they complete or the error mode trips.
    /// Whenever a failure is surfaced it is exactly the first one recorded.
    pub fn process(&self, jobs: Vec<Job>) -> anyhow::Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        let num_workers = self.num_workers.clamp(1, jobs.len());

        // sized so sends below never block
        let (tx_job, rx_job) =
            crossbeam::channel::bounded::<Option<Job>>(jobs.len() + num_workers);
        let (tx_done, rx_done) = crossbeam::channel::bounded::<()>(1);

        let pool = threadpool::ThreadPool::new(num_workers);
        let first_error: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));
        let abort = Arc::new(AtomicBool::new(false));
        let remaining = Arc::new(AtomicUsize::new(jobs.len()));

        for _ in 0..num_workers {
            let rx_job = rx_job.clone();
            let tx_done = tx_done.clone();
            let first_error = Arc::clone(&first_error);
            let abort = Arc::clone(&abort);
            let remaining = Arc::clone(&remaining);
            let error_mode = self.error_mode;

            pool.execute(move || {
                while let Ok(Some(job)) = rx_job.recv() {
                    if !abort.load(Ordering::SeqCst) {
                        debug!("Starting job {}", job.name);
                        if let Err(e) = (job.work)() {
                            error!("Job {} failed: {:#}", job.name, e);
                            if error_mode != ErrorMode::None {
                                abort.store(true, Ordering::SeqCst);
                                let mut slot = first_error.lock().unwrap();
                                if slot.is_none() {
                                    *slot = Some(e);
                                }
                                drop(slot);
                                if error_mode == ErrorMode::Terminate {
                                    let _ = tx_done.try_send(());
                                }
                            }
                        }
                    } else {
                        debug!("Skipping job {} after earlier failure", job.name);
                    }
                    if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        let _ = tx_done.try_send(());
                    }
                }
            });
        }

        for job in jobs {
            let _ = tx_job.send(Some(job));
        }
        for _ in 0..num_workers {
            let _ = tx_job.send(None);
        }

        match self.error_mode {
            // dropping the pool leaves in-flight jobs running detached
            ErrorMode::Terminate => {
                let _ = rx_done.recv();
            }
            _ => pool.join(),
        }

        if let Some(e) = first_error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(())
    }
}

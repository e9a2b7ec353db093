//! Recurring harvest scheduler.
//!
//! The scheduler owns the job table and a table of in-flight runs. Each
//! `tick` starts a thread per due job; distinct jobs run concurrently
//! but a given uid never has two runs in flight. Job bookkeeping is
//! committed exactly once, after the run's terminal state is known, and
//! only on success.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::client::HarvestClient;
use crate::config::{validate_base_url, DEFAULT_HTTP_TIMEOUT};
use crate::error::{HarvesterError, Result};
use crate::notify::{ChangeNotifier, NullNotifier};
use crate::output::OutputManager;
use crate::schedule::ScheduledHarvest;
use crate::types::{HarvestParams, HarvestRun, RunStatus};

/// Issues job uids.
pub trait IdGenerator: Send + Sync {
    /// Next unique id. Must never repeat within a deployment.
    fn next_uid(&self) -> u64;
}

/// Default generator: monotonic counter seeded from the clock, so uids
/// stay unique across daemon restarts without any persisted counter.
pub struct TimeSeededIdGenerator {
    counter: AtomicU64,
}

impl TimeSeededIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        let seed = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(1);
        Self {
            counter: AtomicU64::new(seed),
        }
    }
}

impl Default for TimeSeededIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for TimeSeededIdGenerator {
    fn next_uid(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

struct RunHandle {
    kill: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

struct SchedulerInner {
    jobs: Mutex<HashMap<u64, ScheduledHarvest>>,
    running: Mutex<HashMap<u64, RunHandle>>,
    ids: Box<dyn IdGenerator>,
    notifier: Arc<dyn ChangeNotifier>,
    timeout: Duration,
}

/// Drives registered [`ScheduledHarvest`] jobs. Cheap to clone; clones
/// share the same job and run tables.
#[derive(Clone)]
pub struct HarvestScheduler {
    inner: Arc<SchedulerInner>,
}

impl HarvestScheduler {
    /// Create a scheduler with the default timeout, id generator and a
    /// null notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a customized scheduler.
    #[must_use]
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    /// Register a job. A zero uid gets a fresh one from the id
    /// generator; jobs loaded from persistence keep theirs.
    ///
    /// # Returns
    /// The uid under which the job is registered.
    pub fn register(&self, mut job: ScheduledHarvest) -> u64 {
        if job.uid == 0 {
            job.uid = self.inner.ids.next_uid();
        }
        let uid = job.uid;
        tracing::info!(uid, repository = %job.repository_name, "Registering job");
        self.lock_jobs().insert(uid, job);
        uid
    }

    /// Remove a job. An in-flight run finishes but its bookkeeping is
    /// discarded.
    pub fn unregister(&self, uid: u64) -> Option<ScheduledHarvest> {
        tracing::info!(uid, "Unregistering job");
        self.lock_jobs().remove(&uid)
    }

    /// Snapshot of all registered jobs, for listing and persistence.
    #[must_use]
    pub fn jobs(&self) -> Vec<ScheduledHarvest> {
        self.lock_jobs().values().cloned().collect()
    }

    /// Enable or disable a job. Disabling never interrupts an in-flight
    /// run.
    pub fn set_enabled(&self, uid: u64, enabled: bool) -> Result<()> {
        let mut jobs = self.lock_jobs();
        let job = jobs.get_mut(&uid).ok_or(HarvesterError::JobNotFound(uid))?;
        job.enabled = enabled;
        Ok(())
    }

    /// Start a run for every enabled job due at `now` that has no run in
    /// flight.
    ///
    /// # Returns
    /// Number of runs started.
    pub fn tick(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<ScheduledHarvest> = self
            .lock_jobs()
            .values()
            .filter(|job| job.is_due(now))
            .cloned()
            .collect();

        let mut started = 0;
        for job in due {
            let params = job.params();
            if self.start_run(job, params) {
                started += 1;
            }
        }
        started
    }

    /// Run one job immediately, regardless of its schedule.
    ///
    /// # Arguments
    /// * `uid` - Job to run
    /// * `harvest_all` - Force a full harvest for this run
    pub fn harvest_now(&self, uid: u64, harvest_all: bool) -> Result<()> {
        let job = self
            .lock_jobs()
            .get(&uid)
            .cloned()
            .ok_or(HarvesterError::JobNotFound(uid))?;
        let mut params = job.params();
        if harvest_all {
            params.harvest_all = true;
            params.from = None;
        }
        self.start_run(job, params);
        Ok(())
    }

    /// Signal an in-flight run to stop at its next page boundary.
    pub fn kill_run(&self, uid: u64) -> Result<()> {
        let running = self.lock_running();
        let handle = running.get(&uid).ok_or(HarvesterError::JobNotFound(uid))?;
        tracing::info!(uid, "Killing in-flight run");
        handle.kill.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// True while `uid` has a run in flight.
    #[must_use]
    pub fn is_running(&self, uid: u64) -> bool {
        self.lock_running().contains_key(&uid)
    }

    /// Wait for every in-flight run to finish.
    pub fn join_runs(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .lock_running()
            .values_mut()
            .filter_map(|handle| handle.thread.take())
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn start_run(&self, job: ScheduledHarvest, params: HarvestParams) -> bool {
        let client = match HarvestClient::with_timeout(self.inner.timeout) {
            Ok(client) => client,
            Err(error) => {
                tracing::error!(uid = job.uid, %error, "Could not create HTTP client");
                return false;
            }
        };

        let uid = job.uid;
        let kill = client.kill_handle();
        let inner = Arc::clone(&self.inner);
        let notifier = Arc::clone(&self.inner.notifier);

        // Claim the in-flight slot under one lock acquisition, before
        // spawning: the check and the insert must not be separable, or
        // two callers could race a second run onto the same uid.
        match self.lock_running().entry(uid) {
            Entry::Occupied(_) => {
                tracing::warn!(uid, "Run already in flight, not starting another");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(RunHandle { kill, thread: None });
            }
        }

        let thread = std::thread::spawn(move || {
            tracing::info!(uid, repository = %job.repository_name, "Run starting");
            let run = execute_job(&client, &job, &params, notifier);
            finish_run(&inner, run);
        });

        // The run may already have released its slot; then the handle is
        // simply dropped and the thread detaches.
        if let Some(handle) = self.lock_running().get_mut(&uid) {
            handle.thread = Some(thread);
        }
        true
    }

    #[allow(clippy::expect_used)] // Mutexes are never poisoned: run threads do not panic
    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<u64, ScheduledHarvest>> {
        self.inner.jobs.lock().expect("jobs mutex poisoned")
    }

    #[allow(clippy::expect_used)]
    fn lock_running(&self) -> std::sync::MutexGuard<'_, HashMap<u64, RunHandle>> {
        self.inner.running.lock().expect("running mutex poisoned")
    }
}

impl Default for HarvestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`HarvestScheduler`].
pub struct SchedulerBuilder {
    ids: Box<dyn IdGenerator>,
    notifier: Arc<dyn ChangeNotifier>,
    timeout: Duration,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self {
            ids: Box::new(TimeSeededIdGenerator::new()),
            notifier: Arc::new(NullNotifier),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl SchedulerBuilder {
    /// Replace the id generator.
    #[must_use]
    pub fn id_generator(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Observe output-directory changes across all jobs.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Per-request HTTP timeout for all runs.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn build(self) -> HarvestScheduler {
        HarvestScheduler {
            inner: Arc::new(SchedulerInner {
                jobs: Mutex::new(HashMap::new()),
                running: Mutex::new(HashMap::new()),
                ids: self.ids,
                notifier: self.notifier,
                timeout: self.timeout,
            }),
        }
    }
}

/// Run one job to completion on the current thread.
fn execute_job(
    client: &HarvestClient,
    job: &ScheduledHarvest,
    params: &HarvestParams,
    notifier: Arc<dyn ChangeNotifier>,
) -> HarvestRun {
    let base_url = match validate_base_url(&params.base_url) {
        Ok(url) => url,
        Err(error) => return failed_run(job.uid, error),
    };

    let zip_dir = job.do_zip.then(|| job.harvest_dir.join("zips"));
    let mut output = OutputManager::new(
        &job.harvest_dir,
        &base_url,
        params.metadata_prefix.as_deref(),
        params.set_spec.as_deref(),
        job.split_by_set,
        zip_dir,
        notifier,
    );

    let mut run = client.harvest(params, &mut output);
    run.job_uid = job.uid;
    run.output_dir = Some(output.scope_dir().to_path_buf());

    // Only a fully successful run earns an archive
    if run.status == RunStatus::Succeeded {
        match output.archive_run(run.start_time) {
            Ok(zip_file) => run.zip_file = zip_file,
            Err(error) => tracing::warn!(uid = job.uid, %error, "Archiving failed"),
        }
    }
    run
}

fn failed_run(uid: u64, error: HarvesterError) -> HarvestRun {
    HarvestRun {
        job_uid: uid,
        start_time: Utc::now(),
        records: 0,
        pages: 0,
        status: RunStatus::Failed,
        output_dir: None,
        zip_file: None,
        last_token: None,
        error: Some(error.to_string()),
    }
}

/// Commit the run's terminal state and release the in-flight slot.
fn finish_run(inner: &SchedulerInner, run: HarvestRun) {
    let uid = run.job_uid;
    {
        #[allow(clippy::expect_used)]
        let mut jobs = inner.jobs.lock().expect("jobs mutex poisoned");
        match jobs.get_mut(&uid) {
            Some(job) if run.status == RunStatus::Succeeded => {
                job.commit_success(run.start_time, run.records, run.zip_file.clone());
                tracing::info!(
                    uid,
                    records = run.records,
                    pages = run.pages,
                    "Run committed"
                );
            }
            Some(_) => {
                tracing::warn!(
                    uid,
                    status = run.status.as_str(),
                    error = run.error.as_deref().unwrap_or("-"),
                    "Run did not succeed, bookkeeping unchanged"
                );
            }
            None => {
                tracing::warn!(uid, "Job was unregistered mid-run, result discarded");
            }
        }
    }
    #[allow(clippy::expect_used)]
    inner
        .running
        .lock()
        .expect("running mutex poisoned")
        .remove(&uid);
}

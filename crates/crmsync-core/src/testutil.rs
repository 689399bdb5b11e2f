//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{CreateJobRequest, ExportJob, JobArgs, JobStatus};
use crate::job_queue::JobQueue;
use crate::models::{ApiResponse, Collection, DataType, SourceItem};
use crate::state::ExportState;
use crate::traits::{ItemSource, Notice, NoticeSink, ProgressStore, Uploader};

// ---------------------------------------------------------------------------
// MockProgressStore
// ---------------------------------------------------------------------------

/// In-memory progress store with real compare-and-set semantics.
#[derive(Clone, Default)]
pub struct MockProgressStore {
    states: Arc<Mutex<HashMap<DataType, ExportState>>>,
    writes: Arc<Mutex<usize>>,
    /// Number of upcoming writes that lose the race.
    contended: Arc<Mutex<usize>>,
}

impl MockProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored record (defaulted if never written).
    pub fn snapshot(&self, data_type: DataType) -> ExportState {
        self.states
            .lock()
            .unwrap()
            .get(&data_type)
            .cloned()
            .unwrap_or_else(|| ExportState::new(data_type))
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    /// Make the next `n` compare-and-set calls report a conflict.
    pub fn fail_next_writes(&self, n: usize) {
        *self.contended.lock().unwrap() = n;
    }

    /// Seed a record directly, bypassing versioning.
    pub fn put(&self, state: ExportState) {
        self.states.lock().unwrap().insert(state.data_type, state);
    }
}

impl ProgressStore for MockProgressStore {
    async fn load(&self, data_type: DataType) -> Result<ExportState, AppError> {
        Ok(self.snapshot(data_type))
    }

    async fn compare_and_set(
        &self,
        expected_version: u64,
        state: &ExportState,
    ) -> Result<bool, AppError> {
        {
            let mut contended = self.contended.lock().unwrap();
            if *contended > 0 {
                *contended -= 1;
                return Ok(false);
            }
        }

        let mut states = self.states.lock().unwrap();
        let current_version = states
            .get(&state.data_type)
            .map(|s| s.version)
            .unwrap_or(0);
        if current_version != expected_version {
            return Ok(false);
        }
        states.insert(state.data_type, state.clone());
        *self.writes.lock().unwrap() += 1;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Recorded page fetch: (data_type, collection, offset, limit).
pub type FetchRecord = (DataType, Collection, u64, usize);

/// In-memory item source with numbered items.
#[derive(Clone, Default)]
pub struct MockSource {
    items: Arc<Mutex<HashMap<(DataType, Collection), Vec<SourceItem>>>>,
    error: Arc<Mutex<Option<AppError>>>,
    count_hook: Arc<Mutex<Option<CountHook>>>,
    pub fetches: Arc<Mutex<Vec<FetchRecord>>>,
}

type CountHook = Box<dyn FnOnce() + Send>;

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` primary items with ids `1..=count`.
    pub fn with_primary(self, data_type: DataType, count: usize) -> Self {
        let items = (1..=count)
            .map(|i| SourceItem::new(i.to_string(), serde_json::json!({"id": i})))
            .collect();
        self.items
            .lock()
            .unwrap()
            .insert((data_type, Collection::Primary), items);
        self
    }

    /// Add `count` secondary items with ids `v1..=vcount`, all children of item `1`.
    pub fn with_secondary(self, data_type: DataType, count: usize) -> Self {
        let items = (1..=count)
            .map(|i| {
                SourceItem::new(format!("v{i}"), serde_json::json!({"id": format!("v{i}")}))
                    .with_parent("1")
            })
            .collect();
        self.items
            .lock()
            .unwrap()
            .insert((data_type, Collection::Secondary), items);
        self
    }

    /// Make the next call fail with `error`.
    pub fn with_error(self, error: AppError) -> Self {
        *self.error.lock().unwrap() = Some(error);
        self
    }

    /// Run `hook` once, on the first `count` call.
    pub fn on_count(self, hook: impl FnOnce() + Send + 'static) -> Self {
        *self.count_hook.lock().unwrap() = Some(Box::new(hook));
        self
    }

    fn take_error(&self) -> Result<(), AppError> {
        match self.error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl ItemSource for MockSource {
    async fn fetch_page(
        &self,
        data_type: DataType,
        collection: Collection,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<SourceItem>, AppError> {
        self.take_error()?;
        self.fetches
            .lock()
            .unwrap()
            .push((data_type, collection, offset, limit));

        let items = self.items.lock().unwrap();
        Ok(items
            .get(&(data_type, collection))
            .map(|all| {
                all.iter()
                    .skip(offset as usize)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_item(
        &self,
        data_type: DataType,
        item_id: &str,
    ) -> Result<Option<SourceItem>, AppError> {
        self.take_error()?;
        let items = self.items.lock().unwrap();
        Ok([Collection::Primary, Collection::Secondary]
            .iter()
            .filter_map(|c| items.get(&(data_type, *c)))
            .flatten()
            .find(|item| item.id == item_id)
            .cloned())
    }

    async fn count(&self, data_type: DataType, collection: Collection) -> Result<u64, AppError> {
        self.take_error()?;
        let hook = self.count_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        let items = self.items.lock().unwrap();
        Ok(items
            .get(&(data_type, collection))
            .map(|all| all.len() as u64)
            .unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// MockUploader
// ---------------------------------------------------------------------------

/// Recorded upload: (endpoint, payload).
pub type UploadRecord = (String, serde_json::Value);

/// Mock uploader replaying queued responses.
#[derive(Clone)]
pub struct MockUploader {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns `200 {}`.
    responses: Arc<Mutex<VecDeque<Result<ApiResponse, AppError>>>>,
    latency: Duration,
    pub uploads: Arc<Mutex<Vec<UploadRecord>>>,
}

impl MockUploader {
    pub fn ok() -> Self {
        Self::with_responses(vec![])
    }

    pub fn with_codes(codes: &[u16]) -> Self {
        Self::with_responses(
            codes
                .iter()
                .map(|code| Ok(ApiResponse::new(*code, format!("response {code}"))))
                .collect(),
        )
    }

    pub fn with_responses(responses: Vec<Result<ApiResponse, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            latency: Duration::ZERO,
            uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    /// Simulate request time (advances the paused tokio clock in tests).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

impl Uploader for MockUploader {
    async fn upload(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<ApiResponse, AppError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.uploads
            .lock()
            .unwrap()
            .push((endpoint.to_string(), payload.clone()));

        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ApiResponse::new(200, "{}")))
    }
}

// ---------------------------------------------------------------------------
// MockNotices
// ---------------------------------------------------------------------------

/// Notice sink keeping the active set in memory.
#[derive(Clone, Default)]
pub struct MockNotices {
    active: Arc<Mutex<Vec<Notice>>>,
}

impl MockNotices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, notice: Notice) -> bool {
        self.active.lock().unwrap().contains(&notice)
    }
}

impl NoticeSink for MockNotices {
    async fn add(&self, notice: Notice) -> Result<(), AppError> {
        let mut active = self.active.lock().unwrap();
        if !active.contains(&notice) {
            active.push(notice);
        }
        Ok(())
    }

    async fn remove(&self, notice: Notice) -> Result<(), AppError> {
        self.active.lock().unwrap().retain(|n| *n != notice);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Notice>, AppError> {
        Ok(self.active.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// MockJobQueue
// ---------------------------------------------------------------------------

/// Recorded failure: (job_id, error_message, next_retry_at).
pub type FailedJobRecord = (Uuid, String, Option<DateTime<Utc>>);

/// Recorded reschedule: (job_id, run_at).
pub type RescheduledJobRecord = (Uuid, DateTime<Utc>);

/// Mock job queue backed by an in-memory Vec.
#[derive(Clone, Default)]
pub struct MockJobQueue {
    jobs: Arc<Mutex<Vec<ExportJob>>>,
    claim_error: Arc<Mutex<Option<AppError>>>,
    pub failed_jobs: Arc<Mutex<Vec<FailedJobRecord>>>,
    pub completed_jobs: Arc<Mutex<Vec<Uuid>>>,
    pub rescheduled_jobs: Arc<Mutex<Vec<RescheduledJobRecord>>>,
    pub released_workers: Arc<Mutex<Vec<String>>>,
}

impl MockJobQueue {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Queue with one pending job ready to be claimed.
    pub fn with_job(job: ExportJob) -> Self {
        let queue = Self::default();
        queue.jobs.lock().unwrap().push(job);
        queue
    }

    pub fn with_claim_error(error: AppError) -> Self {
        let queue = Self::default();
        *queue.claim_error.lock().unwrap() = Some(error);
        queue
    }

    /// All jobs ever enqueued, in insertion order.
    pub fn jobs(&self) -> Vec<ExportJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn pending(&self) -> Vec<ExportJob> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect()
    }

    fn insert(&self, request: CreateJobRequest) -> ExportJob {
        let now = Utc::now();
        let job = ExportJob {
            id: Uuid::new_v4(),
            hook: request.hook(),
            data_type: request.data_type,
            args: request.args,
            status: JobStatus::Pending,
            scheduled_at: request.scheduled_at,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(3),
            error_message: None,
            worker_id: None,
        };
        self.jobs.lock().unwrap().push(job.clone());
        job
    }

    fn pending_matches(&self, hook: &str, args_signature: Option<&str>) -> bool {
        self.jobs.lock().unwrap().iter().any(|j| {
            j.status == JobStatus::Pending
                && j.hook == hook
                && args_signature.is_none_or(|sig| j.args_signature() == sig)
        })
    }
}

impl JobQueue for MockJobQueue {
    async fn create_job(&self, request: CreateJobRequest) -> Result<ExportJob, AppError> {
        Ok(self.insert(request))
    }

    async fn create_unique_job(
        &self,
        request: CreateJobRequest,
    ) -> Result<Option<ExportJob>, AppError> {
        let signature = request.args_signature();
        if self.pending_matches(&request.hook(), Some(&signature)) {
            return Ok(None);
        }
        Ok(Some(self.insert(request)))
    }

    async fn has_pending(&self, hook: &str, args_signature: Option<&str>) -> Result<bool, AppError> {
        Ok(self.pending_matches(hook, args_signature))
    }

    async fn claim_job(&self, worker_id: &str) -> Result<Option<ExportJob>, AppError> {
        let mut err = self.claim_error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }

        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(pos) = jobs
            .iter()
            .position(|j| j.status == JobStatus::Pending && j.scheduled_at <= now)
        {
            jobs[pos].status = JobStatus::Running;
            jobs[pos].worker_id = Some(worker_id.to_string());
            jobs[pos].started_at = Some(now);
            Ok(Some(jobs[pos].clone()))
        } else {
            Ok(None)
        }
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<(), AppError> {
        self.completed_jobs.lock().unwrap().push(job_id);

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        self.failed_jobs
            .lock()
            .unwrap()
            .push((job_id, error.to_string(), next_retry_at));

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            if let Some(at) = next_retry_at {
                job.status = JobStatus::Pending;
                job.retry_count += 1;
                job.scheduled_at = at;
            } else {
                job.status = JobStatus::Failed;
            }
            job.error_message = Some(error.to_string());
            job.worker_id = None;
        }
        Ok(())
    }

    async fn reschedule_job(&self, job_id: Uuid, run_at: DateTime<Utc>) -> Result<(), AppError> {
        self.rescheduled_jobs.lock().unwrap().push((job_id, run_at));

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Pending;
            job.scheduled_at = run_at;
            job.worker_id = None;
        }
        Ok(())
    }

    async fn cancel_job(&self, job_id: Uuid) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Cancelled;
        }
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ExportJob>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<ExportJob>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        self.released_workers
            .lock()
            .unwrap()
            .push(worker_id.to_string());

        let mut jobs = self.jobs.lock().unwrap();
        let mut count = 0u64;
        for job in jobs.iter_mut() {
            if job.worker_id.as_deref() == Some(worker_id) && job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().filter(|j| j.status == status).count() as i64)
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock worker reporter that records events.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl crate::worker::WorkerReporter for MockReporter {
    fn report(&self, event: crate::worker::WorkerEvent<'_>) {
        let label = match &event {
            crate::worker::WorkerEvent::Started { .. } => "Started",
            crate::worker::WorkerEvent::Polling => "Polling",
            crate::worker::WorkerEvent::JobClaimed { .. } => "JobClaimed",
            crate::worker::WorkerEvent::JobCompleted { .. } => "JobCompleted",
            crate::worker::WorkerEvent::JobRescheduled { .. } => "JobRescheduled",
            crate::worker::WorkerEvent::JobFailed { .. } => "JobFailed",
            crate::worker::WorkerEvent::ShuttingDown { .. } => "ShuttingDown",
            crate::worker::WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a pending job for testing.
pub fn make_test_job(data_type: DataType, args: JobArgs) -> ExportJob {
    let now = Utc::now();
    ExportJob {
        id: Uuid::new_v4(),
        hook: args.hook(data_type),
        data_type,
        args,
        status: JobStatus::Pending,
        scheduled_at: now,
        created_at: now,
        updated_at: now,
        started_at: None,
        completed_at: None,
        retry_count: 0,
        max_retries: 3,
        error_message: None,
        worker_id: None,
    }
}

/// Seed `store` with an in-progress run of `data_type` and return its run id.
pub fn seed_running_export(store: &MockProgressStore, data_type: DataType) -> Uuid {
    let run_id = Uuid::new_v4();
    let mut state = ExportState::new(data_type);
    state.reset(run_id, None, Utc::now());
    state.version = 1;
    store.put(state);
    run_id
}

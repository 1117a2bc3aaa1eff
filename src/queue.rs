//! Queue client: job submission and bounded polling.
//!
//! A job moves through `SUBMITTED -> POLLING` and ends in exactly one of
//! `COMPLETED`, `FAILED`, `CANCELLED`, `TIMED_OUT` or `UNEXPECTED_STATUS`.
//! Each observed status is mapped to a [`PollStep`] by [`next_step`]; the
//! loop in [`QueueClient::wait_for_result`] only performs the I/O and
//! sleeps that step asks for. Time is read from, and sleeping delegated to,
//! the client's [`Clock`](crate::clock::Clock), so the whole machine runs
//! without wall-clock delays under test.
//!
//! Statuses outside the five documented values end the wait with
//! [`Error::UnexpectedStatus`] rather than looping on a state this client
//! does not understand.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    client::ClientInner,
    errors::{Error, Result, ValidationError},
    http::HeaderList,
    identifiers::{ModelId, RequestId, WorkflowId},
    paths::{QueuePath, QueueUrls},
    telemetry::JobStatusMetrics,
    DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL,
};

/// Status reported by the queue for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    /// Any status this client does not know how to progress from.
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::InQueue => "IN_QUEUE",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Other(raw) => raw.as_str(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::InQueue | JobStatus::InProgress)
    }
}

impl From<String> for JobStatus {
    fn from(value: String) -> Self {
        match value.trim() {
            "IN_QUEUE" => JobStatus::InQueue,
            "IN_PROGRESS" => JobStatus::InProgress,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" => JobStatus::Cancelled,
            _ => JobStatus::Other(value),
        }
    }
}

impl From<JobStatus> for String {
    fn from(value: JobStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-invocation wait behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// When false, return right after submission with a `QUEUED` record.
    pub wait_for_completion: bool,
    /// Sleep between status polls (defaults to 5s).
    pub poll_interval: Duration,
    /// Deadline measured from the first poll (defaults to 600s).
    pub max_wait: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            wait_for_completion: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl PollOptions {
    /// Submit only; the caller checks status later.
    pub fn no_wait() -> Self {
        Self {
            wait_for_completion: false,
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SubmitResponse {
    request_id: RequestId,
    #[serde(default)]
    status_url: Option<String>,
    #[serde(default)]
    response_url: Option<String>,
    #[serde(default)]
    cancel_url: Option<String>,
}

/// Accepted submission with every follow-up URL resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSubmission {
    pub request_id: RequestId,
    pub status_url: String,
    pub response_url: String,
    pub cancel_url: String,
}

impl JobSubmission {
    /// Prefer URLs from the queue, deriving any that are missing.
    fn from_response(resp: SubmitResponse, queue_base_url: &str, path: &QueuePath) -> Self {
        let derived = QueueUrls::derive(queue_base_url, &path.base_model_id, &resp.request_id);
        let pick = |given: Option<String>, fallback: String| {
            given
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(fallback)
        };
        Self {
            status_url: pick(resp.status_url, derived.status_url),
            response_url: pick(resp.response_url, derived.response_url),
            cancel_url: pick(resp.cancel_url, derived.cancel_url),
            request_id: resp.request_id,
        }
    }
}

/// Record returned in immediate-return mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedJob {
    pub request_id: RequestId,
    /// Always `"QUEUED"`.
    pub status: &'static str,
    pub model: String,
    pub input: Value,
    pub status_url: String,
    pub response_url: String,
    pub cancel_url: String,
}

impl QueuedJob {
    fn new(job: JobSubmission, model: &str, input: Value) -> Self {
        Self {
            request_id: job.request_id,
            status: "QUEUED",
            model: model.to_string(),
            input,
            status_url: job.status_url,
            response_url: job.response_url,
            cancel_url: job.cancel_url,
        }
    }
}

/// Body of a status poll.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub request_id: Option<RequestId>,
    #[serde(default)]
    pub response_url: Option<String>,
    #[serde(default)]
    pub queue_position: Option<u64>,
    #[serde(default)]
    pub logs: Option<Value>,
}

/// What the loop does after observing one status.
#[derive(Debug)]
pub enum PollStep {
    /// Still queued or running: sleep, then poll again.
    Wait,
    /// Done: fetch the result from this URL.
    FetchResult(String),
    /// Terminal failure; stop polling.
    Fail(Error),
}

/// Transition for one observed status.
pub fn next_step(status: &StatusResponse, job: &JobSubmission) -> PollStep {
    match &status.status {
        JobStatus::InQueue | JobStatus::InProgress => PollStep::Wait,
        JobStatus::Completed => PollStep::FetchResult(
            status
                .response_url
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(&job.response_url)
                .to_string(),
        ),
        JobStatus::Failed | JobStatus::Cancelled => PollStep::Fail(Error::JobFailed {
            request_id: job.request_id.clone(),
            status: status.status.clone(),
        }),
        JobStatus::Other(raw) => PollStep::Fail(Error::UnexpectedStatus {
            request_id: job.request_id.clone(),
            status: raw.clone(),
        }),
    }
}

/// Merge a completed result with the identifiers of the job that produced it.
pub fn merge_result(result: Value, request_id: &RequestId, model: &str) -> Value {
    let mut merged = match result {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    merged.insert(
        "request_id".to_string(),
        Value::String(request_id.to_string()),
    );
    merged.insert("model".to_string(), Value::String(model.to_string()));
    Value::Object(merged)
}

/// Client for the fal queue (`https://queue.fal.run`).
#[derive(Clone)]
pub struct QueueClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl QueueClient {
    /// Submit `input` to a model endpoint.
    pub async fn submit(&self, model_id: &ModelId, input: &Value) -> Result<JobSubmission> {
        model_id.validate()?;
        let path = QueuePath::for_model(model_id);
        self.submit_to(&path, model_id.as_str(), input).await
    }

    /// Submit `input` to a workflow (`POST /workflows/{namespace}/{name}`).
    pub async fn submit_workflow(
        &self,
        workflow_id: &WorkflowId,
        input: &Value,
    ) -> Result<JobSubmission> {
        let path = QueuePath::for_workflow_id(workflow_id)?;
        self.submit_to(&path, workflow_id.as_str(), input).await
    }

    async fn submit_to(&self, path: &QueuePath, model: &str, input: &Value) -> Result<JobSubmission> {
        if !input.is_object() {
            return Err(Error::Validation(
                ValidationError::new("input must be a JSON object").with_field("parameters"),
            ));
        }
        let builder = self
            .inner
            .queue_request(Method::POST, &path.submit_path)?
            .json(input);
        let builder =
            self.inner
                .with_headers(builder, &HeaderList::default(), Some("application/json"))?;
        let builder = self.inner.with_timeout(builder, None);
        let ctx = self
            .inner
            .make_context(&Method::POST, &path.submit_path, Some(model));
        let resp: SubmitResponse = self.inner.execute_json(builder, ctx).await?;
        let job = JobSubmission::from_response(resp, self.inner.queue_base_url(), path);
        #[cfg(feature = "tracing")]
        tracing::info!(
            request_id = %job.request_id,
            model,
            submit_path = %path.submit_path,
            "job submitted"
        );
        Ok(job)
    }

    /// Current status of a submitted job.
    pub async fn status(&self, job: &JobSubmission) -> Result<StatusResponse> {
        let builder = self.inner.queue_request(Method::GET, &job.status_url)?;
        let builder =
            self.inner
                .with_headers(builder, &HeaderList::default(), Some("application/json"))?;
        let builder = self.inner.with_timeout(builder, None);
        let ctx = self
            .inner
            .make_context(&Method::GET, &job.status_url, None)
            .with_request_id(Some(job.request_id.to_string()));
        self.inner.execute_json(builder, ctx).await
    }

    /// Result payload of a completed job.
    pub async fn result(&self, response_url: &str) -> Result<Value> {
        let builder = self.inner.queue_request(Method::GET, response_url)?;
        let builder =
            self.inner
                .with_headers(builder, &HeaderList::default(), Some("application/json"))?;
        let builder = self.inner.with_timeout(builder, None);
        let ctx = self.inner.make_context(&Method::GET, response_url, None);
        self.inner.execute_json(builder, ctx).await
    }

    /// Ask the queue to cancel a job that has not started yet.
    pub async fn cancel(&self, job: &JobSubmission) -> Result<Value> {
        let builder = self.inner.queue_request(Method::PUT, &job.cancel_url)?;
        let builder =
            self.inner
                .with_headers(builder, &HeaderList::default(), Some("application/json"))?;
        let builder = self.inner.with_timeout(builder, None);
        let ctx = self
            .inner
            .make_context(&Method::PUT, &job.cancel_url, None)
            .with_request_id(Some(job.request_id.to_string()));
        self.inner.execute_json(builder, ctx).await
    }

    /// Submit to a model and, unless disabled, wait for its result.
    pub async fn run(&self, model_id: &ModelId, input: Value, opts: PollOptions) -> Result<Value> {
        let job = self.submit(model_id, &input).await?;
        self.finish(job, model_id, input, opts).await
    }

    /// Submit to a workflow and, unless disabled, wait for its result.
    pub async fn run_workflow(
        &self,
        workflow_id: &WorkflowId,
        input: Value,
        opts: PollOptions,
    ) -> Result<Value> {
        let job = self.submit_workflow(workflow_id, &input).await?;
        let label = ModelId::new(workflow_id.as_str());
        self.finish(job, &label, input, opts).await
    }

    async fn finish(
        &self,
        job: JobSubmission,
        model: &ModelId,
        input: Value,
        opts: PollOptions,
    ) -> Result<Value> {
        if !opts.wait_for_completion {
            let queued = QueuedJob::new(job, model.as_str(), input);
            return serde_json::to_value(queued).map_err(Error::Serialization);
        }
        self.wait_for_result(&job, model, opts).await
    }

    /// Poll until the job completes, fails, or `opts.max_wait` elapses.
    pub async fn wait_for_result(
        &self,
        job: &JobSubmission,
        model: &ModelId,
        opts: PollOptions,
    ) -> Result<Value> {
        let clock = self.inner.clock.clone();
        let start: Instant = clock.now();
        let mut polls: u32 = 0;

        loop {
            let status = self.status(job).await?;
            polls += 1;
            self.inner.telemetry.record_job_status(JobStatusMetrics {
                request_id: job.request_id.clone(),
                model: model.clone(),
                status: status.status.clone(),
                poll: polls,
                elapsed: clock.now().saturating_duration_since(start),
                queue_position: status.queue_position,
            });

            match next_step(&status, job) {
                PollStep::Wait => clock.sleep(opts.poll_interval).await,
                PollStep::FetchResult(url) => {
                    let result = self.result(&url).await?;
                    #[cfg(feature = "tracing")]
                    tracing::info!(request_id = %job.request_id, polls, "job completed");
                    return Ok(merge_result(result, &job.request_id, model.as_str()));
                }
                PollStep::Fail(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(request_id = %job.request_id, error = %err, "job ended without result");
                    return Err(err);
                }
            }

            if clock.now().saturating_duration_since(start) >= opts.max_wait {
                break;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(request_id = %job.request_id, polls, "gave up waiting for job");
        Err(Error::Timeout {
            request_id: job.request_id.clone(),
            waited: opts.max_wait,
        })
    }
}

use std::{fmt, sync::Arc, time::Duration};

use crate::{
    identifiers::{ModelId, RequestId},
    queue::JobStatus,
};

/// User-provided callbacks for emitting metrics without taking on a metrics dependency.
#[derive(Clone, Default)]
pub struct MetricsCallbacks {
    pub http_request: Option<Arc<dyn Fn(HttpRequestMetrics) + Send + Sync>>,
    pub job_status: Option<Arc<dyn Fn(JobStatusMetrics) + Send + Sync>>,
}

impl fmt::Debug for MetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCallbacks")
            .field(
                "http_request",
                &self.http_request.as_ref().map(|_| "callback"),
            )
            .field("job_status", &self.job_status.as_ref().map(|_| "callback"))
            .finish()
    }
}

/// Common request metadata shared by all telemetry events.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub model: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        if let Some(id) = request_id {
            if !id.trim().is_empty() {
                self.request_id = Some(id);
            }
        }
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// HTTP request latency and outcome.
#[derive(Clone, Debug)]
pub struct HttpRequestMetrics {
    pub latency: Duration,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub context: RequestContext,
}

/// One observed queue status while waiting on a job.
#[derive(Clone, Debug)]
pub struct JobStatusMetrics {
    pub request_id: RequestId,
    pub model: ModelId,
    pub status: JobStatus,
    /// 1-indexed status poll count.
    pub poll: u32,
    pub elapsed: Duration,
    pub queue_position: Option<u64>,
}

/// Internal helper that owns the registered callbacks (if any).
#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    callbacks: MetricsCallbacks,
}

impl Telemetry {
    pub fn new(callbacks: Option<MetricsCallbacks>) -> Self {
        Self {
            callbacks: callbacks.unwrap_or_default(),
        }
    }

    pub fn http_enabled(&self) -> bool {
        self.callbacks.http_request.is_some()
    }

    pub fn record_http(&self, metrics: HttpRequestMetrics) {
        if let Some(cb) = &self.callbacks.http_request {
            cb(metrics);
        }
    }

    pub fn record_job_status(&self, metrics: JobStatusMetrics) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            request_id = %metrics.request_id,
            model = %metrics.model,
            status = %metrics.status,
            poll = metrics.poll,
            elapsed_ms = metrics.elapsed.as_millis() as u64,
            queue_position = ?metrics.queue_position,
            "queue status"
        );
        if let Some(cb) = &self.callbacks.job_status {
            cb(metrics);
        }
    }
}

//! Execution core of a fal.ai workflow node.
//!
//! Submits generation jobs to the fal queue, polls them to completion under a
//! deadline, discovers model and workflow parameter schemas, and reads usage,
//! analytics, pricing and request history from the platform API. [`Node`]
//! routes host items to those operations and returns one record per item.
//!
//! ```ignore
//! use fal_node::{Client, ModelId, PollOptions};
//! use serde_json::json;
//!
//! let client = Client::from_api_key(std::env::var("FAL_KEY")?)?;
//! let result = client
//!     .queue()
//!     .run(&ModelId::new("fal-ai/flux/dev"), json!({ "prompt": "a red fox" }), PollOptions::default())
//!     .await?;
//! ```
#![allow(clippy::result_large_err)]

use std::time::Duration;

/// Default platform API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.fal.ai";

/// Default queue base URL.
pub const DEFAULT_QUEUE_BASE_URL: &str = "https://queue.fal.run";

/// Default User-Agent header value.
pub(crate) const DEFAULT_CLIENT_HEADER: &str = concat!("fal-node-rust/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval between queue status polls (5 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default deadline for waiting on a queued job (10 minutes).
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);

/// HTTP header carrying the queue request id.
pub const REQUEST_ID_HEADER: &str = "x-fal-request-id";

/// Authorization scheme for fal API keys (`Authorization: Key <key>`).
pub(crate) const AUTHORIZATION_SCHEME: &str = "Key";

mod cache;
mod client;
mod clock;
mod errors;
mod http;
mod identifiers;
mod models;
mod node;
pub mod options;
mod paths;
mod queue;
mod requests;
mod schema;
mod telemetry;
pub mod testing;
mod workflows;

pub use cache::{SchemaCache, SCHEMA_CACHE_TTL};
pub use client::{Client, Config};
pub use clock::{BoxFuture, Clock, ManualClock, SystemClock};
pub use errors::{
    APIError, Error, NormalizedError, Result, TransportError, TransportErrorKind, ValidationError,
};
pub use http::{HeaderEntry, HeaderList, QueryParams};
pub use identifiers::{ModelId, RequestId, WorkflowId};
pub use models::{ModelMetadata, ModelSearch, ModelSummary, ModelsClient, ModelsPage, UsageQuery};
pub use node::{
    sniff_value, ExecutionOptions, ItemConfig, Node, Operation, OutputRecord, ParameterValue,
    TimeRange,
};
pub use paths::{QueuePath, QueueUrls};
pub use queue::{
    merge_result, next_step, JobStatus, JobSubmission, PollOptions, PollStep, QueueClient,
    QueuedJob, StatusResponse,
};
pub use requests::{RequestsClient, RequestsQuery};
pub use schema::{parse_openapi_parameters, ModelDescriptor, ParameterDescriptor, ParameterType};
pub use telemetry::{HttpRequestMetrics, JobStatusMetrics, MetricsCallbacks, RequestContext};
pub use workflows::{WorkflowSearch, WorkflowSummary, WorkflowsClient, WorkflowsPage};

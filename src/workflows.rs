use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    client::ClientInner,
    errors::Result,
    http::{HeaderList, QueryParams},
    identifiers::WorkflowId,
    queue::{PollOptions, QueueClient},
    schema::{ModelDescriptor, ParameterDescriptor},
};

/// Filters for `GET /v1/workflows`.
#[derive(Debug, Clone, Default)]
pub struct WorkflowSearch {
    pub query: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

/// One workflow in a listing. Unknown fields are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owner namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_nickname: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkflowSummary {
    /// `owner/name` when the owner is known, else the bare name.
    pub fn workflow_id(&self) -> WorkflowId {
        match self.user_nickname.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(owner) => WorkflowId::new(format!("{owner}/{}", self.name)),
            None => WorkflowId::new(self.name.as_str()),
        }
    }
}

/// One page of workflows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowsPage {
    pub workflows: Vec<WorkflowSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// The listing endpoint answers either with a bare array or a paginated wrapper.
#[derive(Deserialize)]
#[serde(untagged)]
enum WorkflowsListResponse {
    Bare(Vec<WorkflowSummary>),
    Wrapped {
        workflows: Vec<WorkflowSummary>,
        #[serde(default)]
        next_cursor: Option<String>,
        #[serde(default)]
        has_more: bool,
    },
}

impl From<WorkflowsListResponse> for WorkflowsPage {
    fn from(resp: WorkflowsListResponse) -> Self {
        let mut page = match resp {
            WorkflowsListResponse::Bare(workflows) => WorkflowsPage {
                workflows,
                ..Default::default()
            },
            WorkflowsListResponse::Wrapped {
                workflows,
                next_cursor,
                has_more,
            } => WorkflowsPage {
                workflows,
                next_cursor,
                has_more,
            },
        };
        // Entries without a name cannot be addressed.
        page.workflows.retain(|w| !w.name.trim().is_empty());
        page
    }
}

#[derive(Clone)]
pub struct WorkflowsClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl WorkflowsClient {
    pub async fn list(&self, search: &WorkflowSearch) -> Result<WorkflowsPage> {
        let mut qs = QueryParams::new();
        qs.push_opt("search", search.query.as_deref());
        qs.push_opt("limit", search.limit);
        qs.push_opt("cursor", search.cursor.as_deref());
        let resp: WorkflowsListResponse = self.get_json("/v1/workflows", &qs, None).await?;
        Ok(resp.into())
    }

    /// Workflow details, unwrapped from `{"workflow": ...}` when the API wraps them.
    pub async fn get(&self, workflow_id: &WorkflowId) -> Result<Value> {
        workflow_id.validate()?;
        let path = format!("/v1/workflows/{}", workflow_id.as_str());
        let mut body: Value = self
            .get_json(&path, &QueryParams::default(), Some(workflow_id.as_str()))
            .await?;
        if body.get("workflow").is_some_and(Value::is_object) {
            return Ok(body["workflow"].take());
        }
        Ok(body)
    }

    /// Parsed input/output schema; `None` when the workflow declares none.
    pub async fn schema(&self, workflow_id: &WorkflowId) -> Result<Option<ModelDescriptor>> {
        let body = self.get(workflow_id).await?;
        Ok(ModelDescriptor::from_workflow(workflow_id.as_str(), &body))
    }

    /// Input parameters for a parameter picker; failures degrade to an empty list.
    pub async fn list_parameters(&self, workflow_id: &WorkflowId) -> Vec<ParameterDescriptor> {
        match self.schema(workflow_id).await {
            Ok(Some(descriptor)) => descriptor.input_parameters,
            Ok(None) => Vec::new(),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(workflow = %workflow_id, error = %_err, "workflow schema lookup failed");
                Vec::new()
            }
        }
    }

    /// Submit a workflow run through the queue. The id is validated before
    /// anything is sent.
    pub async fn run(
        &self,
        workflow_id: &WorkflowId,
        input: Value,
        opts: PollOptions,
    ) -> Result<Value> {
        workflow_id.validate()?;
        let queue = QueueClient {
            inner: self.inner.clone(),
        };
        queue.run_workflow(workflow_id, input, opts).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &QueryParams,
        model: Option<&str>,
    ) -> Result<T> {
        let builder = self.inner.api_request(Method::GET, path, query)?;
        let builder =
            self.inner
                .with_headers(builder, &HeaderList::default(), Some("application/json"))?;
        let builder = self.inner.with_timeout(builder, None);
        let ctx = self.inner.make_context(&Method::GET, path, model);
        self.inner.execute_json(builder, ctx).await
    }
}

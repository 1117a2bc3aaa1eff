//! Model catalog, pricing, usage and analytics endpoints.
//!
//! Schema lookups go through the client's [`SchemaCache`](crate::cache::SchemaCache);
//! everything else is a single uncached request.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    client::ClientInner,
    errors::Result,
    http::{HeaderList, QueryParams},
    identifiers::ModelId,
    schema::{ModelDescriptor, ParameterDescriptor},
};

/// Filters for `GET /v1/models`.
#[derive(Debug, Clone, Default)]
pub struct ModelSearch {
    pub query: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

impl ModelSearch {
    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    fn to_query(&self) -> QueryParams {
        let mut qs = QueryParams::new();
        qs.push_opt("q", self.query.as_deref());
        qs.push_opt("category", self.category.as_deref());
        qs.push_opt("status", self.status.as_deref());
        qs.push_opt("limit", self.limit);
        qs.push_opt("cursor", self.cursor.as_deref());
        qs
    }
}

/// Display metadata attached to a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One catalog entry. Unknown fields are kept so output stays lossless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub endpoint_id: String,
    #[serde(default)]
    pub metadata: ModelMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of catalog results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsPage {
    #[serde(default)]
    pub models: Vec<ModelSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

/// Time-windowed query shared by the usage and analytics endpoints.
#[derive(Debug, Clone, Default)]
pub struct UsageQuery {
    /// Repeated as `endpoint_id=` query parameters.
    pub endpoint_ids: Vec<String>,
    /// RFC 3339 lower bound.
    pub start: Option<String>,
    /// RFC 3339 upper bound.
    pub end: Option<String>,
    /// Aggregation bucket, e.g. `hour` or `day`.
    pub timeframe: Option<String>,
    /// Repeated as `expand=` query parameters.
    pub expand: Vec<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

impl UsageQuery {
    fn to_query(&self) -> QueryParams {
        let mut qs = QueryParams::new();
        qs.push_all("endpoint_id", &self.endpoint_ids);
        qs.push_opt("start", self.start.as_deref());
        qs.push_opt("end", self.end.as_deref());
        qs.push_opt("timeframe", self.timeframe.as_deref());
        qs.push_all("expand", &self.expand);
        qs.push_opt("limit", self.limit);
        qs.push_opt("cursor", self.cursor.as_deref());
        qs
    }
}

/// Client for the `/v1/models` family of endpoints.
#[derive(Clone)]
pub struct ModelsClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ModelsClient {
    /// Search the model catalog.
    pub async fn search(&self, search: &ModelSearch) -> Result<ModelsPage> {
        self.get_json("/v1/models", &search.to_query(), None).await
    }

    /// Fetch and parse the OpenAPI schema of one endpoint, bypassing the cache.
    ///
    /// Returns `None` when the endpoint has no usable schema.
    pub async fn describe(&self, model_id: &ModelId) -> Result<Option<ModelDescriptor>> {
        model_id.validate()?;
        let mut qs = QueryParams::new();
        qs.push("endpoint_id", model_id.as_str());
        qs.push("expand", "openapi-3.0");
        let body: Value = self
            .get_json("/v1/models", &qs, Some(model_id.as_str()))
            .await?;
        Ok(ModelDescriptor::from_models_response(model_id.as_str(), &body))
    }

    /// Cached descriptor for `model_id`.
    ///
    /// An endpoint without a usable schema yields an empty descriptor, which
    /// is not cached.
    pub async fn parameters(&self, model_id: &ModelId) -> Result<Arc<ModelDescriptor>> {
        model_id.validate()?;
        let cached = self
            .inner
            .schema_cache
            .get_or_fetch(model_id, || self.describe(model_id))
            .await?;
        Ok(cached.unwrap_or_else(|| Arc::new(ModelDescriptor::unknown(model_id.as_str()))))
    }

    /// Input parameters for a parameter picker; failures degrade to an empty list.
    pub async fn list_parameters(&self, model_id: &ModelId) -> Vec<ParameterDescriptor> {
        match self.parameters(model_id).await {
            Ok(descriptor) => descriptor.input_parameters.clone(),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(model = %model_id, error = %_err, "schema lookup failed; no parameters listed");
                Vec::new()
            }
        }
    }

    /// Unit pricing for the given endpoints.
    pub async fn pricing(&self, endpoint_ids: &[String]) -> Result<Value> {
        let mut qs = QueryParams::new();
        qs.push_all("endpoint_id", endpoint_ids);
        self.get_json("/v1/models/pricing", &qs, None).await
    }

    /// Request counts and latency statistics.
    pub async fn analytics(&self, query: &UsageQuery) -> Result<Value> {
        self.get_json("/v1/models/analytics", &query.to_query(), None)
            .await
    }

    /// Billed usage. Requires an admin-scoped key.
    pub async fn usage(&self, query: &UsageQuery) -> Result<Value> {
        self.get_json("/v1/models/usage", &query.to_query(), None)
            .await
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

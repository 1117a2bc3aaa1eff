//! Request history for an endpoint and payload deletion.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::{
    client::ClientInner,
    errors::{Result, ValidationError},
    http::{HeaderList, QueryParams},
    identifiers::RequestId,
};

/// Filters for `GET /v1/models/requests/by-endpoint`.
#[derive(Debug, Clone, Default)]
pub struct RequestsQuery {
    /// Endpoint whose requests are listed. Required.
    pub endpoint_id: String,
    pub start: Option<String>,
    pub end: Option<String>,
    /// e.g. `success` or `error`.
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

impl RequestsQuery {
    pub fn for_endpoint(endpoint_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            ..Default::default()
        }
    }

    fn to_query(&self) -> Result<QueryParams> {
        if self.endpoint_id.trim().is_empty() {
            return Err(ValidationError::new("endpoint id is required")
                .with_field("endpointId")
                .into());
        }
        let mut qs = QueryParams::new();
        qs.push("endpoint_id", self.endpoint_id.as_str());
        qs.push_opt("start", self.start.as_deref());
        qs.push_opt("end", self.end.as_deref());
        qs.push_opt("status", self.status.as_deref());
        qs.push_opt("limit", self.limit);
        qs.push_opt("cursor", self.cursor.as_deref());
        Ok(qs)
    }
}

#[derive(Clone)]
pub struct RequestsClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl RequestsClient {
    /// List past requests made to one endpoint.
    pub async fn list_by_endpoint(&self, query: &RequestsQuery) -> Result<Value> {
        let qs = query.to_query()?;
        let path = "/v1/models/requests/by-endpoint";
        let builder = self.inner.api_request(Method::GET, path, &qs)?;
        let builder =
            self.inner
                .with_headers(builder, &HeaderList::default(), Some("application/json"))?;
        let builder = self.inner.with_timeout(builder, None);
        let ctx = self
            .inner
            .make_context(&Method::GET, path, Some(query.endpoint_id.as_str()));
        self.inner.execute_json(builder, ctx).await
    }

    /// Delete the stored input and output payloads of a request.
    ///
    /// Requires an admin-scoped key; a permission failure surfaces as
    /// [`Error::Api`](crate::Error::Api).
    pub async fn delete_payloads(&self, request_id: &RequestId) -> Result<Value> {
        if request_id.is_empty() {
            return Err(ValidationError::new("request id is required")
                .with_field("requestId")
                .into());
        }
        let path = format!("/v1/models/requests/{}/payloads", request_id.as_str().trim());
        let builder = self
            .inner
            .api_request(Method::DELETE, &path, &QueryParams::default())?;
        let builder =
            self.inner
                .with_headers(builder, &HeaderList::default(), Some("application/json"))?;
        let builder = self.inner.with_timeout(builder, None);
        let ctx = self
            .inner
            .make_context(&Method::DELETE, &path, None)
            .with_request_id(Some(request_id.to_string()));
        self.inner.execute_json(builder, ctx).await
    }
}

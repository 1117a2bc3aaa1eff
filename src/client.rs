use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{
    header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT},
    Method,
};
use serde::de::DeserializeOwned;

use crate::{
    cache::SchemaCache,
    clock::{Clock, SystemClock},
    errors::{Error, Result, TransportError, TransportErrorKind},
    http::{parse_api_error_parts, request_id_from_headers, HeaderList, QueryParams},
    models::ModelsClient,
    queue::QueueClient,
    requests::RequestsClient,
    telemetry::{HttpRequestMetrics, MetricsCallbacks, RequestContext, Telemetry},
    workflows::WorkflowsClient,
    AUTHORIZATION_SCHEME, DEFAULT_API_BASE_URL, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_QUEUE_BASE_URL, DEFAULT_REQUEST_TIMEOUT,
};

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// fal API key, sent as `Authorization: Key <api_key>`.
    pub api_key: Option<String>,
    /// Platform API base (defaults to `https://api.fal.ai`).
    pub api_base_url: Option<String>,
    /// Queue base (defaults to `https://queue.fal.run`).
    pub queue_base_url: Option<String>,
    pub client_header: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the per-request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Default extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    /// Optional metrics callbacks (HTTP latency, queue status observations).
    pub metrics: Option<MetricsCallbacks>,
    /// Time source for polling deadlines and sleeps (defaults to the system clock).
    pub clock: Option<Arc<dyn Clock>>,
    /// Schema cache (defaults to the process-wide cache).
    pub schema_cache: Option<Arc<SchemaCache>>,
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    api_base_url: String,
    queue_base_url: String,
    api_key: String,
    client_header: String,
    http: reqwest::Client,
    request_timeout: Duration,
    default_headers: Option<HeaderList>,
    pub(crate) telemetry: Telemetry,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) schema_cache: Arc<SchemaCache>,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let api_key = cfg
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("api key is required".to_string()))?;

        let api_base_url = normalize_base(cfg.api_base_url, DEFAULT_API_BASE_URL)?;
        let queue_base_url = normalize_base(cfg.queue_base_url, DEFAULT_QUEUE_BASE_URL)?;

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|err| TransportError {
                    kind: TransportErrorKind::Connect,
                    message: "failed to build http client".to_string(),
                    source: Some(err),
                })?,
        };

        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLIENT_HEADER.to_string());

        Ok(Self {
            inner: Arc::new(ClientInner {
                api_base_url,
                queue_base_url,
                api_key,
                client_header,
                http,
                request_timeout,
                default_headers: cfg.default_headers,
                telemetry: Telemetry::new(cfg.metrics),
                clock: cfg
                    .clock
                    .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>),
                schema_cache: cfg.schema_cache.unwrap_or_else(SchemaCache::global),
            }),
        })
    }

    /// Client with default endpoints for the given API key.
    pub fn from_api_key(api_key: impl Into<String>) -> Result<Self> {
        Self::new(Config {
            api_key: Some(api_key.into()),
            ..Default::default()
        })
    }

    pub fn models(&self) -> ModelsClient {
        ModelsClient {
            inner: self.inner.clone(),
        }
    }

    pub fn queue(&self) -> QueueClient {
        QueueClient {
            inner: self.inner.clone(),
        }
    }

    pub fn requests(&self) -> RequestsClient {
        RequestsClient {
            inner: self.inner.clone(),
        }
    }

    pub fn workflows(&self) -> WorkflowsClient {
        WorkflowsClient {
            inner: self.inner.clone(),
        }
    }

    /// Schema cache used by this client.
    pub fn schema_cache(&self) -> Arc<SchemaCache> {
        self.inner.schema_cache.clone()
    }
}

fn normalize_base(configured: Option<String>, default: &str) -> Result<String> {
    let base = configured
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());
    let base = base.trim().trim_end_matches('/').to_string();
    reqwest::Url::parse(&base).map_err(|err| Error::Config(format!("invalid base url: {err}")))?;
    Ok(base)
}

fn apply_header_list(
    mut builder: reqwest::RequestBuilder,
    headers: &HeaderList,
) -> Result<reqwest::RequestBuilder> {
    for entry in headers.iter() {
        if !entry.is_valid() {
            continue;
        }
        let name = HeaderName::from_bytes(entry.key.trim().as_bytes())
            .map_err(|err| Error::Config(format!("invalid header name: {err}")))?;
        let val = HeaderValue::from_str(entry.value.trim())
            .map_err(|err| Error::Config(format!("invalid header value: {err}")))?;
        builder = builder.header(name, val);
    }
    Ok(builder)
}

impl ClientInner {
    pub(crate) fn queue_base_url(&self) -> &str {
        &self.queue_base_url
    }

    /// Request against the platform API (`/v1/...`).
    pub(crate) fn api_request(
        &self,
        method: Method,
        path: &str,
        query: &QueryParams,
    ) -> Result<reqwest::RequestBuilder> {
        let url = join_url(&self.api_base_url, path)?;
        Ok(self.prepare(method, url, query))
    }

    /// Request against the queue; absolute URLs (status/response/cancel) are used as-is.
    pub(crate) fn queue_request(&self, method: Method, path_or_url: &str) -> Result<reqwest::RequestBuilder> {
        let url = if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            reqwest::Url::parse(path_or_url).map_err(|err| Error::Config(err.to_string()))?
        } else {
            join_url(&self.queue_base_url, path_or_url)?
        };
        Ok(self.prepare(method, url, &QueryParams::default()))
    }

    fn prepare(&self, method: Method, url: reqwest::Url, query: &QueryParams) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        if query.is_empty() {
            builder
        } else {
            builder.query(query.pairs())
        }
    }

    pub(crate) fn with_headers(
        &self,
        mut builder: reqwest::RequestBuilder,
        headers: &HeaderList,
        accept: Option<&str>,
    ) -> Result<reqwest::RequestBuilder> {
        if let Some(accept) = accept {
            builder = builder.header(ACCEPT, accept);
        }
        builder = builder.header(USER_AGENT, self.client_header.as_str());
        builder = builder.header(
            AUTHORIZATION,
            format!("{AUTHORIZATION_SCHEME} {}", self.api_key),
        );

        if let Some(defaults) = &self.default_headers {
            builder = apply_header_list(builder, defaults)?;
        }
        builder = apply_header_list(builder, headers)?;

        Ok(builder)
    }

    pub(crate) fn with_timeout(
        &self,
        builder: reqwest::RequestBuilder,
        timeout: Option<Duration>,
    ) -> reqwest::RequestBuilder {
        builder.timeout(timeout.unwrap_or(self.request_timeout))
    }

    pub(crate) fn make_context(
        &self,
        method: &Method,
        path: &str,
        model: Option<&str>,
    ) -> RequestContext {
        RequestContext::new(method.as_str(), path).with_model(model.map(str::to_string))
    }

    /// Build, send and decode a JSON request in one step.
    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        ctx: RequestContext,
    ) -> Result<T> {
        let resp = self.send(builder, ctx).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| self.to_transport_error(err))?;
        if bytes.is_empty() {
            return serde_json::from_slice::<T>(b"null").map_err(Error::Serialization);
        }
        let parsed = serde_json::from_slice::<T>(&bytes).map_err(Error::Serialization)?;
        Ok(parsed)
    }

    /// Single-attempt send. Non-2xx responses become normalized `Error::Api`.
    pub(crate) async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        ctx: RequestContext,
    ) -> Result<reqwest::Response> {
        let start = Instant::now();
        #[cfg(feature = "tracing")]
        let result = {
            use tracing::Instrument;
            let span = tracing::debug_span!(
                "fal.http",
                method = %ctx.method,
                path = %ctx.path,
                model = ?ctx.model,
            );
            builder.send().instrument(span).await
        };
        #[cfg(not(feature = "tracing"))]
        let result = builder.send().await;

        match result {
            Ok(resp) => {
                let status = resp.status();
                let mut http_ctx = ctx;
                if http_ctx.request_id.is_none() {
                    http_ctx.request_id = request_id_from_headers(resp.headers());
                }
                if status.is_success() {
                    if self.telemetry.http_enabled() {
                        self.telemetry.record_http(HttpRequestMetrics {
                            latency: start.elapsed(),
                            status: Some(status.as_u16()),
                            error: None,
                            context: http_ctx,
                        });
                    }
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        status = %status,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "request completed"
                    );
                    return Ok(resp);
                }

                let headers = resp.headers().clone();
                if self.telemetry.http_enabled() {
                    self.telemetry.record_http(HttpRequestMetrics {
                        latency: start.elapsed(),
                        status: Some(status.as_u16()),
                        error: Some(format!("http {}", status.as_u16())),
                        context: http_ctx,
                    });
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(status = %status, "request failed; returning error");
                let body = resp.text().await.unwrap_or_default();
                Err(parse_api_error_parts(status, &headers, body))
            }
            Err(err) => {
                if self.telemetry.http_enabled() {
                    self.telemetry.record_http(HttpRequestMetrics {
                        latency: start.elapsed(),
                        status: None,
                        error: Some(err.to_string()),
                        context: ctx,
                    });
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "transport error");
                Err(self.to_transport_error(err))
            }
        }
    }

    pub(crate) fn to_transport_error(&self, err: reqwest::Error) -> Error {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };

        TransportError {
            kind,
            message: err.to_string(),
            source: Some(err),
        }
        .into()
    }
}

/// Append `path` to `base` without dropping any path prefix `base` carries.
fn join_url(base: &str, path: &str) -> Result<reqwest::Url> {
    let url = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    reqwest::Url::parse(&url).map_err(|err| Error::Config(format!("invalid path: {err}")))
}

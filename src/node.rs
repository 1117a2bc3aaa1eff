//! Operation dispatcher for the host node.
//!
//! The host hands over one JSON configuration object per input item. Each is
//! routed by its `resource`/`operation` pair, decoded into an [`ItemConfig`],
//! and answered with exactly one [`OutputRecord`]. Items run strictly in order;
//! with `continue_on_fail` a failing item yields `{"error": ...}` and the
//! batch carries on.

use std::{fmt, time::Duration};

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{
    client::Client,
    errors::{Error, Result, ValidationError},
    identifiers::{ModelId, RequestId, WorkflowId},
    models::{ModelSearch, UsageQuery},
    queue::PollOptions,
    requests::RequestsQuery,
    workflows::WorkflowSearch,
};

/// Resource/operation pairs the node understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Generate,
    GetParameters,
    SearchModels,
    GetPricing,
    GetAnalytics,
    GetUsage,
    ListRequests,
    DeletePayloads,
    RunWorkflow,
    ListWorkflows,
    GetWorkflow,
}

impl Operation {
    /// Map the host's selector pair, rejecting anything unknown before any I/O.
    pub fn parse(resource: &str, operation: &str) -> Result<Self> {
        let op = match (resource.trim(), operation.trim()) {
            ("model", "generate") => Operation::Generate,
            ("model", "getParameters") => Operation::GetParameters,
            ("model", "search") => Operation::SearchModels,
            ("model", "getPricing") => Operation::GetPricing,
            ("analytics", "get") => Operation::GetAnalytics,
            ("usage", "get") => Operation::GetUsage,
            ("request", "list") => Operation::ListRequests,
            ("request", "deletePayloads") => Operation::DeletePayloads,
            ("workflow", "run") => Operation::RunWorkflow,
            ("workflow", "list") => Operation::ListWorkflows,
            ("workflow", "get") => Operation::GetWorkflow,
            _ => {
                return Err(Error::UnknownOperation {
                    resource: resource.to_string(),
                    operation: operation.to_string(),
                })
            }
        };
        Ok(op)
    }

    pub fn resource(&self) -> &'static str {
        match self {
            Operation::Generate
            | Operation::GetParameters
            | Operation::SearchModels
            | Operation::GetPricing => "model",
            Operation::GetAnalytics => "analytics",
            Operation::GetUsage => "usage",
            Operation::ListRequests | Operation::DeletePayloads => "request",
            Operation::RunWorkflow | Operation::ListWorkflows | Operation::GetWorkflow => {
                "workflow"
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Generate => "generate",
            Operation::GetParameters => "getParameters",
            Operation::SearchModels => "search",
            Operation::GetPricing => "getPricing",
            Operation::GetAnalytics | Operation::GetUsage => "get",
            Operation::ListRequests => "list",
            Operation::DeletePayloads => "deletePayloads",
            Operation::RunWorkflow => "run",
            Operation::ListWorkflows => "list",
            Operation::GetWorkflow => "get",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource(), self.name())
    }
}

/// One `{parameterName, value}` row of the free-form parameter list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValue {
    #[serde(default)]
    pub parameter_name: String,
    #[serde(default)]
    pub value: Value,
}

/// Wait settings as entered in the host, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionOptions {
    pub wait_for_completion: Option<bool>,
    pub poll_interval: Option<u64>,
    pub max_wait_time: Option<u64>,
}

impl ExecutionOptions {
    pub fn poll_options(&self) -> Result<PollOptions> {
        let mut opts = PollOptions::default();
        if let Some(wait) = self.wait_for_completion {
            opts.wait_for_completion = wait;
        }
        if let Some(secs) = self.poll_interval {
            if secs == 0 {
                return Err(ValidationError::new("must be at least 1 second")
                    .with_field("pollInterval")
                    .into());
            }
            opts.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.max_wait_time {
            if secs == 0 {
                return Err(ValidationError::new("must be at least 1 second")
                    .with_field("maxWaitTime")
                    .into());
            }
            opts.max_wait = Duration::from_secs(secs);
        }
        Ok(opts)
    }
}

/// Relative or explicit reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "30m")]
    Last30Minutes,
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "24h")]
    Last24Hours,
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "custom")]
    Custom,
}

impl TimeRange {
    fn span(&self) -> Option<TimeDelta> {
        match self {
            TimeRange::Last30Minutes => Some(TimeDelta::minutes(30)),
            TimeRange::LastHour => Some(TimeDelta::hours(1)),
            TimeRange::Last24Hours => Some(TimeDelta::hours(24)),
            TimeRange::Last7Days => Some(TimeDelta::days(7)),
            TimeRange::Last30Days => Some(TimeDelta::days(30)),
            TimeRange::Custom => None,
        }
    }

    /// Absolute RFC 3339 `(start, end)` bounds.
    ///
    /// Relative ranges end at `now`; `custom` requires both explicit bounds.
    pub fn resolve(
        &self,
        now: DateTime<Utc>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<(String, String)> {
        let (start, end) = match self.span() {
            Some(span) => (now - span, now),
            None => {
                let start = parse_timestamp(start, "startTime")?
                    .ok_or_else(|| required("startTime", "custom time range"))?;
                let end = parse_timestamp(end, "endTime")?
                    .ok_or_else(|| required("endTime", "custom time range"))?;
                if start > end {
                    return Err(ValidationError::new("must not be after endTime")
                        .with_field("startTime")
                        .into());
                }
                (start, end)
            }
        };
        Ok((format_timestamp(start), format_timestamp(end)))
    }
}

fn required(field: &str, context: &str) -> Error {
    ValidationError::new(format!("is required for {context}"))
        .with_field(field)
        .into()
}

fn parse_timestamp(raw: Option<&str>, field: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|err| {
            ValidationError::new(format!("invalid RFC 3339 timestamp {raw:?}: {err}"))
                .with_field(field)
                .into()
        })
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Per-item configuration as supplied by the host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemConfig {
    pub resource: String,
    pub operation: String,
    pub model_id: Option<String>,
    pub workflow_id: Option<String>,
    /// Accepts a bare list or the host's `{"parameter": [...]}` collection.
    #[serde(deserialize_with = "parameter_rows")]
    pub parameters: Vec<ParameterValue>,
    pub options: ExecutionOptions,
    pub time_range: Option<TimeRange>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Endpoint filter; a list or a comma-separated string.
    #[serde(deserialize_with = "string_list")]
    pub endpoint_ids: Vec<String>,
    pub endpoint_id: Option<String>,
    pub query: Option<String>,
    pub category: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    pub request_id: Option<String>,
    pub status: Option<String>,
    pub timeframe: Option<String>,
    #[serde(deserialize_with = "string_list")]
    pub expand: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParameterRows {
    List(Vec<ParameterValue>),
    Collection {
        #[serde(default)]
        parameter: Vec<ParameterValue>,
    },
}

fn parameter_rows<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<ParameterValue>, D::Error> {
    Ok(match Option::<ParameterRows>::deserialize(d)? {
        Some(ParameterRows::List(rows)) => rows,
        Some(ParameterRows::Collection { parameter }) => parameter,
        None => Vec::new(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringList {
    Csv(String),
    List(Vec<String>),
}

fn string_list<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
    let values = match Option::<StringList>::deserialize(d)? {
        Some(StringList::Csv(raw)) => raw.split(',').map(str::to_string).collect(),
        Some(StringList::List(list)) => list,
        None => Vec::new(),
    };
    Ok(values
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

impl ItemConfig {
    fn model_id(&self) -> Result<ModelId> {
        let id = ModelId::new(self.model_id.clone().unwrap_or_default());
        id.validate()?;
        Ok(id)
    }

    fn workflow_id(&self) -> Result<WorkflowId> {
        let id = WorkflowId::new(self.workflow_id.clone().unwrap_or_default());
        id.validate()?;
        Ok(id)
    }

    /// Build the job input from the free-form parameter rows.
    pub fn input(&self) -> Value {
        let mut input = Map::new();
        for row in &self.parameters {
            let name = row.parameter_name.trim();
            if name.is_empty() {
                continue;
            }
            let value = match &row.value {
                Value::String(raw) => sniff_value(raw),
                other => other.clone(),
            };
            input.insert(name.to_string(), value);
        }
        Value::Object(input)
    }

    fn window(&self, now: DateTime<Utc>) -> Result<(Option<String>, Option<String>)> {
        match self.time_range {
            Some(range) => {
                let (start, end) =
                    range.resolve(now, self.start_time.as_deref(), self.end_time.as_deref())?;
                Ok((Some(start), Some(end)))
            }
            None => Ok((
                parse_timestamp(self.start_time.as_deref(), "startTime")?.map(format_timestamp),
                parse_timestamp(self.end_time.as_deref(), "endTime")?.map(format_timestamp),
            )),
        }
    }

    fn usage_query(&self, now: DateTime<Utc>) -> Result<UsageQuery> {
        let (start, end) = self.window(now)?;
        Ok(UsageQuery {
            endpoint_ids: self.endpoint_ids.clone(),
            start,
            end,
            timeframe: self.timeframe.clone(),
            expand: self.expand.clone(),
            limit: self.limit,
            cursor: self.cursor.clone(),
        })
    }
}

/// Interpret a literal parameter value.
///
/// Objects, arrays, booleans and numbers parse as JSON. Everything else,
/// malformed JSON included, stays the literal string.
pub fn sniff_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    let looks_like_json = trimmed.starts_with('{')
        || trimmed.starts_with('[')
        || trimmed == "true"
        || trimmed == "false"
        || trimmed.starts_with(|c: char| c == '-' || c.is_ascii_digit());
    if looks_like_json {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            if !value.is_string() && !value.is_null() {
                return value;
            }
        }
    }
    Value::String(raw.to_string())
}

/// One output record handed back to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub json: Value,
}

impl OutputRecord {
    /// Objects pass through; any other value is wrapped as `{"data": value}`.
    pub fn new(value: Value) -> Self {
        let json = match value {
            Value::Object(_) => value,
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                Value::Object(map)
            }
        };
        Self { json }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("error".to_string(), Value::String(message.into()));
        Self {
            json: Value::Object(map),
        }
    }
}

/// Node execution entry point.
#[derive(Clone)]
pub struct Node {
    client: Client,
    continue_on_fail: bool,
}

impl Node {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            continue_on_fail: false,
        }
    }

    /// Turn per-item failures into `{"error": ...}` records instead of aborting.
    pub fn continue_on_fail(mut self, enabled: bool) -> Self {
        self.continue_on_fail = enabled;
        self
    }

    /// Run every item in order, one output record per item.
    pub async fn execute(&self, items: &[Value]) -> Result<Vec<OutputRecord>> {
        let mut out = Vec::with_capacity(items.len());
        for (_index, item) in items.iter().enumerate() {
            match self.execute_item(item).await {
                Ok(value) => out.push(OutputRecord::new(value)),
                Err(err) if self.continue_on_fail => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(item = _index, error = %err, "item failed; continuing");
                    out.push(OutputRecord::error(error_message(&err)));
                }
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(item = _index, error = %err, "item failed");
                    return Err(err);
                }
            }
        }
        Ok(out)
    }

    /// Decode, route and run one item.
    pub async fn execute_item(&self, item: &Value) -> Result<Value> {
        let selector = |key: &str| item.get(key).and_then(Value::as_str).unwrap_or_default();
        let op = Operation::parse(selector("resource"), selector("operation"))?;
        let cfg = ItemConfig::deserialize(item).map_err(Error::Serialization)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(operation = %op, "dispatching item");
        self.dispatch(op, &cfg).await
    }

    async fn dispatch(&self, op: Operation, cfg: &ItemConfig) -> Result<Value> {
        match op {
            Operation::Generate => {
                let model_id = cfg.model_id()?;
                let opts = cfg.options.poll_options()?;
                self.client.queue().run(&model_id, cfg.input(), opts).await
            }
            Operation::GetParameters => {
                let descriptor = self.client.models().parameters(&cfg.model_id()?).await?;
                serde_json::to_value(&*descriptor).map_err(Error::Serialization)
            }
            Operation::SearchModels => {
                let search = ModelSearch {
                    query: cfg.query.clone(),
                    category: cfg.category.clone(),
                    status: cfg.status.clone(),
                    limit: cfg.limit,
                    cursor: cfg.cursor.clone(),
                };
                let page = self.client.models().search(&search).await?;
                serde_json::to_value(page).map_err(Error::Serialization)
            }
            Operation::GetPricing => {
                let mut endpoint_ids = cfg.endpoint_ids.clone();
                if endpoint_ids.is_empty() {
                    endpoint_ids.extend(cfg.model_id.clone().filter(|s| !s.trim().is_empty()));
                }
                if endpoint_ids.is_empty() {
                    return Err(ValidationError::new("at least one endpoint id is required")
                        .with_field("endpointIds")
                        .into());
                }
                self.client.models().pricing(&endpoint_ids).await
            }
            Operation::GetAnalytics => {
                let query = cfg.usage_query(Utc::now())?;
                self.client.models().analytics(&query).await
            }
            Operation::GetUsage => {
                let query = cfg.usage_query(Utc::now())?;
                self.client.models().usage(&query).await
            }
            Operation::ListRequests => {
                let (start, end) = cfg.window(Utc::now())?;
                let endpoint_id = cfg
                    .endpoint_id
                    .clone()
                    .or_else(|| cfg.endpoint_ids.first().cloned())
                    .or_else(|| cfg.model_id.clone())
                    .unwrap_or_default();
                let query = RequestsQuery {
                    endpoint_id,
                    start,
                    end,
                    status: cfg.status.clone(),
                    limit: cfg.limit,
                    cursor: cfg.cursor.clone(),
                };
                self.client.requests().list_by_endpoint(&query).await
            }
            Operation::DeletePayloads => {
                let request_id = RequestId::new(cfg.request_id.clone().unwrap_or_default());
                self.client.requests().delete_payloads(&request_id).await
            }
            Operation::RunWorkflow => {
                let workflow_id = cfg.workflow_id()?;
                let opts = cfg.options.poll_options()?;
                self.client
                    .workflows()
                    .run(&workflow_id, cfg.input(), opts)
                    .await
            }
            Operation::ListWorkflows => {
                let search = WorkflowSearch {
                    query: cfg.query.clone(),
                    limit: cfg.limit,
                    cursor: cfg.cursor.clone(),
                };
                let page = self.client.workflows().list(&search).await?;
                serde_json::to_value(page).map_err(Error::Serialization)
            }
            Operation::GetWorkflow => self.client.workflows().get(&cfg.workflow_id()?).await,
        }
    }
}

/// Message for an `{"error": ...}` record; upstream failures use the normalized form.
fn error_message(err: &Error) -> String {
    err.normalized()
        .map(|n| n.message)
        .unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_every_supported_pair() {
        let pairs = [
            ("model", "generate", Operation::Generate),
            ("model", "getParameters", Operation::GetParameters),
            ("model", "search", Operation::SearchModels),
            ("model", "getPricing", Operation::GetPricing),
            ("analytics", "get", Operation::GetAnalytics),
            ("usage", "get", Operation::GetUsage),
            ("request", "list", Operation::ListRequests),
            ("request", "deletePayloads", Operation::DeletePayloads),
            ("workflow", "run", Operation::RunWorkflow),
            ("workflow", "list", Operation::ListWorkflows),
            ("workflow", "get", Operation::GetWorkflow),
        ];
        for (resource, operation, expected) in pairs {
            let op = Operation::parse(resource, operation).unwrap();
            assert_eq!(op, expected);
            assert_eq!((op.resource(), op.name()), (resource, operation));
        }
    }

    #[test]
    fn unknown_pair_is_rejected() {
        let err = Operation::parse("model", "explode").unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownOperation { ref resource, ref operation }
                if resource == "model" && operation == "explode"
        ));
        assert!(Operation::parse("usage", "generate").is_err());
    }

    #[test]
    fn sniffs_json_literals() {
        assert_eq!(sniff_value("42"), json!(42));
        assert_eq!(sniff_value("-1.5"), json!(-1.5));
        assert_eq!(sniff_value("true"), json!(true));
        assert_eq!(sniff_value("[1,2]"), json!([1, 2]));
        assert_eq!(sniff_value("{\"a\":1}"), json!({ "a": 1 }));
        assert_eq!(sniff_value("hello"), json!("hello"));
        assert_eq!(sniff_value("{invalid"), json!("{invalid"));
        assert_eq!(sniff_value("1girl, masterpiece"), json!("1girl, masterpiece"));
        assert_eq!(sniff_value("null"), json!("null"));
    }

    #[test]
    fn item_input_accepts_both_parameter_shapes() {
        let list: ItemConfig = serde_json::from_value(json!({
            "parameters": [
                { "parameterName": "prompt", "value": "a cat" },
                { "parameterName": "num_images", "value": "2" },
                { "parameterName": " ", "value": "ignored" }
            ]
        }))
        .unwrap();
        assert_eq!(list.input(), json!({ "prompt": "a cat", "num_images": 2 }));

        let collection: ItemConfig = serde_json::from_value(json!({
            "parameters": { "parameter": [{ "parameterName": "seed", "value": 7 }] }
        }))
        .unwrap();
        assert_eq!(collection.input(), json!({ "seed": 7 }));
    }

    #[test]
    fn endpoint_ids_accept_csv_or_list() {
        let csv: ItemConfig =
            serde_json::from_value(json!({ "endpointIds": "fal-ai/flux/dev, fal-ai/fast-sdxl," }))
                .unwrap();
        assert_eq!(csv.endpoint_ids, vec!["fal-ai/flux/dev", "fal-ai/fast-sdxl"]);

        let list: ItemConfig =
            serde_json::from_value(json!({ "endpointIds": ["fal-ai/flux/dev"] })).unwrap();
        assert_eq!(list.endpoint_ids, vec!["fal-ai/flux/dev"]);
    }

    #[test]
    fn execution_options_override_defaults() {
        let opts = ExecutionOptions {
            wait_for_completion: Some(false),
            poll_interval: Some(2),
            max_wait_time: Some(30),
        }
        .poll_options()
        .unwrap();
        assert!(!opts.wait_for_completion);
        assert_eq!(opts.poll_interval, Duration::from_secs(2));
        assert_eq!(opts.max_wait, Duration::from_secs(30));

        let err = ExecutionOptions {
            poll_interval: Some(0),
            ..Default::default()
        }
        .poll_options()
        .unwrap_err();
        assert!(matches!(err, Error::Validation(v) if v.field.as_deref() == Some("pollInterval")));
    }

    #[test]
    fn relative_ranges_end_now() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let (start, end) = TimeRange::Last24Hours.resolve(now, None, None).unwrap();
        assert_eq!(start, "2026-03-09T12:00:00Z");
        assert_eq!(end, "2026-03-10T12:00:00Z");

        let (start, _) = TimeRange::Last30Minutes.resolve(now, None, None).unwrap();
        assert_eq!(start, "2026-03-10T11:30:00Z");
    }

    #[test]
    fn custom_range_requires_both_bounds() {
        let now = Utc::now();
        let err = TimeRange::Custom
            .resolve(now, Some("2026-03-01T00:00:00Z"), None)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(v) if v.field.as_deref() == Some("endTime")));

        let (start, end) = TimeRange::Custom
            .resolve(now, Some("2026-03-01T02:00:00+02:00"), Some("2026-03-02T00:00:00Z"))
            .unwrap();
        assert_eq!(start, "2026-03-01T00:00:00Z");
        assert_eq!(end, "2026-03-02T00:00:00Z");
    }

    #[test]
    fn custom_range_rejects_inverted_or_malformed_bounds() {
        let now = Utc::now();
        assert!(TimeRange::Custom
            .resolve(now, Some("2026-03-02T00:00:00Z"), Some("2026-03-01T00:00:00Z"))
            .is_err());
        let err = TimeRange::Custom
            .resolve(now, Some("yesterday"), Some("2026-03-01T00:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(v) if v.field.as_deref() == Some("startTime")));
    }

    #[test]
    fn time_range_decodes_from_host_values() {
        let cfg: ItemConfig = serde_json::from_value(json!({ "timeRange": "7d" })).unwrap();
        assert_eq!(cfg.time_range, Some(TimeRange::Last7Days));
    }

    #[test]
    fn non_object_results_are_wrapped() {
        assert_eq!(OutputRecord::new(json!([1])).json, json!({ "data": [1] }));
        assert_eq!(OutputRecord::new(json!({ "a": 1 })).json, json!({ "a": 1 }));
        assert_eq!(OutputRecord::error("boom").json, json!({ "error": "boom" }));
    }
}

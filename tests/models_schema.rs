use std::time::Duration;

use fal_node::{
    options, testing::test_client_with_clock, ModelId, ModelSearch, ParameterType, UsageQuery,
    SCHEMA_CACHE_TTL,
};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn models_response() -> Value {
    json!({
        "models": [{
            "endpoint_id": "fal-ai/flux/dev",
            "metadata": { "display_name": "FLUX.1 [dev]", "category": "text-to-image" },
            "openapi": {
                "components": {
                    "schemas": {
                        "FluxDevInput": {
                            "x-fal-order-properties": ["prompt", "num_images"],
                            "required": ["prompt"],
                            "properties": {
                                "num_images": { "type": "integer", "default": 1 },
                                "prompt": { "type": "string", "title": "Prompt" }
                            }
                        },
                        "FluxDevOutput": {
                            "properties": { "images": { "type": "array" } }
                        }
                    }
                }
            }
        }]
    })
}

async fn mount_schema(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(query_param("endpoint_id", "fal-ai/flux/dev"))
        .and(query_param("expand", "openapi-3.0"))
        .and(header("authorization", "Key fal_test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(models_response()))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn parameters_are_cached_within_ttl() {
    let server = MockServer::start().await;
    let (client, clock) = test_client_with_clock(&server.uri(), &server.uri());
    mount_schema(&server, 1).await;

    let id = ModelId::new("fal-ai/flux/dev");
    let first = client.models().parameters(&id).await.expect("schema");
    clock.advance(SCHEMA_CACHE_TTL - Duration::from_secs(1));
    let second = client.models().parameters(&id).await.expect("cached schema");

    assert_eq!(first, second);
    assert_eq!(first.display_name.as_deref(), Some("FLUX.1 [dev]"));
    let names: Vec<&str> = first.input_parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["prompt", "num_images"]);
    assert!(first.input_parameters[0].required);
    assert_eq!(first.input_parameters[1].param_type, ParameterType::Integer);
    assert_eq!(first.output_parameters[0].param_type, ParameterType::Array);
}

#[tokio::test]
async fn parameters_refetch_after_expiry() {
    let server = MockServer::start().await;
    let (client, clock) = test_client_with_clock(&server.uri(), &server.uri());
    mount_schema(&server, 2).await;

    let id = ModelId::new("fal-ai/flux/dev");
    client.models().parameters(&id).await.expect("schema");
    clock.advance(SCHEMA_CACHE_TTL);
    client.models().parameters(&id).await.expect("refetched schema");
    assert_eq!(client.schema_cache().len(), 1);
}

#[tokio::test]
async fn other_models_schema_is_not_used_or_cached() {
    let server = MockServer::start().await;
    let (client, _clock) = test_client_with_clock(&server.uri(), &server.uri());
    let mut body = models_response();
    body["models"][0]["endpoint_id"] = json!("fal-ai/other");
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(query_param("endpoint_id", "fal-ai/flux/dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let id = ModelId::new("fal-ai/flux/dev");
    let descriptor = client.models().parameters(&id).await.expect("degraded");
    assert_eq!(*descriptor, fal_node::ModelDescriptor::unknown("fal-ai/flux/dev"));
    assert!(client.schema_cache().is_empty());
}

#[tokio::test]
async fn missing_schema_degrades_to_empty_descriptor() {
    let server = MockServer::start().await;
    let (client, _clock) = test_client_with_clock(&server.uri(), &server.uri());
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .expect(2)
        .mount(&server)
        .await;

    let id = ModelId::new("nobody/nothing");
    let descriptor = client.models().parameters(&id).await.expect("degraded");
    assert_eq!(descriptor.model_id, "nobody/nothing");
    assert!(descriptor.input_parameters.is_empty());

    // Unknown schemas are not cached, so the next lookup asks again.
    client.models().parameters(&id).await.expect("degraded");
    assert!(client.schema_cache().is_empty());
}

#[tokio::test]
async fn list_parameters_swallows_upstream_failures() {
    let server = MockServer::start().await;
    let (client, _clock) = test_client_with_clock(&server.uri(), &server.uri());
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "boom" })))
        .mount(&server)
        .await;

    let params = client
        .models()
        .list_parameters(&ModelId::new("fal-ai/flux/dev"))
        .await;
    assert!(params.is_empty());
    let entries = options::parameter_options(&client, &ModelId::new("fal-ai/flux/dev")).await;
    assert!(entries.is_empty());
}

#[tokio::test]
async fn search_sends_filters_and_builds_options() {
    let server = MockServer::start().await;
    let (client, _clock) = test_client_with_clock(&server.uri(), &server.uri());
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(query_param("q", "flux"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "endpoint_id": "fal-ai/flux/dev", "metadata": { "display_name": "FLUX.1 [dev]" } },
                { "endpoint_id": "fal-ai/flux/schnell" }
            ],
            "next_cursor": "abc",
            "has_more": true
        })))
        .expect(2)
        .mount(&server)
        .await;

    let page = client
        .models()
        .search(&ModelSearch::with_query("flux"))
        .await
        .expect("search");
    assert_eq!(page.models.len(), 2);
    assert_eq!(page.next_cursor.as_deref(), Some("abc"));
    assert!(page.has_more);

    let entries = options::model_options(&client, Some("flux")).await.expect("options");
    assert_eq!(entries[0].name, "FLUX.1 [dev]");
    assert_eq!(entries[0].value, "fal-ai/flux/dev");
    assert_eq!(entries[1].name, "fal-ai/flux/schnell");
}

#[tokio::test]
async fn usage_and_pricing_forward_query_params() {
    let server = MockServer::start().await;
    let (client, _clock) = test_client_with_clock(&server.uri(), &server.uri());
    Mock::given(method("GET"))
        .and(path("/v1/models/usage"))
        .and(query_param("endpoint_id", "fal-ai/flux/dev"))
        .and(query_param("start", "2026-03-01T00:00:00Z"))
        .and(query_param("timeframe", "day"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "time_series": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/models/pricing"))
        .and(query_param("endpoint_id", "fal-ai/fast-sdxl"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "prices": [{ "endpoint_id": "fal-ai/fast-sdxl", "unit_price": 0.01 }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let usage = client
        .models()
        .usage(&UsageQuery {
            endpoint_ids: vec!["fal-ai/flux/dev".into()],
            start: Some("2026-03-01T00:00:00Z".into()),
            timeframe: Some("day".into()),
            ..Default::default()
        })
        .await
        .expect("usage");
    assert_eq!(usage, json!({ "time_series": [] }));

    let pricing = client
        .models()
        .pricing(&["fal-ai/flux/dev".to_string(), "fal-ai/fast-sdxl".to_string()])
        .await
        .expect("pricing");
    assert_eq!(pricing["prices"][0]["unit_price"], 0.01);
}

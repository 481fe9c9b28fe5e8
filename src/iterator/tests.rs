//! Tests for the service data iterator

use super::*;
use crate::config::DataSourceConfig;
use crate::http::{ApiClient, ApiResponse, ApiResult, PendingResult};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use reqwest::header::HeaderMap;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use test_case::test_case;

/// Serves fixed JSON per URL; URLs listed as throttled return pending
#[derive(Default)]
struct FixedClient {
    replies: HashMap<String, Value>,
    throttled: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl FixedClient {
    fn reply(mut self, url: &str, json: Value) -> Self {
        self.replies.insert(url.to_string(), json);
        self
    }

    fn throttle(mut self, url: &str) -> Self {
        self.throttled.push(url.to_string());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApiClient for FixedClient {
    fn base_url(&self) -> Option<&str> {
        None
    }

    async fn get_json(&self, url: &str, _metadata: Option<&Value>) -> Result<ApiResult> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.throttled.iter().any(|u| u == url) {
            return Ok(ApiResult::Pending(PendingResult {
                delay: 60,
                max_retry: 5,
                metadata: json!({"retryCount": 1}),
            }));
        }
        let json = self
            .replies
            .get(url)
            .cloned()
            .ok_or_else(|| Error::http_status(404, url.to_string()))?;
        Ok(ApiResult::Complete(ApiResponse {
            json,
            source: json!({"method": "GET", "url": url, "status": 200}),
            headers: HeaderMap::new(),
        }))
    }

    async fn post_json(
        &self,
        url: &str,
        _body: Option<&Value>,
        metadata: Option<&Value>,
    ) -> Result<ApiResult> {
        self.get_json(url, metadata).await
    }

    async fn patch_json(
        &self,
        url: &str,
        _body: Option<&Value>,
        metadata: Option<&Value>,
    ) -> Result<ApiResult> {
        self.get_json(url, metadata).await
    }
}

fn data_source(client: FixedClient) -> (Arc<DataSource>, Arc<FixedClient>) {
    let config: DataSourceConfig = serde_json::from_value(json!({"dataSets": {
        "projects": {
            "url": "/orgs/{{criteria.org}}/projects",
            "transform": "{ \"projectId\": id }"
        },
        "items": {
            "url": "/projects/{{criteria.projectId}}/items",
            "property": "value",
            "pagingScheme": {"type": "nextToken", "tokenParameter": "cursor", "tokenPath": "next"}
        },
        "summary": {"url": "/projects/{{criteria.projectId}}/summary", "result": "object"}
    }}))
    .unwrap();
    let client = Arc::new(client);
    (Arc::new(DataSource::new(config, client.clone())), client)
}

fn layer(value: Value) -> IteratorLayer {
    serde_json::from_value(value).unwrap()
}

fn criteria_layer(sub_array_size: Option<usize>) -> IteratorLayer {
    IteratorLayer {
        layer: 1,
        iterand_key: "projectId".into(),
        sub_array_size,
        source: IteratorSource::Criteria(CriteriaIteratorSource {
            criteria_property: Some("projects".into()),
            criteria_transformer: Some(CSV_TO_ITERABLE.into()),
        }),
    }
}

fn object(value: Value) -> IterableObject {
    value.as_object().unwrap().clone()
}

fn complete(result: DataSetResult) -> CompleteResult {
    match result {
        DataSetResult::Complete(result) => result,
        DataSetResult::Pending(p) => panic!("Expected Complete, got pending {p:?}"),
    }
}

// ============================================================================
// Iterable array validation
// ============================================================================

#[test]
fn test_validate_accepts_single_key_objects() {
    let plan = validate_iterable_array(vec![json!({"a": 1})], "a").unwrap();
    assert_eq!(plan, vec![object(json!({"a": 1}))]);
}

#[test]
fn test_validate_rejects_two_properties_naming_index() {
    let err = validate_iterable_array(vec![json!({"a": 1, "b": 2})], "a").unwrap_err();
    assert!(matches!(err, Error::IterableArray { .. }));
    assert!(err.to_string().contains("index 0"), "{err}");
}

#[test_case(vec![], "empty" ; "empty array")]
#[test_case(vec![json!({"a": 1}), json!({"b": 1})], "index 1" ; "missing iterand key")]
#[test_case(vec![json!({"a": 1}), json!({"a": 2}), json!("x")], "index 2" ; "non object")]
fn test_validate_rejections(items: Vec<Value>, message: &str) {
    let err = validate_iterable_array(items, "a").unwrap_err();
    assert!(err.to_string().contains(message), "{err}");
}

#[test]
fn test_validate_only_samples_head_for_extra_keys() {
    let items = vec![
        json!({"a": 1}),
        json!({"a": 2}),
        json!({"a": 3}),
        json!({"a": 4, "extra": true}),
    ];
    assert_eq!(validate_iterable_array(items, "a").unwrap().len(), 4);
}

#[test]
fn test_validate_length_limit() {
    let items = vec![json!({"a": 1}); MAX_ITERABLE_LENGTH + 1];
    let err = validate_iterable_array(items, "a").unwrap_err();
    assert!(err.to_string().contains("maximum"));

    let items = vec![json!({"a": 1}); MAX_ITERABLE_LENGTH];
    assert!(validate_iterable_array(items, "a").is_ok());
}

// ============================================================================
// Transformers
// ============================================================================

#[test]
fn test_csv_to_iterable() {
    let plan = csv_to_iterable(&json!(" a, b ,,c "), "tag").unwrap();
    assert_eq!(
        plan,
        vec![
            object(json!({"tag": "a"})),
            object(json!({"tag": "b"})),
            object(json!({"tag": "c"}))
        ]
    );
    assert_eq!(csv_to_iterable(&json!(42), "n").unwrap(), vec![object(json!({"n": "42"}))]);
    assert!(csv_to_iterable(&json!(["a"]), "n").is_err());
}

#[test]
fn test_registry() {
    let mut registry = TransformerRegistry::with_builtins();
    assert!(registry.contains(CSV_TO_ITERABLE));
    registry.register("pipeToIterable", |value: &Value, key: &str| {
        Ok(value
            .as_str()
            .unwrap_or_default()
            .split('|')
            .map(|t| object(json!({ key: t })))
            .collect())
    });
    assert_eq!(registry.names(), vec!["csvToIterable", "pipeToIterable"]);
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_extract_iterator_layer() {
    let layers = vec![criteria_layer(None)];
    assert_eq!(extract_iterator_layer(&layers, 1).unwrap().iterand_key, "projectId");
    assert!(extract_iterator_layer(&layers, 2).is_err());
}

#[test]
fn test_layer_deserialization() {
    let l = layer(json!({
        "layer": 1, "iterandKey": "projectId", "subArraySize": 25,
        "source": {"type": "dataSet", "dataSet": "projects", "params": {"org": "acme"}}
    }));
    assert_eq!(l.sub_array_size, Some(25));
    match l.source {
        IteratorSource::DataSet(ds) => {
            assert_eq!(ds.data_set.as_deref(), Some("projects"));
            assert_eq!(ds.params["org"], "acme");
        }
        IteratorSource::Criteria(_) => panic!("Expected dataSet source"),
    }
}

#[test_case(json!({"layer": 2, "iterandKey": "k", "source": {"type": "criteria", "criteriaProperty": "p", "criteriaTransformer": "csvToIterable"}}), "layer 1" ; "no principal layer")]
#[test_case(json!({"layer": 1, "iterandKey": "k", "subArraySize": 0, "source": {"type": "criteria", "criteriaProperty": "p", "criteriaTransformer": "csvToIterable"}}), "subArraySize" ; "zero sub array size")]
#[test_case(json!({"layer": 1, "iterandKey": "", "source": {"type": "criteria", "criteriaProperty": "p", "criteriaTransformer": "csvToIterable"}}), "iterandKey" ; "empty iterand key")]
#[test_case(json!({"layer": 1, "iterandKey": "k", "source": {"type": "criteria", "criteriaTransformer": "csvToIterable"}}), "criteriaProperty" ; "missing criteria property")]
#[test_case(json!({"layer": 1, "iterandKey": "k", "source": {"type": "criteria", "criteriaProperty": "p", "criteriaTransformer": "nope"}}), "nope" ; "unknown transformer")]
#[test_case(json!({"layer": 1, "iterandKey": "k", "source": {"type": "dataSet"}}), "dataSet is required" ; "missing data set")]
#[test_case(json!({"layer": 1, "iterandKey": "k", "source": {"type": "dataSet", "dataSet": "ghost"}}), "ghost" ; "undefined data set")]
fn test_construction_errors(definition: Value, message: &str) {
    let (source, _) = data_source(FixedClient::default());
    let err = ServiceDataIterator::new(source, vec![layer(definition)]).unwrap_err();
    assert!(matches!(err, Error::Iterator { .. }));
    assert!(err.to_string().contains(message), "{err}");
}

#[test]
fn test_slices() {
    let (source, _) = data_source(FixedClient::default());
    let iterator = ServiceDataIterator::new(source.clone(), vec![criteria_layer(Some(2))]).unwrap();
    let plan: Vec<IterableObject> = (1..=5).map(|i| object(json!({"projectId": i}))).collect();

    let sizes: Vec<usize> = iterator.slices(&plan).map(<[_]>::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert!(iterator.is_batched());

    let single = ServiceDataIterator::new(source, vec![criteria_layer(None)]).unwrap();
    assert_eq!(single.slices(&plan).count(), 5);
    assert!(!single.is_batched());
}

// ============================================================================
// Plan generation
// ============================================================================

#[tokio::test]
async fn test_plan_from_criteria() {
    let (source, _) = data_source(FixedClient::default());
    let iterator = ServiceDataIterator::new(source, vec![criteria_layer(None)]).unwrap();

    let params = object(json!({"projects": "p1, p2"}));
    let IteratorPlan::Complete(plan) = iterator
        .generate_iterator_plan(Some(&params), None, None)
        .await
        .unwrap()
    else {
        panic!("Expected Complete");
    };
    assert_eq!(
        plan,
        vec![object(json!({"projectId": "p1"})), object(json!({"projectId": "p2"}))]
    );

    let err = iterator.generate_iterator_plan(None, None, None).await.unwrap_err();
    assert!(err.to_string().contains("'projects'"));
}

#[tokio::test]
async fn test_plan_from_data_set() {
    let (source, client) = data_source(
        FixedClient::default().reply("/orgs/acme/projects", json!([{"id": "p1"}, {"id": "p2"}])),
    );
    let iterator = ServiceDataIterator::new(
        source,
        vec![layer(json!({
            "layer": 1, "iterandKey": "projectId",
            "source": {"type": "dataSet", "dataSet": "projects", "params": {"org": "{{criteria.tenant}}"}}
        }))],
    )
    .unwrap();

    let params = object(json!({"tenant": "acme"}));
    let IteratorPlan::Complete(plan) = iterator
        .generate_iterator_plan(Some(&params), None, None)
        .await
        .unwrap()
    else {
        panic!("Expected Complete");
    };
    assert_eq!(plan.len(), 2);
    assert_eq!(plan[1]["projectId"], "p2");
    assert_eq!(client.calls(), vec!["/orgs/acme/projects"]);
}

#[tokio::test]
async fn test_plan_from_data_set_pending() {
    let (source, _) = data_source(FixedClient::default().throttle("/orgs/x/projects"));
    let iterator = ServiceDataIterator::new(
        source,
        vec![layer(json!({
            "layer": 1, "iterandKey": "projectId",
            "source": {"type": "dataSet", "dataSet": "projects"}
        }))],
    )
    .unwrap();

    let params = object(json!({"org": "x"}));
    let plan = iterator
        .generate_iterator_plan(None, Some(&params), None)
        .await
        .unwrap();
    assert!(matches!(plan, IteratorPlan::Pending(PendingResult { delay: 60, .. })));
}

// ============================================================================
// Iteration
// ============================================================================

#[tokio::test]
async fn test_iterate_single_keeps_next_page() {
    let (source, client) = data_source(
        FixedClient::default()
            .reply("/projects/p1/items?cursor=c1", json!({"value": [3, 4], "next": "c2"})),
    );
    let iterator = ServiceDataIterator::new(source, vec![criteria_layer(None)]).unwrap();

    let slice = vec![object(json!({"projectId": "p1"}))];
    let params = object(json!({"projectId": "ignored"}));
    let result = complete(
        iterator
            .iterate_data_flow("items", &slice, Some(&params), Some("c1"), None, None)
            .await
            .unwrap(),
    );

    assert_eq!(result.data, json!([3, 4]));
    assert_eq!(result.next_page.as_deref(), Some("c2"));
    assert_eq!(client.calls(), vec!["/projects/p1/items?cursor=c1"]);
}

#[tokio::test]
async fn test_iterate_batched_accumulates() {
    let (source, client) = data_source(
        FixedClient::default()
            .reply("/projects/p1/items", json!({"value": [1], "next": "more"}))
            .reply("/projects/p2/items", json!({"value": [2, 3]}))
            .reply("/projects/p1/summary", json!({"n": 1}))
            .reply("/projects/p2/summary", json!({"n": 2})),
    );
    let iterator = ServiceDataIterator::new(source, vec![criteria_layer(Some(2))]).unwrap();
    let slice = vec![
        object(json!({"projectId": "p1"})),
        object(json!({"projectId": "p2"})),
    ];

    let result = complete(
        iterator
            .iterate_data_flow("items", &slice, None, Some("ignored"), None, None)
            .await
            .unwrap(),
    );
    assert_eq!(result.data, json!([1, 2, 3]));
    assert_eq!(result.next_page, None);
    assert_eq!(result.source["url"], "/projects/p2/items");
    assert_eq!(result.context["url"], "/projects/p2/items");

    let summaries = complete(
        iterator
            .iterate_data_flow("summary", &slice, None, None, None, None)
            .await
            .unwrap(),
    );
    assert_eq!(summaries.data, json!([{"n": 1}, {"n": 2}]));
    assert_eq!(
        client.calls(),
        vec![
            "/projects/p1/items",
            "/projects/p2/items",
            "/projects/p1/summary",
            "/projects/p2/summary"
        ]
    );
}

#[tokio::test]
async fn test_iterate_pending_short_circuits() {
    let (source, client) = data_source(
        FixedClient::default()
            .reply("/projects/p1/summary", json!({"n": 1}))
            .throttle("/projects/p2/summary")
            .reply("/projects/p3/summary", json!({"n": 3})),
    );
    let iterator = ServiceDataIterator::new(source, vec![criteria_layer(Some(3))]).unwrap();
    let slice: Vec<IterableObject> = ["p1", "p2", "p3"]
        .iter()
        .map(|p| object(json!({"projectId": p})))
        .collect();

    let result = iterator
        .iterate_data_flow("summary", &slice, None, None, None, None)
        .await
        .unwrap();
    assert!(!result.is_complete());
    assert_eq!(client.calls().len(), 2);
}

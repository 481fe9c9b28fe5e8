//! Tests for pagination module

use super::*;
use crate::types::Method;
use pretty_assertions::assert_eq;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};
use test_case::test_case;

fn scheme(value: Value) -> PagingScheme {
    serde_json::from_value(value).unwrap()
}

fn paginator(value: Value) -> Box<dyn Paginator> {
    create_paginator(&scheme(value), Method::GET).unwrap()
}

fn url(p: &mut Box<dyn Paginator>, relative_url: &str, page: Option<&str>) -> String {
    p.paginate_request(relative_url, None, None, Method::GET, page)
        .unwrap()
        .paged_relative_url
}

fn page_based() -> Value {
    json!({
        "type": "pageBased",
        "pageParameter": "page",
        "pageStartingValue": 1,
        "limitParameter": "size",
        "limitValue": 5,
        "pageUntil": "noDataLeft"
    })
}

fn items(n: usize) -> Value {
    Value::Array((0..n).map(|i| json!({"id": i})).collect())
}

// ============================================================================
// Scheme Deserialization Tests
// ============================================================================

#[test]
fn test_scheme_tags() {
    assert_eq!(scheme(page_based()).type_name(), "pageBased");
    assert_eq!(
        scheme(json!({"type": "nextToken", "tokenPath": "next", "tokenType": "url"})),
        PagingScheme::NextToken(NextTokenScheme {
            token_path: Some("next".into()),
            token_type: TokenType::Url,
            ..Default::default()
        })
    );
    assert_eq!(
        scheme(json!({"type": "graphqlConnections"})).type_name(),
        "graphqlConnections"
    );
}

#[test]
fn test_unknown_scheme_type_rejected() {
    let result: std::result::Result<PagingScheme, _> =
        serde_json::from_value(json!({"type": "cursor"}));
    assert!(result.is_err());
}

// ============================================================================
// Validation Tests
// ============================================================================

#[test_case(json!({"type": "nextToken", "tokenParameter": "t"}), "tokenPath" ; "next token without path")]
#[test_case(json!({"type": "nextToken", "tokenPath": "next"}), "tokenParameter" ; "next token without parameter")]
#[test_case(json!({"type": "nextToken", "tokenParameter": "t", "tokenPath": "next", "pageUntil": "reachTotalCount"}), "reachTotalCount" ; "next token with total count")]
#[test_case(json!({"type": "nextToken", "tokenParameter": "t", "tokenPath": "next", "pageUntil": "noDataLeft"}), "limitValue" ; "next token no data left without limit")]
#[test_case(json!({"type": "pageBased", "limitParameter": "size", "limitValue": 5}), "pageParameter" ; "page based without parameter")]
#[test_case(json!({"type": "pageBased", "pageParameter": "page"}), "limitValue" ; "page based no data left without limit")]
#[test_case(json!({"type": "pageBased", "pageParameter": "page", "limitParameter": "size", "limitValue": 0}), "positive" ; "page based zero limit")]
#[test_case(json!({"type": "pageBased", "pageParameter": "page", "limitParameter": "size"}), "limitValue" ; "limit parameter without value")]
#[test_case(json!({"type": "pageBased", "pageParameter": "page", "limitValue": 5}), "limitParameter" ; "limit value without parameter")]
#[test_case(json!({"type": "pageBased", "pageParameter": "page", "pageUntil": "reachTotalCount"}), "totalPath" ; "total count without path")]
#[test_case(json!({"type": "offsetAndLimit", "limitParameter": "limit", "limitValue": 10}), "offsetParameter" ; "offset without parameter")]
#[test_case(json!({"type": "offsetAndLimit", "offsetParameter": "offset", "limitParameter": "limit"}), "limitValue" ; "offset without limit value")]
#[test_case(json!({"type": "offsetAndLimit", "offsetParameter": "offset", "limitParameter": "limit", "limitValue": -1}), "positive" ; "offset negative limit")]
fn test_invalid_schemes(value: Value, field: &str) {
    let s = scheme(value);
    let err = create_paginator(&s, Method::GET).unwrap_err().to_string();
    assert!(err.contains(field), "{err}");
    assert!(err.contains(s.type_name()), "{err}");
}

#[test]
fn test_graphql_requires_post() {
    let s = scheme(json!({
        "type": "graphqlConnections",
        "limitParameter": "first",
        "limitValue": 50,
        "pageInfoPath": "data.issues.pageInfo"
    }));
    let err = create_paginator(&s, Method::GET).unwrap_err().to_string();
    assert!(err.contains("POST"));
    assert!(create_paginator(&s, Method::POST).is_ok());
}

#[test]
fn test_graphql_requires_page_info_path() {
    let s = scheme(json!({"type": "graphqlConnections", "limitParameter": "first", "limitValue": 50}));
    let err = create_paginator(&s, Method::POST).unwrap_err().to_string();
    assert!(err.contains("pageInfoPath"));
}

// ============================================================================
// Page Based Tests
// ============================================================================

#[test]
fn test_page_based_scenario() {
    let mut p = paginator(page_based());
    let headers = HeaderMap::new();

    assert_eq!(url(&mut p, "/items", None), "/items?page=1&size=5");
    let five = items(5);
    let next = p.next_page(&PageResponse::new(&five, &headers)).unwrap();
    assert_eq!(next.as_deref(), Some("2"));

    assert_eq!(url(&mut p, "/items", next.as_deref()), "/items?page=2&size=5");
    let three = items(3);
    assert_eq!(p.next_page(&PageResponse::new(&three, &headers)).unwrap(), None);
}

#[test]
fn test_page_based_sequence_advances_without_page() {
    let mut p = paginator(page_based());
    assert_eq!(url(&mut p, "/items", None), "/items?page=1&size=5");
    assert_eq!(url(&mut p, "/items", None), "/items?page=2&size=5");
    assert_eq!(url(&mut p, "/items", None), "/items?page=3&size=5");
    assert_eq!(p.state(), &PageState::AtPage("3".into()));
}

#[test]
fn test_page_based_default_start() {
    let mut p = paginator(json!({
        "type": "pageBased",
        "pageParameter": "p",
        "limitParameter": "n",
        "limitValue": 2
    }));
    assert_eq!(url(&mut p, "/items?q=x", None), "/items?q=x&p=1&n=2");
}

#[test]
fn test_page_based_counts_extracted_records() {
    let mut p = paginator(page_based());
    url(&mut p, "/items", None);
    let body = json!({"value": items(5)});
    let records = items(2);
    let headers = HeaderMap::new();
    let response = PageResponse::new(&body, &headers).with_records(&records);
    assert_eq!(p.next_page(&response).unwrap(), None);
}

#[test]
fn test_page_based_reach_total_count() {
    let mut p = paginator(json!({
        "type": "pageBased",
        "pageParameter": "page",
        "pageStartingValue": 0,
        "limitParameter": "size",
        "limitValue": 10,
        "pageUntil": "reachTotalCount",
        "totalPath": "meta.total"
    }));
    let headers = HeaderMap::new();
    let body = json!({"meta": {"total": 25}, "items": []});

    url(&mut p, "/items", None);
    assert_eq!(
        p.next_page(&PageResponse::new(&body, &headers)).unwrap().as_deref(),
        Some("1")
    );
    url(&mut p, "/items", Some("1"));
    assert_eq!(
        p.next_page(&PageResponse::new(&body, &headers)).unwrap().as_deref(),
        Some("2")
    );
    url(&mut p, "/items", Some("2"));
    assert_eq!(p.next_page(&PageResponse::new(&body, &headers)).unwrap(), None);
}

#[test]
fn test_page_based_rejects_non_numeric_page() {
    let mut p = paginator(page_based());
    let err = p
        .paginate_request("/items", None, None, Method::GET, Some("abc"))
        .unwrap_err();
    assert!(err.to_string().contains("pageBased"));
}

#[test]
fn test_page_based_counter_overflow_is_error() {
    let max = i64::MAX.to_string();
    let mut p = paginator(page_based());
    let headers = HeaderMap::new();

    assert_eq!(
        url(&mut p, "/items", Some(&max)),
        format!("/items?page={max}&size=5")
    );
    let five = items(5);
    let err = p.next_page(&PageResponse::new(&five, &headers)).unwrap_err();
    assert!(err.to_string().contains("overflow"), "{err}");

    let err = p
        .paginate_request("/items", None, None, Method::GET, None)
        .unwrap_err();
    assert!(err.to_string().contains("pageBased"), "{err}");
}

#[test]
fn test_page_based_total_count_overflow_is_error() {
    let mut p = paginator(json!({
        "type": "pageBased",
        "pageParameter": "page",
        "pageStartingValue": 0,
        "limitParameter": "size",
        "limitValue": 10,
        "pageUntil": "reachTotalCount",
        "totalPath": "total"
    }));
    let headers = HeaderMap::new();
    url(&mut p, "/items", Some(&i64::MAX.to_string()));
    let body = json!({"total": 25});
    assert!(p.next_page(&PageResponse::new(&body, &headers)).is_err());
}

#[test]
fn test_page_based_post_body_merge() {
    let mut p = create_paginator(
        &scheme(json!({
            "type": "pageBased",
            "pageParameter": "paging.page",
            "limitParameter": "paging.size",
            "limitValue": 5
        })),
        Method::POST,
    )
    .unwrap();
    let body = json!({"query": "x"});
    let paged = p
        .paginate_request("/search", None, Some(&body), Method::POST, None)
        .unwrap();

    assert_eq!(paged.paged_relative_url, "/search");
    assert_eq!(
        paged.paged_message_body,
        Some(json!({"query": "x", "paging": {"page": 1, "size": 5}}))
    );
}

#[test]
fn test_body_merge_rejects_non_object_body() {
    let mut p = create_paginator(&scheme(page_based()), Method::POST).unwrap();
    let err = p
        .paginate_request("/search", None, Some(&json!([1])), Method::POST, None)
        .unwrap_err();
    assert!(err.to_string().contains("pageBased"));
}

// ============================================================================
// Offset And Limit Tests
// ============================================================================

fn offset_scheme(page_until: &str) -> Value {
    json!({
        "type": "offsetAndLimit",
        "offsetParameter": "offset",
        "limitParameter": "limit",
        "limitValue": 10,
        "pageUntil": page_until,
        "totalPath": "headers.X-Total-Count"
    })
}

#[test]
fn test_offset_sequence() {
    let mut p = paginator(offset_scheme("noDataLeft"));
    assert_eq!(url(&mut p, "/rows", None), "/rows?offset=0&limit=10");
    assert_eq!(url(&mut p, "/rows", None), "/rows?offset=10&limit=10");
    assert_eq!(url(&mut p, "/rows", None), "/rows?offset=20&limit=10");
}

#[test]
fn test_offset_starting_value() {
    let mut s = offset_scheme("noDataLeft");
    s["offsetStartingValue"] = json!(5);
    let mut p = paginator(s);
    assert_eq!(url(&mut p, "/rows", None), "/rows?offset=5&limit=10");
}

#[test]
fn test_offset_no_data_left() {
    let mut p = paginator(offset_scheme("noDataLeft"));
    let headers = HeaderMap::new();
    url(&mut p, "/rows", None);
    let full = items(10);
    assert_eq!(
        p.next_page(&PageResponse::new(&full, &headers)).unwrap().as_deref(),
        Some("10")
    );
    let empty = items(0);
    assert_eq!(p.next_page(&PageResponse::new(&empty, &headers)).unwrap(), None);
}

#[test_case(0, Some("10") ; "first page")]
#[test_case(10, Some("20") ; "second page")]
#[test_case(20, None ; "offset plus limit reaches total")]
fn test_offset_reach_total_count_from_header(offset: i64, expected: Option<&str>) {
    let mut p = paginator(offset_scheme("reachTotalCount"));
    let mut headers = HeaderMap::new();
    headers.insert("x-total-count", HeaderValue::from_static("25"));
    let body = items(10);

    url(&mut p, "/rows", Some(&offset.to_string()));
    assert_eq!(
        p.next_page(&PageResponse::new(&body, &headers)).unwrap().as_deref(),
        expected
    );
}

#[test]
fn test_offset_counter_overflow_is_error() {
    let mut p = paginator(offset_scheme("noDataLeft"));
    let headers = HeaderMap::new();
    url(&mut p, "/rows", Some(&(i64::MAX - 5).to_string()));

    let full = items(10);
    let err = p.next_page(&PageResponse::new(&full, &headers)).unwrap_err();
    assert!(err.to_string().contains("offsetAndLimit"), "{err}");
    assert!(p
        .paginate_request("/rows", None, None, Method::GET, None)
        .is_err());
}

#[test]
fn test_offset_zero_total_ends_paging() {
    let mut p = paginator(offset_scheme("reachTotalCount"));
    let mut headers = HeaderMap::new();
    headers.insert("x-total-count", HeaderValue::from_static("0"));
    url(&mut p, "/rows", None);
    assert_eq!(p.next_page(&PageResponse::new(&json!([]), &headers)).unwrap(), None);
}

#[test]
fn test_offset_non_numeric_total_ends_paging() {
    let mut p = paginator(offset_scheme("reachTotalCount"));
    let mut headers = HeaderMap::new();
    headers.insert("x-total-count", HeaderValue::from_static("lots"));
    url(&mut p, "/rows", None);
    assert_eq!(p.next_page(&PageResponse::new(&items(10), &headers)).unwrap(), None);
}

// ============================================================================
// Next Token Tests
// ============================================================================

fn next_token_scheme() -> Value {
    json!({
        "type": "nextToken",
        "tokenParameter": "nextToken",
        "tokenPath": "meta.next",
        "limitParameter": "$top",
        "limitValue": 10
    })
}

#[test]
fn test_next_token_scenario() {
    let mut p = paginator(next_token_scheme());
    assert_eq!(url(&mut p, "/api/data", None), "/api/data?$top=10");
    assert_eq!(p.state(), &PageState::Unstarted);
    assert_eq!(
        url(&mut p, "/api/data", Some("abc")),
        "/api/data?$top=10&nextToken=abc"
    );
    assert_eq!(p.state(), &PageState::AtPage("abc".into()));
}

#[test]
fn test_next_token_is_url_encoded_in_query() {
    let mut p = paginator(next_token_scheme());
    assert_eq!(
        url(&mut p, "/api/data", Some("a b&c")),
        "/api/data?$top=10&nextToken=a+b%26c"
    );
}

#[test_case(json!({"meta": {"next": "t2"}}), Some("t2") ; "token present")]
#[test_case(json!({"meta": {"next": ""}}), None ; "empty token")]
#[test_case(json!({"meta": {"next": null}}), None ; "null token")]
#[test_case(json!({"meta": {}}), None ; "missing token")]
#[test_case(json!({"meta": {"next": 42}}), Some("42") ; "numeric token")]
fn test_next_token_no_next_token(body: Value, expected: Option<&str>) {
    let p = paginator(next_token_scheme());
    let headers = HeaderMap::new();
    assert_eq!(
        p.next_page(&PageResponse::new(&body, &headers)).unwrap().as_deref(),
        expected
    );
}

#[test]
fn test_next_token_from_header() {
    let mut s = next_token_scheme();
    s["tokenPath"] = json!("headers.X-Continuation");
    let p = paginator(s);
    let mut headers = HeaderMap::new();
    headers.insert("x-continuation", HeaderValue::from_static("cont-1"));
    assert_eq!(
        p.next_page(&PageResponse::new(&json!({}), &headers)).unwrap().as_deref(),
        Some("cont-1")
    );
}

#[test]
fn test_next_token_jsonpath() {
    let mut s = next_token_scheme();
    s["tokenPath"] = json!("$.links[0].href");
    let p = paginator(s);
    let body = json!({"links": [{"href": "tok-9"}]});
    let headers = HeaderMap::new();
    assert_eq!(
        p.next_page(&PageResponse::new(&body, &headers)).unwrap().as_deref(),
        Some("tok-9")
    );
}

#[test]
fn test_next_token_no_data_left() {
    let mut s = next_token_scheme();
    s["pageUntil"] = json!("noDataLeft");
    let p = paginator(s);
    let headers = HeaderMap::new();

    let short = json!({"meta": {"next": "t2"}, "items": items(3)});
    let records = items(3);
    let response = PageResponse::new(&short, &headers).with_records(&records);
    assert_eq!(p.next_page(&response).unwrap(), None);

    let records = items(10);
    let response = PageResponse::new(&short, &headers).with_records(&records);
    assert_eq!(p.next_page(&response).unwrap().as_deref(), Some("t2"));
}

#[test]
fn test_url_token_replaces_relative_url() {
    let mut p = paginator(json!({
        "type": "nextToken",
        "tokenType": "url",
        "tokenPath": "@odata.nextLink",
        "limitParameter": "$top",
        "limitValue": 10
    }));
    let headers = HeaderMap::new();
    let body = json!({"@odata.nextLink": "https://api.example.com/data?$skiptoken=x1"});

    assert_eq!(url(&mut p, "/data", None), "/data?$top=10");
    let next = p.next_page(&PageResponse::new(&body, &headers)).unwrap();
    assert_eq!(
        next.as_deref(),
        Some("https://api.example.com/data?$skiptoken=x1")
    );
    assert_eq!(
        url(&mut p, "/data", next.as_deref()),
        "https://api.example.com/data?$skiptoken=x1"
    );
}

#[test]
fn test_relative_url_token_joins_base_url() {
    let p = paginator(json!({"type": "nextToken", "tokenType": "url", "tokenPath": "next"}));
    let headers = HeaderMap::new();
    let body = json!({"next": "/data?page=2"});
    let response =
        PageResponse::new(&body, &headers).with_base_url(Some("https://api.example.com"));
    assert_eq!(p.next_page(&response).unwrap().as_deref(), Some("/data?page=2"));
}

#[test]
fn test_invalid_url_token_is_error() {
    let p = paginator(json!({"type": "nextToken", "tokenType": "url", "tokenPath": "next"}));
    let headers = HeaderMap::new();
    let body = json!({"next": "not a url"});
    let err = p
        .next_page(&PageResponse::new(&body, &headers))
        .unwrap_err()
        .to_string();
    assert!(err.contains("not a valid URL"));
    assert!(err.contains("nextToken"));
}

#[test]
fn test_search_array_token_in_body() {
    let mut p = create_paginator(
        &scheme(json!({
            "type": "nextToken",
            "tokenType": "searchArray",
            "tokenParameter": "search_after",
            "tokenPath": "hits.last"
        })),
        Method::POST,
    )
    .unwrap();

    let paged = p
        .paginate_request("/search", None, Some(&json!({})), Method::POST, Some("[17, \"x\"]"))
        .unwrap();
    assert_eq!(
        paged.paged_message_body,
        Some(json!({"search_after": [17, "x"]}))
    );

    let paged = p
        .paginate_request("/search", None, Some(&json!({})), Method::POST, Some("plain"))
        .unwrap();
    assert_eq!(paged.paged_message_body, Some(json!({"search_after": "plain"})));
}

#[test_case("123" ; "number")]
#[test_case("true" ; "boolean")]
#[test_case("null" ; "null")]
#[test_case("{\"a\": 1}" ; "object")]
#[test_case("\"quoted\"" ; "json string")]
fn test_search_array_keeps_non_array_tokens_as_strings(token: &str) {
    let mut p = create_paginator(
        &scheme(json!({
            "type": "nextToken",
            "tokenType": "searchArray",
            "tokenParameter": "search_after",
            "tokenPath": "hits.last"
        })),
        Method::POST,
    )
    .unwrap();

    let paged = p
        .paginate_request("/search", None, Some(&json!({})), Method::POST, Some(token))
        .unwrap();
    assert_eq!(paged.paged_message_body, Some(json!({"search_after": token})));
}

// ============================================================================
// GraphQL Tests
// ============================================================================

fn graphql() -> Box<dyn Paginator> {
    create_paginator(
        &scheme(json!({
            "type": "graphqlConnections",
            "limitParameter": "first",
            "limitValue": 50,
            "pageInfoPath": "data.repository.issues.pageInfo"
        })),
        Method::POST,
    )
    .unwrap()
}

#[test]
fn test_graphql_request_variables() {
    let mut p = graphql();
    let body = json!({"query": "query($first: Int, $after: String) { ... }"});

    let first = p
        .paginate_request("/graphql", None, Some(&body), Method::POST, None)
        .unwrap();
    assert_eq!(first.paged_relative_url, "/graphql");
    assert_eq!(
        first.paged_message_body.unwrap()["variables"],
        json!({"first": 50, "after": null})
    );

    let second = p
        .paginate_request("/graphql", None, Some(&body), Method::POST, Some("c1"))
        .unwrap();
    assert_eq!(
        second.paged_message_body.unwrap()["variables"],
        json!({"first": 50, "after": "c1"})
    );
}

#[test_case(json!({"hasNextPage": true, "endCursor": "c2"}), Some("c2") ; "has next page")]
#[test_case(json!({"hasNextPage": false, "endCursor": "c2"}), None ; "last page")]
#[test_case(json!({"hasNextPage": true, "endCursor": null}), None ; "missing cursor")]
fn test_graphql_next_page(page_info: Value, expected: Option<&str>) {
    let p = graphql();
    let body = json!({"data": {"repository": {"issues": {"pageInfo": page_info, "nodes": []}}}});
    let headers = HeaderMap::new();
    assert_eq!(
        p.next_page(&PageResponse::new(&body, &headers)).unwrap().as_deref(),
        expected
    );
}

// ============================================================================
// Helper Tests
// ============================================================================

#[test]
fn test_append_query_delimiters() {
    let params = vec![("a".to_string(), "1".to_string()), ("b".to_string(), "x/y".to_string())];
    assert_eq!(append_query("/p", &params), "/p?a=1&b=x%2Fy");
    assert_eq!(append_query("/p?z=0", &params), "/p?z=0&a=1&b=x%2Fy");
}

#[test]
fn test_extract_simple_path_indexing() {
    let value = json!({"data": [{"id": 1}, {"id": 2}]});
    assert_eq!(extract_simple_path(&value, "data[1].id"), Some(json!(2)));
    assert_eq!(extract_simple_path(&value, "data[-1].id"), Some(json!(2)));
    assert_eq!(extract_simple_path(&value, "data[5].id"), None);
}

#[test]
fn test_set_body_path_creates_objects() {
    let mut body = json!({"a": {"keep": true}});
    set_body_path(&mut body, "a.b.c", json!(1), "pageBased").unwrap();
    assert_eq!(body, json!({"a": {"keep": true, "b": {"c": 1}}}));
}

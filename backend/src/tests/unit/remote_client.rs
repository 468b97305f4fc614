// Unit tests for the GraphQL client: candidate fallthrough, negotiation and probes

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use wiremock::ResponseTemplate;

use super::super::helpers::*;
use super::super::{fast_retry, remote_config, TestContext};
use crate::jobs::RetryError;
use crate::remote::{queries, FailureReason, RemoteClient, RemoteError};

#[tokio::test]
async fn test_advances_past_errored_candidate() {
    let ctx = TestContext::new().await;
    graphql_request("totalCustomers")
        .respond_with(graphql_errors(&["Cannot query field \"totalCustomers\" on type \"Query\""]))
        .expect(1)
        .mount(&ctx.server)
        .await;
    graphql_request("allCustomers")
        .respond_with(graphql_data(json!({
            "allCustomers": { "totalCount": 0 },
            "allOrders": { "totalCount": 0, "edges": [] }
        })))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let response = ctx.client().send_candidates(&queries::report_queries()).await.unwrap();

    assert_eq!(response.candidate, 1);
    assert_eq!(response.label, "connections");
}

#[tokio::test]
async fn test_reports_every_candidate_failure() {
    let ctx = TestContext::new().await;
    graphql_request("totalCustomers")
        .respond_with(ResponseTemplate::new(500))
        .mount(&ctx.server)
        .await;
    graphql_request("allCustomers")
        .respond_with(graphql_data(json!({ "allCustomers": { "totalCount": 3 } })))
        .mount(&ctx.server)
        .await;

    let err = ctx.client().send_candidates(&queries::report_queries()).await.unwrap_err();

    match err {
        RemoteError::AllCandidatesFailed(failures) => {
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].reason, FailureReason::Status { code: 500 });
            assert_eq!(failures[1].reason, FailureReason::MissingFields { fields: vec!["allOrders".to_string()] });
        }
        other => panic!("expected AllCandidatesFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_negotiated_contract_skips_unsupported_candidates() {
    let ctx = TestContext::new().await;
    graphql_request("__schema")
        .respond_with(introspection(&["allCustomers", "allOrders"], &[]))
        .expect(1)
        .mount(&ctx.server)
        .await;
    graphql_request("totalCustomers")
        .respond_with(graphql_errors(&["should never be asked"]))
        .expect(0)
        .mount(&ctx.server)
        .await;
    graphql_request("allCustomers")
        .respond_with(graphql_data(json!({
            "allCustomers": { "totalCount": 1 },
            "allOrders": { "totalCount": 0, "edges": [] }
        })))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let contract = ctx.client().negotiate().await.unwrap();
    assert!(contract.query_fields.contains("allOrders"));

    let response = ctx.client().send_candidates(&queries::report_queries()).await.unwrap();
    assert_eq!(response.label, "connections");
}

#[tokio::test]
async fn test_unsupported_mutation_fails_without_request() {
    let ctx = TestContext::new().await;
    graphql_request("__schema")
        .respond_with(introspection(&["hello"], &["createCustomer"]))
        .mount(&ctx.server)
        .await;
    graphql_request("updateLowStockProducts")
        .respond_with(graphql_data(json!({})))
        .expect(0)
        .mount(&ctx.server)
        .await;

    ctx.client().negotiate().await.unwrap();
    let err = ctx.client().send_candidates(&queries::low_stock_mutation()).await.unwrap_err();

    match err {
        RemoteError::AllCandidatesFailed(failures) => assert_eq!(failures[0].reason, FailureReason::Unsupported),
        other => panic!("expected AllCandidatesFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refused_connection_is_connectivity_error() {
    let client = RemoteClient::new(&remote_config(UNREACHABLE_URL)).unwrap();
    let err = client.send_candidates(&queries::report_queries()).await.unwrap_err();
    assert!(err.is_connectivity(), "{:?}", err);
}

/// Accepts every connection and closes it before answering.
async fn dropping_listener() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = accepts.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(socket);
        }
    });
    (format!("http://{}/graphql", addr), accepts)
}

#[tokio::test]
async fn test_dropped_connection_is_connectivity_error() {
    let (url, accepts) = dropping_listener().await;
    let client = RemoteClient::new(&remote_config(&url)).unwrap();

    let err = client.send_candidates(&queries::report_queries()).await.unwrap_err();

    assert!(err.is_connectivity(), "{:?}", err);
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropped_connections_are_retried_until_unreachable() {
    let (url, accepts) = dropping_listener().await;
    let client = RemoteClient::new(&remote_config(&url)).unwrap();
    let candidates = queries::report_queries();

    let result = fast_retry().run(|_| client.send_candidates(&candidates)).await;

    match result {
        Err(RetryError::Unreachable { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected Unreachable, got {:?}", other.map(|r| r.label)),
    }
    assert_eq!(accepts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_probe_stops_at_first_ok() {
    let ctx = TestContext::new().await;
    graphql_request("hello")
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&ctx.server)
        .await;
    graphql_request("queryType")
        .respond_with(graphql_data(json!({ "__schema": { "queryType": { "name": "Query" } } })))
        .expect(1)
        .mount(&ctx.server)
        .await;
    graphql_request("__typename")
        .respond_with(graphql_data(json!({ "__typename": "Query" })))
        .expect(0)
        .mount(&ctx.server)
        .await;

    assert!(ctx.client().probe().await);
}

#[tokio::test]
async fn test_probe_of_unreachable_endpoint_fails() {
    let client = RemoteClient::new(&remote_config(UNREACHABLE_URL)).unwrap();
    assert!(!client.probe().await);
}

#[tokio::test]
async fn test_describe_types_filters_by_keyword() {
    let ctx = TestContext::new().await;
    graphql_request("types")
        .respond_with(graphql_data(json!({
            "__schema": { "types": [
                { "name": "OrderType", "fields": [] },
                { "name": "CustomerType", "fields": [] },
                { "name": "OrderConnection", "fields": [] }
            ] }
        })))
        .mount(&ctx.server)
        .await;

    let types = ctx.client().describe_types("order").await.unwrap();
    assert_eq!(types, vec!["OrderType".to_string(), "OrderConnection".to_string()]);
}

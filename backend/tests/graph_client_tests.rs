//! Integration tests for the Microsoft Graph drive client
//!
//! A local axum server stands in for Graph so the real HTTP path is exercised:
//! - URL and header shape of the first page request
//! - `@odata.nextLink` followed verbatim
//! - Status and body failures mapped to the drive error taxonomy

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::get,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;

use freakflix::services::{DriveError, GraphDriveClient, RateLimitConfig, RemoteEntry, RemoteTree};

// ============================================================================
// Stub Graph server
// ============================================================================

#[derive(Clone)]
struct StubGraph {
    base: String,
    requests: Arc<Mutex<Vec<(String, Option<String>, Option<String>)>>>,
}

async fn children(
    State(stub): State<StubGraph>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    stub.requests.lock().push((id.clone(), query, auth));

    match id.as_str() {
        "root" => Json(json!({
            "value": [
                {"id": "F1", "name": "Shows", "folder": {"childCount": 1}},
                {"id": "I1", "name": "movie.mp4", "size": 1000,
                 "file": {"mimeType": "video/mp4"},
                 "@microsoft.graph.downloadUrl": "https://dl.example/I1"}
            ],
            "@odata.nextLink": format!("{}/paged/root?$skiptoken=page2", stub.base)
        }))
        .into_response(),
        "expired" => StatusCode::UNAUTHORIZED.into_response(),
        "busy" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        "throttled" => StatusCode::TOO_MANY_REQUESTS.into_response(),
        "forbidden" => StatusCode::FORBIDDEN.into_response(),
        "garbage" => (StatusCode::OK, "<html>not json</html>").into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"value": []})).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn paged(
    State(stub): State<StubGraph>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    stub.requests.lock().push((format!("paged/{}", id), query, auth));

    Json(json!({
        "value": [
            {"id": "I2", "name": "clip.mkv", "size": 5, "file": {"mimeType": "application/octet-stream"}}
        ]
    }))
    .into_response()
}

async fn start_stub() -> StubGraph {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let stub = StubGraph { base, requests: Arc::new(Mutex::new(Vec::new())) };

    let app = Router::new()
        .route("/me/drive/items/{id}/children", get(children))
        .route("/paged/{id}", get(paged))
        .with_state(stub.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    stub
}

fn client(stub: &StubGraph) -> GraphDriveClient {
    GraphDriveClient::new(
        &stub.base,
        RateLimitConfig {
            requests_per_second: 100,
            burst_size: 100,
            timeout: Duration::from_millis(500),
        },
    )
    .unwrap()
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_lists_first_page_and_follows_next_link() {
    let stub = start_stub().await;
    let graph = client(&stub);

    let first = graph.list_children("tok-1", "root", None).await.unwrap();
    assert_eq!(
        first.entries,
        vec![
            RemoteEntry::Folder { id: "F1".into(), name: "Shows".into() },
            RemoteEntry::File {
                id: "I1".into(),
                name: "movie.mp4".into(),
                size: 1000,
                mime_type: "video/mp4".into(),
                download_url: Some("https://dl.example/I1".into()),
            },
        ]
    );
    let cursor = first.next_cursor.clone().unwrap();
    assert_eq!(cursor, format!("{}/paged/root?$skiptoken=page2", stub.base));

    let second = graph.list_children("tok-1", "root", Some(&cursor)).await.unwrap();
    assert_eq!(second.entries.len(), 1);
    assert!(second.next_cursor.is_none());

    let requests = stub.requests.lock().clone();
    assert_eq!(requests.len(), 2);

    let (id, query, auth) = &requests[0];
    assert_eq!(id, "root");
    assert_eq!(
        query.as_deref(),
        Some("$select=id,name,file,folder,size,mimeType,@microsoft.graph.downloadUrl")
    );
    assert_eq!(auth.as_deref(), Some("Bearer tok-1"));

    let (id, query, auth) = &requests[1];
    assert_eq!(id, "paged/root");
    assert_eq!(query.as_deref(), Some("$skiptoken=page2"));
    assert_eq!(auth.as_deref(), Some("Bearer tok-1"));
}

// ============================================================================
// Failure classification
// ============================================================================

#[tokio::test]
async fn test_unauthorized_is_auth_expired() {
    let stub = start_stub().await;
    let result = client(&stub).list_children("stale", "expired", None).await;
    assert_eq!(result, Err(DriveError::AuthExpired));
}

#[tokio::test]
async fn test_throttling_and_server_errors_are_transient() {
    let stub = start_stub().await;
    let graph = client(&stub);

    for folder in ["busy", "throttled"] {
        let err = graph.list_children("tok", folder, None).await.unwrap_err();
        assert!(err.is_retryable(), "{} should be transient, got {:?}", folder, err);
    }
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let stub = start_stub().await;
    let err = client(&stub).list_children("tok", "slow", None).await.unwrap_err();
    assert!(matches!(err, DriveError::Transient(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_unreachable_host_is_transient() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let graph = GraphDriveClient::new(&base, RateLimitConfig::default()).unwrap();
    let err = graph.list_children("tok", "root", None).await.unwrap_err();
    assert!(matches!(err, DriveError::Transient(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_bad_body_and_other_statuses_are_protocol_errors() {
    let stub = start_stub().await;
    let graph = client(&stub);

    for folder in ["garbage", "forbidden", "missing"] {
        let err = graph.list_children("tok", folder, None).await.unwrap_err();
        assert!(matches!(err, DriveError::Protocol(_)), "{} gave {:?}", folder, err);
        assert!(!err.is_retryable());
    }
}

#![cfg(feature = "server")]

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use upnflow::MemoryFlowStore;
use upnflow::serve::router;

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, header::HeaderMap, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => request.body(Body::empty())?,
    };
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await?.to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, headers, json))
}

#[tokio::test]
async fn responses_are_never_cached() -> Result<()> {
    let app = router(Arc::new(MemoryFlowStore::new()));
    let (status, headers, body) = send(&app, "GET", "/api/flows", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    assert_eq!(headers[header::CACHE_CONTROL], "no-store, max-age=0");
    assert_eq!(headers[header::PRAGMA], "no-cache");
    Ok(())
}

#[tokio::test]
async fn create_fetch_and_list_roots() -> Result<()> {
    let app = router(Arc::new(MemoryFlowStore::new()));

    let (status, _, root) = send(
        &app,
        "POST",
        "/api/flows",
        Some(json!({ "name": "Order handling", "template": "basic" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let root_id = root["id"].as_str().expect("created id").to_string();
    assert_eq!(root["flow_data"]["nodes"].as_array().map(Vec::len), Some(3));

    let (status, _, _) = send(
        &app,
        "POST",
        "/api/flows",
        Some(json!({ "name": "Approve", "parent_flow_id": root_id })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (_, _, roots) = send(&app, "GET", "/api/flows", None).await?;
    assert_eq!(roots.as_array().map(Vec::len), Some(1));
    assert_eq!(roots[0]["name"], "Order handling");

    let (_, _, all) = send(&app, "GET", "/api/flows/all", None).await?;
    assert_eq!(all.as_array().map(Vec::len), Some(2));

    let (status, _, fetched) = send(&app, "GET", &format!("/api/flows/{root_id}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Order handling");
    Ok(())
}

#[tokio::test]
async fn missing_flows_and_bad_input_map_to_client_errors() -> Result<()> {
    let app = router(Arc::new(MemoryFlowStore::new()));

    let (status, _, _) = send(&app, "GET", "/api/flows/nope", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, "POST", "/api/flows", Some(json!({ "name": "  " }))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &app,
        "POST",
        "/api/flows/nope/duplicate",
        Some(json!({ "new_name": "Copy" })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn duplicate_then_delete_recursively() -> Result<()> {
    let app = router(Arc::new(MemoryFlowStore::new()));
    let (_, _, root) = send(
        &app,
        "POST",
        "/api/flows",
        Some(json!({ "name": "Root", "template": "basic" })),
    )
    .await?;
    let root_id = root["id"].as_str().expect("root id").to_string();

    let (status, _, copy) = send(
        &app,
        "POST",
        &format!("/api/flows/{root_id}/duplicate"),
        Some(json!({ "new_name": "Root copy" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(copy["name"], "Root copy");

    let (status, _, deleted) = send(&app, "DELETE", &format!("/api/flows/{root_id}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["deleted"], json!([root_id]));

    let (_, _, roots) = send(&app, "GET", "/api/flows", None).await?;
    assert_eq!(roots.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn malformed_graphs_are_rejected_before_storage() -> Result<()> {
    let app = router(Arc::new(MemoryFlowStore::new()));
    let flow_data = json!({
        "nodes": [
            { "id": "n", "type": "end", "position": { "x": 0.0, "y": 0.0 }, "data": {} }
        ],
        "edges": [
            {
                "id": "e1",
                "source": "n",
                "target": "ghost",
                "sourceHandle": "r1",
                "targetHandle": "l1"
            }
        ]
    });

    let (status, _, _) = send(
        &app,
        "POST",
        "/api/flows",
        Some(json!({ "name": "Broken", "flow_data": flow_data })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, all) = send(&app, "GET", "/api/flows/all", None).await?;
    assert_eq!(all, json!([]));
    Ok(())
}

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info};

use crate::database::{Database, DatabaseConfig};
use crate::drilldown::{delete_flow, duplicate_flow};
use crate::error::FlowError;
use crate::flows::{FlowTemplate, SqliteFlowStore, template_flow_data};
use crate::model::{FlowData, FlowRecord, FlowSummary};
use crate::repository::{FlowStore, FlowUpdate, NewFlow};

/// Arguments for running the upnflow HTTP API.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5151)]
    pub port: u16,
}

type ApiError = (StatusCode, String);

#[derive(Debug, Deserialize)]
struct CreateFlowRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    flow_data: Option<FlowData>,
    #[serde(default)]
    parent_flow_id: Option<String>,
    #[serde(default)]
    note: String,
    #[serde(default)]
    template: Option<FlowTemplate>,
}

#[derive(Debug, Deserialize)]
struct DuplicateFlowRequest {
    #[serde(default)]
    new_name: String,
}

#[derive(Debug, Serialize)]
struct DeleteFlowResponse {
    deleted: Vec<String>,
}

/// The flow API over `store`. Every response is marked uncacheable so a read
/// after a write always reaches the store.
pub fn router<S: FlowStore + 'static>(store: Arc<S>) -> Router {
    Router::new()
        .route("/api/flows", get(list_roots::<S>).post(create_flow::<S>))
        .route("/api/flows/all", get(list_all::<S>))
        .route(
            "/api/flows/:id",
            get(get_flow::<S>).put(update_flow::<S>).delete(remove_flow::<S>),
        )
        .route("/api/flows/:id/duplicate", post(duplicate::<S>))
        .with_state(store)
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store, max-age=0"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::PRAGMA,
                    HeaderValue::from_static("no-cache"),
                )),
        )
}

pub async fn run_serve(args: ServeArgs, config: DatabaseConfig) -> Result<()> {
    let db = Database::new(config).await?;
    info!(path = %db.config().path.display(), "using flow database");
    let app = router(Arc::new(SqliteFlowStore::new(db)));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    println!("upnflow server listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    info!("server stopped");
    Ok(())
}

async fn list_roots<S: FlowStore>(
    State(store): State<Arc<S>>,
) -> Result<Json<Vec<FlowSummary>>, ApiError> {
    store.list_roots().await.map(Json).map_err(flow_error)
}

async fn list_all<S: FlowStore>(
    State(store): State<Arc<S>>,
) -> Result<Json<Vec<FlowSummary>>, ApiError> {
    store.list_all().await.map(Json).map_err(flow_error)
}

async fn create_flow<S: FlowStore>(
    State(store): State<Arc<S>>,
    Json(payload): Json<CreateFlowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flow_data = payload
        .flow_data
        .unwrap_or_else(|| template_flow_data(payload.template.unwrap_or_default()));
    let record = store
        .create(NewFlow {
            name: payload.name,
            flow_data,
            parent_flow_id: payload.parent_flow_id,
            note: payload.note,
        })
        .await
        .map_err(flow_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_flow<S: FlowStore>(
    State(store): State<Arc<S>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<FlowRecord>, ApiError> {
    store.fetch(&id).await.map(Json).map_err(flow_error)
}

async fn update_flow<S: FlowStore>(
    State(store): State<Arc<S>>,
    AxumPath(id): AxumPath<String>,
    Json(update): Json<FlowUpdate>,
) -> Result<Json<FlowRecord>, ApiError> {
    store.update(&id, update).await.map(Json).map_err(flow_error)
}

async fn remove_flow<S: FlowStore>(
    State(store): State<Arc<S>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<DeleteFlowResponse>, ApiError> {
    let deleted = delete_flow(store.as_ref(), &id).await.map_err(flow_error)?;
    Ok(Json(DeleteFlowResponse { deleted }))
}

async fn duplicate<S: FlowStore>(
    State(store): State<Arc<S>>,
    AxumPath(id): AxumPath<String>,
    Json(payload): Json<DuplicateFlowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = duplicate_flow(store.as_ref(), &id, &payload.new_name)
        .await
        .map_err(flow_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

fn flow_error(err: FlowError) -> ApiError {
    let status = match &err {
        FlowError::NotFound(_) | FlowError::NodeNotFound(_) | FlowError::EdgeNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        FlowError::Validation(_) | FlowError::DrilldownCycle(_) => StatusCode::BAD_REQUEST,
        FlowError::SaveInProgress(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "request failed");
    }
    (status, err.to_string())
}

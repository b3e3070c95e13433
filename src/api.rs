//! Read-only HTTP view of a [`Manager`].
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::ToSocketAddrs;

use crate::error::Error;
use crate::events::EventRequest;
use crate::info::{ContainerInfo, ContainerInfoRequest};
use crate::manager::Manager;

mod models;

pub use models::{EventParams, InfoParams, ParamError, SubcontainersResponse};

type SharedManager = State<Arc<Manager>>;

/// Maps manager and query parameter errors onto status codes.
enum ApiError {
    Manager(Error),
    BadRequest(ParamError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            ApiError::Manager(err) => {
                let status = match &err {
                    Error::NotFound(_) => StatusCode::NOT_FOUND,
                    Error::Handler { .. } => StatusCode::BAD_GATEWAY,
                    Error::Storage { .. } | Error::Configuration(_) | Error::Host(_) => {
                        log::error!("{err}");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.to_string())
            }
        };
        (status, Json(models::ErrorBody { error })).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Manager(err)
    }
}

impl From<ParamError> for ApiError {
    fn from(err: ParamError) -> Self {
        Self::BadRequest(err)
    }
}

fn canonical(name: &str) -> String {
    format!("/{}", name.trim_start_matches('/'))
}

async fn container_info(
    manager: &Manager,
    name: &str,
    params: InfoParams,
) -> Result<Json<ContainerInfo>, ApiError> {
    let request = ContainerInfoRequest::try_from(params)?;
    let info = manager
        .get_container_info(&canonical(name), &request)
        .await?;
    Ok(Json(info))
}

async fn root_container(
    State(manager): SharedManager,
    Query(params): Query<InfoParams>,
) -> Result<impl IntoResponse, ApiError> {
    container_info(&manager, "/", params).await
}

async fn container(
    State(manager): SharedManager,
    Path(name): Path<String>,
    Query(params): Query<InfoParams>,
) -> Result<impl IntoResponse, ApiError> {
    container_info(&manager, &name, params).await
}

async fn subcontainers_of(
    manager: &Manager,
    name: &str,
    params: InfoParams,
) -> Result<Json<SubcontainersResponse>, ApiError> {
    let request = ContainerInfoRequest::try_from(params)?;
    let result = manager
        .get_requested_containers(&canonical(name), &request)
        .await?;
    if result.is_partial() {
        log::debug!(
            "Partial subtree query for `{}`: {} failures",
            name,
            result.failures.len()
        );
    }
    Ok(Json(result.into()))
}

async fn root_subcontainers(
    State(manager): SharedManager,
    Query(params): Query<InfoParams>,
) -> Result<impl IntoResponse, ApiError> {
    subcontainers_of(&manager, "/", params).await
}

async fn subcontainers(
    State(manager): SharedManager,
    Path(name): Path<String>,
    Query(params): Query<InfoParams>,
) -> Result<impl IntoResponse, ApiError> {
    subcontainers_of(&manager, &name, params).await
}

async fn docker_container(
    State(manager): SharedManager,
    Path(id): Path<String>,
    Query(params): Query<InfoParams>,
) -> Result<impl IntoResponse, ApiError> {
    let request = ContainerInfoRequest::try_from(params)?;
    let info = manager.get_docker_container(&id, &request).await?;
    Ok(Json(info))
}

async fn events(
    State(manager): SharedManager,
    Query(params): Query<EventParams>,
) -> Result<impl IntoResponse, ApiError> {
    let request = EventRequest::try_from(params)?;
    Ok(Json(manager.get_events(&request)))
}

async fn machine(State(manager): SharedManager) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(manager.machine_info()?))
}

pub fn router(manager: Arc<Manager>) -> axum::Router {
    axum::Router::new()
        .route("/api/v1/containers", get(root_container))
        .route("/api/v1/containers/{*name}", get(container))
        .route("/api/v1/subcontainers", get(root_subcontainers))
        .route("/api/v1/subcontainers/{*name}", get(subcontainers))
        .route("/api/v1/docker/{id}", get(docker_container))
        .route("/api/v1/events", get(events))
        .route("/api/v1/machine", get(machine))
        .with_state(manager)
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self {
            router: router(manager),
        }
    }

    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("Serving API on {}", listener.local_addr()?);
        axum::serve(listener, self.router.into_make_service()).await
    }
}

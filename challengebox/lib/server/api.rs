use std::{collections::BTreeSet, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
    catalog,
    lifecycle::{LifecycleManager, ReclaimTarget},
    models::HostConfigUpdate,
    platform::Session,
    ChallengeboxError, ChallengeboxResult,
};

use super::{
    ContainerQuery, DataResponse, DockerConfigPage, ErrorResponse, ErrorType, HostConfigView,
    ImageEntry, InstanceView, NukeQuery, ServerState, EMPTY_CATALOG_PLACEHOLDER,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The challengebox HTTP server.
pub struct ChallengeboxServer {
    /// Address to listen on
    addr: SocketAddr,

    /// Shared state handed to every handler
    state: ServerState,

    /// Interval of the background sweep, if enabled
    sweep_interval: Option<Duration>,
}

/// An error rendered as a JSON [`ErrorResponse`] with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Caller(pub Session);

/// The authenticated caller of a request, who must be an administrator.
#[derive(Debug, Clone)]
pub struct Admin(pub Session);

/// Type alias for the standard API response
type ApiResponse<T> = Result<Json<T>, ApiError>;

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ChallengeboxServer {
    /// Create a new server instance
    pub fn new(addr: SocketAddr, state: ServerState, sweep_interval: Option<Duration>) -> Self {
        Self {
            addr,
            state,
            sweep_interval,
        }
    }

    /// The router serving every endpoint.
    pub fn router(state: ServerState) -> Router {
        Router::new()
            .route("/api/v1/container", get(container).post(container))
            .route("/api/v1/docker_status", get(docker_status).post(docker_status))
            .route("/api/v1/docker", get(docker_images).post(docker_images))
            .route("/api/v1/nuke", get(nuke).post(nuke))
            .route(
                "/admin/docker_config",
                get(docker_config).post(save_docker_config),
            )
            .route("/admin/docker_status", get(admin_docker_status))
            .with_state(state)
    }

    /// Serves until interrupted with Ctrl-C.
    pub async fn serve(self) -> ChallengeboxResult<()> {
        let sweeper = self
            .sweep_interval
            .map(|interval| spawn_sweeper(Arc::clone(self.state.lifecycle()), interval));

        let app = Self::router(self.state);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("Server listening on {}", self.addr);

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        tracing::info!("Server stopped");
        Ok(())
    }
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: StatusCode, message: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            status,
            body: ErrorResponse::new(status.as_u16(), message.into(), error_type),
        }
    }

    /// The status code sent to the client.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn unauthenticated() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "Not signed in",
            ErrorType::AuthenticationError,
        )
    }

    fn forbidden(message: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, message, ErrorType::Forbidden)
    }

    fn with_details(mut self, details: String) -> Self {
        self.body = self.body.with_details(details);
        self
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<ChallengeboxError> for ApiError {
    fn from(error: ChallengeboxError) -> Self {
        let api_error = match &error {
            ChallengeboxError::ImageNotOffered(_) => {
                Self::forbidden("Image not offered").with_details(error.to_string())
            }
            ChallengeboxError::TooSoon { .. } => {
                Self::forbidden("An instance was started recently").with_details(error.to_string())
            }
            ChallengeboxError::NoHostConfig(_) => Self::new(
                StatusCode::NOT_FOUND,
                "No container host configured",
                ErrorType::NotFound,
            ),
            ChallengeboxError::InstanceNotFound(_) | ChallengeboxError::ChallengeNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, error.to_string(), ErrorType::NotFound)
            }
            ChallengeboxError::InvalidHostConfig(_)
            | ChallengeboxError::InvalidImageReference(_)
            | ChallengeboxError::InvalidOwnerKind(_) => Self::new(
                StatusCode::BAD_REQUEST,
                error.to_string(),
                ErrorType::ValidationError,
            ),
            ChallengeboxError::PortExhausted { .. } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "No free ports on the container host",
                ErrorType::ProvisioningError,
            ),
            e if e.is_engine_error() => Self::new(
                StatusCode::BAD_GATEWAY,
                "Failed to provision container",
                ErrorType::ProvisioningError,
            ),
            _ => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                ErrorType::InternalError,
            ),
        };

        if api_error.status.is_server_error() {
            tracing::error!("request failed: {}", error);
        } else {
            tracing::debug!("request rejected: {}", error);
        }

        api_error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl FromRequestParts<ServerState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        state
            .resolver()
            .resolve(&parts.headers)
            .map(Caller)
            .ok_or_else(ApiError::unauthenticated)
    }
}

impl FromRequestParts<ServerState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let Caller(session) = Caller::from_request_parts(parts, state).await?;
        if !session.is_admin {
            return Err(ApiError::forbidden("Administrators only"));
        }

        Ok(Admin(session))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

/// Provisions or reverts the caller's instance of `name`.
async fn container(
    State(state): State<ServerState>,
    Caller(session): Caller,
    Query(query): Query<ContainerQuery>,
) -> Result<StatusCode, ApiError> {
    let Some(image) = query.name.filter(|name| !name.trim().is_empty()) else {
        return Err(ApiError::forbidden("No image requested"));
    };

    tracing::info!("container request for {} by {}", image, session.owner);
    state
        .lifecycle()
        .request_container(&session.owner, &image)
        .await?;

    Ok(StatusCode::OK)
}

/// Lists the caller's instances.
async fn docker_status(
    State(state): State<ServerState>,
    Caller(session): Caller,
) -> ApiResponse<DataResponse<Vec<InstanceView>>> {
    let records = state.lifecycle().instances_for(&session.owner).await?;
    Ok(Json(DataResponse::ok(
        records.iter().map(InstanceView::new).collect(),
    )))
}

/// Lists the tagged images of the reference host, restricted by its allow-list.
async fn docker_images(State(state): State<ServerState>, Admin(_): Admin) -> Response {
    let images = match reference_catalog(state.lifecycle(), true).await {
        Ok(images) => images,
        Err(e) => return ApiError::from(e).into_response(),
    };

    if images.is_empty() {
        let placeholder = vec![ImageEntry {
            name: EMPTY_CATALOG_PLACEHOLDER.to_string(),
        }];
        return (
            StatusCode::BAD_REQUEST,
            Json(DataResponse::failed(placeholder)),
        )
            .into_response();
    }

    let entries: Vec<ImageEntry> = images
        .into_iter()
        .map(|name| ImageEntry { name })
        .collect();
    Json(DataResponse::ok(entries)).into_response()
}

/// Force-deletes one or every tracked instance. Answers whether everything was torn down.
async fn nuke(
    State(state): State<ServerState>,
    Admin(session): Admin,
    Query(query): Query<NukeQuery>,
) -> Json<bool> {
    let target = if query.all.as_deref() == Some("true") {
        ReclaimTarget::All
    } else {
        let Some(engine_instance_id) = query
            .container
            .filter(|container| !container.is_empty() && container != "null")
        else {
            return Json(false);
        };

        ReclaimTarget::Instance {
            engine_instance_id,
            owner_id: query.owner_id.filter(|id| !id.is_empty()),
        }
    };

    tracing::info!("nuke requested by {}: {:?}", session.owner, target);
    match state.lifecycle().admin_force_delete(target).await {
        Ok(report) => {
            for failure in &report.failures {
                tracing::warn!(
                    "nuke of {} left a failure: {}",
                    failure.engine_instance_id,
                    failure.error
                );
            }
            Json(report.is_clean())
        }
        Err(e) => {
            tracing::warn!("nuke failed: {}", e);
            Json(false)
        }
    }
}

/// Lists host configurations and the repositories an allow-list can be built from.
async fn docker_config(
    State(state): State<ServerState>,
    Admin(_): Admin,
) -> ApiResponse<DataResponse<DockerConfigPage>> {
    let lifecycle = state.lifecycle();
    let configs = lifecycle.get_hosts().list().await?;
    let available_repositories = reference_catalog(lifecycle, false).await?;

    Ok(Json(DataResponse::ok(DockerConfigPage {
        configs: configs.iter().map(HostConfigView::new).collect(),
        available_repositories: available_repositories.into_iter().collect(),
    })))
}

/// Creates or replaces the host configuration of one owner.
async fn save_docker_config(
    State(state): State<ServerState>,
    Admin(session): Admin,
    Json(update): Json<HostConfigUpdate>,
) -> ApiResponse<DataResponse<HostConfigView>> {
    tracing::info!(
        "host config of owner {} set to {} by {}",
        update.owner_id,
        update.hostname,
        session.owner
    );
    let host = state.lifecycle().save_host(update).await?;
    Ok(Json(DataResponse::ok(HostConfigView::new(&host))))
}

/// Lists every tracked instance.
async fn admin_docker_status(
    State(state): State<ServerState>,
    Admin(_): Admin,
) -> ApiResponse<DataResponse<Vec<InstanceView>>> {
    let records = state.lifecycle().all_instances().await?;
    Ok(Json(DataResponse::ok(
        records.iter().map(InstanceView::new).collect(),
    )))
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// The catalog of the reference host, empty when no host is configured.
async fn reference_catalog(
    lifecycle: &LifecycleManager,
    with_tags: bool,
) -> ChallengeboxResult<BTreeSet<String>> {
    let Some(host) = lifecycle.get_hosts().reference().await? else {
        return Ok(BTreeSet::new());
    };

    let restrict_to = if with_tags {
        host.get_allowed_repositories().clone()
    } else {
        BTreeSet::new()
    };

    Ok(catalog::list_images(lifecycle.get_engine().as_ref(), &host, with_tags, &restrict_to).await)
}

/// Runs [`LifecycleManager::sweep_all`] every `interval`.
fn spawn_sweeper(lifecycle: Arc<LifecycleManager>, interval: Duration) -> JoinHandle<()> {
    tracing::info!("sweeping stale instances every {:?}", interval);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match lifecycle.sweep_all().await {
                Ok(0) => tracing::debug!("sweep found nothing stale"),
                Ok(count) => tracing::info!("sweep reclaimed {} stale instance(s)", count),
                Err(e) => tracing::warn!("sweep failed: {}", e),
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("could not listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

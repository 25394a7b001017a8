//! HTTP surface
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /images/detail/*name` | 202 while analyzing, the analysis once done |
//! | `GET /images/tree/*name?layer=N` | file tree of one layer |
//! | `GET /images/caches` | all fresh cache entries |
//! | `GET /ping` | liveness probe |

use crate::cache::Entry;
use crate::config::schema::ServerConfig;
use crate::error::{ErrorKind, StrataError, StrataResult};
use crate::views::{parse_image_name, parse_layer_index, ImageViews, Summary};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct AppState {
    views: ImageViews,
    cache_control: Option<HeaderValue>,
}

#[derive(Debug, Deserialize)]
struct TreeParams {
    layer: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    category: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

/// Error wrapper rendering a [`StrataError`] as an HTTP response
#[derive(Debug)]
pub struct ApiError(StrataError);

impl From<StrataError> for ApiError {
    fn from(err: StrataError) -> Self {
        Self(err)
    }
}

/// HTTP status for an error
pub fn status_for(err: &StrataError) -> StatusCode {
    match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotReady => StatusCode::CONFLICT,
        ErrorKind::Analysis | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        } else {
            debug!(error = %self.0, "Request rejected");
        }
        let body = ErrorBody {
            category: self.0.kind().as_str(),
            message: self.0.to_string(),
            hint: self.0.hint(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router over the given views
pub fn router(views: ImageViews, server: &ServerConfig) -> Router {
    let cache_control = server
        .cache_control()
        .and_then(|value| HeaderValue::from_str(&value).ok());

    Router::new()
        .route("/ping", get(ping))
        .route("/images/detail/*name", get(image_detail))
        .route("/images/tree/*name", get(image_tree))
        .route("/images/caches", get(image_caches))
        .with_state(AppState {
            views,
            cache_control,
        })
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(
    views: ImageViews,
    server: &ServerConfig,
    shutdown: F,
) -> StrataResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = server
        .listen
        .parse()
        .map_err(|e: std::net::AddrParseError| StrataError::ListenAddress {
            addr: server.listen.clone(),
            reason: e.to_string(),
        })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| StrataError::io(format!("binding {}", addr), e))?;
    info!(addr = %addr, dev = server.dev, "Listening");

    axum::serve(listener, router(views, server))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| StrataError::io("serving HTTP", e))
}

async fn ping() -> &'static str {
    "pong"
}

fn with_cache_hint(state: &AppState, mut response: Response) -> Response {
    if let Some(value) = &state.cache_control {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, value.clone());
    }
    response
}

async fn image_detail(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let image = parse_image_name(&name)?;

    match state.views.summary(image)? {
        Summary::Accepted => Ok(StatusCode::ACCEPTED.into_response()),
        Summary::Ready(analysis) => Ok(with_cache_hint(
            &state,
            Json(analysis.as_ref()).into_response(),
        )),
    }
}

async fn image_tree(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<TreeParams>,
) -> Result<Response, ApiError> {
    let index = parse_layer_index(params.layer.as_deref())?;
    let image = parse_image_name(&name)?;

    let detail = state.views.layer(image, index)?;
    Ok(with_cache_hint(&state, Json(detail).into_response()))
}

async fn image_caches(State(state): State<AppState>) -> Json<BTreeMap<String, Entry>> {
    Json(state.views.caches())
}

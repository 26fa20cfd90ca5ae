//! HTTP surface exposing annotated commands
//!
//! Every request reloads the manifest and builds its own API-mode [`Runtime`], so nothing is
//! shared between requests apart from the manifest path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::validate_request::ValidateRequestHeaderLayer;

use crate::output::Output;
use crate::runtime::{Context, EXIT_FAILURE, Runtime};

pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8113";
pub const USERNAME_VARIABLE: &str = "CENTRY_SERVE_USERNAME";
pub const PASSWORD_VARIABLE: &str = "CENTRY_SERVE_PASSWORD";

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("failed to start the async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_ADDRESS)]
    pub address: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExecuteRequest {
    /// Command line, split with shell word rules
    #[serde(default)]
    pub args: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecuteResponse {
    /// `<name> <version>` of the manifest
    pub centry: String,
    /// Combined stdout and stderr of the command
    pub result: String,
    #[serde(rename = "exitCode")]
    pub exit_code: i32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexResponse {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    /// Credentials from the environment, only when both are set and non-empty
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let username = std::env::var(USERNAME_VARIABLE).ok().filter(|v| !v.is_empty())?;
        let password = std::env::var(PASSWORD_VARIABLE).ok().filter(|v| !v.is_empty())?;
        Some(BasicAuth { username, password })
    }
}

#[derive(Clone)]
struct ServeState {
    manifest_path: Arc<PathBuf>,
}

/// Routes of the server, guarded by basic auth when credentials are given
pub fn router(manifest_path: PathBuf, auth: Option<&BasicAuth>) -> Router {
    let state = ServeState {
        manifest_path: Arc::new(manifest_path),
    };
    let mut router = Router::new()
        .route("/", get(index))
        .route("/commands/", post(execute))
        .with_state(state);
    if let Some(auth) = auth {
        router = router.layer(ValidateRequestHeaderLayer::basic(
            &auth.username,
            &auth.password,
        ));
    }
    router.layer(middleware::from_fn(log_requests))
}

async fn log_requests(request: Request, next: Next) -> Response {
    debug!("HTTP {} {}", request.method(), request.uri().path());
    let response = next.run(request).await;
    debug!("HTTP {}", response.status());
    response
}

async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {})
}

async fn execute(State(state): State<ServeState>, body: Bytes) -> Response {
    let request: ExecuteRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let response = ExecuteResponse {
                result: format!("invalid request body: {e}"),
                exit_code: EXIT_FAILURE,
                ..Default::default()
            };
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let path = Arc::clone(&state.manifest_path);
    match tokio::task::spawn_blocking(move || execute_command_line(&path, &request.args)).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!("command execution task failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Run one command line against a freshly loaded manifest, capturing its output
#[must_use]
pub fn execute_command_line(manifest_path: &Path, line: &str) -> ExecuteResponse {
    let Some(args) = shlex::split(line) else {
        return ExecuteResponse {
            result: format!("invalid command line: {line}"),
            exit_code: EXIT_FAILURE,
            ..Default::default()
        };
    };

    let manifest = match crate::load_manifest(manifest_path) {
        Ok(manifest) => manifest,
        Err(e) => {
            let result = format!("unable to create runtime: {e}");
            error!("{result}");
            return ExecuteResponse {
                result,
                exit_code: EXIT_FAILURE,
                ..Default::default()
            };
        }
    };

    let output = Output::buffered();
    let mut runtime = Runtime::new(manifest, args, Context::api(output.clone()));
    let exit_code = runtime.execute();
    let config = &runtime.manifest().config;
    ExecuteResponse {
        centry: format!("{} {}", config.name, config.version),
        result: output.captured(),
        exit_code,
    }
}

/// Serve until interrupted. Blocks on its own tokio runtime.
///
/// # Errors
///
/// Returns `ServeError` if the runtime cannot start, the address cannot be bound, or the
/// server fails.
pub fn run(manifest_path: &Path, args: &ServeArgs) -> Result<(), ServeError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(ServeError::Runtime)?
        .block_on(serve(manifest_path.to_path_buf(), args.address.clone()))
}

async fn serve(manifest_path: PathBuf, address: String) -> Result<(), ServeError> {
    let auth = BasicAuth::from_env();
    let app = router(manifest_path, auth.as_ref());

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| ServeError::Bind {
            address: address.clone(),
            source,
        })?;

    if auth.is_some() {
        info!("listening on {address}");
    } else {
        warn!("listening on {address} without basic auth");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            debug!("shutting down the server");
        })
        .await
        .map_err(ServeError::Server)
}

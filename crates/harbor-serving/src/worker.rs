//! The HTTP worker: `GET /ping` and `POST /invocations`.

use crate::error::ServingError;
use crate::logging::RequestLoggerLayer;
use crate::module::ServingModule;
use crate::transformer::Transformer;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use harbor_core::ServingEnvironment;
use http::{HeaderMap, StatusCode, header};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Largest accepted request body.
pub const MAX_REQUEST_BYTES: usize = 6 * 1024 * 1024;

/// Legacy `ContentType` header, read before `Content-Type`. Header names are
/// case-insensitive.
pub const LEGACY_CONTENT_TYPE_HEADER: &str = "contenttype";

#[derive(Clone)]
struct AppState {
    transformer: Arc<Transformer>,
    timeout: Duration,
    /// Held by each running prediction until `predict_fn` returns, even when
    /// the request has already timed out.
    permits: Arc<Semaphore>,
}

impl IntoResponse for ServingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.exposes_message() {
            tracing::warn!(status = status.as_u16(), "{self}");
            (status, self.to_string()).into_response()
        } else {
            tracing::error!(status = status.as_u16(), "{self}");
            status.into_response()
        }
    }
}

/// Builds the worker routes around `transformer`.
///
/// At most `max_concurrency` predictions run at once; further requests wait,
/// and the wait counts against `timeout`.
pub fn router(transformer: Arc<Transformer>, max_concurrency: usize, timeout: Duration) -> Router {
    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let state = AppState { transformer, timeout, permits };
    Router::new()
        .route("/ping", get(ping))
        .route("/invocations", post(invocations))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(RequestLoggerLayer)
        .with_state(state)
}

async fn ping(State(state): State<AppState>) -> StatusCode {
    if state.transformer.is_ready() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE }
}

async fn invocations(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let header_str =
        |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    let content_type = header_str(LEGACY_CONTENT_TYPE_HEADER)
        .or_else(|| header_str(header::CONTENT_TYPE.as_str()));
    let accept = header_str(header::ACCEPT.as_str());

    let transformer = state.transformer.clone();
    let permits = state.permits.clone();
    let work = async move {
        let Ok(permit) = permits.acquire_owned().await else {
            return Err(ServingError::Internal(anyhow::anyhow!("worker is shutting down")));
        };
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            transformer.transform(&body, content_type.as_deref(), accept.as_deref())
        });
        match task.await {
            Ok(result) => result,
            Err(e) => Err(ServingError::Internal(anyhow::anyhow!("inference task failed: {e}"))),
        }
    };

    let result = match tokio::time::timeout(state.timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(ServingError::Internal(anyhow::anyhow!(
            "inference exceeded the model server timeout of {}s",
            state.timeout.as_secs_f32()
        ))),
    };

    match result {
        Ok(encoded) => {
            ([(header::CONTENT_TYPE, encoded.content_type)], encoded.body).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// A single serving worker process.
pub struct Worker {
    env: ServingEnvironment,
    transformer: Arc<Transformer>,
}

impl Worker {
    pub fn new(env: ServingEnvironment, module: Arc<dyn ServingModule>) -> Self {
        let transformer = Arc::new(Transformer::new(module, env.model_dir()));
        Self { env, transformer }
    }

    pub fn transformer(&self) -> &Arc<Transformer> {
        &self.transformer
    }

    pub fn router(&self) -> Router {
        router(
            self.transformer.clone(),
            self.env.model_server_workers(),
            self.env.model_server_timeout(),
        )
    }

    /// Serves until SIGTERM or Ctrl-C.
    ///
    /// The model loads in the background; `/ping` answers 503 until it is
    /// ready. A failed load stops the worker with that error.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.env.bind()).await?;
        let addr = listener.local_addr()?;
        if self.env.use_nginx() {
            tracing::info!(%addr, "worker listening behind the reverse proxy");
        } else {
            tracing::info!(%addr, "worker listening");
        }

        let load_failed = Arc::new(Notify::new());
        let transformer = self.transformer.clone();
        let init = tokio::task::spawn_blocking({
            let load_failed = load_failed.clone();
            move || {
                let result = transformer.initialize();
                if result.is_err() {
                    load_failed.notify_one();
                }
                result
            }
        });

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal(load_failed))
            .await?;

        if init.is_finished() {
            init.await??;
        }
        tracing::info!("worker stopped");
        Ok(())
    }
}

async fn shutdown_signal(load_failed: Arc<Notify>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
        () = load_failed.notified() => tracing::error!("model failed to load, shutting down"),
    }
}

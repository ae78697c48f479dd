//! HTTP surface: `/api/generate-pfp`.

use std::sync::Arc;

use ascend_pfp_types::api::{ErrorBody, GeneratePfpResponse};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::pfp::{PfpError, PfpRequest, ProfilePictureService};

pub const GENERATE_PFP_ROUTE: &str = "/api/generate-pfp";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProfilePictureService>,
}

/// 构建路由（含 CORS 头、请求体上限与请求日志）。
pub fn router(config: Arc<Config>) -> Router {
    let body_limit = config.max_body_bytes;
    let state = AppState {
        service: Arc::new(ProfilePictureService::new(config)),
    };

    Router::new()
        .route(
            GENERATE_PFP_ROUTE,
            post(generate_pfp)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn generate_pfp(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> std::result::Result<Json<GeneratePfpResponse>, PfpError> {
    let body = body.map_err(reject_body)?;
    let request = PfpRequest::from_slice(&body)?;
    let url = state.service.generate(request).await?;
    Ok(Json(GeneratePfpResponse { url }))
}

/// 请求体读取失败：超出上限视为图片过大，其余视为缺少图片。
fn reject_body(rejection: BytesRejection) -> PfpError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PfpError::PayloadTooLarge
    } else {
        debug!("Failed to read request body: {rejection}");
        PfpError::missing_image()
    }
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorBody::new("Method not allowed")),
    )
}

impl IntoResponse for PfpError {
    fn into_response(self) -> Response {
        match &self {
            Self::InvalidRequest(_) | Self::PayloadTooLarge => {
                debug!("Rejected request: {}", self);
            }
            Self::UpstreamQuotaExceeded | Self::UpstreamEmptyResponse { .. } => {
                warn!("Upstream error: {}", self);
            }
            Self::Configuration(_) | Self::UpstreamUploadFailure(_) | Self::Unknown(_) => {
                error!("generate-pfp error: {}", self);
            }
        }

        let status = self.status_code();
        let body = match self {
            Self::UpstreamEmptyResponse { detail } => {
                ErrorBody::new("No image in response").with_detail(detail)
            }
            other => ErrorBody::new(other.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

/// 绑定地址并运行，直到收到 Ctrl+C 或 SIGTERM。
///
/// # Errors
/// 绑定端口或服务运行失败时返回 IO 错误。
pub async fn serve(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

use crate::cli::Args;
use crate::gateway::AdkGateway;
use crate::models::adk::{ ErrorEnvelope, RunRequest };
use std::error::Error;
use std::net::SocketAddr;
use axum::{
    routing::{ any, get, post },
    Router,
    Json,
    body::{ Body, Bytes },
    extract::{ Path, RawQuery, State },
    response::{ IntoResponse, Response },
    http::{ header, HeaderMap, Method, StatusCode },
};
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error, debug };

#[derive(Clone)]
struct AppState {
    gateway: AdkGateway,
}

/// Strips trailing slashes and forces a leading one. An empty result means
/// the gateway is only mounted at the root.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

pub fn create_router(gateway: AdkGateway, route_prefix: &str) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/run", post(run_handler).options(preflight_handler));

    let prefix = normalize_prefix(route_prefix);
    if !prefix.is_empty() {
        app = app
            .route(&format!("{}/health", prefix), get(health_handler))
            .route(&format!("{}/run", prefix), post(run_handler).options(preflight_handler))
            .route(&format!("{}/{{*path}}", prefix), any(forward_handler));
    }

    app.layer(cors).with_state(AppState { gateway })
}

pub async fn start_http_server(args: &Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = args.server_addr.parse::<SocketAddr>()?;
    let gateway = AdkGateway::new(&args.adk_base_url)?;
    info!("Forwarding {} to ADK server at {}", normalize_prefix(&args.route_prefix), gateway.base_url());
    let app = create_router(gateway, &args.route_prefix);

    if args.enable_tls {
        let (cert_path, key_path) = match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("TLS enabled without cert/key".into());
            }
        };
        info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        info!("Starting HTTPS gateway on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            e
        })?;
        info!("Starting HTTP gateway on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorEnvelope { error: message })).into_response()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.gateway.check_health().await;
    let code = if health.is_connected() { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };
    (code, Json(health))
}

async fn run_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match serde_json::from_slice::<RunRequest>(&body) {
        Ok(r) => r,
        Err(e) => {
            error!("Proxy error: invalid run request: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to communicate with ADK server: {}", e)
            );
        }
    };

    debug!(
        "Run turn app={} user={} session={}",
        request.app_name,
        request.user_id,
        request.session_id
    );
    match state.gateway.run_turn(&request).await {
        Ok(events) => Json(events).into_response(),
        Err(e) => {
            error!("Proxy error: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to communicate with ADK server: {}", e)
            )
        }
    }
}

async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

async fn forward_handler(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes
) -> Response {
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    match
        state.gateway.forward(method, &path, query.as_deref(), content_type, body.to_vec()).await
    {
        Ok(forwarded) => {
            let mut builder = Response::builder().status(forwarded.status);
            if let Some(ct) = forwarded.content_type {
                builder = builder.header(header::CONTENT_TYPE, ct);
            }
            builder
                .body(Body::from(forwarded.body))
                .unwrap_or_else(|e|
                    error_response(StatusCode::BAD_GATEWAY, format!("Invalid upstream response: {}", e))
                )
        }
        Err(e) => {
            error!("Forwarding /{} failed: {}", path, e);
            error_response(
                StatusCode::BAD_GATEWAY,
                format!("Failed to communicate with ADK server: {}", e)
            )
        }
    }
}

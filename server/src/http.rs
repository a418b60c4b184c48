use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Request, State},
    http::{
        self, HeaderName, HeaderValue, Method, StatusCode,
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        request::Parts,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use platform_authz::{AuthzError, Gatekeeper, PolicyStore, PolicySummary, RequestDescriptor, Role};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    forward::{ForwardError, Upstream},
};

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gate: Gatekeeper,
    pub upstream: Option<Upstream>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, gate: Gatekeeper) -> anyhow::Result<Self> {
        let upstream = match &config.upstream_url {
            Some(url) => {
                let upstream =
                    Upstream::new(url.as_str()).context("failed to build upstream client")?;
                info!(upstream = upstream.base_url(), "forwarding authorized requests");
                Some(upstream)
            }
            None => {
                warn!("UPSTREAM_URL not set; authorized data requests answer 501");
                None
            }
        };
        Ok(Self {
            config,
            gate,
            upstream,
        })
    }

    /// Build the store and gatekeeper described by `config`.
    pub fn from_config(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let store = Arc::new(PolicyStore::from_path(config.policy_path.clone()));
        let gate = Gatekeeper::with_static_secret(store, config.api_key.clone());
        Self::new(config, gate)
    }
}

/// Role resolved for the current request, available to handlers behind the
/// authorization middleware as a request extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRole(pub Role);

impl FromRequestParts<AppState> for ResolvedRole {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(resolved) = parts.extensions.get::<ResolvedRole>() {
            return Ok(resolved.clone());
        }
        let descriptor = describe(&parts.method, parts.uri.path(), &parts.headers);
        Ok(ResolvedRole(state.gate.resolve_role(&descriptor)))
    }
}

fn describe(method: &Method, path: &str, headers: &http::HeaderMap) -> RequestDescriptor {
    RequestDescriptor {
        path: path.to_string(),
        method: method.as_str().to_string(),
        // Non-UTF-8 credentials count as absent.
        auth_header: headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    #[cfg(unix)]
    spawn_reload_on_hangup(state.gate.policy().clone());

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "gateway listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/api", any(forward_handler))
        .route("/api/{*rest}", any(forward_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), authorize))
        .route("/health", get(health_handler))
        .route("/admin/policy", get(policy_handler))
        .route("/admin/policy/reload", post(reload_handler))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

/// Resolve the caller's role and enforce the policy table before any
/// collaborator handler runs.
async fn authorize(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> HttpResult<Response> {
    let descriptor = describe(request.method(), request.uri().path(), request.headers());
    let role = state.gate.authorize(&descriptor)?;
    request.extensions_mut().insert(ResolvedRole(role));
    Ok(next.run(request).await)
}

async fn forward_handler(
    State(state): State<AppState>,
    ResolvedRole(role): ResolvedRole,
    request: Request,
) -> HttpResult<Response> {
    let Some(upstream) = &state.upstream else {
        return Err(HttpError::new(
            StatusCode::NOT_IMPLEMENTED,
            "no data-access backend configured",
        ));
    };
    upstream
        .forward(&role, request, state.config.body_limit)
        .await
        .map_err(HttpError::from)
}

#[derive(Serialize)]
struct PolicyResponse {
    source: String,
    #[serde(flatten)]
    policy: PolicySummary,
}

async fn policy_handler(
    State(state): State<AppState>,
    ResolvedRole(role): ResolvedRole,
) -> HttpResult<Json<PolicyResponse>> {
    state.gate.require_admin(&role)?;
    let store = state.gate.policy();
    Ok(Json(PolicyResponse {
        source: store.source_description(),
        policy: store.snapshot().summary(),
    }))
}

#[derive(Serialize)]
struct ReloadResponse {
    reloaded: bool,
    rules: usize,
    default_role: Role,
    admin_role: Role,
}

async fn reload_handler(
    State(state): State<AppState>,
    ResolvedRole(role): ResolvedRole,
) -> HttpResult<Json<ReloadResponse>> {
    state.gate.require_admin(&role)?;
    let store = state.gate.policy().clone();
    let snapshot = tokio::task::spawn_blocking(move || store.reload())
        .await
        .map_err(|err| HttpError::internal(err.into()))?;
    info!(%role, rules = snapshot.rule_count(), "policy reloaded via admin endpoint");
    Ok(Json(ReloadResponse {
        reloaded: true,
        rules: snapshot.rule_count(),
        default_role: snapshot.default_role().clone(),
        admin_role: snapshot.admin_role().clone(),
    }))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        upstream: state.upstream.is_some(),
        rules: state.gate.policy().snapshot().rule_count(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    upstream: bool,
    rules: usize,
    version: &'static str,
}

type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug)]
struct HttpError {
    status: StatusCode,
    message: String,
    challenge: bool,
}

impl HttpError {
    fn new(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            challenge: false,
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
            challenge: false,
        }
    }
}

impl From<AuthzError> for HttpError {
    fn from(err: AuthzError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::FORBIDDEN),
            message: err.to_string(),
            challenge: true,
        }
    }
}

impl From<ForwardError> for HttpError {
    fn from(err: ForwardError) -> Self {
        let status = match &err {
            ForwardError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ForwardError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        warn!(error = %err, "forwarding failed");
        Self {
            status,
            message: err.to_string(),
            challenge: false,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.message).into_response();
        if self.challenge {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(unix)]
fn spawn_reload_on_hangup(store: Arc<PolicyStore>) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "SIGHUP reload disabled");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            let store = store.clone();
            if let Err(err) = tokio::task::spawn_blocking(move || store.reload()).await {
                warn!(error = %err, "policy reload task failed");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}

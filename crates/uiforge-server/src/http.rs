use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::header;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

use uiforge_core::{
    cookie_value, present_tool_invocation, AnonymousWorkRegistry, AnonymousWorkStore, AuthAction,
    AuthGateway, ProjectStore, RecordingNavigator, SameSite, SessionReconciler, SetCookie,
    ANON_WORK_COOKIE_NAME,
};
use uiforge_observability::{emit_event, redact_text, ObservabilityEvent, ProcessKind};
use uiforge_types::{
    AnonymousWork, AuthResult, NewProject, Project, SessionClaims, ToolDisplay, ToolInvocation,
};

use crate::AppState;

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorEnvelope>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorEnvelope {
            error: error.into(),
            code: Some(code.to_string()),
        }),
    )
}

fn internal_error(err: anyhow::Error) -> ApiError {
    tracing::error!("request failed: {:#}", err);
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
        "INTERNAL_ERROR",
    )
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("uiforge server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                futures::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/{id}", get(get_project))
        .route_layer(middleware::from_fn_with_state(state.clone(), session_gate));

    Router::new()
        .route("/global/health", get(global_health))
        .route(
            "/api/anon-work",
            put(save_anon_work)
                .get(get_anon_work)
                .delete(clear_anon_work),
        )
        .route("/api/auth/sign-up", post(sign_up))
        .route("/api/auth/sign-in", post(sign_in))
        .route("/api/auth/sign-out", post(sign_out))
        .route("/api/auth/session", get(current_session))
        .route(
            "/api/tool-invocations/display",
            post(tool_invocation_display),
        )
        .route("/api/prompts/generation", get(generation_prompt))
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::COOKIE).and_then(|v| v.to_str().ok())
}

fn anon_visitor_id(headers: &HeaderMap) -> Option<String> {
    cookie_value(cookie_header(headers)?, ANON_WORK_COOKIE_NAME).map(str::to_string)
}

async fn session_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }
    let Some(claims) = state.sessions.get_session(cookie_header(request.headers())) else {
        return api_error(
            StatusCode::UNAUTHORIZED,
            "Authentication required",
            "AUTH_REQUIRED",
        )
        .into_response();
    };
    request.extensions_mut().insert(claims);
    next.run(request).await
}

async fn global_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
        "build_id": crate::build_id(),
        "now_ms": crate::now_ms(),
        "environment": state.config.get().await.environment,
        "anonymous_visitors": state.anon_work.len().await,
    }))
}

#[derive(Debug, Deserialize, Default)]
struct CredentialsInput {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn sign_up(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CredentialsInput>,
) -> Result<Response, ApiError> {
    run_auth_action(state, &headers, AuthAction::SignUp, input).await
}

async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CredentialsInput>,
) -> Result<Response, ApiError> {
    run_auth_action(state, &headers, AuthAction::SignIn, input).await
}

/// Runs one gateway invocation scoped to the caller's anonymous work. The
/// recorded navigation target becomes the `redirect` in the response.
async fn run_auth_action(
    state: AppState,
    headers: &HeaderMap,
    action: AuthAction,
    input: CredentialsInput,
) -> Result<Response, ApiError> {
    let visitor_id =
        anon_visitor_id(headers).unwrap_or_else(AnonymousWorkRegistry::new_visitor_id);
    let navigator = Arc::new(RecordingNavigator::new());
    let reconciler = SessionReconciler::new(
        Arc::new(state.anon_work.scoped(visitor_id.clone())),
        state.projects.clone(),
        navigator.clone(),
        state.namer.clone(),
    );
    let gateway = AuthGateway::new(state.accounts.clone(), reconciler);

    let outcome = match action {
        AuthAction::SignIn => gateway.sign_in(&input.email, &input.password).await,
        AuthAction::SignUp => gateway.sign_up(&input.email, &input.password).await,
    };
    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            let detail = format!("{err:#}");
            emit_event(
                Level::ERROR,
                ProcessKind::Server,
                ObservabilityEvent {
                    event: "auth.failed",
                    component: "http.auth",
                    action: Some(action.as_str()),
                    visitor_id: Some(&visitor_id),
                    status: Some("error"),
                    error_code: Some("AUTH_ACTION_FAILED"),
                    detail: Some(&detail),
                    ..Default::default()
                },
            );
            return Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication could not be completed",
                "AUTH_ACTION_FAILED",
            ));
        }
    };

    let user = match &result {
        AuthResult::Success(user) => user,
        AuthResult::Failure { error } => {
            let email = redact_text(&input.email);
            let detail = format!("{email}: {error}");
            emit_event(
                Level::INFO,
                ProcessKind::Server,
                ObservabilityEvent {
                    event: "auth.rejected",
                    component: "http.auth",
                    action: Some(action.as_str()),
                    visitor_id: Some(&visitor_id),
                    status: Some("rejected"),
                    detail: Some(&detail),
                    ..Default::default()
                },
            );
            return Ok(Json(&result).into_response());
        }
    };

    let issued = state.sessions.create_session(user).map_err(|err| {
        tracing::error!("failed to issue session token: {}", err);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create session",
            "SESSION_ISSUE_FAILED",
        )
    })?;
    let redirect = navigator.last_target();
    emit_event(
        Level::INFO,
        ProcessKind::Server,
        ObservabilityEvent {
            event: "auth.succeeded",
            component: "http.auth",
            action: Some(action.as_str()),
            visitor_id: Some(&visitor_id),
            user_id: Some(&user.user_id),
            project_id: redirect.as_deref().map(|target| target.trim_start_matches('/')),
            status: Some("ok"),
            ..Default::default()
        },
    );
    Ok((
        [(header::SET_COOKIE, issued.cookie.to_header_value())],
        Json(json!({
            "success": true,
            "redirect": redirect,
        })),
    )
        .into_response())
}

async fn sign_out(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::SET_COOKIE,
            state.sessions.delete_session().to_header_value(),
        )],
        Json(json!({ "success": true })),
    )
}

async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionClaims>, ApiError> {
    state
        .sessions
        .get_session(cookie_header(&headers))
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::UNAUTHORIZED,
                "No active session",
                "AUTH_REQUIRED",
            )
        })
}

async fn save_anon_work(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(work): Json<AnonymousWork>,
) -> Result<Response, ApiError> {
    let existing = anon_visitor_id(&headers);
    let visitor_id = existing
        .clone()
        .unwrap_or_else(AnonymousWorkRegistry::new_visitor_id);
    state
        .anon_work
        .scoped(visitor_id.clone())
        .save(work)
        .await
        .map_err(internal_error)?;
    emit_event(
        Level::DEBUG,
        ProcessKind::Server,
        ObservabilityEvent {
            event: "anon_work.saved",
            component: "http.anon_work",
            visitor_id: Some(&visitor_id),
            status: Some(if existing.is_some() { "updated" } else { "new_visitor" }),
            ..Default::default()
        },
    );

    let body = Json(json!({ "ok": true }));
    if existing.is_some() {
        return Ok(body.into_response());
    }
    let cookie = SetCookie {
        name: ANON_WORK_COOKIE_NAME.to_string(),
        value: visitor_id,
        http_only: true,
        secure: state.sessions.secure_cookies(),
        same_site: SameSite::Strict,
        path: "/".to_string(),
        expires: None,
    };
    Ok(([(header::SET_COOKIE, cookie.to_header_value())], body).into_response())
}

async fn get_anon_work(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Option<AnonymousWork>>, ApiError> {
    let Some(visitor_id) = anon_visitor_id(&headers) else {
        return Ok(Json(None));
    };
    let work = state
        .anon_work
        .scoped(visitor_id)
        .get()
        .await
        .map_err(internal_error)?;
    Ok(Json(work))
}

async fn clear_anon_work(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    if let Some(visitor_id) = anon_visitor_id(&headers) {
        state
            .anon_work
            .scoped(visitor_id)
            .clear()
            .await
            .map_err(internal_error)?;
    }
    Ok(Json(json!({ "ok": true })))
}

async fn list_projects(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Json<Vec<Project>>, ApiError> {
    state
        .projects
        .list_recent(&claims.user_id)
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn create_project(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(mut input): Json<NewProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    if input.name.trim().is_empty() {
        input.name = state.namer.blank_project_name();
    }
    let project = state
        .projects
        .create(&claims.user_id, input)
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<String>,
) -> Result<Json<Project>, ApiError> {
    state
        .projects
        .get_project(&claims.user_id, &id)
        .await
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("Project {id} not found"),
                "PROJECT_NOT_FOUND",
            )
        })
}

async fn tool_invocation_display(
    Json(invocation): Json<ToolInvocation>,
) -> Result<Json<ToolDisplay>, ApiError> {
    present_tool_invocation(&invocation)
        .map(Json)
        .map_err(|err| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("Invalid tool arguments: {err}"),
                "INVALID_TOOL_ARGS",
            )
        })
}

async fn generation_prompt(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.generation_prompt.to_string(),
    )
}

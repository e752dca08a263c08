use std::any::Any;

use axum::{
    Json, Router,
    extract::FromRef,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod response;

// Access-segregated routers (public, authenticated, instructor, admin).
pub mod routes;
use routes::{admin, authenticated, instructor, public};

// --- Public Re-exports ---

pub use auth::auth_middleware;
pub use config::AppConfig;
pub use credentials::{CredentialState, LocalCredentials, SupabaseCredentials};
pub use error::AppError;
pub use repository::{PostgresRepository, RepositoryState};

/// Adds the bearer token scheme so Swagger UI can call protected routes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// ApiDoc
///
/// The OpenAPI document aggregated from every `#[utoipa::path]` handler and
/// `ToSchema` model. Served at `/api-docs/openapi.json` and rendered by Swagger
/// UI at `/swagger-ui`, which doubles as the interactive API tester.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    paths(
        handlers::health,
        handlers::register, handlers::login, handlers::get_me, handlers::get_my_enrollments,
        handlers::list_users, handlers::get_user_stats, handlers::get_user,
        handlers::update_user, handlers::delete_user,
        handlers::list_courses, handlers::get_course, handlers::create_course,
        handlers::update_course, handlers::delete_course,
        handlers::enroll_in_course, handlers::unenroll_from_course,
        handlers::get_enrollment_status,
    ),
    components(
        schemas(
            models::Role, models::CourseLevel, models::User, models::Course,
            models::CourseDetail, models::Enrollment, models::EnrolledCourse,
            models::EnrollmentStatus, models::UserStats, models::HealthReport,
            models::RegisterRequest, models::LoginRequest, models::AuthPayload,
            models::UpdateUserRequest, models::CreateCourseRequest,
            models::UpdateCourseRequest, response::Pagination, error::ErrorBody,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and the current user"),
        (name = "users", description = "User management (admin)"),
        (name = "courses", description = "Course catalogue and management"),
        (name = "enrollments", description = "Course enrollments"),
        (name = "health", description = "Liveness and database connectivity"),
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single shared container of services and configuration handed to every
/// handler. Cloning is cheap: the services sit behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer.
    pub repo: RepositoryState,
    /// Where passwords are created and checked.
    pub credentials: CredentialState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors (e.g. `AuthUser`) pull a single component out of the state.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for CredentialState {
    fn from_ref(app_state: &AppState) -> CredentialState {
        app_state.credentials.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing tree, applies scoped and global middleware and binds
/// the state.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let expose_panics = state.config.exposes_error_details();

    let x_request_id = HeaderName::from_static("x-request-id");

    // Everything behind a bearer token. The role gates inside the instructor and
    // admin routers run after this layer has attached the identity.
    let protected = Router::new()
        .merge(authenticated::authenticated_routes())
        .merge(instructor::instructor_routes())
        .merge(admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new()
        .merge(public::public_routes())
        .merge(protected);

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(handlers::health))
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .fallback(handlers::route_not_found)
        // Known path, unsupported method: same envelope as an unknown route.
        .method_not_allowed_fallback(handlers::route_not_found)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Generate an x-request-id for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // One span per request, correlated by the generated id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // Echo the id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id))
                // Last-resort 500 for anything that panics inside a handler.
                .layer(CatchPanicLayer::custom(
                    move |err: Box<dyn Any + Send + 'static>| panic_response(err, expose_panics),
                )),
        )
        .layer(cors)
}

/// CORS for the single configured frontend origin, with credentials.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origin = match HeaderValue::from_str(&config.frontend_url) {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(_) => {
            tracing::warn!(frontend_url = %config.frontend_url, "FRONTEND_URL is not a valid origin; CORS will reject browsers");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
}

/// Turns a caught panic into the standard error envelope. The panic message is
/// only included when `expose` is set (local environment).
fn panic_response(err: Box<dyn Any + Send + 'static>, expose: bool) -> Response {
    let detail = if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    tracing::error!(panic = %detail, "request handler panicked");

    let body = error::ErrorBody {
        success: false,
        message: "Internal server error".to_string(),
        error: expose.then_some(detail),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` header so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

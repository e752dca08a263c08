use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes for any signed-in user, whatever the role. The `auth_middleware`
/// layer is applied by `create_router`, so every handler here receives a
/// verified `AuthUser`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // GET /api/auth/me
        .route("/auth/me", get(handlers::get_me))
        // GET /api/auth/me/enrollments
        .route("/auth/me/enrollments", get(handlers::get_my_enrollments))
        // POST/DELETE /api/courses/{id}/enroll
        // Enrolling twice is rejected; the (user, course) pair is unique.
        .route(
            "/courses/{id}/enroll",
            post(handlers::enroll_in_course).delete(handlers::unenroll_from_course),
        )
        // GET /api/courses/{id}/enrollment
        .route("/courses/{id}/enrollment", get(handlers::get_enrollment_status))
}

use crate::{
    AppState,
    auth::{INSTRUCTOR_ROLES, authorize},
    handlers,
};
use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    routing::{post, put},
};

/// Instructor Router Module
///
/// Course writes. The role gate admits instructors and admins; the per-course
/// ownership check (owner or admin) happens in the handlers because it needs
/// the stored course.
pub fn instructor_routes() -> Router<AppState> {
    Router::new()
        // POST /api/courses
        .route("/courses", post(handlers::create_course))
        // PUT/DELETE /api/courses/{id}
        .route(
            "/courses/{id}",
            put(handlers::update_course).delete(handlers::delete_course),
        )
        .route_layer(middleware::from_fn(|request: Request, next: Next| {
            authorize(INSTRUCTOR_ROLES, request, next)
        }))
}

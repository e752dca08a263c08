use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a token. Course reads are public; every write
/// lives in the instructor router.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /api/auth/register
        // Creates the account and returns it with a 7-day token (201).
        .route("/auth/register", post(handlers::register))
        // POST /api/auth/login
        .route("/auth/login", post(handlers::login))
        // GET /api/courses?page&limit&category&level&search&instructor_id
        .route("/courses", get(handlers::list_courses))
        // GET /api/courses/{id}
        // Includes `enrolled_students_count`.
        .route("/courses/{id}", get(handlers::get_course))
}

use crate::{
    AppState,
    auth::{ADMIN_ROLES, authorize},
    handlers,
};
use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    routing::get,
};

/// Admin Router Module
///
/// User management, restricted to the `admin` role.
///
/// Access Control:
/// `create_router` wraps this router in `auth_middleware` (401 without a valid
/// token), and the `authorize` layer below turns every non-admin away with 403
/// before any handler runs.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/users?page&limit
        .route("/users", get(handlers::list_users))
        // GET /api/users/stats
        // Number of users per role.
        .route("/users/stats", get(handlers::get_user_stats))
        // GET/PUT/DELETE /api/users/{id}
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route_layer(middleware::from_fn(|request: Request, next: Next| {
            authorize(ADMIN_ROLES, request, next)
        }))
}

//! Router Module Index
//!
//! Splits the API into access-segregated routers. Role gates are layered inside
//! the instructor and admin modules; the token check wraps every protected
//! module in `create_router`.
//!
//! Everything here is nested under `/api` by `create_router`.

/// Routes open to anonymous clients: registration, login and the course catalogue.
pub mod public;

/// Routes that only need a valid bearer token (any role).
pub mod authenticated;

/// Course management; requires role `instructor` or `admin`.
pub mod instructor;

/// User management; requires role `admin`.
pub mod admin;

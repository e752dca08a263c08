use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AppError,
    models::{Role, User},
};

/// Roles allowed to create and manage courses.
pub const INSTRUCTOR_ROLES: &[Role] = &[Role::Instructor, Role::Admin];
/// Roles allowed on the user management routes.
pub const ADMIN_ROLES: &[Role] = &[Role::Admin];

const NO_TOKEN: &str = "Not authorized, no token";
const BAD_TOKEN: &str = "Not authorized, token invalid or expired";

/// Claims
///
/// The payload signed into every bearer token issued by register and login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's id.
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
}

impl Claims {
    /// Claims for `user`, valid for `ttl_days` from now.
    pub fn for_user(user: &User, ttl_days: i64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::days(ttl_days);
        Self {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        }
    }
}

/// Signs a token for `user` using the configured secret and lifetime.
pub fn issue_token(config: &AppConfig, user: &User) -> Result<String, AppError> {
    let claims = Claims::for_user(user, config.jwt_ttl_days);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::internal("Failed to issue token", e))
}

/// Verifies signature and expiry and returns the embedded claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    // Expired means expired: no clock-skew grace period.
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
}

/// AuthUser
///
/// The resolved identity of an authenticated request, decoded from the bearer
/// token. Handlers destructure it to get the caller's id and role.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Reuses the identity attached by [`auth_middleware`] when present; otherwise
/// extracts the `Authorization: Bearer` header and verifies the token.
///
/// Rejection: a 401 [`AppError`] when the header is absent or the token fails
/// verification (bad signature, malformed, expired).
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let config = AppConfig::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| {
                value
                    .strip_prefix("Bearer ")
                    .or_else(|| value.strip_prefix("bearer "))
            })
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::unauthorized(NO_TOKEN))?;

        match verify_token(&config.jwt_secret, token) {
            Ok(claims) => Ok(claims.into()),
            Err(e) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                    kind => tracing::debug!(?kind, "rejected invalid token"),
                }
                Err(AppError::unauthorized(BAD_TOKEN))
            }
        }
    }
}

/// auth_middleware
///
/// Guards the authenticated routers. Extraction of `AuthUser` rejects the
/// request with 401 before the handler runs; on success the identity is stored
/// in the request extensions for the role gate and the handlers.
pub async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// authorize
///
/// Role gate mounted after [`auth_middleware`]. Rejects with 403 when the
/// attached role is not in `allowed`.
pub async fn authorize(
    allowed: &'static [Role],
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(user) = request.extensions().get::<AuthUser>() else {
        return Err(AppError::unauthorized(NO_TOKEN));
    };

    if !allowed.contains(&user.role) {
        return Err(AppError::forbidden(format!(
            "Role '{}' is not allowed to access this resource",
            user.role
        )));
    }

    Ok(next.run(request).await)
}

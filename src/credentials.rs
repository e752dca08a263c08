use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use async_trait::async_trait;
use rand::rngs::OsRng;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::{AppConfig, AuthProvider},
    models::{Registration, UserRecord},
};

/// Failures raised while creating or checking credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The provider refused the registration (e.g. the email already exists there).
    #[error("{0}")]
    Rejected(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("auth provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("auth provider responded with {status}: {body}")]
    Provider { status: u16, body: String },
}

/// What the credential backend hands back for a new registration.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    /// Primary key the local `users` row must use.
    pub user_id: Uuid,
    /// PHC hash to persist, or `None` when the password lives with the provider.
    pub password_hash: Option<String>,
}

/// CredentialProvider
///
/// Abstracts where passwords live. Handlers hold an `Arc<dyn CredentialProvider>`
/// and never touch hashes or provider HTTP calls directly.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn create(&self, registration: &Registration)
    -> Result<IssuedCredentials, CredentialError>;

    /// Checks an email/password pair. `stored` is the local row for that email, if
    /// any. Returns the authenticated user id, or `None` for bad credentials.
    async fn verify(
        &self,
        email: &str,
        password: &str,
        stored: Option<&UserRecord>,
    ) -> Result<Option<Uuid>, CredentialError>;

    /// Removes credentials created by [`CredentialProvider::create`] whose local
    /// user row could not be written. Local hashes live in that row, so the
    /// default has nothing to undo.
    async fn discard(&self, _user_id: Uuid) -> Result<(), CredentialError> {
        Ok(())
    }
}

pub type CredentialState = Arc<dyn CredentialProvider>;

/// Builds the provider selected by `AUTH_PROVIDER`.
pub fn from_config(config: &AppConfig) -> CredentialState {
    match &config.auth_provider {
        AuthProvider::Local => Arc::new(LocalCredentials),
        AuthProvider::Supabase {
            url,
            service_role_key,
        } => Arc::new(SupabaseCredentials::new(url.clone(), service_role_key.clone())),
    }
}

// --- Local (argon2) ---

/// Hashes a plaintext password into a PHC string with a random salt.
pub fn hash_password(plain: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Verifies a plaintext password against a stored PHC hash.
/// A malformed hash is an error; a mismatch is `Ok(false)`.
pub fn verify_password(plain: &str, hash: &str) -> Result<bool, CredentialError> {
    let parsed = PasswordHash::new(hash).map_err(|e| CredentialError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// LocalCredentials
///
/// Stores argon2 hashes in `users.password_hash`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCredentials;

#[async_trait]
impl CredentialProvider for LocalCredentials {
    async fn create(
        &self,
        registration: &Registration,
    ) -> Result<IssuedCredentials, CredentialError> {
        Ok(IssuedCredentials {
            user_id: Uuid::new_v4(),
            password_hash: Some(hash_password(&registration.password)?),
        })
    }

    async fn verify(
        &self,
        _email: &str,
        password: &str,
        stored: Option<&UserRecord>,
    ) -> Result<Option<Uuid>, CredentialError> {
        let Some(record) = stored else {
            return Ok(None);
        };
        let Some(hash) = record.password_hash.as_deref() else {
            tracing::warn!(user_id = %record.user.id, "user has no local password hash");
            return Ok(None);
        };

        Ok(verify_password(password, hash)?.then_some(record.user.id))
    }
}

// --- Supabase (GoTrue over HTTP) ---

#[derive(Deserialize)]
struct GoTrueUser {
    id: Uuid,
}

#[derive(Deserialize)]
struct GoTrueSession {
    user: GoTrueUser,
}

/// GoTrue has used several error shapes over time; take whichever message is present.
#[derive(Deserialize, Default)]
struct GoTrueError {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
}

impl GoTrueError {
    fn into_message(self, fallback: &str) -> String {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// SupabaseCredentials
///
/// Delegates credential storage to a Supabase project. Registration goes through
/// the admin users endpoint (service role key) so the account is confirmed
/// immediately; login uses the password grant.
pub struct SupabaseCredentials {
    client: reqwest::Client,
    url: String,
    service_role_key: String,
}

impl SupabaseCredentials {
    pub fn new(url: String, service_role_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            service_role_key,
        }
    }
}

#[async_trait]
impl CredentialProvider for SupabaseCredentials {
    async fn create(
        &self,
        registration: &Registration,
    ) -> Result<IssuedCredentials, CredentialError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/admin/users", self.url))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .json(&json!({
                "email": registration.email,
                "password": registration.password,
                "email_confirm": true,
                "user_metadata": { "name": registration.name, "role": registration.role },
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let user = response.json::<GoTrueUser>().await?;
            return Ok(IssuedCredentials {
                user_id: user.id,
                password_hash: None,
            });
        }

        if status.is_client_error() {
            let error = response.json::<GoTrueError>().await.unwrap_or_default();
            return Err(CredentialError::Rejected(
                error.into_message("Registration was rejected by the auth provider"),
            ));
        }

        Err(CredentialError::Provider {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }

    async fn verify(
        &self,
        email: &str,
        password: &str,
        _stored: Option<&UserRecord>,
    ) -> Result<Option<Uuid>, CredentialError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/token?grant_type=password", self.url))
            .header("apikey", &self.service_role_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let session = response.json::<GoTrueSession>().await?;
                Ok(Some(session.user.id))
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Ok(None),
            status => Err(CredentialError::Provider {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn discard(&self, user_id: Uuid) -> Result<(), CredentialError> {
        let response = self
            .client
            .delete(format!("{}/auth/v1/admin/users/{}", self.url, user_id))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() || status == StatusCode::NOT_FOUND => Ok(()),
            status => Err(CredentialError::Provider {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

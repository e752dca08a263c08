use std::{fmt, sync::LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::AppError;

/// Minimum accepted password length at registration.
pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

// --- Enumerations (mapped to Postgres enum types) ---

/// Role
///
/// The RBAC field carried by every user and copied into issued tokens.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CourseLevel
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "course_level", rename_all = "lowercase")]
pub enum CourseLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

// --- Core Schemas (Mapped to Database) ---

/// User
///
/// The public projection of a row in `users`. It deliberately has no password
/// field, so it can be returned from any endpoint as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// UserRecord
///
/// A `users` row including the stored credential. Only the credential layer
/// reads it and it does not implement `Serialize`.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: Option<String>,
}

/// Insert payload for a new user, produced after validation and credential creation.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password_hash: Option<String>,
}

/// Course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub level: CourseLevel,
    /// Price in the platform currency; never negative.
    pub price: f64,
    /// Duration in minutes; always positive.
    pub duration: i32,
    /// Owning instructor. Cleared when that user is deleted.
    pub instructor_id: Option<Uuid>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// True when `user_id` is the course's instructor.
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.instructor_id == Some(user_id)
    }
}

/// CourseDetail
///
/// Single-course view: the course plus how many students are enrolled.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub enrolled_students_count: i64,
}

/// Enrollment
///
/// A row in `enrollments`; the (user_id, course_id) pair is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
}

/// EnrolledCourse
///
/// One entry of a user's enrollment list, with the course embedded.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct EnrolledCourse {
    pub enrollment_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub course: Course,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentStatus {
    pub enrolled: bool,
}

/// UserStats
///
/// Number of users per role, for the admin overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Default)]
pub struct UserStats {
    pub student: i64,
    pub instructor: i64,
    pub admin: i64,
    pub total: i64,
}

/// HealthReport
///
/// Returned by `/` and `/health`. It already carries `success`, so it is not wrapped
/// in the envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthReport {
    pub success: bool,
    pub message: String,
    pub database: String,
    pub timestamp: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Every field is optional at the serde level so that missing values are reported
/// with a readable 400 instead of a deserialization error.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

/// A registration that passed validation. The email is already normalized.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl RegisterRequest {
    pub fn validate(self) -> Result<Registration, AppError> {
        let (Some(name), Some(email), Some(password)) = (
            non_blank(self.name),
            non_blank(self.email),
            self.password.filter(|p| !p.is_empty()),
        ) else {
            return Err(AppError::bad_request(
                "Name, email and password are required",
            ));
        };

        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::bad_request(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        Ok(Registration {
            name,
            email: checked_email(&email)?,
            password,
            role: self.role.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    /// Returns the normalized email and the password, or a 400 when either is missing.
    pub fn validate(self) -> Result<(String, String), AppError> {
        match (non_blank(self.email), self.password.filter(|p| !p.is_empty())) {
            (Some(email), Some(password)) => Ok((normalize_email(&email), password)),
            _ => Err(AppError::bad_request("Email and password are required")),
        }
    }
}

/// AuthPayload
///
/// `data` of a successful register or login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthPayload {
    pub user: User,
    pub token: String,
}

/// UpdateUserRequest
///
/// Admin-side partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl UpdateUserRequest {
    /// Trims the name, normalizes the email and rejects blank or malformed values.
    pub fn validate(self) -> Result<Self, AppError> {
        let name = match self.name {
            Some(name) if name.trim().is_empty() => {
                return Err(AppError::bad_request("Name cannot be empty"));
            }
            other => other.map(|n| n.trim().to_string()),
        };
        let email = self.email.as_deref().map(checked_email).transpose()?;

        Ok(Self {
            name,
            email,
            role: self.role,
        })
    }
}

/// CreateCourseRequest
///
/// Input payload for `POST /api/courses`. The instructor is taken from the token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub level: Option<CourseLevel>,
    pub price: Option<f64>,
    pub duration: Option<i32>,
    #[serde(alias = "isPublished")]
    pub is_published: Option<bool>,
}

/// Insert payload for a new course.
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub category: String,
    pub level: CourseLevel,
    pub price: f64,
    pub duration: i32,
    pub instructor_id: Uuid,
    pub is_published: bool,
}

impl CreateCourseRequest {
    pub fn into_new_course(self, instructor_id: Uuid) -> Result<NewCourse, AppError> {
        let (Some(title), Some(description), Some(category), Some(level), Some(duration)) = (
            non_blank(self.title),
            non_blank(self.description),
            non_blank(self.category),
            self.level,
            self.duration,
        ) else {
            return Err(AppError::bad_request(
                "Title, description, category, level and duration are required",
            ));
        };

        let price = self.price.unwrap_or(0.0);
        check_price(price)?;
        check_duration(duration)?;

        Ok(NewCourse {
            title,
            description,
            category,
            level,
            price,
            duration,
            instructor_id,
            is_published: self.is_published.unwrap_or(false),
        })
    }
}

/// UpdateCourseRequest
///
/// Partial update for `PUT /api/courses/{id}`. Uses COALESCE semantics in the repository.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateCourseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<CourseLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
    #[serde(alias = "isPublished", skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
}

impl UpdateCourseRequest {
    /// Applies the create-time rules to whichever fields are present.
    pub fn validate(self) -> Result<Self, AppError> {
        for (field, value) in [
            ("Title", &self.title),
            ("Description", &self.description),
            ("Category", &self.category),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(AppError::bad_request(format!("{field} cannot be empty")));
            }
        }
        if let Some(price) = self.price {
            check_price(price)?;
        }
        if let Some(duration) = self.duration {
            check_duration(duration)?;
        }

        Ok(Self {
            title: self.title.map(|v| v.trim().to_string()),
            description: self.description.map(|v| v.trim().to_string()),
            category: self.category.map(|v| v.trim().to_string()),
            ..self
        })
    }
}

// --- Query Parameters ---

/// CourseQuery
///
/// Query string of `GET /api/courses`. `page` and `limit` are kept as raw strings
/// so that garbage falls back to the defaults instead of failing the request.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct CourseQuery {
    /// 1-based page number (default 1).
    pub page: Option<String>,
    /// Page size (default 10, max 100).
    pub limit: Option<String>,
    /// Exact category match.
    pub category: Option<String>,
    /// Exact level match.
    pub level: Option<CourseLevel>,
    /// Case-insensitive match on title or description.
    pub search: Option<String>,
    /// Only courses taught by this instructor.
    pub instructor_id: Option<Uuid>,
}

impl CourseQuery {
    pub fn filter(&self) -> CourseFilter {
        CourseFilter {
            category: non_blank(self.category.clone()),
            level: self.level,
            search: non_blank(self.search.clone()),
            instructor_id: self.instructor_id,
        }
    }
}

/// PageQuery
///
/// Query string of the plain paginated listings.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number (default 1).
    pub page: Option<String>,
    /// Page size (default 10, max 100).
    pub limit: Option<String>,
}

/// Normalized course filters handed to the repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseFilter {
    pub category: Option<String>,
    pub level: Option<CourseLevel>,
    pub search: Option<String>,
    pub instructor_id: Option<Uuid>,
}

// --- Field helpers ---

/// Trims and lowercases an email address.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn checked_email(raw: &str) -> Result<String, AppError> {
    let email = normalize_email(raw);
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(AppError::bad_request("Please provide a valid email address"))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_price(price: f64) -> Result<(), AppError> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err(AppError::bad_request("Price must be zero or greater"))
    }
}

fn check_duration(duration: i32) -> Result<(), AppError> {
    if duration > 0 {
        Ok(())
    } else {
        Err(AppError::bad_request("Duration must be greater than zero"))
    }
}

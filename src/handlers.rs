use crate::{
    AppState,
    auth::{AuthUser, issue_token},
    error::{AppError, ErrorBody},
    extract::{ApiJson, ApiPath, ApiQuery},
    models::{
        AuthPayload, Course, CourseDetail, CourseQuery, CreateCourseRequest, EnrolledCourse,
        Enrollment, EnrollmentStatus, HealthReport, LoginRequest, NewUser, PageQuery,
        RegisterRequest, UpdateCourseRequest, UpdateUserRequest, User, UserStats,
    },
    response::{ApiResponse, ApiResult, PageRequest, Pagination},
};
use axum::{
    Json,
    extract::State,
    http::{Method, Uri},
};
use chrono::Utc;
use uuid::Uuid;

const EMAIL_TAKEN: &str = "Email is already registered";
const INVALID_CREDENTIALS: &str = "Invalid email or password";

// --- Shared lookups ---

async fn existing_course(state: &AppState, id: Uuid) -> Result<Course, AppError> {
    state
        .repo
        .get_course(id)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found"))
}

/// Instructors may only manage their own courses; admins may manage any.
fn ensure_can_manage(course: &Course, user: &AuthUser) -> Result<(), AppError> {
    if user.is_admin() || course.is_owned_by(user.id) {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only manage your own courses"))
    }
}

// --- Health ---

/// health
///
/// [Public Route] Service banner and database connectivity. Served on `/` and `/health`.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is up", body = HealthReport))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let database = if state.repo.ping().await {
        "connected"
    } else {
        "disconnected"
    };

    Json(HealthReport {
        success: true,
        message: "CollabLearn API is running".to_string(),
        database: database.to_string(),
        timestamp: Utc::now(),
    })
}

/// route_not_found
///
/// Fallback for any path that no router matched.
pub async fn route_not_found(method: Method, uri: Uri) -> AppError {
    AppError::not_found(format!("Route {} {} not found", method, uri.path()))
}

// --- Auth ---

/// register
///
/// [Public Route] Creates an account and returns it together with a signed token.
///
/// *Flow*: validate input, reject a taken email, create credentials with the
/// configured provider, insert the user row, then issue the token. When the
/// insert fails the provider credentials are discarded again.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered; `data` holds the user and token", body = AuthPayload),
        (status = 400, description = "Missing fields, short password or email taken", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<AuthPayload> {
    let registration = payload.validate()?;

    if state
        .repo
        .find_user_by_email(&registration.email)
        .await?
        .is_some()
    {
        return Err(AppError::bad_request(EMAIL_TAKEN));
    }

    let issued = state.credentials.create(&registration).await?;
    let user = match state
        .repo
        .create_user(NewUser {
            id: issued.user_id,
            name: registration.name,
            email: registration.email,
            role: registration.role,
            password_hash: issued.password_hash,
        })
        .await
    {
        Ok(user) => user,
        Err(e) => {
            // The provider already holds credentials for this id; roll them back.
            if let Err(discard_err) = state.credentials.discard(issued.user_id).await {
                tracing::warn!(
                    user_id = %issued.user_id,
                    error = %discard_err,
                    "orphaned provider credentials after failed user insert"
                );
            }
            return Err(e.into());
        }
    };

    let token = issue_token(&state.config, &user)?;
    tracing::info!(user_id = %user.id, role = %user.role, "user registered");

    Ok(ApiResponse::created(AuthPayload { user, token }).message("User registered successfully"))
}

/// login
///
/// [Public Route] Exchanges an email/password pair for a token shaped exactly like
/// the one returned by `register`.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; `data` holds the user and token", body = AuthPayload),
        (status = 400, description = "Missing fields", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 404, description = "Credentials valid but no user record", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<AuthPayload> {
    let (email, password) = payload.validate()?;

    let stored = state.repo.find_user_by_email(&email).await?;
    let Some(user_id) = state
        .credentials
        .verify(&email, &password, stored.as_ref())
        .await?
    else {
        tracing::warn!(%email, "failed login attempt");
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    };

    // With delegated credentials the local row is looked up by the provider's id.
    let user = match stored {
        Some(record) if record.user.id == user_id => record.user,
        _ => state
            .repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?,
    };

    let token = issue_token(&state.config, &user)?;
    tracing::info!(user_id = %user.id, "user logged in");

    Ok(ApiResponse::ok(AuthPayload { user, token }).message("Login successful"))
}

/// get_me
///
/// [Authenticated Route] The caller's current user record. Returns 404 when the
/// account was deleted after the token was issued.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "User no longer exists", body = ErrorBody)
    )
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<User> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(ApiResponse::ok(user))
}

/// get_my_enrollments
///
/// [Authenticated Route] Courses the caller is enrolled in, newest enrollment first.
#[utoipa::path(
    get,
    path = "/api/auth/me/enrollments",
    tag = "enrollments",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Enrolled courses", body = [EnrolledCourse]))
)]
pub async fn get_my_enrollments(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Vec<EnrolledCourse>> {
    Ok(ApiResponse::ok(state.repo.get_user_enrollments(id).await?))
}

// --- Users (admin) ---

/// list_users
///
/// [Admin Route] Paginated user listing, newest first.
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    params(PageQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "A page of users with pagination metadata", body = [User]),
        (status = 403, description = "Caller is not an admin", body = ErrorBody)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Vec<User>> {
    let page = PageRequest::parse(query.page.as_deref(), query.limit.as_deref());
    let result = state.repo.list_users(page).await?;
    Ok(ApiResponse::paginated(
        result.items,
        Pagination::new(page, result.total),
    ))
}

/// get_user_stats
///
/// [Admin Route] Number of users per role.
#[utoipa::path(
    get,
    path = "/api/users/stats",
    tag = "users",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Counts per role", body = UserStats))
)]
pub async fn get_user_stats(State(state): State<AppState>) -> ApiResult<UserStats> {
    Ok(ApiResponse::ok(state.repo.count_users_by_role().await?))
}

/// get_user
///
/// [Admin Route]
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Found", body = User),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<User> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(ApiResponse::ok(user))
}

/// update_user
///
/// [Admin Route] Partial update of name, email and role.
///
/// An email that already belongs to a different account is rejected with 400.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 400, description = "Invalid fields or email taken", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> ApiResult<User> {
    let update = payload.validate()?;

    if let Some(email) = &update.email {
        if let Some(existing) = state.repo.find_user_by_email(email).await? {
            if existing.user.id != id {
                return Err(AppError::bad_request(EMAIL_TAKEN));
            }
        }
    }

    let user = state
        .repo
        .update_user(id, update)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(ApiResponse::ok(user).message("User updated successfully"))
}

/// delete_user
///
/// [Admin Route] Hard delete. Enrollments cascade; taught courses lose their instructor.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_user(
    AuthUser { id: admin_id, .. }: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    if !state.repo.delete_user(id).await? {
        return Err(AppError::not_found("User not found"));
    }
    tracing::info!(user_id = %id, %admin_id, "user deleted");
    Ok(ApiResponse::acknowledged("User deleted successfully"))
}

// --- Courses ---

/// list_courses
///
/// [Public Route] Paginated course catalogue filtered by category, level,
/// instructor and a case-insensitive search over title and description.
#[utoipa::path(
    get,
    path = "/api/courses",
    tag = "courses",
    params(CourseQuery),
    responses(
        (status = 200, description = "A page of courses with pagination metadata", body = [Course]),
        (status = 400, description = "Malformed filter", body = ErrorBody)
    )
)]
pub async fn list_courses(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CourseQuery>,
) -> ApiResult<Vec<Course>> {
    let page = PageRequest::parse(query.page.as_deref(), query.limit.as_deref());
    let result = state.repo.list_courses(&query.filter(), page).await?;
    Ok(ApiResponse::paginated(
        result.items,
        Pagination::new(page, result.total),
    ))
}

/// get_course
///
/// [Public Route] One course plus its enrolled student count.
#[utoipa::path(
    get,
    path = "/api/courses/{id}",
    tag = "courses",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Found", body = CourseDetail),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_course(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<CourseDetail> {
    let course = existing_course(&state, id).await?;
    let enrolled_students_count = state.repo.count_enrollments(id).await?;
    Ok(ApiResponse::ok(CourseDetail {
        course,
        enrolled_students_count,
    }))
}

/// create_course
///
/// [Instructor Route] The caller becomes the course's instructor.
#[utoipa::path(
    post,
    path = "/api/courses",
    tag = "courses",
    request_body = CreateCourseRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Created", body = Course),
        (status = 400, description = "Missing or invalid fields", body = ErrorBody),
        (status = 403, description = "Caller is a student", body = ErrorBody)
    )
)]
pub async fn create_course(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateCourseRequest>,
) -> ApiResult<Course> {
    let new_course = payload.into_new_course(id)?;
    let course = state.repo.create_course(new_course).await?;
    tracing::info!(course_id = %course.id, instructor_id = %id, "course created");
    Ok(ApiResponse::created(course).message("Course created successfully"))
}

/// update_course
///
/// [Instructor Route] Partial update. Only the owning instructor or an admin may edit.
#[utoipa::path(
    put,
    path = "/api/courses/{id}",
    tag = "courses",
    params(("id" = Uuid, Path, description = "Course ID")),
    request_body = UpdateCourseRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated", body = Course),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn update_course(
    user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateCourseRequest>,
) -> ApiResult<Course> {
    let course = existing_course(&state, id).await?;
    ensure_can_manage(&course, &user)?;

    let update = payload.validate()?;
    let updated = state
        .repo
        .update_course(id, update)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found"))?;

    Ok(ApiResponse::ok(updated).message("Course updated successfully"))
}

/// delete_course
///
/// [Instructor Route] Same ownership rule as `update_course`.
#[utoipa::path(
    delete,
    path = "/api/courses/{id}",
    tag = "courses",
    params(("id" = Uuid, Path, description = "Course ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_course(
    user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    let course = existing_course(&state, id).await?;
    ensure_can_manage(&course, &user)?;

    if !state.repo.delete_course(id).await? {
        return Err(AppError::not_found("Course not found"));
    }
    tracing::info!(course_id = %id, user_id = %user.id, "course deleted");
    Ok(ApiResponse::acknowledged("Course deleted successfully"))
}

// --- Enrollments ---

/// enroll_in_course
///
/// [Authenticated Route] Enrolls the caller. A second attempt for the same course is a 400.
#[utoipa::path(
    post,
    path = "/api/courses/{id}/enroll",
    tag = "enrollments",
    params(("id" = Uuid, Path, description = "Course ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Enrolled", body = Enrollment),
        (status = 400, description = "Already enrolled", body = ErrorBody),
        (status = 404, description = "Course not found", body = ErrorBody)
    )
)]
pub async fn enroll_in_course(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    ApiPath(course_id): ApiPath<Uuid>,
) -> ApiResult<Enrollment> {
    existing_course(&state, course_id).await?;

    let enrollment = state
        .repo
        .enroll(user_id, course_id)
        .await?
        .ok_or_else(|| AppError::bad_request("Already enrolled in this course"))?;

    Ok(ApiResponse::created(enrollment).message("Enrolled successfully"))
}

/// unenroll_from_course
///
/// [Authenticated Route]
#[utoipa::path(
    delete,
    path = "/api/courses/{id}/enroll",
    tag = "enrollments",
    params(("id" = Uuid, Path, description = "Course ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Unenrolled"),
        (status = 404, description = "Not enrolled", body = ErrorBody)
    )
)]
pub async fn unenroll_from_course(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    ApiPath(course_id): ApiPath<Uuid>,
) -> ApiResult<()> {
    if !state.repo.unenroll(user_id, course_id).await? {
        return Err(AppError::not_found("Enrollment not found"));
    }
    Ok(ApiResponse::acknowledged("Unenrolled successfully"))
}

/// get_enrollment_status
///
/// [Authenticated Route] Whether the caller is enrolled in the course.
#[utoipa::path(
    get,
    path = "/api/courses/{id}/enrollment",
    tag = "enrollments",
    params(("id" = Uuid, Path, description = "Course ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Enrollment flag", body = EnrollmentStatus))
)]
pub async fn get_enrollment_status(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    ApiPath(course_id): ApiPath<Uuid>,
) -> ApiResult<EnrollmentStatus> {
    let enrolled = state.repo.is_enrolled(user_id, course_id).await?;
    Ok(ApiResponse::ok(EnrollmentStatus { enrolled }))
}

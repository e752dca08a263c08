use crate::models::{
    Course, CourseFilter, EnrolledCourse, Enrollment, NewCourse, NewUser, Role,
    UpdateCourseRequest, UpdateUserRequest, User, UserRecord, UserStats,
};
use crate::response::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum RepoError {
    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository Trait
///
/// The contract for all persistence operations. Handlers only ever see
/// `Arc<dyn Repository>`, so tests swap in in-memory doubles without a database.
///
/// Listing methods return a [`Page`] holding the requested slice plus the total
/// match count, ordered newest first.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Cheap connectivity probe used by the health endpoints.
    async fn ping(&self) -> bool;

    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    // Includes the stored credential; used only by the login flow.
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>>;
    // Fails with `RepoError::Conflict` when the email is taken.
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn list_users(&self, page: PageRequest) -> RepoResult<Page<User>>;
    // Partial update via COALESCE. `None` when the user does not exist.
    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> RepoResult<Option<User>>;
    async fn delete_user(&self, id: Uuid) -> RepoResult<bool>;
    async fn count_users_by_role(&self) -> RepoResult<UserStats>;

    // --- Courses ---
    async fn list_courses(&self, filter: &CourseFilter, page: PageRequest)
    -> RepoResult<Page<Course>>;
    async fn get_course(&self, id: Uuid) -> RepoResult<Option<Course>>;
    async fn create_course(&self, course: NewCourse) -> RepoResult<Course>;
    async fn update_course(&self, id: Uuid, req: UpdateCourseRequest) -> RepoResult<Option<Course>>;
    async fn delete_course(&self, id: Uuid) -> RepoResult<bool>;

    // --- Enrollments ---
    // Idempotent: `None` when the pair already exists.
    async fn enroll(&self, user_id: Uuid, course_id: Uuid) -> RepoResult<Option<Enrollment>>;
    async fn unenroll(&self, user_id: Uuid, course_id: Uuid) -> RepoResult<bool>;
    async fn is_enrolled(&self, user_id: Uuid, course_id: Uuid) -> RepoResult<bool>;
    async fn count_enrollments(&self, course_id: Uuid) -> RepoResult<i64>;
    async fn get_user_enrollments(&self, user_id: Uuid) -> RepoResult<Vec<EnrolledCourse>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const EMAIL_TAKEN: &str = "Email is already registered";

/// PostgresRepository
///
/// The `Repository` implementation backed by a sqlx connection pool.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps a unique-constraint violation to `RepoError::Conflict`.
fn conflict_on_unique(err: sqlx::Error, message: &str) -> RepoError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepoError::Conflict(message.to_string())
        }
        _ => RepoError::Database(err),
    }
}

/// Appends the WHERE clauses shared by the course page and count queries.
fn push_course_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &CourseFilter) {
    builder.push(" WHERE 1 = 1");

    if let Some(category) = &filter.category {
        builder.push(" AND category = ");
        builder.push_bind(category.clone());
    }
    if let Some(level) = filter.level {
        builder.push(" AND level = ");
        builder.push_bind(level);
    }
    if let Some(instructor_id) = filter.instructor_id {
        builder.push(" AND instructor_id = ");
        builder.push_bind(instructor_id);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search));
        builder.push(" AND (title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR description ILIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }
}

/// Makes `%`, `_` and `\` match literally inside an ILIKE pattern.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn ping(&self) -> bool {
        match sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("database ping failed: {:?}", e);
                false
            }
        }
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, role, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, name, email, role, created_at, updated_at, password_hash
               FROM users WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(
            r#"INSERT INTO users (id, name, email, role, password_hash)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, name, email, role, created_at, updated_at"#,
        )
        .bind(user.id)
        .bind(user.name)
        .bind(user.email)
        .bind(user.role)
        .bind(user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, EMAIL_TAKEN))
    }

    async fn list_users(&self, page: PageRequest) -> RepoResult<Page<User>> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, User>(
            r#"SELECT id, name, email, role, created_at, updated_at
               FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"#,
        )
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page { items, total })
    }

    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"UPDATE users SET
                   name = COALESCE($2, name),
                   email = COALESCE($3, email),
                   role = COALESCE($4, role),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING id, name, email, role, created_at, updated_at"#,
        )
        .bind(id)
        .bind(req.name)
        .bind(req.email)
        .bind(req.role)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, EMAIL_TAKEN))
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_users_by_role(&self) -> RepoResult<UserStats> {
        let rows = sqlx::query_as::<_, (Role, i64)>(
            "SELECT role, COUNT(*) FROM users GROUP BY role",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = UserStats::default();
        for (role, count) in rows {
            match role {
                Role::Student => stats.student = count,
                Role::Instructor => stats.instructor = count,
                Role::Admin => stats.admin = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }

    /// list_courses
    ///
    /// Builds the filtered page and count queries with QueryBuilder so every
    /// user-supplied value is bound rather than interpolated.
    async fn list_courses(
        &self,
        filter: &CourseFilter,
        page: PageRequest,
    ) -> RepoResult<Page<Course>> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM courses");
        push_course_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"SELECT id, title, description, category, level, price, duration,
                      instructor_id, is_published, created_at, updated_at
               FROM courses"#,
        );
        push_course_filters(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset());

        let items = builder
            .build_query_as::<Course>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page { items, total })
    }

    async fn get_course(&self, id: Uuid) -> RepoResult<Option<Course>> {
        let course = sqlx::query_as::<_, Course>(
            r#"SELECT id, title, description, category, level, price, duration,
                      instructor_id, is_published, created_at, updated_at
               FROM courses WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(course)
    }

    async fn create_course(&self, course: NewCourse) -> RepoResult<Course> {
        let created = sqlx::query_as::<_, Course>(
            r#"INSERT INTO courses
                   (id, title, description, category, level, price, duration, instructor_id, is_published)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING id, title, description, category, level, price, duration,
                         instructor_id, is_published, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(course.title)
        .bind(course.description)
        .bind(course.category)
        .bind(course.level)
        .bind(course.price)
        .bind(course.duration)
        .bind(course.instructor_id)
        .bind(course.is_published)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_course(
        &self,
        id: Uuid,
        req: UpdateCourseRequest,
    ) -> RepoResult<Option<Course>> {
        let updated = sqlx::query_as::<_, Course>(
            r#"UPDATE courses SET
                   title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   category = COALESCE($4, category),
                   level = COALESCE($5, level),
                   price = COALESCE($6, price),
                   duration = COALESCE($7, duration),
                   is_published = COALESCE($8, is_published),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING id, title, description, category, level, price, duration,
                         instructor_id, is_published, created_at, updated_at"#,
        )
        .bind(id)
        .bind(req.title)
        .bind(req.description)
        .bind(req.category)
        .bind(req.level)
        .bind(req.price)
        .bind(req.duration)
        .bind(req.is_published)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_course(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn enroll(&self, user_id: Uuid, course_id: Uuid) -> RepoResult<Option<Enrollment>> {
        let enrollment = sqlx::query_as::<_, Enrollment>(
            r#"INSERT INTO enrollments (id, user_id, course_id)
               VALUES ($1, $2, $3)
               ON CONFLICT (user_id, course_id) DO NOTHING
               RETURNING id, user_id, course_id, enrolled_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(enrollment)
    }

    async fn unenroll(&self, user_id: Uuid, course_id: Uuid) -> RepoResult<bool> {
        let result =
            sqlx::query("DELETE FROM enrollments WHERE user_id = $1 AND course_id = $2")
                .bind(user_id)
                .bind(course_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_enrolled(&self, user_id: Uuid, course_id: Uuid) -> RepoResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM enrollments WHERE user_id = $1 AND course_id = $2)",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn count_enrollments(&self, course_id: Uuid) -> RepoResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM enrollments WHERE course_id = $1",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn get_user_enrollments(&self, user_id: Uuid) -> RepoResult<Vec<EnrolledCourse>> {
        let rows = sqlx::query_as::<_, EnrolledCourse>(
            r#"SELECT e.id AS enrollment_id, e.enrolled_at,
                      c.id, c.title, c.description, c.category, c.level, c.price, c.duration,
                      c.instructor_id, c.is_published, c.created_at, c.updated_at
               FROM enrollments e
               JOIN courses c ON c.id = e.course_id
               WHERE e.user_id = $1
               ORDER BY e.enrolled_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

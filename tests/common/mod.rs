#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicI64, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{DateTime, Utc};
use collablearn::{
    AppState,
    auth::issue_token,
    config::AppConfig,
    create_router,
    credentials::{CredentialState, LocalCredentials, hash_password},
    models::{
        Course, CourseFilter, CourseLevel, EnrolledCourse, Enrollment, NewCourse, NewUser, Role,
        UpdateCourseRequest, UpdateUserRequest, User, UserRecord, UserStats,
    },
    repository::{RepoError, RepoResult, Repository},
    response::{Page, PageRequest},
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
pub const TEST_PASSWORD: &str = "secret1";

// --- In-memory repository ---

/// A `Repository` backed by vectors. Behaves like the Postgres implementation for
/// uniqueness, ordering (newest first), filtering and pagination.
#[derive(Default)]
pub struct InMemoryRepository {
    users: Mutex<Vec<UserRecord>>,
    courses: Mutex<Vec<Course>>,
    enrollments: Mutex<Vec<Enrollment>>,
    clock: AtomicI64,
    /// When set, every call fails with a database error.
    pub offline: AtomicBool,
    /// When set, `create_user` fails as if a concurrent insert took the email.
    pub reject_inserts: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Strictly increasing timestamps so "newest first" is deterministic.
    fn tick(&self) -> DateTime<Utc> {
        let n = self.clock.fetch_add(1, Ordering::SeqCst);
        DateTime::from_timestamp(1_700_000_000 + n, 0).unwrap()
    }

    fn check_online(&self) -> RepoResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RepoError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn get_user_sync(&self, id: Uuid) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.user.id == id)
            .map(|r| r.user.clone())
    }

    pub fn stored_hash(&self, email: &str) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.user.email == email)
            .and_then(|r| r.password_hash.clone())
    }
}

fn paginate<T: Clone>(items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = items.len() as i64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    Page { items, total }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn ping(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        self.check_online()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.user.id == id)
            .map(|r| r.user.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>> {
        self.check_online()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.user.email == email)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        self.check_online()?;
        let now = self.tick();
        let mut users = self.users.lock().unwrap();
        if self.reject_inserts.load(Ordering::SeqCst)
            || users.iter().any(|r| r.user.email == user.email)
        {
            return Err(RepoError::Conflict("Email is already registered".into()));
        }
        let created = User {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        users.push(UserRecord {
            user: created.clone(),
            password_hash: user.password_hash,
        });
        Ok(created)
    }

    async fn list_users(&self, page: PageRequest) -> RepoResult<Page<User>> {
        self.check_online()?;
        let mut users: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.user.clone())
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(users, page))
    }

    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> RepoResult<Option<User>> {
        self.check_online()?;
        let now = self.tick();
        let mut users = self.users.lock().unwrap();
        if let Some(email) = &req.email {
            if users.iter().any(|r| &r.user.email == email && r.user.id != id) {
                return Err(RepoError::Conflict("Email is already registered".into()));
            }
        }
        Ok(users.iter_mut().find(|r| r.user.id == id).map(|record| {
            let user = &mut record.user;
            if let Some(name) = req.name {
                user.name = name;
            }
            if let Some(email) = req.email {
                user.email = email;
            }
            if let Some(role) = req.role {
                user.role = role;
            }
            user.updated_at = now;
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        self.check_online()?;
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|r| r.user.id != id);
        let removed = users.len() < before;
        if removed {
            self.enrollments.lock().unwrap().retain(|e| e.user_id != id);
            for course in self.courses.lock().unwrap().iter_mut() {
                if course.instructor_id == Some(id) {
                    course.instructor_id = None;
                }
            }
        }
        Ok(removed)
    }

    async fn count_users_by_role(&self) -> RepoResult<UserStats> {
        self.check_online()?;
        let mut stats = UserStats::default();
        for record in self.users.lock().unwrap().iter() {
            match record.user.role {
                Role::Student => stats.student += 1,
                Role::Instructor => stats.instructor += 1,
                Role::Admin => stats.admin += 1,
            }
            stats.total += 1;
        }
        Ok(stats)
    }

    async fn list_courses(
        &self,
        filter: &CourseFilter,
        page: PageRequest,
    ) -> RepoResult<Page<Course>> {
        self.check_online()?;
        let search = filter.search.as_ref().map(|s| s.to_lowercase());
        let mut courses: Vec<Course> = self
            .courses
            .lock()
            .unwrap()
            .iter()
            .filter(|c| filter.category.as_ref().is_none_or(|cat| &c.category == cat))
            .filter(|c| filter.level.is_none_or(|level| c.level == level))
            .filter(|c| {
                filter
                    .instructor_id
                    .is_none_or(|id| c.instructor_id == Some(id))
            })
            .filter(|c| {
                search.as_ref().is_none_or(|s| {
                    c.title.to_lowercase().contains(s) || c.description.to_lowercase().contains(s)
                })
            })
            .cloned()
            .collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(courses, page))
    }

    async fn get_course(&self, id: Uuid) -> RepoResult<Option<Course>> {
        self.check_online()?;
        Ok(self
            .courses
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn create_course(&self, course: NewCourse) -> RepoResult<Course> {
        self.check_online()?;
        let now = self.tick();
        let created = Course {
            id: Uuid::new_v4(),
            title: course.title,
            description: course.description,
            category: course.category,
            level: course.level,
            price: course.price,
            duration: course.duration,
            instructor_id: Some(course.instructor_id),
            is_published: course.is_published,
            created_at: now,
            updated_at: now,
        };
        self.courses.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_course(
        &self,
        id: Uuid,
        req: UpdateCourseRequest,
    ) -> RepoResult<Option<Course>> {
        self.check_online()?;
        let now = self.tick();
        let mut courses = self.courses.lock().unwrap();
        Ok(courses.iter_mut().find(|c| c.id == id).map(|course| {
            if let Some(title) = req.title {
                course.title = title;
            }
            if let Some(description) = req.description {
                course.description = description;
            }
            if let Some(category) = req.category {
                course.category = category;
            }
            if let Some(level) = req.level {
                course.level = level;
            }
            if let Some(price) = req.price {
                course.price = price;
            }
            if let Some(duration) = req.duration {
                course.duration = duration;
            }
            if let Some(is_published) = req.is_published {
                course.is_published = is_published;
            }
            course.updated_at = now;
            course.clone()
        }))
    }

    async fn delete_course(&self, id: Uuid) -> RepoResult<bool> {
        self.check_online()?;
        let mut courses = self.courses.lock().unwrap();
        let before = courses.len();
        courses.retain(|c| c.id != id);
        let removed = courses.len() < before;
        if removed {
            self.enrollments.lock().unwrap().retain(|e| e.course_id != id);
        }
        Ok(removed)
    }

    async fn enroll(&self, user_id: Uuid, course_id: Uuid) -> RepoResult<Option<Enrollment>> {
        self.check_online()?;
        let now = self.tick();
        let mut enrollments = self.enrollments.lock().unwrap();
        if enrollments
            .iter()
            .any(|e| e.user_id == user_id && e.course_id == course_id)
        {
            return Ok(None);
        }
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            enrolled_at: now,
        };
        enrollments.push(enrollment.clone());
        Ok(Some(enrollment))
    }

    async fn unenroll(&self, user_id: Uuid, course_id: Uuid) -> RepoResult<bool> {
        self.check_online()?;
        let mut enrollments = self.enrollments.lock().unwrap();
        let before = enrollments.len();
        enrollments.retain(|e| !(e.user_id == user_id && e.course_id == course_id));
        Ok(enrollments.len() < before)
    }

    async fn is_enrolled(&self, user_id: Uuid, course_id: Uuid) -> RepoResult<bool> {
        self.check_online()?;
        Ok(self
            .enrollments
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.user_id == user_id && e.course_id == course_id))
    }

    async fn count_enrollments(&self, course_id: Uuid) -> RepoResult<i64> {
        self.check_online()?;
        Ok(self
            .enrollments
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.course_id == course_id)
            .count() as i64)
    }

    async fn get_user_enrollments(&self, user_id: Uuid) -> RepoResult<Vec<EnrolledCourse>> {
        self.check_online()?;
        let courses = self.courses.lock().unwrap();
        let mut rows: Vec<EnrolledCourse> = self
            .enrollments
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter_map(|e| {
                courses
                    .iter()
                    .find(|c| c.id == e.course_id)
                    .map(|course| EnrolledCourse {
                        enrollment_id: e.id,
                        enrolled_at: e.enrolled_at,
                        course: course.clone(),
                    })
            })
            .collect();
        rows.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        Ok(rows)
    }
}

// --- State and app helpers ---

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    }
}

pub fn test_state(repo: Arc<InMemoryRepository>) -> AppState {
    test_state_with(repo, Arc::new(LocalCredentials))
}

pub fn test_state_with(repo: Arc<InMemoryRepository>, credentials: CredentialState) -> AppState {
    AppState {
        repo,
        credentials,
        config: test_config(),
    }
}

pub fn test_app(repo: Arc<InMemoryRepository>) -> Router {
    create_router(test_state(repo))
}

/// Sends one request through the full router and returns the status and JSON body
/// (`Value::Null` for an empty body).
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

// --- Seeding ---

pub async fn seed_user(repo: &InMemoryRepository, name: &str, email: &str, role: Role) -> User {
    repo.create_user(NewUser {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: email.to_string(),
        role,
        password_hash: Some(hash_password(TEST_PASSWORD).unwrap()),
    })
    .await
    .unwrap()
}

pub async fn seed_course(
    repo: &InMemoryRepository,
    instructor_id: Uuid,
    title: &str,
    category: &str,
    level: CourseLevel,
) -> Course {
    repo.create_course(NewCourse {
        title: title.to_string(),
        description: format!("All about {title}"),
        category: category.to_string(),
        level,
        price: 0.0,
        duration: 60,
        instructor_id,
        is_published: true,
    })
    .await
    .unwrap()
}

pub fn token_for(user: &User) -> String {
    issue_token(&test_config(), user).unwrap()
}

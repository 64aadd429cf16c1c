use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, Path, Query, State},
    http::request::Parts,
    routing::{get, post},
    Json, Router,
};
use std::{path::PathBuf, sync::Arc};
use tower_http::services::{ServeDir, ServeFile};
use uuid::Uuid;

use crate::{error::AppError, models::*, pathgen::PathGenerator, store::SharedStore};

/// Header naming the acting user.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub generator: PathGenerator,
    /// Identity used when a request names no user.
    pub default_user: Arc<str>,
}

impl AppState {
    pub fn new(store: SharedStore, default_user: &str) -> Self {
        AppState {
            generator: PathGenerator::new(store.clone()),
            store,
            default_user: Arc::from(default_user),
        }
    }
}

/// The acting user: `x-user-id` header, then `?userId=`, then the configured default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

#[async_trait]
impl FromRequestParts<AppState> for UserId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(v) = parts.headers.get(USER_HEADER) {
            let v = v
                .to_str()
                .map_err(|_| AppError::invalid("x-user-id must be visible ASCII"))?
                .trim();
            if !v.is_empty() {
                return Ok(UserId(v.to_string()));
            }
        }
        let Query(q) = Query::<ProgressQuery>::try_from_uri(&parts.uri)
            .map_err(|e| AppError::invalid(e.body_text()))?;
        match q.user_id.filter(|u| !u.trim().is_empty()) {
            Some(u) => Ok(UserId(u)),
            None => Ok(UserId(state.default_user.to_string())),
        }
    }
}

pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/api/health", get(health))
        // catalog
        .route("/api/courses", get(list_courses))
        .route("/api/courses/:id", get(get_course))
        .route("/api/courses/:id/chapters", get(course_chapters))
        .route("/api/chapters/:id", get(get_chapter))
        // learning paths
        .route("/api/paths", get(list_paths))
        .route("/api/paths/generate", post(generate_path))
        .route("/api/paths/:id", get(get_path))
        // progress
        .route("/api/progress", get(list_progress).post(update_progress))
        .with_state(state);

    match static_dir {
        // SPA: unknown paths get index.html so client-side routing works
        Some(dir) => {
            let index = dir.join("index.html");
            api.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)))
        }
        None => api,
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "message": "learning path API" }))
}

async fn with_outline(state: &AppState, course: Course) -> Result<CourseDetail, AppError> {
    let chapters = state
        .store
        .list_chapters_by_course(course.id)
        .await?
        .iter()
        .map(ChapterSummary::from)
        .collect();
    Ok(CourseDetail { course, chapters })
}

async fn list_courses(
    State(state): State<AppState>,
    Query(q): Query<CourseQuery>,
) -> Result<Json<Vec<CourseDetail>>, AppError> {
    let courses = state.store.list_courses(q.category).await?;
    let mut out = Vec::with_capacity(courses.len());
    for c in courses {
        out.push(with_outline(&state, c).await?);
    }
    Ok(Json(out))
}

async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CourseDetail>, AppError> {
    let course = state
        .store
        .get_course(id)
        .await?
        .ok_or(AppError::NotFound("course"))?;
    Ok(Json(with_outline(&state, course).await?))
}

async fn course_chapters(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChapterOutline>>, AppError> {
    Ok(Json(state.store.list_chapters_by_course(id).await?))
}

async fn get_chapter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChapterDetail>, AppError> {
    let chapter = state
        .store
        .get_chapter(id)
        .await?
        .ok_or(AppError::NotFound("chapter"))?;
    let course = state
        .store
        .get_course(chapter.course_id)
        .await?
        .ok_or(AppError::NotFound("course"))?;
    Ok(Json(ChapterDetail {
        course: CourseSummary::from(&course),
        chapter,
    }))
}

async fn list_paths(State(state): State<AppState>) -> Result<Json<Vec<LearningPath>>, AppError> {
    Ok(Json(state.store.list_paths().await?))
}

async fn generate_path(
    State(state): State<AppState>,
    body: Result<Json<GeneratePathReq>, JsonRejection>,
) -> Result<Json<LearningPath>, AppError> {
    let Json(req) = body.map_err(|e| AppError::invalid(e.body_text()))?;
    let interests = req.interests.unwrap_or_default();
    let level = req.current_level.unwrap_or_default();
    let path = state.generator.generate(&interests, level).await?;
    Ok(Json(path))
}

async fn get_path(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LearningPath>, AppError> {
    let path = state
        .store
        .get_path(id)
        .await?
        .ok_or(AppError::NotFound("learning path"))?;
    Ok(Json(path))
}

async fn list_progress(
    State(state): State<AppState>,
    user: UserId,
) -> Result<Json<Vec<UserProgress>>, AppError> {
    Ok(Json(state.store.list_progress(&user.0).await?))
}

async fn update_progress(
    State(state): State<AppState>,
    user: UserId,
    body: Result<Json<UpdateProgressReq>, JsonRejection>,
) -> Result<Json<UserProgress>, AppError> {
    let Json(req) = body.map_err(|e| AppError::invalid(e.body_text()))?;
    let course_id = req.course_id.ok_or_else(|| AppError::invalid("courseId is required"))?;
    let update = ProgressUpdate {
        course_id,
        chapter_id: req.chapter_id,
        completed: req.completed,
    };
    let progress = state.store.upsert_progress(&user.0, update).await?;
    tracing::debug!(user=%user.0, course=%course_id, completed=progress.completed, "progress updated");
    Ok(Json(progress))
}

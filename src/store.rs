use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::{error::StorageError, models::*};

/// Persistence boundary for the catalog, learning paths and progress.
///
/// Implementations must make `create_learning_path` and `insert_course`
/// all-or-nothing: a failed call leaves nothing behind.
#[async_trait]
pub trait Store: Send + Sync {
    /// Courses in creation order, optionally restricted to one category.
    async fn list_courses(&self, category: Option<Category>) -> Result<Vec<Course>, StorageError>;

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StorageError>;

    /// Chapters of a course without their content, sorted by chapter order.
    async fn list_chapters_by_course(&self, course_id: Uuid)
        -> Result<Vec<ChapterOutline>, StorageError>;

    async fn get_chapter(&self, id: Uuid) -> Result<Option<Chapter>, StorageError>;

    async fn count_courses(&self) -> Result<i64, StorageError>;

    /// Chapter orders must be exactly 1..=N.
    async fn insert_course(
        &self,
        course: NewCourse,
        chapters: Vec<NewChapter>,
    ) -> Result<Course, StorageError>;

    async fn create_learning_path(&self, path: NewLearningPath)
        -> Result<LearningPath, StorageError>;

    /// Newest first.
    async fn list_paths(&self) -> Result<Vec<LearningPath>, StorageError>;

    async fn get_path(&self, id: Uuid) -> Result<Option<LearningPath>, StorageError>;

    /// Most recently accessed first.
    async fn list_progress(&self, user_id: &str) -> Result<Vec<UserProgress>, StorageError>;

    async fn upsert_progress(
        &self,
        user_id: &str,
        update: ProgressUpdate,
    ) -> Result<UserProgress, StorageError>;
}

pub type SharedStore = Arc<dyn Store>;

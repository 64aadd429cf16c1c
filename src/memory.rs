//! In-process store used by tests and by `STORE=memory` demo runs.
//!
//! All tables live behind a single lock, so every write is validated in full
//! before any of it is applied.

use async_trait::async_trait;
use chrono::Utc;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{error::StorageError, models::*, store::Store};

#[derive(Debug, Clone)]
struct StoredItem {
    id: Uuid,
    order: i32,
    target: PathTarget,
}

#[derive(Debug, Clone)]
struct StoredProgress {
    id: Uuid,
    user_id: String,
    course_id: Uuid,
    chapter_id: Option<Uuid>,
    completed: bool,
    last_accessed: chrono::DateTime<Utc>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    courses: Vec<Course>,
    chapters: Vec<Chapter>,
    paths: Vec<(PathRow, Vec<StoredItem>)>,
    progress: Vec<StoredProgress>,
}

impl Tables {
    fn course(&self, id: Uuid) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    fn chapter(&self, id: Uuid) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    /// Referential checks shared by path items and progress records.
    fn check_target(&self, course_id: Uuid, chapter_id: Option<Uuid>) -> Result<(), StorageError> {
        if self.course(course_id).is_none() {
            return Err(StorageError::Integrity(format!("course {course_id} does not exist")));
        }
        if let Some(chapter_id) = chapter_id {
            match self.chapter(chapter_id) {
                Some(ch) if ch.course_id == course_id => {}
                Some(_) => {
                    return Err(StorageError::Integrity(format!(
                        "chapter {chapter_id} does not belong to course {course_id}"
                    )))
                }
                None => {
                    return Err(StorageError::Integrity(format!("chapter {chapter_id} does not exist")))
                }
            }
        }
        Ok(())
    }

    fn resolve_item(&self, path_id: Uuid, it: &StoredItem) -> Result<PathItem, StorageError> {
        let course = self
            .course(it.target.course_id())
            .map(CourseSummary::from)
            .ok_or_else(|| StorageError::Integrity(format!("path item {} lost its course", it.id)))?;
        let step = match it.target {
            PathTarget::Course(_) => PathStep::whole_course(course),
            PathTarget::Chapter { chapter_id, .. } => {
                let chapter = self.chapter(chapter_id).map(ChapterSummary::from).ok_or_else(|| {
                    StorageError::Integrity(format!("path item {} lost its chapter", it.id))
                })?;
                PathStep::single_chapter(course, chapter)
            }
        };
        Ok(PathItem {
            id: it.id,
            path_id,
            order: it.order,
            step,
        })
    }

    fn resolve_path(&self, row: &PathRow, items: &[StoredItem]) -> Result<LearningPath, StorageError> {
        let mut resolved = items
            .iter()
            .map(|it| self.resolve_item(row.id, it))
            .collect::<Result<Vec<_>, _>>()?;
        resolved.sort_by_key(|it| it.order);
        Ok(row.clone().with_items(resolved))
    }

    fn resolve_progress(&self, p: &StoredProgress) -> Result<UserProgress, StorageError> {
        let course = self
            .course(p.course_id)
            .ok_or_else(|| StorageError::Integrity(format!("progress {} lost its course", p.id)))?;
        Ok(UserProgress {
            id: p.id,
            user_id: p.user_id.clone(),
            course_id: p.course_id,
            chapter_id: p.chapter_id,
            completed: p.completed,
            last_accessed: p.last_accessed,
            created_at: p.created_at,
            updated_at: p.updated_at,
            course: CourseSummary::from(course),
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    #[cfg(test)]
    write_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write operations attempted so far, successful or not.
    #[cfg(test)]
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn note_write(&self) {
        #[cfg(test)]
        self.write_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_courses(&self, category: Option<Category>) -> Result<Vec<Course>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.courses
            .iter()
            .filter(|c| category.map_or(true, |cat| c.category == cat))
            .cloned()
            .collect())
    }

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StorageError> {
        Ok(self.tables.read().await.course(id).cloned())
    }

    async fn list_chapters_by_course(
        &self,
        course_id: Uuid,
    ) -> Result<Vec<ChapterOutline>, StorageError> {
        let t = self.tables.read().await;
        let mut out: Vec<ChapterOutline> = t
            .chapters
            .iter()
            .filter(|ch| ch.course_id == course_id)
            .map(ChapterOutline::from)
            .collect();
        out.sort_by_key(|ch| ch.order);
        Ok(out)
    }

    async fn get_chapter(&self, id: Uuid) -> Result<Option<Chapter>, StorageError> {
        Ok(self.tables.read().await.chapter(id).cloned())
    }

    async fn count_courses(&self) -> Result<i64, StorageError> {
        Ok(self.tables.read().await.courses.len() as i64)
    }

    async fn insert_course(
        &self,
        course: NewCourse,
        chapters: Vec<NewChapter>,
    ) -> Result<Course, StorageError> {
        self.note_write();
        if !is_dense(chapters.iter().map(|c| c.order)) {
            return Err(StorageError::Integrity(format!(
                "chapter orders of {:?} are not 1..{}",
                course.title,
                chapters.len()
            )));
        }

        let now = Utc::now();
        let created = Course {
            id: Uuid::new_v4(),
            title: course.title,
            description: course.description,
            category: course.category,
            difficulty: course.difficulty,
            estimated_hours: course.estimated_hours,
            created_at: now,
            updated_at: now,
        };

        let mut t = self.tables.write().await;
        t.chapters.extend(chapters.into_iter().map(|ch| Chapter {
            id: Uuid::new_v4(),
            course_id: created.id,
            title: ch.title,
            order: ch.order,
            content: ch.content,
            created_at: now,
            updated_at: now,
        }));
        t.courses.push(created.clone());
        Ok(created)
    }

    async fn create_learning_path(
        &self,
        path: NewLearningPath,
    ) -> Result<LearningPath, StorageError> {
        self.note_write();
        let mut t = self.tables.write().await;

        let mut seen = std::collections::HashSet::new();
        for item in &path.items {
            if item.order < 1 || !seen.insert(item.order) {
                return Err(StorageError::Integrity(format!(
                    "duplicate or non-positive item order {}",
                    item.order
                )));
            }
            t.check_target(item.target.course_id(), item.target.chapter_id())?;
        }

        let now = Utc::now();
        let row = PathRow {
            id: Uuid::new_v4(),
            name: path.name,
            description: path.description,
            target_audience: path.target_audience,
            created_at: now,
            updated_at: now,
        };
        let items: Vec<StoredItem> = path
            .items
            .into_iter()
            .map(|it| StoredItem {
                id: Uuid::new_v4(),
                order: it.order,
                target: it.target,
            })
            .collect();

        let resolved = t.resolve_path(&row, &items)?;
        t.paths.push((row, items));
        Ok(resolved)
    }

    async fn list_paths(&self) -> Result<Vec<LearningPath>, StorageError> {
        let t = self.tables.read().await;
        t.paths
            .iter()
            .rev()
            .map(|(row, items)| t.resolve_path(row, items))
            .collect()
    }

    async fn get_path(&self, id: Uuid) -> Result<Option<LearningPath>, StorageError> {
        let t = self.tables.read().await;
        t.paths
            .iter()
            .find(|(row, _)| row.id == id)
            .map(|(row, items)| t.resolve_path(row, items))
            .transpose()
    }

    async fn list_progress(&self, user_id: &str) -> Result<Vec<UserProgress>, StorageError> {
        let t = self.tables.read().await;
        let mut mine: Vec<&StoredProgress> =
            t.progress.iter().filter(|p| p.user_id == user_id).collect();
        // stable, so equal timestamps keep the most recently touched record first
        mine.reverse();
        mine.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        mine.into_iter().map(|p| t.resolve_progress(p)).collect()
    }

    async fn upsert_progress(
        &self,
        user_id: &str,
        update: ProgressUpdate,
    ) -> Result<UserProgress, StorageError> {
        self.note_write();
        let mut t = self.tables.write().await;
        t.check_target(update.course_id, update.chapter_id)?;

        let now = Utc::now();
        let existing = t.progress.iter().position(|p| {
            p.user_id == user_id && p.course_id == update.course_id && p.chapter_id == update.chapter_id
        });
        let rec = match existing {
            Some(i) => {
                // move to the back so it reads as the latest touch
                let mut p = t.progress.remove(i);
                if let Some(done) = update.completed {
                    p.completed = done;
                }
                p.last_accessed = now;
                p.updated_at = now;
                p
            }
            None => StoredProgress {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                course_id: update.course_id,
                chapter_id: update.chapter_id,
                completed: update.completed.unwrap_or(false),
                last_accessed: now,
                created_at: now,
                updated_at: now,
            },
        };
        let out = t.resolve_progress(&rec)?;
        t.progress.push(rec);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(title: &str, category: Category, difficulty: Difficulty) -> NewCourse {
        NewCourse {
            title: title.into(),
            description: String::new(),
            category,
            difficulty,
            estimated_hours: 2,
        }
    }

    fn chapters(n: i32) -> Vec<NewChapter> {
        (1..=n)
            .map(|i| NewChapter {
                title: format!("Part {i}"),
                order: i,
                content: format!("# Part {i}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn rejects_sparse_chapter_orders() {
        let store = MemoryStore::new();
        let mut chs = chapters(3);
        chs[2].order = 5;
        let err = store
            .insert_course(course("CNNs", Category::DeepLearning, Difficulty::Intermediate), chs)
            .await;
        assert!(matches!(err, Err(StorageError::Integrity(_))));
        assert_eq!(store.count_courses().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn chapters_listed_in_order() {
        let store = MemoryStore::new();
        let mut chs = chapters(3);
        chs.reverse();
        let c = store
            .insert_course(course("Transformers", Category::Nlp, Difficulty::Advanced), chs)
            .await
            .unwrap();
        let outline = store.list_chapters_by_course(c.id).await.unwrap();
        let orders: Vec<i32> = outline.iter().map(|o| o.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn path_with_bad_reference_is_not_persisted() {
        let store = MemoryStore::new();
        let a = store
            .insert_course(course("Prompting", Category::Llm, Difficulty::Beginner), chapters(2))
            .await
            .unwrap();
        let b = store
            .insert_course(course("RAG", Category::Llm, Difficulty::Intermediate), chapters(1))
            .await
            .unwrap();
        let b_chapter = store.list_chapters_by_course(b.id).await.unwrap()[0].id;

        let path = NewLearningPath {
            name: "broken".into(),
            description: String::new(),
            target_audience: String::new(),
            items: vec![
                NewPathItem { order: 1, target: PathTarget::Course(a.id) },
                // chapter of another course
                NewPathItem {
                    order: 2,
                    target: PathTarget::Chapter { course_id: a.id, chapter_id: b_chapter },
                },
            ],
        };
        assert!(store.create_learning_path(path).await.is_err());
        assert!(store.list_paths().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn chapter_steps_round_trip() {
        let store = MemoryStore::new();
        let c = store
            .insert_course(course("Pandas", Category::AiTools, Difficulty::Beginner), chapters(2))
            .await
            .unwrap();
        let ch = store.list_chapters_by_course(c.id).await.unwrap()[1].clone();

        let created = store
            .create_learning_path(NewLearningPath {
                name: "mixed".into(),
                description: String::new(),
                target_audience: String::new(),
                items: vec![
                    NewPathItem {
                        order: 2,
                        target: PathTarget::Chapter { course_id: c.id, chapter_id: ch.id },
                    },
                    NewPathItem { order: 1, target: PathTarget::Course(c.id) },
                ],
            })
            .await
            .unwrap();

        assert_eq!(created.path_items[0].step.kind(), "course");
        assert_eq!(created.path_items[1].step.chapter(), Some(&ChapterSummary::from(&ch)));
        let fetched = store.get_path(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn progress_upserts_per_user_course_chapter() {
        let store = MemoryStore::new();
        let c = store
            .insert_course(course("Linear Regression", Category::MlBasics, Difficulty::Beginner), chapters(2))
            .await
            .unwrap();

        let first = store
            .upsert_progress("alice", ProgressUpdate { course_id: c.id, chapter_id: None, completed: Some(true) })
            .await
            .unwrap();
        let again = store
            .upsert_progress("alice", ProgressUpdate { course_id: c.id, chapter_id: None, completed: None })
            .await
            .unwrap();
        assert_eq!(first.id, again.id);
        assert!(again.completed, "absent flag keeps the stored value");

        store
            .upsert_progress("bob", ProgressUpdate { course_id: c.id, chapter_id: None, completed: None })
            .await
            .unwrap();

        let alice = store.list_progress("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        let bob = store.list_progress("bob").await.unwrap();
        assert_eq!(bob.len(), 1);
        assert!(!bob[0].completed);
    }

    #[tokio::test]
    async fn progress_requires_existing_course() {
        let store = MemoryStore::new();
        let res = store
            .upsert_progress("alice", ProgressUpdate { course_id: Uuid::new_v4(), chapter_id: None, completed: None })
            .await;
        assert!(matches!(res, Err(StorageError::Integrity(_))));
    }
}

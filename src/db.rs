use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, query, query_as, query_scalar, Pool, Postgres};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{error::StorageError, models::*, store::Store};

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str) -> Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("connecting to DATABASE_URL")?;
    Ok(pool)
}

const PATH_ITEM_SELECT: &str = r#"
    SELECT pi.id, pi.path_id, pi.item_order, pi.kind,
           c.id AS course_id, c.title AS course_title, c.description AS course_description,
           c.category AS course_category, c.difficulty AS course_difficulty,
           c.estimated_hours AS course_estimated_hours,
           ch.id AS chapter_id, ch.title AS chapter_title, ch.chapter_order AS chapter_order
    FROM path_items pi
    JOIN courses c ON c.id = pi.course_id
    LEFT JOIN chapters ch ON ch.id = pi.chapter_id
    WHERE pi.path_id = ANY($1)
    ORDER BY pi.path_id, pi.item_order
"#;

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        PgStore { db }
    }

    /// Items of every listed path, grouped by path id and ordered.
    async fn items_for(&self, path_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<PathItem>>, StorageError> {
        let rows: Vec<PathItemRow> = query_as(PATH_ITEM_SELECT)
            .bind(path_ids)
            .fetch_all(&self.db)
            .await?;

        let mut grouped: HashMap<Uuid, Vec<PathItem>> = HashMap::new();
        for r in rows {
            let item = PathItem::try_from(r)?;
            grouped.entry(item.path_id).or_default().push(item);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_courses(&self, category: Option<Category>) -> Result<Vec<Course>, StorageError> {
        let courses = query_as::<_, Course>(
            r#"
            SELECT id, title, description, category, difficulty, estimated_hours, created_at, updated_at
            FROM courses
            WHERE ($1::course_category IS NULL OR category = $1)
            ORDER BY seq
            "#,
        )
        .bind(category)
        .fetch_all(&self.db)
        .await?;
        Ok(courses)
    }

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StorageError> {
        let course = query_as::<_, Course>(
            r#"
            SELECT id, title, description, category, difficulty, estimated_hours, created_at, updated_at
            FROM courses WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(course)
    }

    async fn list_chapters_by_course(
        &self,
        course_id: Uuid,
    ) -> Result<Vec<ChapterOutline>, StorageError> {
        let chapters = query_as::<_, ChapterOutline>(
            r#"
            SELECT id, title, chapter_order, created_at, updated_at
            FROM chapters WHERE course_id = $1 ORDER BY chapter_order
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.db)
        .await?;
        Ok(chapters)
    }

    async fn get_chapter(&self, id: Uuid) -> Result<Option<Chapter>, StorageError> {
        let chapter = query_as::<_, Chapter>(
            r#"
            SELECT id, course_id, title, chapter_order, content, created_at, updated_at
            FROM chapters WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(chapter)
    }

    async fn count_courses(&self) -> Result<i64, StorageError> {
        let n: i64 = query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.db)
            .await?;
        Ok(n)
    }

    async fn insert_course(
        &self,
        course: NewCourse,
        chapters: Vec<NewChapter>,
    ) -> Result<Course, StorageError> {
        if !is_dense(chapters.iter().map(|c| c.order)) {
            return Err(StorageError::Integrity(format!(
                "chapter orders of {:?} are not 1..{}",
                course.title,
                chapters.len()
            )));
        }

        let mut tx = self.db.begin().await?;
        let created = query_as::<_, Course>(
            r#"
            INSERT INTO courses (id, title, description, category, difficulty, estimated_hours)
            VALUES ($1,$2,$3,$4,$5,$6)
            RETURNING id, title, description, category, difficulty, estimated_hours, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.category)
        .bind(course.difficulty)
        .bind(course.estimated_hours)
        .fetch_one(&mut *tx)
        .await?;

        for ch in &chapters {
            query(
                r#"INSERT INTO chapters (id, course_id, title, chapter_order, content) VALUES ($1,$2,$3,$4,$5)"#,
            )
            .bind(Uuid::new_v4())
            .bind(created.id)
            .bind(&ch.title)
            .bind(ch.order)
            .bind(&ch.content)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn create_learning_path(
        &self,
        path: NewLearningPath,
    ) -> Result<LearningPath, StorageError> {
        let path_id = Uuid::new_v4();

        // Dropping `tx` on any early return rolls the whole path back.
        let mut tx = self.db.begin().await?;
        query(
            r#"INSERT INTO learning_paths (id, name, description, target_audience) VALUES ($1,$2,$3,$4)"#,
        )
        .bind(path_id)
        .bind(&path.name)
        .bind(&path.description)
        .bind(&path.target_audience)
        .execute(&mut *tx)
        .await?;

        for item in &path.items {
            query(
                r#"
                INSERT INTO path_items (id, path_id, course_id, chapter_id, item_order, kind)
                VALUES ($1,$2,$3,$4,$5,$6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(path_id)
            .bind(item.target.course_id())
            .bind(item.target.chapter_id())
            .bind(item.order)
            .bind(item.target.kind())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.get_path(path_id).await?.ok_or_else(|| {
            StorageError::Integrity(format!("learning path {path_id} vanished after commit"))
        })
    }

    async fn list_paths(&self) -> Result<Vec<LearningPath>, StorageError> {
        let rows = query_as::<_, PathRow>(
            r#"
            SELECT id, name, description, target_audience, created_at, updated_at
            FROM learning_paths ORDER BY seq DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.items_for(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let its = items.remove(&r.id).unwrap_or_default();
                r.with_items(its)
            })
            .collect())
    }

    async fn get_path(&self, id: Uuid) -> Result<Option<LearningPath>, StorageError> {
        let row = query_as::<_, PathRow>(
            r#"
            SELECT id, name, description, target_audience, created_at, updated_at
            FROM learning_paths WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = self.items_for(&[id]).await?.remove(&id).unwrap_or_default();
        Ok(Some(row.with_items(items)))
    }

    async fn list_progress(&self, user_id: &str) -> Result<Vec<UserProgress>, StorageError> {
        let rows = query_as::<_, ProgressRow>(
            r#"
            SELECT p.id, p.user_id, p.course_id, p.chapter_id, p.completed,
                   p.last_accessed, p.created_at, p.updated_at,
                   c.title AS course_title, c.description AS course_description,
                   c.category AS course_category, c.difficulty AS course_difficulty,
                   c.estimated_hours AS course_estimated_hours
            FROM user_progress p
            JOIN courses c ON c.id = p.course_id
            WHERE p.user_id = $1
            ORDER BY p.last_accessed DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(UserProgress::from).collect())
    }

    async fn upsert_progress(
        &self,
        user_id: &str,
        update: ProgressUpdate,
    ) -> Result<UserProgress, StorageError> {
        let row = query_as::<_, ProgressRow>(
            r#"
            WITH up AS (
                INSERT INTO user_progress (id, user_id, course_id, chapter_id, completed, last_accessed)
                VALUES ($1, $2, $3, $4, COALESCE($5, FALSE), now())
                ON CONFLICT (user_id, course_id, (COALESCE(chapter_id, '00000000-0000-0000-0000-000000000000'::uuid)))
                DO UPDATE SET completed = COALESCE($5, user_progress.completed),
                              last_accessed = now(),
                              updated_at = now()
                RETURNING *
            )
            SELECT up.id, up.user_id, up.course_id, up.chapter_id, up.completed,
                   up.last_accessed, up.created_at, up.updated_at,
                   c.title AS course_title, c.description AS course_description,
                   c.category AS course_category, c.difficulty AS course_difficulty,
                   c.estimated_hours AS course_estimated_hours
            FROM up JOIN courses c ON c.id = up.course_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(update.course_id)
        .bind(update.chapter_id)
        .bind(update.completed)
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn course(title: &str, category: Category) -> NewCourse {
        NewCourse {
            title: title.into(),
            description: format!("{title} overview"),
            category,
            difficulty: Difficulty::Beginner,
            estimated_hours: 4,
        }
    }

    fn chapters(n: i32) -> Vec<NewChapter> {
        (1..=n)
            .map(|order| NewChapter {
                title: format!("Part {order}"),
                order,
                content: format!("# Part {order}"),
            })
            .collect()
    }

    async fn count(pool: &PgPool, table: &str) -> i64 {
        query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn chapters_list_in_order_without_content(pool: PgPool) {
        let store = PgStore::new(pool);
        let c = store
            .insert_course(course("Tokenizers", Category::Nlp), chapters(3))
            .await
            .unwrap();

        let listed = store.list_chapters_by_course(c.id).await.unwrap();
        let orders: Vec<i32> = listed.iter().map(|ch| ch.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);

        let full = store.get_chapter(listed[1].id).await.unwrap().unwrap();
        assert_eq!(full.course_id, c.id);
        assert_eq!(full.content, "# Part 2");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sparse_chapter_orders_insert_nothing(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let mut chs = chapters(2);
        chs[1].order = 3;

        let err = store
            .insert_course(course("Gaps", Category::Llm), chs)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Integrity(_)));
        assert_eq!(count(&pool, "courses").await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn path_round_trips_with_course_details(pool: PgPool) {
        let store = PgStore::new(pool);
        let a = store
            .insert_course(course("Attention", Category::DeepLearning), chapters(1))
            .await
            .unwrap();
        let b = store
            .insert_course(course("Prompting", Category::Llm), chapters(2))
            .await
            .unwrap();
        let b_first = store.list_chapters_by_course(b.id).await.unwrap()[0].id;

        let created = store
            .create_learning_path(NewLearningPath {
                name: "Mixed".into(),
                description: "two steps".into(),
                target_audience: "BEGINNER level learners".into(),
                items: vec![
                    NewPathItem { order: 1, target: PathTarget::Course(a.id) },
                    NewPathItem {
                        order: 2,
                        target: PathTarget::Chapter { course_id: b.id, chapter_id: b_first },
                    },
                ],
            })
            .await
            .unwrap();

        assert_eq!(created.path_items.len(), 2);
        assert_eq!(created.path_items[0].step.kind(), "course");
        assert_eq!(created.path_items[0].step.course().description, "Attention overview");
        assert_eq!(created.path_items[1].step.chapter().map(|c| c.id), Some(b_first));

        let fetched = store.get_path(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(store.list_paths().await.unwrap(), vec![created]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn foreign_chapter_step_rolls_back_whole_path(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let a = store
            .insert_course(course("Regression", Category::MlBasics), chapters(1))
            .await
            .unwrap();
        let b = store
            .insert_course(course("Agents", Category::AiTools), chapters(1))
            .await
            .unwrap();
        let b_chapter = store.list_chapters_by_course(b.id).await.unwrap()[0].id;

        let err = store
            .create_learning_path(NewLearningPath {
                name: "Broken".into(),
                description: "second step points across courses".into(),
                target_audience: "anyone".into(),
                items: vec![
                    NewPathItem { order: 1, target: PathTarget::Course(a.id) },
                    NewPathItem {
                        order: 2,
                        target: PathTarget::Chapter { course_id: a.id, chapter_id: b_chapter },
                    },
                ],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Database(_)));
        assert!(store.list_paths().await.unwrap().is_empty());
        assert_eq!(count(&pool, "learning_paths").await, 0);
        assert_eq!(count(&pool, "path_items").await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn progress_upsert_keeps_one_row_per_key(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let c = store
            .insert_course(course("Embeddings", Category::Nlp), chapters(2))
            .await
            .unwrap();
        let outline = store.list_chapters_by_course(c.id).await.unwrap();

        let first = store
            .upsert_progress(
                "alice",
                ProgressUpdate { course_id: c.id, chapter_id: None, completed: Some(true) },
            )
            .await
            .unwrap();
        assert!(first.completed);
        assert_eq!(first.course.estimated_hours, 4);

        // absent flag keeps the stored one; the null chapter still dedupes
        let touched = store
            .upsert_progress(
                "alice",
                ProgressUpdate { course_id: c.id, chapter_id: None, completed: None },
            )
            .await
            .unwrap();
        assert_eq!(touched.id, first.id);
        assert!(touched.completed);
        assert!(touched.last_accessed >= first.last_accessed);

        let chapter_row = store
            .upsert_progress(
                "alice",
                ProgressUpdate {
                    course_id: c.id,
                    chapter_id: Some(outline[0].id),
                    completed: None,
                },
            )
            .await
            .unwrap();
        assert_ne!(chapter_row.id, first.id);
        assert!(!chapter_row.completed);

        store
            .upsert_progress(
                "bob",
                ProgressUpdate { course_id: c.id, chapter_id: None, completed: Some(false) },
            )
            .await
            .unwrap();

        let alice = store.list_progress("alice").await.unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].id, chapter_row.id);
        assert_eq!(store.list_progress("bob").await.unwrap().len(), 1);
        assert_eq!(count(&pool, "user_progress").await, 3);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn progress_rejects_chapter_of_other_course(pool: PgPool) {
        let store = PgStore::new(pool);
        let a = store
            .insert_course(course("Vision", Category::DeepLearning), chapters(1))
            .await
            .unwrap();
        let b = store
            .insert_course(course("Retrieval", Category::Llm), chapters(1))
            .await
            .unwrap();
        let b_chapter = store.list_chapters_by_course(b.id).await.unwrap()[0].id;

        let res = store
            .upsert_progress(
                "alice",
                ProgressUpdate { course_id: a.id, chapter_id: Some(b_chapter), completed: None },
            )
            .await;
        assert!(matches!(res, Err(StorageError::Database(_))));
        assert!(store.list_progress("alice").await.unwrap().is_empty());
    }
}

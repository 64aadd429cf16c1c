use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "course_category", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    MlBasics,
    DeepLearning,
    Nlp,
    Llm,
    AiTools,
}

impl Category {
    #[cfg(test)]
    pub const ALL: [Category; 5] = [
        Category::MlBasics,
        Category::DeepLearning,
        Category::Nlp,
        Category::Llm,
        Category::AiTools,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::MlBasics => "Machine Learning Basics",
            Category::DeepLearning => "Deep Learning",
            Category::Nlp => "Natural Language Processing",
            Category::Llm => "Large Language Models",
            Category::AiTools => "AI Tools",
        }
    }
}

/// Skill tier. Variant order is the difficulty order, so the derived `Ord`
/// gives BEGINNER < INTERMEDIATE < ADVANCED.
#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[sqlx(type_name = "difficulty", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn rank(self) -> u8 {
        match self {
            Difficulty::Beginner => 0,
            Difficulty::Intermediate => 1,
            Difficulty::Advanced => 2,
        }
    }

    /// Number of tiers between `self` and `other`.
    pub fn distance(self, other: Difficulty) -> u8 {
        self.rank().abs_diff(other.rank())
    }

    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub estimated_hours: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    #[sqlx(rename = "chapter_order")]
    pub order: i32,
    pub content: String, // Markdown, stored and returned as-is
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub estimated_hours: i32,
}

impl From<&Course> for CourseSummary {
    fn from(c: &Course) -> Self {
        CourseSummary {
            id: c.id,
            title: c.title.clone(),
            description: c.description.clone(),
            category: c.category,
            difficulty: c.difficulty,
            estimated_hours: c.estimated_hours,
        }
    }
}

/// Chapter listing entry: the outline plus timestamps, no content.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterOutline {
    pub id: Uuid,
    pub title: String,
    #[sqlx(rename = "chapter_order")]
    pub order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Chapter> for ChapterOutline {
    fn from(ch: &Chapter) -> Self {
        ChapterOutline {
            id: ch.id,
            title: ch.title.clone(),
            order: ch.order,
            created_at: ch.created_at,
            updated_at: ch.updated_at,
        }
    }
}

/// Chapter without its content; used for course outlines and path items.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSummary {
    pub id: Uuid,
    pub title: String,
    pub order: i32,
}

impl From<&ChapterOutline> for ChapterSummary {
    fn from(ch: &ChapterOutline) -> Self {
        ChapterSummary {
            id: ch.id,
            title: ch.title.clone(),
            order: ch.order,
        }
    }
}

impl From<&Chapter> for ChapterSummary {
    fn from(ch: &Chapter) -> Self {
        ChapterSummary {
            id: ch.id,
            title: ch.title.clone(),
            order: ch.order,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub chapters: Vec<ChapterSummary>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChapterDetail {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub course: CourseSummary,
}

/// What a path step points at. A chapter step always carries its chapter.
///
/// The ids sit beside the `type` tag so clients can link without unpacking
/// the summaries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PathStep {
    Course {
        #[serde(rename = "courseId")]
        course_id: Uuid,
        course: CourseSummary,
    },
    Chapter {
        #[serde(rename = "courseId")]
        course_id: Uuid,
        #[serde(rename = "chapterId")]
        chapter_id: Uuid,
        course: CourseSummary,
        chapter: ChapterSummary,
    },
}

impl PathStep {
    pub fn whole_course(course: CourseSummary) -> Self {
        PathStep::Course {
            course_id: course.id,
            course,
        }
    }

    pub fn single_chapter(course: CourseSummary, chapter: ChapterSummary) -> Self {
        PathStep::Chapter {
            course_id: course.id,
            chapter_id: chapter.id,
            course,
            chapter,
        }
    }
}

#[cfg(test)]
impl PathStep {
    pub fn course(&self) -> &CourseSummary {
        match self {
            PathStep::Course { course, .. } | PathStep::Chapter { course, .. } => course,
        }
    }

    pub fn chapter(&self) -> Option<&ChapterSummary> {
        match self {
            PathStep::Course { .. } => None,
            PathStep::Chapter { chapter, .. } => Some(chapter),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PathStep::Course { .. } => "course",
            PathStep::Chapter { .. } => "chapter",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PathItem {
    pub id: Uuid,
    pub path_id: Uuid,
    pub order: i32,
    #[serde(flatten)]
    pub step: PathStep,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LearningPath {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub target_audience: String,
    pub path_items: Vec<PathItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Header row of `learning_paths`, before items are attached.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PathRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub target_audience: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PathRow {
    pub fn with_items(self, path_items: Vec<PathItem>) -> LearningPath {
        LearningPath {
            id: self.id,
            name: self.name,
            description: self.description,
            target_audience: self.target_audience,
            path_items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// `path_items` joined with its course and optional chapter.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PathItemRow {
    pub id: Uuid,
    pub path_id: Uuid,
    pub item_order: i32,
    pub kind: String,
    pub course_id: Uuid,
    pub course_title: String,
    pub course_description: String,
    pub course_category: Category,
    pub course_difficulty: Difficulty,
    pub course_estimated_hours: i32,
    pub chapter_id: Option<Uuid>,
    pub chapter_title: Option<String>,
    pub chapter_order: Option<i32>,
}

impl TryFrom<PathItemRow> for PathItem {
    type Error = StorageError;

    fn try_from(r: PathItemRow) -> Result<Self, Self::Error> {
        let course = CourseSummary {
            id: r.course_id,
            title: r.course_title,
            description: r.course_description,
            category: r.course_category,
            difficulty: r.course_difficulty,
            estimated_hours: r.course_estimated_hours,
        };
        let step = match (r.kind.as_str(), r.chapter_id, r.chapter_title, r.chapter_order) {
            ("course", _, _, _) => PathStep::whole_course(course),
            ("chapter", Some(id), Some(title), Some(order)) => {
                PathStep::single_chapter(course, ChapterSummary { id, title, order })
            }
            (kind, ..) => {
                return Err(StorageError::Integrity(format!(
                    "path item {} has kind {kind:?} without a matching chapter",
                    r.id
                )))
            }
        };
        Ok(PathItem {
            id: r.id,
            path_id: r.path_id,
            order: r.item_order,
            step,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub id: Uuid,
    pub user_id: String,
    pub course_id: Uuid,
    pub chapter_id: Option<Uuid>,
    pub completed: bool,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub course: CourseSummary,
}

/// `user_progress` joined with its course.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ProgressRow {
    pub id: Uuid,
    pub user_id: String,
    pub course_id: Uuid,
    pub chapter_id: Option<Uuid>,
    pub completed: bool,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub course_title: String,
    pub course_description: String,
    pub course_category: Category,
    pub course_difficulty: Difficulty,
    pub course_estimated_hours: i32,
}

impl From<ProgressRow> for UserProgress {
    fn from(r: ProgressRow) -> Self {
        UserProgress {
            id: r.id,
            user_id: r.user_id,
            course_id: r.course_id,
            chapter_id: r.chapter_id,
            completed: r.completed,
            last_accessed: r.last_accessed,
            created_at: r.created_at,
            updated_at: r.updated_at,
            course: CourseSummary {
                id: r.course_id,
                title: r.course_title,
                description: r.course_description,
                category: r.course_category,
                difficulty: r.course_difficulty,
                estimated_hours: r.course_estimated_hours,
            },
        }
    }
}

// --- write-side inputs ---

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub estimated_hours: i32,
}

#[derive(Debug, Clone)]
pub struct NewChapter {
    pub title: String,
    pub order: i32,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTarget {
    Course(Uuid),
    // stores accept chapter steps; generation only emits whole courses
    #[cfg_attr(not(test), allow(dead_code))]
    Chapter { course_id: Uuid, chapter_id: Uuid },
}

impl PathTarget {
    pub fn course_id(&self) -> Uuid {
        match *self {
            PathTarget::Course(id) | PathTarget::Chapter { course_id: id, .. } => id,
        }
    }

    pub fn chapter_id(&self) -> Option<Uuid> {
        match *self {
            PathTarget::Course(_) => None,
            PathTarget::Chapter { chapter_id, .. } => Some(chapter_id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PathTarget::Course(_) => "course",
            PathTarget::Chapter { .. } => "chapter",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPathItem {
    pub order: i32,
    pub target: PathTarget,
}

#[derive(Debug, Clone)]
pub struct NewLearningPath {
    pub name: String,
    pub description: String,
    pub target_audience: String,
    pub items: Vec<NewPathItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub course_id: Uuid,
    pub chapter_id: Option<Uuid>,
    /// `None` keeps the stored flag (or `false` for a new record).
    pub completed: Option<bool>,
}

// --- request bodies ---

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePathReq {
    pub interests: Option<Vec<Category>>,
    pub current_level: Option<Difficulty>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressReq {
    pub course_id: Option<Uuid>,
    pub chapter_id: Option<Uuid>,
    pub completed: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CourseQuery {
    pub category: Option<Category>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    pub user_id: Option<String>,
}

/// True when `orders` is exactly 1..=N in some arrangement.
pub fn is_dense(orders: impl IntoIterator<Item = i32>) -> bool {
    let mut v: Vec<i32> = orders.into_iter().collect();
    v.sort_unstable();
    v.iter().zip(1..).all(|(&o, i)| o == i)
}

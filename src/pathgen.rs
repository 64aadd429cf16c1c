//! Learning-path generation.
//!
//! A path is one course-level step per course in the requested categories,
//! ranked by how close the course is to the learner's level. Chapter steps are
//! never generated here; stored paths may still contain them.

use crate::{
    error::AppError,
    models::{Category, Course, Difficulty, LearningPath, NewLearningPath, NewPathItem, PathTarget},
    store::SharedStore,
};

#[derive(Clone)]
pub struct PathGenerator {
    store: SharedStore,
}

impl PathGenerator {
    pub fn new(store: SharedStore) -> Self {
        PathGenerator { store }
    }

    /// Builds and persists a path for `interests` at `level`.
    ///
    /// Rejects an empty interest list before touching the store.
    pub async fn generate(
        &self,
        interests: &[Category],
        level: Difficulty,
    ) -> Result<LearningPath, AppError> {
        let interests = dedup(interests);
        if interests.is_empty() {
            return Err(AppError::invalid(
                "interests must name at least one category",
            ));
        }

        let selected: Vec<Course> = self
            .store
            .list_courses(None)
            .await?
            .into_iter()
            .filter(|c| interests.contains(&c.category))
            .collect();
        let ranked = rank_courses(selected, &interests, level);
        let plan = plan_path(&ranked, &interests, level);

        let path = self.store.create_learning_path(plan).await?;
        tracing::info!(
            path_id=%path.id,
            items=path.path_items.len(),
            level=?level,
            interests=?interests,
            "generated learning path"
        );
        Ok(path)
    }
}

/// First occurrence wins, so the caller's ordering is kept.
fn dedup(interests: &[Category]) -> Vec<Category> {
    let mut out: Vec<Category> = Vec::with_capacity(interests.len());
    for &c in interests {
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Orders courses by `(distance from level, harder than level, interest position)`.
///
/// The sort is stable, so courses that tie keep the order they were listed in,
/// which is creation order. At equal distance an easier course precedes a
/// harder one.
pub fn rank_courses(mut courses: Vec<Course>, interests: &[Category], level: Difficulty) -> Vec<Course> {
    courses.sort_by_key(|c| {
        let position = interests
            .iter()
            .position(|&i| i == c.category)
            .unwrap_or(usize::MAX);
        (c.difficulty.distance(level), c.difficulty > level, position)
    });
    courses
}

/// Turns ranked courses into a named path with dense 1-based orders.
pub fn plan_path(ranked: &[Course], interests: &[Category], level: Difficulty) -> NewLearningPath {
    let items = ranked
        .iter()
        .zip(1..)
        .map(|(c, order)| NewPathItem {
            order,
            target: PathTarget::Course(c.id),
        })
        .collect();

    let topics: Vec<&str> = interests.iter().map(|c| c.label()).collect();
    let hours: i32 = ranked.iter().map(|c| c.estimated_hours).sum();
    let description = match ranked.len() {
        0 => "No courses are available for these topics yet.".to_string(),
        1 => format!("1 course, about {hours} hours of study."),
        n => format!("{n} courses, about {hours} hours of study."),
    };

    NewLearningPath {
        name: format!("{} path: {}", level.label(), topics.join(", ")),
        description,
        target_audience: format!("{} learners", level.label()),
        items,
    }
}

//! crates/lms_core/src/progress.rs
//!
//! The learning-progress engine: mutations on [`CourseProgress`], the
//! chapter access gate, and the course completion evaluator. Everything in
//! this module is pure so it can be exercised without a storage backend.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{Chapter, CourseCompletionState, CourseProgress};

//=========================================================================================
// Progress Mutations
//=========================================================================================

impl CourseProgress {
    /// A fresh progress record: empty sets, position (0, 0), no time spent.
    pub fn new(user_id: Uuid, course_id: Uuid) -> Self {
        Self {
            course_id,
            user_id,
            current_chapter: 0,
            current_video: 0,
            completed_videos: HashSet::new(),
            completed_chapters: HashSet::new(),
            quiz_passed: HashSet::new(),
            total_time_spent_ms: 0,
            completed_at: None,
        }
    }

    /// Idempotently marks a video watched. Does not unlock anything;
    /// chapter unlock is driven by quiz results, not video completion.
    pub fn mark_video_complete(&mut self, video_id: Uuid) {
        self.completed_videos.insert(video_id);
    }

    /// Records a passed chapter quiz, completing the chapter in the same
    /// operation. Idempotent.
    pub fn record_quiz_pass(&mut self, chapter_id: Uuid) {
        self.quiz_passed.insert(chapter_id);
        self.completed_chapters.insert(chapter_id);
    }

    /// Overwrites the learner's last viewed position. The caller supplies
    /// valid indices.
    pub fn update_position(&mut self, chapter_index: usize, video_index: usize) {
        self.current_chapter = chapter_index;
        self.current_video = video_index;
    }

    /// Adds `delta_ms` of video playback to the running total.
    pub fn add_watch_time(&mut self, delta_ms: i64) {
        self.total_time_spent_ms = self.total_time_spent_ms.saturating_add(delta_ms.max(0));
    }

    /// Replaces this progress with a fresh initial state for the same
    /// (user, course) pair.
    pub fn reset(&mut self) {
        *self = Self::new(self.user_id, self.course_id);
    }
}

//=========================================================================================
// Chapter Access Gate
//=========================================================================================

/// Answers "can the learner enter chapter `index`?".
///
/// Chapter 0 is always accessible. Chapter i > 0 is accessible iff chapter
/// i-1's id is in `quiz_passed`. Pure; evaluated from current progress on
/// every request.
pub fn chapter_accessible(progress: &CourseProgress, chapters: &[Chapter], index: usize) -> bool {
    if index >= chapters.len() {
        return false;
    }
    if index == 0 {
        return true;
    }
    progress.quiz_passed.contains(&chapters[index - 1].id)
}

/// Per-chapter accessibility, in course order, for the REST surface.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterAccess {
    pub chapter_id: Uuid,
    pub position: usize,
    pub accessible: bool,
    pub completed: bool,
}

pub fn accessible_chapters(progress: &CourseProgress, chapters: &[Chapter]) -> Vec<ChapterAccess> {
    chapters
        .iter()
        .enumerate()
        .map(|(index, chapter)| ChapterAccess {
            chapter_id: chapter.id,
            position: index,
            accessible: chapter_accessible(progress, chapters, index),
            completed: progress.completed_chapters.contains(&chapter.id),
        })
        .collect()
}

//=========================================================================================
// Course Completion Evaluator
//=========================================================================================

/// Derives the course completion state from progress and the chapter list.
///
/// A course with no chapters is never reported completed, so the
/// `completed_at` stamp can only be produced by real progress.
pub fn evaluate_completion(
    progress: &CourseProgress,
    chapters: &[Chapter],
) -> CourseCompletionState {
    let total = chapters.len();
    let completed = chapters
        .iter()
        .filter(|c| progress.completed_chapters.contains(&c.id))
        .count();
    let is_completed = total > 0 && completed == total;

    let final_score = if total == 0 {
        0
    } else {
        (completed * 100 / total) as u32
    };

    CourseCompletionState {
        is_completed,
        completed_chapters: completed,
        total_chapters: total,
        final_score,
        completed_at: progress.completed_at,
    }
}

/// Stamps `completed_at` if the course has just transitioned to completed.
///
/// Returns `true` exactly once per progress lifetime (until a reset): on the
/// first evaluation that observes completion with no durable stamp. The
/// caller persists the mutated progress and surfaces the edge to the UI.
pub fn stamp_completion(
    progress: &mut CourseProgress,
    chapters: &[Chapter],
    now: DateTime<Utc>,
) -> bool {
    let state = evaluate_completion(progress, chapters);
    if state.is_completed && progress.completed_at.is_none() {
        progress.completed_at = Some(now);
        return true;
    }
    false
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(course_id: Uuid, position: i32) -> Chapter {
        Chapter {
            id: Uuid::new_v4(),
            course_id,
            title: format!("Chapter {}", position + 1),
            description: String::new(),
            position,
        }
    }

    fn three_chapters() -> (CourseProgress, Vec<Chapter>) {
        let course_id = Uuid::new_v4();
        let chapters = vec![
            chapter(course_id, 0),
            chapter(course_id, 1),
            chapter(course_id, 2),
        ];
        let progress = CourseProgress::new(Uuid::new_v4(), course_id);
        (progress, chapters)
    }

    #[test]
    fn mark_video_complete_is_idempotent() {
        let (mut progress, _) = three_chapters();
        let video_id = Uuid::new_v4();

        progress.mark_video_complete(video_id);
        let after_first = progress.completed_videos.clone();
        progress.mark_video_complete(video_id);

        assert_eq!(progress.completed_videos, after_first);
        assert_eq!(progress.completed_videos.len(), 1);
    }

    #[test]
    fn first_chapter_is_always_accessible() {
        let (progress, chapters) = three_chapters();
        assert!(chapter_accessible(&progress, &chapters, 0));
        assert!(!chapter_accessible(&progress, &chapters, 1));
    }

    #[test]
    fn gating_follows_quiz_passes() {
        let (mut progress, chapters) = three_chapters();
        progress.record_quiz_pass(chapters[0].id);

        assert!(chapter_accessible(&progress, &chapters, 1));
        assert!(!chapter_accessible(&progress, &chapters, 2));
    }

    #[test]
    fn out_of_range_chapter_is_not_accessible() {
        let (progress, chapters) = three_chapters();
        assert!(!chapter_accessible(&progress, &chapters, 3));
    }

    #[test]
    fn quiz_pass_completes_the_chapter() {
        let (mut progress, chapters) = three_chapters();
        progress.record_quiz_pass(chapters[0].id);

        assert!(progress.quiz_passed.contains(&chapters[0].id));
        assert!(progress.completed_chapters.contains(&chapters[0].id));
        // The invariant: completed chapters are a subset of passed quizzes.
        assert!(progress.completed_chapters.is_subset(&progress.quiz_passed));
    }

    #[test]
    fn completion_requires_every_chapter() {
        let (mut progress, chapters) = three_chapters();
        progress.record_quiz_pass(chapters[0].id);
        progress.record_quiz_pass(chapters[1].id);

        let state = evaluate_completion(&progress, &chapters);
        assert!(!state.is_completed);
        assert_eq!(state.completed_chapters, 2);

        progress.record_quiz_pass(chapters[2].id);
        let state = evaluate_completion(&progress, &chapters);
        assert!(state.is_completed);
        assert_eq!(state.final_score, 100);
    }

    #[test]
    fn completion_stamp_fires_once() {
        let (mut progress, chapters) = three_chapters();
        for c in &chapters {
            progress.record_quiz_pass(c.id);
        }

        let now = Utc::now();
        assert!(stamp_completion(&mut progress, &chapters, now));
        assert_eq!(progress.completed_at, Some(now));

        // Re-evaluating later keeps the original instant.
        let later = now + chrono::Duration::days(1);
        assert!(!stamp_completion(&mut progress, &chapters, later));
        assert_eq!(progress.completed_at, Some(now));
    }

    #[test]
    fn empty_course_is_never_completed() {
        let progress = CourseProgress::new(Uuid::new_v4(), Uuid::new_v4());
        let state = evaluate_completion(&progress, &[]);
        assert!(!state.is_completed);
        assert_eq!(state.final_score, 0);
    }

    #[test]
    fn reset_restores_the_initial_state() {
        let (mut progress, chapters) = three_chapters();
        progress.mark_video_complete(Uuid::new_v4());
        progress.record_quiz_pass(chapters[0].id);
        progress.update_position(2, 4);
        progress.add_watch_time(90_000);

        progress.reset();

        assert_eq!(progress, CourseProgress::new(progress.user_id, progress.course_id));
        assert_eq!(progress.current_chapter, 0);
        assert_eq!(progress.current_video, 0);
        assert_eq!(progress.total_time_spent_ms, 0);
        assert!(progress.completed_videos.is_empty());
    }

    #[test]
    fn watch_time_accumulates_and_ignores_negative_deltas() {
        let (mut progress, _) = three_chapters();
        progress.add_watch_time(1_500);
        progress.add_watch_time(2_500);
        progress.add_watch_time(-10_000);
        assert_eq!(progress.total_time_spent_ms, 4_000);
    }
}

//! crates/lms_core/src/quiz.rs
//!
//! The timed, scored quiz state machine gating chapter progression.
//!
//! The machine never reads a wall clock of its own: every transition takes
//! `now`, so the countdown is deterministic under test. The host records
//! the quiz pass on the learner's progress when a submission passes; the
//! machine itself never touches storage.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{QuizAnswer, QuizQuestion};

/// Fixed quiz duration, in seconds.
pub const QUIZ_DURATION_SECS: i64 = 300;

/// Passing threshold, as a percentage of total points.
pub const PASS_THRESHOLD: f64 = 70.0;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizPhase {
    InProgress,
    Passed,
    Failed,
}

/// The result of scoring a submission.
#[derive(Debug, Clone, Serialize)]
pub struct QuizOutcome {
    pub score: f64,
    pub passed: bool,
    pub earned_points: i32,
    pub total_points: i32,
    pub answered: usize,
    pub total_questions: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("The quiz has already been submitted")]
    AlreadySubmitted,
    #[error("Question {0} is not part of this quiz")]
    UnknownQuestion(Uuid),
    #[error("Time expired; the quiz was submitted with the recorded answers")]
    TimeExpired,
    #[error("Retry is only available after a failed submission")]
    RetryUnavailable,
    #[error("The quiz has no questions")]
    NoQuestions,
}

/// Scores recorded answers against the question set.
///
/// Unanswered and kind-mismatched questions count as incorrect, never as
/// ungraded.
pub fn score_answers(
    questions: &[QuizQuestion],
    answers: &HashMap<Uuid, QuizAnswer>,
) -> QuizOutcome {
    let total_points: i32 = questions.iter().map(|q| q.points).sum();
    let earned_points: i32 = questions
        .iter()
        .filter(|q| answers.get(&q.id).map(|a| q.is_correct(a)).unwrap_or(false))
        .map(|q| q.points)
        .sum();

    let score = if total_points > 0 {
        f64::from(earned_points) / f64::from(total_points) * 100.0
    } else {
        0.0
    };

    QuizOutcome {
        score,
        passed: score >= PASS_THRESHOLD,
        earned_points,
        total_points,
        answered: answers.len(),
        total_questions: questions.len(),
    }
}

/// One learner's run through one chapter's quiz.
#[derive(Debug, Clone)]
pub struct QuizSession {
    chapter_id: Uuid,
    questions: Vec<QuizQuestion>,
    answers: HashMap<Uuid, QuizAnswer>,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    phase: QuizPhase,
    outcome: Option<QuizOutcome>,
}

impl QuizSession {
    pub fn new(
        chapter_id: Uuid,
        questions: Vec<QuizQuestion>,
        now: DateTime<Utc>,
    ) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        Ok(Self {
            chapter_id,
            questions,
            answers: HashMap::new(),
            started_at: now,
            deadline: now + Duration::seconds(QUIZ_DURATION_SECS),
            phase: QuizPhase::InProgress,
            outcome: None,
        })
    }

    pub fn chapter_id(&self) -> Uuid {
        self.chapter_id
    }

    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    pub fn outcome(&self) -> Option<&QuizOutcome> {
        self.outcome.as_ref()
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds left on the countdown, clamped at zero.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline - now).num_seconds().max(0)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Records (or overwrites) the answer for one question. Changing an
    /// answer before submit carries no penalty.
    ///
    /// Once the deadline has passed the session is force-submitted with the
    /// answers recorded so far and `TimeExpired` is returned; the caller
    /// reads the outcome off the session.
    pub fn record_answer(
        &mut self,
        now: DateTime<Utc>,
        question_id: Uuid,
        answer: QuizAnswer,
    ) -> Result<(), QuizError> {
        if self.phase != QuizPhase::InProgress {
            return Err(QuizError::AlreadySubmitted);
        }
        if self.is_expired(now) {
            self.finalize();
            return Err(QuizError::TimeExpired);
        }
        if !self.questions.iter().any(|q| q.id == question_id) {
            return Err(QuizError::UnknownQuestion(question_id));
        }
        self.answers.insert(question_id, answer);
        Ok(())
    }

    /// Submits the quiz, scoring whatever answers are recorded. Submitting
    /// after the deadline is the countdown-reached-zero case and uses only
    /// the answers recorded before it.
    pub fn submit(&mut self, _now: DateTime<Utc>) -> Result<QuizOutcome, QuizError> {
        if self.phase != QuizPhase::InProgress {
            return Err(QuizError::AlreadySubmitted);
        }
        Ok(self.finalize())
    }

    /// Full reset from a failed submission: answers cleared, countdown
    /// restarted.
    pub fn retry(&mut self, now: DateTime<Utc>) -> Result<(), QuizError> {
        if self.phase != QuizPhase::Failed {
            return Err(QuizError::RetryUnavailable);
        }
        self.answers.clear();
        self.started_at = now;
        self.deadline = now + Duration::seconds(QUIZ_DURATION_SECS);
        self.phase = QuizPhase::InProgress;
        self.outcome = None;
        Ok(())
    }

    fn finalize(&mut self) -> QuizOutcome {
        let outcome = score_answers(&self.questions, &self.answers);
        self.phase = if outcome.passed {
            QuizPhase::Passed
        } else {
            QuizPhase::Failed
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuestionKind;

    fn true_false(chapter_id: Uuid, correct: bool) -> QuizQuestion {
        QuizQuestion {
            id: Uuid::new_v4(),
            chapter_id,
            prompt: "T/F".to_string(),
            kind: QuestionKind::TrueFalse { correct },
            points: 1,
            difficulty: None,
            explanation: None,
        }
    }

    fn four_question_session(now: DateTime<Utc>) -> QuizSession {
        let chapter_id = Uuid::new_v4();
        let questions = vec![
            true_false(chapter_id, true),
            true_false(chapter_id, true),
            true_false(chapter_id, true),
            true_false(chapter_id, true),
        ];
        QuizSession::new(chapter_id, questions, now).unwrap()
    }

    #[test]
    fn three_of_four_correct_scores_seventy_five_and_passes() {
        let now = Utc::now();
        let mut session = four_question_session(now);
        let ids: Vec<Uuid> = session.questions.iter().map(|q| q.id).collect();

        for id in &ids[..3] {
            session
                .record_answer(now, *id, QuizAnswer::Bool { value: true })
                .unwrap();
        }
        // The fourth question is never answered.
        let outcome = session.submit(now).unwrap();

        assert_eq!(outcome.score, 75.0);
        assert!(outcome.passed);
        assert_eq!(session.phase(), QuizPhase::Passed);
    }

    #[test]
    fn expiry_forces_submission_with_recorded_answers() {
        let now = Utc::now();
        let mut session = four_question_session(now);
        let ids: Vec<Uuid> = session.questions.iter().map(|q| q.id).collect();

        session
            .record_answer(now, ids[0], QuizAnswer::Bool { value: true })
            .unwrap();
        session
            .record_answer(now, ids[1], QuizAnswer::Bool { value: true })
            .unwrap();

        let past_deadline = now + Duration::seconds(QUIZ_DURATION_SECS + 1);
        let err = session
            .record_answer(past_deadline, ids[2], QuizAnswer::Bool { value: true })
            .unwrap_err();

        assert_eq!(err, QuizError::TimeExpired);
        let outcome = session.outcome().expect("auto-submitted");
        // Only the two answers recorded before the deadline count.
        assert_eq!(outcome.score, 50.0);
        assert!(!outcome.passed);
        assert_eq!(session.phase(), QuizPhase::Failed);
    }

    #[test]
    fn changing_an_answer_overwrites_without_penalty() {
        let now = Utc::now();
        let mut session = four_question_session(now);
        let ids: Vec<Uuid> = session.questions.iter().map(|q| q.id).collect();

        for id in &ids {
            session
                .record_answer(now, *id, QuizAnswer::Bool { value: false })
                .unwrap();
        }
        for id in &ids {
            session
                .record_answer(now, *id, QuizAnswer::Bool { value: true })
                .unwrap();
        }

        let outcome = session.submit(now).unwrap();
        assert_eq!(outcome.score, 100.0);
    }

    #[test]
    fn exactly_seventy_percent_passes() {
        let now = Utc::now();
        let chapter_id = Uuid::new_v4();
        let questions: Vec<QuizQuestion> =
            (0..10).map(|_| true_false(chapter_id, true)).collect();
        let ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();
        let mut session = QuizSession::new(chapter_id, questions, now).unwrap();

        for id in &ids[..7] {
            session
                .record_answer(now, *id, QuizAnswer::Bool { value: true })
                .unwrap();
        }
        let outcome = session.submit(now).unwrap();

        assert_eq!(outcome.score, 70.0);
        assert!(outcome.passed);
    }

    #[test]
    fn retry_resets_answers_and_timer() {
        let now = Utc::now();
        let mut session = four_question_session(now);
        let outcome = session.submit(now).unwrap();
        assert!(!outcome.passed);

        let later = now + Duration::seconds(60);
        session.retry(later).unwrap();

        assert_eq!(session.phase(), QuizPhase::InProgress);
        assert!(session.outcome().is_none());
        assert!(session.answers.is_empty());
        assert_eq!(session.remaining_secs(later), QUIZ_DURATION_SECS);
    }

    #[test]
    fn retry_is_unavailable_after_a_pass() {
        let now = Utc::now();
        let mut session = four_question_session(now);
        let ids: Vec<Uuid> = session.questions.iter().map(|q| q.id).collect();
        for id in &ids {
            session
                .record_answer(now, *id, QuizAnswer::Bool { value: true })
                .unwrap();
        }
        session.submit(now).unwrap();

        assert_eq!(session.retry(now).unwrap_err(), QuizError::RetryUnavailable);
    }

    #[test]
    fn kind_mismatched_answer_scores_as_incorrect() {
        let now = Utc::now();
        let chapter_id = Uuid::new_v4();
        let question = QuizQuestion {
            id: Uuid::new_v4(),
            chapter_id,
            prompt: "Pick one".to_string(),
            kind: QuestionKind::MultipleChoice {
                options: vec!["a".into(), "b".into()],
                correct: 1,
            },
            points: 1,
            difficulty: None,
            explanation: None,
        };
        let qid = question.id;
        let mut session = QuizSession::new(chapter_id, vec![question], now).unwrap();

        session
            .record_answer(now, qid, QuizAnswer::Bool { value: true })
            .unwrap();
        let outcome = session.submit(now).unwrap();

        assert_eq!(outcome.score, 0.0);
        assert!(!outcome.passed);
    }

    #[test]
    fn double_submit_is_rejected() {
        let now = Utc::now();
        let mut session = four_question_session(now);
        session.submit(now).unwrap();
        assert_eq!(session.submit(now).unwrap_err(), QuizError::AlreadySubmitted);
    }

    #[test]
    fn empty_quiz_cannot_start() {
        let err = QuizSession::new(Uuid::new_v4(), Vec::new(), Utc::now()).unwrap_err();
        assert_eq!(err, QuizError::NoQuestions);
    }
}

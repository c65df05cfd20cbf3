//! crates/lms_core/src/domain.rs
//!
//! Defines the pure, core data structures for the course platform.
//! These structs are independent of any database or web framework.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A published (or draft) course in the catalog.
#[derive(Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Price in the smallest unit of `currency`. Zero means free to claim.
    pub price_amount: i64,
    pub currency: String,
    /// Optional redeem code granting a purchase without payment.
    pub access_code: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

/// An ordered unit of a course. Access to chapter N (N > 0) is gated
/// behind passing chapter N-1's quiz.
#[derive(Debug, Clone)]
pub struct Chapter {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub position: i32,
}

/// A video belongs to exactly one chapter. Immutable once authored.
#[derive(Debug, Clone)]
pub struct Video {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub title: String,
    pub position: i32,
    pub duration_secs: i32,
}

/// The kind of a quiz question, carrying its correct answer.
///
/// Scoring matches exhaustively on (kind, recorded answer); an answer of
/// the wrong shape scores as incorrect rather than ungraded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice { options: Vec<String>, correct: u32 },
    TrueFalse { correct: bool },
}

/// A learner's recorded answer to a single question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuizAnswer {
    Choice { selected: u32 },
    Bool { value: bool },
}

#[derive(Debug, Clone)]
pub struct QuizQuestion {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub prompt: String,
    pub kind: QuestionKind,
    pub points: i32,
    pub difficulty: Option<String>,
    pub explanation: Option<String>,
}

impl QuizQuestion {
    /// Whether `answer` matches this question's correct answer.
    pub fn is_correct(&self, answer: &QuizAnswer) -> bool {
        match (&self.kind, answer) {
            (QuestionKind::MultipleChoice { correct, .. }, QuizAnswer::Choice { selected }) => {
                correct == selected
            }
            (QuestionKind::TrueFalse { correct }, QuizAnswer::Bool { value }) => correct == value,
            // A kind-mismatched answer is present-but-wrong.
            _ => false,
        }
    }
}

/// A learner's position and completion state in one course.
///
/// Invariant: `completed_chapters` is a subset of `quiz_passed`. The only
/// chapter-completing operation, [`CourseProgress::record_quiz_pass`],
/// inserts into both sets, so the invariant holds by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub current_chapter: usize,
    pub current_video: usize,
    pub completed_videos: HashSet<Uuid>,
    pub completed_chapters: HashSet<Uuid>,
    pub quiz_passed: HashSet<Uuid>,
    pub total_time_spent_ms: i64,
    /// Stamped once, on the first observation of full completion.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Derived from [`CourseProgress`] plus the course's chapter list; never
/// stored apart from the `completed_at` stamp on the progress row.
#[derive(Debug, Clone, Serialize)]
pub struct CourseCompletionState {
    pub is_completed: bool,
    pub completed_chapters: usize,
    pub total_chapters: usize,
    pub final_score: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A referral code owned by a (user, course) pair.
#[derive(Debug, Clone)]
pub struct AffiliateLink {
    pub code: String,
    pub owner_user_id: Uuid,
    pub course_id: Uuid,
    pub clicks: i64,
    pub conversions: i64,
    /// Accumulated earnings, net of the platform fee, in the smallest
    /// currency unit.
    pub total_earnings: i64,
}

/// Current state of one mobile-money deposit as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStatus {
    Submitted,
    Accepted,
    Pending,
    Completed,
    Failed,
    Rejected,
}

impl DepositStatus {
    /// Terminal statuses end the confirmation poll; the deposit id is
    /// never reused afterwards.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DepositStatus::Completed | DepositStatus::Failed | DepositStatus::Rejected
        )
    }

    /// The canonical uppercase label, as stored and as spoken by the gateway.
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Submitted => "SUBMITTED",
            DepositStatus::Accepted => "ACCEPTED",
            DepositStatus::Pending => "PENDING",
            DepositStatus::Completed => "COMPLETED",
            DepositStatus::Failed => "FAILED",
            DepositStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "SUBMITTED" => Some(DepositStatus::Submitted),
            "ACCEPTED" => Some(DepositStatus::Accepted),
            "PENDING" => Some(DepositStatus::Pending),
            "COMPLETED" => Some(DepositStatus::Completed),
            "FAILED" => Some(DepositStatus::Failed),
            "REJECTED" => Some(DepositStatus::Rejected),
            _ => None,
        }
    }
}

/// One payment attempt. Created at initiation, mutated only by the
/// gateway's asynchronous status, terminal once completed/failed/rejected.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub deposit_id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: DepositStatus,
    /// The payment channel the deposit was routed through.
    pub correspondent: String,
    pub payer_address: String,
    /// Referral code captured at initiation, attributed on activation.
    pub referral_code: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a purchase was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquiredVia {
    MobileMoney,
    AccessCode,
    Free,
}

/// A user's entitlement to one course.
#[derive(Debug, Clone)]
pub struct Purchase {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub deposit_id: Option<Uuid>,
    pub acquired_via: AcquiredVia,
    pub created_at: DateTime<Utc>,
}

// Represents a user - used throughout the app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub is_admin: bool,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

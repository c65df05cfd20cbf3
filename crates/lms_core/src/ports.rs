//! crates/lms_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the platform's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or the
//! payment gateway.

use async_trait::async_trait;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use crate::domain::{
    AffiliateLink, Chapter, Course, CourseProgress, DepositStatus, Purchase, QuizQuestion,
    Transaction, User, UserCredentials, Video,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Payment Gateway Contract Types
//=========================================================================================

/// A deposit initiation request sent to the mobile-money gateway.
#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub deposit_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub correspondent: String,
    pub payer_address: String,
    pub statement_description: String,
    pub country: String,
}

/// The gateway's answer to a deposit initiation.
///
/// `DuplicateIgnored` means the gateway has already seen this deposit id;
/// the initiating flow must rotate to a fresh id before retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositInitOutcome {
    Accepted,
    DuplicateIgnored,
    Rejected { reason: String },
}

/// One observation of a deposit's status from the gateway's status endpoint.
#[derive(Debug, Clone)]
pub struct DepositSnapshot {
    pub deposit_id: Uuid,
    pub status: DepositStatus,
    pub failure_reason: Option<String>,
}

//=========================================================================================
// Admin Monitoring Types
//=========================================================================================

/// Aggregate counters for the admin overview.
#[derive(Debug, Clone)]
pub struct PlatformOverview {
    pub total_users: i64,
    pub total_courses: i64,
    pub total_purchases: i64,
    /// Sum of completed transaction amounts, in the smallest currency unit.
    pub completed_revenue: i64,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    // --- Auth Methods ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        display_name: Option<&str>,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Course Catalog ---
    async fn list_published_courses(&self) -> PortResult<Vec<Course>>;

    async fn get_course_by_id(&self, course_id: Uuid) -> PortResult<Course>;

    async fn get_chapters(&self, course_id: Uuid) -> PortResult<Vec<Chapter>>;

    async fn get_videos(&self, course_id: Uuid) -> PortResult<Vec<Video>>;

    async fn get_quiz_questions(&self, chapter_id: Uuid) -> PortResult<Vec<QuizQuestion>>;

    // --- Course Authoring ---
    async fn create_course(
        &self,
        course: Course,
        chapters: Vec<Chapter>,
        videos: Vec<Video>,
        questions: Vec<QuizQuestion>,
    ) -> PortResult<Course>;

    // --- Purchases ---
    /// Idempotent: inserting an existing (user, course) purchase is a no-op.
    async fn create_purchase(&self, purchase: Purchase) -> PortResult<()>;

    async fn get_purchase(&self, user_id: Uuid, course_id: Uuid) -> PortResult<Option<Purchase>>;

    // --- Transactions ---
    async fn create_transaction(&self, transaction: Transaction) -> PortResult<()>;

    async fn get_transaction(&self, deposit_id: Uuid) -> PortResult<Transaction>;

    async fn update_transaction_status(
        &self,
        deposit_id: Uuid,
        status: DepositStatus,
        failure_reason: Option<&str>,
    ) -> PortResult<()>;

    // --- Admin Monitoring ---
    async fn platform_overview(&self) -> PortResult<PlatformOverview>;

    async fn list_recent_transactions(&self, limit: i64) -> PortResult<Vec<Transaction>>;
}

/// Durable, queryable per-learner progress state.
///
/// Callers follow a whole-object read-modify-write pattern: `get`, mutate the
/// returned [`CourseProgress`] in memory, then `save`. A failed save degrades
/// the change to "this session only" and must not fail the caller's request.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, user_id: Uuid, course_id: Uuid) -> PortResult<Option<CourseProgress>>;

    async fn save(&self, progress: &CourseProgress) -> PortResult<()>;
}

/// Referral codes and their monotonic click/conversion counters.
///
/// Counter increments are atomic in the backing store; the interface
/// deliberately offers no read-modify-write on the counters.
#[async_trait]
pub trait AffiliateStore: Send + Sync {
    /// Returns the existing link for (owner, course), or persists one with
    /// the caller-minted `candidate_code`.
    async fn get_or_create_link(
        &self,
        owner_user_id: Uuid,
        course_id: Uuid,
        candidate_code: &str,
    ) -> PortResult<AffiliateLink>;

    async fn find_link(&self, code: &str) -> PortResult<Option<AffiliateLink>>;

    /// Records one click, deduplicated per (code, visitor). Returns `false`
    /// when the click was already counted for this visitor.
    async fn record_click(&self, code: &str, course_id: Uuid, visitor_id: &str)
        -> PortResult<bool>;

    async fn record_conversion(&self, code: &str, net_amount: i64) -> PortResult<()>;

    async fn links_for_owner(&self, owner_user_id: Uuid) -> PortResult<Vec<AffiliateLink>>;

    async fn top_links(&self, limit: i64) -> PortResult<Vec<AffiliateLink>>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiates a mobile-money charge. A transport failure is a `PortError`;
    /// a gateway-level duplicate or rejection is a successful call returning
    /// the corresponding [`DepositInitOutcome`].
    async fn request_deposit(&self, deposit: &NewDeposit) -> PortResult<DepositInitOutcome>;

    /// Polls the gateway's status endpoint for one deposit.
    async fn fetch_deposit(&self, deposit_id: Uuid) -> PortResult<DepositSnapshot>;
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Dispatches a purchase receipt. Fire-and-forget from the purchase
    /// flow's perspective; failures are logged by the caller, never surfaced.
    async fn send_purchase_receipt(
        &self,
        user: &User,
        course: &Course,
        transaction: &Transaction,
    ) -> PortResult<()>;
}

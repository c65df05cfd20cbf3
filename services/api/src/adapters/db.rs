//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService`, `ProgressStore` and `AffiliateStore` ports from the
//! `core` crate. It handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_core::domain::{
    AcquiredVia, AffiliateLink, Chapter, Course, CourseProgress, DepositStatus, Purchase,
    QuestionKind, QuizQuestion, Transaction, User, UserCredentials, Video,
};
use lms_core::ports::{
    AffiliateStore, DatabaseService, PlatformOverview, PortError, PortResult, ProgressStore,
};
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or(e: sqlx::Error, what: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => unexpected(e),
    }
}

//=========================================================================================
// Text Encodings for Status Enums
//=========================================================================================

fn status_from_str(status: &str) -> PortResult<DepositStatus> {
    DepositStatus::parse(status).ok_or_else(|| {
        PortError::Unexpected(format!("unknown deposit status '{}' in database", status))
    })
}

fn via_to_str(via: AcquiredVia) -> &'static str {
    match via {
        AcquiredVia::MobileMoney => "mobile_money",
        AcquiredVia::AccessCode => "access_code",
        AcquiredVia::Free => "free",
    }
}

fn via_from_str(via: &str) -> PortResult<AcquiredVia> {
    match via {
        "mobile_money" => Ok(AcquiredVia::MobileMoney),
        "access_code" => Ok(AcquiredVia::AccessCode),
        "free" => Ok(AcquiredVia::Free),
        other => Err(PortError::Unexpected(format!(
            "unknown purchase channel '{}' in database",
            other
        ))),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: Option<String>,
    display_name: Option<String>,
    is_admin: bool,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: self.email,
            display_name: self.display_name,
            is_admin: self.is_admin,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
    is_admin: bool,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
            is_admin: self.is_admin,
        }
    }
}

#[derive(FromRow)]
struct CourseRecord {
    id: Uuid,
    title: String,
    description: String,
    price_amount: i64,
    currency: String,
    access_code: Option<String>,
    published: bool,
    created_at: DateTime<Utc>,
}
impl CourseRecord {
    fn to_domain(self) -> Course {
        Course {
            id: self.id,
            title: self.title,
            description: self.description,
            price_amount: self.price_amount,
            currency: self.currency,
            access_code: self.access_code,
            published: self.published,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ChapterRecord {
    id: Uuid,
    course_id: Uuid,
    title: String,
    description: String,
    position: i32,
}
impl ChapterRecord {
    fn to_domain(self) -> Chapter {
        Chapter {
            id: self.id,
            course_id: self.course_id,
            title: self.title,
            description: self.description,
            position: self.position,
        }
    }
}

#[derive(FromRow)]
struct VideoRecord {
    id: Uuid,
    chapter_id: Uuid,
    title: String,
    position: i32,
    duration_secs: i32,
}
impl VideoRecord {
    fn to_domain(self) -> Video {
        Video {
            id: self.id,
            chapter_id: self.chapter_id,
            title: self.title,
            position: self.position,
            duration_secs: self.duration_secs,
        }
    }
}

#[derive(FromRow)]
struct QuizQuestionRecord {
    id: Uuid,
    chapter_id: Uuid,
    prompt: String,
    question_type: String,
    options: Option<Vec<String>>,
    correct_choice: Option<i32>,
    correct_bool: Option<bool>,
    points: i32,
    difficulty: Option<String>,
    explanation: Option<String>,
}
impl QuizQuestionRecord {
    fn to_domain(self) -> PortResult<QuizQuestion> {
        let kind = match self.question_type.as_str() {
            "multiple_choice" => QuestionKind::MultipleChoice {
                options: self.options.unwrap_or_default(),
                correct: self.correct_choice.ok_or_else(|| {
                    PortError::Unexpected(format!("question {} has no correct choice", self.id))
                })? as u32,
            },
            "true_false" => QuestionKind::TrueFalse {
                correct: self.correct_bool.ok_or_else(|| {
                    PortError::Unexpected(format!("question {} has no correct answer", self.id))
                })?,
            },
            other => {
                return Err(PortError::Unexpected(format!(
                    "unknown question type '{}' for question {}",
                    other, self.id
                )))
            }
        };

        Ok(QuizQuestion {
            id: self.id,
            chapter_id: self.chapter_id,
            prompt: self.prompt,
            kind,
            points: self.points,
            difficulty: self.difficulty,
            explanation: self.explanation,
        })
    }
}

fn kind_columns(kind: &QuestionKind) -> (&'static str, Option<Vec<String>>, Option<i32>, Option<bool>) {
    match kind {
        QuestionKind::MultipleChoice { options, correct } => (
            "multiple_choice",
            Some(options.clone()),
            Some(*correct as i32),
            None,
        ),
        QuestionKind::TrueFalse { correct } => ("true_false", None, None, Some(*correct)),
    }
}

#[derive(FromRow)]
struct ProgressRecord {
    user_id: Uuid,
    course_id: Uuid,
    current_chapter: i32,
    current_video: i32,
    completed_videos: Vec<Uuid>,
    completed_chapters: Vec<Uuid>,
    quiz_passed: Vec<Uuid>,
    total_time_spent_ms: i64,
    completed_at: Option<DateTime<Utc>>,
}
impl ProgressRecord {
    fn to_domain(self) -> CourseProgress {
        CourseProgress {
            course_id: self.course_id,
            user_id: self.user_id,
            current_chapter: self.current_chapter as usize,
            current_video: self.current_video as usize,
            completed_videos: self.completed_videos.into_iter().collect(),
            completed_chapters: self.completed_chapters.into_iter().collect(),
            quiz_passed: self.quiz_passed.into_iter().collect(),
            total_time_spent_ms: self.total_time_spent_ms,
            completed_at: self.completed_at,
        }
    }
}

#[derive(FromRow)]
struct PurchaseRecord {
    user_id: Uuid,
    course_id: Uuid,
    deposit_id: Option<Uuid>,
    acquired_via: String,
    created_at: DateTime<Utc>,
}
impl PurchaseRecord {
    fn to_domain(self) -> PortResult<Purchase> {
        Ok(Purchase {
            user_id: self.user_id,
            course_id: self.course_id,
            deposit_id: self.deposit_id,
            acquired_via: via_from_str(&self.acquired_via)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct TransactionRecord {
    deposit_id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    amount: i64,
    currency: String,
    status: String,
    correspondent: String,
    payer_address: String,
    referral_code: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl TransactionRecord {
    fn to_domain(self) -> PortResult<Transaction> {
        Ok(Transaction {
            deposit_id: self.deposit_id,
            user_id: self.user_id,
            course_id: self.course_id,
            amount: self.amount,
            currency: self.currency,
            status: status_from_str(&self.status)?,
            correspondent: self.correspondent,
            payer_address: self.payer_address,
            referral_code: self.referral_code,
            failure_reason: self.failure_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AffiliateLinkRecord {
    code: String,
    owner_user_id: Uuid,
    course_id: Uuid,
    clicks: i64,
    conversions: i64,
    total_earnings: i64,
}
impl AffiliateLinkRecord {
    fn to_domain(self) -> AffiliateLink {
        AffiliateLink {
            code: self.code,
            owner_user_id: self.owner_user_id,
            course_id: self.course_id,
            clicks: self.clicks,
            conversions: self.conversions,
            total_earnings: self.total_earnings,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, display_name, is_admin FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, format!("User {} not found", user_id)))?;

        Ok(record.to_domain())
    }

    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        display_name: Option<&str>,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password, display_name) \
             VALUES ($1, $2, $3, $4) \
             RETURNING user_id, email, display_name, is_admin",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password, is_admin FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, format!("User with email {} not found", email)))?;

        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row = sqlx::query(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::Unauthorized,
            _ => unexpected(e),
        })?;

        row.try_get("user_id").map_err(unexpected)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_published_courses(&self) -> PortResult<Vec<Course>> {
        let records = sqlx::query_as::<_, CourseRecord>(
            "SELECT id, title, description, price_amount, currency, access_code, published, created_at \
             FROM courses WHERE published ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_course_by_id(&self, course_id: Uuid) -> PortResult<Course> {
        let record = sqlx::query_as::<_, CourseRecord>(
            "SELECT id, title, description, price_amount, currency, access_code, published, created_at \
             FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, format!("Course {} not found", course_id)))?;

        Ok(record.to_domain())
    }

    async fn get_chapters(&self, course_id: Uuid) -> PortResult<Vec<Chapter>> {
        let records = sqlx::query_as::<_, ChapterRecord>(
            "SELECT id, course_id, title, description, position \
             FROM chapters WHERE course_id = $1 ORDER BY position ASC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_videos(&self, course_id: Uuid) -> PortResult<Vec<Video>> {
        let records = sqlx::query_as::<_, VideoRecord>(
            "SELECT v.id, v.chapter_id, v.title, v.position, v.duration_secs \
             FROM videos v JOIN chapters c ON c.id = v.chapter_id \
             WHERE c.course_id = $1 ORDER BY c.position ASC, v.position ASC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_quiz_questions(&self, chapter_id: Uuid) -> PortResult<Vec<QuizQuestion>> {
        let records = sqlx::query_as::<_, QuizQuestionRecord>(
            "SELECT id, chapter_id, prompt, question_type, options, correct_choice, correct_bool, \
                    points, difficulty, explanation \
             FROM quiz_questions WHERE chapter_id = $1 ORDER BY id ASC",
        )
        .bind(chapter_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn create_course(
        &self,
        course: Course,
        chapters: Vec<Chapter>,
        videos: Vec<Video>,
        questions: Vec<QuizQuestion>,
    ) -> PortResult<Course> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO courses (id, title, description, price_amount, currency, access_code, published) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(course.id)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.price_amount)
        .bind(&course.currency)
        .bind(&course.access_code)
        .bind(course.published)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        for chapter in &chapters {
            sqlx::query(
                "INSERT INTO chapters (id, course_id, title, description, position) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(chapter.id)
            .bind(chapter.course_id)
            .bind(&chapter.title)
            .bind(&chapter.description)
            .bind(chapter.position)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        for video in &videos {
            sqlx::query(
                "INSERT INTO videos (id, chapter_id, title, position, duration_secs) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(video.id)
            .bind(video.chapter_id)
            .bind(&video.title)
            .bind(video.position)
            .bind(video.duration_secs)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        for question in &questions {
            let (question_type, options, correct_choice, correct_bool) =
                kind_columns(&question.kind);
            sqlx::query(
                "INSERT INTO quiz_questions \
                 (id, chapter_id, prompt, question_type, options, correct_choice, correct_bool, \
                  points, difficulty, explanation) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(question.id)
            .bind(question.chapter_id)
            .bind(&question.prompt)
            .bind(question_type)
            .bind(options)
            .bind(correct_choice)
            .bind(correct_bool)
            .bind(question.points)
            .bind(&question.difficulty)
            .bind(&question.explanation)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;

        self.get_course_by_id(course.id).await
    }

    async fn create_purchase(&self, purchase: Purchase) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO purchases (user_id, course_id, deposit_id, acquired_via) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, course_id) DO NOTHING",
        )
        .bind(purchase.user_id)
        .bind(purchase.course_id)
        .bind(purchase.deposit_id)
        .bind(via_to_str(purchase.acquired_via))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_purchase(&self, user_id: Uuid, course_id: Uuid) -> PortResult<Option<Purchase>> {
        let record = sqlx::query_as::<_, PurchaseRecord>(
            "SELECT user_id, course_id, deposit_id, acquired_via, created_at \
             FROM purchases WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        record.map(|r| r.to_domain()).transpose()
    }

    async fn create_transaction(&self, transaction: Transaction) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO transactions \
             (deposit_id, user_id, course_id, amount, currency, status, correspondent, \
              payer_address, referral_code, failure_reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(transaction.deposit_id)
        .bind(transaction.user_id)
        .bind(transaction.course_id)
        .bind(transaction.amount)
        .bind(&transaction.currency)
        .bind(transaction.status.as_str())
        .bind(&transaction.correspondent)
        .bind(&transaction.payer_address)
        .bind(&transaction.referral_code)
        .bind(&transaction.failure_reason)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_transaction(&self, deposit_id: Uuid) -> PortResult<Transaction> {
        let record = sqlx::query_as::<_, TransactionRecord>(
            "SELECT deposit_id, user_id, course_id, amount, currency, status, correspondent, \
                    payer_address, referral_code, failure_reason, created_at, updated_at \
             FROM transactions WHERE deposit_id = $1",
        )
        .bind(deposit_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, format!("Transaction {} not found", deposit_id)))?;

        record.to_domain()
    }

    async fn update_transaction_status(
        &self,
        deposit_id: Uuid,
        status: DepositStatus,
        failure_reason: Option<&str>,
    ) -> PortResult<()> {
        // A terminal row never moves again; late poll responses are dropped here.
        sqlx::query(
            "UPDATE transactions \
             SET status = $1, failure_reason = COALESCE($2, failure_reason), updated_at = NOW() \
             WHERE deposit_id = $3 AND status NOT IN ('COMPLETED', 'FAILED', 'REJECTED')",
        )
        .bind(status.as_str())
        .bind(failure_reason)
        .bind(deposit_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn platform_overview(&self) -> PortResult<PlatformOverview> {
        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        let total_courses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        let total_purchases: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchases")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        let completed_revenue: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE status = 'COMPLETED'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(PlatformOverview {
            total_users,
            total_courses,
            total_purchases,
            completed_revenue,
        })
    }

    async fn list_recent_transactions(&self, limit: i64) -> PortResult<Vec<Transaction>> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            "SELECT deposit_id, user_id, course_id, amount, currency, status, correspondent, \
                    payer_address, referral_code, failure_reason, created_at, updated_at \
             FROM transactions ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }
}

//=========================================================================================
// `ProgressStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProgressStore for DbAdapter {
    async fn get(&self, user_id: Uuid, course_id: Uuid) -> PortResult<Option<CourseProgress>> {
        let record = sqlx::query_as::<_, ProgressRecord>(
            "SELECT user_id, course_id, current_chapter, current_video, completed_videos, \
                    completed_chapters, quiz_passed, total_time_spent_ms, completed_at \
             FROM course_progress WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(|r| r.to_domain()))
    }

    async fn save(&self, progress: &CourseProgress) -> PortResult<()> {
        // Whole-object upsert, matching the read-modify-write contract.
        let completed_videos: Vec<Uuid> = progress.completed_videos.iter().copied().collect();
        let completed_chapters: Vec<Uuid> = progress.completed_chapters.iter().copied().collect();
        let quiz_passed: Vec<Uuid> = progress.quiz_passed.iter().copied().collect();

        sqlx::query(
            "INSERT INTO course_progress \
             (user_id, course_id, current_chapter, current_video, completed_videos, \
              completed_chapters, quiz_passed, total_time_spent_ms, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (user_id, course_id) DO UPDATE SET \
                current_chapter = EXCLUDED.current_chapter, \
                current_video = EXCLUDED.current_video, \
                completed_videos = EXCLUDED.completed_videos, \
                completed_chapters = EXCLUDED.completed_chapters, \
                quiz_passed = EXCLUDED.quiz_passed, \
                total_time_spent_ms = EXCLUDED.total_time_spent_ms, \
                completed_at = EXCLUDED.completed_at",
        )
        .bind(progress.user_id)
        .bind(progress.course_id)
        .bind(progress.current_chapter as i32)
        .bind(progress.current_video as i32)
        .bind(completed_videos)
        .bind(completed_chapters)
        .bind(quiz_passed)
        .bind(progress.total_time_spent_ms)
        .bind(progress.completed_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `AffiliateStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AffiliateStore for DbAdapter {
    async fn get_or_create_link(
        &self,
        owner_user_id: Uuid,
        course_id: Uuid,
        candidate_code: &str,
    ) -> PortResult<AffiliateLink> {
        sqlx::query(
            "INSERT INTO affiliate_links (code, owner_user_id, course_id) VALUES ($1, $2, $3) \
             ON CONFLICT (owner_user_id, course_id) DO NOTHING",
        )
        .bind(candidate_code)
        .bind(owner_user_id)
        .bind(course_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        let record = sqlx::query_as::<_, AffiliateLinkRecord>(
            "SELECT code, owner_user_id, course_id, clicks, conversions, total_earnings \
             FROM affiliate_links WHERE owner_user_id = $1 AND course_id = $2",
        )
        .bind(owner_user_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.to_domain())
    }

    async fn find_link(&self, code: &str) -> PortResult<Option<AffiliateLink>> {
        let record = sqlx::query_as::<_, AffiliateLinkRecord>(
            "SELECT code, owner_user_id, course_id, clicks, conversions, total_earnings \
             FROM affiliate_links WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(|r| r.to_domain()))
    }

    async fn record_click(
        &self,
        code: &str,
        course_id: Uuid,
        visitor_id: &str,
    ) -> PortResult<bool> {
        // One counted click per (code, visitor); replays hit the conflict arm.
        let inserted = sqlx::query(
            "INSERT INTO affiliate_clicks (code, course_id, visitor_id) VALUES ($1, $2, $3) \
             ON CONFLICT (code, visitor_id) DO NOTHING",
        )
        .bind(code)
        .bind(course_id)
        .bind(visitor_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?
        .rows_affected();

        if inserted == 0 {
            return Ok(false);
        }

        // Atomic increment; no read-modify-write on the counter.
        sqlx::query("UPDATE affiliate_links SET clicks = clicks + 1 WHERE code = $1")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(true)
    }

    async fn record_conversion(&self, code: &str, net_amount: i64) -> PortResult<()> {
        sqlx::query(
            "UPDATE affiliate_links \
             SET conversions = conversions + 1, total_earnings = total_earnings + $1 \
             WHERE code = $2",
        )
        .bind(net_amount)
        .bind(code)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn links_for_owner(&self, owner_user_id: Uuid) -> PortResult<Vec<AffiliateLink>> {
        let records = sqlx::query_as::<_, AffiliateLinkRecord>(
            "SELECT code, owner_user_id, course_id, clicks, conversions, total_earnings \
             FROM affiliate_links WHERE owner_user_id = $1 ORDER BY total_earnings DESC",
        )
        .bind(owner_user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn top_links(&self, limit: i64) -> PortResult<Vec<AffiliateLink>> {
        let records = sqlx::query_as::<_, AffiliateLinkRecord>(
            "SELECT code, owner_user_id, course_id, clicks, conversions, total_earnings \
             FROM affiliate_links ORDER BY total_earnings DESC, clicks DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

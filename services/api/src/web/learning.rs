//! services/api/src/web/learning.rs
//!
//! The learning hub: progress tracking, the chapter access gate, course
//! completion, and the quiz session endpoints.
//!
//! Progress follows a whole-object read-modify-write through the
//! `ProgressStore` port. A failed save is logged and the request still
//! answers with the mutated state, so a storage hiccup degrades to "this
//! session only" instead of failing the learner's action.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use lms_core::domain::{CourseProgress, QuizAnswer};
use lms_core::progress::{accessible_chapters, chapter_accessible, evaluate_completion, stamp_completion};
use lms_core::quiz::{QuizError, QuizOutcome, QuizPhase, QuizSession};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::courses::QuestionView;
use crate::web::state::AppState;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ProgressResponse {
    pub course_id: Uuid,
    pub current_chapter: usize,
    pub current_video: usize,
    pub completed_videos: Vec<Uuid>,
    pub completed_chapters: Vec<Uuid>,
    pub quiz_passed: Vec<Uuid>,
    pub total_time_spent_ms: i64,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProgressResponse {
    fn from_domain(progress: &CourseProgress) -> Self {
        let mut completed_videos: Vec<Uuid> = progress.completed_videos.iter().copied().collect();
        let mut completed_chapters: Vec<Uuid> =
            progress.completed_chapters.iter().copied().collect();
        let mut quiz_passed: Vec<Uuid> = progress.quiz_passed.iter().copied().collect();
        completed_videos.sort();
        completed_chapters.sort();
        quiz_passed.sort();

        Self {
            course_id: progress.course_id,
            current_chapter: progress.current_chapter,
            current_video: progress.current_video,
            completed_videos,
            completed_chapters,
            quiz_passed,
            total_time_spent_ms: progress.total_time_spent_ms,
            completed_at: progress.completed_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct PositionRequest {
    pub chapter_index: usize,
    pub video_index: usize,
}

#[derive(Deserialize, ToSchema)]
pub struct WatchTimeRequest {
    pub delta_ms: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ChapterAccessView {
    pub chapter_id: Uuid,
    pub position: usize,
    pub accessible: bool,
    pub completed: bool,
}

#[derive(Serialize, ToSchema)]
pub struct CompletionResponse {
    pub is_completed: bool,
    pub completed_chapters: usize,
    pub total_chapters: usize,
    pub final_score: u32,
    pub completed_at: Option<DateTime<Utc>>,
    /// True only on the request that first observed completion.
    pub newly_completed: bool,
}

#[derive(Serialize, ToSchema)]
pub struct QuizStartResponse {
    pub chapter_id: Uuid,
    pub questions: Vec<QuestionView>,
    pub deadline: DateTime<Utc>,
    pub remaining_secs: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct QuizAnswerRequest {
    pub question_id: Uuid,
    pub selected: Option<u32>,
    pub value: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct QuizResultResponse {
    pub phase: String,
    pub score: Option<f64>,
    pub passed: Option<bool>,
    pub remaining_secs: i64,
}

fn phase_name(phase: QuizPhase) -> &'static str {
    match phase {
        QuizPhase::InProgress => "in_progress",
        QuizPhase::Passed => "passed",
        QuizPhase::Failed => "failed",
    }
}

//=========================================================================================
// Shared Helpers
//=========================================================================================

async fn require_purchase(
    state: &Arc<AppState>,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<(), (StatusCode, String)> {
    let purchase = state.db.get_purchase(user_id, course_id).await.map_err(|e| {
        error!("Failed to check purchase: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to check course access".to_string())
    })?;

    if purchase.is_none() {
        return Err((
            StatusCode::FORBIDDEN,
            "This course has not been purchased".to_string(),
        ));
    }
    Ok(())
}

/// Fetches the learner's progress, creating the initial record on the first
/// course visit.
async fn load_progress(
    state: &Arc<AppState>,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<CourseProgress, (StatusCode, String)> {
    match state.progress.get(user_id, course_id).await {
        Ok(Some(progress)) => Ok(progress),
        Ok(None) => Ok(CourseProgress::new(user_id, course_id)),
        Err(e) => {
            error!("Failed to load progress: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load progress".to_string(),
            ))
        }
    }
}

/// Best-effort persistence: a failed write keeps the in-memory state for
/// this response and logs the loss.
async fn save_progress(state: &Arc<AppState>, progress: &CourseProgress) {
    if let Err(e) = state.progress.save(progress).await {
        warn!(
            course_id = %progress.course_id,
            user_id = %progress.user_id,
            "Failed to persist progress; the change will not survive this session: {:?}", e
        );
    }
}

//=========================================================================================
// Progress Handlers
//=========================================================================================

/// Fetch the learner's progress in a course, creating it on first visit.
#[utoipa::path(
    get,
    path = "/courses/{course_id}/progress",
    responses(
        (status = 200, description = "The learner's progress", body = ProgressResponse),
        (status = 403, description = "Course not purchased")
    ),
    params(("course_id" = Uuid, Path, description = "The course."))
)]
pub async fn get_progress_handler(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_purchase(&state, user_id, course_id).await?;
    let progress = load_progress(&state, user_id, course_id).await?;
    save_progress(&state, &progress).await;
    Ok(Json(ProgressResponse::from_domain(&progress)))
}

/// Idempotently mark a video as watched.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/progress/videos/{video_id}/complete",
    responses(
        (status = 200, description = "Updated progress", body = ProgressResponse),
        (status = 404, description = "Video is not part of this course")
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course."),
        ("video_id" = Uuid, Path, description = "The video watched to completion.")
    )
)]
pub async fn complete_video_handler(
    State(state): State<Arc<AppState>>,
    Path((course_id, video_id)): Path<(Uuid, Uuid)>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_purchase(&state, user_id, course_id).await?;

    let videos = state.db.get_videos(course_id).await.map_err(|e| {
        error!("Failed to load videos: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update progress".to_string())
    })?;
    if !videos.iter().any(|v| v.id == video_id) {
        return Err((
            StatusCode::NOT_FOUND,
            "Video is not part of this course".to_string(),
        ));
    }

    let mut progress = load_progress(&state, user_id, course_id).await?;
    progress.mark_video_complete(video_id);
    save_progress(&state, &progress).await;

    Ok(Json(ProgressResponse::from_domain(&progress)))
}

/// Overwrite the learner's last viewed position.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/progress/position",
    request_body = PositionRequest,
    responses(
        (status = 200, description = "Updated progress", body = ProgressResponse)
    ),
    params(("course_id" = Uuid, Path, description = "The course."))
)]
pub async fn update_position_handler(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<PositionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_purchase(&state, user_id, course_id).await?;

    let mut progress = load_progress(&state, user_id, course_id).await?;
    progress.update_position(req.chapter_index, req.video_index);
    save_progress(&state, &progress).await;

    Ok(Json(ProgressResponse::from_domain(&progress)))
}

/// Add watched milliseconds to the course total.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/progress/watch-time",
    request_body = WatchTimeRequest,
    responses(
        (status = 200, description = "Updated progress", body = ProgressResponse)
    ),
    params(("course_id" = Uuid, Path, description = "The course."))
)]
pub async fn add_watch_time_handler(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<WatchTimeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_purchase(&state, user_id, course_id).await?;

    let mut progress = load_progress(&state, user_id, course_id).await?;
    progress.add_watch_time(req.delta_ms);
    save_progress(&state, &progress).await;

    Ok(Json(ProgressResponse::from_domain(&progress)))
}

/// Replace the learner's progress with a fresh initial state.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/progress/reset",
    responses(
        (status = 200, description = "Progress after the reset", body = ProgressResponse)
    ),
    params(("course_id" = Uuid, Path, description = "The course."))
)]
pub async fn reset_progress_handler(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_purchase(&state, user_id, course_id).await?;

    let mut progress = load_progress(&state, user_id, course_id).await?;
    progress.reset();
    save_progress(&state, &progress).await;

    Ok(Json(ProgressResponse::from_domain(&progress)))
}

/// Per-chapter accessibility under the gating rule.
#[utoipa::path(
    get,
    path = "/courses/{course_id}/access",
    responses(
        (status = 200, description = "Chapter accessibility in course order", body = [ChapterAccessView])
    ),
    params(("course_id" = Uuid, Path, description = "The course."))
)]
pub async fn chapter_access_handler(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_purchase(&state, user_id, course_id).await?;

    let chapters = state.db.get_chapters(course_id).await.map_err(|e| {
        error!("Failed to load chapters: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load chapters".to_string())
    })?;
    let progress = load_progress(&state, user_id, course_id).await?;

    let access: Vec<ChapterAccessView> = accessible_chapters(&progress, &chapters)
        .into_iter()
        .map(|a| ChapterAccessView {
            chapter_id: a.chapter_id,
            position: a.position,
            accessible: a.accessible,
            completed: a.completed,
        })
        .collect();

    Ok(Json(access))
}

/// Derive the course completion state. The first request that observes a
/// fully-completed course stamps the durable completion instant and reports
/// the edge through `newly_completed`.
#[utoipa::path(
    get,
    path = "/courses/{course_id}/completion",
    responses(
        (status = 200, description = "The derived completion state", body = CompletionResponse)
    ),
    params(("course_id" = Uuid, Path, description = "The course."))
)]
pub async fn completion_handler(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_purchase(&state, user_id, course_id).await?;

    let chapters = state.db.get_chapters(course_id).await.map_err(|e| {
        error!("Failed to load chapters: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load chapters".to_string())
    })?;
    let mut progress = load_progress(&state, user_id, course_id).await?;

    let newly_completed = stamp_completion(&mut progress, &chapters, Utc::now());
    if newly_completed {
        save_progress(&state, &progress).await;
    }

    let completion = evaluate_completion(&progress, &chapters);
    Ok(Json(CompletionResponse {
        is_completed: completion.is_completed,
        completed_chapters: completion.completed_chapters,
        total_chapters: completion.total_chapters,
        final_score: completion.final_score,
        completed_at: completion.completed_at,
        newly_completed,
    }))
}

//=========================================================================================
// Quiz Handlers
//=========================================================================================

/// Start (or restart) a chapter's quiz. The chapter must be accessible under
/// the gating rule.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/chapters/{chapter_id}/quiz/start",
    responses(
        (status = 200, description = "The running quiz session", body = QuizStartResponse),
        (status = 403, description = "Chapter is locked"),
        (status = 404, description = "Chapter not found or has no quiz")
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course."),
        ("chapter_id" = Uuid, Path, description = "The chapter whose quiz to start.")
    )
)]
pub async fn start_quiz_handler(
    State(state): State<Arc<AppState>>,
    Path((course_id, chapter_id)): Path<(Uuid, Uuid)>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_purchase(&state, user_id, course_id).await?;

    let chapters = state.db.get_chapters(course_id).await.map_err(|e| {
        error!("Failed to load chapters: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start quiz".to_string())
    })?;
    let chapter_index = chapters
        .iter()
        .position(|c| c.id == chapter_id)
        .ok_or((StatusCode::NOT_FOUND, "Chapter not found".to_string()))?;

    let progress = load_progress(&state, user_id, course_id).await?;
    if !chapter_accessible(&progress, &chapters, chapter_index) {
        return Err((
            StatusCode::FORBIDDEN,
            "Pass the previous chapter's quiz to unlock this one".to_string(),
        ));
    }

    let questions = state.db.get_quiz_questions(chapter_id).await.map_err(|e| {
        error!("Failed to load quiz questions: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start quiz".to_string())
    })?;

    let now = Utc::now();
    let question_views: Vec<QuestionView> = questions.iter().map(QuestionView::from_domain).collect();
    let session = QuizSession::new(chapter_id, questions, now)
        .map_err(|_| (StatusCode::NOT_FOUND, "This chapter has no quiz".to_string()))?;

    let response = QuizStartResponse {
        chapter_id,
        questions: question_views,
        deadline: session.deadline(),
        remaining_secs: session.remaining_secs(now),
    };
    state.quizzes.insert((user_id, chapter_id), session);

    Ok(Json(response))
}

/// Record (or overwrite) one answer in the running quiz. Past the deadline
/// the session auto-submits with the answers recorded before it.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/chapters/{chapter_id}/quiz/answers",
    request_body = QuizAnswerRequest,
    responses(
        (status = 200, description = "Session state after the answer", body = QuizResultResponse),
        (status = 404, description = "No running quiz session"),
        (status = 400, description = "Malformed answer")
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course."),
        ("chapter_id" = Uuid, Path, description = "The chapter being quizzed.")
    )
)]
pub async fn answer_quiz_handler(
    State(state): State<Arc<AppState>>,
    Path((course_id, chapter_id)): Path<(Uuid, Uuid)>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<QuizAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let answer = match (req.selected, req.value) {
        (Some(selected), None) => QuizAnswer::Choice { selected },
        (None, Some(value)) => QuizAnswer::Bool { value },
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "Provide exactly one of 'selected' or 'value'".to_string(),
            ))
        }
    };

    let now = Utc::now();
    let (result, outcome_to_apply) = {
        let mut session = state
            .quizzes
            .get_mut(&(user_id, chapter_id))
            .ok_or((StatusCode::NOT_FOUND, "No running quiz session".to_string()))?;

        match session.record_answer(now, req.question_id, answer) {
            Ok(()) => (
                QuizResultResponse {
                    phase: phase_name(session.phase()).to_string(),
                    score: None,
                    passed: None,
                    remaining_secs: session.remaining_secs(now),
                },
                None,
            ),
            Err(QuizError::TimeExpired) => {
                let outcome = session.outcome().cloned();
                (
                    QuizResultResponse {
                        phase: phase_name(session.phase()).to_string(),
                        score: outcome.as_ref().map(|o| o.score),
                        passed: outcome.as_ref().map(|o| o.passed),
                        remaining_secs: 0,
                    },
                    outcome,
                )
            }
            Err(QuizError::UnknownQuestion(id)) => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("Question {} is not part of this quiz", id),
                ))
            }
            Err(e) => return Err((StatusCode::BAD_REQUEST, e.to_string())),
        }
    };

    if let Some(outcome) = outcome_to_apply {
        apply_quiz_outcome(&state, user_id, course_id, chapter_id, &outcome).await;
    }

    Ok(Json(result))
}

/// Submit the quiz, scoring the recorded answers.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/chapters/{chapter_id}/quiz/submit",
    responses(
        (status = 200, description = "The scored result", body = QuizResultResponse),
        (status = 404, description = "No running quiz session"),
        (status = 400, description = "Already submitted")
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course."),
        ("chapter_id" = Uuid, Path, description = "The chapter being quizzed.")
    )
)]
pub async fn submit_quiz_handler(
    State(state): State<Arc<AppState>>,
    Path((course_id, chapter_id)): Path<(Uuid, Uuid)>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let now = Utc::now();
    let outcome = {
        let mut session = state
            .quizzes
            .get_mut(&(user_id, chapter_id))
            .ok_or((StatusCode::NOT_FOUND, "No running quiz session".to_string()))?;
        session
            .submit(now)
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    };

    apply_quiz_outcome(&state, user_id, course_id, chapter_id, &outcome).await;

    Ok(Json(QuizResultResponse {
        phase: if outcome.passed { "passed" } else { "failed" }.to_string(),
        score: Some(outcome.score),
        passed: Some(outcome.passed),
        remaining_secs: 0,
    }))
}

/// Retry a failed quiz: answers cleared, countdown restarted.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/chapters/{chapter_id}/quiz/retry",
    responses(
        (status = 200, description = "The reset session", body = QuizResultResponse),
        (status = 404, description = "No quiz session"),
        (status = 400, description = "Retry is only available after a failed submission")
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course."),
        ("chapter_id" = Uuid, Path, description = "The chapter being quizzed.")
    )
)]
pub async fn retry_quiz_handler(
    State(state): State<Arc<AppState>>,
    Path((_course_id, chapter_id)): Path<(Uuid, Uuid)>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let now = Utc::now();
    let remaining = {
        let mut session = state
            .quizzes
            .get_mut(&(user_id, chapter_id))
            .ok_or((StatusCode::NOT_FOUND, "No quiz session".to_string()))?;
        session
            .retry(now)
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        session.remaining_secs(now)
    };

    Ok(Json(QuizResultResponse {
        phase: "in_progress".to_string(),
        score: None,
        passed: None,
        remaining_secs: remaining,
    }))
}

/// After a pass, records the quiz pass (and with it the chapter completion)
/// on the learner's progress. Failures never un-record anything.
async fn apply_quiz_outcome(
    state: &Arc<AppState>,
    user_id: Uuid,
    course_id: Uuid,
    chapter_id: Uuid,
    outcome: &QuizOutcome,
) {
    if !outcome.passed {
        return;
    }

    match load_progress(state, user_id, course_id).await {
        Ok(mut progress) => {
            progress.record_quiz_pass(chapter_id);
            save_progress(state, &progress).await;
        }
        Err(_) => {
            warn!(
                %course_id, %chapter_id,
                "Quiz passed but progress could not be loaded; the pass was not recorded"
            );
        }
    }
}

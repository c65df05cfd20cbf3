//! services/api/src/web/courses.rs
//!
//! Course catalog handlers: listing, detail, free/access-code claims, and the
//! admin authoring endpoint. Course detail never exposes correct quiz answers;
//! scoring is server-side.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use lms_core::domain::{
    AcquiredVia, Chapter, Course, Purchase, QuestionKind, QuizQuestion, Video,
};
use lms_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price_amount: i64,
    pub currency: String,
}

impl CourseSummary {
    fn from_domain(course: &Course) -> Self {
        Self {
            id: course.id,
            title: course.title.clone(),
            description: course.description.clone(),
            price_amount: course.price_amount,
            currency: course.currency.clone(),
        }
    }
}

/// A quiz question as shown to learners: the correct answer is stripped.
#[derive(Serialize, ToSchema)]
pub struct QuestionView {
    pub id: Uuid,
    pub prompt: String,
    pub question_type: String,
    pub options: Option<Vec<String>>,
    pub points: i32,
    pub difficulty: Option<String>,
}

impl QuestionView {
    pub fn from_domain(question: &QuizQuestion) -> Self {
        let (question_type, options) = match &question.kind {
            QuestionKind::MultipleChoice { options, .. } => {
                ("multiple_choice", Some(options.clone()))
            }
            QuestionKind::TrueFalse { .. } => ("true_false", None),
        };
        Self {
            id: question.id,
            prompt: question.prompt.clone(),
            question_type: question_type.to_string(),
            options,
            points: question.points,
            difficulty: question.difficulty.clone(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct VideoView {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
    pub duration_secs: i32,
}

#[derive(Serialize, ToSchema)]
pub struct ChapterDetail {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub position: i32,
    pub videos: Vec<VideoView>,
    pub questions: Vec<QuestionView>,
}

#[derive(Serialize, ToSchema)]
pub struct CourseDetail {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price_amount: i64,
    pub currency: String,
    pub chapters: Vec<ChapterDetail>,
}

#[derive(Deserialize, ToSchema)]
pub struct ClaimRequest {
    pub access_code: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ClaimResponse {
    pub course_id: Uuid,
    pub acquired_via: String,
}

//=========================================================================================
// Catalog Handlers
//=========================================================================================

/// List all published courses.
#[utoipa::path(
    get,
    path = "/courses",
    responses(
        (status = 200, description = "The published course catalog", body = [CourseSummary]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_courses_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let courses = state.db.list_published_courses().await.map_err(|e| {
        error!("Failed to list courses: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list courses".to_string())
    })?;

    let summaries: Vec<CourseSummary> = courses.iter().map(CourseSummary::from_domain).collect();
    Ok(Json(summaries))
}

/// Fetch one course with its chapters, videos, and (answer-stripped) quiz
/// questions.
#[utoipa::path(
    get,
    path = "/courses/{course_id}",
    responses(
        (status = 200, description = "The course detail", body = CourseDetail),
        (status = 404, description = "Course not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course to fetch.")
    )
)]
pub async fn get_course_handler(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let course = fetch_course(&state, course_id).await?;
    if !course.published {
        return Err((StatusCode::NOT_FOUND, "Course not found".to_string()));
    }

    let chapters = state.db.get_chapters(course_id).await.map_err(|e| {
        error!("Failed to load chapters: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load course".to_string())
    })?;
    let videos = state.db.get_videos(course_id).await.map_err(|e| {
        error!("Failed to load videos: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load course".to_string())
    })?;

    let mut chapter_details = Vec::with_capacity(chapters.len());
    for chapter in &chapters {
        let questions = state.db.get_quiz_questions(chapter.id).await.map_err(|e| {
            error!("Failed to load quiz questions: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load course".to_string())
        })?;

        chapter_details.push(ChapterDetail {
            id: chapter.id,
            title: chapter.title.clone(),
            description: chapter.description.clone(),
            position: chapter.position,
            videos: videos
                .iter()
                .filter(|v| v.chapter_id == chapter.id)
                .map(|v| VideoView {
                    id: v.id,
                    title: v.title.clone(),
                    position: v.position,
                    duration_secs: v.duration_secs,
                })
                .collect(),
            questions: questions.iter().map(QuestionView::from_domain).collect(),
        });
    }

    Ok(Json(CourseDetail {
        id: course.id,
        title: course.title,
        description: course.description,
        price_amount: course.price_amount,
        currency: course.currency,
        chapters: chapter_details,
    }))
}

/// Claim a free course, or redeem an access code for a paid one.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/claim",
    request_body = ClaimRequest,
    responses(
        (status = 200, description = "Course claimed", body = ClaimResponse),
        (status = 400, description = "Invalid access code"),
        (status = 404, description = "Course not found")
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course to claim.")
    )
)]
pub async fn claim_course_handler(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ClaimRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let course = fetch_course(&state, course_id).await?;

    let acquired_via = if course.price_amount == 0 {
        AcquiredVia::Free
    } else {
        let supplied = req.access_code.as_deref().unwrap_or_default();
        let matches = course
            .access_code
            .as_deref()
            .map(|expected| !expected.is_empty() && expected == supplied)
            .unwrap_or(false);
        if !matches {
            return Err((StatusCode::BAD_REQUEST, "Invalid access code".to_string()));
        }
        AcquiredVia::AccessCode
    };

    state
        .db
        .create_purchase(Purchase {
            user_id,
            course_id,
            deposit_id: None,
            acquired_via,
            created_at: Utc::now(),
        })
        .await
        .map_err(|e| {
            error!("Failed to record claim: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to claim course".to_string())
        })?;

    Ok(Json(ClaimResponse {
        course_id,
        acquired_via: match acquired_via {
            AcquiredVia::Free => "free".to_string(),
            _ => "access_code".to_string(),
        },
    }))
}

pub(crate) async fn fetch_course(
    state: &Arc<AppState>,
    course_id: Uuid,
) -> Result<Course, (StatusCode, String)> {
    state.db.get_course_by_id(course_id).await.map_err(|e| match e {
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, "Course not found".to_string()),
        other => {
            error!("Failed to load course: {:?}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load course".to_string())
        }
    })
}

//=========================================================================================
// Admin Authoring
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct NewQuestionRequest {
    pub prompt: String,
    pub question_type: String,
    pub options: Option<Vec<String>>,
    pub correct_choice: Option<u32>,
    pub correct_bool: Option<bool>,
    pub points: Option<i32>,
    pub difficulty: Option<String>,
    pub explanation: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct NewVideoRequest {
    pub title: String,
    pub duration_secs: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct NewChapterRequest {
    pub title: String,
    pub description: Option<String>,
    pub videos: Vec<NewVideoRequest>,
    pub questions: Vec<NewQuestionRequest>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: Option<String>,
    pub price_amount: i64,
    pub currency: String,
    pub access_code: Option<String>,
    pub published: bool,
    pub chapters: Vec<NewChapterRequest>,
}

#[derive(Serialize, ToSchema)]
pub struct CreateCourseResponse {
    pub course_id: Uuid,
    pub chapter_count: usize,
}

/// Create a full course document: course, chapters, videos, quiz questions.
#[utoipa::path(
    post,
    path = "/admin/courses",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Course created", body = CreateCourseResponse),
        (status = 400, description = "Invalid course document"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_course_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.title.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Course title is required".to_string()));
    }

    let course_id = Uuid::new_v4();
    let course = Course {
        id: course_id,
        title: req.title,
        description: req.description.unwrap_or_default(),
        price_amount: req.price_amount,
        currency: req.currency,
        access_code: req.access_code,
        published: req.published,
        created_at: Utc::now(),
    };

    let mut chapters = Vec::new();
    let mut videos = Vec::new();
    let mut questions = Vec::new();

    for (chapter_index, chapter_req) in req.chapters.into_iter().enumerate() {
        let chapter_id = Uuid::new_v4();
        chapters.push(Chapter {
            id: chapter_id,
            course_id,
            title: chapter_req.title,
            description: chapter_req.description.unwrap_or_default(),
            position: chapter_index as i32,
        });

        for (video_index, video_req) in chapter_req.videos.into_iter().enumerate() {
            videos.push(Video {
                id: Uuid::new_v4(),
                chapter_id,
                title: video_req.title,
                position: video_index as i32,
                duration_secs: video_req.duration_secs,
            });
        }

        for question_req in chapter_req.questions {
            let kind = match question_req.question_type.as_str() {
                "multiple_choice" => {
                    let options = question_req.options.unwrap_or_default();
                    let correct = question_req.correct_choice.ok_or_else(|| {
                        (
                            StatusCode::BAD_REQUEST,
                            "A multiple-choice question needs a correct choice".to_string(),
                        )
                    })?;
                    if options.is_empty() || (correct as usize) >= options.len() {
                        return Err((
                            StatusCode::BAD_REQUEST,
                            "The correct choice must index into the options".to_string(),
                        ));
                    }
                    QuestionKind::MultipleChoice { options, correct }
                }
                "true_false" => QuestionKind::TrueFalse {
                    correct: question_req.correct_bool.ok_or_else(|| {
                        (
                            StatusCode::BAD_REQUEST,
                            "A true/false question needs a correct answer".to_string(),
                        )
                    })?,
                },
                other => {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        format!("Unknown question type '{}'", other),
                    ))
                }
            };

            questions.push(QuizQuestion {
                id: Uuid::new_v4(),
                chapter_id,
                prompt: question_req.prompt,
                kind,
                points: question_req.points.unwrap_or(1),
                difficulty: question_req.difficulty,
                explanation: question_req.explanation,
            });
        }
    }

    let chapter_count = chapters.len();
    let created = state
        .db
        .create_course(course, chapters, videos, questions)
        .await
        .map_err(|e| {
            error!("Failed to create course: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create course".to_string())
        })?;

    Ok((
        StatusCode::CREATED,
        Json(CreateCourseResponse {
            course_id: created.id,
            chapter_count,
        }),
    ))
}

//! services/api/src/web/rest.rs
//!
//! Contains the health endpoint and the master definition for the OpenAPI
//! specification.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::web::{admin, affiliate, auth, checkout, courses, learning};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        courses::list_courses_handler,
        courses::get_course_handler,
        courses::claim_course_handler,
        courses::create_course_handler,
        learning::get_progress_handler,
        learning::complete_video_handler,
        learning::update_position_handler,
        learning::add_watch_time_handler,
        learning::reset_progress_handler,
        learning::chapter_access_handler,
        learning::completion_handler,
        learning::start_quiz_handler,
        learning::answer_quiz_handler,
        learning::submit_quiz_handler,
        learning::retry_quiz_handler,
        affiliate::create_affiliate_link_handler,
        affiliate::list_affiliate_links_handler,
        affiliate::track_click_handler,
        checkout::checkout_handler,
        checkout::transaction_status_handler,
        checkout::refresh_transaction_handler,
        checkout::activate_purchase_handler,
        admin::admin_overview_handler,
        admin::admin_transactions_handler,
        admin::admin_affiliates_handler,
    ),
    components(
        schemas(
            HealthResponse,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            courses::CourseSummary,
            courses::CourseDetail,
            courses::ChapterDetail,
            courses::VideoView,
            courses::QuestionView,
            courses::ClaimRequest,
            courses::ClaimResponse,
            courses::CreateCourseRequest,
            courses::NewChapterRequest,
            courses::NewVideoRequest,
            courses::NewQuestionRequest,
            courses::CreateCourseResponse,
            learning::ProgressResponse,
            learning::PositionRequest,
            learning::WatchTimeRequest,
            learning::ChapterAccessView,
            learning::CompletionResponse,
            learning::QuizStartResponse,
            learning::QuizAnswerRequest,
            learning::QuizResultResponse,
            affiliate::CreateLinkRequest,
            affiliate::AffiliateLinkResponse,
            affiliate::TrackClickRequest,
            affiliate::TrackClickResponse,
            checkout::CheckoutRequest,
            checkout::CheckoutResponse,
            checkout::TransactionView,
            checkout::ActivationResponse,
            admin::OverviewResponse,
            admin::AdminTransactionView,
            admin::AdminAffiliateView,
        )
    ),
    tags(
        (name = "Course Platform API", description = "Catalog, learning progress, quizzes, referrals, and mobile-money checkout.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Health
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "The service is up", body = HealthResponse)
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}

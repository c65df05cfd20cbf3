//! services/api/src/web/admin.rs
//!
//! The admin monitoring surface: platform counters, recent transactions, and
//! the affiliate leaderboard. All routes sit behind the `require_admin`
//! middleware.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;

const RECENT_TRANSACTION_LIMIT: i64 = 50;
const AFFILIATE_LEADERBOARD_LIMIT: i64 = 20;

//=========================================================================================
// API Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct OverviewResponse {
    pub total_users: i64,
    pub total_courses: i64,
    pub total_purchases: i64,
    pub completed_revenue: i64,
}

#[derive(Serialize, ToSchema)]
pub struct AdminTransactionView {
    pub deposit_id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub correspondent: String,
    pub referral_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct AdminAffiliateView {
    pub code: String,
    pub owner_user_id: Uuid,
    pub course_id: Uuid,
    pub clicks: i64,
    pub conversions: i64,
    pub total_earnings: i64,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Platform-wide counters.
#[utoipa::path(
    get,
    path = "/admin/overview",
    responses(
        (status = 200, description = "Aggregate platform counters", body = OverviewResponse),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn admin_overview_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let overview = state.db.platform_overview().await.map_err(|e| {
        error!("Failed to load platform overview: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load overview".to_string())
    })?;

    Ok(Json(OverviewResponse {
        total_users: overview.total_users,
        total_courses: overview.total_courses,
        total_purchases: overview.total_purchases,
        completed_revenue: overview.completed_revenue,
    }))
}

/// Recent transactions, newest first.
#[utoipa::path(
    get,
    path = "/admin/transactions",
    responses(
        (status = 200, description = "Recent transactions", body = [AdminTransactionView]),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn admin_transactions_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let transactions = state
        .db
        .list_recent_transactions(RECENT_TRANSACTION_LIMIT)
        .await
        .map_err(|e| {
            error!("Failed to list transactions: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list transactions".to_string())
        })?;

    let views: Vec<AdminTransactionView> = transactions
        .into_iter()
        .map(|t| AdminTransactionView {
            deposit_id: t.deposit_id,
            user_id: t.user_id,
            course_id: t.course_id,
            amount: t.amount,
            currency: t.currency,
            status: t.status.as_str().to_string(),
            correspondent: t.correspondent,
            referral_code: t.referral_code,
            created_at: t.created_at,
            updated_at: t.updated_at,
        })
        .collect();

    Ok(Json(views))
}

/// Affiliate links ranked by accumulated earnings.
#[utoipa::path(
    get,
    path = "/admin/affiliates",
    responses(
        (status = 200, description = "The affiliate leaderboard", body = [AdminAffiliateView]),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn admin_affiliates_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let links = state
        .affiliates
        .top_links(AFFILIATE_LEADERBOARD_LIMIT)
        .await
        .map_err(|e| {
            error!("Failed to list affiliate links: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list affiliates".to_string())
        })?;

    let views: Vec<AdminAffiliateView> = links
        .into_iter()
        .map(|l| AdminAffiliateView {
            code: l.code,
            owner_user_id: l.owner_user_id,
            course_id: l.course_id,
            clicks: l.clicks,
            conversions: l.conversions,
            total_earnings: l.total_earnings,
        })
        .collect();

    Ok(Json(views))
}

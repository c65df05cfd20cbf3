//! services/api/src/web/affiliate.rs
//!
//! Referral link minting and click/conversion attribution.
//!
//! Attribution is strictly best-effort: a missing or unknown code is a no-op,
//! and store failures are logged and swallowed so a broken referral link can
//! never block a purchase or course access.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use lms_core::domain::AffiliateLink;
use lms_core::ports::AffiliateStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;

//=========================================================================================
// Attribution Helpers (shared with the checkout flow)
//=========================================================================================

/// Mints a referral code candidate: 8 uppercase hex characters.
pub fn mint_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

/// The shareable link embedding the code and course id.
pub fn share_url(public_base_url: &str, course_id: Uuid, code: &str) -> String {
    format!(
        "{}/courses/{}?ref={}",
        public_base_url.trim_end_matches('/'),
        course_id,
        code
    )
}

/// The referrer's cut of a sale: the amount less the platform fee.
pub fn net_of_platform_fee(amount: i64, fee_percent: u8) -> i64 {
    amount - (amount * i64::from(fee_percent) / 100)
}

/// Counts one click against `code`, deduplicated per visitor. A missing or
/// unknown code is a no-op; store failures are swallowed. Returns whether a
/// click was counted.
pub async fn track_click(
    store: &Arc<dyn AffiliateStore>,
    code: Option<&str>,
    course_id: Uuid,
    visitor_id: &str,
) -> bool {
    let Some(code) = code.filter(|c| !c.is_empty()) else {
        return false;
    };

    match store.find_link(code).await {
        Ok(Some(link)) => match store.record_click(&link.code, course_id, visitor_id).await {
            Ok(counted) => counted,
            Err(e) => {
                warn!(code, "Failed to record affiliate click: {:?}", e);
                false
            }
        },
        Ok(None) => false,
        Err(e) => {
            warn!(code, "Failed to look up affiliate code: {:?}", e);
            false
        }
    }
}

/// Attributes one paid conversion to `code`, crediting `net_amount`. Same
/// no-op and swallow semantics as [`track_click`].
pub async fn record_conversion(
    store: &Arc<dyn AffiliateStore>,
    code: Option<&str>,
    net_amount: i64,
) {
    let Some(code) = code.filter(|c| !c.is_empty()) else {
        return;
    };

    match store.find_link(code).await {
        Ok(Some(link)) => {
            if let Err(e) = store.record_conversion(&link.code, net_amount).await {
                warn!(code, "Failed to record affiliate conversion: {:?}", e);
            }
        }
        Ok(None) => {}
        Err(e) => {
            warn!(code, "Failed to look up affiliate code: {:?}", e);
        }
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateLinkRequest {
    pub course_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct AffiliateLinkResponse {
    pub code: String,
    pub course_id: Uuid,
    pub url: String,
    pub clicks: i64,
    pub conversions: i64,
    pub total_earnings: i64,
}

impl AffiliateLinkResponse {
    fn from_domain(link: &AffiliateLink, public_base_url: &str) -> Self {
        Self {
            code: link.code.clone(),
            course_id: link.course_id,
            url: share_url(public_base_url, link.course_id, &link.code),
            clicks: link.clicks,
            conversions: link.conversions,
            total_earnings: link.total_earnings,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct TrackClickRequest {
    pub code: Option<String>,
    pub course_id: Uuid,
    pub visitor_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct TrackClickResponse {
    pub counted: bool,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Get-or-create the caller's referral link for a course.
#[utoipa::path(
    post,
    path = "/affiliate/links",
    request_body = CreateLinkRequest,
    responses(
        (status = 200, description = "The caller's referral link", body = AffiliateLinkResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_affiliate_link_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateLinkRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let link = state
        .affiliates
        .get_or_create_link(user_id, req.course_id, &mint_code())
        .await
        .map_err(|e| {
            error!("Failed to create affiliate link: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create referral link".to_string())
        })?;

    Ok(Json(AffiliateLinkResponse::from_domain(
        &link,
        &state.config.public_base_url,
    )))
}

/// List the caller's referral links with their stats.
#[utoipa::path(
    get,
    path = "/affiliate/links",
    responses(
        (status = 200, description = "The caller's referral links", body = [AffiliateLinkResponse])
    )
)]
pub async fn list_affiliate_links_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let links = state.affiliates.links_for_owner(user_id).await.map_err(|e| {
        error!("Failed to list affiliate links: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list referral links".to_string())
    })?;

    let views: Vec<AffiliateLinkResponse> = links
        .iter()
        .map(|l| AffiliateLinkResponse::from_domain(l, &state.config.public_base_url))
        .collect();
    Ok(Json(views))
}

/// Record a referral click. Public; called once per page load when a `ref`
/// parameter is present. Always answers 200 — attribution never fails a
/// page view.
#[utoipa::path(
    post,
    path = "/affiliate/clicks",
    request_body = TrackClickRequest,
    responses(
        (status = 200, description = "Whether a click was counted", body = TrackClickResponse)
    )
)]
pub async fn track_click_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrackClickRequest>,
) -> impl IntoResponse {
    let counted = track_click(
        &state.affiliates,
        req.code.as_deref(),
        req.course_id,
        &req.visitor_id,
    )
    .await;

    Json(TrackClickResponse { counted })
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lms_core::ports::{PortError, PortResult};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// A store that counts mutations and can simulate failures.
    #[derive(Default)]
    struct FakeStore {
        known_code: Option<String>,
        clicks: AtomicU64,
        conversions: AtomicU64,
        fail_increments: bool,
    }

    #[async_trait]
    impl AffiliateStore for FakeStore {
        async fn get_or_create_link(
            &self,
            owner_user_id: Uuid,
            course_id: Uuid,
            candidate_code: &str,
        ) -> PortResult<AffiliateLink> {
            Ok(AffiliateLink {
                code: candidate_code.to_string(),
                owner_user_id,
                course_id,
                clicks: 0,
                conversions: 0,
                total_earnings: 0,
            })
        }

        async fn find_link(&self, code: &str) -> PortResult<Option<AffiliateLink>> {
            Ok(self.known_code.as_deref().filter(|c| *c == code).map(|c| AffiliateLink {
                code: c.to_string(),
                owner_user_id: Uuid::nil(),
                course_id: Uuid::nil(),
                clicks: 0,
                conversions: 0,
                total_earnings: 0,
            }))
        }

        async fn record_click(
            &self,
            _code: &str,
            _course_id: Uuid,
            _visitor_id: &str,
        ) -> PortResult<bool> {
            if self.fail_increments {
                return Err(PortError::Unexpected("store offline".to_string()));
            }
            self.clicks.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn record_conversion(&self, _code: &str, _net_amount: i64) -> PortResult<()> {
            if self.fail_increments {
                return Err(PortError::Unexpected("store offline".to_string()));
            }
            self.conversions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn links_for_owner(&self, _owner_user_id: Uuid) -> PortResult<Vec<AffiliateLink>> {
            Ok(Vec::new())
        }

        async fn top_links(&self, _limit: i64) -> PortResult<Vec<AffiliateLink>> {
            Ok(Vec::new())
        }
    }

    fn store(fake: FakeStore) -> Arc<dyn AffiliateStore> {
        Arc::new(fake)
    }

    #[tokio::test]
    async fn missing_code_is_a_noop() {
        let fake = Arc::new(FakeStore {
            known_code: Some("ABCD1234".to_string()),
            ..Default::default()
        });
        let as_store: Arc<dyn AffiliateStore> = fake.clone();

        assert!(!track_click(&as_store, None, Uuid::new_v4(), "visitor-1").await);
        record_conversion(&as_store, None, 700).await;

        assert_eq!(fake.clicks.load(Ordering::SeqCst), 0);
        assert_eq!(fake.conversions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_code_is_a_noop() {
        let fake = Arc::new(FakeStore {
            known_code: Some("ABCD1234".to_string()),
            ..Default::default()
        });
        let as_store: Arc<dyn AffiliateStore> = fake.clone();

        assert!(!track_click(&as_store, Some("WRONG"), Uuid::new_v4(), "visitor-1").await);
        record_conversion(&as_store, Some("WRONG"), 700).await;

        assert_eq!(fake.clicks.load(Ordering::SeqCst), 0);
        assert_eq!(fake.conversions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn known_code_is_counted() {
        let fake = Arc::new(FakeStore {
            known_code: Some("ABCD1234".to_string()),
            ..Default::default()
        });
        let as_store: Arc<dyn AffiliateStore> = fake.clone();

        assert!(track_click(&as_store, Some("ABCD1234"), Uuid::new_v4(), "visitor-1").await);
        record_conversion(&as_store, Some("ABCD1234"), 700).await;

        assert_eq!(fake.clicks.load(Ordering::SeqCst), 1);
        assert_eq!(fake.conversions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let as_store = store(FakeStore {
            known_code: Some("ABCD1234".to_string()),
            fail_increments: true,
            ..Default::default()
        });

        // Neither call may panic or propagate the error.
        assert!(!track_click(&as_store, Some("ABCD1234"), Uuid::new_v4(), "visitor-1").await);
        record_conversion(&as_store, Some("ABCD1234"), 700).await;
    }

    #[test]
    fn platform_fee_is_deducted() {
        assert_eq!(net_of_platform_fee(1000, 30), 700);
        assert_eq!(net_of_platform_fee(1000, 0), 1000);
        assert_eq!(net_of_platform_fee(0, 30), 0);
    }

    #[test]
    fn minted_codes_are_short_and_uppercase() {
        let code = mint_code();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}

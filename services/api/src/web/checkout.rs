//! services/api/src/web/checkout.rs
//!
//! Mobile-money checkout: deposit initiation with bounded, id-rotating
//! retries, transaction status for the client's progress view, a manual
//! refresh, and the explicit activation step that turns a completed deposit
//! into a purchase.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use lms_core::domain::{AcquiredVia, DepositStatus, Purchase, Transaction};
use lms_core::ports::{DepositInitOutcome, NewDeposit, PaymentGateway, PortError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::affiliate::{net_of_platform_fee, record_conversion};
use crate::web::courses::fetch_course;
use crate::web::poller::{apply_snapshot, confirmation_progress, spawn_deposit_poller, stop_poller};
use crate::web::state::AppState;

/// Initiation attempts before giving up. A `DUPLICATE_IGNORED` or transport
/// failure retries with a freshly minted deposit id; a hard rejection aborts
/// the loop immediately.
const MAX_INIT_ATTEMPTS: usize = 3;
const INIT_RETRY_DELAY_MS: u64 = 400;

//=========================================================================================
// Deposit Initiation with Idempotency-Key Rotation
//=========================================================================================

/// Everything about a deposit except its id, which is minted per attempt.
pub(crate) struct DepositTemplate {
    pub amount: i64,
    pub currency: String,
    pub correspondent: String,
    pub payer_address: String,
    pub statement_description: String,
    pub country: String,
}

#[derive(Debug)]
pub(crate) enum InitiationError {
    /// The gateway already saw the attempted deposit id.
    Duplicate,
    Transport(String),
    /// Authoritative rejection; terminal for this checkout attempt.
    Rejected(String),
}

impl InitiationError {
    fn is_retryable(&self) -> bool {
        !matches!(self, InitiationError::Rejected(_))
    }
}

/// Runs the bounded initiation loop. Each attempt mints a fresh deposit id,
/// so a duplicate signal never reuses the id that produced it.
pub(crate) async fn initiate_with_rotation(
    gateway: &Arc<dyn PaymentGateway>,
    template: &DepositTemplate,
) -> Result<Uuid, InitiationError> {
    let attempt = || async move {
        let deposit_id = Uuid::new_v4();
        let deposit = NewDeposit {
            deposit_id,
            amount: template.amount,
            currency: template.currency.clone(),
            correspondent: template.correspondent.clone(),
            payer_address: template.payer_address.clone(),
            statement_description: template.statement_description.clone(),
            country: template.country.clone(),
        };

        match gateway.request_deposit(&deposit).await {
            Ok(DepositInitOutcome::Accepted) => Ok(deposit_id),
            Ok(DepositInitOutcome::DuplicateIgnored) => {
                info!(%deposit_id, "gateway ignored a duplicate deposit id; rotating");
                Err(InitiationError::Duplicate)
            }
            Ok(DepositInitOutcome::Rejected { reason }) => Err(InitiationError::Rejected(reason)),
            Err(e) => Err(InitiationError::Transport(e.to_string())),
        }
    };

    let strategy = FixedInterval::from_millis(INIT_RETRY_DELAY_MS).take(MAX_INIT_ATTEMPTS - 1);
    RetryIf::spawn(strategy, attempt, InitiationError::is_retryable).await
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub course_id: Uuid,
    /// The mobile-money channel, e.g. "MTN_MOMO_ZMB".
    pub correspondent: String,
    /// The payer's MSISDN.
    pub payer_address: String,
    pub ref_code: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub deposit_id: Uuid,
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct TransactionView {
    pub deposit_id: Uuid,
    pub course_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub correspondent: String,
    pub failure_reason: Option<String>,
    /// Bounded confirmation progress; reaches 100 only in a terminal state.
    pub progress_percent: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionView {
    fn build(state: &AppState, transaction: &Transaction) -> Self {
        let terminal = transaction.status.is_terminal();
        let attempts = state
            .pollers
            .get(&transaction.deposit_id)
            .map(|handle| handle.attempts.load(Ordering::Relaxed))
            .unwrap_or(0);

        Self {
            deposit_id: transaction.deposit_id,
            course_id: transaction.course_id,
            amount: transaction.amount,
            currency: transaction.currency.clone(),
            status: transaction.status.as_str().to_string(),
            correspondent: transaction.correspondent.clone(),
            failure_reason: transaction.failure_reason.clone(),
            progress_percent: confirmation_progress(attempts, terminal),
            created_at: transaction.created_at,
            updated_at: transaction.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ActivationResponse {
    pub course_id: Uuid,
    pub deposit_id: Uuid,
    pub activated: bool,
    /// True when the course was already activated by an earlier call.
    pub already_active: bool,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Initiate a mobile-money payment for a course.
#[utoipa::path(
    post,
    path = "/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Deposit submitted; poll its status", body = CheckoutResponse),
        (status = 400, description = "Course is free or already purchased"),
        (status = 402, description = "The gateway rejected the payment"),
        (status = 502, description = "The gateway could not be reached")
    )
)]
pub async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let course = fetch_course(&state, req.course_id).await?;

    if course.price_amount == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "This course is free; claim it instead of paying".to_string(),
        ));
    }

    let existing = state.db.get_purchase(user_id, course.id).await.map_err(|e| {
        error!("Failed to check purchase: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start checkout".to_string())
    })?;
    if existing.is_some() {
        return Err((
            StatusCode::BAD_REQUEST,
            "This course is already purchased".to_string(),
        ));
    }

    let template = DepositTemplate {
        amount: course.price_amount,
        currency: course.currency.clone(),
        correspondent: req.correspondent.clone(),
        payer_address: req.payer_address.clone(),
        statement_description: format!("Course: {}", course.title),
        country: state.config.payment_country.clone(),
    };

    let deposit_id = initiate_with_rotation(&state.payments, &template)
        .await
        .map_err(|e| match e {
            InitiationError::Rejected(reason) => (StatusCode::PAYMENT_REQUIRED, reason),
            other => {
                error!("Deposit initiation failed: {:?}", other);
                (
                    StatusCode::BAD_GATEWAY,
                    "The payment service is unavailable; please try again".to_string(),
                )
            }
        })?;

    let now = Utc::now();
    state
        .db
        .create_transaction(Transaction {
            deposit_id,
            user_id,
            course_id: course.id,
            amount: course.price_amount,
            currency: course.currency,
            status: DepositStatus::Submitted,
            correspondent: req.correspondent,
            payer_address: req.payer_address,
            referral_code: req.ref_code.filter(|c| !c.is_empty()),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .map_err(|e| {
            error!("Failed to record transaction: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to record the payment".to_string())
        })?;

    spawn_deposit_poller(state.clone(), deposit_id);

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            deposit_id,
            status: DepositStatus::Submitted.as_str().to_string(),
        }),
    ))
}

async fn load_owned_transaction(
    state: &Arc<AppState>,
    user_id: Uuid,
    deposit_id: Uuid,
) -> Result<Transaction, (StatusCode, String)> {
    let transaction = state.db.get_transaction(deposit_id).await.map_err(|e| match e {
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, "Transaction not found".to_string()),
        other => {
            error!("Failed to load transaction: {:?}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load transaction".to_string())
        }
    })?;

    if transaction.user_id != user_id {
        return Err((StatusCode::NOT_FOUND, "Transaction not found".to_string()));
    }
    Ok(transaction)
}

/// Current transaction snapshot plus the bounded confirmation progress.
#[utoipa::path(
    get,
    path = "/checkout/{deposit_id}",
    responses(
        (status = 200, description = "The transaction snapshot", body = TransactionView),
        (status = 404, description = "Transaction not found")
    ),
    params(("deposit_id" = Uuid, Path, description = "The deposit to inspect."))
)]
pub async fn transaction_status_handler(
    State(state): State<Arc<AppState>>,
    Path(deposit_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let transaction = load_owned_transaction(&state, user_id, deposit_id).await?;
    Ok(Json(TransactionView::build(&state, &transaction)))
}

/// Immediate out-of-band status check against the gateway.
#[utoipa::path(
    post,
    path = "/checkout/{deposit_id}/refresh",
    responses(
        (status = 200, description = "The refreshed transaction snapshot", body = TransactionView),
        (status = 404, description = "Transaction not found")
    ),
    params(("deposit_id" = Uuid, Path, description = "The deposit to refresh."))
)]
pub async fn refresh_transaction_handler(
    State(state): State<Arc<AppState>>,
    Path(deposit_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let transaction = load_owned_transaction(&state, user_id, deposit_id).await?;

    if !transaction.status.is_terminal() {
        match state.payments.fetch_deposit(deposit_id).await {
            Ok(snapshot) => {
                apply_snapshot(&state.db, &snapshot).await;
                if snapshot.status.is_terminal() {
                    stop_poller(&state, deposit_id);
                }
            }
            Err(e) => {
                // The periodic poll keeps running; this refresh just failed.
                warn!(%deposit_id, "manual status refresh failed: {:?}", e);
            }
        }
    }

    let transaction = load_owned_transaction(&state, user_id, deposit_id).await?;
    Ok(Json(TransactionView::build(&state, &transaction)))
}

/// Explicit activation of a completed payment: records the purchase,
/// attributes any pending affiliate conversion, and dispatches the receipt.
#[utoipa::path(
    post,
    path = "/checkout/{deposit_id}/activate",
    responses(
        (status = 200, description = "The course is now purchased", body = ActivationResponse),
        (status = 404, description = "Transaction not found"),
        (status = 409, description = "The payment has not completed")
    ),
    params(("deposit_id" = Uuid, Path, description = "The completed deposit."))
)]
pub async fn activate_purchase_handler(
    State(state): State<Arc<AppState>>,
    Path(deposit_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let transaction = load_owned_transaction(&state, user_id, deposit_id).await?;

    if transaction.status != DepositStatus::Completed {
        return Err((
            StatusCode::CONFLICT,
            "The payment has not completed".to_string(),
        ));
    }

    // Re-activation short-circuits so the conversion and the receipt fire
    // at most once per purchase.
    let existing = state
        .db
        .get_purchase(user_id, transaction.course_id)
        .await
        .map_err(|e| {
            error!("Failed to check purchase: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to activate the course".to_string())
        })?;
    if existing.is_some() {
        return Ok(Json(ActivationResponse {
            course_id: transaction.course_id,
            deposit_id,
            activated: true,
            already_active: true,
        }));
    }

    state
        .db
        .create_purchase(Purchase {
            user_id,
            course_id: transaction.course_id,
            deposit_id: Some(deposit_id),
            acquired_via: AcquiredVia::MobileMoney,
            created_at: Utc::now(),
        })
        .await
        .map_err(|e| {
            error!("Failed to record purchase: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to activate the course".to_string())
        })?;

    // Attribution and the receipt are best-effort; the purchase stands
    // whether or not they land.
    let net = net_of_platform_fee(transaction.amount, state.config.platform_fee_percent);
    record_conversion(&state.affiliates, transaction.referral_code.as_deref(), net).await;

    match state.db.get_user_by_id(user_id).await {
        Ok(user) => match state.db.get_course_by_id(transaction.course_id).await {
            Ok(course) => {
                if let Err(e) = state
                    .notifier
                    .send_purchase_receipt(&user, &course, &transaction)
                    .await
                {
                    warn!(%deposit_id, "Failed to send purchase receipt: {:?}", e);
                }
            }
            Err(e) => warn!(%deposit_id, "Receipt skipped; course lookup failed: {:?}", e),
        },
        Err(e) => warn!(%deposit_id, "Receipt skipped; user lookup failed: {:?}", e),
    }

    Ok(Json(ActivationResponse {
        course_id: transaction.course_id,
        deposit_id,
        activated: true,
        already_active: false,
    }))
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lms_core::ports::{DepositSnapshot, PortResult};
    use std::sync::Mutex;

    /// A gateway that records every attempted deposit id and walks a script
    /// of initiation outcomes.
    struct ScriptedInitGateway {
        script: Mutex<Vec<Result<DepositInitOutcome, PortError>>>,
        seen_ids: Mutex<Vec<Uuid>>,
    }

    impl ScriptedInitGateway {
        fn new(script: Vec<Result<DepositInitOutcome, PortError>>) -> Self {
            Self {
                script: Mutex::new(script),
                seen_ids: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedInitGateway {
        async fn request_deposit(&self, deposit: &NewDeposit) -> PortResult<DepositInitOutcome> {
            self.seen_ids.lock().unwrap().push(deposit.deposit_id);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Ok(DepositInitOutcome::Accepted);
            }
            script.remove(0)
        }

        async fn fetch_deposit(&self, deposit_id: Uuid) -> PortResult<DepositSnapshot> {
            Ok(DepositSnapshot {
                deposit_id,
                status: DepositStatus::Submitted,
                failure_reason: None,
            })
        }
    }

    fn template() -> DepositTemplate {
        DepositTemplate {
            amount: 15_000,
            currency: "ZMW".to_string(),
            correspondent: "MTN_MOMO_ZMB".to_string(),
            payer_address: "260763456789".to_string(),
            statement_description: "Course: Intro".to_string(),
            country: "ZMB".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_signal_rotates_to_a_fresh_deposit_id() {
        let gateway = Arc::new(ScriptedInitGateway::new(vec![
            Ok(DepositInitOutcome::DuplicateIgnored),
            Ok(DepositInitOutcome::Accepted),
        ]));
        let as_gateway: Arc<dyn PaymentGateway> = gateway.clone();

        let accepted_id = initiate_with_rotation(&as_gateway, &template())
            .await
            .expect("second attempt accepted");

        let seen = gateway.seen_ids.lock().unwrap();
        assert_eq!(seen.len(), 2);
        // The retry never reuses the id that produced the duplicate signal.
        assert_ne!(seen[0], seen[1]);
        assert_eq!(accepted_id, seen[1]);
    }

    #[tokio::test]
    async fn rejection_aborts_without_further_attempts() {
        let gateway = Arc::new(ScriptedInitGateway::new(vec![Ok(
            DepositInitOutcome::Rejected {
                reason: "Payer limit exceeded".to_string(),
            },
        )]));
        let as_gateway: Arc<dyn PaymentGateway> = gateway.clone();

        let err = initiate_with_rotation(&as_gateway, &template())
            .await
            .expect_err("rejected");

        match err {
            InitiationError::Rejected(reason) => assert_eq!(reason, "Payer limit exceeded"),
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(gateway.seen_ids.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transport_failures_are_bounded_at_three_attempts() {
        let gateway = Arc::new(ScriptedInitGateway::new(vec![
            Err(PortError::Unexpected("timeout".to_string())),
            Err(PortError::Unexpected("timeout".to_string())),
            Err(PortError::Unexpected("timeout".to_string())),
            Err(PortError::Unexpected("timeout".to_string())),
        ]));
        let as_gateway: Arc<dyn PaymentGateway> = gateway.clone();

        let err = initiate_with_rotation(&as_gateway, &template())
            .await
            .expect_err("all attempts failed");

        assert!(matches!(err, InitiationError::Transport(_)));
        assert_eq!(gateway.seen_ids.lock().unwrap().len(), MAX_INIT_ATTEMPTS);
    }

    #[tokio::test]
    async fn every_attempt_uses_a_distinct_id() {
        let gateway = Arc::new(ScriptedInitGateway::new(vec![
            Ok(DepositInitOutcome::DuplicateIgnored),
            Ok(DepositInitOutcome::DuplicateIgnored),
            Ok(DepositInitOutcome::Accepted),
        ]));
        let as_gateway: Arc<dyn PaymentGateway> = gateway.clone();

        initiate_with_rotation(&as_gateway, &template())
            .await
            .expect("third attempt accepted");

        let seen = gateway.seen_ids.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_ne!(seen[0], seen[1]);
        assert_ne!(seen[1], seen[2]);
        assert_ne!(seen[0], seen[2]);
    }
}

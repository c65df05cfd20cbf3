//! services/api/src/adapters/payment.rs
//!
//! This module contains the adapter for the mobile-money payment gateway.
//! It implements the `PaymentGateway` port from the `core` crate over the
//! gateway's HTTP API: one endpoint to initiate a deposit, one to poll its
//! asynchronous status.

use async_trait::async_trait;
use lms_core::domain::DepositStatus;
use lms_core::ports::{DepositInitOutcome, DepositSnapshot, NewDeposit, PaymentGateway, PortError, PortResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `PaymentGateway` against the hosted
/// mobile-money API.
#[derive(Clone)]
pub struct MobileMoneyGateway {
    client: Client,
    base_url: String,
    api_token: String,
    country: String,
}

impl MobileMoneyGateway {
    /// Creates a new `MobileMoneyGateway`.
    pub fn new(client: Client, base_url: String, api_token: String, country: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            country,
        }
    }
}

//=========================================================================================
// Wire Format
//=========================================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DepositRequestBody {
    deposit_id: Uuid,
    // The gateway takes amounts as decimal strings.
    amount: String,
    currency: String,
    correspondent: String,
    payer: PayerBody,
    statement_description: String,
    country: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayerBody {
    #[serde(rename = "type")]
    kind: String,
    address: PayerAddressBody,
}

#[derive(Serialize)]
struct PayerAddressBody {
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositInitResponse {
    status: String,
    #[serde(default)]
    rejection_reason: Option<RejectionReasonBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectionReasonBody {
    #[serde(default)]
    rejection_message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositStatusResponse {
    deposit_id: Uuid,
    status: String,
    #[serde(default)]
    failure_reason: Option<FailureReasonBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FailureReasonBody {
    #[serde(default)]
    failure_message: Option<String>,
}

fn parse_status(status: &str) -> PortResult<DepositStatus> {
    match status {
        "SUBMITTED" => Ok(DepositStatus::Submitted),
        "ACCEPTED" => Ok(DepositStatus::Accepted),
        "PENDING" | "ENQUEUED" => Ok(DepositStatus::Pending),
        "COMPLETED" => Ok(DepositStatus::Completed),
        "FAILED" => Ok(DepositStatus::Failed),
        "REJECTED" => Ok(DepositStatus::Rejected),
        other => Err(PortError::Unexpected(format!(
            "gateway returned unknown deposit status '{}'",
            other
        ))),
    }
}

//=========================================================================================
// `PaymentGateway` Trait Implementation
//=========================================================================================

#[async_trait]
impl PaymentGateway for MobileMoneyGateway {
    async fn request_deposit(&self, deposit: &NewDeposit) -> PortResult<DepositInitOutcome> {
        let body = DepositRequestBody {
            deposit_id: deposit.deposit_id,
            amount: deposit.amount.to_string(),
            currency: deposit.currency.clone(),
            correspondent: deposit.correspondent.clone(),
            payer: PayerBody {
                kind: "MSISDN".to_string(),
                address: PayerAddressBody {
                    value: deposit.payer_address.clone(),
                },
            },
            statement_description: deposit.statement_description.clone(),
            country: self.country.clone(),
        };

        let response = self
            .client
            .post(format!("{}/deposits", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("deposit request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| PortError::Unexpected(format!("deposit request failed: {}", e)))?
            .json::<DepositInitResponse>()
            .await
            .map_err(|e| PortError::Unexpected(format!("invalid deposit response: {}", e)))?;

        match response.status.as_str() {
            "ACCEPTED" => Ok(DepositInitOutcome::Accepted),
            "DUPLICATE_IGNORED" => Ok(DepositInitOutcome::DuplicateIgnored),
            "REJECTED" => Ok(DepositInitOutcome::Rejected {
                reason: response
                    .rejection_reason
                    .and_then(|r| r.rejection_message)
                    .unwrap_or_else(|| "The payment was rejected".to_string()),
            }),
            other => Err(PortError::Unexpected(format!(
                "gateway returned unknown initiation status '{}'",
                other
            ))),
        }
    }

    async fn fetch_deposit(&self, deposit_id: Uuid) -> PortResult<DepositSnapshot> {
        // The status endpoint answers with an array of matching deposits.
        let deposits = self
            .client
            .get(format!("{}/deposits/{}", self.base_url, deposit_id))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("status request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| PortError::Unexpected(format!("status request failed: {}", e)))?
            .json::<Vec<DepositStatusResponse>>()
            .await
            .map_err(|e| PortError::Unexpected(format!("invalid status response: {}", e)))?;

        let deposit = deposits
            .into_iter()
            .next()
            .ok_or_else(|| PortError::NotFound(format!("Deposit {} not found", deposit_id)))?;

        Ok(DepositSnapshot {
            deposit_id: deposit.deposit_id,
            status: parse_status(&deposit.status)?,
            failure_reason: deposit.failure_reason.and_then(|r| r.failure_message),
        })
    }
}

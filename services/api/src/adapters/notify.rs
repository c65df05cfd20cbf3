//! services/api/src/adapters/notify.rs
//!
//! This module contains the adapter for the outbound notification endpoint,
//! implementing the `NotificationService` port. Receipts are fire-and-forget:
//! callers log a failure and move on.

use async_trait::async_trait;
use lms_core::domain::{Course, Transaction, User};
use lms_core::ports::{NotificationService, PortError, PortResult};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// An adapter that posts purchase receipts to an internal endpoint.
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    /// Unset means notifications are disabled; sends become no-ops.
    endpoint: Option<String>,
}

impl HttpNotifier {
    pub fn new(client: Client, endpoint: Option<String>) -> Self {
        Self { client, endpoint }
    }
}

#[derive(Serialize)]
struct ReceiptBody {
    user: ReceiptUser,
    course: ReceiptCourse,
    transaction: ReceiptTransaction,
}

#[derive(Serialize)]
struct ReceiptUser {
    user_id: Uuid,
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Serialize)]
struct ReceiptCourse {
    course_id: Uuid,
    title: String,
}

#[derive(Serialize)]
struct ReceiptTransaction {
    deposit_id: Uuid,
    amount: i64,
    currency: String,
}

#[async_trait]
impl NotificationService for HttpNotifier {
    async fn send_purchase_receipt(
        &self,
        user: &User,
        course: &Course,
        transaction: &Transaction,
    ) -> PortResult<()> {
        let Some(endpoint) = &self.endpoint else {
            debug!("notification endpoint unset; skipping purchase receipt");
            return Ok(());
        };

        let body = ReceiptBody {
            user: ReceiptUser {
                user_id: user.user_id,
                email: user.email.clone(),
                display_name: user.display_name.clone(),
            },
            course: ReceiptCourse {
                course_id: course.id,
                title: course.title.clone(),
            },
            transaction: ReceiptTransaction {
                deposit_id: transaction.deposit_id,
                amount: transaction.amount,
                currency: transaction.currency.clone(),
            },
        };

        self.client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("receipt dispatch failed: {}", e)))?
            .error_for_status()
            .map_err(|e| PortError::Unexpected(format!("receipt dispatch failed: {}", e)))?;

        Ok(())
    }
}

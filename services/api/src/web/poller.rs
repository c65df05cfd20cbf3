//! services/api/src/web/poller.rs
//!
//! The payment confirmation poller. Each non-terminal deposit gets one
//! background task that repeatedly asks the gateway for the deposit's
//! status on a fixed interval, persisting every observation. The loop ends
//! when a terminal status arrives or the task is cancelled (manual refresh
//! observing a terminal status, or shutdown). A response that arrives after
//! cancellation is simply discarded with the task.

use lms_core::ports::{DatabaseService, DepositSnapshot, PaymentGateway};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::web::state::AppState;

/// Handle to one running confirmation poll, kept in the shared registry so
/// the status endpoint can read the attempt count and refresh can cancel.
pub struct PollHandle {
    pub token: CancellationToken,
    pub attempts: Arc<AtomicU32>,
}

/// The bounded progress indicator: grows with each poll attempt but stays
/// capped below 100 until a terminal status is observed.
pub fn confirmation_progress(attempts: u32, terminal: bool) -> u8 {
    if terminal {
        100
    } else {
        (10 + attempts.saturating_mul(8)).min(90) as u8
    }
}

/// Registers and spawns the confirmation poll for one deposit.
pub fn spawn_deposit_poller(state: Arc<AppState>, deposit_id: Uuid) {
    let token = CancellationToken::new();
    let attempts = Arc::new(AtomicU32::new(0));

    state.pollers.insert(
        deposit_id,
        PollHandle {
            token: token.clone(),
            attempts: attempts.clone(),
        },
    );

    let poller = DepositPoller {
        gateway: state.payments.clone(),
        db: state.db.clone(),
        deposit_id,
        interval: state.config.payment_poll_interval,
        token,
        attempts,
    };

    tokio::spawn(async move {
        poller.run().await;
        state.pollers.remove(&deposit_id);
    });
}

/// Cancels the poll for `deposit_id` if one is running.
pub fn stop_poller(state: &AppState, deposit_id: Uuid) {
    if let Some((_, handle)) = state.pollers.remove(&deposit_id) {
        handle.token.cancel();
    }
}

/// Persists one status observation. Best-effort: the poll keeps running if
/// a write fails.
pub async fn apply_snapshot(db: &Arc<dyn DatabaseService>, snapshot: &DepositSnapshot) {
    if let Err(e) = db
        .update_transaction_status(
            snapshot.deposit_id,
            snapshot.status,
            snapshot.failure_reason.as_deref(),
        )
        .await
    {
        warn!(deposit_id = %snapshot.deposit_id, "Failed to persist deposit status: {:?}", e);
    }
}

pub(crate) struct DepositPoller {
    pub gateway: Arc<dyn PaymentGateway>,
    pub db: Arc<dyn DatabaseService>,
    pub deposit_id: Uuid,
    pub interval: Duration,
    pub token: CancellationToken,
    pub attempts: Arc<AtomicU32>,
}

impl DepositPoller {
    pub(crate) async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            select! {
                _ = self.token.cancelled() => {
                    info!(deposit_id = %self.deposit_id, "confirmation poll cancelled");
                    break;
                }

                _ = ticker.tick() => {
                    self.attempts.fetch_add(1, Ordering::Relaxed);

                    let snapshot = match self.gateway.fetch_deposit(self.deposit_id).await {
                        Ok(snapshot) => snapshot,
                        Err(e) => {
                            warn!(deposit_id = %self.deposit_id, "deposit status poll failed: {:?}", e);
                            continue;
                        }
                    };

                    apply_snapshot(&self.db, &snapshot).await;

                    if snapshot.status.is_terminal() {
                        info!(
                            deposit_id = %self.deposit_id,
                            status = ?snapshot.status,
                            "deposit reached a terminal status; confirmation poll finished"
                        );
                        break;
                    }
                }
            }
        }
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use lms_core::domain::{
        Chapter, Course, DepositStatus, Purchase, QuizQuestion, Transaction, User,
        UserCredentials, Video,
    };
    use lms_core::ports::{
        DepositInitOutcome, NewDeposit, PlatformOverview, PortError, PortResult,
    };

    /// A gateway that walks a fixed status script and counts calls.
    struct ScriptedGateway {
        script: Vec<DepositStatus>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn request_deposit(&self, _deposit: &NewDeposit) -> PortResult<DepositInitOutcome> {
            Ok(DepositInitOutcome::Accepted)
        }

        async fn fetch_deposit(&self, deposit_id: Uuid) -> PortResult<DepositSnapshot> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let status = self
                .script
                .get(call)
                .copied()
                .unwrap_or(*self.script.last().expect("non-empty script"));
            Ok(DepositSnapshot {
                deposit_id,
                status,
                failure_reason: None,
            })
        }
    }

    /// A database stub: only `update_transaction_status` is reachable from
    /// the poll loop.
    #[derive(Default)]
    struct StubDb {
        status_writes: AtomicU32,
    }

    fn unused<T>() -> PortResult<T> {
        Err(PortError::Unexpected("not used by this test".to_string()))
    }

    #[async_trait]
    impl DatabaseService for StubDb {
        async fn get_user_by_id(&self, _: Uuid) -> PortResult<User> {
            unused()
        }
        async fn create_user_with_email(
            &self,
            _: &str,
            _: &str,
            _: Option<&str>,
        ) -> PortResult<User> {
            unused()
        }
        async fn get_user_by_email(&self, _: &str) -> PortResult<UserCredentials> {
            unused()
        }
        async fn create_auth_session(
            &self,
            _: &str,
            _: Uuid,
            _: DateTime<Utc>,
        ) -> PortResult<()> {
            unused()
        }
        async fn validate_auth_session(&self, _: &str) -> PortResult<Uuid> {
            unused()
        }
        async fn delete_auth_session(&self, _: &str) -> PortResult<()> {
            unused()
        }
        async fn list_published_courses(&self) -> PortResult<Vec<Course>> {
            unused()
        }
        async fn get_course_by_id(&self, _: Uuid) -> PortResult<Course> {
            unused()
        }
        async fn get_chapters(&self, _: Uuid) -> PortResult<Vec<Chapter>> {
            unused()
        }
        async fn get_videos(&self, _: Uuid) -> PortResult<Vec<Video>> {
            unused()
        }
        async fn get_quiz_questions(&self, _: Uuid) -> PortResult<Vec<QuizQuestion>> {
            unused()
        }
        async fn create_course(
            &self,
            _: Course,
            _: Vec<Chapter>,
            _: Vec<Video>,
            _: Vec<QuizQuestion>,
        ) -> PortResult<Course> {
            unused()
        }
        async fn create_purchase(&self, _: Purchase) -> PortResult<()> {
            unused()
        }
        async fn get_purchase(&self, _: Uuid, _: Uuid) -> PortResult<Option<Purchase>> {
            unused()
        }
        async fn create_transaction(&self, _: Transaction) -> PortResult<()> {
            unused()
        }
        async fn get_transaction(&self, _: Uuid) -> PortResult<Transaction> {
            unused()
        }
        async fn update_transaction_status(
            &self,
            _: Uuid,
            _: DepositStatus,
            _: Option<&str>,
        ) -> PortResult<()> {
            self.status_writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn platform_overview(&self) -> PortResult<PlatformOverview> {
            unused()
        }
        async fn list_recent_transactions(&self, _: i64) -> PortResult<Vec<Transaction>> {
            unused()
        }
    }

    fn poller(
        gateway: Arc<ScriptedGateway>,
        db: Arc<StubDb>,
        token: CancellationToken,
    ) -> DepositPoller {
        DepositPoller {
            gateway,
            db,
            deposit_id: Uuid::new_v4(),
            interval: Duration::from_millis(5),
            token,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    #[tokio::test]
    async fn polling_stops_at_a_terminal_status() {
        let gateway = Arc::new(ScriptedGateway {
            script: vec![
                DepositStatus::Submitted,
                DepositStatus::Pending,
                DepositStatus::Completed,
            ],
            calls: AtomicU32::new(0),
        });
        let db = Arc::new(StubDb::default());
        let token = CancellationToken::new();

        poller(gateway.clone(), db.clone(), token).run().await;

        // Three polls, then termination: no further requests for this id.
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
        assert_eq!(db.status_writes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_is_terminal_too() {
        let gateway = Arc::new(ScriptedGateway {
            script: vec![DepositStatus::Failed],
            calls: AtomicU32::new(0),
        });
        let db = Arc::new(StubDb::default());

        poller(gateway.clone(), db, CancellationToken::new()).run().await;

        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_ends_the_loop() {
        let gateway = Arc::new(ScriptedGateway {
            script: vec![DepositStatus::Pending],
            calls: AtomicU32::new(0),
        });
        let db = Arc::new(StubDb::default());
        let token = CancellationToken::new();

        let handle = tokio::spawn(poller(gateway.clone(), db, token.clone()).run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        handle.await.expect("poller task");

        let calls_at_cancel = gateway.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(gateway.calls.load(Ordering::SeqCst), calls_at_cancel);
    }

    #[test]
    fn progress_indicator_is_bounded_until_terminal() {
        assert!(confirmation_progress(0, false) < 100);
        assert!(confirmation_progress(50, false) < 100);
        assert_eq!(confirmation_progress(50, false), 90);
        assert_eq!(confirmation_progress(3, true), 100);
        // Monotonic in the attempt count.
        assert!(confirmation_progress(2, false) >= confirmation_progress(1, false));
    }
}

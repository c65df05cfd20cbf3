//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the in-memory session registries.

use crate::config::Config;
use crate::web::poller::PollHandle;
use dashmap::DashMap;
use lms_core::ports::{
    AffiliateStore, DatabaseService, NotificationService, PaymentGateway, ProgressStore,
};
use lms_core::quiz::QuizSession;
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub progress: Arc<dyn ProgressStore>,
    pub affiliates: Arc<dyn AffiliateStore>,
    pub payments: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn NotificationService>,
    pub config: Arc<Config>,

    /// Active quiz runs, keyed by (user, chapter). A new start replaces any
    /// previous session for the same key.
    pub quizzes: DashMap<(Uuid, Uuid), QuizSession>,

    /// Confirmation poll tasks for non-terminal deposits, keyed by deposit id.
    pub pollers: DashMap<Uuid, PollHandle>,
}

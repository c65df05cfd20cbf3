pub mod domain;
pub mod ports;
pub mod progress;
pub mod quiz;

pub use domain::{
    AcquiredVia, AffiliateLink, AuthSession, Chapter, Course, CourseCompletionState,
    CourseProgress, DepositStatus, Purchase, QuestionKind, QuizAnswer, QuizQuestion, Transaction,
    User, UserCredentials, Video,
};
pub use ports::{
    AffiliateStore, DatabaseService, DepositInitOutcome, DepositSnapshot, NewDeposit,
    NotificationService, PaymentGateway, PlatformOverview, PortError, PortResult, ProgressStore,
};
pub use progress::{accessible_chapters, chapter_accessible, evaluate_completion, ChapterAccess};
pub use quiz::{QuizOutcome, QuizPhase, QuizSession, PASS_THRESHOLD, QUIZ_DURATION_SECS};

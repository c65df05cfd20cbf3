pub mod db;
pub mod notify;
pub mod payment;

pub use db::DbAdapter;
pub use notify::HttpNotifier;
pub use payment::MobileMoneyGateway;

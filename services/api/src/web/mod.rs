pub mod admin;
pub mod affiliate;
pub mod auth;
pub mod checkout;
pub mod courses;
pub mod learning;
pub mod middleware;
pub mod poller;
pub mod rest;
pub mod state;

// Re-export the pieces the binary needs to assemble the router.
pub use middleware::{require_admin, require_auth};
pub use rest::{health_handler, ApiDoc};

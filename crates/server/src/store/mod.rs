//! Database access for players, weekly responses and the email audit log.

pub mod audit;
pub mod responses;
pub mod users;

pub use audit::{EmailType, log_results};
pub use responses::{Roster, ensure_response_token, existing_token};
pub use users::NewUser;

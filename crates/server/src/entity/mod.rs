pub mod email_log;
pub mod user;
pub mod weekly_response;

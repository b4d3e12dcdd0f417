pub mod auth;

pub use auth::{issue_token, require_bearer_token, Claims};

pub mod auth;
pub mod rate_limit;

pub use auth::{identity_middleware, issue_token, Authenticated, Claims};
pub use rate_limit::rate_limit_middleware;

mod api;
mod health;

pub use api::{hello, me};
pub use health::{health_check, readiness_check};

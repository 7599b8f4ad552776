mod api;

pub use api::{HealthResponse, HelloResponse, MeResponse, SERVICE_NAME};

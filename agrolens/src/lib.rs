mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;
pub mod error;
pub mod treatment;

pub use app::{build_state, start_app};
pub use error::{ApiError, CommonError};
pub use routes::{openapi::OpenApiDocument, Diagnosis};
pub use server::{create_app, HttpServer, SharedState};
pub use telemetry::{init_tracing, Metrics};

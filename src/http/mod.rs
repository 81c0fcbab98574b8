//! HTTP API for the generation gate.

mod routes;
mod server;
mod types;

pub use routes::{router, AppState};
pub use server::HttpServer;
pub use types::{DecisionResponse, DurationRequest, GenerationRequest, RecordRequest};

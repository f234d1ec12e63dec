//! Rivalscope Gateway - HTTP surface for job submission and polling

pub mod auth;
pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, start_gateway, GatewayState};

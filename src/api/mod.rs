//! Wagering HTTP API
//!
//! axum surface over [`crate::service::WageringService`].

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod security;
pub mod server;

pub use handlers::AppState;
pub use server::{build_app, ApiServer};

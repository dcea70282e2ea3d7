// Library exports for the CLI and integration tests
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use client::{tokens::TokenStore, ApiClient, SessionEvent};
pub use config::Config;
pub use error::{ApiError, Result};
pub use store::{AppState, Page, Store};

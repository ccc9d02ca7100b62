//! FitCMS Server Library
//!
//! Backend for a fitness-content CMS. The CRUD surface (exercises,
//! workouts, sounds, programs, templates, categories, users, files) is
//! ordinary routing over parameterized SQL; the part that lives here is
//! the **audit engine**: a middleware that infers what business entity a
//! mutating request affected and what kind of mutation happened, then
//! records that inference without ever touching the request's latency or
//! outcome.
//!
//! # Overview
//!
//! - **`audit`**: classification, disambiguation, recording — see the
//!   module docs for the full pipeline
//! - **`api`**: router assembly and serving
//! - **`config`**: environment-based configuration
//! - **`error`**: application error types
//!
//! ## Framework Stack
//!
//! - **Axum** + **Tower**: HTTP routing and the interception middleware
//! - **SQLx**: the single parameterized INSERT behind the recorder
//! - **Tracing**: structured logging throughout
//!
//! # Example
//!
//! ```no_run
//! use fitcms_server::{api, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     api::serve(config).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use error::{AppError, ServerResult};

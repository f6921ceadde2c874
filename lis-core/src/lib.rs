//! lis-core: Shared infrastructure for the LIS browser-side components.
pub mod config;
pub mod error;
pub mod observability;

pub use async_trait;
pub use reqwest;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use validator;

//! Common types for the Prometheus auth proxy

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

pub mod config;
pub mod error;

pub use config::{Config, Endpoint};
pub use error::{ProxyError, Result};

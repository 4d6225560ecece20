pub mod client;
pub mod metadata;

pub use client::OpenAIClient;
pub use metadata::{extract_request_metadata, RequestMetadata};

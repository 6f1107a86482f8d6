//! Client for the scraping API: endpoints, errors, and the payload decoding shim.

mod client;
pub mod decode;
mod error;

pub use client::{
    ApiClient, ApiClientBuilder, RawResponse, ScrollInstruction, SearchApi, DEFAULT_BASE_URL,
};
pub use decode::unescape_double_encoded;
pub use error::ApiError;

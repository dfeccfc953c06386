//! Tesla owner api, the token provider of stream client

mod client;
mod error;
pub mod types;

pub use client::Client;
pub use error::Error;

/// Result type for api module
pub type Result<T> = std::result::Result<T, Error>;

/// Source of bearer token and streaming tag.
///
/// Token refresh is the provider's business, stream client only asks for the
/// current token when it connects.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// current oauth bearer token
    async fn access_token(&self) -> Result<String>;
    /// vehicle id used as streaming tag
    async fn vehicle_id(&self) -> Result<String>;
}

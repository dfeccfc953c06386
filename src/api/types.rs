//! Tesla owner API response types

use serde::{Deserialize, Serialize};

/// Common response envelope of owner API
#[derive(Debug, Deserialize)]
pub struct Response<T> {
    /// result data, differ type for each api
    pub response: T,
}

/// One vehicle of the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// id used by owner API paths
    pub id: u64,
    /// id used as streaming tag
    pub vehicle_id: u64,
    /// vehicle identification number
    pub vin: String,
    /// name given by owner
    #[serde(default)]
    pub display_name: Option<String>,
    /// online, asleep, offline
    #[serde(default)]
    pub state: Option<String>,
}

/// Body of the oauth token refresh request
#[derive(Debug, Serialize)]
pub(crate) struct RefreshTokenRequest<'a> {
    pub grant_type: &'static str,
    pub client_id: &'static str,
    pub refresh_token: &'a str,
    pub scope: &'static str,
}

/// Issued oauth token
#[derive(Clone, Deserialize)]
pub struct Token {
    /// bearer token for owner API and streaming
    pub access_token: String,
    /// token to get the next access token
    pub refresh_token: String,
    /// lifetime of access token in seconds
    pub expires_in: u64,
    /// usually `Bearer`
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

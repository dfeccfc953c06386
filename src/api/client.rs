use reqwest::{Method, StatusCode};
use snafu::prelude::*;

use super::error::variant::*;
use super::types::*;
use super::{Result, TokenProvider};

static BASE_URL: &str = "https://owner-api.teslamotors.com";

static AUTH_TOKEN_URL: &str = "https://auth.tesla.com/oauth2/v3/token";

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Tesla owner HTTP API Client
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    token: String,
    vin: Option<String>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("token", &"<redacted>")
            .field("vin", &self.vin)
            .finish()
    }
}

impl Client {
    /// create a new api client using oauth2 token
    pub fn new_from_oauth2_token<S: AsRef<str> + ?Sized>(token: &S) -> Result<Self> {
        let token = token.as_ref();
        let auth_header_value = format!("Bearer {}", token)
            .parse()
            .map_err(|_| TokenInvalid.build())?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, auth_header_value);

        let client = reqwest::Client::builder()
            .gzip(true)
            .deflate(true)
            .user_agent(APP_USER_AGENT)
            .default_headers(headers)
            .build()
            .context(ClientCreateFailed)?;

        Ok(Self {
            client,
            token: token.to_string(),
            vin: None,
        })
    }

    /// create a new api client using a refresh token
    pub async fn new_from_refresh_token<S: AsRef<str> + ?Sized>(
        refresh_token: &S,
    ) -> Result<(Self, Token)> {
        let token = Self::refresh_token(refresh_token).await?;
        let client = Self::new_from_oauth2_token(&token.access_token)?;
        Ok((client, token))
    }

    /// only report vehicle with this vin as stream tag
    pub fn with_vin<S: Into<String>>(mut self, vin: S) -> Self {
        self.vin.replace(vin.into());
        self
    }

    async fn execute<R>(client: &reqwest::Client, req: reqwest::RequestBuilder) -> Result<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let req = req.build().context(BuildRequestFailed)?;
        let method = req.method().clone();
        let url = req.url().to_string();

        log::debug!("{} {}", method, url);

        let resp = client.execute(req).await.with_context(|_| RequestFailed {
            method: method.clone(),
            url: &url,
        })?;

        ensure!(
            resp.status() == StatusCode::OK,
            HTTPStatusNotOK {
                method: method.clone(),
                url: &url,
                status_code: resp.status()
            }
        );

        let body = resp
            .bytes()
            .await
            .with_context(|_| RequestFailed { method, url: &url })?;

        serde_json::from_slice(&body).with_context(|_| ParseBodyFailed { body })
    }

    async fn request<R, P>(&self, method: Method, path: &P) -> Result<R>
    where
        P: AsRef<str> + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", BASE_URL, path.as_ref());
        let req = self.client.request(method, &url);

        let result: Response<R> = Self::execute(&self.client, req).await?;

        Ok(result.response)
    }

    /// Call /api/1/vehicles, get all vehicles of the account
    pub async fn vehicles(&self) -> Result<Vec<Vehicle>> {
        self.request(Method::GET, "/api/1/vehicles").await
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh_token<S: AsRef<str> + ?Sized>(refresh_token: &S) -> Result<Token> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .context(ClientCreateFailed)?;

        let body = serde_json::to_vec(&RefreshTokenRequest {
            grant_type: "refresh_token",
            client_id: "ownerapi",
            refresh_token: refresh_token.as_ref(),
            scope: "openid email offline_access",
        })
        .context(EncodeBodyFailed)?;

        let req = client
            .post(AUTH_TOKEN_URL)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        let token: Token = Self::execute(&client, req).await?;

        log::info!("Access token refreshed, expires in {} seconds", token.expires_in);

        Ok(token)
    }
}

#[async_trait::async_trait]
impl TokenProvider for Client {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    async fn vehicle_id(&self) -> Result<String> {
        let vehicles = self.vehicles().await?;

        let vehicle = match self.vin {
            Some(ref vin) => vehicles.iter().find(|v| &v.vin == vin),
            None => vehicles.first(),
        }
        .with_context(|| NoVehicle {
            vin: self.vin.clone(),
        })?;

        log::debug!(
            "Stream vehicle {} ({})",
            vehicle.vin,
            vehicle.display_name.as_deref().unwrap_or("unnamed")
        );

        Ok(vehicle.vehicle_id.to_string())
    }
}

use snafu::prelude::*;

/// API Error
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(variant), context(suffix(false)))]
pub enum Error {
    /// oauth token is invalid(contains invalid character that cant be send in HTTP header)
    #[snafu(display("oauth token is invalid"))]
    TokenInvalid,

    /// create HTTP client failed
    #[snafu(display("create api client failed: {source}"))]
    ClientCreateFailed {
        /// source error
        source: reqwest::Error,
    },

    /// build api request failed
    #[snafu(display("build request failed: {source}"))]
    BuildRequestFailed {
        /// source error
        source: reqwest::Error,
    },

    /// encode request body failed
    #[snafu(display("encode request body failed: {source}"))]
    EncodeBodyFailed {
        /// source error
        source: serde_json::Error,
    },

    /// send api request failed
    #[snafu(display("{} url {url} failed: {source}", method.as_str()))]
    RequestFailed {
        /// http method
        method: reqwest::Method,
        /// target url
        url: String,
        /// source http error
        source: reqwest::Error,
    },

    /// http response of api request is not OK(200)
    #[snafu(display("{} url {url} got http status code {status_code}", method.as_str()))]
    HTTPStatusNotOK {
        /// http method
        method: reqwest::Method,
        /// request url
        url: String,
        /// received http status code
        status_code: reqwest::StatusCode,
    },

    /// parse response body of api request as target json type failed
    #[snafu(display("parse response body {body:?} failed: {source}"))]
    ParseBodyFailed {
        /// http response body
        body: bytes::Bytes,
        /// source parse error
        source: serde_json::Error,
    },

    /// account has no vehicle, or no vehicle matches the wanted vin
    #[snafu(display(
        "no vehicle found{}",
        vin.as_deref()
            .map(|v| format!(" with vin {}", v))
            .unwrap_or_default()
    ))]
    NoVehicle {
        /// wanted vin
        vin: Option<String>,
    },
}

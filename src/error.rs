//! crate error types

use snafu::prelude::*;

use super::api::Error as APIError;
use super::ws::ClientError;

/// crate error type
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    /// Call tesla owner api failed
    #[snafu(display("call tesla api failed: {source}"))]
    CallAPIFailed {
        /// source error
        source: APIError,
    },

    /// Send command to stream client failed
    #[snafu(display("stream client failed: {source}"))]
    StreamClientFailed {
        /// source error
        source: ClientError,
    },
}

//! # Tesla Stream
//!
//! A self-healing telemetry streaming client for Tesla vehicles.
//!
//! [`ws::StreamClient`] keeps an authenticated subscription alive across
//! network flakiness, vehicle sleep and server errors, reconnecting with
//! tiered exponential backoff. Bearer tokens and vehicle ids come from a
//! [`api::TokenProvider`], for example the owner API [`api::Client`].

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod backoff;
pub mod ws;

mod error;
pub use error::Error;

/// crate result type
pub type Result<T> = std::result::Result<T, Error>;

//! Tesla streaming protocol client implement

mod client;
pub mod message;
mod subscription;

pub use client::{
    ClientError, ConnectRequest, ConnectionState, OpenError, StreamClient, StreamClientBuilder,
    StreamError, StreamEvent, StreamOptions, STREAM_ENDPOINT,
};
pub use subscription::{Subscription, DEFAULT_COLUMNS, SHIFT_STATE_COLUMN};

//! Tesla streaming protocol message types.

mod stream;
mod types;

pub use stream::{Incoming, MessageStreamSink, MessageStreamSinkError};
pub use types::{ClientMessage, ErrorData, ErrorType, Update};

use enum_as_inner::EnumAsInner;
use snafu::prelude::*;

/// Error when parse text frame as message
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)), module(error), context(suffix(false)))]
pub enum ParseMessageError {
    /// data is invalid json
    #[snafu(display("parse json failed: {source}"))]
    ParseJSONFailed {
        /// data for decode
        data: String,
        /// source error
        source: serde_json::Error,
    },

    /// data json is not an object
    #[snafu(display("parsed message is not object: {json}"))]
    MessageNotObject {
        /// json string
        json: String,
    },

    /// data json has no msg_type field
    #[snafu(display("message has no msg_type field: {json}"))]
    NoMessageType {
        /// json string
        json: String,
    },

    /// data json msg_type field is not string type
    #[snafu(display("message has non-string msg_type field: {json}"))]
    MessageTypeNotString {
        /// json string
        json: String,
    },

    /// data json has an unknown msg_type
    #[snafu(display("message has unknown msg_type {t}"))]
    UnknownMessageType {
        /// type name
        t: String,
    },

    /// error message without error_type field
    #[snafu(display("error message has no error_type field: {json}"))]
    NoErrorType {
        /// json string
        json: String,
    },

    /// data json is not valid typed message
    #[snafu(display("parse to {type_name} message failed: {source}"))]
    ParseJSONToTypedMessageFailed {
        /// type name
        type_name: String,
        /// source error
        source: serde_json::Error,
    },
}

/// Message sent from streaming server to client
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum ServerMessage {
    /// `control:hello`, handshake ack
    Hello,
    /// `data:update`, a row of telemetry
    Update(Update),
    /// `data:error`
    Error(ErrorData),
}

impl ServerMessage {
    /// Decode a text frame to a message
    pub fn decode(text: &str) -> Result<Self, ParseMessageError> {
        let value: serde_json::Value =
            serde_json::from_str(text).context(error::ParseJSONFailed { data: text })?;

        let obj = value
            .as_object()
            .with_context(|| error::MessageNotObject { json: text })?;

        let t = obj
            .get("msg_type")
            .with_context(|| error::NoMessageType { json: text })?
            .as_str()
            .with_context(|| error::MessageTypeNotString { json: text })?
            .to_string();

        match t.as_str() {
            "control:hello" => Ok(Self::Hello),
            "data:update" => serde_json::from_value(value)
                .map(Self::Update)
                .context(error::ParseJSONToTypedMessageFailed {
                    type_name: "data:update",
                }),
            "data:error" => {
                ensure!(
                    matches!(obj.get("error_type"), Some(v) if !v.is_null()),
                    error::NoErrorType { json: text }
                );
                serde_json::from_value(value)
                    .map(Self::Error)
                    .context(error::ParseJSONToTypedMessageFailed {
                        type_name: "data:error",
                    })
            }
            _ => error::UnknownMessageType { t: t.clone() }.fail(),
        }
    }

    /// get message type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Hello => "control:hello",
            Self::Update(_) => "data:update",
            Self::Error(_) => "data:error",
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::ws::Subscription;

/// Message sent from client to streaming server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg_type")]
pub enum ClientMessage {
    /// Start streaming columns of a vehicle
    #[serde(rename = "data:subscribe_oauth")]
    Subscribe {
        /// oauth bearer token
        token: String,
        /// requested columns, joined by comma
        value: String,
        /// vehicle tag
        tag: String,
    },

    /// Stop streaming a vehicle
    #[serde(rename = "data:unsubscribe")]
    Unsubscribe {
        /// vehicle tag
        tag: String,
    },
}

impl ClientMessage {
    /// build subscribe message for a subscription
    pub fn subscribe(subscription: &Subscription) -> Self {
        Self::Subscribe {
            token: subscription.token.clone(),
            value: subscription.columns.join(","),
            tag: subscription.tag.clone(),
        }
    }

    /// build unsubscribe message for a tag
    pub fn unsubscribe<S: Into<String>>(tag: S) -> Self {
        Self::Unsubscribe { tag: tag.into() }
    }

    /// encode to json text
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// get message type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "data:subscribe_oauth",
            Self::Unsubscribe { .. } => "data:unsubscribe",
        }
    }
}

/// Data update message data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// vehicle tag, server echoes it back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// `<timestamp>,<col1>,<col2>,...`
    pub value: String,
}

impl Update {
    /// Split value into fields, the first one is timestamp.
    pub fn values(&self) -> Vec<String> {
        self.value.split(',').map(ToString::to_string).collect()
    }
}

/// Error type carried in a `data:error` message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// vehicle dropped the stream, usually because it went to sleep
    VehicleDisconnected,
    /// vehicle side error, may be offline
    VehicleError,
    /// our subscription is invalid
    ClientError,
    /// any other error type
    Unknown,
}

/// Data error message data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    /// raw error type
    pub error_type: String,
    /// reason for human read
    #[serde(default)]
    pub value: String,
    /// vehicle tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ErrorData {
    /// classify error type
    pub fn kind(&self) -> ErrorType {
        match self.error_type.as_str() {
            "vehicle_disconnected" => ErrorType::VehicleDisconnected,
            "vehicle_error" => ErrorType::VehicleError,
            "client_error" => ErrorType::ClientError,
            _ => ErrorType::Unknown,
        }
    }

    /// check if error message says vehicle is powered off or unreachable
    pub fn is_offline(&self) -> bool {
        self.value.to_ascii_lowercase().contains("offline")
    }
}

use std::fmt::Debug;

use snafu::prelude::*;

use crate::ws::message::MessageStreamSinkError;

/// Detail of the caller visible `error` event
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum StreamError {
    /// server says our subscription is invalid, client will reconnect
    #[snafu(display("server rejected subscription: {message}"))]
    Client {
        /// reason for human read
        message: String,
    },

    /// server sent an error type we don't know
    #[snafu(display("unrecognized error type {error_type}: {message}"))]
    UnknownErrorType {
        /// raw error type
        error_type: String,
        /// reason for human read
        message: String,
    },

    /// received a frame which can't be understood
    #[snafu(display("received malformed frame: {source}"))]
    Malformed {
        /// source error
        source: MessageStreamSinkError,
    },
}

/// Caller visible events
#[derive(Debug)]
pub enum StreamEvent {
    /// One data update, fields in subscribed column order, prefixed by timestamp
    Data(Vec<String>),
    /// Health check timeout reached a multiple of 3 times
    Inactive,
    /// Vehicle disconnect reached a multiple of 10 times
    TooManyDisconnects,
    /// Vehicle is powered off or unreachable
    Offline,
    /// Protocol error
    Error(StreamError),
}

pub(crate) type DataCallback = Box<dyn Fn(&[String]) + Send + Sync>;
pub(crate) type SignalCallback = Box<dyn Fn() + Send + Sync>;
pub(crate) type ErrorCallback = Box<dyn Fn(&StreamError) + Send + Sync>;

/// Registered event callbacks of one stream client.
#[derive(Default)]
pub(crate) struct Listeners {
    pub stream_data: Vec<DataCallback>,
    pub inactive: Vec<SignalCallback>,
    pub too_many_disconnects: Vec<SignalCallback>,
    pub offline: Vec<SignalCallback>,
    pub error: Vec<ErrorCallback>,
}

impl Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("stream_data", &self.stream_data.len())
            .field("inactive", &self.inactive.len())
            .field("too_many_disconnects", &self.too_many_disconnects.len())
            .field("offline", &self.offline.len())
            .field("error", &self.error.len())
            .finish()
    }
}

impl Listeners {
    pub fn dispatch(&self, event: &StreamEvent) {
        match event {
            StreamEvent::Data(values) => self.stream_data.iter().for_each(|f| f(values.as_slice())),
            StreamEvent::Inactive => self.inactive.iter().for_each(|f| f()),
            StreamEvent::TooManyDisconnects => self.too_many_disconnects.iter().for_each(|f| f()),
            StreamEvent::Offline => self.offline.iter().for_each(|f| f()),
            StreamEvent::Error(err) => self.error.iter().for_each(|f| f(err)),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::ws::StreamClientBuilder;

    #[test]
    fn test_dispatch_reaches_registered_callbacks() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let record = |name: &'static str| {
            let seen = Arc::clone(&seen);
            move || seen.lock().unwrap().push(name.to_string())
        };
        let data_seen = Arc::clone(&seen);
        let error_seen = Arc::clone(&seen);

        let builder = StreamClientBuilder::default()
            .on_stream_data(move |values| data_seen.lock().unwrap().push(values.join(",")))
            .on_inactive(record("inactive"))
            .on_too_many_disconnects(record("too-many-disconnects"))
            .on_offline(record("offline"))
            .on_error(move |err| error_seen.lock().unwrap().push(err.to_string()));
        let listeners = builder.into_listeners();

        listeners.dispatch(&StreamEvent::Data(vec!["1".to_string(), "P".to_string()]));
        listeners.dispatch(&StreamEvent::Inactive);
        listeners.dispatch(&StreamEvent::TooManyDisconnects);
        listeners.dispatch(&StreamEvent::Offline);
        listeners.dispatch(&StreamEvent::Error(StreamError::Client {
            message: "bad token".to_string(),
        }));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "1,P",
                "inactive",
                "too-many-disconnects",
                "offline",
                "server rejected subscription: bad token",
            ]
        );
    }

    #[test]
    fn test_dispatch_calls_every_listener_of_event() {
        let count = Arc::new(Mutex::new(0));
        let (first, second) = (Arc::clone(&count), Arc::clone(&count));

        let listeners = StreamClientBuilder::default()
            .on_offline(move || *first.lock().unwrap() += 1)
            .on_offline(move || *second.lock().unwrap() += 1)
            .into_listeners();

        listeners.dispatch(&StreamEvent::Offline);
        listeners.dispatch(&StreamEvent::Inactive);

        assert_eq!(*count.lock().unwrap(), 2);
    }
}

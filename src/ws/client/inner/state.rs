/// Connection lifecycle state of a stream client
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// never connected
    #[default]
    Idle,
    /// transport opening, or opened but server hello not received yet
    Connecting,
    /// server hello received
    Connected,
    /// close frame sent, waiting transport close
    Closing,
    /// transport closed
    Closed,
}

impl ConnectionState {
    /// `Idle` and `Closed` are the states which hold no transport
    pub fn has_transport(&self) -> bool {
        !matches!(self, Self::Idle | Self::Closed)
    }
}

/// Consecutive failure counters, both reset by any accepted data update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RetryCounters {
    /// health check timeouts
    pub timeouts: u32,
    /// vehicle disconnected/error messages
    pub disconnects: u32,
}

impl RetryCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Which transport phase the state machine believes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportPhase {
    None,
    Opening,
    Open,
}

pub(crate) type TimerId = u64;

/// What the single pending timer will do when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// no message received recently
    HealthCheck,
    /// send subscribe frame again after a vehicle disconnect
    Resubscribe,
    /// open a new transport
    Reconnect,
    /// close handshake never finished
    CloseGuard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingTimer {
    pub id: TimerId,
    pub kind: TimerKind,
}

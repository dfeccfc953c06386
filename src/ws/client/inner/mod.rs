mod driver;
mod state;
mod timer;

pub(super) use driver::{Command, Driver};

pub use driver::OpenError;
pub use state::ConnectionState;

use std::time::Duration;

use state::{PendingTimer, RetryCounters, TimerId, TimerKind, TransportPhase};

use super::{ConnectRequest, StreamError, StreamEvent, StreamOptions};
use crate::{
    backoff::{self, BackoffProfile},
    ws::{
        message::{ClientMessage, ErrorData, ErrorType, MessageStreamSinkError, ServerMessage},
        Subscription, SHIFT_STATE_COLUMN,
    },
};

/// `inactive` is emitted every time consecutive timeouts reach a multiple of this
pub(crate) const INACTIVE_EVERY: u32 = 3;
/// `too-many-disconnects` is emitted every time consecutive disconnects reach a multiple of this
pub(crate) const TOO_MANY_DISCONNECTS_EVERY: u32 = 10;
/// max time to wait server close frame after we sent ours
pub(crate) const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Things that happen to a stream client.
#[derive(Debug)]
pub(crate) enum Input {
    Connect(ConnectRequest),
    Disconnect { reconnect: bool, unsubscribe: bool },
    Opened,
    Message(ServerMessage),
    Malformed(MessageStreamSinkError),
    Closed { code: Option<u16> },
    TimerFired(TimerId),
}

/// Things the driver must do for the state machine.
#[derive(Debug)]
pub(crate) enum Action {
    Open,
    Send(ClientMessage),
    Close,
    DropTransport,
    ArmTimer { id: TimerId, delay: Duration },
    CancelTimer,
    Emit(StreamEvent),
}

/// Stream client state machine, performs no IO.
///
/// Every input goes through [`ClientInner::handle`], which updates state and
/// returns actions for the driver to execute in order.
#[derive(Debug)]
pub(crate) struct ClientInner {
    steady_health_window: Duration,
    reconnect_delay: Duration,

    state: ConnectionState,
    transport: TransportPhase,
    request: Option<ConnectRequest>,
    subscription: Option<Subscription>,
    counters: RetryCounters,
    last_shift_state: Option<String>,
    reconnect: bool,
    hello_received: bool,
    timer: Option<PendingTimer>,
    next_timer_id: TimerId,
}

impl ClientInner {
    pub fn new(options: &StreamOptions) -> Self {
        Self {
            steady_health_window: options.steady_health_window,
            reconnect_delay: options.reconnect_delay,
            state: ConnectionState::Idle,
            transport: TransportPhase::None,
            request: None,
            subscription: None,
            counters: RetryCounters::default(),
            last_shift_state: None,
            reconnect: false,
            hello_received: false,
            timer: None,
            next_timer_id: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[cfg(test)]
    pub fn counters(&self) -> RetryCounters {
        self.counters
    }

    #[cfg(test)]
    pub fn last_shift_state(&self) -> Option<&str> {
        self.last_shift_state.as_deref()
    }

    #[cfg(test)]
    pub fn pending_timer(&self) -> Option<TimerKind> {
        self.timer.map(|t| t.kind)
    }

    pub fn handle(&mut self, input: Input) -> Vec<Action> {
        let mut actions = Vec::new();

        log::trace!("Handle {:?} in {:?} state", input, self.state);

        match (self.state, input) {
            (_, Input::Connect(request)) => {
                self.request.replace(request);
                self.connect(&mut actions);
            }

            (ConnectionState::Closed, Input::Disconnect { .. }) => {
                if self.timer.is_some() {
                    log::debug!("Already closed, cancel pending timer");
                    self.cancel_timer(&mut actions);
                }
                self.reconnect = false;
            }
            (ConnectionState::Closing, Input::Disconnect { reconnect, .. }) => {
                log::debug!("Already closing, update reconnect flag to {}", reconnect);
                self.reconnect = reconnect;
            }
            (_, Input::Disconnect {
                reconnect,
                unsubscribe,
            }) => self.disconnect(reconnect, unsubscribe, &mut actions),

            (ConnectionState::Closing, Input::Opened) => {
                log::debug!("Transport opened after disconnect requested, close it now");
                self.transport = TransportPhase::Open;
                self.close(&mut actions);
            }
            (_, Input::Opened) => {
                log::debug!("Transport opened, send subscribe message");
                self.transport = TransportPhase::Open;
                if let Some(ref subscription) = self.subscription {
                    actions.push(Action::Send(ClientMessage::subscribe(subscription)));
                }
            }

            (ConnectionState::Closing, Input::Message(message)) => {
                log::trace!("Ignore {} message when closing", message.type_name());
            }
            (_, Input::Message(message)) => self.on_message(message, &mut actions),

            (_, Input::Malformed(source)) => {
                log::warn!("Received malformed frame: {}", source);
                actions.push(Action::Emit(StreamEvent::Error(StreamError::Malformed {
                    source,
                })));
            }

            (_, Input::Closed { code }) => self.on_closed(code, &mut actions),

            (_, Input::TimerFired(id)) => self.on_timer(id, &mut actions),
        }

        actions
    }

    fn connect(&mut self, actions: &mut Vec<Action>) {
        if self.transport != TransportPhase::None {
            if self.state == ConnectionState::Closing {
                log::debug!("Connect requested when closing, reconnect after closed");
                self.reconnect = true;
            } else {
                log::debug!("Transport already exists, ignore connect request");
            }
            return;
        }

        let Some(ref request) = self.request else {
            log::warn!("Connect without any subscription arguments, ignored");
            return;
        };

        self.subscription.replace(Subscription::new(
            request.tag.clone(),
            request.token.clone(),
            request.columns.clone(),
        ));

        log::info!("Connecting stream for tag {}", request.tag);

        self.state = ConnectionState::Connecting;
        self.transport = TransportPhase::Opening;
        self.hello_received = false;
        actions.push(Action::Open);

        self.arm_health_check(actions);
    }

    fn disconnect(&mut self, reconnect: bool, unsubscribe: bool, actions: &mut Vec<Action>) {
        log::debug!(
            "Disconnect, reconnect = {}, unsubscribe = {}",
            reconnect,
            unsubscribe
        );

        self.cancel_timer(actions);
        self.reconnect = reconnect;

        match self.transport {
            TransportPhase::None => {
                self.state = ConnectionState::Closed;
                self.after_closed(actions);
            }
            TransportPhase::Opening => {
                log::debug!("Transport still opening, defer close until opened");
                self.state = ConnectionState::Closing;
            }
            TransportPhase::Open => {
                self.state = ConnectionState::Closing;
                if unsubscribe {
                    if let Some(ref subscription) = self.subscription {
                        actions.push(Action::Send(ClientMessage::unsubscribe(
                            subscription.tag.as_str(),
                        )));
                    }
                }
                self.close(actions);
            }
        }
    }

    fn close(&mut self, actions: &mut Vec<Action>) {
        actions.push(Action::Close);
        self.arm(TimerKind::CloseGuard, CLOSE_TIMEOUT, actions);
    }

    fn on_closed(&mut self, code: Option<u16>, actions: &mut Vec<Action>) {
        if self.transport == TransportPhase::None {
            log::trace!("Transport already dropped, ignore close");
            return;
        }

        let clean = self.state == ConnectionState::Closing;

        self.transport = TransportPhase::None;
        self.state = ConnectionState::Closed;
        self.hello_received = false;
        self.cancel_timer(actions);

        if !clean {
            log::warn!("Transport closed unexpectedly, code {:?}", code);
            self.reconnect = true;
        } else {
            log::debug!("Transport closed, code {:?}", code);
        }

        self.after_closed(actions);
    }

    fn after_closed(&mut self, actions: &mut Vec<Action>) {
        if self.reconnect {
            log::info!("Reconnect in {:?}", self.reconnect_delay);
            self.arm(TimerKind::Reconnect, self.reconnect_delay, actions);
        } else {
            log::info!("Stream closed");
        }
    }

    fn on_message(&mut self, message: ServerMessage, actions: &mut Vec<Action>) {
        log::trace!("Received {} message", message.type_name());

        match message {
            ServerMessage::Hello => {
                log::debug!("Server hello received");
                self.state = ConnectionState::Connected;
                self.hello_received = true;
                self.arm_health_check(actions);
            }
            ServerMessage::Update(update) => {
                let values = update.values();

                self.counters.reset();
                if let Some(i) = self
                    .subscription
                    .as_ref()
                    .and_then(|s| s.value_index(SHIFT_STATE_COLUMN))
                {
                    if let Some(shift_state) = values.get(i) {
                        self.last_shift_state.replace(shift_state.clone());
                    }
                }

                self.arm_health_check(actions);
                actions.push(Action::Emit(StreamEvent::Data(values)));
            }
            ServerMessage::Error(data) => {
                self.arm_health_check(actions);
                self.on_error_message(data, actions);
            }
        }
    }

    /// `vehicle_disconnected` and `vehicle_error` both count as a disconnect.
    ///
    /// An offline `vehicle_error` emits `offline` and schedules no resubscribe, the
    /// health timer stays in charge. It still escalates with `too-many-disconnects`
    /// when the count reaches a multiple of [`TOO_MANY_DISCONNECTS_EVERY`].
    fn on_error_message(&mut self, data: ErrorData, actions: &mut Vec<Action>) {
        match data.kind() {
            ErrorType::VehicleDisconnected => {
                self.counters.disconnects = self.counters.disconnects.saturating_add(1);
                log::info!(
                    "Vehicle disconnected: {}, counts {}",
                    data.value,
                    self.counters.disconnects
                );
                self.resubscribe_or_escalate(actions);
            }
            ErrorType::VehicleError => {
                self.counters.disconnects = self.counters.disconnects.saturating_add(1);
                if data.is_offline() {
                    log::warn!("Vehicle is offline: {}", data.value);
                    actions.push(Action::Emit(StreamEvent::Offline));
                    self.escalate_if_too_many(actions);
                } else {
                    log::warn!(
                        "Vehicle error: {}, counts {}",
                        data.value,
                        self.counters.disconnects
                    );
                    self.resubscribe_or_escalate(actions);
                }
            }
            ErrorType::ClientError => {
                log::error!("Server rejected subscription: {}", data.value);
                self.disconnect(true, false, actions);
                actions.push(Action::Emit(StreamEvent::Error(StreamError::Client {
                    message: data.value,
                })));
            }
            ErrorType::Unknown => {
                log::warn!(
                    "Unrecognized error type {}: {}",
                    data.error_type,
                    data.value
                );
                actions.push(Action::Emit(StreamEvent::Error(
                    StreamError::UnknownErrorType {
                        error_type: data.error_type,
                        message: data.value,
                    },
                )));
            }
        }
    }

    fn escalate_if_too_many(&self, actions: &mut Vec<Action>) -> bool {
        let count = self.counters.disconnects;
        if count % TOO_MANY_DISCONNECTS_EVERY != 0 {
            return false;
        }

        log::warn!("Too many disconnects ({}), stop resubscribe", count);
        actions.push(Action::Emit(StreamEvent::TooManyDisconnects));
        true
    }

    fn resubscribe_or_escalate(&mut self, actions: &mut Vec<Action>) {
        if self.escalate_if_too_many(actions) {
            return;
        }

        let count = self.counters.disconnects;
        let delay = self.resubscribe_profile().delay(count);
        log::info!("Resubscribe in {:?}", delay);
        self.arm(TimerKind::Resubscribe, delay, actions);
    }

    fn resubscribe_profile(&self) -> BackoffProfile {
        match self.last_shift_state.as_deref() {
            Some(shift_state) if !shift_state.is_empty() => backoff::DRIVING_RESUBSCRIBE,
            _ => BackoffProfile::parked_resubscribe(
                self.request
                    .as_ref()
                    .and_then(|r| r.resubscribe_floor)
                    .unwrap_or(backoff::DEFAULT_RESUBSCRIBE_FLOOR),
            ),
        }
    }

    fn on_timer(&mut self, id: TimerId, actions: &mut Vec<Action>) {
        let timer = match self.timer {
            Some(timer) if timer.id == id => timer,
            _ => {
                log::trace!("Ignore stale timer {}", id);
                return;
            }
        };
        self.timer = None;

        match timer.kind {
            TimerKind::HealthCheck => {
                self.counters.timeouts = self.counters.timeouts.saturating_add(1);
                log::warn!(
                    "No message received in time, counts {}",
                    self.counters.timeouts
                );
                if self.counters.timeouts % INACTIVE_EVERY == 0 {
                    actions.push(Action::Emit(StreamEvent::Inactive));
                }
                self.disconnect(true, false, actions);
            }
            TimerKind::Resubscribe => {
                if self.transport != TransportPhase::Open {
                    log::debug!("Transport not open, skip resubscribe");
                    return;
                }
                if let Some(ref subscription) = self.subscription {
                    log::debug!("Resubscribe tag {}", subscription.tag);
                    actions.push(Action::Send(ClientMessage::subscribe(subscription)));
                }
                self.arm_health_check(actions);
            }
            TimerKind::Reconnect => self.connect(actions),
            TimerKind::CloseGuard => {
                log::warn!("Close handshake timeout, drop transport");
                actions.push(Action::DropTransport);
                self.on_closed(None, actions);
            }
        }
    }

    fn arm_health_check(&mut self, actions: &mut Vec<Action>) {
        let window = if self.hello_received {
            self.steady_health_window
        } else {
            backoff::INITIAL_HEALTH.delay(self.counters.timeouts)
        };
        self.arm(TimerKind::HealthCheck, window, actions);
    }

    fn arm(&mut self, kind: TimerKind, delay: Duration, actions: &mut Vec<Action>) {
        self.next_timer_id += 1;
        let id = self.next_timer_id;

        log::trace!("Arm {:?} timer {} in {:?}", kind, id, delay);

        self.timer.replace(PendingTimer { id, kind });
        actions.push(Action::ArmTimer { id, delay });
    }

    fn cancel_timer(&mut self, actions: &mut Vec<Action>) {
        if let Some(timer) = self.timer.take() {
            log::trace!("Cancel {:?} timer {}", timer.kind, timer.id);
            actions.push(Action::CancelTimer);
        }
    }
}

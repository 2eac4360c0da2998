use std::fmt;
use std::time::Instant;

use rumqttc::{ConnectReturnCode, QoS, SubscribeReasonCode};
use serde_json::json;
use thiserror::Error;

use crate::config::{ConfigError, DeviceConfig};
use crate::constants::defaults;
use crate::interfaces::mqtt::{
    get_rand_client_id, BusSession, ConnectError, Credentials, SessionError, SessionEvent,
    SessionFactory, SessionSetup,
};

use super::codec::{self, Channel, DecodeError, InboundEvent};
use super::observer::DeviceObserver;
use super::reconnect::{ReconnectPolicy, Reconnector};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Created,
    Connecting,
    Connected,
    Subscribed,
    Disconnected,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Created => "created",
            DeviceState::Connecting => "connecting",
            DeviceState::Connected => "connected",
            DeviceState::Subscribed => "subscribed",
            DeviceState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum SubscribeError {
    #[error("subscribe request for {topic} failed: {source}")]
    Request { topic: String, source: SessionError },
    #[error("broker rejected {rejected} of {requested} subscriptions")]
    Rejected { rejected: usize, requested: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeviceEvent {
    StateChanged { from: DeviceState, to: DeviceState },
    Inbound(InboundEvent),
    Undecodable(DecodeError),
}

/// One robot and its bus session
pub struct Device<S> {
    config: DeviceConfig,
    session: S,
    state: DeviceState,
    subscriptions: Vec<String>,
    awaiting_acks: usize,
    rejected_subs: usize,
    reconnect: Reconnector,
    // Set by an explicit disconnect; no reconnects afterwards
    stopped: bool,
    last_event: Option<DeviceEvent>,
    event_count: u64,
}

impl<S: BusSession> Device<S> {
    /// Validate the config and build (but not open) the device's session
    pub fn create<F>(
        config: DeviceConfig,
        factory: &F,
        policy: ReconnectPolicy,
    ) -> Result<Self, ConfigError>
    where
        F: SessionFactory<Session = S>,
    {
        config.validate()?;

        let setup = SessionSetup {
            client_id: get_rand_client_id(Some(&config.id)),
            credentials: config.credentials().map(|(username, password)| Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
        };
        let session = factory.create(&setup);
        let subscriptions = Channel::ALL
            .iter()
            .map(|channel| codec::build_topic(&config.id, *channel))
            .collect();

        log::debug!(
            "[{}] Created session {} for {}",
            config.id,
            setup.client_id,
            config.endpoint()
        );

        Ok(Device {
            config,
            session,
            state: DeviceState::Created,
            subscriptions,
            awaiting_acks: 0,
            rejected_subs: 0,
            reconnect: Reconnector::new(policy),
            stopped: false,
            last_event: None,
            event_count: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    pub fn last_event(&self) -> Option<&DeviceEvent> {
        self.last_event.as_ref()
    }

    /// Number of events recorded so far; never decreases
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Whether the session is (being) opened
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            DeviceState::Connecting | DeviceState::Connected | DeviceState::Subscribed
        )
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_scheduled()
    }

    /// Open the session. Blocks until the broker answers or the session gives up.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        let retrying = self.state == DeviceState::Disconnected
            && !self.stopped
            && self.reconnect.policy().is_enabled();
        if self.state != DeviceState::Created && !retrying {
            return Err(ConnectError::InvalidState(self.state.as_str()));
        }

        let previous = self.state;
        self.transition(DeviceState::Connecting);
        log::info!(
            "[{}] Connecting to {} (keep-alive {}s)",
            self.config.id,
            self.config.endpoint(),
            self.config.keep_alive.as_secs()
        );

        match self.session.connect(
            &self.config.host,
            self.config.port,
            self.config.keep_alive,
        ) {
            Ok(()) => {
                self.reconnect.cancel();
                Ok(())
            }
            Err(e) => {
                self.transition(previous);
                if let Some(delay) = self.reconnect.schedule(Instant::now()) {
                    log::info!(
                        "[{}] Next connect attempt in {:.1}s",
                        self.config.id,
                        delay.as_secs_f32()
                    );
                }
                Err(e)
            }
        }
    }

    /// One bounded round of network I/O, dispatching whatever the session delivered
    pub fn poll(&mut self, observer: &mut dyn DeviceObserver) {
        if !self.stopped && self.reconnect.take_due(Instant::now()) {
            log::info!("[{}] Reconnecting", self.config.id);
            if let Err(e) = self.connect() {
                log::error!("[{}] ConnectError: {}", self.config.id, e);
            }
        }

        if !self.is_active() {
            return;
        }

        for event in self.session.poll_once() {
            match event {
                SessionEvent::Connected(code) => self.on_connect(code, observer),
                SessionEvent::Subscribed(codes) => self.on_subscribe(codes, observer),
                SessionEvent::Message {
                    topic,
                    payload,
                    qos,
                } => self.on_message(&topic, &payload, qos, observer),
                SessionEvent::Disconnected => self.on_disconnect("closed by broker", observer),
                SessionEvent::Failed(reason) => self.on_disconnect(&reason, observer),
            }
        }
    }

    /// Close the session. Safe to call in any state, any number of times.
    pub fn disconnect(&mut self) {
        self.stopped = true;
        self.reconnect.cancel();

        if self.state == DeviceState::Disconnected {
            log::debug!("[{}] Already disconnected", self.config.id);
            return;
        }
        if self.is_active() {
            if let Err(e) = self.session.disconnect() {
                log::warn!("[{}] Error while disconnecting: {}", self.config.id, e);
            }
        }
        self.transition(DeviceState::Disconnected);
        log::info!("[{}] Disconnected", self.config.id);
    }

    /// Publish on one of this device's own channels
    pub fn send(&mut self, channel: Channel, payload: &[u8]) -> Result<(), SessionError> {
        if !matches!(
            self.state,
            DeviceState::Connected | DeviceState::Subscribed
        ) {
            return Err(SessionError::NotOpen);
        }
        let topic = codec::build_topic(&self.config.id, channel);
        self.session
            .publish(&topic, payload, defaults::SUBSCRIPTION_QOS)
    }

    fn on_connect(&mut self, code: ConnectReturnCode, observer: &mut dyn DeviceObserver) {
        log::info!("[{}] Connected with RC: {:?}", self.config.id, code);
        self.reconnect.reset();
        let event = self.transition(DeviceState::Connected);
        self.emit(event, observer);

        self.awaiting_acks = 0;
        self.rejected_subs = 0;
        for topic in &self.subscriptions {
            match self.session.subscribe(topic, defaults::SUBSCRIPTION_QOS) {
                Ok(()) => {
                    log::debug!("[{}] Subscribing to {}", self.config.id, topic);
                    self.awaiting_acks += 1;
                }
                Err(source) => {
                    let err = SubscribeError::Request {
                        topic: topic.clone(),
                        source,
                    };
                    log::error!("[{}] SubscribeError: {}", self.config.id, err);
                    self.rejected_subs += 1;
                }
            }
        }
    }

    fn on_subscribe(&mut self, codes: Vec<SubscribeReasonCode>, observer: &mut dyn DeviceObserver) {
        if self.awaiting_acks == 0 {
            log::debug!("[{}] Unexpected subscription ack", self.config.id);
            return;
        }

        for code in codes {
            self.awaiting_acks = self.awaiting_acks.saturating_sub(1);
            match code {
                SubscribeReasonCode::Success(qos) => {
                    log::info!("[{}] Subscribed with QoS: {:?}", self.config.id, qos)
                }
                SubscribeReasonCode::Failure => {
                    self.rejected_subs += 1;
                    log::warn!("[{}] Subscription rejected by broker", self.config.id);
                }
            }
        }

        if self.awaiting_acks > 0 || self.state != DeviceState::Connected {
            return;
        }
        if self.rejected_subs == 0 {
            let event = self.transition(DeviceState::Subscribed);
            self.emit(event, observer);
        } else {
            let err = SubscribeError::Rejected {
                rejected: self.rejected_subs,
                requested: self.subscriptions.len(),
            };
            log::warn!(
                "[{}] SubscribeError: {}; staying connected",
                self.config.id,
                err
            );
        }
    }

    fn on_message(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        observer: &mut dyn DeviceObserver,
    ) {
        let content = json!({
            "topic": topic,
            "payload": String::from_utf8_lossy(payload),
            "qos": qos as u8,
        });
        log::info!("[{}] {}", self.config.id, content);

        match codec::decode(&self.config.id, topic, payload, qos) {
            Ok(inbound) => {
                if let Some(err) = inbound.decode_error() {
                    log::warn!("[{}] DecodeError: {}", self.config.id, err);
                }
                self.emit(DeviceEvent::Inbound(inbound), observer);
            }
            Err(err) => {
                log::warn!("[{}] DecodeError: {}; dropped", self.config.id, err);
                self.emit(DeviceEvent::Undecodable(err), observer);
            }
        }
    }

    fn on_disconnect(&mut self, reason: &str, observer: &mut dyn DeviceObserver) {
        log::warn!("[{}] Disconnected with RC: {}", self.config.id, reason);
        let event = self.transition(DeviceState::Disconnected);
        self.emit(event, observer);

        if self.stopped {
            return;
        }
        match self.reconnect.schedule(Instant::now()) {
            Some(delay) => log::info!(
                "[{}] Reconnecting in {:.1}s",
                self.config.id,
                delay.as_secs_f32()
            ),
            None => log::warn!(
                "[{}] Reconnect policy is {}; device stays disconnected",
                self.config.id,
                self.reconnect.policy()
            ),
        }
    }

    fn transition(&mut self, to: DeviceState) -> DeviceEvent {
        let from = self.state;
        self.state = to;
        log::debug!("[{}] {} -> {}", self.config.id, from, to);

        let event = DeviceEvent::StateChanged { from, to };
        self.record(event.clone());
        event
    }

    fn emit(&mut self, event: DeviceEvent, observer: &mut dyn DeviceObserver) {
        observer.on_event(&self.config.id, &event);
        if !matches!(event, DeviceEvent::StateChanged { .. }) {
            self.record(event);
        }
    }

    fn record(&mut self, event: DeviceEvent) {
        self.event_count += 1;
        self.last_event = Some(event);
    }
}

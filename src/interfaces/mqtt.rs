use std::collections::VecDeque;
use std::time::Duration;

use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, MqttOptions, Outgoing, Packet,
    QoS, RecvTimeoutError, SubscribeReasonCode,
};
use thiserror::Error;

use crate::constants::defaults;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),
    #[error("connection refused by broker: {0:?}")]
    Refused(ConnectReturnCode),
    #[error("cannot connect while {0}")]
    InvalidState(&'static str),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    MqttClient(#[from] rumqttc::ClientError),
    #[error("session is not open")]
    NotOpen,
}

/// Notifications delivered by [`BusSession::poll_once`], in arrival order
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Connected(ConnectReturnCode),
    Subscribed(Vec<SubscribeReasonCode>),
    Message {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
    },
    Disconnected,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Everything a session needs before it is opened
#[derive(Clone, Debug)]
pub struct SessionSetup {
    pub client_id: String,
    pub credentials: Option<Credentials>,
}

/// Publish/subscribe session with one broker.
///
/// `poll_once` must return promptly whether or not anything is pending.
pub trait BusSession {
    fn connect(&mut self, host: &str, port: u16, keep_alive: Duration)
        -> Result<(), ConnectError>;
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), SessionError>;
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), SessionError>;
    fn disconnect(&mut self) -> Result<(), SessionError>;
    fn poll_once(&mut self) -> Vec<SessionEvent>;
}

pub trait SessionFactory {
    type Session: BusSession;

    fn create(&self, setup: &SessionSetup) -> Self::Session;
}

pub fn get_rand_client_id(prefix: Option<&str>) -> String {
    const RAND_ID_BYTES: usize = 3;
    let rand: [u8; RAND_ID_BYTES] = rand::random();
    let randhex = hex::encode(rand);

    if let Some(pref) = prefix {
        format!("{pref}-{randhex}")
    } else {
        randhex
    }
}

struct Link {
    client: Client,
    connection: Connection,
}

/// [`BusSession`] over a synchronous rumqttc client
pub struct MqttSession {
    setup: SessionSetup,
    poll_timeout: Duration,
    link: Option<Link>,
    pending: VecDeque<SessionEvent>,
}

impl MqttSession {
    pub fn new(setup: SessionSetup, poll_timeout: Duration) -> Self {
        MqttSession {
            setup,
            poll_timeout,
            link: None,
            pending: VecDeque::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.setup.client_id
    }

    fn link_mut(&mut self) -> Result<&mut Link, SessionError> {
        self.link.as_mut().ok_or(SessionError::NotOpen)
    }
}

fn translate(event: Event) -> Option<SessionEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => Some(SessionEvent::Connected(ack.code)),
        Event::Incoming(Packet::SubAck(ack)) => Some(SessionEvent::Subscribed(ack.return_codes)),
        Event::Incoming(Packet::Publish(msg)) => Some(SessionEvent::Message {
            topic: msg.topic,
            payload: msg.payload.to_vec(),
            qos: msg.qos,
        }),
        Event::Incoming(Packet::Disconnect) | Event::Outgoing(Outgoing::Disconnect) => {
            Some(SessionEvent::Disconnected)
        }
        other => {
            log::trace!("Notification = {:?}", other);
            None
        }
    }
}

impl BusSession for MqttSession {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        keep_alive: Duration,
    ) -> Result<(), ConnectError> {
        log::info!(
            "Establishing MQTT connection to {host}:{port} as {}",
            self.setup.client_id
        );

        let mut mqttoptions = MqttOptions::new(self.setup.client_id.clone(), host, port);
        mqttoptions
            .set_keep_alive(keep_alive)
            .set_clean_session(true);
        if let Some(creds) = &self.setup.credentials {
            mqttoptions.set_credentials(creds.username.clone(), creds.password.clone());
        }

        let (client, mut connection) = Client::new(mqttoptions, defaults::MQTT_CHANNEL_CAPACITY);

        // The event loop only dials out when polled; block until the broker answers
        loop {
            match connection.recv() {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(ConnectError::Refused(ack.code));
                    }
                    self.pending.push_back(SessionEvent::Connected(ack.code));
                    break;
                }
                Ok(Ok(other)) => log::trace!("Notification = {:?}", other),
                Ok(Err(ConnectionError::ConnectionRefused(code))) => {
                    return Err(ConnectError::Refused(code))
                }
                Ok(Err(e)) => return Err(ConnectError::Unreachable(e.to_string())),
                Err(_) => return Err(ConnectError::Unreachable("event loop closed".into())),
            }
        }

        self.link = Some(Link { client, connection });
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), SessionError> {
        self.link_mut()?.client.subscribe(topic, qos)?;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), SessionError> {
        log::debug!("Publishing to {}: {} bytes", topic, payload.len());
        self.link_mut()?
            .client
            .publish(topic, qos, false, payload.to_vec())?;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        self.pending.clear();
        let Some(mut link) = self.link.take() else {
            return Ok(());
        };
        link.client.disconnect()?;

        // Drive the event loop until the DISCONNECT packet is on the wire
        while let Ok(notification) = link
            .connection
            .recv_timeout(defaults::DISCONNECT_FLUSH_TIMEOUT)
        {
            match notification {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(other) => log::trace!("Notification = {:?}", other),
            }
        }
        Ok(())
    }

    fn poll_once(&mut self) -> Vec<SessionEvent> {
        let mut events: Vec<SessionEvent> = self.pending.drain(..).collect();
        let Some(link) = self.link.as_mut() else {
            return events;
        };

        let mut closed = false;
        for _ in 0..defaults::MAX_EVENTS_PER_POLL {
            match link.connection.recv_timeout(self.poll_timeout) {
                Ok(Ok(event)) => {
                    if let Some(event) = translate(event) {
                        closed = event == SessionEvent::Disconnected;
                        events.push(event);
                    }
                    if closed {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    events.push(SessionEvent::Failed(e.to_string()));
                    closed = true;
                    break;
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    events.push(SessionEvent::Failed("event loop closed".into()));
                    closed = true;
                    break;
                }
            }
        }

        // Polling a failed rumqttc connection again would redial; reconnects are the device's call
        if closed {
            self.link = None;
        }
        events
    }
}

#[derive(Clone, Debug)]
pub struct MqttSessionFactory {
    pub poll_timeout: Duration,
}

impl Default for MqttSessionFactory {
    fn default() -> Self {
        MqttSessionFactory {
            poll_timeout: defaults::POLL_TIMEOUT,
        }
    }
}

impl SessionFactory for MqttSessionFactory {
    type Session = MqttSession;

    fn create(&self, setup: &SessionSetup) -> MqttSession {
        MqttSession::new(setup.clone(), self.poll_timeout)
    }
}

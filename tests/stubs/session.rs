use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use iotr_monitor::interfaces::mqtt::{
    BusSession, ConnectError, Credentials, SessionError, SessionEvent, SessionFactory, SessionSetup,
};
use iotr_monitor::monitor::{DeviceEvent, DeviceObserver};
use rumqttc::{ConnectReturnCode, QoS, SubscribeReasonCode};

/// What a scripted broker does, and what it was asked to do
#[derive(Debug, Default)]
pub struct Script {
    pub client_id: String,
    pub credentials: Option<Credentials>,
    pub auto_connack: bool,
    pub auto_suback: bool,
    pub unreachable: bool,
    pub refuse: Option<ConnectReturnCode>,
    pub reject_topics: Vec<String>,
    pub pending: VecDeque<SessionEvent>,
    pub connects: Vec<(String, u16, Duration)>,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
    pub disconnects: usize,
    pub polls: usize,
    pub open: bool,
}

#[derive(Clone, Debug, Default)]
pub struct StubSession(pub Rc<RefCell<Script>>);

impl StubSession {
    pub fn push(&self, event: SessionEvent) {
        self.0.borrow_mut().pending.push_back(event);
    }

    pub fn message(&self, topic: &str, payload: &[u8]) {
        self.push(SessionEvent::Message {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos: QoS::AtMostOnce,
        });
    }

    pub fn script(&self) -> std::cell::Ref<'_, Script> {
        self.0.borrow()
    }

    pub fn script_mut(&self) -> std::cell::RefMut<'_, Script> {
        self.0.borrow_mut()
    }
}

impl BusSession for StubSession {
    fn connect(&mut self, host: &str, port: u16, keep_alive: Duration) -> Result<(), ConnectError> {
        let mut script = self.0.borrow_mut();
        script.connects.push((host.to_string(), port, keep_alive));
        if script.unreachable {
            return Err(ConnectError::Unreachable(format!("{host}:{port} unreachable")));
        }
        if let Some(code) = script.refuse {
            return Err(ConnectError::Refused(code));
        }
        script.open = true;
        if script.auto_connack {
            script
                .pending
                .push_back(SessionEvent::Connected(ConnectReturnCode::Success));
        }
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), SessionError> {
        let mut script = self.0.borrow_mut();
        if !script.open {
            return Err(SessionError::NotOpen);
        }
        script.subscriptions.push(topic.to_string());
        if script.auto_suback {
            let code = if script.reject_topics.iter().any(|t| t == topic) {
                SubscribeReasonCode::Failure
            } else {
                SubscribeReasonCode::Success(qos)
            };
            script.pending.push_back(SessionEvent::Subscribed(vec![code]));
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], _qos: QoS) -> Result<(), SessionError> {
        let mut script = self.0.borrow_mut();
        if !script.open {
            return Err(SessionError::NotOpen);
        }
        script.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        let mut script = self.0.borrow_mut();
        script.disconnects += 1;
        script.open = false;
        Ok(())
    }

    fn poll_once(&mut self) -> Vec<SessionEvent> {
        let mut script = self.0.borrow_mut();
        script.polls += 1;
        let events: Vec<_> = script.pending.drain(..).collect();
        if events
            .iter()
            .any(|e| matches!(e, SessionEvent::Disconnected | SessionEvent::Failed(_)))
        {
            script.open = false;
        }
        events
    }
}

/// Hands out scripted sessions and keeps a handle to each, by device id
#[derive(Clone, Debug)]
pub struct StubFactory {
    auto_acks: bool,
    sessions: Rc<RefCell<HashMap<String, StubSession>>>,
}

impl Default for StubFactory {
    fn default() -> Self {
        StubFactory {
            auto_acks: true,
            sessions: Rc::default(),
        }
    }
}

impl StubFactory {
    /// Sessions that only deliver what the test pushes
    pub fn manual() -> Self {
        StubFactory {
            auto_acks: false,
            ..StubFactory::default()
        }
    }

    pub fn session(&self, device_id: &str) -> StubSession {
        self.sessions
            .borrow()
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| panic!("no session created for {device_id}"))
    }
}

impl SessionFactory for StubFactory {
    type Session = StubSession;

    fn create(&self, setup: &SessionSetup) -> StubSession {
        let session = StubSession::default();
        {
            let mut script = session.script_mut();
            script.client_id = setup.client_id.clone();
            script.credentials = setup.credentials.clone();
            script.auto_connack = self.auto_acks;
            script.auto_suback = self.auto_acks;
        }
        let device_id = setup
            .client_id
            .rsplit_once('-')
            .map(|(id, _)| id)
            .unwrap_or(&setup.client_id);
        self.sessions
            .borrow_mut()
            .insert(device_id.to_string(), session.clone());
        session
    }
}

/// Observer that keeps everything it is shown
#[derive(Clone, Debug, Default)]
pub struct Recorder(pub Rc<RefCell<Vec<(String, DeviceEvent)>>>);

impl Recorder {
    pub fn events(&self) -> Vec<(String, DeviceEvent)> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl DeviceObserver for Recorder {
    fn on_event(&mut self, device_id: &str, event: &DeviceEvent) {
        self.0.borrow_mut().push((device_id.to_string(), event.clone()));
    }
}

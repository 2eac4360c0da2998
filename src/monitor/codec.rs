//! Topic naming and inbound message decoding.
//!
//! Every device lives under `roboleague/iotr/<device id>/` and talks on four
//! fixed channels. Nothing here holds state.

use std::fmt;
use std::str::from_utf8;

use chrono::{DateTime, Utc};
use rumqttc::QoS;
use serde_json::Value;
use thiserror::Error;

use crate::constants::topics;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    SerialOut,
    SerialIn,
    Status,
    Ir,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::SerialOut,
        Channel::SerialIn,
        Channel::Status,
        Channel::Ir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::SerialOut => topics::SERIAL_OUT,
            Channel::SerialIn => topics::SERIAL_IN,
            Channel::Status => topics::STATUS,
            Channel::Ir => topics::IR,
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| c.as_str() == suffix)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("unrecognized topic {topic}")]
    UnrecognizedTopic { topic: String },
    #[error("malformed status payload ({reason}): {raw}")]
    MalformedStatus { raw: String, reason: String },
}

/// Status record published by the robot firmware.
///
/// Only `ts` is mandatory and may be any JSON number. The other fields are
/// best effort: a missing or wrongly typed value reads as `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusReport {
    /// Unix time in seconds, possibly fractional
    pub ts: f64,
    pub rssi: Option<i64>,
    pub ssid: Option<String>,
    pub voltage: Option<f64>,
    pub flags: Option<u64>,
}

impl StatusReport {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        if !self.ts.is_finite() {
            return None;
        }
        let secs = self.ts.floor();
        let nanos = ((self.ts - secs) * 1e9) as u32;
        DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Status(StatusReport),
    /// Status payload that failed to decode; kept verbatim for diagnostics
    MalformedStatus { raw: String, reason: String },
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct InboundEvent {
    pub channel: Channel,
    pub payload: Payload,
    pub qos: QoS,
}

impl InboundEvent {
    /// The decode failure carried by a malformed status event
    pub fn decode_error(&self) -> Option<DecodeError> {
        match &self.payload {
            Payload::MalformedStatus { raw, reason } => Some(DecodeError::MalformedStatus {
                raw: raw.clone(),
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

pub fn topic_prefix(device_id: &str) -> String {
    format!("{}/{}/{}/", topics::ORGANIZATION, topics::PRODUCT, device_id)
}

pub fn build_topic(device_id: &str, channel: Channel) -> String {
    format!("{}{}", topic_prefix(device_id), channel.as_str())
}

pub fn parse_status(raw: &[u8]) -> Result<StatusReport, DecodeError> {
    let malformed = |reason: String| DecodeError::MalformedStatus {
        raw: String::from_utf8_lossy(raw).into_owned(),
        reason,
    };

    let body: Value = serde_json::from_slice(raw).map_err(|e| malformed(e.to_string()))?;
    let ts = match body.get("ts") {
        Some(ts) => ts
            .as_f64()
            .ok_or_else(|| malformed(format!("ts is not a number: {ts}")))?,
        None => return Err(malformed("missing field `ts`".to_string())),
    };

    Ok(StatusReport {
        ts,
        rssi: body.get("rssi").and_then(Value::as_i64),
        ssid: body.get("ssid").and_then(Value::as_str).map(str::to_string),
        voltage: body.get("voltage").and_then(Value::as_f64),
        flags: body.get("flags").and_then(Value::as_u64),
    })
}

/// Map an inbound message on `device_id`'s session back to a channel event.
///
/// Topics outside the device's namespace are `UnrecognizedTopic`. A bad status
/// body does not fail the decode; it yields `Payload::MalformedStatus`.
pub fn decode(
    device_id: &str,
    topic: &str,
    payload: &[u8],
    qos: QoS,
) -> Result<InboundEvent, DecodeError> {
    let channel = topic
        .strip_prefix(&topic_prefix(device_id))
        .and_then(Channel::from_suffix)
        .ok_or_else(|| DecodeError::UnrecognizedTopic {
            topic: topic.to_string(),
        })?;

    let payload = match channel {
        Channel::Status => match parse_status(payload) {
            Ok(report) => Payload::Status(report),
            Err(DecodeError::MalformedStatus { raw, reason }) => {
                Payload::MalformedStatus { raw, reason }
            }
            Err(e) => return Err(e),
        },
        _ => match from_utf8(payload) {
            Ok(text) => Payload::Text(text.trim_end_matches(['\r', '\n']).to_string()),
            Err(_) => Payload::Binary(payload.to_vec()),
        },
    };

    Ok(InboundEvent {
        channel,
        payload,
        qos,
    })
}

use std::time::Duration;

use rumqttc::QoS;

pub const LOG_LEVEL: &str = "info";
pub const LOG_DIR: &str = "logs";
pub const LOG_FILE_EXT: &str = "log";

pub const HOME_DIR: &str = ".";
pub const DEVICES_DIR: &str = "devices";
pub const DEVICE_RECORD_EXT: &str = "json";

pub const MQTT_PORT: u16 = 1883;
pub const MQTT_KEEP_ALIVE_SECS: u64 = 60;
pub const MQTT_CHANNEL_CAPACITY: usize = 10;
pub const SUBSCRIPTION_QOS: QoS = QoS::AtMostOnce;

// Upper bound on a single poll step: POLL_TIMEOUT * MAX_EVENTS_PER_POLL
pub const POLL_TIMEOUT: Duration = Duration::from_millis(10);
pub const MAX_EVENTS_PER_POLL: usize = 64;
pub const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

pub const IDLE_WAIT: Duration = Duration::from_millis(100);

pub const RECONNECT_FIXED_DELAY: Duration = Duration::from_secs(5);
pub const RECONNECT_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
pub const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(300);

use chrono::Local;

use super::codec::{Channel, Payload};
use super::device::DeviceEvent;

/// Receives the events a device surfaces while polling
pub trait DeviceObserver {
    fn on_event(&mut self, device_id: &str, event: &DeviceEvent);
}

/// Prints robot status times and serial output to stdout.
/// Everything else already goes to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleObserver;

impl ConsoleObserver {
    fn render(device_id: &str, event: &DeviceEvent) -> Option<String> {
        let DeviceEvent::Inbound(inbound) = event else {
            return None;
        };
        match (&inbound.channel, &inbound.payload) {
            (Channel::Status, Payload::Status(report)) => Some(match report.timestamp() {
                Some(ts) => format!("{device_id}: {}", ts.with_timezone(&Local).naive_local()),
                None => format!("{device_id}: status ts {} out of range", report.ts),
            }),
            (Channel::SerialIn, Payload::Text(line)) => Some(format!("{device_id}: {line}")),
            _ => None,
        }
    }
}

impl DeviceObserver for ConsoleObserver {
    fn on_event(&mut self, device_id: &str, event: &DeviceEvent) {
        if let Some(line) = Self::render(device_id, event) {
            println!("{line}");
        }
    }
}

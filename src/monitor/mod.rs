//! Multi-device session management: one bus session per robot, polled
//! round-robin on a single thread until shutdown.

pub mod codec;
mod device;
mod observer;
pub mod reconnect;
mod registry;
mod shutdown;

pub use codec::{Channel, DecodeError, InboundEvent, Payload, StatusReport};
pub use device::{Device, DeviceEvent, DeviceState, SubscribeError};
pub use observer::{ConsoleObserver, DeviceObserver};
pub use reconnect::ReconnectPolicy;
pub use registry::{DeviceRegistry, RegistryError};
pub use shutdown::{ShutdownCoordinator, ShutdownOutcome, ShutdownTrigger, SignalKind, StopFlag};

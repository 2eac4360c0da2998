use thiserror::Error;

use crate::config::{ConfigError, DeviceConfig, DiscoveredConfig};
use crate::constants::defaults;
use crate::interfaces::mqtt::SessionFactory;

use super::device::Device;
use super::observer::{ConsoleObserver, DeviceObserver};
use super::reconnect::ReconnectPolicy;
use super::shutdown::ShutdownCoordinator;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("duplicate device {id} from {key}")]
    DuplicateDevice { key: String, id: String },
}

/// All monitored devices, keyed by the config source they came from.
///
/// Insertion order is discovery order, and devices are connected, polled and
/// disconnected in that order.
pub struct DeviceRegistry<F: SessionFactory> {
    factory: F,
    reconnect: ReconnectPolicy,
    observer: Box<dyn DeviceObserver>,
    devices: Vec<(String, Device<F::Session>)>,
}

impl<F: SessionFactory> DeviceRegistry<F> {
    pub fn new(factory: F) -> Self {
        DeviceRegistry {
            factory,
            reconnect: ReconnectPolicy::default(),
            observer: Box::new(ConsoleObserver),
            devices: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl DeviceObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Applies to devices registered afterwards
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Device<F::Session>> {
        self.devices
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, device)| device)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Device<F::Session>)> {
        self.devices
            .iter()
            .map(|(key, device)| (key.as_str(), device))
    }

    pub fn active_count(&self) -> usize {
        self.devices.iter().filter(|(_, d)| d.is_active()).count()
    }

    pub fn register(
        &mut self,
        key: impl Into<String>,
        config: DeviceConfig,
    ) -> Result<(), RegistryError> {
        let key = key.into();
        if self
            .devices
            .iter()
            .any(|(k, device)| *k == key || device.id() == config.id)
        {
            return Err(RegistryError::DuplicateDevice { key, id: config.id });
        }

        let device = Device::create(config, &self.factory, self.reconnect)?;
        log::info!("Create device: {} ({})", device.id(), key);
        self.devices.push((key, device));
        Ok(())
    }

    /// Register every discovered record, skipping the ones that fail
    pub fn register_all(&mut self, discovered: impl IntoIterator<Item = DiscoveredConfig>) -> usize {
        let mut registered = 0;
        for DiscoveredConfig { source, config } in discovered {
            let result = config
                .map_err(RegistryError::from)
                .and_then(|config| self.register(source.as_str(), config));
            match result {
                Ok(()) => registered += 1,
                Err(e) => log::error!("Skipping {}: {}", source, e),
            }
        }
        registered
    }

    /// Connect devices one after another. Returns how many connected.
    pub fn connect_all(&mut self) -> usize {
        let mut connected = 0;
        for (_, device) in self.devices.iter_mut() {
            match device.connect() {
                Ok(()) => {
                    log::info!("Connect device: {}", device.id());
                    connected += 1;
                }
                Err(e) => log::error!("[{}] ConnectError: {}", device.id(), e),
            }
        }
        connected
    }

    /// One round-robin pass over all devices
    pub fn poll_all(&mut self) {
        let observer = self.observer.as_mut();
        for (_, device) in self.devices.iter_mut() {
            device.poll(&mut *observer);
        }
    }

    /// Poll until the coordinator's stop flag is raised
    pub fn run_loop(&mut self, shutdown: &ShutdownCoordinator) {
        log::info!("Monitoring {} devices", self.devices.len());
        while !shutdown.stop_flag().is_set() {
            self.poll_all();
            if self.active_count() == 0 {
                // Nothing to poll; park on the shutdown channel instead of spinning
                shutdown.wait(self, defaults::IDLE_WAIT);
            } else {
                shutdown.check(self);
            }
        }
        log::info!("Polling stopped");
    }

    pub fn disconnect_all(&mut self) {
        for (_, device) in self.devices.iter_mut() {
            device.disconnect();
            log::info!("Disconnect device: {}", device.id());
        }
    }
}

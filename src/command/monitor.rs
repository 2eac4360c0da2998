use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::{
    argsets::MonitorArgs,
    config::{ConfigSource, DeviceDir},
    constants::defaults,
    helpers,
    interfaces::mqtt::MqttSessionFactory,
    monitor::{DeviceRegistry, ShutdownCoordinator},
};

/// Connect to every configured device and monitor until SIGINT/SIGTERM
pub fn monitor(args: MonitorArgs) -> Result<()> {
    let source = DeviceDir::in_home(&args.home);
    let discovered = source.discover()?;
    if discovered.is_empty() {
        bail!("No device records found in {}", source.path().display());
    }

    // Explicit --log-dir wins, then the first readable record's log settings
    let first = discovered.iter().find_map(|d| d.config.as_ref().ok());
    let log_dir = args
        .log_dir
        .or_else(|| first.map(|c| c.log_dir.clone()))
        .unwrap_or_else(|| PathBuf::from(defaults::LOG_DIR));
    helpers::init_logging(&log_dir, first.and_then(|c| c.log_level))?;
    log::info!("Starting with reconnect policy {}", args.reconnect);

    let mut registry = DeviceRegistry::new(MqttSessionFactory::default())
        .with_reconnect_policy(args.reconnect);
    if registry.register_all(discovered) == 0 {
        bail!("No valid device records in {}", source.path().display());
    }

    let shutdown = ShutdownCoordinator::new();
    let _signals = shutdown.listen_for_signals()?;

    // Sequential; an unreachable broker holds up the devices after it
    let connected = registry.connect_all();
    log::info!("{} of {} devices connected", connected, registry.len());

    registry.run_loop(&shutdown);
    log::info!("Stopped");
    Ok(())
}

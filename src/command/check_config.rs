use anyhow::{bail, Result};

use crate::{
    argsets::CheckConfigArgs,
    config::{ConfigSource, DeviceDir, DiscoveredConfig},
    interfaces::mqtt::MqttSessionFactory,
    monitor::{DeviceRegistry, RegistryError},
};

/// Load and validate every device record, printing the devices and their topics.
/// No broker connection is made.
pub fn check_config(args: CheckConfigArgs) -> Result<()> {
    let source = DeviceDir::in_home(&args.home);
    let discovered = source.discover()?;
    if discovered.is_empty() {
        bail!("No device records found in {}", source.path().display());
    }

    let mut registry = DeviceRegistry::new(MqttSessionFactory::default());
    let mut invalid = 0;
    for DiscoveredConfig { source, config } in discovered {
        let result = config
            .map_err(RegistryError::from)
            .and_then(|config| registry.register(source.as_str(), config));
        if let Err(e) = result {
            println!("{source}: INVALID: {e}");
            invalid += 1;
        }
    }

    for (key, device) in registry.iter() {
        let config = device.config();
        let auth = if config.auth_enabled { ", auth" } else { "" };
        println!(
            "{key}: {} @ {} (keep-alive {}s{auth})",
            device.id(),
            config.endpoint(),
            config.keep_alive.as_secs()
        );
        for topic in device.subscriptions() {
            println!("  {topic}");
        }
    }

    if invalid > 0 {
        bail!("{invalid} invalid device record(s)");
    }
    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::defaults;

use super::{from_str, ConfigError, DeviceConfig};

/// One entry yielded by a config source. `source` identifies where the record
/// came from (the file name for [`DeviceDir`]) and is the registry key.
#[derive(Debug)]
pub struct DiscoveredConfig {
    pub source: String,
    pub config: Result<DeviceConfig, ConfigError>,
}

pub trait ConfigSource {
    fn discover(&self) -> Result<Vec<DiscoveredConfig>, ConfigError>;
}

/// Directory holding one `<name>.json` record per device
#[derive(Clone, Debug)]
pub struct DeviceDir {
    path: PathBuf,
}

impl DeviceDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DeviceDir { path: path.into() }
    }

    /// `<home>/devices`
    pub fn in_home(home: impl AsRef<Path>) -> Self {
        Self::new(home.as_ref().join(defaults::DEVICES_DIR))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_record(path: &Path) -> Result<DeviceConfig, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        from_str(&raw)
    }
}

impl ConfigSource for DeviceDir {
    fn discover(&self) -> Result<Vec<DiscoveredConfig>, ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(defaults::DEVICE_RECORD_EXT)
            {
                paths.push(path);
            }
        }
        // Directory listing order is platform dependent; polling order must not be
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| {
                log::debug!("Found device record {}", path.display());
                let source = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                DiscoveredConfig {
                    source,
                    config: Self::read_record(&path),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD_1: &str = r#"{"device": {"id": "Kerel1"}, "mqtt": {"host": "localhost"}}"#;
    const RECORD_2: &str = r#"{"device": {"id": "Kerel2"}, "mqtt": {"host": "localhost"}}"#;

    #[test]
    fn discovers_json_records_sorted() {
        let tempdir = tempfile::tempdir().unwrap();
        let devices = tempdir.path().join("devices");
        fs::create_dir(&devices).unwrap();
        fs::write(devices.join("b.json"), RECORD_2).unwrap();
        fs::write(devices.join("a.json"), RECORD_1).unwrap();
        fs::write(devices.join("notes.txt"), "ignored").unwrap();
        fs::write(devices.join("c.json"), "not json").unwrap();

        let found = DeviceDir::in_home(tempdir.path()).discover().unwrap();
        let sources: Vec<&str> = found.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, ["a.json", "b.json", "c.json"]);

        assert_eq!(found[0].config.as_ref().unwrap().id, "Kerel1");
        assert_eq!(found[1].config.as_ref().unwrap().id, "Kerel2");
        assert!(matches!(found[2].config, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn missing_directory_is_io_error() {
        let tempdir = tempfile::tempdir().unwrap();
        let result = DeviceDir::in_home(tempdir.path().join("nope")).discover();
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}

use std::path::PathBuf;

use crate::monitor::ReconnectPolicy;

#[derive(Debug)]
pub struct MonitorArgs {
    pub home: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub reconnect: ReconnectPolicy,
}

#[derive(Debug)]
pub struct CheckConfigArgs {
    pub home: PathBuf,
}

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use env_logger::{Env, Target};
use log::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::constants::{defaults, envvars};

// Every record goes to stderr and to the day's log file
struct Tee {
    file: RollingFileAppender,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        self.file.flush()
    }
}

/// `<log_dir>/YYYY-MM-DD.log`, rolled over at UTC midnight
pub fn daily_log_file(log_dir: &Path) -> Result<RollingFileAppender> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_suffix(defaults::LOG_FILE_EXT)
        .build(log_dir)?;
    Ok(appender)
}

fn default_filter(fallback: Option<LevelFilter>) -> String {
    match fallback {
        Some(level) => level.to_string().to_ascii_lowercase(),
        None => defaults::LOG_LEVEL.to_string(),
    }
}

/// Initialize the `log` facade.
///
/// Respects the LOG_LEVEL env var, then `fallback` (the device record's log
/// level), then "info". Lines are `timestamp<TAB>level<TAB>target<TAB>message`.
pub fn init_logging(log_dir: &Path, fallback: Option<LevelFilter>) -> Result<()> {
    let file = daily_log_file(log_dir)?;

    env_logger::Builder::from_env(Env::default().filter_or(envvars::LOG_LEVEL, default_filter(fallback)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{}\t{}\t{}\t{}",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()?;

    log::debug!("Logging to {}", log_dir.display());
    Ok(())
}

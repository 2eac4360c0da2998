mod check_config;
mod monitor;

pub use check_config::check_config;
pub use monitor::monitor;

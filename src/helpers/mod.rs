mod init_logging;
mod load_dotenv;

pub mod base_path;

pub use init_logging::{daily_log_file, init_logging};
pub use load_dotenv::load_dotenv;

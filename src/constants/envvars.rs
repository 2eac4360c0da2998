pub const LOG_LEVEL: &str = "LOG_LEVEL";

pub const IOTR_HOME: &str = "IOTR_HOME";

pub const ORGANIZATION: &str = "roboleague";
pub const PRODUCT: &str = "iotr";

pub const SERIAL_OUT: &str = "serial/out";
pub const SERIAL_IN: &str = "serial/in";
pub const STATUS: &str = "status";
pub const IR: &str = "ir";

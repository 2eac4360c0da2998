use std::env;

use crate::constants::envvars;

pub fn load_dotenv() {
    if dotenv::dotenv().is_ok() {
        println!("Loaded local .env")
    }
    // Also load $IOTR_HOME/.env if exists
    if let Ok(home) = env::var(envvars::IOTR_HOME) {
        let home_dotenv = format!("{home}/.env");
        if dotenv::from_path(&home_dotenv).is_ok() {
            println!("Loaded {home_dotenv}");
        }
    }
}

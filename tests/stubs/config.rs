pub const KEREL1: &str = r#"
{
    "device": {"id": "Kerel1"},
    "mqtt": {
        "host": "broker.mqtt-dashboard.com",
        "port": 1883,
        "alive": 60,
        "auth": false,
        "user": "admin",
        "pass": "admin"
    },
    "log": {"path": "logs/"}
}
"#;

pub const KEREL2_AUTH: &str = r#"
{
    "device": {"id": "Kerel2"},
    "mqtt": {
        "host": "10.0.0.5",
        "port": 8883,
        "alive": 15,
        "auth": true,
        "user": "robot",
        "pass": "s3cret"
    }
}
"#;

pub const MISSING_HOST: &str = r#"
{
    "device": {"id": "Kerel3"},
    "mqtt": {"port": 1883}
}
"#;

pub const DUPLICATE_KEREL1: &str = r#"
{
    "device": {"id": "Kerel1"},
    "mqtt": {"host": "localhost"}
}
"#;

pub const BAD_PAYLOAD: &str = "blah";

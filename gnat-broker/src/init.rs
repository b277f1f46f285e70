use std::fs;
use std::path::Path;

use crate::config::BrokerConfig;
use crate::logger::BrokerLogger;

const CONFIG_TEMPLATE: &str = r#"[connection]
ip = "0.0.0.0"
port = 1883

[http]
enabled = true
port = 8080

[network]
ssid = ""
ip = ""

[broker]
message_log_capacity = 50
qos_timeout_ms = 5000
max_qos_retries = 3

[logger]
console = true
file = false
level = "Info"
"#;

pub struct BrokerEnv {
    config: BrokerConfig,
}

impl BrokerEnv {
    /// Loads the configuration, writing a default file first when none
    /// exists so a bare `gnat-broker` run comes up listening on 1883.
    pub fn new(config_path: &Path) -> Self {
        if !config_path.exists() {
            fs::write(config_path, CONFIG_TEMPLATE).expect("Could not create the config file");
        }

        let raw = fs::read_to_string(config_path).expect("Could not read the config file");
        let config: BrokerConfig = toml::from_str(&raw)
            .expect("Could not parse the config file; delete it to regenerate the defaults");

        return Self { config };
    }

    pub fn init(self) -> Self {
        if self.config.should_log_console() || self.config.should_log_file() {
            BrokerLogger::new(&self.config)
                .init(self.config.log_level())
                .expect("A logger was already installed");

            if self.config.should_log_file() {
                init_log_dir();
            }
        }

        return self;
    }

    pub fn into_config(self) -> BrokerConfig {
        return self.config;
    }
}

fn init_log_dir() {
    let path = Path::new("logs");

    if !path.exists() {
        if let Err(err) = fs::create_dir(path) {
            log::error!("Could not create the logs directory: {err}");
            return;
        }
        log::info!("Initialized log directory.");
    }
}

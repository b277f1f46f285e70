use core::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct BrokerConfig {
    connection: Connection,
    http: Http,
    network: Network,
    broker: Tunables,
    logger: Logger,
}

impl BrokerConfig {
    pub fn addr(&self) -> String {
        return self.connection.ip.to_string() + ":" + &self.connection.port.to_string();
    }

    pub fn http_enabled(&self) -> bool {
        return self.http.enabled;
    }

    pub fn http_addr(&self) -> SocketAddr {
        return SocketAddr::new(IpAddr::V4(self.connection.ip), self.http.port);
    }

    pub fn ssid(&self) -> &str {
        return &self.network.ssid;
    }

    pub fn network_ip(&self) -> &str {
        return &self.network.ip;
    }

    pub fn message_log_capacity(&self) -> usize {
        return self.broker.message_log_capacity;
    }

    pub fn qos_timeout(&self) -> Duration {
        return Duration::from_millis(self.broker.qos_timeout_ms);
    }

    pub fn max_qos_retries(&self) -> u8 {
        return self.broker.max_qos_retries;
    }

    pub fn should_log_file(&self) -> bool {
        return self.logger.file;
    }

    pub fn should_log_console(&self) -> bool {
        return self.logger.console;
    }

    pub fn log_level(&self) -> LevelFilter {
        return LevelFilter::from_str(&self.logger.level).expect(&format!(
            "Invalid log level provided: {}. Accepted levels are: Off, Error, Warn, Info, Debug",
            self.logger.level
        ));
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct Connection {
    ip: Ipv4Addr,
    port: u16,
}

impl Default for Connection {
    fn default() -> Self {
        return Self {
            ip: Ipv4Addr::UNSPECIFIED,
            port: 1883,
        };
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct Http {
    enabled: bool,
    port: u16,
}

impl Default for Http {
    fn default() -> Self {
        return Self {
            enabled: true,
            port: 8080,
        };
    }
}

/// Reported verbatim by the status snapshot; the broker itself never dials
/// anything with these.
#[derive(Deserialize, Default)]
#[serde(default)]
struct Network {
    ssid: String,
    ip: String,
}

#[derive(Deserialize)]
#[serde(default)]
struct Tunables {
    message_log_capacity: usize,
    qos_timeout_ms: u64,
    max_qos_retries: u8,
}

impl Default for Tunables {
    fn default() -> Self {
        return Self {
            message_log_capacity: 50,
            qos_timeout_ms: 5000,
            max_qos_retries: 3,
        };
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct Logger {
    console: bool,
    file: bool,
    level: String,
}

impl Default for Logger {
    fn default() -> Self {
        return Self {
            console: true,
            file: false,
            level: String::from("Info"),
        };
    }
}

use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub nats: NatsConfig,
    pub bus: BusConfig,
    pub request: RequestConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub grpc_port: u16,
    pub api_enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NatsConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BusConfig {
    /// "broker" (NATS) or "rpc" (point-to-point gRPC)
    pub provider: String,
    /// Worker-side provider; empty means "same as the bus"
    pub worker_provider: String,
    /// Producer buffer for the rpc back-end
    pub buffer_size: usize,
    /// Remote EventService address for the rpc back-end
    pub rpc_addr: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RequestConfig {
    /// Ceiling applied to every ledger operation
    pub timeout_ms: u64,
}

impl BusConfig {
    pub fn worker_provider(&self) -> &str {
        if self.worker_provider.is_empty() {
            &self.provider
        } else {
            &self.worker_provider
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.grpc_port", 50051)?
            .set_default("server.api_enabled", true)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("nats.url", "nats://127.0.0.1:4222")?
            .set_default("bus.provider", "broker")?
            .set_default("bus.worker_provider", "")?
            .set_default("bus.buffer_size", 1024)?
            .set_default("bus.rpc_addr", "http://127.0.0.1:50051")?
            .set_default("request.timeout_ms", 3000)?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder
                .add_source(File::with_name(&format!("config/{}", environment)).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("METERING")
                .separator("__")
                .list_separator(","),
        );

        // Special handling for common env vars
        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(redis_url) = env::var("REDIS_URL") {
            builder = builder.set_override("redis.url", redis_url)?;
        }

        if let Ok(nats_url) = env::var("NATS_URL") {
            builder = builder.set_override("nats.url", nats_url)?;
        }

        if let Ok(port) = env::var("API_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        if let Ok(provider) = env::var("BUS_PROVIDER") {
            builder = builder.set_override("bus.provider", provider)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL is required".to_string());
        }

        if self.redis.url.is_empty() {
            return Err("Redis URL is required".to_string());
        }

        match self.bus.provider.as_str() {
            "broker" => {
                if self.nats.url.is_empty() {
                    return Err("NATS URL is required for the broker bus".to_string());
                }
            }
            "rpc" => {
                if self.bus.rpc_addr.is_empty() {
                    return Err("Bus RPC address is required for the rpc bus".to_string());
                }
            }
            other => {
                return Err(format!("Unknown bus provider: {}", other));
            }
        }

        if self.bus.buffer_size == 0 {
            return Err("Bus buffer size cannot be 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                grpc_port: 50051,
                api_enabled: true,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/metering".into(),
                max_connections: 10,
                min_connections: 2,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".into(),
            },
            nats: NatsConfig {
                url: "nats://127.0.0.1:4222".into(),
            },
            bus: BusConfig {
                provider: "broker".into(),
                worker_provider: String::new(),
                buffer_size: 1024,
                rpc_addr: "http://127.0.0.1:50051".into(),
            },
            request: RequestConfig { timeout_ms: 3000 },
        }
    }

    #[test]
    fn test_validate_accepts_broker_defaults() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = base_config();
        config.bus.provider = "kafka".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_provider_defaults_to_bus_provider() {
        let mut config = base_config();
        assert_eq!(config.bus.worker_provider(), "broker");

        config.bus.worker_provider = "rpc".into();
        assert_eq!(config.bus.worker_provider(), "rpc");
    }
}

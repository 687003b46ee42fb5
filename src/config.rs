//! Process configuration loaded from environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Which backing store the registry writes through to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    File,
    Memory,
}

/// Registry limits and persistence settings
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub store: StoreKind,
    pub assign_file: PathBuf,
    /// Upper bound for a single store read or write
    pub persist_timeout: Duration,
    /// Maximum number of simultaneous participants
    pub max_participants: usize,
    /// Largest slot an admin may reassign to
    pub max_slot: u32,
    /// Capacity of the snapshot fan-out channel
    pub broadcast_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::File,
            assign_file: PathBuf::from("assignments.json"),
            persist_timeout: Duration::from_millis(2000),
            max_participants: 1000,
            max_slot: 100_000,
            broadcast_capacity: 100,
        }
    }
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let store = match std::env::var("STORE").map(|v| v.to_lowercase()).as_deref() {
            Ok("memory") => StoreKind::Memory,
            Ok("file") | Err(_) => StoreKind::File,
            Ok(other) => {
                tracing::warn!(store = other, "Unknown STORE value, falling back to file");
                StoreKind::File
            }
        };

        let assign_file = std::env::var("ASSIGN_FILE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.assign_file);

        let persist_timeout = match env_parse::<u64>("PERSIST_TIMEOUT_MS") {
            Some(0) => {
                tracing::warn!(
                    default_ms = defaults.persist_timeout.as_millis() as u64,
                    "PERSIST_TIMEOUT_MS=0 would fail every write, using default"
                );
                defaults.persist_timeout
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.persist_timeout,
        };

        let config = Self {
            store,
            assign_file,
            persist_timeout,
            max_participants: env_parse("MAX_PARTICIPANTS").unwrap_or(defaults.max_participants),
            max_slot: env_parse("MAX_SLOT").unwrap_or(defaults.max_slot),
            broadcast_capacity: env_parse("BROADCAST_CAPACITY")
                .filter(|capacity: &usize| *capacity > 0)
                .unwrap_or(defaults.broadcast_capacity),
        };

        tracing::info!(
            store = ?config.store,
            assign_file = %config.assign_file.display(),
            persist_timeout_ms = config.persist_timeout.as_millis() as u64,
            max_participants = config.max_participants,
            max_slot = config.max_slot,
            "Registry config loaded"
        );

        config
    }
}

/// Listener and static asset settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub static_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let ip = std::env::var("BIND_ADDR")
            .ok()
            .and_then(|v| v.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port = env_parse("PORT").unwrap_or(3000u16);
        let static_dir = std::env::var("STATIC_DIR")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Self {
            addr: SocketAddr::new(ip, port),
            static_dir,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
